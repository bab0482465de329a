//! External service integrations.

pub mod openai_client {
    pub use crate::openai_client::*;
}
