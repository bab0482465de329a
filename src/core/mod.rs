// Domain-layer modules and shared errors/models
pub mod normalizer {
    pub use crate::normalizer::*;
}

pub mod prompt {
    pub use crate::prompt::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
