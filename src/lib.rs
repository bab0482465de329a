//! Metcorp CRM lead analysis backend.
//!
//! Receives lead data from the CRM, asks a chat-completion model for a sales
//! analysis and returns it normalized to a fixed JSON contract.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Prompt building, response normalization and models.
//! - `integrations`: External service clients.
//! - `app`: Router and middleware assembly.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Request, response and completion API models.
//! - `normalizer`: Recovery ladder for untrusted model output.
//! - `openai_client`: Chat-completion API client.
//! - `prompt`: Prompt construction.

pub mod api;
pub mod core;
pub mod integrations;

pub mod app;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod openai_client;
pub mod prompt;
