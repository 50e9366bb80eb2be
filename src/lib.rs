//! # Revos
//!
//! OAuth2 client-credentials token management for LLM API clients.
//!
//! Modules:
//! - `config`: layered configuration (files, `.env`, prefixed env vars, overrides)
//! - `tokens`: cached token, refresh with fallback, background refresh
//! - `llm`: prompt templates, chat client and structured extraction
//! - `observability`: Prometheus metrics fed by token events
//! - `server`: status and metrics HTTP routes

pub mod config;
pub mod error;
pub mod helpers;
pub mod llm;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod tokens;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::config::{ConfigLoader, EnvPrefixes, MainConfig};
pub use crate::error::{Result, RevosError};
pub use crate::llm::{Extractor, ExtractorRegistry, PromptTemplate};
pub use crate::tokens::{TokenManager, TokenStatus};
