//! Chestdrop core library
//!
//! Domain models, error types, identifier generation, and configuration shared
//! across all chestdrop crates. A *chest* is an upload session: opened, filled
//! with files and text items, sealed against a retrieval code, and eventually
//! expired and reaped.

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod models;

pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
