//! Parley Common - Shared configuration, errors, and logging for the Parley chat relay.
//!
//! This crate provides:
//! - Configuration types, loading, and environment overrides
//! - Configuration validation
//! - The request error taxonomy and its HTTP mapping
//! - Logging setup
//! - Small string utilities

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    AnalyzerConfig, CompletionConfig, Config, NetworkConfig, ObservabilityConfig, SecretsConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
