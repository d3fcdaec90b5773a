//! embedprobe core - Configuration, error types, and shared utilities
//!
//! This crate provides the foundational types used across all embedprobe
//! crates.

pub mod banding;
pub mod config;
pub mod error;

pub use banding::BandingPolicy;
pub use config::{Config, InferenceConfig, LoggingConfig, ModelsConfig, SimilarityConfig};
pub use error::{Error, Result};
