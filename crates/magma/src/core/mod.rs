//! # Core Module
//!
//! Shared configuration for the descriptor and pipeline subsystems.

pub mod config;

pub use config::{Config, ConfigError, DescriptorConfig, MagmaConfig, PipelineCacheConfig};
