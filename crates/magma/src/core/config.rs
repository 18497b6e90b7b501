//! # Magma Configuration
//!
//! Tunables for the descriptor and pipeline subsystems, loadable from TOML or
//! RON through [`Config`].
//!
//! ```toml
//! log_level = "info"
//!
//! [descriptors]
//! max_sets = 64
//! descriptors_per_type = 16
//! free_descriptor_sets = true
//! validate_reflection = true
//!
//! [pipelines]
//! allow_derivatives = true
//! verify_state_on_hash_hit = true
//! isolate_batch_failures = true
//! ```

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// # Descriptor Configuration
///
/// Sizing of descriptor pools and the validation performed when descriptor
/// sets are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    /// Maximum number of sets a pool can allocate
    pub max_sets: u32,
    /// Descriptors of each type reserved per set
    pub descriptors_per_type: u32,
    /// Create pools with `FREE_DESCRIPTOR_SET` so sets are returned on drop
    pub free_descriptor_sets: bool,
    /// Check table bindings against shader reflection when one is supplied
    pub validate_reflection: bool,
}

impl DescriptorConfig {
    /// Set the pool capacity
    pub fn with_max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    /// Set the per-set descriptor budget for each type
    pub fn with_descriptors_per_type(mut self, count: u32) -> Self {
        self.descriptors_per_type = count;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sets == 0 {
            return Err(ConfigError::Invalid("max_sets must be at least 1".to_string()));
        }
        if self.descriptors_per_type == 0 {
            return Err(ConfigError::Invalid(
                "descriptors_per_type must be at least 1".to_string(),
            ));
        }
        if self.max_sets.checked_mul(self.descriptors_per_type).is_none() {
            return Err(ConfigError::Invalid(
                "max_sets * descriptors_per_type overflows".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            max_sets: 64,
            descriptors_per_type: 16,
            free_descriptor_sets: true,
            validate_reflection: true,
        }
    }
}

/// # Pipeline Cache Configuration
///
/// Controls derivative creation and the failure policy of batched builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineCacheConfig {
    /// Create pipelines with `ALLOW_DERIVATIVES` and derive new ones from
    /// compatible cached pipelines
    pub allow_derivatives: bool,
    /// Compare full pipeline state when a content hash matches
    pub verify_state_on_hash_hit: bool,
    /// Re-issue failed entries of a batch one by one to find which failed
    pub isolate_batch_failures: bool,
}

impl Default for PipelineCacheConfig {
    fn default() -> Self {
        Self {
            allow_derivatives: true,
            verify_state_on_hash_hit: true,
            isolate_batch_failures: true,
        }
    }
}

/// # Complete Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagmaConfig {
    /// Default log filter used by [`crate::foundation::logging::init_with_level`]
    pub log_level: String,
    /// Descriptor pool and validation settings
    pub descriptors: DescriptorConfig,
    /// Pipeline cache settings
    pub pipelines: PipelineCacheConfig,
}

impl MagmaConfig {
    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level cannot be empty".to_string()));
        }
        self.descriptors.validate()
    }
}

impl Default for MagmaConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            descriptors: DescriptorConfig::default(),
            pipelines: PipelineCacheConfig::default(),
        }
    }
}

impl Config for MagmaConfig {}
