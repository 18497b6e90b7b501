//! Error types
//!
//! [`MagmaError`] covers everything the driver can reject and every
//! validation the crate performs eagerly at construction or flush time.
//! Reflection problems use the separate [`ReflectionError`] so callers can
//! tell "my shader data is malformed" apart from "the driver rejected this".

use ash::vk;

/// Errors raised by the shader reflection provider
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReflectionError {
    /// The requested entry point does not exist in the shader
    #[error("Entry point not found: {name}")]
    EntryPointNotFound {
        /// Name that was looked up
        name: String,
    },

    /// The reflection data could not be interpreted
    #[error("Malformed reflection data: {reason}")]
    Malformed {
        /// Description of the problem
        reason: String,
    },
}

/// One pipeline of a batch that the driver refused to compile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineFailure {
    /// Position of the request inside its batch
    pub index: usize,
    /// Content hash of the requested pipeline state
    pub hash: u64,
    /// Result code reported for this request
    pub result: vk::Result,
}

/// Driver and validation errors
#[derive(thiserror::Error, Debug)]
pub enum MagmaError {
    /// The driver returned a failure code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A structure type that is not in the extension structure registry
    #[error("Unknown structure type: {0:?}")]
    UnknownStructureType(vk::StructureType),

    /// Two descriptors of one table share a binding index
    #[error("Binding #{binding} is declared more than once")]
    DuplicateBinding {
        /// Offending binding index
        binding: u32,
    },

    /// A table binding is absent from the shader
    #[error("Binding #{binding} not found in descriptor set #{set} of entry point \"{entry_point}\"")]
    BindingNotFound {
        /// Binding index declared by the table
        binding: u32,
        /// Descriptor set index
        set: u32,
        /// Shader entry point that was reflected
        entry_point: String,
    },

    /// A table binding exists in the shader with another descriptor type
    #[error("Binding #{binding} has type {declared:?} but the shader expects {reflected:?}")]
    BindingTypeMismatch {
        /// Binding index
        binding: u32,
        /// Type declared by the table
        declared: vk::DescriptorType,
        /// Type declared by the shader
        reflected: vk::DescriptorType,
    },

    /// A table binding exists in the shader with another array size
    #[error("Binding #{binding} has {declared} descriptors but the shader expects {reflected}")]
    BindingCountMismatch {
        /// Binding index
        binding: u32,
        /// Count declared by the table
        declared: u32,
        /// Count declared by the shader
        reflected: u32,
    },

    /// An image descriptor was flushed with an assumed layout that nothing
    /// will transition the image to
    #[error("Binding #{binding} assumes layout {layout:?} but no transition to it was recorded")]
    LayoutNotTransitioned {
        /// Binding index of the descriptor
        binding: u32,
        /// Layout the descriptor was written with
        layout: vk::ImageLayout,
    },

    /// A registry key no longer refers to a live resource
    #[error("Resource not found: {key}")]
    ResourceNotFound {
        /// Debug form of the stale key
        key: String,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Some pipelines of a batched creation call failed
    #[error("{} pipeline(s) of the batch failed to compile", failures.len())]
    PipelineBatch {
        /// Every failing request of the batch
        failures: Vec<PipelineFailure>,
    },

    /// Shader reflection failed
    #[error("Reflection error: {0}")]
    Reflection(#[from] ReflectionError),
}

impl From<vk::Result> for MagmaError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for Magma operations
pub type MagmaResult<T> = Result<T, MagmaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_message_counts_failures() {
        let error = MagmaError::PipelineBatch {
            failures: vec![
                PipelineFailure { index: 0, hash: 1, result: vk::Result::ERROR_UNKNOWN },
                PipelineFailure { index: 3, hash: 2, result: vk::Result::ERROR_OUT_OF_HOST_MEMORY },
            ],
        };
        assert_eq!(error.to_string(), "2 pipeline(s) of the batch failed to compile");
    }

    #[test]
    fn test_reflection_error_converts() {
        let error: MagmaError = ReflectionError::EntryPointNotFound { name: "main".into() }.into();
        assert!(matches!(error, MagmaError::Reflection(_)));
    }
}
