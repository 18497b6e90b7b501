//! Shader reflection interface and binding validation

use std::collections::HashMap;

use ash::vk;

use super::binding::Descriptor;
use crate::error::{MagmaError, MagmaResult, ReflectionError};

/// One descriptor binding declared by a shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectedBinding {
    /// Descriptor set index
    pub set: u32,
    /// Binding index inside the set
    pub binding: u32,
    /// Descriptor type as the shader declares it
    pub descriptor_type: vk::DescriptorType,
    /// Array size; 0 for runtime sized arrays
    pub count: u32,
}

/// Reflection data of a compiled shader module
pub trait ShaderReflection {
    /// Number of entry points in the module
    fn entry_point_count(&self) -> u32;

    /// Name of entry point `index`
    fn entry_point_name(&self, index: u32) -> Option<&str>;

    /// Every descriptor binding reachable from `entry_point`, across all sets
    fn enumerate_descriptor_bindings(&self, entry_point: &str) -> Result<Vec<ReflectedBinding>, ReflectionError>;
}

/// Whether a table descriptor of type `declared` can back a shader binding of
/// type `reflected`. Shaders cannot tell dynamic buffers or inline uniform
/// blocks apart from plain buffers.
fn types_compatible(declared: vk::DescriptorType, reflected: vk::DescriptorType) -> bool {
    declared == reflected
        || matches!(
            (reflected, declared),
            (
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC | vk::DescriptorType::INLINE_UNIFORM_BLOCK
            ) | (vk::DescriptorType::STORAGE_BUFFER, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC)
        )
}

/// Check that every descriptor exists in set `set_index` of `entry_point`
/// with a compatible type and array size.
///
/// Shader bindings the descriptors do not cover are only logged; the shader
/// may simply not use them with this table.
pub fn validate_bindings(
    descriptors: &[&Descriptor],
    reflection: &dyn ShaderReflection,
    entry_point: &str,
    set_index: u32,
) -> MagmaResult<()> {
    let reflected: HashMap<u32, ReflectedBinding> = reflection
        .enumerate_descriptor_bindings(entry_point)?
        .into_iter()
        .filter(|binding| binding.set == set_index)
        .map(|binding| (binding.binding, binding))
        .collect();

    for descriptor in descriptors {
        let binding = descriptor.binding();
        let shader = reflected.get(&binding).ok_or_else(|| MagmaError::BindingNotFound {
            binding,
            set: set_index,
            entry_point: entry_point.to_string(),
        })?;
        if !types_compatible(descriptor.descriptor_type(), shader.descriptor_type) {
            return Err(MagmaError::BindingTypeMismatch {
                binding,
                declared: descriptor.descriptor_type(),
                reflected: shader.descriptor_type,
            });
        }
        let sized_array = shader.count != 0;
        let inline = descriptor.descriptor_type() == vk::DescriptorType::INLINE_UNIFORM_BLOCK;
        if sized_array && !inline && shader.count != descriptor.descriptor_count() {
            return Err(MagmaError::BindingCountMismatch {
                binding,
                declared: descriptor.descriptor_count(),
                reflected: shader.count,
            });
        }
    }

    for binding in reflected.keys() {
        if !descriptors.iter().any(|descriptor| descriptor.binding() == *binding) {
            log::warn!(
                "Binding #{binding} of set #{set_index} in \"{entry_point}\" is not declared by the descriptor set table"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{CombinedImageSampler, DynamicUniformBuffer, SampledImage, UniformBuffer};
    use crate::testing::StaticReflection;

    fn reflection() -> StaticReflection {
        StaticReflection::new("main", vec![
            ReflectedBinding { set: 0, binding: 0, descriptor_type: vk::DescriptorType::UNIFORM_BUFFER, count: 1 },
            ReflectedBinding {
                set: 0,
                binding: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                count: 1,
            },
            ReflectedBinding { set: 1, binding: 0, descriptor_type: vk::DescriptorType::SAMPLED_IMAGE, count: 4 },
        ])
    }

    #[test]
    fn test_matching_bindings_pass() {
        let ubo = UniformBuffer::new(0);
        let texture = CombinedImageSampler::new(1);
        assert!(validate_bindings(&[&*ubo, &*texture], &reflection(), "main", 0).is_ok());
    }

    #[test]
    fn test_missing_binding_fails() {
        let ubo = UniformBuffer::new(5);
        let result = validate_bindings(&[&*ubo], &reflection(), "main", 0);
        assert!(matches!(result, Err(MagmaError::BindingNotFound { binding: 5, set: 0, .. })));
    }

    #[test]
    fn test_binding_in_other_set_fails() {
        let images = SampledImage::array(0, 4);
        let result = validate_bindings(&[&*images], &reflection(), "main", 0);
        assert!(matches!(result, Err(MagmaError::BindingTypeMismatch { binding: 0, .. })));
        assert!(validate_bindings(&[&*images], &reflection(), "main", 1).is_ok());
    }

    #[test]
    fn test_count_mismatch_fails() {
        let images = SampledImage::array(0, 2);
        let result = validate_bindings(&[&*images], &reflection(), "main", 1);
        assert!(matches!(
            result,
            Err(MagmaError::BindingCountMismatch { binding: 0, declared: 2, reflected: 4 })
        ));
    }

    #[test]
    fn test_dynamic_buffer_matches_uniform_buffer() {
        let ubo = DynamicUniformBuffer::new(0);
        assert!(validate_bindings(&[&*ubo], &reflection(), "main", 0).is_ok());
    }

    #[test]
    fn test_unknown_entry_point_is_a_reflection_error() {
        let ubo = UniformBuffer::new(0);
        let result = validate_bindings(&[&*ubo], &reflection(), "other", 0);
        assert!(matches!(
            result,
            Err(MagmaError::Reflection(ReflectionError::EntryPointNotFound { .. }))
        ));
    }
}
