//! Extension structure registry
//!
//! Every Vulkan extension structure that may travel through a
//! [`StructureChain`](super::StructureChain) is registered here once, with its
//! structure type tag and the list of fields that make up its content. The
//! registry replaces a byte-size lookup table: nodes are cloned through
//! `Copy`, hashed and compared field by field, and an unregistered tag is a
//! hard error instead of an undefined-size allocation.
//!
//! Only structures whose sole pointer member is `p_next` are registered, so
//! node payloads never borrow memory owned by someone else.

use std::ffi::c_void;

use ash::vk;
use ash::vk::Handle;

use crate::error::{MagmaError, MagmaResult};

/// A registered Vulkan extension structure.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` Vulkan structures whose `s_type` equals
/// [`ExtensionStructure::STRUCTURE_TYPE`] in their `Default` value, and whose
/// only pointer member is `p_next`. Use the registration macro in this module
/// rather than implementing the trait by hand.
pub unsafe trait ExtensionStructure: Copy + Default + 'static {
    /// Discriminant tag of the structure
    const STRUCTURE_TYPE: vk::StructureType;
    /// Rust name of the structure, for diagnostics
    const NAME: &'static str;

    /// Current `p_next` value
    fn next(&self) -> *mut c_void;

    /// Overwrite `p_next`
    fn set_next(&mut self, next: *mut c_void);

    /// Feed every content field, in declaration order, to `visit`.
    /// `s_type` and `p_next` are not content.
    fn visit_fields(&self, visit: &mut dyn FnMut(u64));
}

/// Bit pattern of a structure field, used for hashing and exact comparison
pub trait FieldBits {
    /// Raw bits of the value widened to 64 bits
    fn field_bits(&self) -> u64;
}

impl FieldBits for u16 {
    fn field_bits(&self) -> u64 {
        u64::from(*self)
    }
}

impl FieldBits for u32 {
    fn field_bits(&self) -> u64 {
        u64::from(*self)
    }
}

impl FieldBits for u64 {
    fn field_bits(&self) -> u64 {
        *self
    }
}

impl FieldBits for f32 {
    fn field_bits(&self) -> u64 {
        u64::from(self.to_bits())
    }
}

macro_rules! enum_field_bits {
    ($($ty:ident),* $(,)?) => {
        $(
            impl FieldBits for vk::$ty {
                fn field_bits(&self) -> u64 {
                    u64::from(self.as_raw() as u32)
                }
            }
        )*
    };
}

macro_rules! flags_field_bits {
    ($($ty:ident),* $(,)?) => {
        $(
            impl FieldBits for vk::$ty {
                fn field_bits(&self) -> u64 {
                    u64::from(self.as_raw())
                }
            }
        )*
    };
}

macro_rules! handle_field_bits {
    ($($ty:ident),* $(,)?) => {
        $(
            impl FieldBits for vk::$ty {
                fn field_bits(&self) -> u64 {
                    self.as_raw()
                }
            }
        )*
    };
}

enum_field_bits!(
    ConservativeRasterizationModeEXT,
    LineRasterizationModeEXT,
    ProvokingVertexModeEXT,
    BlendOverlapEXT,
    TessellationDomainOrigin,
    SamplerReductionMode,
);

flags_field_bits!(
    PipelineRasterizationStateStreamCreateFlagsEXT,
    PipelineRasterizationConservativeStateCreateFlagsEXT,
    PipelineRasterizationDepthClipStateCreateFlagsEXT,
    ImageUsageFlags,
    MemoryAllocateFlags,
);

handle_field_bits!(Image, Buffer, SamplerYcbcrConversion);

/// Registry entry describing one structure type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureInfo {
    /// Discriminant tag
    pub structure_type: vk::StructureType,
    /// Size of the structure in bytes
    pub size: usize,
    /// Rust name of the structure
    pub name: &'static str,
}

macro_rules! extension_structures {
    ($( $ty:ident => $tag:ident { $($field:ident),* $(,)? } ),* $(,)?) => {
        $(
            unsafe impl ExtensionStructure for vk::$ty {
                const STRUCTURE_TYPE: vk::StructureType = vk::StructureType::$tag;
                const NAME: &'static str = stringify!($ty);

                #[allow(trivial_casts, clippy::unnecessary_cast)]
                fn next(&self) -> *mut c_void {
                    self.p_next as *mut c_void
                }

                fn set_next(&mut self, next: *mut c_void) {
                    self.p_next = next as _;
                }

                fn visit_fields(&self, visit: &mut dyn FnMut(u64)) {
                    $( visit(self.$field.field_bits()); )*
                }
            }
        )*

        const REGISTRY: &[StructureInfo] = &[
            $(
                StructureInfo {
                    structure_type: vk::StructureType::$tag,
                    size: std::mem::size_of::<vk::$ty>(),
                    name: stringify!($ty),
                },
            )*
        ];

        #[cfg(test)]
        fn registered_default_tags() -> Vec<(vk::StructureType, vk::StructureType)> {
            vec![ $( (vk::StructureType::$tag, vk::$ty::default().s_type), )* ]
        }
    };
}

extension_structures! {
    // Device features
    PhysicalDeviceMultiviewFeatures => PHYSICAL_DEVICE_MULTIVIEW_FEATURES {
        multiview, multiview_geometry_shader, multiview_tessellation_shader,
    },
    PhysicalDeviceShaderDrawParametersFeatures => PHYSICAL_DEVICE_SHADER_DRAW_PARAMETERS_FEATURES {
        shader_draw_parameters,
    },
    PhysicalDeviceSamplerYcbcrConversionFeatures => PHYSICAL_DEVICE_SAMPLER_YCBCR_CONVERSION_FEATURES {
        sampler_ycbcr_conversion,
    },
    PhysicalDeviceProtectedMemoryFeatures => PHYSICAL_DEVICE_PROTECTED_MEMORY_FEATURES {
        protected_memory,
    },
    PhysicalDeviceTimelineSemaphoreFeatures => PHYSICAL_DEVICE_TIMELINE_SEMAPHORE_FEATURES {
        timeline_semaphore,
    },
    PhysicalDeviceBufferDeviceAddressFeatures => PHYSICAL_DEVICE_BUFFER_DEVICE_ADDRESS_FEATURES {
        buffer_device_address,
        buffer_device_address_capture_replay,
        buffer_device_address_multi_device,
    },
    PhysicalDeviceDynamicRenderingFeatures => PHYSICAL_DEVICE_DYNAMIC_RENDERING_FEATURES {
        dynamic_rendering,
    },
    PhysicalDeviceSynchronization2Features => PHYSICAL_DEVICE_SYNCHRONIZATION_2_FEATURES {
        synchronization2,
    },
    PhysicalDeviceInlineUniformBlockFeatures => PHYSICAL_DEVICE_INLINE_UNIFORM_BLOCK_FEATURES {
        inline_uniform_block,
        descriptor_binding_inline_uniform_block_update_after_bind,
    },
    PhysicalDeviceAccelerationStructureFeaturesKHR => PHYSICAL_DEVICE_ACCELERATION_STRUCTURE_FEATURES_KHR {
        acceleration_structure,
        acceleration_structure_capture_replay,
        acceleration_structure_indirect_build,
        acceleration_structure_host_commands,
        descriptor_binding_acceleration_structure_update_after_bind,
    },
    PhysicalDeviceRayTracingPipelineFeaturesKHR => PHYSICAL_DEVICE_RAY_TRACING_PIPELINE_FEATURES_KHR {
        ray_tracing_pipeline,
        ray_tracing_pipeline_shader_group_handle_capture_replay,
        ray_tracing_pipeline_shader_group_handle_capture_replay_mixed,
        ray_tracing_pipeline_trace_rays_indirect,
        ray_traversal_primitive_culling,
    },

    // Pipeline state extensions
    PipelineRasterizationStateStreamCreateInfoEXT => PIPELINE_RASTERIZATION_STATE_STREAM_CREATE_INFO_EXT {
        flags, rasterization_stream,
    },
    PipelineRasterizationConservativeStateCreateInfoEXT => PIPELINE_RASTERIZATION_CONSERVATIVE_STATE_CREATE_INFO_EXT {
        flags, conservative_rasterization_mode, extra_primitive_overestimation_size,
    },
    PipelineRasterizationDepthClipStateCreateInfoEXT => PIPELINE_RASTERIZATION_DEPTH_CLIP_STATE_CREATE_INFO_EXT {
        flags, depth_clip_enable,
    },
    PipelineRasterizationLineStateCreateInfoEXT => PIPELINE_RASTERIZATION_LINE_STATE_CREATE_INFO_EXT {
        line_rasterization_mode, stippled_line_enable, line_stipple_factor, line_stipple_pattern,
    },
    PipelineRasterizationProvokingVertexStateCreateInfoEXT => PIPELINE_RASTERIZATION_PROVOKING_VERTEX_STATE_CREATE_INFO_EXT {
        provoking_vertex_mode,
    },
    PipelineColorBlendAdvancedStateCreateInfoEXT => PIPELINE_COLOR_BLEND_ADVANCED_STATE_CREATE_INFO_EXT {
        src_premultiplied, dst_premultiplied, blend_overlap,
    },
    PipelineTessellationDomainOriginStateCreateInfo => PIPELINE_TESSELLATION_DOMAIN_ORIGIN_STATE_CREATE_INFO {
        domain_origin,
    },

    // Object creation extensions
    SamplerReductionModeCreateInfo => SAMPLER_REDUCTION_MODE_CREATE_INFO {
        reduction_mode,
    },
    SamplerYcbcrConversionInfo => SAMPLER_YCBCR_CONVERSION_INFO {
        conversion,
    },
    ImageViewUsageCreateInfo => IMAGE_VIEW_USAGE_CREATE_INFO {
        usage,
    },
    MemoryAllocateFlagsInfo => MEMORY_ALLOCATE_FLAGS_INFO {
        flags, device_mask,
    },
    MemoryDedicatedAllocateInfo => MEMORY_DEDICATED_ALLOCATE_INFO {
        image, buffer,
    },
    DescriptorPoolInlineUniformBlockCreateInfo => DESCRIPTOR_POOL_INLINE_UNIFORM_BLOCK_CREATE_INFO {
        max_inline_uniform_block_bindings,
    },
}

/// Look up the registry entry of a structure type
pub fn info_of(structure_type: vk::StructureType) -> MagmaResult<&'static StructureInfo> {
    REGISTRY
        .iter()
        .find(|info| info.structure_type == structure_type)
        .ok_or(MagmaError::UnknownStructureType(structure_type))
}

/// Byte size of a registered structure type
pub fn size_of(structure_type: vk::StructureType) -> MagmaResult<usize> {
    info_of(structure_type).map(|info| info.size)
}

/// Rust name of a registered structure type
pub fn name_of(structure_type: vk::StructureType) -> MagmaResult<&'static str> {
    info_of(structure_type).map(|info| info.name)
}

/// All registered structure types
pub fn registered() -> &'static [StructureInfo] {
    REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registered_tags_match_defaults() {
        for (registered, from_default) in registered_default_tags() {
            assert_eq!(registered, from_default);
        }
    }

    #[test]
    fn test_registry_has_no_duplicates() {
        let unique: HashSet<_> = registered().iter().map(|info| info.structure_type).collect();
        assert_eq!(unique.len(), registered().len());
    }

    #[test]
    fn test_size_of_known_type() {
        assert_eq!(
            size_of(vk::StructureType::PHYSICAL_DEVICE_MULTIVIEW_FEATURES).unwrap(),
            std::mem::size_of::<vk::PhysicalDeviceMultiviewFeatures>()
        );
        assert_eq!(
            name_of(vk::StructureType::IMAGE_VIEW_USAGE_CREATE_INFO).unwrap(),
            "ImageViewUsageCreateInfo"
        );
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let result = size_of(vk::StructureType::APPLICATION_INFO);
        assert!(matches!(
            result,
            Err(MagmaError::UnknownStructureType(vk::StructureType::APPLICATION_INFO))
        ));
    }

    #[test]
    fn test_float_fields_hash_by_bits() {
        let mut info = vk::PipelineRasterizationConservativeStateCreateInfoEXT::default();
        info.extra_primitive_overestimation_size = 0.5;
        let mut bits = Vec::new();
        info.visit_fields(&mut |b| bits.push(b));
        assert_eq!(bits.len(), 3);
        assert_eq!(bits[2], u64::from(0.5f32.to_bits()));
    }
}
