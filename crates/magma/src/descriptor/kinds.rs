//! Typed descriptors, one per Vulkan descriptor type
//!
//! Each wrapper fixes the descriptor type at construction, offers only the
//! assignments that make sense for it and derefs to the untyped
//! [`Descriptor`] for everything else.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use ash::vk;
use bytemuck::Pod;

use super::binding::Descriptor;
use crate::error::MagmaResult;
use crate::resource::{BufferRange, ImageView};

macro_rules! descriptor_kind {
    ($(#[$meta:meta])* $name:ident => $descriptor_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(Descriptor);

        impl $name {
            /// Single descriptor at `binding`
            pub fn new(binding: u32) -> Self {
                Self::array(binding, 1)
            }

            /// Array of `count` descriptors at `binding`
            pub fn array(binding: u32, count: u32) -> Self {
                Self(Descriptor::unset($descriptor_type, binding, count))
            }

            /// Restrict the binding to `stages`
            pub fn with_stages(mut self, stages: vk::ShaderStageFlags) -> Self {
                self.0.set_stage_flags(stages);
                self
            }
        }

        impl Deref for $name {
            type Target = Descriptor;

            fn deref(&self) -> &Descriptor {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Descriptor {
                &mut self.0
            }
        }
    };
}

/// Image views without a sampler
macro_rules! image_setters {
    ($($name:ident),*) => {$(
        impl $name {
            /// Assign the view to the first element
            pub fn set(&mut self, view: &ImageView) {
                let _ = self.0.set_image(0, view, vk::Sampler::null());
            }

            /// Assign the view to array element `index`
            pub fn set_at(&mut self, index: u32, view: &ImageView) -> MagmaResult<()> {
                self.0.set_image(index, view, vk::Sampler::null())
            }
        }
    )*};
}

macro_rules! buffer_setters {
    ($($name:ident),*) => {$(
        impl $name {
            /// Assign the buffer range to the first element
            pub fn set(&mut self, range: impl Into<BufferRange>) {
                let _ = self.0.set_buffer(0, range.into());
            }

            /// Assign the buffer range to array element `index`
            pub fn set_at(&mut self, index: u32, range: impl Into<BufferRange>) -> MagmaResult<()> {
                self.0.set_buffer(index, range.into())
            }
        }
    )*};
}

macro_rules! texel_buffer_setters {
    ($($name:ident),*) => {$(
        impl $name {
            /// Assign the buffer view to the first element
            pub fn set(&mut self, view: vk::BufferView) {
                let _ = self.0.set_texel_buffer_view(0, view);
            }

            /// Assign the buffer view to array element `index`
            pub fn set_at(&mut self, index: u32, view: vk::BufferView) -> MagmaResult<()> {
                self.0.set_texel_buffer_view(index, view)
            }
        }
    )*};
}

descriptor_kind!(
    /// Standalone sampler
    Sampler => vk::DescriptorType::SAMPLER
);
descriptor_kind!(
    /// Image view plus sampler
    CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER
);
descriptor_kind!(
    /// Image view sampled through a separate sampler
    SampledImage => vk::DescriptorType::SAMPLED_IMAGE
);
descriptor_kind!(
    /// Image view with load/store access
    StorageImage => vk::DescriptorType::STORAGE_IMAGE
);
descriptor_kind!(
    /// Subpass input
    InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT
);
descriptor_kind!(
    /// Formatted read-only buffer view
    UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER
);
descriptor_kind!(
    /// Formatted read/write buffer view
    StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER
);
descriptor_kind!(
    /// Uniform buffer
    UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER
);
descriptor_kind!(
    /// Shader storage buffer
    StorageBuffer => vk::DescriptorType::STORAGE_BUFFER
);
descriptor_kind!(
    /// Uniform buffer with an offset supplied at bind time
    DynamicUniformBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
);
descriptor_kind!(
    /// Storage buffer with an offset supplied at bind time
    DynamicStorageBuffer => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
);
descriptor_kind!(
    /// Ray tracing acceleration structure
    AccelerationStructure => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
);

image_setters!(SampledImage, StorageImage, InputAttachment);
buffer_setters!(UniformBuffer, StorageBuffer, DynamicUniformBuffer, DynamicStorageBuffer);
texel_buffer_setters!(UniformTexelBuffer, StorageTexelBuffer);

impl Sampler {
    /// Assign the sampler to the first element
    pub fn set(&mut self, sampler: vk::Sampler) {
        let _ = self.0.set_sampler(0, sampler);
    }

    /// Assign the sampler to array element `index`
    pub fn set_at(&mut self, index: u32, sampler: vk::Sampler) -> MagmaResult<()> {
        self.0.set_sampler(index, sampler)
    }
}

impl CombinedImageSampler {
    /// Assign the view and sampler to the first element
    pub fn set(&mut self, view: &ImageView, sampler: vk::Sampler) {
        let _ = self.0.set_image(0, view, sampler);
    }

    /// Assign the view and sampler to array element `index`
    pub fn set_at(&mut self, index: u32, view: &ImageView, sampler: vk::Sampler) -> MagmaResult<()> {
        self.0.set_image(index, view, sampler)
    }
}

impl AccelerationStructure {
    /// Assign the acceleration structure to the first element
    pub fn set(&mut self, acceleration_structure: vk::AccelerationStructureKHR) {
        let _ = self.0.set_acceleration_structure(0, acceleration_structure);
    }

    /// Assign the acceleration structure to array element `index`
    pub fn set_at(
        &mut self,
        index: u32,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> MagmaResult<()> {
        self.0.set_acceleration_structure(index, acceleration_structure)
    }
}

/// Uniform data stored directly in the descriptor set, sized for `T`
#[derive(Debug, Clone)]
pub struct InlineUniformBlock<T: Pod> {
    descriptor: Descriptor,
    _marker: PhantomData<T>,
}

impl<T: Pod> InlineUniformBlock<T> {
    /// Block size in bytes. Inline uniform data must be a non-empty multiple
    /// of four bytes, so other `T` fail to compile.
    #[allow(clippy::cast_possible_truncation)]
    pub const SIZE: u32 = {
        let size = std::mem::size_of::<T>();
        assert!(size > 0 && size % 4 == 0, "inline uniform blocks hold a non-empty multiple of 4 bytes");
        size as u32
    };

    /// Inline block at `binding` holding one `T`
    pub fn new(binding: u32) -> Self {
        Self {
            descriptor: Descriptor::unset(vk::DescriptorType::INLINE_UNIFORM_BLOCK, binding, Self::SIZE),
            _marker: PhantomData,
        }
    }

    /// Restrict the binding to `stages`
    pub fn with_stages(mut self, stages: vk::ShaderStageFlags) -> Self {
        self.descriptor.set_stage_flags(stages);
        self
    }

    /// Replace the block contents
    pub fn set(&mut self, value: &T) -> MagmaResult<()> {
        self.descriptor.set_inline_data(bytemuck::bytes_of(value))
    }
}

impl<T: Pod> Deref for InlineUniformBlock<T> {
    type Target = Descriptor;

    fn deref(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl<T: Pod> DerefMut for InlineUniformBlock<T> {
    fn deref_mut(&mut self) -> &mut Descriptor {
        &mut self.descriptor
    }
}
