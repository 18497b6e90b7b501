//! # Magma
//!
//! Thin, typed building blocks over `ash` for the parts of a Vulkan renderer
//! that are easy to get subtly wrong.
//!
//! ## Features
//!
//! - **Structure chains**: owned `pNext` chains that deep-copy and hash by content
//! - **Descriptors**: typed bindings that only write to the driver when they change
//! - **Descriptor sets**: layouts derived from a table and checked against shader reflection
//! - **Pipelines**: content-hashed pipeline cache with batched and background compilation
//! - **Resource registry**: handle lookup and image layout tracking without globals
//!
//! ## Quick Start
//!
//! ```ignore
//! use magma::prelude::*;
//!
//! descriptor_set_table! {
//!     pub struct FrameTable {
//!         pub camera: UniformBuffer = UniformBuffer::new(0),
//!         pub albedo: CombinedImageSampler = CombinedImageSampler::new(1),
//!     }
//! }
//!
//! let pool = Arc::new(DescriptorPool::new(device.clone(), &DescriptorConfig::default())?);
//! let mut set = DescriptorSet::new(pool, FrameTable::new(), vk::ShaderStageFlags::ALL_GRAPHICS, 0, None)?;
//! set.table_mut().camera.set(uniform_buffer);
//! set.table_mut().albedo.set(&texture_view, sampler);
//! set.update(&registry)?; // one vkUpdateDescriptorSets call
//! set.update(&registry)?; // nothing changed, no driver call
//!
//! let mut pipelines = GraphicsPipelineCache::new(device, vk::PipelineCache::null(), PipelineCacheConfig::default());
//! let pipeline = pipelines.lookup_pipeline(state)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod chain;
pub mod command;
pub mod config;
pub mod core;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod foundation;
pub mod pipeline;
pub mod resource;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;

pub use error::{MagmaError, MagmaResult, PipelineFailure, ReflectionError};

/// Common imports for users of the crate
pub mod prelude {
    pub use std::sync::Arc;

    pub use ash::vk;

    pub use crate::{
        chain::StructureChain,
        command::CommandBuffer,
        core::config::{DescriptorConfig, MagmaConfig, PipelineCacheConfig},
        descriptor::{
            BindableDescriptorSet, CombinedImageSampler, DescriptorPool, DescriptorSet, DescriptorSetTable,
            ImageDescriptorSet, InlineUniformBlock, SampledImage, Sampler, ShaderReflection, StorageBuffer,
            StorageImage, UniformBuffer,
        },
        descriptor_set_table,
        device::DeviceBackend,
        error::{MagmaError, MagmaResult},
        pipeline::{GraphicsPipelineCache, GraphicsPipelineState, PipelineBatch, ShaderStage},
        resource::{BufferRange, ImageView, ResourceRegistry},
    };
}
