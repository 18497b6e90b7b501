//! Descriptors, descriptor set tables and descriptor sets
//!
//! A [`Descriptor`] remembers the resources assigned to one binding and is
//! dirty only while that assignment differs from what was last written to
//! the driver. Typed wrappers such as [`UniformBuffer`] fix the descriptor
//! type. A [`DescriptorSetTable`] groups descriptors into the schema of one
//! set, and a [`DescriptorSet`] flushes a table's dirty descriptors in one
//! `vkUpdateDescriptorSets` call.

mod binding;
mod kinds;
mod layout;
mod reflection;
mod set;
mod table;

pub use binding::{Descriptor, DescriptorPayload, DirtyState, ImageElement};
pub use kinds::{
    AccelerationStructure, CombinedImageSampler, DynamicStorageBuffer, DynamicUniformBuffer, InlineUniformBlock,
    InputAttachment, SampledImage, Sampler, StorageBuffer, StorageImage, StorageTexelBuffer, UniformBuffer,
    UniformTexelBuffer,
};
pub use layout::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use reflection::{validate_bindings, ReflectedBinding, ShaderReflection};
pub use set::{BindableDescriptorSet, DescriptorSet, ImageDescriptorSet, ImageTable};
pub use table::DescriptorSetTable;
