//! Descriptor set layouts and pools
//!
//! RAII wrappers over `VkDescriptorSetLayout` and `VkDescriptorPool`. Both are
//! shared through `Arc` by the descriptor sets created from them and destroy
//! their handle when the last owner goes away.

use std::collections::HashSet;
use std::sync::Arc;

use ash::vk;

use super::binding::Descriptor;
use crate::chain::StructureChain;
use crate::core::config::DescriptorConfig;
use crate::device::DeviceBackend;
use crate::error::{MagmaError, MagmaResult};

/// Descriptor set layout builder for creating reusable layouts
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    flags: vk::DescriptorSetLayoutCreateFlags,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding of any type
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        descriptor_count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(descriptor_count)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add the binding a descriptor declares
    pub fn add_descriptor(self, descriptor: &Descriptor, default_stages: vk::ShaderStageFlags) -> Self {
        let binding = descriptor.layout_binding(default_stages);
        self.add_binding(binding.binding, binding.descriptor_type, binding.descriptor_count, binding.stage_flags)
    }

    /// Layout creation flags
    pub fn flags(mut self, flags: vk::DescriptorSetLayoutCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Build the descriptor set layout
    pub fn build<D: DeviceBackend>(self, device: Arc<D>) -> MagmaResult<DescriptorSetLayout<D>> {
        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if !seen.insert(binding.binding) {
                return Err(MagmaError::DuplicateBinding { binding: binding.binding });
            }
        }

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .flags(self.flags)
            .bindings(&self.bindings);

        let layout = device.create_descriptor_set_layout(&layout_info)?;
        log::debug!("Created descriptor set layout {:?} with {} bindings", layout, self.bindings.len());

        Ok(DescriptorSetLayout { layout, device, bindings: self.bindings })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout<D: DeviceBackend> {
    layout: vk::DescriptorSetLayout,
    device: Arc<D>,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl<D: DeviceBackend> DescriptorSetLayout<D> {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl<D: DeviceBackend> Drop for DescriptorSetLayout<D> {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.layout);
    }
}

/// Descriptor types every general purpose pool reserves space for
const POOLED_TYPES: [vk::DescriptorType; 11] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool<D: DeviceBackend> {
    pool: vk::DescriptorPool,
    device: Arc<D>,
    config: DescriptorConfig,
}

impl<D: DeviceBackend> DescriptorPool<D> {
    /// Create a pool with room for `config.descriptors_per_type` descriptors
    /// of every common type in each of `config.max_sets` sets
    pub fn new(device: Arc<D>, config: &DescriptorConfig) -> MagmaResult<Self> {
        let count = config.max_sets.saturating_mul(config.descriptors_per_type);
        let pool_sizes: Vec<vk::DescriptorPoolSize> = POOLED_TYPES
            .iter()
            .map(|&ty| vk::DescriptorPoolSize { ty, descriptor_count: count })
            .collect();
        Self::with_pool_sizes(device, config, &pool_sizes, &StructureChain::new())
    }

    /// Create a pool with explicit sizes. `extensions` is chained to the
    /// create info, e.g. the inline uniform block limits.
    pub fn with_pool_sizes(
        device: Arc<D>,
        config: &DescriptorConfig,
        pool_sizes: &[vk::DescriptorPoolSize],
        extensions: &StructureChain,
    ) -> MagmaResult<Self> {
        let flags = if config.free_descriptor_sets {
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET
        } else {
            vk::DescriptorPoolCreateFlags::empty()
        };
        let mut pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(flags)
            .max_sets(config.max_sets)
            .pool_sizes(pool_sizes)
            .build();
        pool_info.p_next = extensions.head_node();

        let pool = device.create_descriptor_pool(&pool_info)?;
        log::debug!("Created descriptor pool {:?} for {} sets", pool, config.max_sets);

        Ok(Self { pool, device, config: config.clone() })
    }

    /// Allocate descriptor sets from this pool
    pub fn allocate_descriptor_sets(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> MagmaResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        Ok(self.device.allocate_descriptor_sets(&alloc_info)?)
    }

    /// Allocate one set of `layout`
    pub fn allocate(&self, layout: &DescriptorSetLayout<D>) -> MagmaResult<vk::DescriptorSet> {
        self.allocate_descriptor_sets(&[layout.handle()])?
            .into_iter()
            .next()
            .ok_or(MagmaError::Api(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
    }

    /// Return a set to the pool, if the pool was created to allow it
    pub fn free(&self, set: vk::DescriptorSet) -> MagmaResult<()> {
        if !self.config.free_descriptor_sets {
            return Ok(());
        }
        Ok(self.device.free_descriptor_sets(self.pool, &[set])?)
    }

    /// Reset the descriptor pool (frees all allocated sets)
    pub fn reset(&self) -> MagmaResult<()> {
        Ok(self.device.reset_descriptor_pool(self.pool)?)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Configuration the pool was created with
    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    /// Device the pool belongs to
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }
}

impl<D: DeviceBackend> Drop for DescriptorPool<D> {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
    }
}
