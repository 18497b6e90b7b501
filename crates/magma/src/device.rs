//! Driver seam
//!
//! Every Vulkan call the descriptor and pipeline subsystems make goes through
//! [`DeviceBackend`]. The production implementation forwards to
//! `ash::Device`; tests substitute a recording device so descriptor update
//! and pipeline batching can be observed without a GPU.

use ash::vk;

/// Result of a batched pipeline creation call: on failure, the handles that
/// did compile (null for the ones that did not) plus the failure code.
pub type PipelineCreateResult = Result<Vec<vk::Pipeline>, (Vec<vk::Pipeline>, vk::Result)>;

/// Device-level Vulkan entry points used by this crate
pub trait DeviceBackend: Send + Sync {
    /// `vkCreateDescriptorSetLayout`
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> Result<vk::DescriptorSetLayout, vk::Result>;

    /// `vkDestroyDescriptorSetLayout`
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    /// `vkCreateDescriptorPool`
    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> Result<vk::DescriptorPool, vk::Result>;

    /// `vkDestroyDescriptorPool`
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// `vkResetDescriptorPool`
    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<(), vk::Result>;

    /// `vkAllocateDescriptorSets`
    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> Result<Vec<vk::DescriptorSet>, vk::Result>;

    /// `vkFreeDescriptorSets`
    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> Result<(), vk::Result>;

    /// `vkUpdateDescriptorSets` without copies
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    /// `vkCreateGraphicsPipelines`
    fn create_graphics_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::GraphicsPipelineCreateInfo],
    ) -> PipelineCreateResult;

    /// `vkCreateComputePipelines`
    fn create_compute_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::ComputePipelineCreateInfo],
    ) -> PipelineCreateResult;

    /// `vkDestroyPipeline`
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// `vkCmdBindDescriptorSets`
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );

    /// `vkCmdBindPipeline`
    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
}

impl DeviceBackend for ash::Device {
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> Result<vk::DescriptorSetLayout, vk::Result> {
        unsafe { ash::Device::create_descriptor_set_layout(self, info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { ash::Device::destroy_descriptor_set_layout(self, layout, None) }
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> Result<vk::DescriptorPool, vk::Result> {
        unsafe { ash::Device::create_descriptor_pool(self, info, None) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { ash::Device::destroy_descriptor_pool(self, pool, None) }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<(), vk::Result> {
        unsafe { ash::Device::reset_descriptor_pool(self, pool, vk::DescriptorPoolResetFlags::empty()) }
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> Result<Vec<vk::DescriptorSet>, vk::Result> {
        unsafe { ash::Device::allocate_descriptor_sets(self, info) }
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> Result<(), vk::Result> {
        unsafe { ash::Device::free_descriptor_sets(self, pool, sets) }
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { ash::Device::update_descriptor_sets(self, writes, &[]) }
    }

    fn create_graphics_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::GraphicsPipelineCreateInfo],
    ) -> PipelineCreateResult {
        unsafe { ash::Device::create_graphics_pipelines(self, cache, infos, None) }
    }

    fn create_compute_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::ComputePipelineCreateInfo],
    ) -> PipelineCreateResult {
        unsafe { ash::Device::create_compute_pipelines(self, cache, infos, None) }
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { ash::Device::destroy_pipeline(self, pipeline, None) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            ash::Device::cmd_bind_descriptor_sets(
                self,
                command_buffer,
                bind_point,
                layout,
                first_set,
                sets,
                dynamic_offsets,
            );
        }
    }

    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { ash::Device::cmd_bind_pipeline(self, command_buffer, bind_point, pipeline) }
    }
}
