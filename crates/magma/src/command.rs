//! Command buffer binding helpers
//!
//! Binding descriptor sets through [`CommandBuffer`] flushes whatever the
//! sets still have pending first, so a set is never bound with stale
//! contents. The writes of every set being bound go out in one
//! `vkUpdateDescriptorSets` call.

use std::sync::Arc;

use ash::vk;

use crate::descriptor::BindableDescriptorSet;
use crate::device::DeviceBackend;
use crate::error::MagmaResult;
use crate::pipeline::{ComputePipeline, GraphicsPipeline};
use crate::resource::ResourceRegistry;

/// A command buffer in the recording state
pub struct CommandBuffer<D: DeviceBackend> {
    device: Arc<D>,
    handle: vk::CommandBuffer,
}

impl<D: DeviceBackend> CommandBuffer<D> {
    /// Wrap a command buffer allocated elsewhere
    pub fn new(device: Arc<D>, handle: vk::CommandBuffer) -> Self {
        Self { device, handle }
    }

    /// Native handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Flush every pending descriptor of `sets`, then bind them starting at
    /// `first_set`.
    ///
    /// Layouts assumed by pending image descriptors are checked before
    /// anything is written; on failure nothing is updated or bound. Returns
    /// the number of descriptors written.
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &mut [&mut dyn BindableDescriptorSet],
        dynamic_offsets: &[u32],
        registry: &ResourceRegistry,
    ) -> MagmaResult<usize> {
        for set in sets.iter() {
            set.validate_layouts(registry)?;
        }

        let mut writes = Vec::with_capacity(sets.iter().map(|set| set.dirty_count()).sum());
        for set in sets.iter_mut() {
            set.collect_writes(&mut writes);
        }
        if !writes.is_empty() {
            log::trace!("Flushing {} descriptor(s) before binding {} set(s)", writes.len(), sets.len());
            self.device.update_descriptor_sets(&writes);
        }

        let handles: Vec<vk::DescriptorSet> = sets.iter().map(|set| set.handle()).collect();
        self.device
            .cmd_bind_descriptor_sets(self.handle, bind_point, layout, first_set, &handles, dynamic_offsets);
        Ok(writes.len())
    }

    /// Bind a graphics pipeline
    pub fn bind_graphics_pipeline(&self, pipeline: &GraphicsPipeline<D>) {
        self.device
            .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
    }

    /// Bind a compute pipeline
    pub fn bind_compute_pipeline(&self, pipeline: &ComputePipeline<D>) {
        self.device
            .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::COMPUTE, pipeline.handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DescriptorConfig;
    use crate::descriptor::{CombinedImageSampler, DescriptorPool, DescriptorSet, StorageBuffer, UniformBuffer};
    use crate::error::MagmaError;
    use crate::resource::ImageView;
    use crate::testing::{Call, RecordingDevice};
    use ash::vk::Handle;

    crate::descriptor_set_table! {
        struct GlobalTable {
            camera: UniformBuffer = UniformBuffer::new(0),
        }
    }

    crate::descriptor_set_table! {
        struct MaterialTable {
            albedo: CombinedImageSampler = CombinedImageSampler::new(0),
            params: StorageBuffer = StorageBuffer::new(1),
        }
    }

    fn pool(device: &Arc<RecordingDevice>) -> Arc<DescriptorPool<RecordingDevice>> {
        Arc::new(DescriptorPool::new(Arc::clone(device), &DescriptorConfig::default()).unwrap())
    }

    #[test]
    fn test_pending_writes_of_all_sets_flush_in_one_call() {
        let device = Arc::new(RecordingDevice::new());
        let pool = pool(&device);
        let stages = vk::ShaderStageFlags::ALL_GRAPHICS;
        let mut global = DescriptorSet::new(Arc::clone(&pool), GlobalTable::new(), stages, 0, None).unwrap();
        let mut material = DescriptorSet::new(Arc::clone(&pool), MaterialTable::new(), stages, 1, None).unwrap();

        global.table_mut().camera.set(vk::Buffer::from_raw(10));
        material.table_mut().params.set(vk::Buffer::from_raw(11));
        material.table_mut().albedo.set(
            &ImageView::new(vk::ImageView::from_raw(12), vk::Format::R8G8B8A8_UNORM),
            vk::Sampler::from_raw(13),
        );

        let registry = ResourceRegistry::new();
        let command_buffer = CommandBuffer::new(Arc::clone(&device), vk::CommandBuffer::from_raw(99));
        let written = command_buffer
            .bind_descriptor_sets(
                vk::PipelineBindPoint::GRAPHICS,
                vk::PipelineLayout::from_raw(5),
                0,
                &mut [&mut global, &mut material],
                &[],
                &registry,
            )
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(device.update_calls().len(), 1);
        assert_eq!(device.update_calls()[0].len(), 3);

        let binds = device.bind_calls();
        assert_eq!(binds.len(), 1);
        assert_eq!(binds[0].first_set, 0);
        assert_eq!(binds[0].sets, vec![BindableDescriptorSet::handle(&global), BindableDescriptorSet::handle(&material)]);

        // nothing pending: bind only
        let written = command_buffer
            .bind_descriptor_sets(
                vk::PipelineBindPoint::GRAPHICS,
                vk::PipelineLayout::from_raw(5),
                0,
                &mut [&mut global],
                &[],
                &registry,
            )
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(device.update_calls().len(), 1);
        assert_eq!(device.bind_calls().len(), 2);
    }

    #[test]
    fn test_unsatisfied_layout_blocks_binding() {
        let device = Arc::new(RecordingDevice::new());
        let pool = pool(&device);
        let mut material = DescriptorSet::new(
            Arc::clone(&pool),
            MaterialTable::new(),
            vk::ShaderStageFlags::FRAGMENT,
            0,
            None,
        )
        .unwrap();

        let mut registry = ResourceRegistry::new();
        let image = vk::Image::from_raw(40);
        let key = registry.register_image(
            image,
            vk::Format::R8G8B8A8_UNORM,
            vk::Extent3D { width: 4, height: 4, depth: 1 },
            vk::ImageLayout::UNDEFINED,
        );
        let view = ImageView::new(vk::ImageView::from_raw(41), vk::Format::R8G8B8A8_UNORM).with_image(key);
        material.table_mut().albedo.set(&view, vk::Sampler::from_raw(42));

        let command_buffer = CommandBuffer::new(Arc::clone(&device), vk::CommandBuffer::from_raw(99));
        let result = command_buffer.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            vk::PipelineLayout::from_raw(5),
            0,
            &mut [&mut material],
            &[],
            &registry,
        );
        assert!(matches!(result, Err(MagmaError::LayoutNotTransitioned { binding: 0, .. })));
        assert!(device.update_calls().is_empty());
        assert!(device.bind_calls().is_empty());

        registry
            .schedule_layout_transition(key, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .unwrap();
        let written = command_buffer
            .bind_descriptor_sets(
                vk::PipelineBindPoint::GRAPHICS,
                vk::PipelineLayout::from_raw(5),
                0,
                &mut [&mut material],
                &[],
                &registry,
            )
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            device.calls().into_iter().filter(|call| *call == Call::UpdateDescriptorSets).count(),
            1
        );
    }
}
