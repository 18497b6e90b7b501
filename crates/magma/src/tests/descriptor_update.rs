//! Descriptor tables flowing through sets, the registry and the driver

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;

use crate::chain::StructureChain;
use crate::core::config::DescriptorConfig;
use crate::descriptor::{
    CombinedImageSampler, DescriptorPool, DescriptorSet, DescriptorSetTable, InlineUniformBlock, ReflectedBinding,
    UniformBuffer,
};
use crate::error::MagmaError;
use crate::resource::{BufferRange, ImageView, ResourceRegistry};
use crate::testing::{Call, RecordingDevice, StaticReflection};

crate::descriptor_set_table! {
    struct SceneTable {
        transforms: UniformBuffer = UniformBuffer::new(0),
        diffuse: CombinedImageSampler = CombinedImageSampler::new(1),
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tint {
    color: [f32; 4],
}

unsafe impl bytemuck::Pod for Tint {}
unsafe impl bytemuck::Zeroable for Tint {}

crate::descriptor_set_table! {
    struct TintTable {
        tint: InlineUniformBlock<Tint> = InlineUniformBlock::new(0),
    }
}

#[test]
fn test_scene_table_updates_once() {
    let device = Arc::new(RecordingDevice::new());
    let pool = Arc::new(DescriptorPool::new(Arc::clone(&device), &DescriptorConfig::default()).unwrap());
    let reflection = StaticReflection::new("main", vec![
        ReflectedBinding { set: 0, binding: 0, descriptor_type: vk::DescriptorType::UNIFORM_BUFFER, count: 1 },
        ReflectedBinding { set: 0, binding: 1, descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER, count: 1 },
    ]);
    let mut set = DescriptorSet::new(
        pool,
        SceneTable::new(),
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        0,
        Some((&reflection, "main")),
    )
    .unwrap();

    let mut registry = ResourceRegistry::new();
    let buffer = vk::Buffer::from_raw(0x100);
    registry.register_buffer(buffer, 256);
    let image = vk::Image::from_raw(0x200);
    let image_key = registry.register_image(
        image,
        vk::Format::R8G8B8A8_UNORM,
        vk::Extent3D { width: 512, height: 512, depth: 1 },
        vk::ImageLayout::UNDEFINED,
    );
    registry
        .schedule_layout_transition(image_key, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .unwrap();

    set.table_mut().transforms.set(BufferRange::new(buffer, 0, 256));
    set.table_mut().diffuse.set(
        &ImageView::new(vk::ImageView::from_raw(0x201), vk::Format::R8G8B8A8_UNORM).with_image(image_key),
        vk::Sampler::from_raw(0x300),
    );
    assert!(set.dirty());
    assert_eq!(set.table().dirty_count(), 2);

    assert_eq!(set.update(&registry).unwrap(), 2);
    assert!(!set.dirty());
    assert_eq!(set.update(&registry).unwrap(), 0);

    let calls = device.update_calls();
    assert_eq!(calls.len(), 1);
    let writes = &calls[0];
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].binding, 0);
    assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(writes[0].buffers, vec![(buffer, 0, 256)]);
    assert_eq!(writes[1].binding, 1);
    assert_eq!(writes[1].images, vec![(
        vk::Sampler::from_raw(0x300),
        vk::ImageView::from_raw(0x201),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    )]);
    assert_eq!(device.calls().into_iter().filter(|call| *call == Call::UpdateDescriptorSets).count(), 1);
}

#[test]
fn test_assumed_layout_without_transition_fails_update() {
    let device = Arc::new(RecordingDevice::new());
    let pool = Arc::new(DescriptorPool::new(Arc::clone(&device), &DescriptorConfig::default()).unwrap());
    let mut set =
        DescriptorSet::new(pool, SceneTable::new(), vk::ShaderStageFlags::FRAGMENT, 0, None).unwrap();

    let mut registry = ResourceRegistry::new();
    let image_key = registry.register_image(
        vk::Image::from_raw(0x200),
        vk::Format::D32_SFLOAT,
        vk::Extent3D { width: 64, height: 64, depth: 1 },
        vk::ImageLayout::UNDEFINED,
    );
    set.table_mut().diffuse.set(
        &ImageView::new(vk::ImageView::from_raw(0x201), vk::Format::D32_SFLOAT).with_image(image_key),
        vk::Sampler::from_raw(0x300),
    );

    let result = set.update(&registry);
    assert!(matches!(
        result,
        Err(MagmaError::LayoutNotTransitioned {
            binding: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        })
    ));
    assert!(set.dirty());
    assert!(device.update_calls().is_empty());

    registry
        .schedule_layout_transition(image_key, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
        .unwrap();
    registry.complete_layout_transition(image_key).unwrap();
    assert_eq!(set.update(&registry).unwrap(), 1);

    registry.unregister(image_key);
    set.table_mut().diffuse.set(
        &ImageView::new(vk::ImageView::from_raw(0x202), vk::Format::D32_SFLOAT).with_image(image_key),
        vk::Sampler::from_raw(0x300),
    );
    assert!(matches!(set.update(&registry), Err(MagmaError::ResourceNotFound { .. })));
}

#[test]
fn test_inline_uniform_block_through_pool_extension() {
    let device = Arc::new(RecordingDevice::new());
    let mut extensions = StructureChain::new();
    extensions.link_node(vk::DescriptorPoolInlineUniformBlockCreateInfo {
        max_inline_uniform_block_bindings: 1,
        ..Default::default()
    });
    let sizes = [vk::DescriptorPoolSize { ty: vk::DescriptorType::INLINE_UNIFORM_BLOCK, descriptor_count: 64 }];
    let pool = Arc::new(
        DescriptorPool::with_pool_sizes(Arc::clone(&device), &DescriptorConfig::default(), &sizes, &extensions)
            .unwrap(),
    );
    let mut set = DescriptorSet::new(pool, TintTable::new(), vk::ShaderStageFlags::FRAGMENT, 0, None).unwrap();

    let tint = Tint { color: [1.0, 0.5, 0.25, 1.0] };
    set.table_mut().tint.set(&tint).unwrap();
    assert_eq!(set.update(&ResourceRegistry::new()).unwrap(), 1);

    let write = &device.update_calls()[0][0];
    assert_eq!(write.descriptor_type, vk::DescriptorType::INLINE_UNIFORM_BLOCK);
    assert_eq!(write.count, 16);
    assert_eq!(write.inline_data, bytemuck::bytes_of(&tint));
    assert_eq!(device.created_layouts(), vec![vec![(0, vk::DescriptorType::INLINE_UNIFORM_BLOCK, 16)]]);

    set.table_mut().tint.set(&tint).unwrap();
    assert!(!set.dirty());
}
