//! Resource registry
//!
//! Maps native Vulkan handles back to the resources that own them, and
//! tracks image layouts so descriptors that assume a layout can be checked
//! against what the render passes actually schedule.
//!
//! The registry is an explicit object owned by whoever owns the device; keys
//! are generation-checked slot map keys, so a key that outlives its resource
//! resolves to nothing instead of to whatever reused the slot.

use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;
use slotmap::{new_key_type, SlotMap};

use crate::error::{MagmaError, MagmaResult};

new_key_type! {
    /// Generation-checked key of a registered resource
    pub struct ResourceKey;
}

/// Layout tracking of a registered image
#[derive(Debug, Clone, Copy)]
pub struct ImageState {
    /// Pixel format
    pub format: vk::Format,
    /// Extent in texels
    pub extent: vk::Extent3D,
    /// Layout the image is known to be in
    pub layout: vk::ImageLayout,
    /// Transition recorded but not yet executed
    pub pending_layout: Option<vk::ImageLayout>,
}

/// Kind-specific data of a registered resource
#[derive(Debug, Clone)]
pub enum ResourceKind {
    /// A buffer of the given size
    Buffer {
        /// Size in bytes
        size: vk::DeviceSize,
    },
    /// An image and its layout tracking
    Image(ImageState),
    /// A ray tracing acceleration structure
    AccelerationStructure,
}

/// One registered resource
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Raw native handle
    pub handle: u64,
    /// Kind-specific data
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HandleKind {
    Buffer,
    Image,
    AccelerationStructure,
}

/// Arena of live resources with O(1) handle lookup
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: SlotMap<ResourceKey, ResourceEntry>,
    by_handle: HashMap<(HandleKind, u64), ResourceKey>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer
    pub fn register_buffer(&mut self, buffer: vk::Buffer, size: vk::DeviceSize) -> ResourceKey {
        self.insert(HandleKind::Buffer, buffer.as_raw(), ResourceKind::Buffer { size })
    }

    /// Register an image in `layout`
    pub fn register_image(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent3D,
        layout: vk::ImageLayout,
    ) -> ResourceKey {
        self.insert(
            HandleKind::Image,
            image.as_raw(),
            ResourceKind::Image(ImageState { format, extent, layout, pending_layout: None }),
        )
    }

    /// Register an acceleration structure
    pub fn register_acceleration_structure(
        &mut self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> ResourceKey {
        self.insert(
            HandleKind::AccelerationStructure,
            acceleration_structure.as_raw(),
            ResourceKind::AccelerationStructure,
        )
    }

    fn insert(&mut self, kind: HandleKind, handle: u64, data: ResourceKind) -> ResourceKey {
        if let Some(stale) = self.by_handle.get(&(kind, handle)).copied() {
            log::warn!("Handle {handle:#x} registered twice, replacing the previous entry");
            self.resources.remove(stale);
        }
        let key = self.resources.insert(ResourceEntry { handle, kind: data });
        self.by_handle.insert((kind, handle), key);
        log::trace!("Registered {kind:?} {handle:#x} as {key:?}");
        key
    }

    /// Remove a resource; returns its entry if the key was live
    pub fn unregister(&mut self, key: ResourceKey) -> Option<ResourceEntry> {
        let entry = self.resources.remove(key)?;
        self.by_handle.retain(|_, value| *value != key);
        Some(entry)
    }

    /// Entry of a live key
    pub fn get(&self, key: ResourceKey) -> Option<&ResourceEntry> {
        self.resources.get(key)
    }

    /// Key owning a buffer handle
    pub fn find_buffer(&self, buffer: vk::Buffer) -> Option<ResourceKey> {
        self.by_handle.get(&(HandleKind::Buffer, buffer.as_raw())).copied()
    }

    /// Key owning an image handle
    pub fn find_image(&self, image: vk::Image) -> Option<ResourceKey> {
        self.by_handle.get(&(HandleKind::Image, image.as_raw())).copied()
    }

    /// Key owning an acceleration structure handle
    pub fn find_acceleration_structure(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> Option<ResourceKey> {
        self.by_handle
            .get(&(HandleKind::AccelerationStructure, acceleration_structure.as_raw()))
            .copied()
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Current layout of an image
    pub fn image_layout(&self, key: ResourceKey) -> MagmaResult<vk::ImageLayout> {
        Ok(self.image(key)?.layout)
    }

    /// Transition recorded for an image and not yet completed
    pub fn pending_layout(&self, key: ResourceKey) -> MagmaResult<Option<vk::ImageLayout>> {
        Ok(self.image(key)?.pending_layout)
    }

    /// Record that an image will be transitioned to `layout`, typically as
    /// the final layout of a render pass attachment.
    pub fn schedule_layout_transition(
        &mut self,
        key: ResourceKey,
        layout: vk::ImageLayout,
    ) -> MagmaResult<()> {
        self.image_mut(key)?.pending_layout = Some(layout);
        Ok(())
    }

    /// Consume the pending transition of an image, making it the current
    /// layout. Returns the layout that was applied, if any.
    pub fn complete_layout_transition(
        &mut self,
        key: ResourceKey,
    ) -> MagmaResult<Option<vk::ImageLayout>> {
        let image = self.image_mut(key)?;
        let applied = image.pending_layout.take();
        if let Some(layout) = applied {
            image.layout = layout;
        }
        Ok(applied)
    }

    /// Whether an image is in `layout` or has a transition to it recorded
    pub fn layout_satisfied(&self, key: ResourceKey, expected: vk::ImageLayout) -> MagmaResult<bool> {
        let image = self.image(key)?;
        Ok(image.layout == expected || image.pending_layout == Some(expected))
    }

    fn image(&self, key: ResourceKey) -> MagmaResult<&ImageState> {
        match self.resources.get(key) {
            Some(ResourceEntry { kind: ResourceKind::Image(image), .. }) => Ok(image),
            Some(_) => Err(MagmaError::InvalidOperation {
                reason: format!("{key:?} is not an image"),
            }),
            None => Err(MagmaError::ResourceNotFound { key: format!("{key:?}") }),
        }
    }

    fn image_mut(&mut self, key: ResourceKey) -> MagmaResult<&mut ImageState> {
        match self.resources.get_mut(key) {
            Some(ResourceEntry { kind: ResourceKind::Image(image), .. }) => Ok(image),
            Some(_) => Err(MagmaError::InvalidOperation {
                reason: format!("{key:?} is not an image"),
            }),
            None => Err(MagmaError::ResourceNotFound { key: format!("{key:?}") }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent() -> vk::Extent3D {
        vk::Extent3D { width: 512, height: 512, depth: 1 }
    }

    #[test]
    fn test_lookup_by_handle() {
        let mut registry = ResourceRegistry::new();
        let buffer = registry.register_buffer(vk::Buffer::from_raw(10), 256);
        let image = registry.register_image(
            vk::Image::from_raw(10),
            vk::Format::R8G8B8A8_UNORM,
            extent(),
            vk::ImageLayout::UNDEFINED,
        );

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_buffer(vk::Buffer::from_raw(10)), Some(buffer));
        assert_eq!(registry.find_image(vk::Image::from_raw(10)), Some(image));
        assert_eq!(registry.find_buffer(vk::Buffer::from_raw(11)), None);
        assert!(matches!(registry.get(buffer).unwrap().kind, ResourceKind::Buffer { size: 256 }));
    }

    #[test]
    fn test_stale_key_resolves_to_nothing() {
        let mut registry = ResourceRegistry::new();
        let key = registry.register_buffer(vk::Buffer::from_raw(1), 64);
        assert!(registry.unregister(key).is_some());

        let reused = registry.register_buffer(vk::Buffer::from_raw(2), 64);
        assert_ne!(key, reused);
        assert!(registry.get(key).is_none());
        assert!(registry.find_buffer(vk::Buffer::from_raw(1)).is_none());
        assert!(registry.unregister(key).is_none());
    }

    #[test]
    fn test_layout_transition_is_consumed_once() {
        let mut registry = ResourceRegistry::new();
        let key = registry.register_image(
            vk::Image::from_raw(3),
            vk::Format::R8G8B8A8_UNORM,
            extent(),
            vk::ImageLayout::UNDEFINED,
        );
        let target = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;

        assert!(!registry.layout_satisfied(key, target).unwrap());
        registry.schedule_layout_transition(key, target).unwrap();
        assert!(registry.layout_satisfied(key, target).unwrap());
        assert_eq!(registry.pending_layout(key).unwrap(), Some(target));

        assert_eq!(registry.complete_layout_transition(key).unwrap(), Some(target));
        assert_eq!(registry.complete_layout_transition(key).unwrap(), None);
        assert_eq!(registry.image_layout(key).unwrap(), target);
        assert!(registry.layout_satisfied(key, target).unwrap());
    }

    #[test]
    fn test_layout_queries_reject_buffers() {
        let mut registry = ResourceRegistry::new();
        let key = registry.register_buffer(vk::Buffer::from_raw(4), 16);
        assert!(matches!(
            registry.image_layout(key),
            Err(MagmaError::InvalidOperation { .. })
        ));
    }
}
