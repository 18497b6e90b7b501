//! Resources referenced by descriptors
//!
//! Descriptors never own GPU memory; they copy the handles out of these small
//! value types. Images and buffers that should take part in layout tracking
//! or handle lookup are registered in a [`ResourceRegistry`].

pub mod registry;

use ash::vk;

pub use registry::{ImageState, ResourceEntry, ResourceKey, ResourceKind, ResourceRegistry};

/// An image view as seen by a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageView {
    /// View handle
    pub view: vk::ImageView,
    /// Format of the viewed image
    pub format: vk::Format,
    /// Layout the image will be in when the shader reads it, or `UNDEFINED`
    /// when only a later render pass decides it
    pub layout: vk::ImageLayout,
    /// Registry key of the viewed image, for layout validation
    pub image: Option<ResourceKey>,
}

impl ImageView {
    /// A view whose sampling layout is not known yet
    pub fn new(view: vk::ImageView, format: vk::Format) -> Self {
        Self { view, format, layout: vk::ImageLayout::UNDEFINED, image: None }
    }

    /// Set the layout the image will be in when read
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Attach the registry key of the viewed image
    pub fn with_image(mut self, image: ResourceKey) -> Self {
        self.image = Some(image);
        self
    }

    /// Whether the viewed format has a depth or stencil aspect
    pub fn is_depth_stencil(&self) -> bool {
        is_depth_stencil_format(self.format)
    }
}

/// A buffer range as seen by a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRange {
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Byte offset of the range
    pub offset: vk::DeviceSize,
    /// Byte length of the range, or `WHOLE_SIZE`
    pub range: vk::DeviceSize,
}

impl BufferRange {
    /// The whole buffer
    pub fn whole(buffer: vk::Buffer) -> Self {
        Self { buffer, offset: 0, range: vk::WHOLE_SIZE }
    }

    /// A sub-range of the buffer
    pub fn new(buffer: vk::Buffer, offset: vk::DeviceSize, range: vk::DeviceSize) -> Self {
        Self { buffer, offset, range }
    }
}

impl From<vk::Buffer> for BufferRange {
    fn from(buffer: vk::Buffer) -> Self {
        Self::whole(buffer)
    }
}

/// Whether `format` has a depth and/or stencil aspect
pub fn is_depth_stencil_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_depth_formats() {
        assert!(is_depth_stencil_format(vk::Format::D32_SFLOAT));
        assert!(is_depth_stencil_format(vk::Format::S8_UINT));
        assert!(!is_depth_stencil_format(vk::Format::R8G8B8A8_UNORM));
    }

    #[test]
    fn test_whole_buffer_range() {
        let range = BufferRange::from(vk::Buffer::from_raw(5));
        assert_eq!(range.offset, 0);
        assert_eq!(range.range, vk::WHOLE_SIZE);
    }
}
