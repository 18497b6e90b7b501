//! Untyped descriptor binding
//!
//! A [`Descriptor`] is one shader-visible binding slot: its binding index,
//! type, array size and the resources currently assigned to it. Assigning a
//! resource only marks the descriptor dirty when the stored value actually
//! changes, and [`Descriptor::write_descriptor`] is the one operation that
//! turns a dirty descriptor back to clean.

use std::ffi::c_void;
use std::fmt;

use ash::vk;

use crate::error::{MagmaError, MagmaResult};
use crate::resource::{BufferRange, ImageView, ResourceKey};

/// Flush state of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// The driver has seen the current value
    #[default]
    Clean,
    /// The value changed since the last write
    Dirty,
}

/// One array element of an image-backed descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageElement {
    /// Sampler handle, null unless the descriptor samples
    pub sampler: vk::Sampler,
    /// Image view handle, null for pure samplers
    pub view: vk::ImageView,
    /// Layout written to the driver
    pub layout: vk::ImageLayout,
    /// Whether `layout` was assumed because the caller left it undefined
    pub assumed_layout: bool,
    /// Registry key of the viewed image
    pub image: Option<ResourceKey>,
}

impl Default for ImageElement {
    fn default() -> Self {
        Self {
            sampler: vk::Sampler::null(),
            view: vk::ImageView::null(),
            layout: vk::ImageLayout::UNDEFINED,
            assumed_layout: false,
            image: None,
        }
    }
}

/// Resources assigned to a descriptor. The variant is fixed by the
/// descriptor type when the descriptor is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorPayload {
    /// Samplers, sampled/storage images and input attachments
    Image(Vec<ImageElement>),
    /// Uniform and storage buffers, dynamic or not
    Buffer(Vec<BufferRange>),
    /// Uniform and storage texel buffers
    TexelBufferView(Vec<vk::BufferView>),
    /// Ray tracing acceleration structures
    AccelerationStructure(Vec<vk::AccelerationStructureKHR>),
    /// Raw bytes of an inline uniform block
    InlineUniformBlock(Vec<u8>),
}

impl DescriptorPayload {
    /// Unset payload for `count` descriptors of `descriptor_type`, or `None`
    /// if the type is not supported
    fn unset(descriptor_type: vk::DescriptorType, count: u32) -> Option<Self> {
        let count = count as usize;
        let payload = match descriptor_type {
            vk::DescriptorType::SAMPLER
            | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::INPUT_ATTACHMENT => {
                Self::Image(vec![ImageElement::default(); count])
            }
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER | vk::DescriptorType::STORAGE_TEXEL_BUFFER => {
                Self::TexelBufferView(vec![vk::BufferView::null(); count])
            }
            vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => {
                Self::Buffer(vec![BufferRange::whole(vk::Buffer::null()); count])
            }
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => {
                Self::AccelerationStructure(vec![vk::AccelerationStructureKHR::null(); count])
            }
            vk::DescriptorType::INLINE_UNIFORM_BLOCK => Self::InlineUniformBlock(vec![0; count]),
            _ => return None,
        };
        Some(payload)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Buffer(_) => "buffer",
            Self::TexelBufferView(_) => "texel buffer",
            Self::AccelerationStructure(_) => "acceleration structure",
            Self::InlineUniformBlock(_) => "inline uniform block",
        }
    }
}

/// Extension structure chained to the last write of a descriptor
#[derive(Debug)]
enum WriteExtension {
    AccelerationStructure(vk::WriteDescriptorSetAccelerationStructureKHR),
    InlineUniformBlock(vk::WriteDescriptorSetInlineUniformBlock),
}

// SAFETY: the only pointers are into the payload of the descriptor that owns
// this extension, which is never shared while it is being written.
unsafe impl Send for WriteExtension {}
// SAFETY: see above; the structure is never written through a shared reference.
unsafe impl Sync for WriteExtension {}

impl WriteExtension {
    fn as_ptr(&self) -> *const c_void {
        match self {
            Self::AccelerationStructure(write) => std::ptr::addr_of!(*write).cast(),
            Self::InlineUniformBlock(write) => std::ptr::addr_of!(*write).cast(),
        }
    }
}

/// A shader-visible binding slot
pub struct Descriptor {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    descriptor_count: u32,
    stage_flags: vk::ShaderStageFlags,
    payload: DescriptorPayload,
    state: DirtyState,
    image_infos: Vec<vk::DescriptorImageInfo>,
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    extension: Option<Box<WriteExtension>>,
}

impl Descriptor {
    /// Create an unset descriptor. `count` is the array size, or the byte
    /// size for inline uniform blocks.
    pub fn new(descriptor_type: vk::DescriptorType, binding: u32, count: u32) -> MagmaResult<Self> {
        let count = count.max(1);
        let payload = DescriptorPayload::unset(descriptor_type, count).ok_or_else(|| {
            MagmaError::InvalidOperation {
                reason: format!("descriptor type {descriptor_type:?} is not supported"),
            }
        })?;
        Ok(Self::with_payload(descriptor_type, binding, count, payload))
    }

    pub(crate) fn with_payload(
        descriptor_type: vk::DescriptorType,
        binding: u32,
        descriptor_count: u32,
        payload: DescriptorPayload,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            descriptor_count,
            stage_flags: vk::ShaderStageFlags::empty(),
            payload,
            state: DirtyState::Clean,
            image_infos: Vec::new(),
            buffer_infos: Vec::new(),
            extension: None,
        }
    }

    /// Unset payload for a type the typed wrappers know to be supported
    pub(crate) fn unset(descriptor_type: vk::DescriptorType, binding: u32, count: u32) -> Self {
        let count = count.max(1);
        let payload = DescriptorPayload::unset(descriptor_type, count)
            .unwrap_or(DescriptorPayload::InlineUniformBlock(Vec::new()));
        Self::with_payload(descriptor_type, binding, count, payload)
    }

    /// Binding index
    pub fn binding(&self) -> u32 {
        self.binding
    }

    /// Vulkan descriptor type
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        self.descriptor_type
    }

    /// Array size, or byte size for inline uniform blocks
    pub fn descriptor_count(&self) -> u32 {
        self.descriptor_count
    }

    /// Stages this binding is visible to; empty means the stages of the set
    pub fn stage_flags(&self) -> vk::ShaderStageFlags {
        self.stage_flags
    }

    /// Restrict this binding to `stages` instead of the stages of the set
    pub fn set_stage_flags(&mut self, stages: vk::ShaderStageFlags) {
        self.stage_flags = stages;
    }

    /// Assigned resources
    pub fn payload(&self) -> &DescriptorPayload {
        &self.payload
    }

    /// Flush state
    pub fn state(&self) -> DirtyState {
        self.state
    }

    /// Whether the value changed since the last write
    pub fn is_dirty(&self) -> bool {
        self.state == DirtyState::Dirty
    }

    /// Layout binding for this descriptor, visible to `default_stages` unless
    /// the descriptor names its own stages
    pub fn layout_binding(&self, default_stages: vk::ShaderStageFlags) -> vk::DescriptorSetLayoutBinding {
        let stage_flags = if self.stage_flags.is_empty() { default_stages } else { self.stage_flags };
        vk::DescriptorSetLayoutBinding::builder()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.descriptor_count)
            .stage_flags(stage_flags)
            .build()
    }

    /// Assign a sampler to a sampler descriptor
    pub fn set_sampler(&mut self, index: u32, sampler: vk::Sampler) -> MagmaResult<()> {
        let element = ImageElement { sampler, ..ImageElement::default() };
        self.store_image(index, element)
    }

    /// Assign an image view, plus a sampler for combined image samplers.
    ///
    /// An undefined layout is replaced by the layout the image is expected to
    /// be in when the shader reads it: `GENERAL` for storage images,
    /// `DEPTH_STENCIL_READ_ONLY_OPTIMAL` for depth/stencil formats and
    /// `SHADER_READ_ONLY_OPTIMAL` otherwise. Such layouts are remembered as
    /// assumed and checked against the registry when the set is updated.
    pub fn set_image(&mut self, index: u32, view: &ImageView, sampler: vk::Sampler) -> MagmaResult<()> {
        if self.descriptor_type == vk::DescriptorType::SAMPLER {
            return Err(self.mismatch("an image view"));
        }
        let (layout, assumed_layout) = resolve_layout(self.descriptor_type, view);
        let sampler = if self.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER {
            sampler
        } else {
            vk::Sampler::null()
        };
        self.store_image(index, ImageElement { sampler, view: view.view, layout, assumed_layout, image: view.image })
    }

    /// Assign a buffer range
    pub fn set_buffer(&mut self, index: u32, range: BufferRange) -> MagmaResult<()> {
        let binding = self.binding;
        match &mut self.payload {
            DescriptorPayload::Buffer(elements) => {
                let changed = replace(element_mut(elements, index, binding)?, range);
                self.mark(changed);
                Ok(())
            }
            _ => Err(self.mismatch("a buffer")),
        }
    }

    /// Assign a texel buffer view
    pub fn set_texel_buffer_view(&mut self, index: u32, view: vk::BufferView) -> MagmaResult<()> {
        let binding = self.binding;
        match &mut self.payload {
            DescriptorPayload::TexelBufferView(elements) => {
                let changed = replace(element_mut(elements, index, binding)?, view);
                self.mark(changed);
                Ok(())
            }
            _ => Err(self.mismatch("a texel buffer view")),
        }
    }

    /// Assign an acceleration structure
    pub fn set_acceleration_structure(
        &mut self,
        index: u32,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> MagmaResult<()> {
        let binding = self.binding;
        match &mut self.payload {
            DescriptorPayload::AccelerationStructure(elements) => {
                let changed = replace(element_mut(elements, index, binding)?, acceleration_structure);
                self.mark(changed);
                Ok(())
            }
            _ => Err(self.mismatch("an acceleration structure")),
        }
    }

    /// Replace the contents of an inline uniform block; `data` must be
    /// exactly as long as the block
    pub fn set_inline_data(&mut self, data: &[u8]) -> MagmaResult<()> {
        let binding = self.binding;
        match &mut self.payload {
            DescriptorPayload::InlineUniformBlock(bytes) => {
                if bytes.len() != data.len() {
                    return Err(MagmaError::InvalidOperation {
                        reason: format!(
                            "binding #{binding} holds {} bytes, got {}",
                            bytes.len(),
                            data.len()
                        ),
                    });
                }
                let changed = bytes.as_slice() != data;
                if changed {
                    bytes.copy_from_slice(data);
                }
                self.mark(changed);
                Ok(())
            }
            _ => Err(self.mismatch("inline data")),
        }
    }

    /// Image layouts this descriptor assumed, with the registry key of the
    /// image each one applies to
    pub fn assumed_layouts(&self) -> impl Iterator<Item = (ResourceKey, vk::ImageLayout)> + '_ {
        let elements: &[ImageElement] = match &self.payload {
            DescriptorPayload::Image(elements) => elements.as_slice(),
            _ => &[],
        };
        elements
            .iter()
            .filter(|element| element.assumed_layout)
            .filter_map(|element| element.image.map(|image| (image, element.layout)))
    }

    /// Produce the driver write for this descriptor into `dst_set` and mark
    /// it clean.
    ///
    /// The returned structure points into this descriptor, which must stay
    /// alive and unmodified until the driver call that consumes the write.
    /// Calling this twice without a new assignment in between writes the same
    /// value again but the descriptor no longer reports itself dirty.
    pub fn write_descriptor(&mut self, dst_set: vk::DescriptorSet) -> vk::WriteDescriptorSet {
        let mut write = vk::WriteDescriptorSet {
            dst_set,
            dst_binding: self.binding,
            dst_array_element: 0,
            descriptor_count: self.descriptor_count,
            descriptor_type: self.descriptor_type,
            ..Default::default()
        };
        self.extension = None;
        match &self.payload {
            DescriptorPayload::Image(elements) => {
                self.image_infos = elements
                    .iter()
                    .map(|element| vk::DescriptorImageInfo {
                        sampler: element.sampler,
                        image_view: element.view,
                        image_layout: element.layout,
                    })
                    .collect();
                write.p_image_info = self.image_infos.as_ptr();
            }
            DescriptorPayload::Buffer(elements) => {
                self.buffer_infos = elements
                    .iter()
                    .map(|element| vk::DescriptorBufferInfo {
                        buffer: element.buffer,
                        offset: element.offset,
                        range: element.range,
                    })
                    .collect();
                write.p_buffer_info = self.buffer_infos.as_ptr();
            }
            DescriptorPayload::TexelBufferView(views) => {
                write.p_texel_buffer_view = views.as_ptr();
            }
            DescriptorPayload::AccelerationStructure(handles) => {
                let extension = Box::new(WriteExtension::AccelerationStructure(
                    vk::WriteDescriptorSetAccelerationStructureKHR {
                        acceleration_structure_count: self.descriptor_count,
                        p_acceleration_structures: handles.as_ptr(),
                        ..Default::default()
                    },
                ));
                write.p_next = extension.as_ptr();
                self.extension = Some(extension);
            }
            DescriptorPayload::InlineUniformBlock(bytes) => {
                let extension = Box::new(WriteExtension::InlineUniformBlock(
                    vk::WriteDescriptorSetInlineUniformBlock {
                        data_size: self.descriptor_count,
                        p_data: bytes.as_ptr().cast(),
                        ..Default::default()
                    },
                ));
                write.p_next = extension.as_ptr();
                self.extension = Some(extension);
            }
        }
        self.state = DirtyState::Clean;
        log::trace!(
            "Writing binding #{} ({:?} x{}) to {:?}",
            self.binding,
            self.descriptor_type,
            self.descriptor_count,
            dst_set
        );
        write
    }

    fn store_image(&mut self, index: u32, element: ImageElement) -> MagmaResult<()> {
        let binding = self.binding;
        match &mut self.payload {
            DescriptorPayload::Image(elements) => {
                let changed = replace(element_mut(elements, index, binding)?, element);
                self.mark(changed);
                Ok(())
            }
            _ => Err(self.mismatch("an image")),
        }
    }

    fn mark(&mut self, changed: bool) {
        if changed {
            self.state = DirtyState::Dirty;
        }
    }

    fn mismatch(&self, assigned: &str) -> MagmaError {
        MagmaError::InvalidOperation {
            reason: format!(
                "cannot assign {assigned} to binding #{} ({:?}, {} payload)",
                self.binding,
                self.descriptor_type,
                self.payload.kind()
            ),
        }
    }
}

impl Clone for Descriptor {
    /// The copy keeps the value and flush state but none of the write
    /// scratch buffers, which point into the original.
    fn clone(&self) -> Self {
        let mut copy =
            Self::with_payload(self.descriptor_type, self.binding, self.descriptor_count, self.payload.clone());
        copy.stage_flags = self.stage_flags;
        copy.state = self.state;
        copy
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("binding", &self.binding)
            .field("descriptor_type", &self.descriptor_type)
            .field("descriptor_count", &self.descriptor_count)
            .field("stage_flags", &self.stage_flags)
            .field("payload", &self.payload)
            .field("state", &self.state)
            .finish()
    }
}

/// Layout the driver should be told an image view is in
fn resolve_layout(descriptor_type: vk::DescriptorType, view: &ImageView) -> (vk::ImageLayout, bool) {
    if view.layout != vk::ImageLayout::UNDEFINED {
        (view.layout, false)
    } else if descriptor_type == vk::DescriptorType::STORAGE_IMAGE {
        (vk::ImageLayout::GENERAL, true)
    } else if view.is_depth_stencil() {
        (vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL, true)
    } else {
        (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, true)
    }
}

fn element_mut<T>(elements: &mut [T], index: u32, binding: u32) -> MagmaResult<&mut T> {
    let len = elements.len();
    elements.get_mut(index as usize).ok_or_else(|| MagmaError::InvalidOperation {
        reason: format!("array element {index} out of range for binding #{binding} of {len}"),
    })
}

/// Store `value` in `slot`; true if it differed
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
