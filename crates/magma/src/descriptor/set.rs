//! Descriptor sets bound to a table
//!
//! A [`DescriptorSet`] owns a [`DescriptorSetTable`], the layout derived from
//! it and the allocated set. [`DescriptorSet::update`] flushes every dirty
//! descriptor of the table in one driver call and does nothing when the table
//! is clean.

use std::sync::Arc;

use ash::vk;

use super::binding::Descriptor;
use super::kinds::CombinedImageSampler;
use super::layout::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
use super::reflection::{validate_bindings, ShaderReflection};
use super::table::DescriptorSetTable;
use crate::device::DeviceBackend;
use crate::error::{MagmaError, MagmaResult};
use crate::resource::{ImageView, ResourceRegistry};

/// A descriptor set that can take part in a combined update before binding
pub trait BindableDescriptorSet {
    /// Native set handle
    fn handle(&self) -> vk::DescriptorSet;

    /// Number of descriptors waiting to be written
    fn dirty_count(&self) -> usize;

    /// Fail if a dirty image descriptor assumed a layout its image will not
    /// be in
    fn validate_layouts(&self, registry: &ResourceRegistry) -> MagmaResult<()>;

    /// Append the writes of every dirty descriptor and mark them clean. The
    /// writes point into the set and are valid until it is next modified.
    fn collect_writes(&mut self, writes: &mut Vec<vk::WriteDescriptorSet>);
}

/// Check the assumed layouts of dirty descriptors against the registry
fn validate_assumed_layouts<'a>(
    descriptors: impl IntoIterator<Item = &'a Descriptor>,
    registry: &ResourceRegistry,
) -> MagmaResult<()> {
    for descriptor in descriptors.into_iter().filter(|descriptor| descriptor.is_dirty()) {
        for (image, layout) in descriptor.assumed_layouts() {
            if !registry.layout_satisfied(image, layout)? {
                return Err(MagmaError::LayoutNotTransitioned { binding: descriptor.binding(), layout });
            }
        }
    }
    Ok(())
}

/// A descriptor set allocated for a table
pub struct DescriptorSet<D: DeviceBackend, T: DescriptorSetTable> {
    table: T,
    handle: vk::DescriptorSet,
    set_index: u32,
    layout: Arc<DescriptorSetLayout<D>>,
    pool: Arc<DescriptorPool<D>>,
}

impl<D: DeviceBackend, T: DescriptorSetTable> DescriptorSet<D, T> {
    /// Allocate a set for `table` from `pool`.
    ///
    /// The layout is derived from the table, with bindings visible to
    /// `stage_flags` unless a descriptor names its own stages. When
    /// `reflection` names a shader and entry point, every table binding must
    /// exist in set `set_index` of that entry point with a matching type.
    pub fn new(
        pool: Arc<DescriptorPool<D>>,
        table: T,
        stage_flags: vk::ShaderStageFlags,
        set_index: u32,
        reflection: Option<(&dyn ShaderReflection, &str)>,
    ) -> MagmaResult<Self> {
        table.validate_unique_bindings()?;
        if let Some((reflection, entry_point)) = reflection {
            if pool.config().validate_reflection {
                validate_bindings(&table.descriptors(), reflection, entry_point, set_index)?;
            }
        }

        let layout = table
            .descriptors()
            .into_iter()
            .fold(DescriptorSetLayoutBuilder::new(), |builder, descriptor| {
                builder.add_descriptor(descriptor, stage_flags)
            })
            .build(Arc::clone(pool.device()))?;
        let handle = pool.allocate(&layout)?;
        log::debug!("Allocated descriptor set {:?} (set #{}) with {} bindings", handle, set_index, table.len());

        Ok(Self { table, handle, set_index, layout: Arc::new(layout), pool })
    }

    /// The bound table
    pub fn table(&self) -> &T {
        &self.table
    }

    /// The bound table, for assigning resources
    pub fn table_mut(&mut self) -> &mut T {
        &mut self.table
    }

    /// Set index this set was validated for
    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    /// Layout derived from the table
    pub fn layout(&self) -> &Arc<DescriptorSetLayout<D>> {
        &self.layout
    }

    /// Whether any descriptor changed since the last update
    pub fn dirty(&self) -> bool {
        self.table.dirty()
    }

    /// Write every dirty descriptor in one driver call.
    ///
    /// Image descriptors with an assumed layout are checked first: the
    /// registered image must be in that layout or have a transition to it
    /// recorded. Returns the number of descriptors written; zero means no
    /// driver call was made.
    pub fn update(&mut self, registry: &ResourceRegistry) -> MagmaResult<usize> {
        self.validate_layouts(registry)?;
        let mut writes = Vec::with_capacity(self.table.len());
        self.collect_writes(&mut writes);
        if writes.is_empty() {
            return Ok(0);
        }
        self.pool.device().update_descriptor_sets(&writes);
        log::trace!("Updated {} descriptor(s) of {:?}", writes.len(), self.handle);
        Ok(writes.len())
    }

    fn release(&mut self) {
        if self.handle == vk::DescriptorSet::null() {
            return;
        }
        if let Err(error) = self.pool.free(self.handle) {
            log::error!("Failed to free descriptor set {:?}: {}", self.handle, error);
        }
        self.handle = vk::DescriptorSet::null();
    }
}

impl<D: DeviceBackend, T: DescriptorSetTable> BindableDescriptorSet for DescriptorSet<D, T> {
    fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    fn dirty_count(&self) -> usize {
        self.table.dirty_count()
    }

    fn validate_layouts(&self, registry: &ResourceRegistry) -> MagmaResult<()> {
        validate_assumed_layouts(self.table.descriptors(), registry)
    }

    fn collect_writes(&mut self, writes: &mut Vec<vk::WriteDescriptorSet>) {
        let handle = self.handle;
        writes.extend(
            self.table
                .descriptors_mut()
                .into_iter()
                .filter(|descriptor| descriptor.is_dirty())
                .map(|descriptor| descriptor.write_descriptor(handle)),
        );
    }
}

impl<D: DeviceBackend, T: DescriptorSetTable> Drop for DescriptorSet<D, T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Table of an [`ImageDescriptorSet`]
#[derive(Debug, Clone)]
pub struct ImageTable {
    /// The single image binding
    pub image: CombinedImageSampler,
}

impl DescriptorSetTable for ImageTable {
    fn descriptors(&self) -> Vec<&Descriptor> {
        vec![&*self.image]
    }

    fn descriptors_mut(&mut self) -> Vec<&mut Descriptor> {
        vec![&mut *self.image]
    }
}

/// A set holding one combined image sampler whose binding is found in the
/// shader, for full screen passes and texture previews
pub struct ImageDescriptorSet<D: DeviceBackend> {
    set: DescriptorSet<D, ImageTable>,
}

impl<D: DeviceBackend> ImageDescriptorSet<D> {
    /// Find the first combined image sampler of set `set_index` in the first
    /// entry point of `reflection` and allocate a set for it
    pub fn new(
        pool: Arc<DescriptorPool<D>>,
        reflection: &dyn ShaderReflection,
        set_index: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> MagmaResult<Self> {
        let entry_point = reflection.entry_point_name(0).ok_or_else(|| MagmaError::InvalidOperation {
            reason: "shader has no entry point".to_string(),
        })?;
        let binding = reflection
            .enumerate_descriptor_bindings(entry_point)?
            .into_iter()
            .filter(|binding| binding.set == set_index)
            .filter(|binding| binding.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .map(|binding| binding.binding)
            .min()
            .ok_or_else(|| MagmaError::InvalidOperation {
                reason: format!("no combined image sampler in set #{set_index} of \"{entry_point}\""),
            })?;

        let table = ImageTable { image: CombinedImageSampler::new(binding) };
        let set = DescriptorSet::new(pool, table, stage_flags, set_index, Some((reflection, entry_point)))?;
        Ok(Self { set })
    }

    /// Binding index found in the shader
    pub fn binding(&self) -> u32 {
        self.set.table().image.binding()
    }

    /// Assign the image and sampler
    pub fn write_image(&mut self, view: &ImageView, sampler: vk::Sampler) {
        self.set.table_mut().image.set(view, sampler);
    }

    /// Flush the image binding if it changed
    pub fn update(&mut self, registry: &ResourceRegistry) -> MagmaResult<usize> {
        self.set.update(registry)
    }

    /// The underlying set
    pub fn descriptor_set(&self) -> &DescriptorSet<D, ImageTable> {
        &self.set
    }
}

impl<D: DeviceBackend> BindableDescriptorSet for ImageDescriptorSet<D> {
    fn handle(&self) -> vk::DescriptorSet {
        self.set.handle
    }

    fn dirty_count(&self) -> usize {
        self.set.dirty_count()
    }

    fn validate_layouts(&self, registry: &ResourceRegistry) -> MagmaResult<()> {
        self.set.validate_layouts(registry)
    }

    fn collect_writes(&mut self, writes: &mut Vec<vk::WriteDescriptorSet>) {
        self.set.collect_writes(writes);
    }
}
