//! In-memory doubles for the driver and the shader reflection provider

use std::collections::HashSet;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ash::vk;
use ash::vk::Handle;

use crate::descriptor::{ReflectedBinding, ShaderReflection};
use crate::device::{DeviceBackend, PipelineCreateResult};
use crate::error::ReflectionError;

/// Driver entry point that was called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    CreateDescriptorSetLayout,
    DestroyDescriptorSetLayout,
    CreateDescriptorPool,
    DestroyDescriptorPool,
    ResetDescriptorPool,
    AllocateDescriptorSets,
    FreeDescriptorSets,
    UpdateDescriptorSets,
    CreateGraphicsPipelines,
    CreateComputePipelines,
    DestroyPipeline,
    BindDescriptorSets,
    BindPipeline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedPool {
    pub max_sets: u32,
    pub flags: vk::DescriptorPoolCreateFlags,
    pub sizes: Vec<(vk::DescriptorType, u32)>,
    pub extensions: Vec<vk::StructureType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedWrite {
    pub dst_set: vk::DescriptorSet,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub images: Vec<(vk::Sampler, vk::ImageView, vk::ImageLayout)>,
    pub buffers: Vec<(vk::Buffer, vk::DeviceSize, vk::DeviceSize)>,
    pub texel_buffer_views: Vec<vk::BufferView>,
    pub acceleration_structures: Vec<vk::AccelerationStructureKHR>,
    pub inline_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedPipeline {
    pub handle: vk::Pipeline,
    pub flags: vk::PipelineCreateFlags,
    pub layout: vk::PipelineLayout,
    pub base_handle: vk::Pipeline,
    pub base_index: i32,
    pub entry_points: Vec<String>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub specialization_data: Vec<Vec<u8>>,
    pub rasterization_extensions: Vec<vk::StructureType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedBind {
    pub command_buffer: vk::CommandBuffer,
    pub bind_point: vk::PipelineBindPoint,
    pub layout: vk::PipelineLayout,
    pub first_set: u32,
    pub sets: Vec<vk::DescriptorSet>,
    pub dynamic_offsets: Vec<u32>,
}

#[derive(Default)]
struct Log {
    calls: Vec<Call>,
    layouts: Vec<Vec<(u32, vk::DescriptorType, u32)>>,
    destroyed_layouts: usize,
    pools: Vec<RecordedPool>,
    freed_sets: usize,
    updates: Vec<Vec<RecordedWrite>>,
    graphics: Vec<Vec<RecordedPipeline>>,
    compute: Vec<Vec<RecordedPipeline>>,
    destroyed_pipelines: Vec<vk::Pipeline>,
    binds: Vec<RecordedBind>,
    bound_pipelines: Vec<(vk::PipelineBindPoint, vk::Pipeline)>,
}

/// A [`DeviceBackend`] that hands out fresh fake handles and records every
/// call, copying out whatever the passed structures point to
pub(crate) struct RecordingDevice {
    next_handle: AtomicU64,
    failing_layouts: Mutex<HashSet<vk::PipelineLayout>>,
    log: Mutex<Log>,
}

/// Walk a `p_next` chain and collect the structure types
///
/// # Safety
/// `head` must be null or point to a valid chain of Vulkan structures.
unsafe fn chain_types(head: *const std::ffi::c_void) -> Vec<vk::StructureType> {
    let mut types = Vec::new();
    let mut node = head.cast::<vk::BaseInStructure>();
    while !node.is_null() {
        types.push((*node).s_type);
        node = (*node).p_next;
    }
    types
}

/// # Safety
/// `ptr` must be null or valid for `len` reads.
unsafe fn copy_slice<T: Copy>(ptr: *const T, len: u32) -> Vec<T> {
    if ptr.is_null() || len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(ptr, len as usize).to_vec()
    }
}

/// # Safety
/// `head` must be null or point to a valid chain of Vulkan structures.
unsafe fn find_in_chain(head: *const std::ffi::c_void, structure_type: vk::StructureType) -> *const std::ffi::c_void {
    let mut node = head.cast::<vk::BaseInStructure>();
    while !node.is_null() {
        if (*node).s_type == structure_type {
            return node.cast();
        }
        node = (*node).p_next;
    }
    std::ptr::null()
}

impl RecordingDevice {
    /// Result reported for pipelines whose layout was marked as failing
    pub const PIPELINE_FAILURE: vk::Result = vk::Result::ERROR_INITIALIZATION_FAILED;

    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(0x1000),
            failing_layouts: Mutex::new(HashSet::new()),
            log: Mutex::new(Log::default()),
        }
    }

    /// Make every pipeline created with `layout` fail to compile
    pub fn fail_pipelines_with_layout(&self, layout: vk::PipelineLayout) {
        self.failing_layouts.lock().unwrap().insert(layout);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn created_layouts(&self) -> Vec<Vec<(u32, vk::DescriptorType, u32)>> {
        self.log.lock().unwrap().layouts.clone()
    }

    pub fn destroyed_layout_count(&self) -> usize {
        self.log.lock().unwrap().destroyed_layouts
    }

    pub fn created_pools(&self) -> Vec<RecordedPool> {
        self.log.lock().unwrap().pools.clone()
    }

    pub fn freed_set_count(&self) -> usize {
        self.log.lock().unwrap().freed_sets
    }

    /// Writes of every `vkUpdateDescriptorSets` call, one entry per call
    pub fn update_calls(&self) -> Vec<Vec<RecordedWrite>> {
        self.log.lock().unwrap().updates.clone()
    }

    /// Requests of every `vkCreateGraphicsPipelines` call
    pub fn graphics_calls(&self) -> Vec<Vec<RecordedPipeline>> {
        self.log.lock().unwrap().graphics.clone()
    }

    /// Requests of every `vkCreateComputePipelines` call
    pub fn compute_calls(&self) -> Vec<Vec<RecordedPipeline>> {
        self.log.lock().unwrap().compute.clone()
    }

    pub fn destroyed_pipelines(&self) -> Vec<vk::Pipeline> {
        self.log.lock().unwrap().destroyed_pipelines.clone()
    }

    pub fn bind_calls(&self) -> Vec<RecordedBind> {
        self.log.lock().unwrap().binds.clone()
    }

    pub fn bound_pipelines(&self) -> Vec<(vk::PipelineBindPoint, vk::Pipeline)> {
        self.log.lock().unwrap().bound_pipelines.clone()
    }

    fn handle<H: Handle>(&self) -> H {
        H::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().calls.push(call);
    }

    /// Hand out a handle per request, null for the ones whose layout fails
    fn create_pipelines(&self, requests: &mut [RecordedPipeline]) -> PipelineCreateResult {
        let failing = self.failing_layouts.lock().unwrap();
        let mut failed = false;
        for request in requests.iter_mut() {
            if failing.contains(&request.layout) {
                failed = true;
            } else {
                request.handle = self.handle();
            }
        }
        let handles = requests.iter().map(|request| request.handle).collect();
        if failed {
            Err((handles, Self::PIPELINE_FAILURE))
        } else {
            Ok(handles)
        }
    }
}

/// # Safety
/// `stage` must be a valid shader stage create info.
unsafe fn stage_record(stage: &vk::PipelineShaderStageCreateInfo) -> (String, Vec<u8>) {
    let name = if stage.p_name.is_null() {
        String::new()
    } else {
        CStr::from_ptr(stage.p_name).to_string_lossy().into_owned()
    };
    let data = stage.p_specialization_info.as_ref().map_or_else(Vec::new, |info| {
        if info.p_data.is_null() {
            Vec::new()
        } else {
            std::slice::from_raw_parts(info.p_data.cast::<u8>(), info.data_size).to_vec()
        }
    });
    (name, data)
}

impl DeviceBackend for RecordingDevice {
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> Result<vk::DescriptorSetLayout, vk::Result> {
        self.record(Call::CreateDescriptorSetLayout);
        // SAFETY: the caller passes a valid create info
        let bindings = unsafe { copy_slice(info.p_bindings, info.binding_count) };
        self.log.lock().unwrap().layouts.push(
            bindings
                .iter()
                .map(|binding| (binding.binding, binding.descriptor_type, binding.descriptor_count))
                .collect(),
        );
        Ok(self.handle())
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.record(Call::DestroyDescriptorSetLayout);
        self.log.lock().unwrap().destroyed_layouts += 1;
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> Result<vk::DescriptorPool, vk::Result> {
        self.record(Call::CreateDescriptorPool);
        // SAFETY: the caller passes a valid create info
        let (sizes, extensions) = unsafe { (copy_slice(info.p_pool_sizes, info.pool_size_count), chain_types(info.p_next)) };
        self.log.lock().unwrap().pools.push(RecordedPool {
            max_sets: info.max_sets,
            flags: info.flags,
            sizes: sizes.iter().map(|size| (size.ty, size.descriptor_count)).collect(),
            extensions,
        });
        Ok(self.handle())
    }

    fn destroy_descriptor_pool(&self, _pool: vk::DescriptorPool) {
        self.record(Call::DestroyDescriptorPool);
    }

    fn reset_descriptor_pool(&self, _pool: vk::DescriptorPool) -> Result<(), vk::Result> {
        self.record(Call::ResetDescriptorPool);
        Ok(())
    }

    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo) -> Result<Vec<vk::DescriptorSet>, vk::Result> {
        self.record(Call::AllocateDescriptorSets);
        Ok((0..info.descriptor_set_count).map(|_| self.handle()).collect())
    }

    fn free_descriptor_sets(&self, _pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> Result<(), vk::Result> {
        self.record(Call::FreeDescriptorSets);
        self.log.lock().unwrap().freed_sets += sets.len();
        Ok(())
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        self.record(Call::UpdateDescriptorSets);
        let recorded = writes
            .iter()
            .map(|write| {
                // SAFETY: descriptor writes point at live info arrays and
                // extension structures for the duration of the call
                unsafe {
                    let count = write.descriptor_count;
                    let inline = find_in_chain(write.p_next, vk::StructureType::WRITE_DESCRIPTOR_SET_INLINE_UNIFORM_BLOCK)
                        .cast::<vk::WriteDescriptorSetInlineUniformBlock>();
                    let acceleration =
                        find_in_chain(write.p_next, vk::StructureType::WRITE_DESCRIPTOR_SET_ACCELERATION_STRUCTURE_KHR)
                            .cast::<vk::WriteDescriptorSetAccelerationStructureKHR>();
                    RecordedWrite {
                        dst_set: write.dst_set,
                        binding: write.dst_binding,
                        descriptor_type: write.descriptor_type,
                        count,
                        images: copy_slice(write.p_image_info, count)
                            .iter()
                            .map(|info| (info.sampler, info.image_view, info.image_layout))
                            .collect(),
                        buffers: copy_slice(write.p_buffer_info, count)
                            .iter()
                            .map(|info| (info.buffer, info.offset, info.range))
                            .collect(),
                        texel_buffer_views: copy_slice(write.p_texel_buffer_view, count),
                        acceleration_structures: acceleration.as_ref().map_or_else(Vec::new, |info| {
                            copy_slice(info.p_acceleration_structures, info.acceleration_structure_count)
                        }),
                        inline_data: inline.as_ref().map_or_else(Vec::new, |info| {
                            copy_slice(info.p_data.cast::<u8>(), info.data_size)
                        }),
                    }
                }
            })
            .collect();
        self.log.lock().unwrap().updates.push(recorded);
    }

    fn create_graphics_pipelines(
        &self,
        _cache: vk::PipelineCache,
        infos: &[vk::GraphicsPipelineCreateInfo],
    ) -> PipelineCreateResult {
        self.record(Call::CreateGraphicsPipelines);
        let mut requests: Vec<RecordedPipeline> = infos
            .iter()
            .map(|info| {
                // SAFETY: the caller passes valid create infos
                unsafe {
                    let (entry_points, specialization_data) =
                        copy_slice(info.p_stages, info.stage_count).iter().map(|stage| stage_record(stage)).unzip();
                    let dynamic_states = info
                        .p_dynamic_state
                        .as_ref()
                        .map_or_else(Vec::new, |dynamic| {
                            copy_slice(dynamic.p_dynamic_states, dynamic.dynamic_state_count)
                        });
                    let rasterization_extensions = info
                        .p_rasterization_state
                        .as_ref()
                        .map_or_else(Vec::new, |rasterization| chain_types(rasterization.p_next));
                    RecordedPipeline {
                        handle: vk::Pipeline::null(),
                        flags: info.flags,
                        layout: info.layout,
                        base_handle: info.base_pipeline_handle,
                        base_index: info.base_pipeline_index,
                        entry_points,
                        dynamic_states,
                        specialization_data,
                        rasterization_extensions,
                    }
                }
            })
            .collect();
        let result = self.create_pipelines(&mut requests);
        self.log.lock().unwrap().graphics.push(requests);
        result
    }

    fn create_compute_pipelines(
        &self,
        _cache: vk::PipelineCache,
        infos: &[vk::ComputePipelineCreateInfo],
    ) -> PipelineCreateResult {
        self.record(Call::CreateComputePipelines);
        let mut requests: Vec<RecordedPipeline> = infos
            .iter()
            .map(|info| {
                // SAFETY: the caller passes valid create infos
                let (entry_point, data) = unsafe { stage_record(&info.stage) };
                RecordedPipeline {
                    handle: vk::Pipeline::null(),
                    flags: info.flags,
                    layout: info.layout,
                    base_handle: info.base_pipeline_handle,
                    base_index: info.base_pipeline_index,
                    entry_points: vec![entry_point],
                    dynamic_states: Vec::new(),
                    specialization_data: vec![data],
                    rasterization_extensions: Vec::new(),
                }
            })
            .collect();
        let result = self.create_pipelines(&mut requests);
        self.log.lock().unwrap().compute.push(requests);
        result
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(Call::DestroyPipeline);
        self.log.lock().unwrap().destroyed_pipelines.push(pipeline);
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
        self.record(Call::BindDescriptorSets);
        self.log.lock().unwrap().binds.push(RecordedBind {
            command_buffer,
            bind_point,
            layout,
            first_set,
            sets: sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_bind_pipeline(&self, _command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline);
        self.log.lock().unwrap().bound_pipelines.push((bind_point, pipeline));
    }
}

/// Reflection data given up front
pub(crate) struct StaticReflection {
    entry_points: Vec<(String, Vec<ReflectedBinding>)>,
}

impl StaticReflection {
    pub fn new(entry_point: &str, bindings: Vec<ReflectedBinding>) -> Self {
        Self { entry_points: vec![(entry_point.to_string(), bindings)] }
    }

    pub fn with_entry_point(mut self, entry_point: &str, bindings: Vec<ReflectedBinding>) -> Self {
        self.entry_points.push((entry_point.to_string(), bindings));
        self
    }
}

impl ShaderReflection for StaticReflection {
    #[allow(clippy::cast_possible_truncation)]
    fn entry_point_count(&self) -> u32 {
        self.entry_points.len() as u32
    }

    fn entry_point_name(&self, index: u32) -> Option<&str> {
        self.entry_points.get(index as usize).map(|(name, _)| name.as_str())
    }

    fn enumerate_descriptor_bindings(&self, entry_point: &str) -> Result<Vec<ReflectedBinding>, ReflectionError> {
        self.entry_points
            .iter()
            .find(|(name, _)| name == entry_point)
            .map(|(_, bindings)| bindings.clone())
            .ok_or_else(|| ReflectionError::EntryPointNotFound { name: entry_point.to_string() })
    }
}
