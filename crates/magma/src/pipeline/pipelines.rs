//! Compiled pipeline objects

use std::fmt;
use std::sync::Arc;

use ash::vk;

use super::state::{ComputePipelineState, GraphicsPipelineState};
use crate::device::DeviceBackend;

/// A compiled graphics pipeline and the state it was built from
pub struct GraphicsPipeline<D: DeviceBackend> {
    device: Arc<D>,
    handle: vk::Pipeline,
    hash: u64,
    flags: vk::PipelineCreateFlags,
    state: Arc<GraphicsPipelineState>,
}

impl<D: DeviceBackend> GraphicsPipeline<D> {
    pub(crate) fn new(
        device: Arc<D>,
        handle: vk::Pipeline,
        hash: u64,
        flags: vk::PipelineCreateFlags,
        state: Arc<GraphicsPipelineState>,
    ) -> Self {
        Self { device, handle, hash, flags, state }
    }

    /// Native handle
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    /// Content hash of the state
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Creation flags
    pub fn flags(&self) -> vk::PipelineCreateFlags {
        self.flags
    }

    /// Whether other pipelines may derive from this one
    pub fn allows_derivatives(&self) -> bool {
        self.flags.contains(vk::PipelineCreateFlags::ALLOW_DERIVATIVES)
    }

    /// State the pipeline was built from
    pub fn state(&self) -> &Arc<GraphicsPipelineState> {
        &self.state
    }
}

impl<D: DeviceBackend> Drop for GraphicsPipeline<D> {
    fn drop(&mut self) {
        log::trace!("Destroying graphics pipeline {:?}", self.handle);
        self.device.destroy_pipeline(self.handle);
    }
}

impl<D: DeviceBackend> fmt::Debug for GraphicsPipeline<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("handle", &self.handle)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// A compiled compute pipeline and the state it was built from
pub struct ComputePipeline<D: DeviceBackend> {
    device: Arc<D>,
    handle: vk::Pipeline,
    hash: u64,
    state: Arc<ComputePipelineState>,
}

impl<D: DeviceBackend> ComputePipeline<D> {
    pub(crate) fn new(device: Arc<D>, handle: vk::Pipeline, hash: u64, state: Arc<ComputePipelineState>) -> Self {
        Self { device, handle, hash, state }
    }

    /// Native handle
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    /// Content hash of the state
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// State the pipeline was built from
    pub fn state(&self) -> &Arc<ComputePipelineState> {
        &self.state
    }
}

impl<D: DeviceBackend> Drop for ComputePipeline<D> {
    fn drop(&mut self) {
        log::trace!("Destroying compute pipeline {:?}", self.handle);
        self.device.destroy_pipeline(self.handle);
    }
}

impl<D: DeviceBackend> fmt::Debug for ComputePipeline<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputePipeline")
            .field("handle", &self.handle)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .finish_non_exhaustive()
    }
}
