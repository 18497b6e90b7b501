//! Batched pipeline creation
//!
//! A [`PipelineBatch`] collects pipeline requests and creates all of them
//! with one `vkCreateGraphicsPipelines` and one `vkCreateComputePipelines`
//! call, which lets the driver compile them together. Identical requests in
//! one batch are merged. When the driver fails part of a batch, the failed
//! entries can be re-issued one by one to find out which of them is at fault
//! while the rest of the batch is kept.

use std::sync::Arc;
use std::thread::JoinHandle;

use ash::vk;

use super::pipelines::{ComputePipeline, GraphicsPipeline};
use super::state::{ComputeCreateStorage, ComputePipelineState, GraphicsCreateStorage, GraphicsPipelineState};
use crate::core::config::PipelineCacheConfig;
use crate::device::{DeviceBackend, PipelineCreateResult};
use crate::error::{MagmaError, MagmaResult, PipelineFailure};

/// Pipeline a batched request derives from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BasePipeline {
    /// No base pipeline
    #[default]
    None,
    /// An existing pipeline created with `ALLOW_DERIVATIVES`
    Handle(vk::Pipeline),
    /// An earlier request of the same kind in the same batch
    Index(usize),
}

impl BasePipeline {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn raw(self) -> (vk::Pipeline, i32) {
        match self {
            Self::None => (vk::Pipeline::null(), -1),
            Self::Handle(handle) => (handle, -1),
            Self::Index(index) => (vk::Pipeline::null(), index as i32),
        }
    }
}

struct Request<S> {
    state: Arc<S>,
    hash: u64,
    flags: vk::PipelineCreateFlags,
    base: BasePipeline,
}

/// Pipelines produced by a batch, indexed like the requests
pub struct BuiltPipelines<D: DeviceBackend> {
    /// One entry per graphics request; `None` where compilation failed
    pub graphics: Vec<Option<Arc<GraphicsPipeline<D>>>>,
    /// One entry per compute request; `None` where compilation failed
    pub compute: Vec<Option<Arc<ComputePipeline<D>>>>,
    /// Failed requests. Compute requests are numbered after the graphics
    /// requests.
    pub failures: Vec<PipelineFailure>,
}

impl<D: DeviceBackend> BuiltPipelines<D> {
    fn empty() -> Self {
        Self { graphics: Vec::new(), compute: Vec::new(), failures: Vec::new() }
    }

    /// Whether every request compiled
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fail with every failing request if any request failed
    pub fn into_result(self) -> MagmaResult<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(MagmaError::PipelineBatch { failures: self.failures })
        }
    }
}

/// A batch of pipeline requests flushed in one driver call per kind
pub struct PipelineBatch<D: DeviceBackend> {
    device: Arc<D>,
    pipeline_cache: vk::PipelineCache,
    isolate_failures: bool,
    graphics: Vec<Request<GraphicsPipelineState>>,
    compute: Vec<Request<ComputePipelineState>>,
}

impl<D: DeviceBackend> PipelineBatch<D> {
    /// Empty batch compiling through `pipeline_cache` (may be null)
    pub fn new(device: Arc<D>, pipeline_cache: vk::PipelineCache) -> Self {
        Self::with_config(device, pipeline_cache, &PipelineCacheConfig::default())
    }

    /// Empty batch with explicit failure handling
    pub fn with_config(device: Arc<D>, pipeline_cache: vk::PipelineCache, config: &PipelineCacheConfig) -> Self {
        Self {
            device,
            pipeline_cache,
            isolate_failures: config.isolate_batch_failures,
            graphics: Vec::new(),
            compute: Vec::new(),
        }
    }

    /// Queue a graphics pipeline. Returns its index in the batch, which is
    /// the index of an identical earlier request if there is one, whatever
    /// base that request names.
    pub fn batch_graphics_pipeline(
        &mut self,
        state: impl Into<Arc<GraphicsPipelineState>>,
        flags: vk::PipelineCreateFlags,
        base: BasePipeline,
    ) -> MagmaResult<usize> {
        let state = state.into();
        let hash = state.content_hash();
        queue(&mut self.graphics, state, hash, flags, base)
    }

    /// Queue a compute pipeline. Returns its index among the compute
    /// requests of the batch.
    pub fn batch_compute_pipeline(
        &mut self,
        state: impl Into<Arc<ComputePipelineState>>,
        flags: vk::PipelineCreateFlags,
        base: BasePipeline,
    ) -> MagmaResult<usize> {
        let state = state.into();
        let hash = state.content_hash();
        queue(&mut self.compute, state, hash, flags, base)
    }

    /// Index of a queued graphics request with this state
    pub fn find_graphics(&self, state: &GraphicsPipelineState) -> Option<usize> {
        let hash = state.content_hash();
        self.graphics
            .iter()
            .position(|request| request.hash == hash && *request.state == *state)
    }

    /// Index of the first queued graphics request matching `predicate`
    pub(crate) fn position_graphics(&self, predicate: impl Fn(&GraphicsPipelineState) -> bool) -> Option<usize> {
        self.graphics.iter().position(|request| predicate(&request.state))
    }

    /// Number of queued graphics requests
    pub fn graphics_len(&self) -> usize {
        self.graphics.len()
    }

    /// Number of queued compute requests
    pub fn compute_len(&self) -> usize {
        self.compute.len()
    }

    /// Number of queued requests
    pub fn len(&self) -> usize {
        self.graphics.len() + self.compute.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create every queued pipeline and empty the batch.
    ///
    /// Requests the driver rejects are listed in
    /// [`BuiltPipelines::failures`]; everything else is returned even when
    /// part of the batch failed.
    pub fn build_pipelines(&mut self) -> BuiltPipelines<D> {
        let graphics = std::mem::take(&mut self.graphics);
        let compute = std::mem::take(&mut self.compute);
        if graphics.is_empty() && compute.is_empty() {
            return BuiltPipelines::empty();
        }
        log::debug!("Building {} graphics and {} compute pipeline(s)", graphics.len(), compute.len());

        let mut built = BuiltPipelines::empty();
        let (handles, failures) = self.create_graphics(&graphics);
        built.failures.extend(failures);
        built.graphics = handles
            .into_iter()
            .zip(&graphics)
            .map(|(handle, request)| {
                handle.map(|handle| {
                    Arc::new(GraphicsPipeline::new(
                        Arc::clone(&self.device),
                        handle,
                        request.hash,
                        request.flags,
                        Arc::clone(&request.state),
                    ))
                })
            })
            .collect();

        let (handles, failures) = self.create_compute(&compute);
        built.failures.extend(failures.into_iter().map(|failure| PipelineFailure {
            index: failure.index + graphics.len(),
            ..failure
        }));
        built.compute = handles
            .into_iter()
            .zip(&compute)
            .map(|(handle, request)| {
                handle.map(|handle| {
                    Arc::new(ComputePipeline::new(
                        Arc::clone(&self.device),
                        handle,
                        request.hash,
                        Arc::clone(&request.state),
                    ))
                })
            })
            .collect();

        for failure in &built.failures {
            log::error!(
                "Pipeline {} ({:#018x}) of the batch failed: {:?}",
                failure.index,
                failure.hash,
                failure.result
            );
        }
        built
    }

    /// Create every queued pipeline on a worker thread
    pub fn build_pipelines_async(mut self) -> PipelineBuildTask<D>
    where
        D: 'static,
    {
        let handle = std::thread::spawn(move || self.build_pipelines());
        PipelineBuildTask { handle }
    }

    fn create_graphics(
        &self,
        requests: &[Request<GraphicsPipelineState>],
    ) -> (Vec<Option<vk::Pipeline>>, Vec<PipelineFailure>) {
        if requests.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let storages: Vec<Box<GraphicsCreateStorage>> =
            requests.iter().map(|request| GraphicsCreateStorage::new(&request.state)).collect();
        let infos: Vec<vk::GraphicsPipelineCreateInfo> = requests
            .iter()
            .zip(&storages)
            .map(|(request, storage)| {
                let (base_handle, base_index) = request.base.raw();
                storage.create_info(&request.state, request.flags, base_handle, base_index)
            })
            .collect();

        let result = self.device.create_graphics_pipelines(self.pipeline_cache, &infos);
        self.resolve(requests, result, |index, base_handle| {
            let request = &requests[index];
            let flags = single_flags(request.flags, base_handle);
            let info = storages[index].create_info(&request.state, flags, base_handle, -1);
            self.device.create_graphics_pipelines(self.pipeline_cache, &[info])
        })
    }

    fn create_compute(
        &self,
        requests: &[Request<ComputePipelineState>],
    ) -> (Vec<Option<vk::Pipeline>>, Vec<PipelineFailure>) {
        if requests.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let storages: Vec<ComputeCreateStorage> =
            requests.iter().map(|request| ComputeCreateStorage::new(&request.state)).collect();
        let infos: Vec<vk::ComputePipelineCreateInfo> = requests
            .iter()
            .zip(&storages)
            .map(|(request, storage)| {
                let (base_handle, base_index) = request.base.raw();
                storage.create_info(&request.state, request.flags, base_handle, base_index)
            })
            .collect();

        let result = self.device.create_compute_pipelines(self.pipeline_cache, &infos);
        self.resolve(requests, result, |index, base_handle| {
            let request = &requests[index];
            let flags = single_flags(request.flags, base_handle);
            let info = storages[index].create_info(&request.state, flags, base_handle, -1);
            self.device.create_compute_pipelines(self.pipeline_cache, &[info])
        })
    }

    /// Turn the result of a batched call into per-request handles, re-issuing
    /// failed requests on their own if configured to
    fn resolve<S>(
        &self,
        requests: &[Request<S>],
        result: PipelineCreateResult,
        mut create_single: impl FnMut(usize, vk::Pipeline) -> PipelineCreateResult,
    ) -> (Vec<Option<vk::Pipeline>>, Vec<PipelineFailure>) {
        let (handles, batch_result) = match result {
            Ok(handles) => (handles, vk::Result::ERROR_UNKNOWN),
            Err((handles, code)) => (handles, code),
        };
        let retry = self.isolate_failures && requests.len() > 1;

        let mut resolved: Vec<Option<vk::Pipeline>> = Vec::with_capacity(requests.len());
        let mut failures = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            let handle = handles.get(index).copied().filter(|handle| *handle != vk::Pipeline::null());
            if handle.is_some() {
                resolved.push(handle);
                continue;
            }

            let outcome = if retry {
                log::warn!("Re-issuing pipeline {index} of the batch on its own after {batch_result:?}");
                let base_handle = match request.base {
                    BasePipeline::None => vk::Pipeline::null(),
                    BasePipeline::Handle(handle) => handle,
                    BasePipeline::Index(base) => {
                        resolved.get(base).copied().flatten().unwrap_or_else(vk::Pipeline::null)
                    }
                };
                match create_single(index, base_handle) {
                    Ok(single) => single
                        .first()
                        .copied()
                        .filter(|handle| *handle != vk::Pipeline::null())
                        .ok_or(vk::Result::ERROR_UNKNOWN),
                    Err((_, code)) => Err(code),
                }
            } else {
                Err(batch_result)
            };

            match outcome {
                Ok(handle) => resolved.push(Some(handle)),
                Err(result) => {
                    failures.push(PipelineFailure { index, hash: request.hash, result });
                    resolved.push(None);
                }
            }
        }
        (resolved, failures)
    }
}

/// Flags of a request re-issued on its own; a base that is no longer
/// available drops the derivative bit
fn single_flags(flags: vk::PipelineCreateFlags, base_handle: vk::Pipeline) -> vk::PipelineCreateFlags {
    if base_handle == vk::Pipeline::null() {
        flags & !vk::PipelineCreateFlags::DERIVATIVE
    } else {
        flags
    }
}

fn queue<S: PartialEq>(
    requests: &mut Vec<Request<S>>,
    state: Arc<S>,
    hash: u64,
    mut flags: vk::PipelineCreateFlags,
    base: BasePipeline,
) -> MagmaResult<usize> {
    // an identical state keeps the base it was first queued with
    if let Some(index) = requests.iter().position(|request| request.hash == hash && request.state == state) {
        requests[index].flags |= flags;
        log::trace!("Request {hash:#018x} already queued as {index}");
        return Ok(index);
    }

    match base {
        BasePipeline::None => {}
        BasePipeline::Handle(_) => flags |= vk::PipelineCreateFlags::DERIVATIVE,
        BasePipeline::Index(index) => {
            let base_request = requests.get_mut(index).ok_or_else(|| MagmaError::InvalidOperation {
                reason: format!("base pipeline index {index} is not an earlier request of the batch"),
            })?;
            base_request.flags |= vk::PipelineCreateFlags::ALLOW_DERIVATIVES;
            flags |= vk::PipelineCreateFlags::DERIVATIVE;
        }
    }
    requests.push(Request { state, hash, flags, base });
    Ok(requests.len() - 1)
}

/// Pipelines being built on a worker thread
pub struct PipelineBuildTask<D: DeviceBackend> {
    handle: JoinHandle<BuiltPipelines<D>>,
}

impl<D: DeviceBackend> PipelineBuildTask<D> {
    /// Whether the worker is done
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the pipelines are built
    pub fn wait(self) -> MagmaResult<BuiltPipelines<D>> {
        self.handle.join().map_err(|_| MagmaError::InvalidOperation {
            reason: "pipeline build thread panicked".to_string(),
        })
    }
}
