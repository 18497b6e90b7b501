//! Graphics pipeline cache
//!
//! Pipelines are keyed by the content hash of their full state. A lookup that
//! hits returns the cached pipeline without touching the driver. A miss
//! compiles the pipeline, deriving it from a cached pipeline that shares
//! either the fixed function state or the shader stages when one exists.
//! Misses can also be queued with [`GraphicsPipelineCache::batch_pipeline`]
//! and compiled together.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;

use super::batch::{BasePipeline, BuiltPipelines, PipelineBatch, PipelineBuildTask};
use super::pipelines::GraphicsPipeline;
use super::state::GraphicsPipelineState;
use crate::core::config::PipelineCacheConfig;
use crate::device::DeviceBackend;
use crate::error::{MagmaError, MagmaResult};

/// Content addressed store of graphics pipelines
pub struct GraphicsPipelineCache<D: DeviceBackend> {
    device: Arc<D>,
    pipeline_cache: vk::PipelineCache,
    config: PipelineCacheConfig,
    pipelines: HashMap<u64, Vec<Arc<GraphicsPipeline<D>>>>,
    base_pipelines_by_render_states: HashMap<u64, Arc<GraphicsPipeline<D>>>,
    base_pipelines_by_shader_stages: HashMap<u64, Arc<GraphicsPipeline<D>>>,
    pending: PipelineBatch<D>,
}

impl<D: DeviceBackend> GraphicsPipelineCache<D> {
    /// Empty cache compiling through `pipeline_cache` (may be null)
    pub fn new(device: Arc<D>, pipeline_cache: vk::PipelineCache, config: PipelineCacheConfig) -> Self {
        let pending = PipelineBatch::with_config(Arc::clone(&device), pipeline_cache, &config);
        Self {
            device,
            pipeline_cache,
            config,
            pipelines: HashMap::new(),
            base_pipelines_by_render_states: HashMap::new(),
            base_pipelines_by_shader_stages: HashMap::new(),
            pending,
        }
    }

    /// Cache configuration
    pub fn config(&self) -> &PipelineCacheConfig {
        &self.config
    }

    /// Return the pipeline for `state`, compiling it on a miss.
    ///
    /// A state already queued with [`batch_pipeline`](Self::batch_pipeline)
    /// flushes the queue instead of being compiled a second time.
    pub fn lookup_pipeline(
        &mut self,
        state: impl Into<Arc<GraphicsPipelineState>>,
    ) -> MagmaResult<Arc<GraphicsPipeline<D>>> {
        let state = state.into();
        if let Some(pipeline) = self.find(&state) {
            log::trace!("Pipeline cache hit for {:#018x}", pipeline.hash());
            return Ok(pipeline);
        }

        if self.pending.find_graphics(&state).is_some() {
            log::debug!(
                "Pipeline {:#018x} is queued, flushing {} request(s)",
                state.content_hash(),
                self.pending_count()
            );
            let built = self.pending.build_pipelines();
            self.insert_built(&built);
            if let Some(pipeline) = self.find(&state) {
                return Ok(pipeline);
            }
            built.into_result()?;
            return Err(MagmaError::Api(vk::Result::ERROR_UNKNOWN));
        }

        let base = self.base_pipeline(&state).map_or(BasePipeline::None, |base| BasePipeline::Handle(base.handle()));
        let mut batch = PipelineBatch::with_config(Arc::clone(&self.device), self.pipeline_cache, &self.config);
        batch.batch_graphics_pipeline(state, self.create_flags(), base)?;
        let built = batch.build_pipelines().into_result()?;
        self.insert_built(&built);
        built
            .graphics
            .into_iter()
            .flatten()
            .next()
            .ok_or(MagmaError::Api(vk::Result::ERROR_UNKNOWN))
    }

    /// Return the cached pipeline for `state`, or queue it for the next
    /// [`build_pipelines`](Self::build_pipelines) and return `None`
    pub fn batch_pipeline(
        &mut self,
        state: impl Into<Arc<GraphicsPipelineState>>,
    ) -> MagmaResult<Option<Arc<GraphicsPipeline<D>>>> {
        let state = state.into();
        if let Some(pipeline) = self.find(&state) {
            log::trace!("Pipeline cache hit for {:#018x}", pipeline.hash());
            return Ok(Some(pipeline));
        }
        if self.pending.find_graphics(&state).is_some() {
            return Ok(None);
        }

        let base = match self.base_pipeline(&state) {
            Some(base) => BasePipeline::Handle(base.handle()),
            None if self.config.allow_derivatives => {
                let render_state_hash = state.render_state_hash();
                let shader_stages_hash = state.shader_stages_hash();
                self.pending
                    .position_graphics(|queued| queued.render_state_hash() == render_state_hash)
                    .or_else(|| {
                        self.pending.position_graphics(|queued| queued.shader_stages_hash() == shader_stages_hash)
                    })
                    .map_or(BasePipeline::None, BasePipeline::Index)
            }
            None => BasePipeline::None,
        };
        let flags = self.create_flags();
        self.pending.batch_graphics_pipeline(state, flags, base)?;
        Ok(None)
    }

    /// Number of queued pipelines
    pub fn pending_count(&self) -> usize {
        self.pending.graphics_len()
    }

    /// Compile every queued pipeline in one driver call and cache the
    /// results. Pipelines that compiled are cached even when others failed.
    pub fn build_pipelines(&mut self) -> MagmaResult<Vec<Arc<GraphicsPipeline<D>>>> {
        let built = self.pending.build_pipelines();
        self.insert_built(&built);
        let built = built.into_result()?;
        Ok(built.graphics.into_iter().flatten().collect())
    }

    /// Compile every queued pipeline on a worker thread. Pass the result to
    /// [`insert_built`](Self::insert_built) to cache it.
    pub fn build_pipelines_async(&mut self) -> PipelineBuildTask<D>
    where
        D: 'static,
    {
        let fresh = PipelineBatch::with_config(Arc::clone(&self.device), self.pipeline_cache, &self.config);
        std::mem::replace(&mut self.pending, fresh).build_pipelines_async()
    }

    /// Cache every graphics pipeline of `built`. Returns how many were new.
    pub fn insert_built(&mut self, built: &BuiltPipelines<D>) -> usize {
        built
            .graphics
            .iter()
            .flatten()
            .filter(|pipeline| self.insert(Arc::clone(pipeline)))
            .count()
    }

    /// Number of cached pipelines
    pub fn len(&self) -> usize {
        self.pipelines.values().map(Vec::len).sum()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Drop every cached pipeline. Pipelines still referenced elsewhere stay
    /// alive until released.
    pub fn clear(&mut self) {
        log::debug!("Clearing {} cached pipeline(s)", self.len());
        self.pipelines.clear();
        self.base_pipelines_by_render_states.clear();
        self.base_pipelines_by_shader_stages.clear();
    }

    fn create_flags(&self) -> vk::PipelineCreateFlags {
        if self.config.allow_derivatives {
            vk::PipelineCreateFlags::ALLOW_DERIVATIVES
        } else {
            vk::PipelineCreateFlags::empty()
        }
    }

    fn find(&self, state: &GraphicsPipelineState) -> Option<Arc<GraphicsPipeline<D>>> {
        let verify = self.config.verify_state_on_hash_hit;
        self.pipelines
            .get(&state.content_hash())?
            .iter()
            .find(|pipeline| !verify || **pipeline.state() == *state)
            .cloned()
    }

    fn base_pipeline(&self, state: &GraphicsPipelineState) -> Option<&Arc<GraphicsPipeline<D>>> {
        if !self.config.allow_derivatives {
            return None;
        }
        self.base_pipelines_by_render_states
            .get(&state.render_state_hash())
            .or_else(|| self.base_pipelines_by_shader_stages.get(&state.shader_stages_hash()))
    }

    fn insert(&mut self, pipeline: Arc<GraphicsPipeline<D>>) -> bool {
        let entries = self.pipelines.entry(pipeline.hash()).or_default();
        if entries.iter().any(|cached| cached.handle() == pipeline.handle() || cached.state() == pipeline.state()) {
            return false;
        }
        if pipeline.allows_derivatives() {
            let state = pipeline.state();
            self.base_pipelines_by_render_states
                .entry(state.render_state_hash())
                .or_insert_with(|| Arc::clone(&pipeline));
            self.base_pipelines_by_shader_stages
                .entry(state.shader_stages_hash())
                .or_insert_with(|| Arc::clone(&pipeline));
        }
        log::debug!("Cached pipeline {:?} ({:#018x})", pipeline.handle(), pipeline.hash());
        entries.push(pipeline);
        true
    }
}
