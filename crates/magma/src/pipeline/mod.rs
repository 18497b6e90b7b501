//! Pipeline state, batched creation and caching
//!
//! [`GraphicsPipelineState`] and [`ComputePipelineState`] describe a pipeline
//! by value and hash by content. [`PipelineBatch`] compiles many of them in
//! one driver call; [`GraphicsPipelineCache`] remembers what was compiled so
//! the same state is never compiled twice.

mod batch;
mod cache;
mod pipelines;
mod state;

pub use batch::{BasePipeline, BuiltPipelines, PipelineBatch, PipelineBuildTask};
pub use cache::GraphicsPipelineCache;
pub use pipelines::{ComputePipeline, GraphicsPipeline};
pub use state::{
    BlendEquation, ColorBlendAttachment, ColorBlendState, ComputePipelineState, DepthBias, DepthStencilState,
    GraphicsPipelineState, InputAssemblyState, MultisampleState, RasterizationState, ShaderStage, Specialization,
    SpecializationConstant, StencilFace, VertexAttribute, VertexBinding, VertexInputState, ViewportState,
};
