//! Pipeline state descriptions
//!
//! [`GraphicsPipelineState`] and [`ComputePipelineState`] describe everything
//! that goes into a pipeline as plain values that hash and compare by
//! content. Floating point members compare by bit pattern so that equal
//! hashes and equal states always agree. Shader stages are identified by a
//! hash of their SPIR-V rather than by module handle, so a module recreated
//! from the same bytecode still hits the cache.
//!
//! Viewports and scissors are always dynamic state.

use std::ffi::CString;
use std::hash::{Hash, Hasher};

use ash::vk;
use bytemuck::Pod;

use crate::chain::StructureChain;
use crate::error::{MagmaError, MagmaResult};
use crate::foundation::hash::{content_hash, f32_bits, hash_bytes};

/// Implement `PartialEq`, `Eq` and `Hash` through a `key()` method returning
/// a hashable tuple
macro_rules! eq_hash_by_key {
    ($($ty:ty),*) => {$(
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.key() == other.key()
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.key().hash(state);
            }
        }
    )*};
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn count(len: usize) -> u32 {
    len as u32
}

/// One specialization constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecializationConstant {
    /// `constant_id` in the shader
    pub constant_id: u32,
    /// Byte offset into the data block
    pub offset: u32,
    /// Byte size of the value
    pub size: usize,
}

/// Specialization constants of a shader stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Specialization {
    constants: Vec<SpecializationConstant>,
    data: Vec<u8>,
}

impl Specialization {
    /// No constants
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constant
    pub fn constant<T: Pod>(mut self, constant_id: u32, value: T) -> Self {
        let bytes = bytemuck::bytes_of(&value);
        self.constants.push(SpecializationConstant {
            constant_id,
            offset: count(self.data.len()),
            size: bytes.len(),
        });
        self.data.extend_from_slice(bytes);
        self
    }

    /// Constants in insertion order
    pub fn constants(&self) -> &[SpecializationConstant] {
        &self.constants
    }

    /// Packed constant values
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A shader stage of a pipeline
#[derive(Debug, Clone)]
pub struct ShaderStage {
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
    module_hash: u64,
    entry_point: CString,
    specialization: Option<Specialization>,
}

impl ShaderStage {
    /// Stage running `entry_point` of `module`, which was created from `spirv`
    pub fn new(
        stage: vk::ShaderStageFlags,
        module: vk::ShaderModule,
        spirv: &[u32],
        entry_point: &str,
    ) -> MagmaResult<Self> {
        Self::with_module_hash(stage, module, hash_bytes(bytemuck::cast_slice(spirv)), entry_point)
    }

    /// Stage whose bytecode hash is already known
    pub fn with_module_hash(
        stage: vk::ShaderStageFlags,
        module: vk::ShaderModule,
        module_hash: u64,
        entry_point: &str,
    ) -> MagmaResult<Self> {
        let entry_point = CString::new(entry_point).map_err(|_| MagmaError::InvalidOperation {
            reason: format!("entry point {entry_point:?} contains a NUL byte"),
        })?;
        Ok(Self { stage, module, module_hash, entry_point, specialization: None })
    }

    /// Attach specialization constants
    pub fn with_specialization(mut self, specialization: Specialization) -> Self {
        self.specialization = Some(specialization);
        self
    }

    /// Pipeline stage
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    /// Module handle
    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    /// Hash of the module bytecode
    pub fn module_hash(&self) -> u64 {
        self.module_hash
    }

    /// Entry point name
    pub fn entry_point(&self) -> &str {
        self.entry_point.to_str().unwrap_or_default()
    }

    /// Specialization constants
    pub fn specialization(&self) -> Option<&Specialization> {
        self.specialization.as_ref()
    }

    fn key(&self) -> (vk::ShaderStageFlags, u64, &CString, &Option<Specialization>) {
        (self.stage, self.module_hash, &self.entry_point, &self.specialization)
    }
}

/// Vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    /// Binding index
    pub binding: u32,
    /// Byte stride between elements
    pub stride: u32,
    /// Per-vertex or per-instance stepping
    pub input_rate: vk::VertexInputRate,
}

/// Vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Source binding
    pub binding: u32,
    /// Attribute format
    pub format: vk::Format,
    /// Byte offset inside an element
    pub offset: u32,
}

/// Vertex input bindings and attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexInputState {
    /// Buffer bindings
    pub bindings: Vec<VertexBinding>,
    /// Attributes
    pub attributes: Vec<VertexAttribute>,
}

/// Primitive assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputAssemblyState {
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Whether a special index restarts strips and fans
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self { topology: vk::PrimitiveTopology::TRIANGLE_LIST, primitive_restart: false }
    }
}

/// Viewport and scissor counts; their values are dynamic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportState {
    /// Number of viewports
    pub viewport_count: u32,
    /// Number of scissors
    pub scissor_count: u32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self { viewport_count: 1, scissor_count: 1 }
    }
}

/// Depth bias factors
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthBias {
    /// Constant depth offset
    pub constant_factor: f32,
    /// Maximum offset
    pub clamp: f32,
    /// Slope scaled offset
    pub slope_factor: f32,
}

impl DepthBias {
    fn key(&self) -> (u32, u32, u32) {
        (f32_bits(self.constant_factor), f32_bits(self.clamp), f32_bits(self.slope_factor))
    }
}

/// Rasterization state plus its extension chain
#[derive(Debug, Clone)]
pub struct RasterizationState {
    /// Clamp depth instead of clipping
    pub depth_clamp: bool,
    /// Discard primitives before rasterization
    pub rasterizer_discard: bool,
    /// Fill mode
    pub polygon_mode: vk::PolygonMode,
    /// Faces to cull
    pub cull_mode: vk::CullModeFlags,
    /// Winding of front faces
    pub front_face: vk::FrontFace,
    /// Depth bias, if enabled
    pub depth_bias: Option<DepthBias>,
    /// Line width
    pub line_width: f32,
    /// Extension structures chained to the rasterization state
    pub extensions: StructureChain,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            depth_clamp: false,
            rasterizer_discard: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias: None,
            line_width: 1.0,
            extensions: StructureChain::new(),
        }
    }
}

impl RasterizationState {
    #[allow(clippy::type_complexity)]
    fn key(
        &self,
    ) -> (bool, bool, vk::PolygonMode, vk::CullModeFlags, vk::FrontFace, Option<(u32, u32, u32)>, u32, &StructureChain)
    {
        (
            self.depth_clamp,
            self.rasterizer_discard,
            self.polygon_mode,
            self.cull_mode,
            self.front_face,
            self.depth_bias.as_ref().map(DepthBias::key),
            f32_bits(self.line_width),
            &self.extensions,
        )
    }
}

/// Multisampling
#[derive(Debug, Clone)]
pub struct MultisampleState {
    /// Samples per pixel
    pub samples: vk::SampleCountFlags,
    /// Minimum fraction of samples shaded, if sample shading is enabled
    pub min_sample_shading: Option<f32>,
    /// Sample mask words; empty means all samples
    pub sample_mask: Vec<u32>,
    /// Alpha to coverage
    pub alpha_to_coverage: bool,
    /// Alpha to one
    pub alpha_to_one: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            min_sample_shading: None,
            sample_mask: Vec::new(),
            alpha_to_coverage: false,
            alpha_to_one: false,
        }
    }
}

impl MultisampleState {
    fn key(&self) -> (vk::SampleCountFlags, Option<u32>, &[u32], bool, bool) {
        (
            self.samples,
            self.min_sample_shading.map(f32_bits),
            &self.sample_mask,
            self.alpha_to_coverage,
            self.alpha_to_one,
        )
    }
}

/// Stencil operations for one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFace {
    /// Action when the stencil test fails
    pub fail_op: vk::StencilOp,
    /// Action when both tests pass
    pub pass_op: vk::StencilOp,
    /// Action when only the depth test fails
    pub depth_fail_op: vk::StencilOp,
    /// Stencil comparison
    pub compare_op: vk::CompareOp,
    /// Bits compared
    pub compare_mask: u32,
    /// Bits written
    pub write_mask: u32,
    /// Reference value
    pub reference: u32,
}

impl StencilFace {
    fn to_vk(self) -> vk::StencilOpState {
        vk::StencilOpState {
            fail_op: self.fail_op,
            pass_op: self.pass_op,
            depth_fail_op: self.depth_fail_op,
            compare_op: self.compare_op,
            compare_mask: self.compare_mask,
            write_mask: self.write_mask,
            reference: self.reference,
        }
    }
}

/// Depth and stencil testing
#[derive(Debug, Clone, Copy)]
pub struct DepthStencilState {
    /// Depth test
    pub depth_test: bool,
    /// Depth writes
    pub depth_write: bool,
    /// Depth comparison
    pub depth_compare_op: vk::CompareOp,
    /// Depth bounds `(min, max)`, if the bounds test is enabled
    pub depth_bounds: Option<(f32, f32)>,
    /// Front and back stencil faces, if the stencil test is enabled
    pub stencil: Option<(StencilFace, StencilFace)>,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            depth_bounds: None,
            stencil: None,
        }
    }
}

impl DepthStencilState {
    /// Depth testing and writing disabled
    pub fn disabled() -> Self {
        Self { depth_test: false, depth_write: false, ..Self::default() }
    }

    fn key(&self) -> (bool, bool, vk::CompareOp, Option<(u32, u32)>, Option<(StencilFace, StencilFace)>) {
        (
            self.depth_test,
            self.depth_write,
            self.depth_compare_op,
            self.depth_bounds.map(|(min, max)| (f32_bits(min), f32_bits(max))),
            self.stencil,
        )
    }
}

/// Blend factors and operations of one attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendEquation {
    /// Source color factor
    pub src_color: vk::BlendFactor,
    /// Destination color factor
    pub dst_color: vk::BlendFactor,
    /// Color operation
    pub color_op: vk::BlendOp,
    /// Source alpha factor
    pub src_alpha: vk::BlendFactor,
    /// Destination alpha factor
    pub dst_alpha: vk::BlendFactor,
    /// Alpha operation
    pub alpha_op: vk::BlendOp,
}

impl BlendEquation {
    /// Classic `src * a + dst * (1 - a)` blending
    pub fn alpha() -> Self {
        Self {
            src_color: vk::BlendFactor::SRC_ALPHA,
            dst_color: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_op: vk::BlendOp::ADD,
            src_alpha: vk::BlendFactor::ONE,
            dst_alpha: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
        }
    }
}

/// Blending of one color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorBlendAttachment {
    /// Blend equation, or `None` to write the color unchanged
    pub blend: Option<BlendEquation>,
    /// Components written
    pub write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend: None,
            write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
        }
    }
}

impl ColorBlendAttachment {
    fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        let mut state = vk::PipelineColorBlendAttachmentState {
            color_write_mask: self.write_mask,
            ..Default::default()
        };
        if let Some(blend) = self.blend {
            state.blend_enable = vk::TRUE;
            state.src_color_blend_factor = blend.src_color;
            state.dst_color_blend_factor = blend.dst_color;
            state.color_blend_op = blend.color_op;
            state.src_alpha_blend_factor = blend.src_alpha;
            state.dst_alpha_blend_factor = blend.dst_alpha;
            state.alpha_blend_op = blend.alpha_op;
        }
        state
    }
}

/// Color blending plus its extension chain
#[derive(Debug, Clone)]
pub struct ColorBlendState {
    /// Logic operation, if enabled
    pub logic_op: Option<vk::LogicOp>,
    /// One entry per color attachment of the subpass
    pub attachments: Vec<ColorBlendAttachment>,
    /// Blend constants
    pub blend_constants: [f32; 4],
    /// Extension structures chained to the color blend state
    pub extensions: StructureChain,
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            logic_op: None,
            attachments: vec![ColorBlendAttachment::default()],
            blend_constants: [0.0; 4],
            extensions: StructureChain::new(),
        }
    }
}

impl ColorBlendState {
    fn key(&self) -> (Option<vk::LogicOp>, &[ColorBlendAttachment], [u32; 4], &StructureChain) {
        (self.logic_op, &self.attachments, self.blend_constants.map(f32_bits), &self.extensions)
    }
}

eq_hash_by_key!(ShaderStage, RasterizationState, MultisampleState, DepthStencilState, ColorBlendState);

/// Complete state of a graphics pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineState {
    /// Shader stages
    pub stages: Vec<ShaderStage>,
    /// Vertex input
    pub vertex_input: VertexInputState,
    /// Input assembly
    pub input_assembly: InputAssemblyState,
    /// Patch control points, for tessellation pipelines
    pub tessellation_patch_points: Option<u32>,
    /// Viewport and scissor counts
    pub viewport: ViewportState,
    /// Rasterization
    pub rasterization: RasterizationState,
    /// Multisampling
    pub multisample: MultisampleState,
    /// Depth and stencil testing
    pub depth_stencil: DepthStencilState,
    /// Color blending
    pub color_blend: ColorBlendState,
    /// Dynamic states besides viewport and scissor
    pub dynamic_states: Vec<vk::DynamicState>,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Render pass the pipeline is used in
    pub render_pass: vk::RenderPass,
    /// Subpass index
    pub subpass: u32,
}

impl GraphicsPipelineState {
    /// Default fixed function state for `stages`
    pub fn new(stages: Vec<ShaderStage>, layout: vk::PipelineLayout, render_pass: vk::RenderPass, subpass: u32) -> Self {
        Self {
            stages,
            vertex_input: VertexInputState::default(),
            input_assembly: InputAssemblyState::default(),
            tessellation_patch_points: None,
            viewport: ViewportState::default(),
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: DepthStencilState::default(),
            color_blend: ColorBlendState::default(),
            dynamic_states: Vec::new(),
            layout,
            render_pass,
            subpass,
        }
    }

    /// Replace the vertex input
    pub fn with_vertex_input(mut self, vertex_input: VertexInputState) -> Self {
        self.vertex_input = vertex_input;
        self
    }

    /// Replace the input assembly
    pub fn with_input_assembly(mut self, input_assembly: InputAssemblyState) -> Self {
        self.input_assembly = input_assembly;
        self
    }

    /// Enable tessellation with `patch_points` control points per patch
    pub fn with_tessellation(mut self, patch_points: u32) -> Self {
        self.tessellation_patch_points = Some(patch_points);
        self
    }

    /// Replace the rasterization state
    pub fn with_rasterization(mut self, rasterization: RasterizationState) -> Self {
        self.rasterization = rasterization;
        self
    }

    /// Replace the multisample state
    pub fn with_multisample(mut self, multisample: MultisampleState) -> Self {
        self.multisample = multisample;
        self
    }

    /// Replace the depth/stencil state
    pub fn with_depth_stencil(mut self, depth_stencil: DepthStencilState) -> Self {
        self.depth_stencil = depth_stencil;
        self
    }

    /// Replace the color blend state
    pub fn with_color_blend(mut self, color_blend: ColorBlendState) -> Self {
        self.color_blend = color_blend;
        self
    }

    /// Replace the extra dynamic states
    pub fn with_dynamic_states(mut self, dynamic_states: Vec<vk::DynamicState>) -> Self {
        self.dynamic_states = dynamic_states;
        self
    }

    /// Hash of the complete state
    pub fn content_hash(&self) -> u64 {
        content_hash(self)
    }

    /// Hash of everything except the shader stages. Pipelines sharing it
    /// differ only in their shaders.
    pub fn render_state_hash(&self) -> u64 {
        content_hash(&(
            &self.vertex_input,
            &self.input_assembly,
            &self.tessellation_patch_points,
            &self.viewport,
            &self.rasterization,
            &self.multisample,
            &self.depth_stencil,
            &self.color_blend,
            &self.dynamic_states,
            self.layout,
            self.render_pass,
            self.subpass,
        ))
    }

    /// Hash of the shader stages and layout. Pipelines sharing it differ only
    /// in fixed function state.
    pub fn shader_stages_hash(&self) -> u64 {
        content_hash(&(&self.stages, self.layout))
    }
}

/// Complete state of a compute pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineState {
    /// The compute stage
    pub stage: ShaderStage,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
}

impl ComputePipelineState {
    /// Compute pipeline running `stage`
    pub fn new(stage: ShaderStage, layout: vk::PipelineLayout) -> Self {
        Self { stage, layout }
    }

    /// Hash of the complete state
    pub fn content_hash(&self) -> u64 {
        content_hash(self)
    }
}

/// Specialization infos of a list of stages
struct SpecializationStorage {
    // Targets of `p_map_entries`
    _entries: Vec<Vec<vk::SpecializationMapEntry>>,
    infos: Vec<Option<vk::SpecializationInfo>>,
}

impl SpecializationStorage {
    fn new<'a>(stages: impl Iterator<Item = &'a ShaderStage>) -> Self {
        let specializations: Vec<Option<&Specialization>> = stages.map(ShaderStage::specialization).collect();
        let entries: Vec<Vec<vk::SpecializationMapEntry>> = specializations
            .iter()
            .map(|specialization| {
                specialization.map_or_else(Vec::new, |specialization| {
                    specialization
                        .constants
                        .iter()
                        .map(|constant| vk::SpecializationMapEntry {
                            constant_id: constant.constant_id,
                            offset: constant.offset,
                            size: constant.size,
                        })
                        .collect()
                })
            })
            .collect();
        let infos = specializations
            .iter()
            .zip(&entries)
            .map(|(specialization, entries)| {
                specialization.map(|specialization| vk::SpecializationInfo {
                    map_entry_count: count(entries.len()),
                    p_map_entries: entries.as_ptr(),
                    data_size: specialization.data.len(),
                    p_data: specialization.data.as_ptr().cast(),
                })
            })
            .collect();
        Self { _entries: entries, infos }
    }

    fn stage_info(&self, index: usize, stage: &ShaderStage) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo {
            stage: stage.stage,
            module: stage.module,
            p_name: stage.entry_point.as_ptr(),
            p_specialization_info: self.infos[index]
                .as_ref()
                .map_or(std::ptr::null(), |info| std::ptr::addr_of!(*info)),
            ..Default::default()
        }
    }
}

/// Owned sub-structures of a `VkGraphicsPipelineCreateInfo`. The create info
/// points into this storage and into the state it was built from; both must
/// outlive the driver call.
pub(crate) struct GraphicsCreateStorage {
    specializations: SpecializationStorage,
    stages: Vec<vk::PipelineShaderStageCreateInfo>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    vertex_input: vk::PipelineVertexInputStateCreateInfo,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo,
    tessellation: vk::PipelineTessellationStateCreateInfo,
    viewport: vk::PipelineViewportStateCreateInfo,
    rasterization: vk::PipelineRasterizationStateCreateInfo,
    multisample: vk::PipelineMultisampleStateCreateInfo,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo,
    blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    color_blend: vk::PipelineColorBlendStateCreateInfo,
    dynamic_states: Vec<vk::DynamicState>,
    dynamic: vk::PipelineDynamicStateCreateInfo,
}

impl GraphicsCreateStorage {
    pub(crate) fn new(state: &GraphicsPipelineState) -> Box<Self> {
        let specializations = SpecializationStorage::new(state.stages.iter());
        let mut dynamic_states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        dynamic_states.extend(
            state
                .dynamic_states
                .iter()
                .filter(|dynamic| !matches!(**dynamic, vk::DynamicState::VIEWPORT | vk::DynamicState::SCISSOR)),
        );

        let mut storage = Box::new(Self {
            specializations,
            stages: Vec::new(),
            vertex_bindings: state
                .vertex_input
                .bindings
                .iter()
                .map(|binding| vk::VertexInputBindingDescription {
                    binding: binding.binding,
                    stride: binding.stride,
                    input_rate: binding.input_rate,
                })
                .collect(),
            vertex_attributes: state
                .vertex_input
                .attributes
                .iter()
                .map(|attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: attribute.binding,
                    format: attribute.format,
                    offset: attribute.offset,
                })
                .collect(),
            vertex_input: vk::PipelineVertexInputStateCreateInfo::default(),
            input_assembly: vk::PipelineInputAssemblyStateCreateInfo {
                topology: state.input_assembly.topology,
                primitive_restart_enable: vk::Bool32::from(state.input_assembly.primitive_restart),
                ..Default::default()
            },
            tessellation: vk::PipelineTessellationStateCreateInfo {
                patch_control_points: state.tessellation_patch_points.unwrap_or(0),
                ..Default::default()
            },
            viewport: vk::PipelineViewportStateCreateInfo {
                viewport_count: state.viewport.viewport_count,
                scissor_count: state.viewport.scissor_count,
                ..Default::default()
            },
            rasterization: rasterization_info(&state.rasterization),
            multisample: vk::PipelineMultisampleStateCreateInfo::default(),
            depth_stencil: depth_stencil_info(&state.depth_stencil),
            blend_attachments: state.color_blend.attachments.iter().map(|a| a.to_vk()).collect(),
            color_blend: vk::PipelineColorBlendStateCreateInfo::default(),
            dynamic_states,
            dynamic: vk::PipelineDynamicStateCreateInfo::default(),
        });

        let s = &mut *storage;
        s.stages = state
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| s.specializations.stage_info(index, stage))
            .collect();
        s.vertex_input = vk::PipelineVertexInputStateCreateInfo {
            vertex_binding_description_count: count(s.vertex_bindings.len()),
            p_vertex_binding_descriptions: s.vertex_bindings.as_ptr(),
            vertex_attribute_description_count: count(s.vertex_attributes.len()),
            p_vertex_attribute_descriptions: s.vertex_attributes.as_ptr(),
            ..Default::default()
        };
        s.multisample = multisample_info(&state.multisample);
        s.color_blend = vk::PipelineColorBlendStateCreateInfo {
            p_next: state.color_blend.extensions.head_node(),
            logic_op_enable: vk::Bool32::from(state.color_blend.logic_op.is_some()),
            logic_op: state.color_blend.logic_op.unwrap_or(vk::LogicOp::COPY),
            attachment_count: count(s.blend_attachments.len()),
            p_attachments: s.blend_attachments.as_ptr(),
            blend_constants: state.color_blend.blend_constants,
            ..Default::default()
        };
        s.dynamic = vk::PipelineDynamicStateCreateInfo {
            dynamic_state_count: count(s.dynamic_states.len()),
            p_dynamic_states: s.dynamic_states.as_ptr(),
            ..Default::default()
        };
        storage
    }

    /// Create info for `state`, which must be the state this storage was
    /// built from
    pub(crate) fn create_info(
        &self,
        state: &GraphicsPipelineState,
        flags: vk::PipelineCreateFlags,
        base_pipeline_handle: vk::Pipeline,
        base_pipeline_index: i32,
    ) -> vk::GraphicsPipelineCreateInfo {
        vk::GraphicsPipelineCreateInfo {
            flags,
            stage_count: count(self.stages.len()),
            p_stages: self.stages.as_ptr(),
            p_vertex_input_state: &self.vertex_input,
            p_input_assembly_state: &self.input_assembly,
            p_tessellation_state: if state.tessellation_patch_points.is_some() {
                &self.tessellation
            } else {
                std::ptr::null()
            },
            p_viewport_state: &self.viewport,
            p_rasterization_state: &self.rasterization,
            p_multisample_state: &self.multisample,
            p_depth_stencil_state: &self.depth_stencil,
            p_color_blend_state: &self.color_blend,
            p_dynamic_state: &self.dynamic,
            layout: state.layout,
            render_pass: state.render_pass,
            subpass: state.subpass,
            base_pipeline_handle,
            base_pipeline_index,
            ..Default::default()
        }
    }
}

fn rasterization_info(state: &RasterizationState) -> vk::PipelineRasterizationStateCreateInfo {
    let bias = state.depth_bias.unwrap_or_default();
    vk::PipelineRasterizationStateCreateInfo {
        p_next: state.extensions.head_node(),
        depth_clamp_enable: vk::Bool32::from(state.depth_clamp),
        rasterizer_discard_enable: vk::Bool32::from(state.rasterizer_discard),
        polygon_mode: state.polygon_mode,
        cull_mode: state.cull_mode,
        front_face: state.front_face,
        depth_bias_enable: vk::Bool32::from(state.depth_bias.is_some()),
        depth_bias_constant_factor: bias.constant_factor,
        depth_bias_clamp: bias.clamp,
        depth_bias_slope_factor: bias.slope_factor,
        line_width: state.line_width,
        ..Default::default()
    }
}

fn multisample_info(state: &MultisampleState) -> vk::PipelineMultisampleStateCreateInfo {
    vk::PipelineMultisampleStateCreateInfo {
        rasterization_samples: state.samples,
        sample_shading_enable: vk::Bool32::from(state.min_sample_shading.is_some()),
        min_sample_shading: state.min_sample_shading.unwrap_or(0.0),
        p_sample_mask: if state.sample_mask.is_empty() { std::ptr::null() } else { state.sample_mask.as_ptr() },
        alpha_to_coverage_enable: vk::Bool32::from(state.alpha_to_coverage),
        alpha_to_one_enable: vk::Bool32::from(state.alpha_to_one),
        ..Default::default()
    }
}

fn depth_stencil_info(state: &DepthStencilState) -> vk::PipelineDepthStencilStateCreateInfo {
    let (min_depth_bounds, max_depth_bounds) = state.depth_bounds.unwrap_or((0.0, 1.0));
    let (front, back) = state
        .stencil
        .map_or((vk::StencilOpState::default(), vk::StencilOpState::default()), |(front, back)| {
            (front.to_vk(), back.to_vk())
        });
    vk::PipelineDepthStencilStateCreateInfo {
        depth_test_enable: vk::Bool32::from(state.depth_test),
        depth_write_enable: vk::Bool32::from(state.depth_write),
        depth_compare_op: state.depth_compare_op,
        depth_bounds_test_enable: vk::Bool32::from(state.depth_bounds.is_some()),
        stencil_test_enable: vk::Bool32::from(state.stencil.is_some()),
        front,
        back,
        min_depth_bounds,
        max_depth_bounds,
        ..Default::default()
    }
}

/// Owned sub-structures of a `VkComputePipelineCreateInfo`
pub(crate) struct ComputeCreateStorage {
    specializations: SpecializationStorage,
}

impl ComputeCreateStorage {
    pub(crate) fn new(state: &ComputePipelineState) -> Self {
        Self { specializations: SpecializationStorage::new(std::iter::once(&state.stage)) }
    }

    pub(crate) fn create_info(
        &self,
        state: &ComputePipelineState,
        flags: vk::PipelineCreateFlags,
        base_pipeline_handle: vk::Pipeline,
        base_pipeline_index: i32,
    ) -> vk::ComputePipelineCreateInfo {
        vk::ComputePipelineCreateInfo {
            flags,
            stage: self.specializations.stage_info(0, &state.stage),
            layout: state.layout,
            base_pipeline_handle,
            base_pipeline_index,
            ..Default::default()
        }
    }
}
