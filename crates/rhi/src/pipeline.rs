//! Graphics and compute pipeline construction.
//!
//! [`PipelineBuilder`] gathers fixed-function state as named options, each
//! with a default, then produces a pipeline layout and a graphics (dynamic
//! rendering) or compute pipeline. Incomplete builders are rejected with
//! [`RhiError::PipelineError`] before any Vulkan call is made.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use ash::vk;
//! # use ember_rhi::{DeletionQueue, Device, RhiResult};
//! # use ember_rhi::pipeline::{CullMode, PipelineBuilder};
//! # use ember_rhi::shader::Shader;
//! # fn example(device: Arc<Device>, vert: &Shader, frag: &Shader, layouts: &[vk::DescriptorSetLayout],
//! #            deletion: &mut DeletionQueue) -> RhiResult<()> {
//! let mut builder = PipelineBuilder::new()
//!     .shader(vert)
//!     .shader(frag)
//!     .cull_mode(CullMode::None)
//!     .viewport_extent(vk::Extent2D { width: 1600, height: 900 });
//! builder.build_layout(&device, layouts, deletion)?;
//! let pipeline = builder.build_gfx(&device, vk::Format::R8G8B8A8_UNORM, vk::Format::D32_SFLOAT, deletion)?;
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;

use ash::vk;
use tracing::{debug, info};

use crate::deletion::{DeletionQueue, PendingRelease};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{ENTRY_POINT, Shader, ShaderStage};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    #[default]
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    #[default]
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    LessOrEqual,
    Greater,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

impl BlendFactor {
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    Min,
    Max,
}

impl BlendOp {
    pub fn to_vk(self) -> vk::BlendOp {
        match self {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::Min => vk::BlendOp::MIN,
            BlendOp::Max => vk::BlendOp::MAX,
        }
    }
}

/// Blend state of the single color attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlend {
    pub enable: bool,
    pub op: BlendOp,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl Default for ColorBlend {
    /// Opaque: blending off, source replaces destination.
    fn default() -> Self {
        Self {
            enable: false,
            op: BlendOp::Add,
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
        }
    }
}

impl ColorBlend {
    /// Straight alpha blending.
    pub fn alpha() -> Self {
        Self {
            enable: true,
            op: BlendOp::Add,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        }
    }

    fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.enable)
            .src_color_blend_factor(self.src_factor.to_vk())
            .dst_color_blend_factor(self.dst_factor.to_vk())
            .color_blend_op(self.op.to_vk())
            .src_alpha_blend_factor(self.src_factor.to_vk())
            .dst_alpha_blend_factor(self.dst_factor.to_vk())
            .alpha_blend_op(self.op.to_vk())
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    }
}

/// A built pipeline with the layout it was built against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pipeline {
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
}

/// Accumulates pipeline state. Consumed by [`build_gfx`](Self::build_gfx)
/// or [`build_comp`](Self::build_comp).
#[derive(Debug)]
pub struct PipelineBuilder<'a> {
    stages: Vec<(ShaderStage, vk::ShaderModule)>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: PrimitiveTopology,
    viewport_extent: Option<vk::Extent2D>,
    polygon_mode: PolygonMode,
    cull_mode: CullMode,
    front_face: FrontFace,
    color_blend: ColorBlend,
    samples: vk::SampleCountFlags,
    depth_test: bool,
    depth_write: bool,
    depth_compare: CompareOp,
    layout: Option<vk::PipelineLayout>,
    _shaders: PhantomData<&'a Shader>,
}

impl Default for PipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> PipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            viewport_extent: None,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::Clockwise,
            color_blend: ColorBlend::default(),
            samples: vk::SampleCountFlags::TYPE_1,
            depth_test: true,
            depth_write: true,
            depth_compare: CompareOp::Less,
            layout: None,
            _shaders: PhantomData,
        }
    }

    /// Adds a shader stage. The shader must outlive the build call.
    pub fn shader(self, shader: &'a Shader) -> Self {
        self.stage(shader.stage(), shader.handle())
    }

    fn stage(mut self, stage: ShaderStage, module: vk::ShaderModule) -> Self {
        self.stages.push((stage, module));
        self
    }

    pub fn vertex_input(
        mut self,
        bindings: &[vk::VertexInputBindingDescription],
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings = bindings.to_vec();
        self.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Static viewport and scissor covering `extent`.
    pub fn viewport_extent(mut self, extent: vk::Extent2D) -> Self {
        self.viewport_extent = Some(extent);
        self
    }

    pub fn polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn color_blend(mut self, blend: ColorBlend) -> Self {
        self.color_blend = blend;
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn depth(mut self, test: bool, write: bool, compare: CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare = compare;
        self
    }

    /// The layout set by [`build_layout`](Self::build_layout), if any.
    pub fn layout(&self) -> Option<vk::PipelineLayout> {
        self.layout
    }

    /// Creates a pipeline layout over `set_layouts` (no push constants) and
    /// keeps it for the following build.
    pub fn build_layout(
        &mut self,
        device: &Device,
        set_layouts: &[vk::DescriptorSetLayout],
        deletion: &mut DeletionQueue,
    ) -> RhiResult<vk::PipelineLayout> {
        deletion.ensure_open()?;
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
        deletion.push(PendingRelease::PipelineLayout(layout))?;
        debug!("Created pipeline layout with {} set(s)", set_layouts.len());
        self.layout = Some(layout);
        Ok(layout)
    }

    /// Creates a graphics pipeline for dynamic rendering into one color
    /// attachment of `color_format` and a depth attachment of `depth_format`.
    pub fn build_gfx(
        self,
        device: &Device,
        color_format: vk::Format,
        depth_format: vk::Format,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<Pipeline> {
        let (layout, extent) = self.validate_gfx()?;
        deletion.ensure_open()?;

        let stages: Vec<vk::PipelineShaderStageCreateInfo<'_>> = self
            .stages
            .iter()
            .map(|(stage, module)| stage_info(*stage, *module))
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(self.topology.to_vk());

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode.to_vk())
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .line_width(1.0);

        let multisample =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(self.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare.to_vk())
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let attachments = [self.color_blend.to_vk()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

        let color_formats = [color_format];
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .layout(layout)
            .push_next(&mut rendering);

        let handle = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| e)?
        }
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        deletion.push(PendingRelease::Pipeline(handle))?;
        info!(
            "Created graphics pipeline ({:?} color, {:?} depth, {}x{})",
            color_format, depth_format, extent.width, extent.height
        );

        Ok(Pipeline {
            handle,
            layout,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }

    /// Creates a compute pipeline from the single compute stage.
    pub fn build_comp(self, device: &Device, deletion: &mut DeletionQueue) -> RhiResult<Pipeline> {
        let (layout, module) = self.validate_comp()?;
        deletion.ensure_open()?;

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info(ShaderStage::Compute, module))
            .layout(layout);

        let handle = unsafe {
            device
                .handle()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| e)?
        }
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        deletion.push(PendingRelease::Pipeline(handle))?;
        info!("Created compute pipeline");

        Ok(Pipeline {
            handle,
            layout,
            bind_point: vk::PipelineBindPoint::COMPUTE,
        })
    }

    fn count(&self, stage: ShaderStage) -> usize {
        self.stages.iter().filter(|(s, _)| *s == stage).count()
    }

    fn validate_gfx(&self) -> RhiResult<(vk::PipelineLayout, vk::Extent2D)> {
        if self.count(ShaderStage::Vertex) != 1 || self.count(ShaderStage::Fragment) != 1 {
            return Err(RhiError::PipelineError(
                "graphics pipeline needs exactly one vertex and one fragment stage".to_string(),
            ));
        }
        if self.count(ShaderStage::Compute) != 0 {
            return Err(RhiError::PipelineError(
                "compute stage given to a graphics pipeline".to_string(),
            ));
        }
        let layout = self.require_layout()?;
        let extent = self
            .viewport_extent
            .filter(|e| e.width > 0 && e.height > 0)
            .ok_or_else(|| RhiError::PipelineError("viewport extent not set".to_string()))?;
        Ok((layout, extent))
    }

    fn validate_comp(&self) -> RhiResult<(vk::PipelineLayout, vk::ShaderModule)> {
        let module = match self.stages.as_slice() {
            [(ShaderStage::Compute, module)] => *module,
            [] => {
                return Err(RhiError::PipelineError(
                    "compute pipeline needs a compute stage".to_string(),
                ));
            }
            _ => {
                return Err(RhiError::PipelineError(
                    "compute pipeline takes exactly one compute stage".to_string(),
                ));
            }
        };
        Ok((self.require_layout()?, module))
    }

    fn require_layout(&self) -> RhiResult<vk::PipelineLayout> {
        self.layout
            .ok_or_else(|| RhiError::PipelineError("pipeline layout not built".to_string()))
    }
}

fn stage_info(stage: ShaderStage, module: vk::ShaderModule) -> vk::PipelineShaderStageCreateInfo<'static> {
    vk::PipelineShaderStageCreateInfo::default()
        .stage(stage.to_vk_stage())
        .module(module)
        .name(ENTRY_POINT)
}
