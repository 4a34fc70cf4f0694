//! Renderer orchestration.
//!
//! [`Renderer`] creates every GPU object the frame needs and records one frame
//! per [`render_frame`](Renderer::render_frame) call.
//!
//! # Destruction order
//!
//! Everything created on the device is registered with a single
//! [`DeletionQueue`]. [`Drop`] flushes it (device idle wait, then reverse
//! creation order), after which the remaining fields drop in declaration
//! order:
//! 1. objects that only hold a device reference
//! 2. the logical device
//! 3. the surface
//! 4. the instance

use std::sync::Arc;

use tracing::{debug, error, info};

use ember_core::EngineConfig;
use ember_platform::{Surface, Window, WindowEvent};
use ember_resources::SceneData;
use ember_rhi::command::CommandBuffer;
use ember_rhi::descriptor::{DescriptorPool, DescriptorWriter, binding, create_set_layout};
use ember_rhi::image::create_linear_sampler;
use ember_rhi::physical_device::select_physical_device;
use ember_rhi::pipeline::{CompareOp, CullMode, FrontFace, Pipeline, PipelineBuilder};
use ember_rhi::shader::{Shader, ShaderStage};
use ember_rhi::swapchain::Swapchain;
use ember_rhi::vertex::Vertex;
use ember_rhi::{
    AllocatedBuffer, BufferUsage, DeletionQueue, Device, Instance, ResourceAllocator,
    UploadContext, vk,
};
use ember_scene::{Camera, DrawItem, SceneGraph};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::draw::{CommandEncoder, DrawParams, draw_nodes};
use crate::error::{RendererError, RendererResult};
use crate::frame_ring::{FrameData, FrameRing};
use crate::mesh::{GpuMesh, MeshUploader};
use crate::overlay::{Overlay, OverlayTarget};
use crate::recorder::{FrameImages, FramePasses, FrameRecording, check_output_extent};
use crate::targets::{DEPTH_FORMAT, RenderTargets};
use crate::ubo::{ComputeParams, RenderMat, UniformLayout};

/// Opaque white.
const CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const CLEAR_DEPTH: f32 = 1.0;

/// GPU objects released through the deletion queue.
///
/// The allocator, upload context and descriptor pool are only needed while
/// creating these; their Vulkan handles stay in the deletion queue.
struct GpuState {
    swapchain: Swapchain,
    frames: FrameRing<FrameData>,
    targets: RenderTargets,
    gfx_pipeline: Pipeline,
    comp_pipeline: Pipeline,
    meshes: Vec<GpuMesh>,
    render_mats: AllocatedBuffer,
    render_mat_layout: UniformLayout,
    render_mat_set: vk::DescriptorSet,
    compute_params: AllocatedBuffer,
    compute_params_layout: UniformLayout,
    compute_set: vk::DescriptorSet,
}

impl GpuState {
    fn create(
        config: &EngineConfig,
        window: &Window,
        scene: &SceneData,
        device: &Arc<Device>,
        surface: &Surface,
        deletion: &mut DeletionQueue,
    ) -> RendererResult<Self> {
        let swapchain = Swapchain::new(
            device.clone(),
            surface.handle(),
            surface.loader(),
            window.extent(),
            deletion,
        )?;
        // The surface can settle on its own extent; the post-process must
        // still tile it.
        check_output_extent(swapchain.extent())?;
        let allocator = ResourceAllocator::new(device.clone());
        let upload = UploadContext::new(device.clone(), deletion)?;
        let frames = FrameRing::create(device, device.queue_families().graphics, deletion)?;

        let (width, height) = config.render_resolution;
        let render_resolution = vk::Extent2D { width, height };
        let targets = RenderTargets::new(
            &allocator,
            swapchain.format(),
            render_resolution,
            swapchain.extent(),
            deletion,
        )?;

        // Graphics set 0: per-node matrices. Set 1: mesh texture.
        let render_mat_set_layout = create_set_layout(
            device,
            &[binding::uniform_buffer_dynamic(0, vk::ShaderStageFlags::VERTEX)],
            deletion,
        )?;
        let texture_set_layout = create_set_layout(
            device,
            &[binding::combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)],
            deletion,
        )?;
        let compute_set_layout = create_set_layout(
            device,
            &[
                binding::storage_image(0, vk::ShaderStageFlags::COMPUTE),
                binding::storage_image(1, vk::ShaderStageFlags::COMPUTE),
                binding::uniform_buffer_dynamic(2, vk::ShaderStageFlags::COMPUTE),
            ],
            deletion,
        )?;

        let gfx_pipeline = Self::create_gfx_pipeline(
            config,
            device,
            &[render_mat_set_layout, texture_set_layout],
            swapchain.format(),
            targets.render_extent(),
            deletion,
        )?;
        let comp_pipeline =
            Self::create_comp_pipeline(config, device, &[compute_set_layout], deletion)?;

        let texture_sets = scene.meshes.len().max(1) as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: texture_sets,
            },
        ];
        let descriptor_pool =
            DescriptorPool::new(device.clone(), 2 + texture_sets, &pool_sizes, deletion)?;

        let sampler = create_linear_sampler(device, deletion)?;
        let meshes = MeshUploader {
            allocator: &allocator,
            upload: &upload,
            descriptor_pool: &descriptor_pool,
            texture_layout: texture_set_layout,
            sampler,
        }
        .upload_all(&scene.meshes, deletion)?;

        let render_mat_layout = UniformLayout::new(
            allocator.pad_uniform_buffer_size(RenderMat::SIZE),
            scene.graph.len(),
            MAX_FRAMES_IN_FLIGHT,
        );
        let render_mats = allocator.create_buffer_for(
            "render mats",
            render_mat_layout.buffer_size(),
            BufferUsage::Uniform,
            deletion,
        )?;
        let render_mat_set = descriptor_pool.allocate(render_mat_set_layout)?;
        DescriptorWriter::new(render_mat_set)
            .uniform_buffer_dynamic(0, render_mats.handle(), RenderMat::SIZE as vk::DeviceSize)
            .write(device);

        let compute_params_layout = UniformLayout::new(
            allocator.pad_uniform_buffer_size(ComputeParams::SIZE),
            1,
            MAX_FRAMES_IN_FLIGHT,
        );
        let compute_params = allocator.create_buffer_for(
            "compute params",
            compute_params_layout.buffer_size(),
            BufferUsage::Uniform,
            deletion,
        )?;
        let compute_set = descriptor_pool.allocate(compute_set_layout)?;
        DescriptorWriter::new(compute_set)
            .storage_image(0, targets.offscreen.view())
            .storage_image(1, targets.compute_output.view())
            .uniform_buffer_dynamic(
                2,
                compute_params.handle(),
                ComputeParams::SIZE as vk::DeviceSize,
            )
            .write(device);

        debug!(
            "Uniform strides: render mat {} bytes, compute params {} bytes",
            render_mat_layout.stride(),
            compute_params_layout.stride()
        );

        Ok(Self {
            swapchain,
            frames,
            targets,
            gfx_pipeline,
            comp_pipeline,
            meshes,
            render_mats,
            render_mat_layout,
            render_mat_set,
            compute_params,
            compute_params_layout,
            compute_set,
        })
    }

    fn create_gfx_pipeline(
        config: &EngineConfig,
        device: &Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        color_format: vk::Format,
        extent: vk::Extent2D,
        deletion: &mut DeletionQueue,
    ) -> RendererResult<Pipeline> {
        let vertex_shader = Shader::load(
            device.clone(),
            &config.shader_path("model.vert.spv"),
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::load(
            device.clone(),
            &config.shader_path("model.frag.spv"),
            ShaderStage::Fragment,
        )?;

        let mut builder = PipelineBuilder::new()
            .shader(&vertex_shader)
            .shader(&fragment_shader)
            .vertex_input(
                &[Vertex::binding_description()],
                &Vertex::attribute_descriptions(),
            )
            .viewport_extent(extent)
            .cull_mode(CullMode::None)
            .front_face(FrontFace::CounterClockwise)
            .depth(true, true, CompareOp::LessOrEqual);
        builder.build_layout(device, set_layouts, deletion)?;
        Ok(builder.build_gfx(device, color_format, DEPTH_FORMAT, deletion)?)
    }

    fn create_comp_pipeline(
        config: &EngineConfig,
        device: &Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        deletion: &mut DeletionQueue,
    ) -> RendererResult<Pipeline> {
        let compute_shader = Shader::load(
            device.clone(),
            &config.shader_path("postprocess.comp.spv"),
            ShaderStage::Compute,
        )?;

        let mut builder = PipelineBuilder::new().shader(&compute_shader);
        builder.build_layout(device, set_layouts, deletion)?;
        Ok(builder.build_comp(device, deletion)?)
    }
}

/// Scene rendering and post-processing for one frame.
struct ScenePasses<'a> {
    gpu: &'a GpuState,
    overlay: &'a mut dyn Overlay,
    draws: &'a [DrawItem],
    draw_params: DrawParams,
    compute_offset: u32,
}

impl FramePasses for ScenePasses<'_> {
    fn render(&mut self, cmd: &CommandBuffer) -> RendererResult<()> {
        let targets = &self.gpu.targets;

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(targets.offscreen.view())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            })];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(targets.depth.view())
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: CLEAR_DEPTH,
                    stencil: 0,
                },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: targets.render_extent(),
            })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        cmd.begin_rendering(&rendering_info);

        let mut encoder = CommandEncoder {
            cmd,
            pipeline: &self.gpu.gfx_pipeline,
            meshes: &self.gpu.meshes,
            render_mats: &self.gpu.render_mats,
            render_mat_set: self.gpu.render_mat_set,
        };
        draw_nodes(&mut encoder, self.draws, &self.draw_params)?;
        self.overlay.record(cmd, targets.render_extent())?;

        cmd.end_rendering();
        Ok(())
    }

    fn dispatch(&mut self, cmd: &CommandBuffer, groups: [u32; 3]) -> RendererResult<()> {
        let pipeline = &self.gpu.comp_pipeline;
        cmd.bind_pipeline(pipeline.bind_point, pipeline.handle);
        cmd.bind_descriptor_sets(
            pipeline.bind_point,
            pipeline.layout,
            &[self.gpu.compute_set],
            &[self.compute_offset],
        );
        cmd.dispatch(groups);
        Ok(())
    }
}

/// Owns the Vulkan context, the loaded scene and the camera.
pub struct Renderer {
    deletion: DeletionQueue,
    camera: Camera,
    graph: SceneGraph,
    // May hold GPU objects of its own, released on drop before the device.
    overlay: Box<dyn Overlay>,
    compute_params: ComputeParams,
    gpu: GpuState,
    device: Arc<Device>,
    // Destroyed after the swapchain (flushed in Drop), before the instance.
    _surface: Surface,
    instance: Instance,
}

impl Renderer {
    /// Creates the Vulkan context for `window` and uploads `scene`.
    ///
    /// On failure every object created so far is released before the error
    /// is returned.
    pub fn new(
        config: &EngineConfig,
        window: &Window,
        scene: SceneData,
        overlay: Box<dyn Overlay>,
    ) -> RendererResult<Self> {
        info!(
            "Initializing renderer ({}x{} window, {}x{} render resolution)",
            window.width(),
            window.height(),
            config.render_resolution.0,
            config.render_resolution.1
        );

        let extensions = window.required_extensions()?;
        let instance = Instance::new(&extensions, config.enable_validation)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let physical =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical)?;

        let mut overlay = overlay;
        let mut deletion = DeletionQueue::new();
        let gpu = match Self::create_gpu(
            config,
            window,
            &scene,
            &device,
            &surface,
            overlay.as_mut(),
            &mut deletion,
        ) {
            Ok(gpu) => gpu,
            Err(e) => {
                // Overlay GPU objects go before the queue and the device.
                drop(overlay);
                if let Err(flush_error) = deletion.flush(&device) {
                    error!("Failed to release partially created renderer: {}", flush_error);
                }
                return Err(e);
            }
        };

        let compute_params = ComputeParams::new(
            gpu.targets.render_extent(),
            gpu.targets.compute_output.extent_2d(),
        );

        let (width, height) = config.render_resolution;
        let camera = Camera::new()
            .with_aspect(width as f32 / height as f32)
            .with_speed(config.camera_speed, config.camera_sensitivity);

        info!(
            "Renderer initialized: {} nodes, {} meshes, {} triangles per frame, {} frames in flight",
            scene.graph.len(),
            gpu.meshes.len(),
            scene.triangle_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            deletion,
            camera,
            graph: scene.graph,
            overlay,
            compute_params,
            gpu,
            device,
            _surface: surface,
            instance,
        })
    }

    fn create_gpu(
        config: &EngineConfig,
        window: &Window,
        scene: &SceneData,
        device: &Arc<Device>,
        surface: &Surface,
        overlay: &mut dyn Overlay,
        deletion: &mut DeletionQueue,
    ) -> RendererResult<GpuState> {
        let gpu = GpuState::create(config, window, scene, device, surface, deletion)?;
        overlay.attach(
            &OverlayTarget {
                device,
                color_format: gpu.swapchain.format(),
                depth_format: DEPTH_FORMAT,
            },
            deletion,
        )?;
        Ok(gpu)
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.gpu.frames.frame_number()
    }

    #[inline]
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.gpu.swapchain.extent()
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.instance.has_validation()
    }

    /// Hands a window event to the overlay. Returns true when the overlay
    /// consumed it and the camera should ignore it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.overlay.on_window_event(window, event)
    }

    /// Records, submits and presents one frame.
    ///
    /// Blocks until the frame slot's previous submission has finished and a
    /// swapchain image is available. Any error is fatal to the render loop.
    pub fn render_frame(&mut self, window: &Window) -> RendererResult<()> {
        let frame = self.gpu.frames.acquire_frame()?;
        self.overlay.new_frame(window)?;
        let image_index = self
            .gpu
            .frames
            .acquire_swapchain_image(frame, &self.gpu.swapchain)?;

        let params_offset = self.gpu.compute_params_layout.offset(frame.slot, 0);
        self.gpu
            .compute_params
            .write_pod(params_offset, &self.compute_params)?;
        let compute_offset = self
            .gpu
            .compute_params_layout
            .dynamic_offset(frame.slot, 0)
            .ok_or_else(|| {
                RendererError::Draw(format!(
                    "compute params offset {} does not fit a dynamic offset",
                    params_offset
                ))
            })?;

        let targets = &self.gpu.targets;
        let recording = FrameRecording::new(
            FrameImages {
                offscreen: targets.offscreen.handle(),
                depth: targets.depth.handle(),
                compute_output: targets.compute_output.handle(),
                swapchain: self.gpu.swapchain.image(image_index)?,
            },
            self.device.queue_families(),
            targets.compute_output.extent(),
            self.gpu.swapchain.extent(),
        )?;

        let draws = self.graph.draw_list()?;
        let slot = self.gpu.frames.slot(frame);
        let cmd = slot.command_buffer();

        cmd.reset()?;
        cmd.begin()?;
        let mut passes = ScenePasses {
            gpu: &self.gpu,
            overlay: self.overlay.as_mut(),
            draws: &draws,
            draw_params: DrawParams {
                view: self.camera.view_matrix(),
                proj: self.camera.projection_matrix(),
                layout: self.gpu.render_mat_layout,
                frame_slot: frame.slot,
            },
            compute_offset,
        };
        recording.record(cmd, &mut passes)?;
        cmd.end()?;

        let wait_semaphores = [slot.acquire_semaphore().handle()];
        let wait_stages = [vk::PipelineStageFlags::TOP_OF_PIPE];
        let signal_semaphores = [slot.submit_semaphore().handle()];
        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        self.device
            .submit_graphics(&[submit_info], slot.fence().handle())?;

        self.gpu
            .swapchain
            .present(image_index, slot.submit_semaphore().handle())?;

        self.gpu.frames.advance();
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!("Destroying renderer");
        match self.deletion.flush(&self.device) {
            Ok(released) => debug!("Released {} GPU objects", released),
            Err(e) => error!("Failed to release GPU objects: {}", e),
        }
    }
}
