// =============================================================================
// RENDERER - Frame loop on top of the render graph
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for the fence of this frame slot
// 2. Acquire a swapchain image (out of date -> recreate, skip the frame)
// 3. Describe the frame: import the swapchain image, declare the scene
//    targets, add the "scene" pass with this frame's draw calls
// 4. Compile and record the graph into the slot's command buffer
// 5. Submit and present
//
// Every frame-in-flight slot owns its own graph targets, so two frames on
// the GPU at once never write the same attachment.

use ash::vk;
use std::sync::Arc;

use crate::backend::{
    CommandBuffer, CommandPool, FrameSync, RenderTarget, RenderingAttachments, ResourceAllocator, Surface,
    Swapchain, VulkanDevice, VulkanGraphBackend, VulkanTexture,
};
use crate::config::Config;
use crate::error::{DeviceError, GraphError, PipelineError, RenderError};
use crate::graph::{PassContext, RenderBackend, RenderGraph};
use crate::logging::SharedSink;
use crate::resource::{ImageLayout, TextureFormat, TextureInfo};
use crate::scene::{BuildContext, DrawCall, Drawable, Scene};

/// Graph name of the imported swapchain image
pub const BACKBUFFER: &str = "backbuffer";
pub const SCENE_PASS: &str = "scene";
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

// =============================================================================
// FRAME DESCRIPTION
// =============================================================================

/// Graph names of the attachments one frame renders into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTargets {
    pub color: String,
    pub depth: String,
    /// Single-sampled image the color target resolves into, with MSAA only
    pub resolve: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl FrameTargets {
    /// Without MSAA the scene renders straight into the backbuffer
    pub fn new(slot: usize, samples: u32, width: u32, height: u32) -> Self {
        let (color, resolve) = if samples > 1 {
            (format!("scene color {slot}"), Some(BACKBUFFER.to_string()))
        } else {
            (BACKBUFFER.to_string(), None)
        };
        Self {
            color,
            depth: format!("scene depth {slot}"),
            resolve,
            width,
            height,
        }
    }
}

/// Declare the graph-owned targets and the scene pass of one frame. The
/// backbuffer has to be imported already.
pub fn declare_scene_pass<B, F>(
    graph: &mut RenderGraph<B>,
    targets: &FrameTargets,
    color_format: TextureFormat,
    samples: u32,
    record: F,
) -> Result<(), GraphError>
where
    B: RenderBackend,
    F: FnMut(&mut PassContext<'_, B>) -> anyhow::Result<()> + 'static,
{
    let (width, height) = (targets.width, targets.height);
    graph.get_render_texture_with(
        &targets.depth,
        TextureInfo::attachment(DEPTH_FORMAT, width, height).with_samples(samples),
    )?;
    if targets.resolve.is_some() {
        graph.get_render_texture_with(
            &targets.color,
            TextureInfo::attachment(color_format, width, height).with_samples(samples),
        )?;
    }

    let mut pass = graph
        .add_render_pass(SCENE_PASS)?
        .write_color(&targets.color)
        .write_depth(&targets.depth);
    if let Some(resolve) = &targets.resolve {
        pass = pass.write_resolve(resolve);
    }
    pass.execute(record);
    Ok(())
}

/// Draw calls in scene order. Nothing is drawn without a camera.
pub fn draw_calls(scene: &Scene) -> Result<Vec<DrawCall>, PipelineError> {
    let Some(camera) = scene.camera() else {
        return Ok(Vec::new());
    };
    let view_proj = camera.view_projection();

    let mut draws = Vec::new();
    for (id, world) in scene.draw_order() {
        match scene.get(id) {
            Some(Drawable::StaticMesh(mesh)) => draws.push(mesh.draw_call(view_proj, world)?),
            Some(Drawable::Skybox(skybox)) => draws.push(skybox.draw_call(camera.view(), camera.projection())?),
            Some(Drawable::Camera(_)) | None => {}
        }
    }
    Ok(draws)
}

/// Next sample count in the 1, 2, 4, ... cycle, wrapping after `max`
pub fn next_sample_count(current: u32, max: u32) -> u32 {
    if current >= max {
        1
    } else {
        (current * 2).min(max)
    }
}

// =============================================================================
// RENDERER
// =============================================================================

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub present_mode: vk::PresentModeKHR,
    pub frames_in_flight: usize,
    pub msaa_samples: u32,
}

impl RendererSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            present_mode: config.present_mode(),
            frames_in_flight: config.graphics.max_frames_in_flight,
            msaa_samples: config.graphics.msaa_samples,
        }
    }
}

struct Frame {
    sync: FrameSync,
    cmd: CommandBuffer,
}

/// IMPORTANT: field order is drop order. The graph releases its textures
/// before the allocator, and everything goes before the device.
pub struct Renderer {
    graph: RenderGraph<VulkanGraphBackend>,
    frames: Vec<Frame>,
    pool: CommandPool,
    swapchain: Option<Swapchain>,
    surface: Surface,
    allocator: Arc<ResourceAllocator>,
    device: Arc<VulkanDevice>,

    present_mode: vk::PresentModeKHR,
    color_format: TextureFormat,
    size: (u32, u32),
    samples: u32,
    current_frame: usize,
    needs_recreate: bool,
}

impl Renderer {
    pub fn new(
        device: &Arc<VulkanDevice>,
        surface: Surface,
        width: u32,
        height: u32,
        settings: &RendererSettings,
        log: SharedSink,
    ) -> Result<Self, DeviceError> {
        // STEP 1: Allocator and the graph on top of it
        let allocator = ResourceAllocator::new(device, log.clone())?;
        let graph = RenderGraph::with_log_sink(VulkanGraphBackend::new(allocator.clone()), log);

        // STEP 2: Command buffers and sync objects, one set per frame in flight
        let pool = CommandPool::new(device)?;
        let frames = pool
            .allocate(settings.frames_in_flight.max(1) as u32)?
            .into_iter()
            .map(|cmd| {
                Ok(Frame {
                    sync: FrameSync::new(device)?,
                    cmd,
                })
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;

        // STEP 3: Swapchain
        let swapchain = Swapchain::new(device, &surface, width, height, settings.present_mode)?;
        let color_format = swapchain.format;

        let samples = device.clamp_samples(settings.msaa_samples);
        log::info!("Frames in flight: {}, MSAA: {}x", frames.len(), samples);

        Ok(Self {
            graph,
            frames,
            pool,
            swapchain: Some(swapchain),
            surface,
            allocator,
            device: device.clone(),
            present_mode: settings.present_mode,
            color_format,
            size: (width, height),
            samples,
            current_frame: 0,
            needs_recreate: false,
        })
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    /// What scene objects need to upload data and build pipelines
    pub fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            device: &self.device,
            allocator: &self.allocator,
            pool: &self.pool,
        }
    }

    /// Formats and sample count every scene pipeline must be built for
    pub fn render_target(&self) -> RenderTarget {
        RenderTarget::new(self.color_format, Some(DEPTH_FORMAT), self.samples)
    }

    pub fn msaa_samples(&self) -> u32 {
        self.samples
    }

    pub fn max_msaa_samples(&self) -> u32 {
        self.device.max_usable_samples()
    }

    /// The swapchain is recreated lazily before the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != self.size {
            self.size = (width, height);
            self.needs_recreate = true;
        }
    }

    /// Switch the sample count and rebuild every material's pipeline for it.
    /// Returns the count actually used after clamping to device support.
    pub fn set_msaa_samples(&mut self, scene: &mut Scene, requested: u32) -> Result<u32, RenderError> {
        let samples = self.device.clamp_samples(requested);
        if samples == self.samples {
            return Ok(samples);
        }

        self.device.wait_idle()?;
        self.samples = samples;
        let target = self.render_target();
        for drawable in scene.drawables_mut() {
            match drawable {
                Drawable::StaticMesh(mesh) => mesh.update_material(&target)?,
                Drawable::Skybox(skybox) => skybox.update_material(&target)?,
                Drawable::Camera(_) => {}
            }
        }
        // Targets of the old sample count are re-created on demand
        self.graph.release_resources();
        log::info!("MSAA: {}x", samples);
        Ok(samples)
    }

    /// Re-read shaders of every material. Failures are logged and leave the
    /// previous shaders in place; returns how many materials reloaded.
    pub fn reload_materials(&mut self, scene: &mut Scene) -> Result<usize, DeviceError> {
        self.device.wait_idle()?;
        let mut reloaded = 0;
        for drawable in scene.drawables_mut() {
            let kind = drawable.kind();
            let result = match drawable {
                Drawable::StaticMesh(mesh) => mesh.reload_shaders(),
                Drawable::Skybox(skybox) => skybox.reload_shaders(),
                Drawable::Camera(_) => continue,
            };
            match result {
                Ok(()) => reloaded += 1,
                Err(e) => log::warn!("Shader reload of {} failed: {}", kind, e),
            }
        }
        Ok(reloaded)
    }

    fn recreate_swapchain(&mut self) -> Result<(), DeviceError> {
        log::info!("Recreating swapchain: {}x{}", self.size.0, self.size.1);
        self.device.wait_idle()?;

        // The old swapchain has to be gone before the surface gets a new one
        self.swapchain = None;
        let swapchain = Swapchain::new(&self.device, &self.surface, self.size.0, self.size.1, self.present_mode)?;
        if swapchain.format != self.color_format {
            log::warn!(
                "Surface format changed from {:?} to {:?}; pipelines keep the old one",
                self.color_format,
                swapchain.format
            );
        }
        self.swapchain = Some(swapchain);
        self.graph.release_resources();
        self.needs_recreate = false;
        Ok(())
    }

    /// Render and present one frame. Returns false when nothing was
    /// presented (minimized window, out-of-date swapchain).
    pub fn render(&mut self, scene: &Scene, clear_color: [f32; 4]) -> Result<bool, RenderError> {
        if self.size.0 == 0 || self.size.1 == 0 {
            return Ok(false);
        }
        if self.needs_recreate || self.swapchain.is_none() {
            self.recreate_swapchain()?;
        }
        let draws = draw_calls(scene)?;
        let slot = self.current_frame;

        // STEP 1: Wait until the GPU is done with this slot
        self.frames[slot].sync.in_flight.wait(u64::MAX)?;

        // STEP 2: Acquire
        let Some(swapchain) = self.swapchain.as_ref() else {
            return Ok(false);
        };
        let image_available = self.frames[slot].sync.image_available.handle;
        let image_index = match swapchain.acquire_next_image(u64::MAX, image_available) {
            Ok((index, suboptimal)) => {
                self.needs_recreate |= suboptimal;
                index
            }
            Err(DeviceError::OutOfDate) => {
                self.needs_recreate = true;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        let image = image_index as usize;
        let extent = swapchain.extent;
        let backbuffer = VulkanTexture::External {
            handle: swapchain.images[image],
            view: swapchain.image_views[image],
        };
        let backbuffer_info = TextureInfo::attachment(swapchain.format, extent.width, extent.height);

        // STEP 3: Describe the frame
        self.graph.reset();
        self.graph.import_texture(
            BACKBUFFER,
            backbuffer,
            backbuffer_info,
            ImageLayout::Undefined,
            Some(ImageLayout::Present),
        )?;
        let targets = FrameTargets::new(slot, self.samples, extent.width, extent.height);
        let attachments = targets.clone();
        declare_scene_pass(&mut self.graph, &targets, self.color_format, self.samples, move |ctx| {
            let color = ctx.texture(&attachments.color)?.view();
            let depth = ctx.texture(&attachments.depth)?.view();
            let resolve = match &attachments.resolve {
                Some(name) => Some(ctx.texture(name)?.view()),
                None => None,
            };
            ctx.cmd.begin_rendering(&RenderingAttachments {
                extent,
                color,
                clear_color,
                resolve,
                depth: Some(depth),
            });
            ctx.cmd.set_viewport_scissor(extent);
            for draw in &draws {
                draw.record(&*ctx.cmd);
            }
            ctx.cmd.end_rendering();
            Ok(())
        })?;
        self.graph.compile()?;

        // STEP 4: Record
        let frame = &mut self.frames[slot];
        frame.cmd.reset()?;
        frame.cmd.begin(true)?;
        self.graph.execute(&mut frame.cmd)?;
        frame.cmd.end()?;

        // STEP 5: Submit and present
        frame.sync.in_flight.reset()?;
        frame.cmd.submit(
            &[(image_available, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)],
            &[frame.sync.render_finished.handle],
            &frame.sync.in_flight,
        )?;
        let render_finished = frame.sync.render_finished.handle;
        if let Some(swapchain) = self.swapchain.as_ref() {
            if swapchain.present(self.device.graphics_queue, image_index, &[render_finished])? {
                self.needs_recreate = true;
            }
        }

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        Ok(true)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer...");
        // Wait for GPU to finish before destroying anything
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle failed during cleanup: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::headless::{CommandLog, HeadlessBackend, HeadlessTexture};
    use crate::scene::Camera;
    use glam::{Mat4, Vec3};

    const FORMAT: TextureFormat = TextureFormat::Bgra8Srgb;

    fn frame_graph(samples: u32) -> (RenderGraph<HeadlessBackend>, FrameTargets) {
        let mut graph = RenderGraph::new(HeadlessBackend::default());
        graph.reset();
        let info = TextureInfo::attachment(FORMAT, 8, 8);
        graph
            .import_texture(
                BACKBUFFER,
                HeadlessTexture::new(BACKBUFFER, info),
                info,
                ImageLayout::Undefined,
                Some(ImageLayout::Present),
            )
            .unwrap();
        let targets = FrameTargets::new(0, samples, 8, 8);
        declare_scene_pass(&mut graph, &targets, FORMAT, samples, |ctx| {
            ctx.cmd.push("draw scene");
            Ok(())
        })
        .unwrap();
        graph.compile().unwrap();
        (graph, targets)
    }

    #[test]
    fn single_sampled_frame_draws_into_the_backbuffer() {
        let (mut graph, targets) = frame_graph(1);
        assert_eq!(targets.color, BACKBUFFER);
        assert!(graph.texture_id("scene color 0").is_none());

        let mut log = CommandLog::default();
        graph.execute(&mut log).unwrap();
        let to_color = log.position("transition backbuffer Undefined -> ColorAttachment").unwrap();
        let draw = log.position("draw scene").unwrap();
        let to_present = log.position("transition backbuffer ColorAttachment -> Present").unwrap();
        assert!(to_color < draw && draw < to_present);
    }

    #[test]
    fn multisampled_frame_resolves_into_the_backbuffer() {
        let (graph, targets) = frame_graph(4);
        assert_eq!(targets.resolve.as_deref(), Some(BACKBUFFER));

        let color = graph.texture_id(&targets.color).unwrap();
        assert_eq!(graph.texture_info(color).unwrap().samples, 4);
        let depth = graph.texture_id(&targets.depth).unwrap();
        assert_eq!(graph.texture_info(depth).unwrap().samples, 4);

        let before = graph.transitions_before(SCENE_PASS).unwrap();
        assert!(before.contains(&(BACKBUFFER.to_string(), ImageLayout::ColorAttachment)));
        assert!(before.contains(&(targets.depth.clone(), ImageLayout::DepthAttachment)));
    }

    #[test]
    fn frame_slots_get_their_own_targets() {
        let first = FrameTargets::new(0, 4, 8, 8);
        let second = FrameTargets::new(1, 4, 8, 8);
        assert_ne!(first.color, second.color);
        assert_ne!(first.depth, second.depth);
        assert_eq!(first.resolve, second.resolve);
    }

    #[test]
    fn sample_count_cycles_up_to_the_device_limit() {
        assert_eq!(next_sample_count(1, 8), 2);
        assert_eq!(next_sample_count(4, 8), 8);
        assert_eq!(next_sample_count(8, 8), 1);
        assert_eq!(next_sample_count(2, 4), 4);
        assert_eq!(next_sample_count(1, 1), 1);
    }

    #[test]
    fn scene_without_drawables_records_nothing() {
        let mut scene = Scene::new();
        assert!(draw_calls(&scene).unwrap().is_empty());

        let camera = scene.add_drawable(Drawable::Camera(Camera::new(Vec3::ZERO, 1.0)));
        scene.add_node(Scene::ROOT, Some(camera), Mat4::IDENTITY).unwrap();
        assert!(draw_calls(&scene).unwrap().is_empty());
    }
}
