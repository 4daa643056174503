// =============================================================================
// VKSCENE EDITOR - Fly through a scene rendered by the render graph
// =============================================================================
//
// CONTROLS:
//   W/A/S/D      move forward / left / back / right
//   Q/E          move down / up
//   Right mouse  look around
//   M            cycle MSAA sample count
//   F11          toggle fullscreen
//   Escape       quit
//
// FRAME FLOW:
// 1. Pump window events
// 2. Apply resize, MSAA switch and shader hot reload
// 3. Move the camera
// 4. Render and present through the renderer
//
// Everything runs without a config file; config.toml only overrides the
// defaults, and missing assets fall back to procedural ones.
//
// =============================================================================

use anyhow::{Context, Result};
use glam::{Mat4, Vec2, Vec3};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use vkscene::assets::{self, ImageData, MeshData, ModelData};
use vkscene::backend::VulkanDevice;
use vkscene::config::Config;
use vkscene::error::DeviceError;
use vkscene::hot_reload::ShaderWatcher;
use vkscene::logging::{LogFacadeSink, SharedSink};
use vkscene::renderer::{self, Renderer, RendererSettings};
use vkscene::scene::{Camera, CameraInput, Drawable, DrawableId, NodeId, Scene, ShaderPaths, Skybox, StaticMesh};
use vkscene::window::{KeyCode, MouseButton, Window};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting vkscene editor");
    log::info!("Present mode: {}", config.graphics.present_mode);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// Level from config.toml; RUST_LOG still wins when set
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env};

    let mut builder = Builder::new();
    builder.filter_level(config.log_filter());
    builder.parse_env(Env::default());
    builder.init();
}

// =============================================================================
// EDITOR
// =============================================================================

fn run(config: &Config) -> Result<()> {
    // STEP 1: Window
    let mut window = Window::init(config.window.width, config.window.height, &config.window.title)
        .context("Failed to create window")?;

    // STEP 2: Device and surface
    let device = VulkanDevice::new(
        &config.window.title,
        config.debug.validation_layers,
        Some(window.display_handle()?),
    )
    .context("Failed to create Vulkan device")?;
    let surface = window.create_surface(&device)?;

    // STEP 3: Renderer
    let log_sink: SharedSink = Arc::new(LogFacadeSink);
    let (width, height) = window.framebuffer_size();
    let mut renderer = Renderer::new(
        &device,
        surface,
        width,
        height,
        &RendererSettings::from_config(config),
        log_sink,
    )
    .context("Failed to create renderer")?;

    // STEP 4: Scene
    let aspect = width as f32 / height.max(1) as f32;
    let mut scene = build_scene(&renderer, config, aspect)?;

    // STEP 5: Shader hot reload
    let watcher = if config.assets.hot_reload {
        match ShaderWatcher::new(&config.assets.shader_dir) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("Shader hot reload disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    // STEP 6: Frame loop
    let result = frame_loop(config, &mut window, &mut renderer, &mut scene, watcher.as_ref());
    shut_down(result, || device.wait_idle(), scene)
}

/// Scene objects go before the renderer, and the GPU must be done with them
/// whether the loop finished or bailed out mid-frame
fn shut_down<S>(result: Result<()>, wait_idle: impl FnOnce() -> Result<(), DeviceError>, scene: S) -> Result<()> {
    log::info!("Shutting down...");
    if let Err(e) = wait_idle() {
        log::error!("wait_idle failed during shutdown: {}", e);
    }
    drop(scene);
    result
}

fn frame_loop(
    config: &Config,
    window: &mut Window,
    renderer: &mut Renderer,
    scene: &mut Scene,
    watcher: Option<&ShaderWatcher>,
) -> Result<()> {
    let mut fps = FpsCounter::new(Instant::now());
    let mut last_frame = Instant::now();
    while window.step() {
        let now = Instant::now();
        let dt = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        if let Some((width, height)) = window.take_resized() {
            renderer.resize(width, height);
            if let (Some(camera), true) = (scene.camera_mut(), height > 0) {
                camera.set_aspect(width as f32 / height as f32);
            }
        }

        if window.was_key_pressed(KeyCode::KeyM) {
            let next = renderer::next_sample_count(renderer.msaa_samples(), renderer.max_msaa_samples());
            renderer.set_msaa_samples(scene, next)?;
        }

        if let Some(watcher) = watcher {
            let changed = watcher.changed_shaders();
            if !changed.is_empty() {
                log::info!("Shaders changed: {:?}", changed);
                let reloaded = renderer.reload_materials(scene)?;
                log::info!("Reloaded {} material(s)", reloaded);
            }
        }

        let input = camera_input(window);
        if let Some(camera) = scene.camera_mut() {
            camera.update(&input, dt);
        }

        let presented = renderer.render(scene, config.graphics.clear_color)?;
        if presented && config.debug.show_fps {
            if let Some(title) = fps.frame(now, &config.window.title, renderer.msaa_samples()) {
                window.set_title(&title);
            }
        }
    }
    Ok(())
}

/// WASD/QE movement, right mouse drag to look
fn camera_input(window: &Window) -> CameraInput {
    let axis = |positive: KeyCode, negative: KeyCode| {
        window.is_key_down(positive) as i32 as f32 - window.is_key_down(negative) as i32 as f32
    };
    let movement = Vec3::new(
        axis(KeyCode::KeyD, KeyCode::KeyA),
        axis(KeyCode::KeyE, KeyCode::KeyQ),
        axis(KeyCode::KeyW, KeyCode::KeyS),
    );

    // Dragging right turns right (negative yaw), dragging down looks down
    let rotation = if window.is_mouse_down(MouseButton::Right) {
        let (dx, dy) = window.cursor_delta();
        Vec2::new(-dx as f32, -dy as f32)
    } else {
        Vec2::ZERO
    };
    CameraInput { movement, rotation }
}

// =============================================================================
// SCENE SETUP
// =============================================================================

fn attach(scene: &mut Scene, parent: NodeId, drawable: Option<DrawableId>) -> Result<NodeId> {
    scene
        .add_node(parent, drawable, Mat4::IDENTITY)
        .with_context(|| format!("Scene node {} does not exist", parent))
}

fn build_scene(renderer: &Renderer, config: &Config, aspect: f32) -> Result<Scene> {
    let ctx = renderer.build_context();
    let target = renderer.render_target();
    let shader_dir = &config.assets.shader_dir;
    let mut scene = Scene::new();

    // Camera
    let mut camera = Camera::new(Vec3::new(0.0, 0.5, 3.0), aspect);
    camera.speed = config.controls.move_speed;
    camera.sensitivity = config.controls.mouse_sensitivity;
    let id = scene.add_drawable(Drawable::Camera(camera));
    attach(&mut scene, Scene::ROOT, Some(id))?;

    // Skybox, drawn first whatever its place in the tree
    let faces = sky_faces(config);
    let skybox = Skybox::build(&ctx, &faces, &ShaderPaths::in_dir(shader_dir, "skybox"), &target)
        .context("Failed to build skybox")?;
    let id = scene.add_drawable(Drawable::Skybox(skybox));
    attach(&mut scene, Scene::ROOT, Some(id))?;

    // Model, one static mesh per primitive under a common node
    let model = model_data(config);
    let mesh_shaders = ShaderPaths::in_dir(shader_dir, "mesh");
    let model_node = attach(&mut scene, Scene::ROOT, None)?;
    for (index, data) in model.meshes.iter().enumerate() {
        let name = format!("mesh {}", index);
        let mesh = StaticMesh::build(&ctx, &name, data, &mesh_shaders, &target)
            .with_context(|| format!("Failed to build {}", name))?;
        let id = scene.add_drawable(Drawable::StaticMesh(mesh));
        attach(&mut scene, model_node, Some(id))?;
    }

    log::info!("Scene ready: {} drawables", scene.drawable_count());
    Ok(scene)
}

fn model_data(config: &Config) -> ModelData {
    if let Some(path) = &config.assets.model {
        match assets::load_model(path) {
            Ok(model) => return model,
            Err(e) => log::warn!("Failed to load model {:?}: {}. Using a cube.", path, e),
        }
    }
    let mut cube = MeshData::cube();
    cube.base_color = Some(ImageData::checkerboard(256, 32, [235, 235, 235, 255], [70, 70, 80, 255]));
    ModelData { meshes: vec![cube] }
}

fn sky_faces(config: &Config) -> [ImageData; 6] {
    if let Some(dir) = &config.assets.skybox_dir {
        match assets::load_cube_faces(dir) {
            Ok(faces) => return faces,
            Err(e) => log::warn!("Failed to load skybox from {:?}: {}. Using a gradient.", dir, e),
        }
    }
    assets::procedural_sky(64, [60, 110, 190, 255], [200, 220, 240, 255])
}

// =============================================================================
// FPS TRACKING
// =============================================================================

struct FpsCounter {
    frame_count: u32,
    last_update: Instant,
    last_frame: Instant,
}

impl FpsCounter {
    fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_update: now,
            last_frame: now,
        }
    }

    /// New window title once per second
    fn frame(&mut self, now: Instant, title: &str, samples: u32) -> Option<String> {
        let frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_update).as_secs_f32();
        if elapsed < 1.0 {
            return None;
        }
        let fps = self.frame_count as f32 / elapsed;
        self.frame_count = 0;
        self.last_update = now;
        Some(format!(
            "{} - {:.0} FPS ({:.2}ms) [MSAA {}x]",
            title,
            fps,
            frame_time * 1000.0,
            samples
        ))
    }
}
