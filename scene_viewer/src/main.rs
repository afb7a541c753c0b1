//! Scene viewer
//!
//! Loads the models listed in `viewer.toml` (or nothing, with defaults),
//! optionally lays a ground quad under them and renders the scene with a
//! shadow-casting sun until the window is closed. With `scene.show_shadow_map`
//! set, the shadow map is drawn over the whole window instead.
//!
//! Controls: W/S/A/D/E/Q move, hold the right mouse button to look around,
//! Escape quits.

use rust_renderer::assets::ObjImporter;
use rust_renderer::config::{Config, ConfigError};
use rust_renderer::core::config::ApplicationConfig;
use rust_renderer::foundation::logging;
use rust_renderer::foundation::time::Timer;
use rust_renderer::render::backends::vulkan::{
    Buffer, DebugOverlay, DefaultDevicePolicy, PassRecorder, SceneRenderer, Texture, VulkanError, VulkanRenderer, VulkanResult,
};
use rust_renderer::render::{ground_plane_transform, Camera, DirectionalLight, Model, Window, WindowError};
use thiserror::Error;

const CONFIG_PATH: &str = "viewer.toml";

/// Anything that ends the viewer early
#[derive(Error, Debug)]
enum ViewerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("window error: {0}")]
    Window(#[from] WindowError),

    #[error("renderer error: {0}")]
    Renderer(#[from] VulkanError),
}

/// Models, camera and sun handed to the renderer each frame
struct ViewerScene {
    camera: Camera,
    sun: DirectionalLight,
    models: Vec<Model<Buffer, Texture>>,
    ground_quad: bool,
    show_shadow_map: bool,
}

impl SceneRenderer for ViewerScene {
    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn sun(&self) -> &DirectionalLight {
        &self.sun
    }

    fn draw(&self, recorder: &mut PassRecorder<'_>) -> VulkanResult<()> {
        for model in &self.models {
            model.draw(recorder)?;
        }

        if self.ground_quad {
            if let Some(quad) = recorder.primitives().cached_quad() {
                quad.draw(recorder, &ground_plane_transform(), 0);
            }
        }
        Ok(())
    }

    fn draw_overlay(&self, overlay: &mut DebugOverlay<'_, PassRecorder<'_>>) -> VulkanResult<()> {
        if self.show_shadow_map {
            overlay.show_shadow_map()?;
        }
        Ok(())
    }
}

fn load_config() -> Result<ApplicationConfig, ConfigError> {
    let config = ApplicationConfig::load_or_default(CONFIG_PATH)?;
    config.validate()?;
    Ok(config)
}

fn run(config: &ApplicationConfig) -> Result<(), ViewerError> {
    let mut window = Window::new(&config.window)?;
    let mut renderer = VulkanRenderer::new(&window, &config.renderer, &config.shadow, Box::new(DefaultDevicePolicy))?;
    let (width, height) = renderer.swapchain_extent();
    log::info!("Rendering on {} at {}x{}", renderer.device_name(), width, height);

    let importer = ObjImporter::new();
    let mut models = Vec::with_capacity(config.scene.models.len());
    for entry in &config.scene.models {
        let model = renderer.load_model(&importer, &entry.path, entry.position)?;
        log::info!(
            "Loaded {} ({} meshes, {} textures)",
            entry.path.display(),
            model.meshes().len(),
            model.textures().len()
        );
        models.push(model);
    }

    if config.scene.show_ground_quad || config.scene.show_shadow_map {
        renderer.quad()?;
    }

    let mut scene = ViewerScene {
        camera: Camera::from_config(&config.camera),
        sun: DirectionalLight::new(config.scene.sun_direction, config.scene.sun_intensity),
        models,
        ground_quad: config.scene.show_ground_quad,
        show_shadow_map: config.scene.show_shadow_map,
    };

    let mut timer = Timer::new();
    while !window.should_close() {
        window.poll_events();
        let dt = timer.tick();

        window.input_snapshot().apply(&mut scene.camera, dt);

        renderer.draw_frame(&mut window, &scene)?;
    }

    renderer.wait_idle()?;
    log::info!(
        "Shutting down after {} frames ({:.1} fps average)",
        renderer.frames_presented(),
        timer.average_fps()
    );

    // GPU objects owned by the scene must go before the device
    for model in scene.models.drain(..) {
        renderer.unload_model(model)?;
    }
    drop(renderer);
    drop(window);
    Ok(())
}

fn main() -> Result<(), ViewerError> {
    let config = load_config();
    let level = config
        .as_ref()
        .map_or("info", |config| config.renderer.log_level.as_str());
    logging::init(level);

    let result = config.map_err(ViewerError::from).and_then(|config| run(&config));
    if let Err(e) = &result {
        log::error!("{}", e);
    }
    result
}
