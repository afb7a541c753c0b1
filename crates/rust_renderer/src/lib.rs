//! # Rust Renderer
//!
//! A Vulkan renderer built around an explicit frame lifecycle: two frames in
//! flight, swapchain recreation on resize, a directional-light shadow pass
//! and a bindless texture array sampled by the main pass.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_renderer::prelude::*;
//!
//! struct Empty {
//!     camera: Camera,
//!     sun: DirectionalLight,
//! }
//!
//! impl SceneRenderer for Empty {
//!     fn camera(&self) -> &Camera {
//!         &self.camera
//!     }
//!
//!     fn sun(&self) -> &DirectionalLight {
//!         &self.sun
//!     }
//!
//!     fn draw(&self, _recorder: &mut PassRecorder<'_>) -> VulkanResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::default();
//!     let mut window = Window::new(&config.window)?;
//!     let mut renderer = VulkanRenderer::new(
//!         &window,
//!         &config.renderer,
//!         &config.shadow,
//!         Box::new(DefaultDevicePolicy),
//!     )?;
//!     let scene = Empty { camera: Camera::default(), sun: DirectionalLight::default() };
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.draw_frame(&mut window, &scene)?;
//!     }
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;

pub mod foundation;
pub mod config;
pub mod assets;
pub mod render;
pub mod input;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        assets::{ObjImporter, SceneImporter},
        config::{Config, ConfigError},
        core::config::{ApplicationConfig, CameraConfig, RendererConfig, SceneConfig, ShadowConfig, WindowConfig},
        foundation::{
            math::{Mat4, Vec3},
            time::Timer,
        },
        render::{
            backends::vulkan::{
                DebugOverlay, DefaultDevicePolicy, DevicePolicy, FrameOutcome, PassRecorder, SceneRenderer,
                VulkanError, VulkanRenderer, VulkanResult,
            },
            ground_plane_transform, Camera, DirectionalLight, Window,
        },
    };
}
