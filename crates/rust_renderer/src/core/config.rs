//! # Renderer and Viewer Configuration
//!
//! Serializable settings for the window, the Vulkan renderer, the shadow pass,
//! the fly camera and the scene a viewer should load. Every struct has a
//! `Default` matching the built-in behaviour, so a missing config file changes
//! nothing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{Config, ConfigError};
use crate::foundation::math::Vec3;

/// Default number of entries in the bindless texture array
pub const DEFAULT_BINDLESS_CAPACITY: u32 = 500_000;

/// Default edge length of the square shadow map
pub const DEFAULT_SHADOW_RESOLUTION: u32 = 2048;

/// Window creation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Engine".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Vulkan renderer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,
    /// Validation layer override; `None` enables it in debug builds only
    pub enable_validation: Option<bool>,
    /// Number of entries in each bindless texture set
    pub bindless_capacity: u32,
    /// Directory holding the compiled SPIR-V files
    pub shader_dir: PathBuf,
    /// Clear color of the main pass
    pub clear_color: [f32; 4],
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl RendererConfig {
    /// Whether validation layers should be requested for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Vulkan Engine".to_string(),
            enable_validation: None,
            bindless_capacity: DEFAULT_BINDLESS_CAPACITY,
            shader_dir: PathBuf::from("target/shaders"),
            clear_color: [0.3, 0.3, 0.3, 1.0],
            log_level: "info".to_string(),
        }
    }
}

/// Shadow pass settings
///
/// The orthographic bounds describe one fixed scene scale. They are not fitted
/// to scene bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowConfig {
    /// Shadow map width and height in texels
    pub resolution: u32,
    /// Constant depth bias factor
    pub depth_bias_constant: f32,
    /// Depth bias clamp
    pub depth_bias_clamp: f32,
    /// Slope-scaled depth bias factor
    pub depth_bias_slope: f32,
    /// Orthographic bounds as `[left, right, bottom, top]`
    pub ortho_bounds: [f32; 4],
    /// Light-space near plane
    pub near: f32,
    /// Light-space far plane
    pub far: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_SHADOW_RESOLUTION,
            depth_bias_constant: 1.25,
            depth_bias_clamp: 0.0,
            depth_bias_slope: 1.75,
            ortho_bounds: [0.0, 1.0, -0.5, 0.5],
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Fly camera settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Starting position
    pub position: Vec3,
    /// Units per second
    pub move_speed: f32,
    /// Degrees per pixel of mouse movement
    pub sensitivity: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            move_speed: 1.0,
            sensitivity: 0.2,
            fov_degrees: 60.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// One model to load at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelEntry {
    /// Scene file path
    pub path: PathBuf,
    /// World-space position
    pub position: Vec3,
}

/// Scene contents for the viewer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Direction towards the sun
    pub sun_direction: Vec3,
    /// Sun intensity
    pub sun_intensity: f32,
    /// Models to load
    pub models: Vec<ModelEntry>,
    /// Draw a ground quad under the models
    pub show_ground_quad: bool,
    /// Replace the lit image with the shadow map, for debugging
    pub show_shadow_map: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            sun_direction: Vec3::new(10.0, 10.0, 10.0),
            sun_intensity: 2.0,
            models: Vec::new(),
            show_ground_quad: true,
            show_shadow_map: false,
        }
    }
}

/// Top-level configuration for a viewer application
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Shadow pass settings
    pub shadow: ShadowConfig,
    /// Camera settings
    pub camera: CameraConfig,
    /// Scene settings
    pub scene: SceneConfig,
}

impl ApplicationConfig {
    /// Reject values the renderer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::Invalid(reason.to_string()));

        if self.renderer.application_name.is_empty() {
            return invalid("application name cannot be empty");
        }
        if self.renderer.bindless_capacity == 0 {
            return invalid("bindless capacity must be at least 1");
        }
        if self.shadow.resolution == 0 {
            return invalid("shadow resolution must be at least 1");
        }
        if self.camera.near <= 0.0 || self.camera.far <= self.camera.near {
            return invalid("camera planes must satisfy 0 < near < far");
        }
        if self.shadow.near <= 0.0 || self.shadow.far <= self.shadow.near {
            return invalid("shadow planes must satisfy 0 < near < far");
        }
        Ok(())
    }
}

impl Config for ApplicationConfig {}
