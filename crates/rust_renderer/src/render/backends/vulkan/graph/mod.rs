//! Fixed two-pass render graph: shadow depth, then the lit main pass
//!
//! The shadow pass renders into its own render pass whose outgoing subpass
//! dependency makes its depth writes visible to fragment-shader reads, so the
//! main pass recorded right after it in the same command buffer can sample
//! the map without further barriers.

pub mod shadow;
pub mod texture_debug;

use ash::vk;

use crate::foundation::math::Mat4;
use crate::render::backends::vulkan::rendering::recorder::PassRecorder;
use crate::render::backends::vulkan::VulkanResult;
use crate::render::lighting::{DirectionalLight, FragmentUbo, VertexUbo};
use crate::render::primitives::camera::Camera;

pub use shadow::{light_space_matrix, ShadowPass};
pub use texture_debug::{DebugOverlay, OverlayImage, TextureDebugView};

/// What the renderer draws each frame
pub trait SceneRenderer {
    /// Interactive camera of the main pass
    fn camera(&self) -> &Camera;

    /// Sun used for lighting and the shadow map
    fn sun(&self) -> &DirectionalLight;

    /// Record every opaque mesh; called once per pass
    fn draw(&self, recorder: &mut PassRecorder<'_>) -> VulkanResult<()>;

    /// Optional overlay drawn after the main draw, inside the main pass
    fn draw_overlay(&self, _overlay: &mut DebugOverlay<'_, PassRecorder<'_>>) -> VulkanResult<()> {
        Ok(())
    }
}

/// Clear values for the main pass attachments: color, then depth
pub fn main_clear_values(clear_color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ]
}

/// Width over height, or 1 for a degenerate extent
pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}

/// Uniform blocks of the main pass for one frame
pub fn main_uniforms(scene: &(impl SceneRenderer + ?Sized), extent: vk::Extent2D, light_space: &Mat4) -> (VertexUbo, FragmentUbo) {
    let camera = scene.camera();
    let vertex = VertexUbo::default()
        .with_camera(&camera.view_matrix(), &camera.projection_matrix(aspect_ratio(extent)))
        .with_light_space(light_space);
    let fragment = FragmentUbo::new(scene.sun(), camera.position);
    (vertex, fragment)
}
