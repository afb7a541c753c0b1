//! Framebuffers and the swapchain depth buffer

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::allocator::ResourceAllocator;
use crate::render::backends::vulkan::resources::texture::{has_stencil_component, Texture};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate accepted by `supported`
pub fn find_depth_format(candidates: &[vk::Format], supported: impl Fn(vk::Format) -> bool) -> VulkanResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| supported(format))
        .ok_or(VulkanError::UnsupportedFormat {
            format: candidates.first().copied().unwrap_or(vk::Format::UNDEFINED),
            reason: "no candidate depth format supports optimal-tiling depth attachments".to_string(),
        })
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a single-layer framebuffer
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Depth attachment sized to the swapchain
pub struct DepthBuffer {
    texture: Texture,
}

impl DepthBuffer {
    /// Create the image and move it into the attachment layout
    pub fn new(allocator: &ResourceAllocator, extent: vk::Extent2D, format: vk::Format) -> VulkanResult<Self> {
        let aspect = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };
        let texture = allocator.create_attachment(extent, format, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT, aspect)?;

        allocator.transition_image_layout(
            texture.image(),
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            1,
        )?;

        log::debug!("Created {}x{} depth buffer ({:?})", extent.width, extent.height, format);
        Ok(Self { texture })
    }

    /// Depth image view
    pub fn image_view(&self) -> vk::ImageView {
        self.texture.view()
    }

    /// Depth format
    pub fn format(&self) -> vk::Format {
        self.texture.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_supported_depth_format_wins() {
        let format = find_depth_format(&DEPTH_FORMAT_CANDIDATES, |f| f != vk::Format::D32_SFLOAT).expect("format");
        assert_eq!(format, vk::Format::D32_SFLOAT_S8_UINT);

        let format = find_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| true).expect("format");
        assert_eq!(format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn no_supported_depth_format_is_an_error() {
        let result = find_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| false);
        assert!(matches!(result, Err(VulkanError::UnsupportedFormat { .. })));
    }
}
