//! Device and swapchain selection policy
//!
//! [`DevicePolicy`] holds the customization points of device bootstrap and
//! swapchain creation. Every method has a default, so an empty `impl` gives the
//! stock behavior. The `choose_*` functions apply a policy to what the surface
//! reports and contain no Vulkan calls.

use ash::vk;

/// Surface format accepted by the default policy
pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Present mode accepted by the default policy
pub const DEFAULT_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::MAILBOX;

/// Present mode every implementation supports
pub const FALLBACK_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;

/// Customization points for device bootstrap and swapchain creation
pub trait DevicePolicy {
    /// Extra per-device check after the fixed requirements pass
    fn is_device_suitable(&self, _properties: &vk::PhysicalDeviceProperties, _features: &vk::PhysicalDeviceFeatures) -> bool {
        true
    }

    /// Turn on additional core features; anisotropy is already on
    fn enable_features(&self, available: &vk::PhysicalDeviceFeatures, enabled: &mut vk::PhysicalDeviceFeatures) {
        enabled.sampler_anisotropy = available.sampler_anisotropy;
    }

    /// Whether a surface format is acceptable
    fn accepts_surface_format(&self, format: &vk::SurfaceFormatKHR) -> bool {
        format.format == DEFAULT_SURFACE_FORMAT.format && format.color_space == DEFAULT_SURFACE_FORMAT.color_space
    }

    /// Whether a present mode is acceptable
    fn accepts_present_mode(&self, mode: vk::PresentModeKHR) -> bool {
        mode == DEFAULT_PRESENT_MODE
    }
}

/// The stock policy
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDevicePolicy;

impl DevicePolicy for DefaultDevicePolicy {}

/// First accepted format, else the first available one
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR], policy: &dyn DevicePolicy) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| policy.accepts_surface_format(format))
        .or_else(|| available.first())
        .copied()
}

/// First accepted present mode, else FIFO
pub fn choose_present_mode(available: &[vk::PresentModeKHR], policy: &dyn DevicePolicy) -> vk::PresentModeKHR {
    available
        .iter()
        .copied()
        .find(|&mode| policy.accepts_present_mode(mode))
        .unwrap_or(FALLBACK_PRESENT_MODE)
}

/// Surface extent, or the framebuffer size clamped to the surface limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: framebuffer.0.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer.1.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    struct FifoOnly;

    impl DevicePolicy for FifoOnly {
        fn accepts_present_mode(&self, mode: vk::PresentModeKHR) -> bool {
            mode == vk::PresentModeKHR::IMMEDIATE
        }

        fn accepts_surface_format(&self, format: &vk::SurfaceFormatKHR) -> bool {
            format.format == vk::Format::B8G8R8A8_UNORM
        }
    }

    #[test]
    fn default_format_is_preferred() {
        let available = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            DEFAULT_SURFACE_FORMAT,
        ];

        let chosen = choose_surface_format(&available, &DefaultDevicePolicy).expect("format");

        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn first_format_is_the_fallback() {
        let available = [
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];

        let chosen = choose_surface_format(&available, &DefaultDevicePolicy).expect("format");

        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert!(choose_surface_format(&[], &DefaultDevicePolicy).is_none());
    }

    #[test]
    fn custom_policy_overrides_defaults() {
        let formats = [DEFAULT_SURFACE_FORMAT, format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];

        assert_eq!(
            choose_surface_format(&formats, &FifoOnly).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_UNORM)
        );
        assert_eq!(choose_present_mode(&modes, &FifoOnly), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes, &DefaultDevicePolicy), vk::PresentModeKHR::FIFO);

        let with_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&with_mailbox, &DefaultDevicePolicy), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn current_extent_wins_when_defined() {
        let caps = capabilities((1024, 768), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, (10, 10));
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn undefined_extent_clamps_each_axis_to_its_own_limits() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 50), (2000, 400));

        let extent = choose_extent(&caps, (3000, 1000));
        assert_eq!((extent.width, extent.height), (2000, 400));

        let extent = choose_extent(&caps, (10, 10));
        assert_eq!((extent.width, extent.height), (100, 50));
    }

    #[test]
    fn repeated_resize_to_same_size_gives_same_extent() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (1920, 1080));

        let extents: Vec<_> = (0..5).map(|_| choose_extent(&caps, (2560, 900))).collect();

        assert!(extents.iter().all(|e| e.width == 1920 && e.height == 900));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        let mut caps = capabilities((800, 600), (1, 1), (800, 600));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
    }
}
