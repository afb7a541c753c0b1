//! Presentable image chain
//!
//! Format, present mode, extent and image count come from the `choose_*`
//! functions of the device policy module. [`Swapchain::rebuild`] tears the
//! whole chain down before creating its replacement; nothing is patched in
//! place.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::initialization::policy::{self, DevicePolicy};
use crate::render::backends::vulkan::resources::texture::create_image_view;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Surface format the policy picks for this surface
pub fn surface_format(context: &VulkanContext, policy: &dyn DevicePolicy) -> VulkanResult<vk::SurfaceFormatKHR> {
    let formats = unsafe {
        context
            .surface_loader
            .get_physical_device_surface_formats(context.physical_device.device, context.surface)
            .map_err(VulkanError::Api)?
    };
    policy::choose_surface_format(&formats, policy)
        .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))
}

/// Swapchain wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the current surface state
    pub fn new(context: &VulkanContext, framebuffer_size: (u32, u32), policy: &dyn DevicePolicy) -> VulkanResult<Self> {
        let mut swapchain = Self {
            device: context.raw_device(),
            loader: context.swapchain_loader().clone(),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            extent: vk::Extent2D::default(),
        };
        swapchain.build(context, framebuffer_size, policy)?;
        Ok(swapchain)
    }

    /// Destroy the chain, then create a new one
    pub fn rebuild(&mut self, context: &VulkanContext, framebuffer_size: (u32, u32), policy: &dyn DevicePolicy) -> VulkanResult<()> {
        self.destroy();
        self.build(context, framebuffer_size, policy)
    }

    fn build(&mut self, context: &VulkanContext, framebuffer_size: (u32, u32), policy: &dyn DevicePolicy) -> VulkanResult<()> {
        let physical_device = context.physical_device.device;
        let surface = context.surface;
        let surface_loader = &context.surface_loader;

        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            )
        };

        let format = policy::choose_surface_format(&formats, policy)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))?;
        let present_mode = policy::choose_present_mode(&present_modes, policy);
        let extent = policy::choose_extent(&capabilities, framebuffer_size);
        let image_count = policy::choose_image_count(&capabilities);

        let families = [context.device.graphics_family, context.device.present_family];
        let (sharing_mode, family_indices): (vk::SharingMode, &[u32]) = if families[0] == families[1] {
            (vk::SharingMode::EXCLUSIVE, &[])
        } else {
            (vk::SharingMode::CONCURRENT, &families)
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        self.swapchain = unsafe { self.loader.create_swapchain(&create_info, None).map_err(VulkanError::Api)? };
        self.images = unsafe { self.loader.get_swapchain_images(self.swapchain).map_err(VulkanError::Api)? };

        for &image in &self.images {
            let view = create_image_view(&self.device, image, format.format, vk::ImageAspectFlags::COLOR, 1)?;
            self.image_views.push(view);
        }

        self.extent = extent;

        log::info!(
            "Created swapchain: {:?}, {:?}, {}x{}, {} images",
            format.format,
            present_mode,
            extent.width,
            extent.height,
            self.images.len()
        );
        Ok(())
    }

    fn destroy(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
        }
        self.swapchain = vk::SwapchainKHR::null();
        self.images.clear();
    }

    /// Acquire the next image; `Ok((index, suboptimal))` or the raw result code
    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
        }
    }

    /// Queue `image_index` for presentation; `Ok(suboptimal)` or the raw result code
    pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, image_index: u32) -> Result<bool, vk::Result> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.loader.queue_present(queue, &present_info) }
    }

    /// Image views in image order
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Current extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}
