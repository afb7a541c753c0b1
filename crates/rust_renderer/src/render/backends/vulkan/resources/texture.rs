//! Vulkan texture management
//!
//! A [`Texture`] owns an image, its memory and one view over every mip level.
//! Samplers are separate objects so one sampler can serve the whole bindless
//! array. Uploading from a file goes through the resource allocator, which owns
//! the staging path and the transfer queue.

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::memory::{allocation_size, find_memory_type};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Largest LOD the default sampler may select
pub const DEFAULT_SAMPLER_MAX_LOD: f32 = 14.0;

/// Number of mip levels for a `width` x `height` image
pub fn mip_levels(width: u32, height: u32, mipmapped: bool) -> u32 {
    let largest = width.max(height);
    if !mipmapped || largest == 0 {
        return 1;
    }
    u32::BITS - largest.leading_zeros()
}

/// Image format for `channels` tightly packed channels
pub fn texture_format(channels: u8, srgb: bool, hdr: bool) -> vk::Format {
    match (channels, hdr, srgb) {
        (1, true, _) => vk::Format::R32_SFLOAT,
        (2, true, _) => vk::Format::R32G32_SFLOAT,
        (_, true, _) => vk::Format::R32G32B32A32_SFLOAT,
        (1, false, true) => vk::Format::R8_SRGB,
        (1, false, false) => vk::Format::R8_UNORM,
        (2, false, true) => vk::Format::R8G8_SRGB,
        (2, false, false) => vk::Format::R8G8_UNORM,
        (_, false, true) => vk::Format::R8G8B8A8_SRGB,
        (_, false, false) => vk::Format::R8G8B8A8_UNORM,
    }
}

/// Whether `format` carries a stencil component
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Create a 2D view over `mip_levels` levels of `image`
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None).map_err(VulkanError::Api) }
}

/// GPU image with memory and a view
pub struct Texture {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Texture {
    /// Create a device-local optimal-tiling image, bind memory and build its view
    ///
    /// The image is bound `memory_offset` bytes into a fresh allocation.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent2D,
        mip_levels: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        memory_offset: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_info, None).map_err(VulkanError::Api)? };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let placement = allocation_size(&requirements, memory_offset).and_then(|total| {
            find_memory_type(memory_properties, requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
                .map(|index| (total, index))
        });
        let (total_size, memory_type_index) = match placement {
            Ok(placement) => placement,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(total_size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let mut texture = Self {
            device,
            image,
            memory,
            view: vk::ImageView::null(),
            format,
            extent,
            mip_levels,
        };

        unsafe {
            texture
                .device
                .bind_image_memory(texture.image, texture.memory, memory_offset)
                .map_err(VulkanError::Api)?;
        }

        texture.view = create_image_view(&texture.device, image, format, aspect, mip_levels)?;

        log::debug!(
            "Created image {}x{} {:?} ({} mip levels)",
            extent.width,
            extent.height,
            format,
            mip_levels
        );

        Ok(texture)
    }

    /// Single-level render target such as the shadow map
    pub fn create_attachment(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        Self::new(
            device,
            memory_properties,
            vk::Extent2D { width, height },
            1,
            format,
            usage,
            aspect,
            0,
        )
    }

    /// Image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// View over all mip levels
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Size of mip level 0
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn color_level(level: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: level,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn level_barrier(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    level: u32,
    layouts: (vk::ImageLayout, vk::ImageLayout),
    access: (vk::AccessFlags, vk::AccessFlags),
    stages: (vk::PipelineStageFlags, vk::PipelineStageFlags),
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(layouts.0)
        .new_layout(layouts.1)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_level(level))
        .src_access_mask(access.0)
        .dst_access_mask(access.1);

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            stages.0,
            stages.1,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }
}

/// Record the blit chain that fills levels `1..mip_levels` from level 0
///
/// Expects every level in `TRANSFER_DST_OPTIMAL` and leaves every level in
/// `SHADER_READ_ONLY_OPTIMAL`.
pub fn record_mipmap_blits(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    extent: vk::Extent2D,
    mip_levels: u32,
) {
    let mut mip_width = extent.width as i32;
    let mut mip_height = extent.height as i32;

    for level in 1..mip_levels {
        level_barrier(
            device,
            command_buffer,
            image,
            level - 1,
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        );

        let next_width = (mip_width / 2).max(1);
        let next_height = (mip_height / 2).max(1);

        let blit = vk::ImageBlit::builder()
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: mip_width, y: mip_height, z: 1 },
            ])
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level - 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: next_width, y: next_height, z: 1 },
            ])
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe {
            device.cmd_blit_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit.build()],
                vk::Filter::LINEAR,
            );
        }

        level_barrier(
            device,
            command_buffer,
            image,
            level - 1,
            (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::AccessFlags::TRANSFER_READ, vk::AccessFlags::SHADER_READ),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        );

        mip_width = next_width;
        mip_height = next_height;
    }

    level_barrier(
        device,
        command_buffer,
        image,
        mip_levels - 1,
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ),
        (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
    );
}

/// Sampler flavours used by the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerKind {
    /// Trilinear, repeating, anisotropic; used for material textures
    Default {
        /// Anisotropy level, usually the device maximum
        max_anisotropy: f32,
    },
    /// Linear, clamped to an opaque white border; used for the shadow map
    Shadow,
}

/// Sampler parameters for `kind`
pub fn sampler_create_info(kind: SamplerKind) -> vk::SamplerCreateInfo {
    let builder = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .min_lod(0.0);

    match kind {
        SamplerKind::Default { max_anisotropy } => builder
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .max_lod(DEFAULT_SAMPLER_MAX_LOD)
            .build(),
        SamplerKind::Shadow => builder
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .max_lod(1.0)
            .build(),
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler of the given kind
    pub fn new(device: Device, kind: SamplerKind) -> VulkanResult<Self> {
        let create_info = sampler_create_info(kind);
        let sampler = unsafe { device.create_sampler(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_covers_largest_side() {
        assert_eq!(mip_levels(1024, 1024, true), 11);
        assert_eq!(mip_levels(1024, 300, true), 11);
        assert_eq!(mip_levels(300, 200, true), 9);
        assert_eq!(mip_levels(1, 1, true), 1);
        assert_eq!(mip_levels(1024, 1024, false), 1);
    }

    #[test]
    fn format_follows_channel_count() {
        assert_eq!(texture_format(1, true, false), vk::Format::R8_SRGB);
        assert_eq!(texture_format(2, false, false), vk::Format::R8G8_UNORM);
        assert_eq!(texture_format(4, true, false), vk::Format::R8G8B8A8_SRGB);
        assert_eq!(texture_format(4, false, false), vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn unknown_channel_counts_use_four_channels() {
        assert_eq!(texture_format(3, true, false), vk::Format::R8G8B8A8_SRGB);
        assert_eq!(texture_format(0, false, false), vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn hdr_formats_are_float() {
        assert_eq!(texture_format(1, true, true), vk::Format::R32_SFLOAT);
        assert_eq!(texture_format(2, false, true), vk::Format::R32G32_SFLOAT);
        assert_eq!(texture_format(4, true, true), vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn stencil_formats_are_detected() {
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn shadow_sampler_clamps_to_white_border() {
        let info = sampler_create_info(SamplerKind::Shadow);

        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_BORDER);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::CLAMP_TO_BORDER);
        assert_eq!(info.border_color, vk::BorderColor::FLOAT_OPAQUE_WHITE);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
    }

    #[test]
    fn default_sampler_repeats_with_anisotropy() {
        let info = sampler_create_info(SamplerKind::Default { max_anisotropy: 16.0 });

        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert!((info.max_anisotropy - 16.0).abs() < f32::EPSILON);
        assert!((info.max_lod - DEFAULT_SAMPLER_MAX_LOD).abs() < f32::EPSILON);
    }
}
