//! GPU resource creation and the staging upload path
//!
//! Every device-local resource initialized from host data goes through a
//! throwaway staging buffer and a single-time command buffer. The submit waits
//! for the graphics queue to go idle before the staging buffer is dropped, so
//! transfers are serialized.

use std::ops::Range;

use ash::{vk, Device, Instance};

use crate::assets::{ImageData, ImageLoadOptions};
use crate::render::backend::{TextureRequest, UploadTarget};
use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::texture::{self, has_stencil_component, Texture};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::primitives::mesh::Vertex;

/// Access masks and stages of one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Access that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Access that waits for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing `src_access`
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming `dst_access`
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for the supported layout transitions
pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<TransitionMasks> {
    use vk::ImageLayout as L;

    match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        }),
        (from, to) => Err(VulkanError::UnsupportedLayoutTransition { from, to }),
    }
}

/// Image aspect touched by a transition into `new`
pub fn transition_aspect(format: vk::Format, new: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// First-fit allocator over the elements of the bindless array
///
/// Free ranges are kept sorted and never adjacent, so a released range merges
/// with its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindlessRanges {
    capacity: u32,
    free: Vec<Range<u32>>,
}

impl BindlessRanges {
    /// Every element of a `capacity`-sized array free
    pub fn new(capacity: u32) -> Self {
        let free = if capacity == 0 { Vec::new() } else { vec![0..capacity] };
        Self { capacity, free }
    }

    /// Take `count` consecutive elements and return the first one
    pub fn reserve(&mut self, count: u32) -> VulkanResult<u32> {
        if count == 0 {
            return Ok(0);
        }

        let Some(pos) = self.free.iter().position(|range| range.end - range.start >= count) else {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "bindless array exhausted: {} requested, {} of {} free",
                    count,
                    self.available(),
                    self.capacity
                ),
            });
        };

        let base = self.free[pos].start;
        self.free[pos].start += count;
        if self.free[pos].is_empty() {
            self.free.remove(pos);
        }
        Ok(base)
    }

    /// Give back a range returned by [`BindlessRanges::reserve`]
    pub fn release(&mut self, base: u32, count: u32) -> VulkanResult<()> {
        if count == 0 {
            return Ok(());
        }

        let end = match base.checked_add(count) {
            Some(end) if end <= self.capacity => end,
            _ => {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("bindless range {}+{} outside capacity {}", base, count, self.capacity),
                })
            }
        };

        let pos = self.free.partition_point(|range| range.start < base);
        let overlaps_prev = pos > 0 && self.free[pos - 1].end > base;
        let overlaps_next = self.free.get(pos).is_some_and(|next| next.start < end);
        if overlaps_prev || overlaps_next {
            return Err(VulkanError::InvalidOperation {
                reason: format!("bindless range {}..{} is already free", base, end),
            });
        }

        self.free.insert(pos, base..end);
        if self.free.get(pos + 1).is_some_and(|next| next.start == end) {
            let next = self.free.remove(pos + 1);
            self.free[pos].end = next.end;
        }
        if pos > 0 && self.free[pos - 1].end == base {
            let merged = self.free.remove(pos);
            self.free[pos - 1].end = merged.end;
        }
        Ok(())
    }

    /// Number of free elements
    pub fn available(&self) -> u32 {
        self.free.iter().map(|range| range.end - range.start).sum()
    }
}

/// Creates buffers and images and runs single-time transfers
pub struct ResourceAllocator {
    device: Device,
    instance: Instance,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    max_sampler_anisotropy: f32,
    graphics_queue: vk::Queue,
    command_pool: CommandPool,
    bindless: BindlessRanges,
}

impl ResourceAllocator {
    /// Create an allocator with its own transfer command pool
    pub fn new(context: &VulkanContext, bindless_capacity: u32) -> VulkanResult<Self> {
        let device = context.raw_device();
        let command_pool = CommandPool::new(device.clone(), context.device.graphics_family)?;

        Ok(Self {
            device,
            instance: context.instance().clone(),
            physical_device: context.physical_device.device,
            memory_properties: context.physical_device.memory_properties,
            max_sampler_anisotropy: context.physical_device.properties.limits.max_sampler_anisotropy,
            graphics_queue: context.graphics_queue(),
            command_pool,
            bindless: BindlessRanges::new(bindless_capacity),
        })
    }

    /// Device handle
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Memory heaps of the selected GPU
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Largest anisotropy the default sampler may use
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.max_sampler_anisotropy
    }

    /// Allocate a buffer with memory matching `properties`
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Buffer> {
        Buffer::new(self.device.clone(), &self.memory_properties, size, usage, properties, 0)
    }

    /// Device-local buffer initialized from `bytes` through a staging buffer
    pub fn create_device_local_buffer(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> VulkanResult<Buffer> {
        let staging = Buffer::staging(self.device.clone(), &self.memory_properties, bytes)?;
        let buffer = self.create_buffer(
            bytes.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let mut recorder = self.begin_single_time_commands()?;
        recorder.cmd_copy_buffer(staging.handle(), buffer.handle(), bytes.len() as vk::DeviceSize);
        self.end_single_time_commands(recorder)?;

        log::debug!("Uploaded {} bytes into {:?} buffer", bytes.len(), usage);
        Ok(buffer)
    }

    /// Allocate a throwaway command buffer and begin it
    pub fn begin_single_time_commands(&self) -> VulkanResult<CommandRecorder> {
        self.command_pool.begin_single_time()
    }

    /// End, submit and wait for a single-time command buffer, then free it
    pub fn end_single_time_commands(&self, mut recorder: CommandRecorder) -> VulkanResult<()> {
        let result = self.submit_and_wait(&mut recorder);
        self.command_pool.free_command_buffers(&[recorder.handle()]);
        result
    }

    fn submit_and_wait(&self, recorder: &mut CommandRecorder) -> VulkanResult<()> {
        let command_buffers = [recorder.end()?];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device
                .queue_wait_idle(self.graphics_queue)
                .map_err(VulkanError::Api)
        }
    }

    /// Record a layout transition over `mip_levels` levels of `image`
    pub fn record_transition(
        recorder: &mut CommandRecorder,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        mip_levels: u32,
    ) -> VulkanResult<()> {
        let masks = layout_transition(old, new)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: transition_aspect(format, new),
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        recorder.cmd_image_barrier(masks.src_stage, masks.dst_stage, &barrier);
        Ok(())
    }

    /// Transition `image` in its own single-time submission
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        mip_levels: u32,
    ) -> VulkanResult<()> {
        layout_transition(old, new)?;

        let mut recorder = self.begin_single_time_commands()?;
        if let Err(e) = Self::record_transition(&mut recorder, image, format, old, new, mip_levels) {
            self.command_pool.free_command_buffers(&[recorder.handle()]);
            return Err(e);
        }
        self.end_single_time_commands(recorder)
    }

    fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    /// Upload decoded pixels into a sampled texture, optionally with mipmaps
    pub fn upload_image(&self, data: &ImageData, srgb: bool, mipmapped: bool) -> VulkanResult<Texture> {
        let format = texture::texture_format(data.channels, srgb, data.hdr);
        let mip_levels = texture::mip_levels(data.width, data.height, mipmapped);

        if mip_levels > 1 && !self.supports_linear_blit(format) {
            return Err(VulkanError::UnsupportedFormat {
                format,
                reason: "no linear blit support for mipmap generation".to_string(),
            });
        }

        let extent = vk::Extent2D {
            width: data.width,
            height: data.height,
        };

        let staging = Buffer::staging(self.device.clone(), &self.memory_properties, &data.pixels)?;
        let texture = Texture::new(
            self.device.clone(),
            &self.memory_properties,
            extent,
            mip_levels,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            0,
        )?;

        let mut recorder = self.begin_single_time_commands()?;
        let recorded = Self::record_transition(
            &mut recorder,
            texture.image(),
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            mip_levels,
        )
        .and_then(|()| {
            recorder.cmd_copy_buffer_to_image(staging.handle(), texture.image(), extent);
            if mip_levels > 1 {
                texture::record_mipmap_blits(&self.device, recorder.handle(), texture.image(), extent, mip_levels);
                Ok(())
            } else {
                Self::record_transition(
                    &mut recorder,
                    texture.image(),
                    format,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    1,
                )
            }
        });

        if let Err(e) = recorded {
            self.command_pool.free_command_buffers(&[recorder.handle()]);
            return Err(e);
        }
        self.end_single_time_commands(recorder)?;

        Ok(texture)
    }

    /// Single-level render target
    pub fn create_attachment(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Texture> {
        Texture::create_attachment(
            self.device.clone(),
            &self.memory_properties,
            extent.width,
            extent.height,
            format,
            usage,
            aspect,
        )
    }

    /// Whether `format` can be an optimal-tiling depth/stencil attachment
    pub fn supports_depth_attachment(&self, format: vk::Format) -> bool {
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    }
}

impl UploadTarget for ResourceAllocator {
    type Buffer = Buffer;
    type Texture = Texture;

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> VulkanResult<Buffer> {
        self.create_device_local_buffer(bytemuck::cast_slice(vertices), vk::BufferUsageFlags::VERTEX_BUFFER)
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> VulkanResult<Buffer> {
        self.create_device_local_buffer(bytemuck::cast_slice(indices), vk::BufferUsageFlags::INDEX_BUFFER)
    }

    fn create_texture(&mut self, request: &TextureRequest<'_>) -> VulkanResult<Texture> {
        let data = ImageData::from_file(request.path, ImageLoadOptions::default())?;
        self.upload_image(&data, request.srgb, request.mipmapped)
    }

    fn reserve_texture_slots(&mut self, count: u32) -> VulkanResult<u32> {
        let base = self.bindless.reserve(count)?;
        log::debug!(
            "Reserved bindless elements {}..{}, {} left",
            base,
            base + count,
            self.bindless.available()
        );
        Ok(base)
    }

    fn release_texture_slots(&mut self, base: u32, count: u32) -> VulkanResult<()> {
        self.bindless.release(base, count)?;
        log::debug!("Released bindless elements {}..{}", base, base + count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transitions_use_transfer_stages() {
        let to_dst = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .expect("supported");
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(to_dst.src_access, vk::AccessFlags::empty());
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);

        let to_read = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .expect("supported");
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn depth_transition_waits_on_early_fragment_tests() {
        let masks = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .expect("supported");

        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
        assert!(masks.dst_access.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(masks.dst_access.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ));
    }

    #[test]
    fn unknown_transition_is_rejected() {
        let result = layout_transition(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        assert!(matches!(
            result,
            Err(VulkanError::UnsupportedLayoutTransition {
                from: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                to: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            })
        ));
    }

    #[test]
    fn depth_aspect_includes_stencil_when_present() {
        let layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;

        assert_eq!(transition_aspect(vk::Format::D32_SFLOAT, layout), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            transition_aspect(vk::Format::D24_UNORM_S8_UINT, layout),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            transition_aspect(vk::Format::R8G8B8A8_SRGB, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn reservations_are_contiguous_and_bounded() {
        let mut ranges = BindlessRanges::new(10);

        assert_eq!(ranges.reserve(3).ok(), Some(0));
        assert_eq!(ranges.reserve(7).ok(), Some(3));
        assert!(matches!(ranges.reserve(1), Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(ranges.available(), 0);
    }

    #[test]
    fn released_range_is_reused() {
        let mut ranges = BindlessRanges::new(8);
        let first = ranges.reserve(4).expect("first");
        ranges.reserve(4).expect("second");

        ranges.release(first, 4).expect("release");

        assert_eq!(ranges.reserve(4).ok(), Some(first));
    }

    #[test]
    fn neighbouring_releases_merge() {
        let mut ranges = BindlessRanges::new(9);
        let a = ranges.reserve(3).expect("a");
        let b = ranges.reserve(3).expect("b");
        let c = ranges.reserve(3).expect("c");

        ranges.release(a, 3).expect("a");
        ranges.release(c, 3).expect("c");
        assert!(ranges.reserve(6).is_err());

        ranges.release(b, 3).expect("b");
        assert_eq!(ranges, BindlessRanges::new(9));
        assert_eq!(ranges.reserve(9).ok(), Some(0));
    }

    #[test]
    fn double_release_is_rejected() {
        let mut ranges = BindlessRanges::new(4);
        let base = ranges.reserve(2).expect("reserve");
        ranges.release(base, 2).expect("release");

        assert!(ranges.release(base, 2).is_err());
        assert!(ranges.release(3, 2).is_err());
    }
}
