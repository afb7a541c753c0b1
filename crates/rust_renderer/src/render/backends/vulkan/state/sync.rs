//! Per-slot synchronization: two binary semaphores and one fence
//!
//! `image_available` orders acquisition before color output, `render_finished`
//! orders rendering before presentation, and `in_flight` tells the CPU when the
//! slot's last submission has retired.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Sync objects of one frame slot
pub struct FrameSync {
    device: Device,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

impl FrameSync {
    /// Create the bundle with its fence signaled, so the slot's first wait returns at once
    pub fn new(device: Device) -> VulkanResult<Self> {
        let mut sync = Self {
            device,
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
        };

        // Partially built bundles are released by Drop
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        unsafe {
            sync.image_available = sync
                .device
                .create_semaphore(&semaphore_info, None)
                .map_err(VulkanError::Api)?;
            sync.render_finished = sync
                .device
                .create_semaphore(&semaphore_info, None)
                .map_err(VulkanError::Api)?;
            sync.in_flight = sync
                .device
                .create_fence(
                    &vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED),
                    None,
                )
                .map_err(VulkanError::Api)?;
        }

        Ok(sync)
    }

    /// Block until the slot's previous submission has retired
    pub fn wait_in_flight(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.in_flight], true, u64::MAX)
                .map_err(VulkanError::Api)
        }
    }

    /// Unsignal the fence; only call once a submission is certain to follow
    pub fn reset_in_flight(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.in_flight]).map_err(VulkanError::Api) }
    }

    /// Signaled by acquisition, waited on at color output
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    /// Signaled by the submission, waited on by presentation
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished
    }

    /// Signaled when the submission retires
    pub fn in_flight(&self) -> vk::Fence {
        self.in_flight
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            if self.in_flight != vk::Fence::null() {
                self.device.destroy_fence(self.in_flight, None);
            }
            for semaphore in [self.render_finished, self.image_available] {
                if semaphore != vk::Semaphore::null() {
                    self.device.destroy_semaphore(semaphore, None);
                }
            }
        }
    }
}
