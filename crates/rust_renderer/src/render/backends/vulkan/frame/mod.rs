//! Frame lifecycle
//!
//! [`FrameOrchestrator`] drives the wait, acquire, reset, record, submit and
//! present cycle over a fixed ring of [`MAX_FRAMES_IN_FLIGHT`] frame slots.
//! Every GPU call goes through [`FrameBackend`], so the cycle itself can be
//! checked against a recording mock.

pub mod orchestrator;
pub mod slot;

use ash::vk;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

pub use orchestrator::{FrameOrchestrator, FrameOutcome};
pub use slot::FrameSlot;

/// Number of frame slots; bounds how far the CPU may run ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-slot position in the frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// Not being worked on by the CPU
    #[default]
    Idle,
    /// Waiting on the fence or the swapchain image
    Acquiring,
    /// Command buffer is being recorded
    Recording,
    /// Command buffer is on the graphics queue
    Submitted,
    /// Image is queued for presentation
    Presenting,
}

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image ready to render into
    Acquired {
        /// Index into the swapchain images
        image_index: u32,
        /// The chain still works but no longer matches the surface
        suboptimal: bool,
    },
    /// The chain must be rebuilt before anything can be acquired
    OutOfDate,
}

impl AcquireOutcome {
    /// Classify a raw acquire result; unexpected codes are errors
    pub fn from_result(result: Result<(u32, bool), vk::Result>) -> VulkanResult<Self> {
        match result {
            Ok((image_index, suboptimal)) => Ok(Self::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }
}

/// Result of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented against an up-to-date chain
    Presented,
    /// Presented or refused, but the chain is out of date or suboptimal
    Stale,
}

impl PresentOutcome {
    /// Classify a raw present result; unexpected codes are errors
    pub fn from_result(result: Result<bool, vk::Result>) -> VulkanResult<Self> {
        match result {
            Ok(false) => Ok(Self::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::Stale),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }
}

/// GPU operations of one frame, in the order the orchestrator calls them
pub trait FrameBackend {
    /// What gets drawn each frame
    type Scene: ?Sized;

    /// Block until slot `slot`'s previous submission has retired
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Acquire the next swapchain image, signaling the slot's acquire semaphore
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome>;

    /// Unsignal the slot's fence; only called when a submission will follow
    fn reset_slot_fence(&mut self, slot: usize) -> VulkanResult<()>;

    /// Reset and re-record the slot's command buffer for `image_index`
    fn record(&mut self, slot: usize, image_index: u32, scene: &Self::Scene) -> VulkanResult<()>;

    /// Submit the slot's command buffer, signaling its fence
    fn submit(&mut self, slot: usize) -> VulkanResult<()>;

    /// Present `image_index` once the slot's rendering has finished
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Tear down and rebuild everything sized to the swapchain
    fn recreate_swapchain(&mut self) -> VulkanResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_acquire_is_not_an_error() {
        assert_eq!(
            AcquireOutcome::from_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).expect("recoverable"),
            AcquireOutcome::OutOfDate
        );
        assert_eq!(
            AcquireOutcome::from_result(Ok((1, true))).expect("acquired"),
            AcquireOutcome::Acquired {
                image_index: 1,
                suboptimal: true
            }
        );
    }

    #[test]
    fn device_loss_is_fatal() {
        assert!(matches!(
            AcquireOutcome::from_result(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert!(PresentOutcome::from_result(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn suboptimal_and_out_of_date_presents_are_stale() {
        assert_eq!(PresentOutcome::from_result(Ok(false)).expect("ok"), PresentOutcome::Presented);
        assert_eq!(PresentOutcome::from_result(Ok(true)).expect("ok"), PresentOutcome::Stale);
        assert_eq!(
            PresentOutcome::from_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).expect("ok"),
            PresentOutcome::Stale
        );
    }
}
