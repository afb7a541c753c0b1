//! Swapchain-dependent state and synchronization objects

pub mod framebuffer;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;

pub use framebuffer::{find_depth_format, DepthBuffer, Framebuffer, DEPTH_FORMAT_CANDIDATES};
pub use swapchain::{surface_format, Swapchain};
pub use swapchain_manager::SwapchainManager;
pub use sync::FrameSync;
