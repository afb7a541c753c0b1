//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering, state, frame and graph modules.

/// Instance, device selection and device policy
pub mod initialization;

/// Memory, buffers, textures and descriptors
pub mod resources;

/// Command recording, render passes and pipelines
pub mod rendering;

/// Swapchain-dependent state and synchronization objects
pub mod state;

/// Frame slots and the frame loop state machine
pub mod frame;

/// Fixed shadow-then-main render graph
pub mod graph;

/// Main Vulkan renderer implementation
pub mod renderer;

/// Texture elements of the per-frame uniform set; the shadow map uses the first
pub const MAX_NUM_TEXTURE_BINDING: u32 = 8;

/// Binding of the shadow map in the per-frame uniform set
pub const SHADOW_MAP_BINDING: u32 = 2;

/// Byte offset of the model matrix push constant
pub const MODEL_PUSH_CONSTANT_OFFSET: u32 = 0;

/// Size of the model matrix push constant
pub const MODEL_PUSH_CONSTANT_SIZE: u32 = 64;

/// Byte offset of the nine texture indices, right after the model matrix
pub const TEXTURE_INDEX_PUSH_CONSTANT_OFFSET: u32 = MODEL_PUSH_CONSTANT_OFFSET + MODEL_PUSH_CONSTANT_SIZE;

/// Size of the nine texture indices
pub const TEXTURE_INDEX_PUSH_CONSTANT_SIZE: u32 = 9 * 4;

pub use renderer::VulkanRenderer;

pub use initialization::context::{PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanResult};
pub use initialization::policy::{DefaultDevicePolicy, DevicePolicy};

pub use resources::allocator::ResourceAllocator;
pub use resources::buffer::Buffer;
pub use resources::texture::Texture;

pub use rendering::recorder::PassRecorder;

pub use frame::{FrameOrchestrator, FrameOutcome, MAX_FRAMES_IN_FLIGHT};
pub use graph::{DebugOverlay, SceneRenderer};
