//! Backend implementations for the render module
//!
//! Only Vulkan is implemented.

/// Vulkan rendering backend implementation
pub mod vulkan;
