//! Vulkan initialization: instance, device selection and device policy

pub mod context;
pub mod policy;
