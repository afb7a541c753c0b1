//! GPU memory, buffers, images and descriptors

pub mod allocator;
pub mod buffer;
pub mod descriptor_set;
pub mod memory;
pub mod texture;

pub use allocator::ResourceAllocator;
pub use buffer::{Buffer, MappedUniformBuffer};
pub use descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetWriter};
pub use texture::{Sampler, SamplerKind, Texture};
