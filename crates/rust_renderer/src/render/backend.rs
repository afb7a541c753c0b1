//! Backend seams used by meshes, models and scenes
//!
//! Geometry and material code talks to the GPU only through these traits.
//! The Vulkan backend implements them with real buffers and command buffers;
//! tests implement them with counting mocks.

use crate::foundation::math::Mat4;
use crate::render::backends::vulkan::VulkanResult;
use crate::render::primitives::material::Material;
use crate::render::primitives::mesh::Vertex;

/// Which pass a recorder is currently recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Depth-only pass from the light's point of view
    Shadow,
    /// Lit color pass into the swapchain image
    Main,
}

/// Parameters of a texture upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRequest<'a> {
    /// Image file path
    pub path: &'a str,
    /// Sample through an sRGB format
    pub srgb: bool,
    /// Build a full mip chain
    pub mipmapped: bool,
}

/// Creates GPU resources from host data
pub trait UploadTarget {
    /// Device-local buffer handle type
    type Buffer;
    /// Sampled texture handle type
    type Texture;

    /// Upload a vertex stream into a device-local vertex buffer
    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> VulkanResult<Self::Buffer>;

    /// Upload an index stream into a device-local index buffer
    fn create_index_buffer(&mut self, indices: &[u32]) -> VulkanResult<Self::Buffer>;

    /// Decode an image file and upload it as a sampled texture
    fn create_texture(&mut self, request: &TextureRequest<'_>) -> VulkanResult<Self::Texture>;

    /// Reserve `count` consecutive bindless elements and return the first one
    fn reserve_texture_slots(&mut self, count: u32) -> VulkanResult<u32>;

    /// Return a range obtained from [`UploadTarget::reserve_texture_slots`]
    fn release_texture_slots(&mut self, base: u32, count: u32) -> VulkanResult<()>;
}

/// Records draw commands for one pass
pub trait DrawRecorder {
    /// Buffer type bound as geometry
    type Buffer;
    /// Texture type written into the bindless array
    type Texture;

    /// Pass currently being recorded
    fn pass_kind(&self) -> PassKind;

    /// Write `texture` into bindless element `index`
    fn write_texture(&mut self, index: u32, texture: &Self::Texture) -> VulkanResult<()>;

    /// Push the per-draw model matrix (vertex stage)
    fn push_model_matrix(&mut self, model: &Mat4);

    /// Push the nine per-draw texture indices (fragment stage)
    fn push_texture_indices(&mut self, material: &Material);

    /// Bind vertex and index buffers
    fn bind_geometry(&mut self, vertex_buffer: &Self::Buffer, index_buffer: &Self::Buffer);

    /// Issue an indexed draw of `index_count` indices
    fn draw_indexed(&mut self, index_count: u32);
}

/// Draw recorder that can also sample an image over the whole viewport
pub trait OverlayRecorder: DrawRecorder {
    /// Image source the overlay samples
    type Image: Clone;

    /// Overlay source for a texture in its sampled layout
    fn texture_image(&self, texture: &Self::Texture) -> Self::Image;

    /// Point the overlay sampler at `image` and switch to the overlay pipeline
    fn bind_overlay_image(&mut self, image: Self::Image) -> VulkanResult<()>;
}

#[cfg(test)]
pub(crate) mod mocks {
    //! Counting implementations of the backend seams

    use super::*;

    /// Fake buffer remembering what it was created from
    #[derive(Debug, Clone, PartialEq)]
    pub struct MockBuffer {
        pub id: usize,
        pub len: usize,
    }

    /// Fake texture remembering its request
    #[derive(Debug, Clone, PartialEq)]
    pub struct MockTexture {
        pub path: String,
        pub srgb: bool,
        pub mipmapped: bool,
    }

    /// Upload target counting every creation
    #[derive(Default)]
    pub struct CountingUploader {
        pub vertex_buffers: usize,
        pub index_buffers: usize,
        pub textures: Vec<MockTexture>,
        pub reserved: u32,
        pub released: Vec<(u32, u32)>,
        next_id: usize,
    }

    impl UploadTarget for CountingUploader {
        type Buffer = MockBuffer;
        type Texture = MockTexture;

        fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> VulkanResult<MockBuffer> {
            self.vertex_buffers += 1;
            self.next_id += 1;
            Ok(MockBuffer { id: self.next_id, len: vertices.len() })
        }

        fn create_index_buffer(&mut self, indices: &[u32]) -> VulkanResult<MockBuffer> {
            self.index_buffers += 1;
            self.next_id += 1;
            Ok(MockBuffer { id: self.next_id, len: indices.len() })
        }

        fn create_texture(&mut self, request: &TextureRequest<'_>) -> VulkanResult<MockTexture> {
            let texture = MockTexture {
                path: request.path.to_string(),
                srgb: request.srgb,
                mipmapped: request.mipmapped,
            };
            self.textures.push(texture.clone());
            Ok(texture)
        }

        fn reserve_texture_slots(&mut self, count: u32) -> VulkanResult<u32> {
            let base = self.reserved;
            self.reserved += count;
            Ok(base)
        }

        fn release_texture_slots(&mut self, base: u32, count: u32) -> VulkanResult<()> {
            self.released.push((base, count));
            Ok(())
        }
    }

    /// One recorded command
    #[derive(Debug, Clone, PartialEq)]
    pub enum Command {
        WriteTexture(u32, String),
        PushModel(Mat4),
        PushTextures([i32; 9]),
        BindGeometry(usize, usize),
        DrawIndexed(u32),
        BindOverlay(String),
    }

    /// Recorder keeping every command in order
    pub struct RecordingRecorder {
        pub kind: PassKind,
        pub commands: Vec<Command>,
    }

    impl RecordingRecorder {
        pub fn new(kind: PassKind) -> Self {
            Self { kind, commands: Vec::new() }
        }

        pub fn draws(&self) -> Vec<u32> {
            self.commands
                .iter()
                .filter_map(|c| match c {
                    Command::DrawIndexed(n) => Some(*n),
                    _ => None,
                })
                .collect()
        }
    }

    impl DrawRecorder for RecordingRecorder {
        type Buffer = MockBuffer;
        type Texture = MockTexture;

        fn pass_kind(&self) -> PassKind {
            self.kind
        }

        fn write_texture(&mut self, index: u32, texture: &MockTexture) -> VulkanResult<()> {
            self.commands.push(Command::WriteTexture(index, texture.path.clone()));
            Ok(())
        }

        fn push_model_matrix(&mut self, model: &Mat4) {
            self.commands.push(Command::PushModel(*model));
        }

        fn push_texture_indices(&mut self, material: &Material) {
            self.commands.push(Command::PushTextures(material.indices()));
        }

        fn bind_geometry(&mut self, vertex_buffer: &MockBuffer, index_buffer: &MockBuffer) {
            self.commands.push(Command::BindGeometry(vertex_buffer.id, index_buffer.id));
        }

        fn draw_indexed(&mut self, index_count: u32) {
            self.commands.push(Command::DrawIndexed(index_count));
        }
    }

    impl OverlayRecorder for RecordingRecorder {
        type Image = String;

        fn texture_image(&self, texture: &MockTexture) -> String {
            texture.path.clone()
        }

        fn bind_overlay_image(&mut self, image: String) -> VulkanResult<()> {
            self.commands.push(Command::BindOverlay(image));
            Ok(())
        }
    }
}
