//! Models: meshes sharing a deduplicated texture list
//!
//! Materials index into the model's own texture list. At load time the model
//! reserves a contiguous range of the bindless array and, in the main pass,
//! writes texture `i` to element `bindless_base + i`.

use std::path::Path;

use crate::assets::{ImportedScene, SceneImporter, TextureSlotKind};
use crate::foundation::math::{Mat4, Vec3};
use crate::render::backend::{DrawRecorder, PassKind, TextureRequest, UploadTarget};
use crate::render::backends::vulkan::VulkanResult;
use crate::render::primitives::material::{Material, SlotMapping};
use crate::render::primitives::mesh::Mesh;

/// Ordered meshes, their textures and a world position
pub struct Model<B, T> {
    meshes: Vec<Mesh<B>>,
    textures: Vec<T>,
    texture_paths: Vec<String>,
    bindless_base: u32,
    position: Vec3,
}

impl<B, T> Model<B, T> {
    /// Import a scene file and upload everything it references
    pub fn load<U, I>(target: &mut U, importer: &I, path: &Path, position: Vec3) -> VulkanResult<Self>
    where
        U: UploadTarget<Buffer = B, Texture = T>,
        I: SceneImporter + ?Sized,
    {
        let scene = importer.import(path)?;
        let scene_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let model = Self::from_scene(target, &scene, scene_dir, position)?;

        log::info!(
            "Loaded {}: {} meshes, {} textures, bindless range {}..{}",
            path.display(),
            model.meshes.len(),
            model.textures.len(),
            model.bindless_base,
            model.bindless_base + model.textures.len() as u32
        );
        Ok(model)
    }

    /// Upload an already imported scene; texture files resolve against `scene_dir`
    pub fn from_scene<U>(target: &mut U, scene: &ImportedScene, scene_dir: &Path, position: Vec3) -> VulkanResult<Self>
    where
        U: UploadTarget<Buffer = B, Texture = T>,
    {
        let mut groups = Vec::new();
        scene.root.for_each_mesh(&mut |mesh| groups.push(mesh));

        let mut model = Self {
            meshes: Vec::with_capacity(groups.len()),
            textures: Vec::new(),
            texture_paths: Vec::new(),
            bindless_base: 0,
            position,
        };

        for group in groups {
            if group.vertices.is_empty() || group.indices.is_empty() {
                log::warn!("skipping empty geometry group using material '{}'", group.material.name);
                continue;
            }

            let mut material = Material::default();

            for kind in TextureSlotKind::RESOLVE_ORDER {
                let Some(file) = group.material.texture(kind) else {
                    continue;
                };
                let mapping = SlotMapping::for_kind(kind);
                let path = scene_dir.join(file).to_string_lossy().into_owned();
                let index = model.texture_index(target, &path, mapping)?;
                *material.slot_mut(mapping.slot) = index as i32;
            }

            model
                .meshes
                .push(Mesh::upload(target, &group.vertices, &group.indices, material)?);
        }

        model.bindless_base = target.reserve_texture_slots(model.textures.len() as u32)?;
        Ok(model)
    }

    fn texture_index<U>(&mut self, target: &mut U, path: &str, mapping: SlotMapping) -> VulkanResult<usize>
    where
        U: UploadTarget<Buffer = B, Texture = T>,
    {
        if let Some(index) = self.texture_paths.iter().position(|p| p == path) {
            log::debug!("texture already loaded: {}", path);
            return Ok(index);
        }

        let texture = target.create_texture(&TextureRequest {
            path,
            srgb: mapping.srgb,
            mipmapped: mapping.mipmapped,
        })?;
        self.textures.push(texture);
        self.texture_paths.push(path.to_string());
        Ok(self.textures.len() - 1)
    }

    /// Meshes in import order
    pub fn meshes(&self) -> &[Mesh<B>] {
        &self.meshes
    }

    /// Deduplicated textures
    pub fn textures(&self) -> &[T] {
        &self.textures
    }

    /// First bindless element owned by this model
    pub fn bindless_base(&self) -> u32 {
        self.bindless_base
    }

    /// World-space position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Drop the model's GPU resources and hand its bindless range back to `target`
    ///
    /// The caller must make sure no submitted frame still samples these textures.
    pub fn unload<U>(self, target: &mut U) -> VulkanResult<()>
    where
        U: UploadTarget<Buffer = B, Texture = T>,
    {
        target.release_texture_slots(self.bindless_base, self.textures.len() as u32)
    }

    /// Model matrix for the current position
    pub fn transform(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
    }

    /// Record every mesh at the model's position
    pub fn draw<R>(&self, recorder: &mut R) -> VulkanResult<()>
    where
        R: DrawRecorder<Buffer = B, Texture = T>,
    {
        self.draw_with_transform(recorder, &self.transform())
    }

    /// Record every mesh with an explicit model matrix
    pub fn draw_with_transform<R>(&self, recorder: &mut R, transform: &Mat4) -> VulkanResult<()>
    where
        R: DrawRecorder<Buffer = B, Texture = T>,
    {
        if recorder.pass_kind() == PassKind::Main {
            for (i, texture) in self.textures.iter().enumerate() {
                recorder.write_texture(self.bindless_base + i as u32, texture)?;
            }
        }

        for mesh in &self.meshes {
            mesh.draw(recorder, transform, self.bindless_base);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetError, ImportedMaterial, ImportedMesh, SceneNode};
    use crate::render::backend::mocks::{Command, CountingUploader, RecordingRecorder};
    use crate::render::primitives::mesh::Vertex;

    fn cube() -> (Vec<Vertex>, Vec<u32>) {
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for (n, u, v) in faces {
            let base = vertices.len() as u32;
            for (su, sv, uv) in [(-1.0, -1.0, [0.0, 0.0]), (1.0, -1.0, [1.0, 0.0]), (1.0, 1.0, [1.0, 1.0]), (-1.0, 1.0, [0.0, 1.0])] {
                let p = [
                    n[0] + su * u[0] + sv * v[0],
                    n[1] + su * u[1] + sv * v[1],
                    n[2] + su * u[2] + sv * v[2],
                ];
                vertices.push(Vertex::new(p, n, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        (vertices, indices)
    }

    fn textured_group(textures: &[(TextureSlotKind, &str)]) -> ImportedMesh {
        let (vertices, indices) = cube();
        ImportedMesh {
            vertices,
            indices,
            material: ImportedMaterial {
                name: "crate".into(),
                textures: textures.iter().map(|(k, f)| (*k, f.to_string())).collect(),
            },
        }
    }

    fn scene(meshes: Vec<ImportedMesh>) -> ImportedScene {
        ImportedScene {
            root: SceneNode {
                name: "root".into(),
                meshes,
                children: Vec::new(),
            },
        }
    }

    struct FixedImporter(ImportedScene);

    impl SceneImporter for FixedImporter {
        fn import(&self, _path: &Path) -> Result<ImportedScene, AssetError> {
            Ok(self.0.clone())
        }
    }

    struct FailingImporter;

    impl SceneImporter for FailingImporter {
        fn import(&self, _path: &Path) -> Result<ImportedScene, AssetError> {
            Err(AssetError::Import("missing root node".into()))
        }
    }

    #[test]
    fn textured_cube_uploads_once_and_draws_36_indices() {
        let importer = FixedImporter(scene(vec![textured_group(&[(TextureSlotKind::Diffuse, "crate.png")])]));
        let mut uploader = CountingUploader::default();

        let model = Model::load(&mut uploader, &importer, Path::new("assets/crate/crate.obj"), Vec3::zeros())
            .expect("load");

        let mut recorder = RecordingRecorder::new(PassKind::Main);
        model.draw(&mut recorder).expect("draw");

        assert_eq!(uploader.vertex_buffers, 1);
        assert_eq!(uploader.index_buffers, 1);
        assert_eq!(uploader.textures.len(), 1);
        assert_eq!(uploader.textures[0].path, Path::new("assets/crate").join("crate.png").to_string_lossy());
        assert_eq!(recorder.draws(), [36]);
    }

    #[test]
    fn empty_group_is_skipped_with_its_textures() {
        let mut empty = textured_group(&[(TextureSlotKind::Normals, "unused_normal.png")]);
        empty.indices.clear();
        let mut uploader = CountingUploader::default();

        let model = Model::from_scene(
            &mut uploader,
            &scene(vec![empty, textured_group(&[(TextureSlotKind::Diffuse, "crate.png")])]),
            Path::new("scene"),
            Vec3::zeros(),
        )
        .expect("load");

        assert_eq!(model.meshes().len(), 1);
        assert_eq!(uploader.vertex_buffers, 1);
        assert_eq!(uploader.index_buffers, 1);
        assert_eq!(uploader.textures.len(), 1);
        assert!(uploader.textures[0].path.ends_with("crate.png"));
    }

    #[test]
    fn unloaded_range_goes_back_to_the_target() {
        let mut uploader = CountingUploader::default();
        let group = textured_group(&[(TextureSlotKind::Diffuse, "a.png"), (TextureSlotKind::Normals, "b.png")]);
        Model::from_scene(&mut uploader, &scene(vec![group.clone()]), Path::new("s"), Vec3::zeros()).expect("first");
        let second =
            Model::from_scene(&mut uploader, &scene(vec![group]), Path::new("s"), Vec3::zeros()).expect("second");

        second.unload(&mut uploader).expect("unload");

        assert_eq!(uploader.released, [(2, 2)]);
    }

    #[test]
    fn shared_texture_path_is_uploaded_once() {
        let shared = [(TextureSlotKind::Diffuse, "brick.png")];
        let mut uploader = CountingUploader::default();

        let model = Model::from_scene(
            &mut uploader,
            &scene(vec![textured_group(&shared), textured_group(&shared)]),
            Path::new("scene"),
            Vec3::zeros(),
        )
        .expect("load");

        assert_eq!(uploader.textures.len(), 1);
        assert_eq!(model.textures().len(), 1);
        assert!(model.meshes().iter().all(|m| m.material().diffuse == 0));
    }

    #[test]
    fn material_indices_stay_inside_model_scope() {
        let mut uploader = CountingUploader::default();
        let first = Model::from_scene(
            &mut uploader,
            &scene(vec![textured_group(&[
                (TextureSlotKind::Diffuse, "a.png"),
                (TextureSlotKind::Normals, "a_n.png"),
            ])]),
            Path::new("first"),
            Vec3::zeros(),
        )
        .expect("first");
        let second = Model::from_scene(
            &mut uploader,
            &scene(vec![textured_group(&[(TextureSlotKind::Emissive, "b.png")])]),
            Path::new("second"),
            Vec3::zeros(),
        )
        .expect("second");

        for model in [&first, &second] {
            for mesh in model.meshes() {
                assert!(mesh.material().references_within(model.textures().len()));
            }
        }
        assert_eq!(second.meshes()[0].material().emission, 0);
        assert_eq!(first.bindless_base(), 0);
        assert_eq!(second.bindless_base(), 2);
    }

    #[test]
    fn main_pass_writes_textures_at_bindless_base() {
        let mut uploader = CountingUploader::default();
        uploader.reserved = 5;
        let model = Model::from_scene(
            &mut uploader,
            &scene(vec![textured_group(&[(TextureSlotKind::Diffuse, "a.png")])]),
            Path::new(""),
            Vec3::new(1.0, 2.0, 3.0),
        )
        .expect("load");

        let mut recorder = RecordingRecorder::new(PassKind::Main);
        model.draw(&mut recorder).expect("draw");

        assert_eq!(recorder.commands[0], Command::WriteTexture(5, "a.png".into()));
        assert!(recorder
            .commands
            .contains(&Command::PushModel(Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)))));
    }

    #[test]
    fn shadow_pass_writes_no_textures() {
        let mut uploader = CountingUploader::default();
        let model = Model::from_scene(
            &mut uploader,
            &scene(vec![textured_group(&[(TextureSlotKind::Diffuse, "a.png")])]),
            Path::new(""),
            Vec3::zeros(),
        )
        .expect("load");

        let mut recorder = RecordingRecorder::new(PassKind::Shadow);
        model.draw(&mut recorder).expect("draw");

        assert!(!recorder
            .commands
            .iter()
            .any(|c| matches!(c, Command::WriteTexture(..))));
    }

    #[test]
    fn importer_failure_is_reported() {
        let mut uploader = CountingUploader::default();
        let result: VulkanResult<Model<_, _>> =
            Model::load(&mut uploader, &FailingImporter, Path::new("broken.obj"), Vec3::zeros());

        assert!(result.is_err());
        assert_eq!(uploader.vertex_buffers, 0);
    }
}
