//! Wavefront OBJ importer backed by `tobj`
//!
//! Each OBJ object becomes a child node of a single root. MTL texture maps are
//! reported with the roles a general-purpose importer would give them:
//! `map_bump`/`bump` is a height map and `norm` is a normal map.

use std::path::Path;

use crate::assets::scene::{ImportedMaterial, ImportedMesh, ImportedScene, SceneImporter, SceneNode, TextureSlotKind};
use crate::assets::AssetError;
use crate::render::primitives::mesh::Vertex;

/// MTL keys that `tobj` leaves in `unknown_param`
const EXTRA_TEXTURE_KEYS: [(&str, TextureSlotKind); 6] = [
    ("map_Ke", TextureSlotKind::Emissive),
    ("norm", TextureSlotKind::Normals),
    ("disp", TextureSlotKind::Displacement),
    ("refl", TextureSlotKind::Reflection),
    ("map_Pm", TextureSlotKind::Metalness),
    ("map_ao", TextureSlotKind::AmbientOcclusion),
];

/// OBJ/MTL scene importer
pub struct ObjImporter {
    options: tobj::LoadOptions,
}

impl Default for ObjImporter {
    fn default() -> Self {
        Self {
            options: tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ..Default::default()
            },
        }
    }
}

impl ObjImporter {
    /// Importer that triangulates faces and unifies vertex indices
    pub fn new() -> Self {
        Self::default()
    }

    fn convert_material(material: &tobj::Material) -> ImportedMaterial {
        let mut textures = Vec::new();
        let mut push = |kind, file: &Option<String>| {
            if let Some(file) = file.as_ref().filter(|f| !f.is_empty()) {
                textures.push((kind, file.clone()));
            }
        };

        push(TextureSlotKind::Diffuse, &material.diffuse_texture);
        push(TextureSlotKind::Specular, &material.specular_texture);
        push(TextureSlotKind::Height, &material.normal_texture);
        push(TextureSlotKind::Shininess, &material.shininess_texture);
        push(TextureSlotKind::Opacity, &material.dissolve_texture);

        for (key, kind) in EXTRA_TEXTURE_KEYS {
            if let Some(value) = material.unknown_param.get(key) {
                // Option lines such as "-bm 1.0 file.png" keep the file name last
                if let Some(file) = value.split_whitespace().last() {
                    textures.push((kind, file.to_string()));
                }
            }
        }

        ImportedMaterial {
            name: material.name.clone(),
            textures,
        }
    }

    fn convert_mesh(mesh: &tobj::Mesh, material: ImportedMaterial) -> ImportedMesh {
        let vertex_count = mesh.positions.len() / 3;
        let has_normals = mesh.normals.len() == mesh.positions.len();
        let has_tex_coords = mesh.texcoords.len() / 2 == vertex_count;

        let vertices = (0..vertex_count)
            .map(|i| Vertex {
                position: [mesh.positions[3 * i], mesh.positions[3 * i + 1], mesh.positions[3 * i + 2]],
                normal: if has_normals {
                    [mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2]]
                } else {
                    [0.0, 1.0, 0.0]
                },
                tex_coord: if has_tex_coords {
                    [mesh.texcoords[2 * i], mesh.texcoords[2 * i + 1]]
                } else {
                    [0.0, 0.0]
                },
            })
            .collect();

        ImportedMesh {
            vertices,
            indices: mesh.indices.clone(),
            material,
        }
    }
}

impl SceneImporter for ObjImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, AssetError> {
        let (models, materials) = tobj::load_obj(path, &self.options)
            .map_err(|e| AssetError::Import(format!("{}: {}", path.display(), e)))?;

        let materials = materials.unwrap_or_else(|e| {
            log::warn!("No usable materials for {}: {}", path.display(), e);
            Vec::new()
        });

        if models.is_empty() {
            return Err(AssetError::Import(format!("{}: scene contains no geometry", path.display())));
        }

        let children = models
            .iter()
            .map(|model| {
                let material = model
                    .mesh
                    .material_id
                    .and_then(|id| materials.get(id))
                    .map(Self::convert_material)
                    .unwrap_or_default();

                SceneNode {
                    name: model.name.clone(),
                    meshes: vec![Self::convert_mesh(&model.mesh, material)],
                    children: Vec::new(),
                }
            })
            .collect();

        let root_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::debug!("Imported {} object(s) from {}", models.len(), path.display());

        Ok(ImportedScene {
            root: SceneNode {
                name: root_name,
                meshes: Vec::new(),
                children,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("rust_renderer_obj_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    fn quad_face_is_triangulated_with_material() {
        write_temp(
            "panel.mtl",
            "newmtl panel\nmap_Kd panel_diffuse.png\nmap_bump panel_height.png\nnorm panel_normal.png\nmap_Ke panel_glow.png\n",
        );
        let obj = write_temp(
            "panel.obj",
            "mtllib panel.mtl\no panel\n\
             v -1 -1 0\nv 1 -1 0\nv 1 1 0\nv -1 1 0\n\
             vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
             vn 0 0 1\n\
             usemtl panel\n\
             f 1/1/1 2/2/1 3/3/1 4/4/1\n",
        );

        let scene = ObjImporter::new().import(&obj).expect("import");

        assert_eq!(scene.mesh_count(), 1);
        let mesh = &scene.root.children[0].meshes[0];
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);

        let material = &mesh.material;
        assert_eq!(material.texture(TextureSlotKind::Diffuse), Some("panel_diffuse.png"));
        assert_eq!(material.texture(TextureSlotKind::Height), Some("panel_height.png"));
        assert_eq!(material.texture(TextureSlotKind::Normals), Some("panel_normal.png"));
        assert_eq!(material.texture(TextureSlotKind::Emissive), Some("panel_glow.png"));
    }

    #[test]
    fn missing_normals_fall_back_to_up() {
        let obj = write_temp("tri.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");

        let scene = ObjImporter::new().import(&obj).expect("import");
        let mesh = &scene.root.children[0].meshes[0];

        assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 1.0, 0.0]));
        assert_eq!(mesh.material, ImportedMaterial::default());
    }

    #[test]
    fn unreadable_file_reports_importer_diagnostic() {
        let result = ObjImporter::new().import(Path::new("no/such/scene.obj"));
        match result {
            Err(AssetError::Import(message)) => assert!(message.contains("scene.obj")),
            other => panic!("expected import error, got {:?}", other.map(|s| s.mesh_count())),
        }
    }
}
