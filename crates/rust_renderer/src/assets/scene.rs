//! Imported scene representation
//!
//! A scene is a tree of nodes. Each node owns zero or more triangle meshes,
//! and each mesh carries the material record the importer found for it.
//! Texture references stay as path strings relative to the scene file.

use std::path::Path;

use crate::assets::AssetError;
use crate::render::primitives::mesh::Vertex;

/// Texture roles an importer can report for a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlotKind {
    /// Diffuse color
    Diffuse,
    /// Specular intensity
    Specular,
    /// Emissive color
    Emissive,
    /// Height/bump map
    Height,
    /// Tangent-space normals
    Normals,
    /// Shininess (used as roughness)
    Shininess,
    /// Opacity mask
    Opacity,
    /// Displacement (used as bump)
    Displacement,
    /// Reflection (used as specular)
    Reflection,
    /// PBR base color (used as diffuse)
    BaseColor,
    /// Camera-space normals (used as normals)
    NormalCamera,
    /// PBR metalness
    Metalness,
    /// Ambient occlusion
    AmbientOcclusion,
    /// glTF metallic-roughness texture (used as roughness)
    MetallicRoughness,
}

impl TextureSlotKind {
    /// Every kind, in the order a material is resolved; later kinds win on conflict
    pub const RESOLVE_ORDER: [Self; 14] = [
        Self::Diffuse,
        Self::Specular,
        Self::Emissive,
        Self::Height,
        Self::Normals,
        Self::Shininess,
        Self::Opacity,
        Self::Displacement,
        Self::Reflection,
        Self::BaseColor,
        Self::NormalCamera,
        Self::Metalness,
        Self::AmbientOcclusion,
        Self::MetallicRoughness,
    ];
}

/// Material record attached to an imported mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMaterial {
    /// Material name from the source file
    pub name: String,
    /// Texture file per role, relative to the scene directory
    pub textures: Vec<(TextureSlotKind, String)>,
}

impl ImportedMaterial {
    /// First texture reported for `kind`
    pub fn texture(&self, kind: TextureSlotKind) -> Option<&str> {
        self.textures
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, file)| file.as_str())
    }
}

/// Triangle-list geometry group
#[derive(Debug, Clone, Default)]
pub struct ImportedMesh {
    /// Interleaved vertex stream
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices into `vertices`
    pub indices: Vec<u32>,
    /// Material for this group
    pub material: ImportedMaterial,
}

/// Scene graph node
#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    /// Node name
    pub name: String,
    /// Geometry groups owned by this node
    pub meshes: Vec<ImportedMesh>,
    /// Child nodes
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Visit this node's meshes, then each child depth-first
    pub fn for_each_mesh<'a>(&'a self, visit: &mut impl FnMut(&'a ImportedMesh)) {
        for mesh in &self.meshes {
            visit(mesh);
        }
        for child in &self.children {
            child.for_each_mesh(visit);
        }
    }
}

/// Result of importing a scene file
#[derive(Debug, Clone, Default)]
pub struct ImportedScene {
    /// Root node
    pub root: SceneNode,
}

impl ImportedScene {
    /// Total number of meshes in the tree
    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.root.for_each_mesh(&mut |_| count += 1);
        count
    }
}

/// Turns a scene file into an [`ImportedScene`]
pub trait SceneImporter {
    /// Import the file at `path`; any importer diagnostic becomes [`AssetError::Import`]
    fn import(&self, path: &Path) -> Result<ImportedScene, AssetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(name: &str) -> ImportedMesh {
        ImportedMesh {
            material: ImportedMaterial {
                name: name.to_string(),
                textures: Vec::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn meshes_are_visited_parent_first() {
        let scene = ImportedScene {
            root: SceneNode {
                name: "root".into(),
                meshes: vec![mesh("a")],
                children: vec![
                    SceneNode {
                        name: "left".into(),
                        meshes: vec![mesh("b")],
                        children: vec![SceneNode {
                            name: "leaf".into(),
                            meshes: vec![mesh("c")],
                            children: Vec::new(),
                        }],
                    },
                    SceneNode {
                        name: "right".into(),
                        meshes: vec![mesh("d")],
                        children: Vec::new(),
                    },
                ],
            },
        };

        let mut order = Vec::new();
        scene.root.for_each_mesh(&mut |m| order.push(m.material.name.clone()));

        assert_eq!(order, ["a", "b", "c", "d"]);
        assert_eq!(scene.mesh_count(), 4);
    }

    #[test]
    fn material_lookup_by_kind() {
        let material = ImportedMaterial {
            name: "brick".into(),
            textures: vec![
                (TextureSlotKind::Diffuse, "brick.png".into()),
                (TextureSlotKind::Normals, "brick_n.png".into()),
            ],
        };

        assert_eq!(material.texture(TextureSlotKind::Normals), Some("brick_n.png"));
        assert_eq!(material.texture(TextureSlotKind::Opacity), None);
    }
}
