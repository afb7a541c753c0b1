//! Per-mesh texture slot table
//!
//! A material is nine texture indices pushed to the fragment shader. Each index
//! is either [`Material::ABSENT`] or an index into the owning model's texture
//! list. The bindless base of the model is added only when pushing.

use bytemuck::{Pod, Zeroable};

use crate::assets::TextureSlotKind;

/// Material field a texture ends up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialSlot {
    /// Base color
    Diffuse,
    /// Specular intensity
    Specular,
    /// Bump/height
    Bump,
    /// Tangent-space normals
    Normal,
    /// Emissive color
    Emission,
    /// Opacity mask
    Opacity,
    /// Roughness
    Roughness,
    /// Metalness
    Metalness,
    /// Ambient occlusion
    AmbientOcclusion,
}

/// How an importer texture kind is stored and sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMapping {
    /// Target material field
    pub slot: MaterialSlot,
    /// Sample through an sRGB format
    pub srgb: bool,
    /// Build mipmaps
    pub mipmapped: bool,
}

impl SlotMapping {
    const fn new(slot: MaterialSlot, srgb: bool) -> Self {
        Self { slot, srgb, mipmapped: true }
    }

    /// Mapping for an importer texture kind
    pub const fn for_kind(kind: TextureSlotKind) -> Self {
        use MaterialSlot as M;
        use TextureSlotKind as K;

        match kind {
            K::Diffuse | K::BaseColor => Self::new(M::Diffuse, true),
            K::Specular | K::Reflection => Self::new(M::Specular, true),
            K::Emissive => Self::new(M::Emission, true),
            K::Height | K::Displacement => Self::new(M::Bump, true),
            K::Normals | K::NormalCamera => Self::new(M::Normal, false),
            K::Shininess => Self::new(M::Roughness, true),
            K::Opacity => Self {
                slot: M::Opacity,
                srgb: true,
                mipmapped: false,
            },
            K::Metalness => Self::new(M::Metalness, false),
            K::AmbientOcclusion => Self::new(M::AmbientOcclusion, false),
            K::MetallicRoughness => Self::new(M::Roughness, false),
        }
    }
}

/// Texture indices for one mesh, laid out as the fragment push constant
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Material {
    /// Diffuse texture index
    pub diffuse: i32,
    /// Specular texture index
    pub specular: i32,
    /// Bump texture index
    pub bump: i32,
    /// Normal map index
    pub normal: i32,
    /// Emission texture index
    pub emission: i32,
    /// Opacity texture index
    pub opacity: i32,
    /// Roughness texture index
    pub roughness: i32,
    /// Metalness texture index
    pub metalness: i32,
    /// Ambient occlusion texture index
    pub ambient_occlusion: i32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Self::ABSENT,
            specular: Self::ABSENT,
            bump: Self::ABSENT,
            normal: Self::ABSENT,
            emission: Self::ABSENT,
            opacity: Self::ABSENT,
            roughness: Self::ABSENT,
            metalness: Self::ABSENT,
            ambient_occlusion: Self::ABSENT,
        }
    }
}

impl Material {
    /// Marker for an unused slot
    pub const ABSENT: i32 = -1;

    /// Size of the push constant block in bytes
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Mutable access to one field
    pub fn slot_mut(&mut self, slot: MaterialSlot) -> &mut i32 {
        match slot {
            MaterialSlot::Diffuse => &mut self.diffuse,
            MaterialSlot::Specular => &mut self.specular,
            MaterialSlot::Bump => &mut self.bump,
            MaterialSlot::Normal => &mut self.normal,
            MaterialSlot::Emission => &mut self.emission,
            MaterialSlot::Opacity => &mut self.opacity,
            MaterialSlot::Roughness => &mut self.roughness,
            MaterialSlot::Metalness => &mut self.metalness,
            MaterialSlot::AmbientOcclusion => &mut self.ambient_occlusion,
        }
    }

    /// All nine indices in push-constant order
    pub fn indices(&self) -> [i32; 9] {
        [
            self.diffuse,
            self.specular,
            self.bump,
            self.normal,
            self.emission,
            self.opacity,
            self.roughness,
            self.metalness,
            self.ambient_occlusion,
        ]
    }

    /// Copy with every present index shifted by a bindless base
    pub fn offset_by(&self, base: u32) -> Self {
        let shift = |index: i32| {
            if index < 0 {
                Self::ABSENT
            } else {
                index + base as i32
            }
        };

        Self {
            diffuse: shift(self.diffuse),
            specular: shift(self.specular),
            bump: shift(self.bump),
            normal: shift(self.normal),
            emission: shift(self.emission),
            opacity: shift(self.opacity),
            roughness: shift(self.roughness),
            metalness: shift(self.metalness),
            ambient_occlusion: shift(self.ambient_occlusion),
        }
    }

    /// Whether every index is absent or below `texture_count`
    pub fn references_within(&self, texture_count: usize) -> bool {
        self.indices()
            .iter()
            .all(|&i| i == Self::ABSENT || (i >= 0 && (i as usize) < texture_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_material_has_no_textures() {
        let material = Material::default();
        assert!(material.indices().iter().all(|&i| i == Material::ABSENT));
        assert_eq!(Material::SIZE, 36);
    }

    #[test]
    fn emission_and_normal_are_independent() {
        let mut material = Material::default();
        *material.slot_mut(SlotMapping::for_kind(TextureSlotKind::Normals).slot) = 1;
        *material.slot_mut(SlotMapping::for_kind(TextureSlotKind::Emissive).slot) = 2;

        assert_eq!(material.normal, 1);
        assert_eq!(material.emission, 2);
    }

    #[test]
    fn colour_spaces_follow_texture_role() {
        assert!(SlotMapping::for_kind(TextureSlotKind::Diffuse).srgb);
        assert!(!SlotMapping::for_kind(TextureSlotKind::Normals).srgb);
        assert!(!SlotMapping::for_kind(TextureSlotKind::MetallicRoughness).srgb);
        assert!(!SlotMapping::for_kind(TextureSlotKind::Opacity).mipmapped);
        assert_eq!(
            SlotMapping::for_kind(TextureSlotKind::Displacement).slot,
            MaterialSlot::Bump
        );
    }

    #[test]
    fn offset_keeps_absent_slots() {
        let material = Material {
            diffuse: 0,
            normal: 2,
            ..Default::default()
        };

        let shifted = material.offset_by(10);

        assert_eq!(shifted.diffuse, 10);
        assert_eq!(shifted.normal, 12);
        assert_eq!(shifted.specular, Material::ABSENT);
    }

    #[test]
    fn out_of_range_reference_is_detected() {
        let material = Material {
            diffuse: 3,
            ..Default::default()
        };
        assert!(!material.references_within(3));
        assert!(material.references_within(4));
    }
}
