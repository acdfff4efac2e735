//! Material records uploaded alongside each draw

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Texture slot value meaning "no texture"
pub const NO_TEXTURE: u32 = u32::MAX;

/// PBR material in its GPU layout.
///
/// Textures are indices into the bindless sampled-image table.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Material {
    pub base_color: Vec4,
    /// rgb emissive color, w strength
    pub emissive: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub alpha_cutoff: f32,
    pub flags: u32,
    pub base_color_texture: u32,
    pub normal_texture: u32,
    pub metallic_roughness_texture: u32,
    pub emissive_texture: u32,
}

impl Material {
    /// Rendered in the transparent list
    pub const FLAG_TRANSPARENT: u32 = 1 << 0;
    pub const FLAG_DOUBLE_SIDED: u32 = 1 << 1;

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3, strength: f32) -> Self {
        self.emissive = emissive.extend(strength);
        self
    }

    pub fn transparent(mut self) -> Self {
        self.flags |= Self::FLAG_TRANSPARENT;
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.flags & Self::FLAG_TRANSPARENT != 0
    }

    pub fn plastic(color: Vec3) -> Self {
        Self::default()
            .with_base_color(color.extend(1.0))
            .with_roughness(0.4)
    }

    pub fn metal(color: Vec3, roughness: f32) -> Self {
        Self::default()
            .with_base_color(color.extend(1.0))
            .with_metallic(1.0)
            .with_roughness(roughness)
    }

    pub fn glass() -> Self {
        Self::default()
            .with_base_color(Vec4::new(0.9, 0.95, 1.0, 0.2))
            .with_roughness(0.05)
            .transparent()
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            emissive: Vec4::new(0.0, 0.0, 0.0, 1.0),
            metallic: 0.0,
            roughness: 0.5,
            alpha_cutoff: 0.5,
            flags: 0,
            base_color_texture: NO_TEXTURE,
            normal_texture: NO_TEXTURE,
            metallic_roughness_texture: NO_TEXTURE,
            emissive_texture: NO_TEXTURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_layout() {
        assert_eq!(std::mem::size_of::<Material>(), 64);
    }

    #[test]
    fn test_presets() {
        assert!(Material::glass().is_transparent());
        assert!(!Material::plastic(Vec3::ONE).is_transparent());
        assert_eq!(Material::metal(Vec3::ONE, 0.3).metallic, 1.0);
    }
}
