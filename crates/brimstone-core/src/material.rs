use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Newtype for material identifiers. Id 0 is air.
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct MaterialId(pub u32);

impl MaterialId {
    pub const AIR: Self = Self(0);
}

/// A PBR material record, 48 bytes, shared byte-for-byte with the WGSL
/// kernels (which give it 16-byte alignment; 48 is a multiple, so the
/// array strides agree).
///
/// Identity is bit-equality of the whole record; the material table
/// deduplicates on that key.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct PbrMaterial {
    pub color: [f32; 4],
    pub emissive: [f32; 3],
    pub opaque: f32,
    pub metallic: f32,
    pub roughness: f32,
    #[serde(skip)]
    _pad: [f32; 2],
}

impl PbrMaterial {
    pub fn new(
        color: [f32; 4],
        emissive: [f32; 3],
        opaque: f32,
        metallic: f32,
        roughness: f32,
    ) -> Self {
        Self {
            color,
            emissive,
            opaque: opaque.clamp(0.0, 1.0),
            metallic: metallic.clamp(0.0, 1.0),
            roughness: roughness.clamp(0.0, 1.0),
            _pad: [0.0; 2],
        }
    }

    /// The 48-byte bit pattern used as the interning key.
    pub fn key(&self) -> [u8; 48] {
        let mut key = [0u8; 48];
        key.copy_from_slice(bytemuck::bytes_of(self));
        key
    }

    /// Material 0. Fully transparent; never rendered, but the table
    /// needs a valid entry at index 0 so palette index 0 means air.
    pub fn air() -> Self {
        Self::new([0.0, 0.0, 0.0, 0.0], [0.0; 3], 0.0, 0.0, 0.0)
    }

    pub fn flat(color: [f32; 4]) -> Self {
        Self::new(color, [0.0; 3], 1.0, 0.0, 1.0)
    }

    pub fn stone(variation: f32) -> Self {
        let base = 0.5 + (1.0 - variation) * 0.2;
        Self::new([base, base, base, 1.0], [0.0; 3], 1.0, 0.0, 0.75 + variation * 0.2)
    }

    pub fn dirt(moisture: f32) -> Self {
        let m = moisture.clamp(0.0, 1.0);
        let darken = m * 0.3;
        Self::new(
            [0.6 - darken, 0.4 - darken, 0.2 - darken, 1.0],
            [0.0; 3],
            1.0,
            0.0,
            1.0 - m * 0.4,
        )
    }

    pub fn grass(dryness: f32) -> Self {
        let d = dryness.clamp(0.0, 1.0);
        Self::new(
            [0.3 + d * 0.4, 0.5 + d * 0.2, 0.1, 1.0],
            [0.0; 3],
            1.0,
            0.0,
            0.95,
        )
    }

    pub fn snow() -> Self {
        Self::new([0.95, 0.95, 0.95, 1.0], [0.0; 3], 1.0, 0.0, 0.3)
    }
}
