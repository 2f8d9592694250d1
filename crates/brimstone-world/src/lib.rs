pub mod grid;
pub mod materials;
pub mod palette;
pub mod raycast;
pub mod sdf;
pub mod storage;

use brimstone_core::constants::VOXELS_PER_BRICK;
use brimstone_core::{BrickHandle, BrimstoneError, HandleState, MaterialId, PbrMaterial, VoxelBits};
use glam::UVec3;

pub use grid::BrickGrid;
pub use materials::MaterialTable;
pub use palette::PaletteTable;
pub use raycast::{RayHit, RayTrace, TraceOutput};
pub use storage::BrickStorage;

/// The host-side brickmap data plane: material and palette tables,
/// packed brick storage, and the handle grid, behind the ingest
/// interface world generation drives.
///
/// Single-threaded by design; the renderer owns one of these and the
/// device sees read-only snapshots of it.
pub struct VoxelWorld {
    materials: MaterialTable,
    palettes: PaletteTable,
    storage: BrickStorage,
    grid: BrickGrid,
}

impl VoxelWorld {
    pub fn new(dims: UVec3) -> Self {
        Self {
            materials: MaterialTable::new(),
            palettes: PaletteTable::new(),
            storage: BrickStorage::new(),
            grid: BrickGrid::new(dims),
        }
    }

    /// Intern a material record, returning its stable id.
    pub fn add_material(&mut self, material: PbrMaterial) -> Result<MaterialId, BrimstoneError> {
        self.materials.intern(material)
    }

    /// Canonicalize and intern a palette, returning its arena offset.
    pub fn intern_palette(&mut self, ids: &[MaterialId]) -> Result<u32, BrimstoneError> {
        self.palettes.intern(ids)
    }

    /// Random-access material read.
    pub fn material(&self, id: MaterialId) -> Option<PbrMaterial> {
        self.materials.get(id)
    }

    /// Random-access palette read.
    pub fn palette_entry(&self, palette_offset: u32, local_index: u32) -> Option<MaterialId> {
        self.palettes.entry(palette_offset, local_index)
    }

    /// Pack one brick and return a DATA handle ready to be written into
    /// the grid.
    ///
    /// `voxels` are indices into `palette_ids` as given by the caller
    /// (0..palette_ids.len()). The palette is canonicalized with air
    /// always present, so palette index 0 keeps meaning air in the
    /// stored payload; voxel values are remapped accordingly and the
    /// bits-per-voxel is the smallest width that indexes the canonical
    /// palette.
    pub fn upload_brick(
        &mut self,
        voxels: &[u32; VOXELS_PER_BRICK as usize],
        palette_ids: &[MaterialId],
    ) -> Result<BrickHandle, BrimstoneError> {
        let mut with_air = Vec::with_capacity(palette_ids.len() + 1);
        with_air.push(MaterialId::AIR);
        with_air.extend_from_slice(palette_ids);
        let canonical = PaletteTable::canonicalize(&with_air);
        if canonical.len() > 256 {
            return Err(BrimstoneError::OutOfSpace {
                arena: "brick palette",
                requested: canonical.len(),
                capacity: 256,
            });
        }

        let mut remap = Vec::with_capacity(palette_ids.len());
        for id in palette_ids {
            let index = canonical
                .binary_search_by(|m| m.0.cmp(&id.0))
                .expect("canonical palette contains every input id");
            remap.push(index as u32);
        }

        let mut remapped = [0u32; VOXELS_PER_BRICK as usize];
        for (i, &v) in voxels.iter().enumerate() {
            debug_assert!(
                (v as usize) < remap.len().max(1),
                "voxel {i} indexes past the palette"
            );
            remapped[i] = remap.get(v as usize).copied().unwrap_or(0);
        }

        let bits = VoxelBits::for_palette_len(canonical.len());
        let palette_offset = self.palettes.intern(&canonical)?;
        let (trace_id, _byte_offset) = self.storage.write_brick(palette_offset, bits, &remapped)?;
        Ok(BrickHandle::data(trace_id))
    }

    /// Write a handle into the grid, invalidating the SDF.
    pub fn set_handle(&mut self, at: UVec3, handle: BrickHandle) {
        self.grid.set(at, handle);
    }

    /// Run the SDF propagation to fixed point for the current topology.
    pub fn dispatch_sdf(&mut self) {
        sdf::propagate(&mut self.grid);
    }

    /// Check the grid's referential invariants: every DATA payload
    /// indexes a TraceBrick whose payload lies inside the storage
    /// arena, and every LOD payload indexes a material. These cannot
    /// fail through the ingest interface; traversal treats a violation
    /// as a miss, and this check is how tests and debug builds catch
    /// one at the source.
    pub fn validate(&self) -> Result<(), BrimstoneError> {
        for handle in self.grid.handles() {
            match handle.classify() {
                HandleState::Data(index) => {
                    let brick = self.storage.trace_brick(index).ok_or(
                        BrimstoneError::InvalidHandle {
                            table: "trace brick",
                            payload: index,
                        },
                    )?;
                    let words = brick.voxel_bits().words_per_brick() as usize;
                    let end = brick.offset() as usize / 4 + words;
                    if end > self.storage.arena().len() {
                        return Err(BrimstoneError::InvalidHandle {
                            table: "brick storage",
                            payload: index,
                        });
                    }
                }
                HandleState::Lod(material) => {
                    if self.materials.get(MaterialId(material)).is_none() {
                        return Err(BrimstoneError::InvalidHandle {
                            table: "material",
                            payload: material,
                        });
                    }
                }
                HandleState::Empty(_) | HandleState::Loading => {}
            }
        }
        Ok(())
    }

    pub fn grid(&self) -> &BrickGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut BrickGrid {
        &mut self.grid
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialTable {
        &mut self.materials
    }

    pub fn palettes(&self) -> &PaletteTable {
        &self.palettes
    }

    pub fn storage(&self) -> &BrickStorage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brimstone_core::HandleState;

    #[test]
    fn test_upload_brick_returns_data_handle() {
        let mut world = VoxelWorld::new(UVec3::splat(2));
        let stone = world.add_material(PbrMaterial::stone(0.5)).unwrap();
        let voxels = [1u32; 512];
        let handle = world
            .upload_brick(&voxels, &[MaterialId::AIR, stone])
            .unwrap();
        assert!(matches!(handle.classify(), HandleState::Data(0)));
    }

    #[test]
    fn test_upload_brick_remaps_to_canonical_palette() {
        let mut world = VoxelWorld::new(UVec3::splat(2));
        let a = world.add_material(PbrMaterial::stone(0.2)).unwrap();
        let b = world.add_material(PbrMaterial::stone(0.8)).unwrap();
        // Caller palette lists the higher id first; canonical order is
        // ascending, so stored indices differ from caller indices.
        let mut voxels = [0u32; 512];
        voxels[0] = 0; // caller index 0 -> b
        voxels[1] = 1; // caller index 1 -> a
        let handle = world.upload_brick(&voxels, &[b, a]).unwrap();
        let HandleState::Data(id) = handle.classify() else {
            panic!("expected DATA handle");
        };
        let brick = *world.storage().trace_brick(id).unwrap();
        let read = |x: u32| {
            let palette_index = world.storage().read_voxel(&brick, x, 0, 0);
            world.palette_entry(brick.palette_offset(), palette_index).unwrap()
        };
        assert_eq!(read(0), b);
        assert_eq!(read(1), a);
    }

    #[test]
    fn test_upload_all_air_brick() {
        let mut world = VoxelWorld::new(UVec3::splat(2));
        let voxels = [0u32; 512];
        let handle = world.upload_brick(&voxels, &[MaterialId::AIR]).unwrap();
        let HandleState::Data(id) = handle.classify() else {
            panic!("expected DATA handle");
        };
        assert!(!world.storage().trace_brick(id).unwrap().any_solid());
    }

    #[test]
    fn test_validate_catches_dangling_handles() {
        let mut world = VoxelWorld::new(UVec3::splat(2));
        let stone = world.add_material(PbrMaterial::stone(0.5)).unwrap();
        let voxels = [1u32; 512];
        let handle = world
            .upload_brick(&voxels, &[MaterialId::AIR, stone])
            .unwrap();
        world.set_handle(UVec3::new(0, 0, 0), handle);
        assert!(world.validate().is_ok());

        // A DATA payload past the trace table is an invariant breach.
        world.set_handle(UVec3::new(1, 0, 0), BrickHandle::data(99));
        assert!(matches!(
            world.validate(),
            Err(BrimstoneError::InvalidHandle { payload: 99, .. })
        ));

        // So is a LOD payload past the material table.
        world.set_handle(UVec3::new(1, 0, 0), BrickHandle::lod(500));
        assert!(matches!(
            world.validate(),
            Err(BrimstoneError::InvalidHandle { payload: 500, .. })
        ));
    }

    #[test]
    fn test_shared_palette_between_bricks() {
        let mut world = VoxelWorld::new(UVec3::splat(2));
        let stone = world.add_material(PbrMaterial::stone(0.5)).unwrap();
        let voxels = [1u32; 512];
        let h1 = world.upload_brick(&voxels, &[MaterialId::AIR, stone]).unwrap();
        let h2 = world.upload_brick(&voxels, &[stone, MaterialId::AIR]).unwrap();
        let get = |h: BrickHandle| {
            let HandleState::Data(id) = h.classify() else {
                panic!("expected DATA handle");
            };
            world.storage().trace_brick(id).unwrap().palette_offset()
        };
        assert_eq!(get(h1), get(h2));
    }
}
