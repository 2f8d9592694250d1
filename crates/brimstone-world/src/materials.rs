use std::collections::HashMap;

use brimstone_core::{BrimstoneError, MaterialId, PbrMaterial};

/// Default capacity of the material table. Far below the 29-bit payload
/// ceiling a LOD handle can address, and plenty for any realistic world.
const DEFAULT_CAPACITY: usize = 65_536;

/// Deduplicated material records (one half of C1).
///
/// Appending is interning: records are keyed by their full 48-byte bit
/// pattern, so two ingest calls with equal records yield the same stable
/// id. Entry 0 is always air.
pub struct MaterialTable {
    materials: Vec<PbrMaterial>,
    by_key: HashMap<[u8; 48], MaterialId>,
    by_name: HashMap<String, MaterialId>,
    capacity: usize,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self {
            materials: Vec::new(),
            by_key: HashMap::new(),
            by_name: HashMap::new(),
            // Entry 0 (air) always exists, so the table holds at least
            // one record.
            capacity: capacity.max(1),
        };
        // Air occupies id 0 so palette index 0 always means "no voxel".
        let air = table
            .intern(PbrMaterial::air())
            .expect("air fits any capacity");
        table.by_name.insert("air".to_string(), air);
        table
    }

    /// Return the id of an existing bit-equal record, or append and
    /// return the new id. Fails only when the table is full.
    pub fn intern(&mut self, material: PbrMaterial) -> Result<MaterialId, BrimstoneError> {
        let key = material.key();
        if let Some(&id) = self.by_key.get(&key) {
            return Ok(id);
        }
        if self.materials.len() >= self.capacity {
            return Err(BrimstoneError::OutOfSpace {
                arena: "material table",
                requested: self.materials.len() + 1,
                capacity: self.capacity,
            });
        }
        let before = self.materials.len();
        let id = MaterialId(before as u32);
        self.materials.push(material);
        self.by_key.insert(key, id);
        if 4 * before < 3 * self.capacity && 4 * self.materials.len() >= 3 * self.capacity {
            log::warn!(
                "material table at {} of {} entries",
                self.materials.len(),
                self.capacity
            );
        }
        Ok(id)
    }

    /// Intern a record under a lookup name.
    pub fn intern_named(
        &mut self,
        name: &str,
        material: PbrMaterial,
    ) -> Result<MaterialId, BrimstoneError> {
        let id = self.intern(material)?;
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register the default catalog used by demo ingest and tests.
    pub fn register_defaults(&mut self) -> Result<(), BrimstoneError> {
        self.intern_named("stone", PbrMaterial::stone(0.5))?;
        self.intern_named("bedrock", PbrMaterial::stone(1.5))?;
        self.intern_named("dirt", PbrMaterial::dirt(0.0))?;
        self.intern_named("grass", PbrMaterial::grass(0.0))?;
        self.intern_named("snow", PbrMaterial::snow())?;
        Ok(())
    }

    pub fn get(&self, id: MaterialId) -> Option<PbrMaterial> {
        self.materials.get(id.0 as usize).copied()
    }

    pub fn id_by_name(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Contiguous records for device upload.
    pub fn as_slice(&self) -> &[PbrMaterial] {
        &self.materials
    }
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_id_zero() {
        let table = MaterialTable::new();
        assert_eq!(table.id_by_name("air"), Some(MaterialId::AIR));
        assert_eq!(table.get(MaterialId::AIR), Some(PbrMaterial::air()));
    }

    #[test]
    fn test_intern_deduplicates_on_bits() {
        let mut table = MaterialTable::new();
        let a = table.intern(PbrMaterial::stone(0.5)).unwrap();
        let b = table.intern(PbrMaterial::stone(0.5)).unwrap();
        let c = table.intern(PbrMaterial::stone(0.6)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 3); // air + two distinct stones
    }

    #[test]
    fn test_out_of_space_leaves_table_consistent() {
        let mut table = MaterialTable::with_capacity(2);
        let stone = table.intern(PbrMaterial::stone(0.5)).unwrap();
        let err = table.intern(PbrMaterial::snow()).unwrap_err();
        assert!(matches!(err, BrimstoneError::OutOfSpace { .. }));
        // Existing entries still resolve after the failed append.
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(stone), Some(PbrMaterial::stone(0.5)));
        // Re-interning an existing record still succeeds at capacity.
        assert_eq!(table.intern(PbrMaterial::stone(0.5)).unwrap(), stone);
    }

    #[test]
    fn test_default_catalog() {
        let mut table = MaterialTable::new();
        table.register_defaults().unwrap();
        for name in ["stone", "bedrock", "dirt", "grass", "snow"] {
            assert!(table.id_by_name(name).is_some(), "{name} missing");
        }
    }
}
