use std::collections::HashMap;

use brimstone_core::{BrimstoneError, MaterialId};

/// Default palette arena capacity in elements (u32 material ids).
const DEFAULT_CAPACITY: usize = 1 << 20;

/// Canonicalized palette arena (the other half of C1).
///
/// A palette is a run of material ids referenced by its element offset
/// into one flat arena. Palettes are canonical — sorted ascending with
/// duplicates removed — which makes equality a memcmp and lets any two
/// bricks with the same material set share one arena region.
pub struct PaletteTable {
    arena: Vec<MaterialId>,
    by_content: HashMap<Vec<MaterialId>, u32>,
    capacity: usize,
}

impl PaletteTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: Vec::new(),
            by_content: HashMap::new(),
            capacity,
        }
    }

    /// Sort ascending and strip duplicates. Two inputs over the same
    /// underlying id set canonicalize identically.
    pub fn canonicalize(ids: &[MaterialId]) -> Vec<MaterialId> {
        let mut canonical = ids.to_vec();
        canonical.sort_unstable_by_key(|id| id.0);
        canonical.dedup();
        canonical
    }

    /// Canonicalize, then look up or append. Logically equal palettes
    /// always map to the same offset.
    pub fn intern(&mut self, ids: &[MaterialId]) -> Result<u32, BrimstoneError> {
        let canonical = Self::canonicalize(ids);
        if let Some(&offset) = self.by_content.get(&canonical) {
            return Ok(offset);
        }
        let needed = self.arena.len() + canonical.len();
        if needed > self.capacity {
            return Err(BrimstoneError::OutOfSpace {
                arena: "palette arena",
                requested: needed,
                capacity: self.capacity,
            });
        }
        let before = self.arena.len();
        let offset = before as u32;
        self.arena.extend_from_slice(&canonical);
        self.by_content.insert(canonical, offset);
        if 4 * before < 3 * self.capacity && 4 * self.arena.len() >= 3 * self.capacity {
            log::warn!(
                "palette arena at {} of {} entries",
                self.arena.len(),
                self.capacity
            );
        }
        Ok(offset)
    }

    /// Random-access read: the material id at `local_index` within the
    /// palette starting at `offset`.
    pub fn entry(&self, offset: u32, local_index: u32) -> Option<MaterialId> {
        self.arena.get((offset + local_index) as usize).copied()
    }

    /// The stored run for a palette of known length.
    pub fn run(&self, offset: u32, len: usize) -> Option<&[MaterialId]> {
        self.arena.get(offset as usize..offset as usize + len)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Contiguous arena for device upload. `MaterialId` is transparent
    /// over u32, so this casts straight into the GPU palette buffer.
    pub fn as_slice(&self) -> &[MaterialId] {
        &self.arena
    }
}

impl Default for PaletteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<MaterialId> {
        raw.iter().copied().map(MaterialId).collect()
    }

    #[test]
    fn test_canonicalize_sorts_and_dedups() {
        assert_eq!(PaletteTable::canonicalize(&ids(&[5, 3, 3, 1])), ids(&[1, 3, 5]));
        assert_eq!(PaletteTable::canonicalize(&[]), ids(&[]));
    }

    #[test]
    fn test_intern_is_idempotent_under_permutation() {
        let mut table = PaletteTable::new();
        let a = table.intern(&ids(&[5, 3, 3, 1])).unwrap();
        let b = table.intern(&ids(&[1, 3, 5])).unwrap();
        let c = table.intern(&ids(&[3, 5, 1, 5, 1])).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(table.run(a, 3).unwrap(), ids(&[1, 3, 5]).as_slice());
        // Only one copy landed in the arena.
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_distinct_palettes_get_distinct_offsets() {
        let mut table = PaletteTable::new();
        let a = table.intern(&ids(&[0, 1])).unwrap();
        let b = table.intern(&ids(&[0, 2])).unwrap();
        assert_ne!(a, b);
        assert_eq!(table.entry(a, 1), Some(MaterialId(1)));
        assert_eq!(table.entry(b, 1), Some(MaterialId(2)));
    }

    #[test]
    fn test_stored_palette_strictly_ascending() {
        let mut table = PaletteTable::new();
        let offset = table.intern(&ids(&[9, 2, 7, 2, 9])).unwrap();
        let run = table.run(offset, 3).unwrap();
        assert!(run.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_out_of_space() {
        let mut table = PaletteTable::with_capacity(4);
        table.intern(&ids(&[0, 1, 2])).unwrap();
        let err = table.intern(&ids(&[4, 5])).unwrap_err();
        assert!(matches!(err, BrimstoneError::OutOfSpace { .. }));
        // The interned palette survives the failed append.
        assert_eq!(table.entry(0, 2), Some(MaterialId(2)));
        // A palette that already exists still resolves.
        assert_eq!(table.intern(&ids(&[2, 1, 0])).unwrap(), 0);
    }
}
