use std::sync::atomic::{AtomicU32, Ordering};

use brimstone_core::{BrickHandle, HandleState};
use glam::UVec3;

/// Dense 3D array of brick handles plus the seen-feedback mask (C3).
///
/// Row-major ordering `x + y*X + z*X*Y`; dimensions are fixed at
/// construction. Out-of-bounds reads return the zero handle (EMPTY,
/// distance 0). Any handle write marks the SDF stale; the whole field is
/// recomputed on the next propagation pass.
pub struct BrickGrid {
    dims: UVec3,
    handles: Vec<BrickHandle>,
    /// One bit per cell, set by traversal as a loading hint. Racy by
    /// design; only ever read as a scheduling hint.
    seen: Vec<AtomicU32>,
    sdf_dirty: bool,
}

impl BrickGrid {
    pub fn new(dims: UVec3) -> Self {
        let volume = (dims.x * dims.y * dims.z) as usize;
        log::info!(
            "brick grid {}x{}x{} ({} handles, {} KiB)",
            dims.x,
            dims.y,
            dims.z,
            volume,
            volume * 4 / 1024
        );
        Self {
            dims,
            handles: vec![BrickHandle::ZERO; volume],
            seen: (0..volume.div_ceil(32)).map(|_| AtomicU32::new(0)).collect(),
            sdf_dirty: false,
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn volume(&self) -> usize {
        self.handles.len()
    }

    pub fn index(&self, at: UVec3) -> Option<usize> {
        if at.x >= self.dims.x || at.y >= self.dims.y || at.z >= self.dims.z {
            return None;
        }
        Some((at.x + at.y * self.dims.x + at.z * self.dims.x * self.dims.y) as usize)
    }

    /// Bounds-checked read; the zero handle stands in for anything
    /// outside the grid.
    pub fn get(&self, at: UVec3) -> BrickHandle {
        match self.index(at) {
            Some(i) => self.handles[i],
            None => BrickHandle::ZERO,
        }
    }

    /// Decoded read, for callers that never touch raw words.
    pub fn classify(&self, at: UVec3) -> HandleState {
        self.get(at).classify()
    }

    /// In-bounds write of the entire word. Marks the SDF stale so the
    /// next propagation pass rebuilds every EMPTY distance.
    pub fn set(&mut self, at: UVec3, handle: BrickHandle) {
        let Some(i) = self.index(at) else {
            debug_assert!(false, "handle write out of bounds at {at}");
            return;
        };
        self.handles[i] = handle;
        self.sdf_dirty = true;
    }

    /// Unload a detailed brick: the cell reverts to EMPTY with distance
    /// 0 until the SDF pass runs again.
    pub fn clear(&mut self, at: UVec3) {
        self.set(at, BrickHandle::ZERO);
    }

    /// Atomic bit-set into the seen mask. Callable from shared
    /// references; this is the one sanctioned cross-domain write.
    pub fn mark_seen(&self, at: UVec3) {
        if let Some(i) = self.index(at) {
            self.seen[i / 32].fetch_or(1 << (i % 32), Ordering::Relaxed);
        }
    }

    /// Drain the seen mask, returning the marked coordinates so the
    /// host can schedule ingest for them.
    pub fn drain_seen(&self) -> Vec<UVec3> {
        let mut coords = Vec::new();
        for (word_index, word) in self.seen.iter().enumerate() {
            let mut bits = word.swap(0, Ordering::Relaxed);
            while bits != 0 {
                let bit = bits.trailing_zeros();
                bits &= bits - 1;
                let i = word_index as u32 * 32 + bit;
                let x = i % self.dims.x;
                let y = (i / self.dims.x) % self.dims.y;
                let z = i / (self.dims.x * self.dims.y);
                coords.push(UVec3::new(x, y, z));
            }
        }
        coords
    }

    pub fn sdf_dirty(&self) -> bool {
        self.sdf_dirty
    }

    /// Mark the field rebuilt. Called by a propagation pass (host
    /// mirror or device kernel) once it has run to fixed point.
    pub fn clear_sdf_dirty(&mut self) {
        self.sdf_dirty = false;
    }

    /// Raw handle words for device upload.
    pub fn handles(&self) -> &[BrickHandle] {
        &self.handles
    }

    /// Direct write used by the SDF pass; does not re-dirty the field.
    pub(crate) fn set_by_index(&mut self, index: usize, handle: BrickHandle) {
        self.handles[index] = handle;
    }

    /// Seen-mask word count, for sizing the device-side buffer.
    pub fn seen_words(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brimstone_core::HandleState;

    #[test]
    fn test_out_of_bounds_reads_zero() {
        let grid = BrickGrid::new(UVec3::new(2, 2, 2));
        assert_eq!(grid.get(UVec3::new(5, 0, 0)), BrickHandle::ZERO);
        assert_eq!(
            grid.classify(UVec3::new(0, 9, 0)),
            HandleState::Empty(0)
        );
    }

    #[test]
    fn test_row_major_indexing() {
        let grid = BrickGrid::new(UVec3::new(4, 3, 2));
        assert_eq!(grid.index(UVec3::new(0, 0, 0)), Some(0));
        assert_eq!(grid.index(UVec3::new(1, 0, 0)), Some(1));
        assert_eq!(grid.index(UVec3::new(0, 1, 0)), Some(4));
        assert_eq!(grid.index(UVec3::new(0, 0, 1)), Some(12));
        assert_eq!(grid.index(UVec3::new(3, 2, 1)), Some(23));
        assert_eq!(grid.index(UVec3::new(4, 0, 0)), None);
    }

    #[test]
    fn test_set_marks_sdf_dirty() {
        let mut grid = BrickGrid::new(UVec3::new(2, 2, 2));
        assert!(!grid.sdf_dirty());
        grid.set(UVec3::new(1, 1, 1), BrickHandle::data(0));
        assert!(grid.sdf_dirty());
        assert!(grid.get(UVec3::new(1, 1, 1)).is_data());
    }

    #[test]
    fn test_clear_resets_distance_to_zero() {
        let mut grid = BrickGrid::new(UVec3::new(2, 2, 2));
        grid.set(UVec3::new(0, 0, 0), BrickHandle::data(3));
        grid.clear(UVec3::new(0, 0, 0));
        assert_eq!(grid.classify(UVec3::new(0, 0, 0)), HandleState::Empty(0));
    }

    #[test]
    fn test_seen_mask_roundtrip() {
        let grid = BrickGrid::new(UVec3::new(4, 4, 4));
        grid.mark_seen(UVec3::new(1, 2, 3));
        grid.mark_seen(UVec3::new(0, 0, 0));
        grid.mark_seen(UVec3::new(1, 2, 3)); // duplicate is idempotent
        let mut seen = grid.drain_seen();
        seen.sort_by_key(|c| (c.z, c.y, c.x));
        assert_eq!(seen, vec![UVec3::new(0, 0, 0), UVec3::new(1, 2, 3)]);
        // Drained: the mask is clear again.
        assert!(grid.drain_seen().is_empty());
    }
}
