use brimstone_core::constants::{HANDLE_PAYLOAD_MASK, VOXELS_PER_BRICK};
use brimstone_core::{BrimstoneError, TraceBrick, VoxelBits};

/// Default payload arena budget: 64 MiB of packed voxel words.
const DEFAULT_CAPACITY_WORDS: usize = (64 << 20) / 4;

/// Words allocated up front; the arena doubles from here on demand.
const INITIAL_CAPACITY_WORDS: usize = 16 << 10;

/// Packed voxel payloads plus their TraceBrick directory (C2).
///
/// One contiguous `u32` arena holds every brick payload back to back;
/// each payload starts at a 4-byte-aligned offset (automatic, since the
/// arena is word-granular) and occupies `words_per_brick` words for its
/// width. Appending is the only mutation; capacity doubles on demand up
/// to a fixed byte budget.
pub struct BrickStorage {
    arena: Vec<u32>,
    trace: Vec<TraceBrick>,
    capacity_words: usize,
    budget_words: usize,
}

impl BrickStorage {
    pub fn new() -> Self {
        Self::with_capacity_words(DEFAULT_CAPACITY_WORDS)
    }

    /// `budget_words` caps growth; the arena starts smaller and doubles
    /// on demand up to it.
    pub fn with_capacity_words(budget_words: usize) -> Self {
        let capacity_words = INITIAL_CAPACITY_WORDS.min(budget_words);
        log::info!(
            "brick storage arena: {} KiB initial, {} KiB budget",
            capacity_words * 4 / 1024,
            budget_words * 4 / 1024
        );
        Self {
            arena: Vec::with_capacity(capacity_words),
            trace: Vec::new(),
            capacity_words,
            budget_words,
        }
    }

    /// Double the capacity until `required_words` fits, clamped to the
    /// byte budget. Returns false when the budget cannot cover it.
    fn try_grow(&mut self, required_words: usize) -> bool {
        if required_words > self.budget_words {
            return false;
        }
        let mut next = self.capacity_words.max(1);
        while next < required_words {
            next *= 2;
        }
        let next = next.min(self.budget_words);
        if next > self.capacity_words {
            log::debug!("brick storage arena doubled to {} KiB", next * 4 / 1024);
            self.arena.reserve(next.saturating_sub(self.arena.len()));
            self.capacity_words = next;
        }
        true
    }

    /// Current allocated capacity in u32 words.
    pub fn capacity_words(&self) -> usize {
        self.capacity_words
    }

    /// Pack `voxels` (palette indices, 0 = air) at the given width,
    /// append the payload, and record a TraceBrick whose occupancy bit
    /// `i` is set iff `voxels[i] != 0`.
    ///
    /// Returns the TraceBrick index and the payload byte offset. On
    /// `OutOfSpace` nothing is appended.
    pub fn write_brick(
        &mut self,
        palette_offset: u32,
        bits: VoxelBits,
        voxels: &[u32; VOXELS_PER_BRICK as usize],
    ) -> Result<(u32, u32), BrimstoneError> {
        let vpu32 = bits.voxels_per_word() as usize;
        let words = bits.words_per_brick() as usize;
        let start = self.arena.len();
        let byte_offset = start * 4;

        if start + words > self.capacity_words && !self.try_grow(start + words) {
            return Err(BrimstoneError::OutOfSpace {
                arena: "brick storage arena",
                requested: (start + words) * 4,
                capacity: self.budget_words * 4,
            });
        }
        if byte_offset > HANDLE_PAYLOAD_MASK as usize
            || self.trace.len() > HANDLE_PAYLOAD_MASK as usize
        {
            return Err(BrimstoneError::OutOfSpace {
                arena: "brick storage arena",
                requested: byte_offset,
                capacity: HANDLE_PAYLOAD_MASK as usize,
            });
        }
        if 4 * start < 3 * self.budget_words && 4 * (start + words) >= 3 * self.budget_words {
            log::warn!(
                "brick storage arena at {} of {} KiB",
                (start + words) * 4 / 1024,
                self.budget_words * 4 / 1024
            );
        }

        let mask = bits.mask();
        self.arena.resize(start + words, 0);
        let mut occupancy = TraceBrick::empty();
        for (i, &v) in voxels.iter().enumerate() {
            debug_assert!(v <= mask, "voxel {i} value {v} exceeds {} bpv", bits.bits());
            let word = start + i / vpu32;
            let bit = (i % vpu32) as u32 * bits.bits();
            self.arena[word] |= (v & mask) << bit;
            if v != 0 {
                let (x, y, z) = delinearize(i as u32);
                occupancy.set(x, y, z, true);
            }
        }

        occupancy.set_offset(byte_offset as u32);
        occupancy.set_voxel_bits(bits);
        occupancy.set_palette_offset(palette_offset);

        let trace_id = self.trace.len() as u32;
        self.trace.push(occupancy);
        Ok((trace_id, byte_offset as u32))
    }

    /// Read one voxel's palette index back out of the packed payload.
    pub fn read_voxel(&self, brick: &TraceBrick, x: u32, y: u32, z: u32) -> u32 {
        let linear = TraceBrick::linear(x, y, z);
        let bits = brick.voxel_bits();
        let vpu32 = bits.voxels_per_word();
        let word = (brick.offset() / 4 + linear / vpu32) as usize;
        let shift = (linear % vpu32) * bits.bits();
        (self.arena[word] >> shift) & bits.mask()
    }

    pub fn trace_brick(&self, index: u32) -> Option<&TraceBrick> {
        self.trace.get(index as usize)
    }

    pub fn trace_bricks(&self) -> &[TraceBrick] {
        &self.trace
    }

    /// Packed payload words for device upload.
    pub fn arena(&self) -> &[u32] {
        &self.arena
    }
}

impl Default for BrickStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn delinearize(linear: u32) -> (u32, u32, u32) {
    (linear % 8, (linear / 8) % 8, linear / 64)
}
