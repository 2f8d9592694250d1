use bytemuck::{Pod, Zeroable};

use crate::constants::HANDLE_PAYLOAD_MASK;

/// Decoded view of a [`BrickHandle`]. Exactly one variant applies to any
/// handle word; all components outside this module consume the decoded
/// variant rather than the raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// No solid content. The payload is the jump-flood skip distance in
    /// brick cells (`MAX_DISTANCE` means unknown / far).
    Empty(u32),
    /// Fully detailed brick. The payload indexes the TraceBrick table.
    Data(u32),
    /// Host fetch in flight. Traversal steps past one cell.
    Loading,
    /// Single-material coarse stand-in. The payload is a material id.
    Lod(u32),
}

/// The 32-bit tagged word stored per cell of the brick grid.
///
/// Bit 31 is the DATA bit; bits 30-29 hold the remaining state pair.
/// Combined top-3 patterns: `000` EMPTY, `1xx` DATA, `010` LOADING,
/// `011` LOD. The low 29 bits are state-dependent payload.
///
/// [`BrickHandle::classify`] is the only decoder of this layout on the
/// host; the WGSL `handle_classify` helpers transcribe it.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct BrickHandle(pub u32);

impl BrickHandle {
    const DATA_BIT: u32 = 1 << 31;
    const STATE_MASK: u32 = 0b11 << 29;
    const STATE_LOADING: u32 = 0b10 << 29;
    const STATE_LOD: u32 = 0b11 << 29;

    /// The all-zero handle: EMPTY with distance 0. Also the value
    /// returned for out-of-bounds grid reads.
    pub const ZERO: Self = Self(0);

    /// An EMPTY handle carrying an SDF skip distance.
    pub fn empty(distance: u32) -> Self {
        Self(distance & HANDLE_PAYLOAD_MASK)
    }

    /// A DATA handle pointing at a TraceBrick table entry.
    pub fn data(index: u32) -> Self {
        debug_assert!(index <= HANDLE_PAYLOAD_MASK);
        Self(Self::DATA_BIT | (index & HANDLE_PAYLOAD_MASK))
    }

    /// A LOADING handle. Carries no payload.
    pub fn loading() -> Self {
        Self(Self::STATE_LOADING)
    }

    /// A LOD handle carrying the stand-in material id.
    pub fn lod(material: u32) -> Self {
        debug_assert!(material <= HANDLE_PAYLOAD_MASK);
        Self(Self::STATE_LOD | (material & HANDLE_PAYLOAD_MASK))
    }

    /// Re-encode a decoded state into a handle word.
    pub fn encode(state: HandleState) -> Self {
        match state {
            HandleState::Empty(d) => Self::empty(d),
            HandleState::Data(i) => Self::data(i),
            HandleState::Loading => Self::loading(),
            HandleState::Lod(m) => Self::lod(m),
        }
    }

    /// Decode the tagged word. This is the single authority for the bit
    /// layout.
    pub fn classify(self) -> HandleState {
        if self.0 & Self::DATA_BIT != 0 {
            return HandleState::Data(self.payload());
        }
        match self.0 & Self::STATE_MASK {
            Self::STATE_LOADING => HandleState::Loading,
            Self::STATE_LOD => HandleState::Lod(self.payload()),
            _ => HandleState::Empty(self.payload()),
        }
    }

    /// The state-dependent low 29 bits.
    pub fn payload(self) -> u32 {
        self.0 & HANDLE_PAYLOAD_MASK
    }

    pub fn is_empty(self) -> bool {
        matches!(self.classify(), HandleState::Empty(_))
    }

    pub fn is_data(self) -> bool {
        self.0 & Self::DATA_BIT != 0
    }

    pub fn is_loading(self) -> bool {
        matches!(self.classify(), HandleState::Loading)
    }

    pub fn is_lod(self) -> bool {
        matches!(self.classify(), HandleState::Lod(_))
    }
}

impl From<u32> for BrickHandle {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_DISTANCE;

    #[test]
    fn test_zero_handle_is_empty_distance_zero() {
        assert_eq!(BrickHandle::ZERO.classify(), HandleState::Empty(0));
    }

    #[test]
    fn test_state_tags_are_mutually_exclusive() {
        let cases = [
            BrickHandle::empty(17),
            BrickHandle::data(42),
            BrickHandle::loading(),
            BrickHandle::lod(3),
        ];
        for h in cases {
            let mut matched = 0;
            matched += h.is_empty() as u32;
            matched += h.is_data() as u32;
            matched += h.is_loading() as u32;
            matched += h.is_lod() as u32;
            assert_eq!(matched, 1, "handle {:#010x} matched {matched} states", h.0);
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let states = [
            HandleState::Empty(0),
            HandleState::Empty(MAX_DISTANCE),
            HandleState::Data(0),
            HandleState::Data(0x1234_5678 & MAX_DISTANCE),
            HandleState::Loading,
            HandleState::Lod(7),
        ];
        for s in states {
            let h = BrickHandle::encode(s);
            assert_eq!(h.classify(), s);
            assert_eq!(BrickHandle::encode(h.classify()), h);
        }
    }

    #[test]
    fn test_payload_masked_on_construction() {
        // Distances wider than 29 bits are truncated, never allowed to
        // leak into the state tag.
        let h = BrickHandle::empty(u32::MAX);
        assert_eq!(h.classify(), HandleState::Empty(MAX_DISTANCE));
    }

    #[test]
    fn test_data_bit_dominates() {
        // Any word with bit 31 set decodes as DATA regardless of the
        // state pair underneath.
        let h = BrickHandle(0xE000_0001);
        assert_eq!(h.classify(), HandleState::Data(1));
    }
}
