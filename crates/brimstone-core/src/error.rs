use thiserror::Error;

/// Errors surfaced by the brickmap data plane.
///
/// Only `OutOfSpace` reaches the host through ingest calls; every other
/// failure kind is recovered locally (out-of-bounds reads return the
/// zero handle, degenerate rays are nudged, an exhausted step budget is
/// a miss).
#[derive(Debug, Error)]
pub enum BrimstoneError {
    /// An append-only arena or table is full. The partially written
    /// structure remains consistent; the triggering append is rolled
    /// back.
    #[error("out of space in {arena} (requested {requested}, capacity {capacity})")]
    OutOfSpace {
        arena: &'static str,
        requested: usize,
        capacity: usize,
    },

    /// A handle payload that does not decode to a valid table index.
    /// Traversal treats this as a miss; under the grid invariants it
    /// indicates a programming error and debug builds assert on it.
    #[error("handle payload {payload} does not index a valid {table} entry")]
    InvalidHandle { table: &'static str, payload: u32 },
}
