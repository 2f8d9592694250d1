pub mod buffers;
pub mod passes;
pub mod pipeline;

pub use buffers::GpuTables;
pub use pipeline::{BrickmapPipeline, DebugView, FrameParams, RenderConfig};

use brimstone_core::constants::{
    BRICK_SIZE, HANDLE_PAYLOAD_MASK, MAX_DISTANCE, MAX_RAY_STEPS, RAY_EPSILON,
};

/// Constants preamble injected ahead of every WGSL source so the Rust
/// definitions stay the single source of truth.
pub(crate) fn constants_preamble() -> String {
    format!(
        "const BRICK_SIZE: u32 = {BRICK_SIZE}u;\n\
         const HANDLE_PAYLOAD_MASK: u32 = {HANDLE_PAYLOAD_MASK}u;\n\
         const MAX_DISTANCE: u32 = {MAX_DISTANCE}u;\n\
         const DEFAULT_MAX_RAY_STEPS: u32 = {MAX_RAY_STEPS}u;\n\
         const RAY_EPSILON: f32 = {RAY_EPSILON:.6};\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_carries_shared_constants() {
        let preamble = constants_preamble();
        assert!(preamble.contains("const BRICK_SIZE: u32 = 8u;"));
        assert!(preamble.contains(&format!("const MAX_DISTANCE: u32 = {}u;", 0x1FFF_FFFFu32)));
        assert!(preamble.contains("const RAY_EPSILON: f32 = 0.000100;"));
    }
}
