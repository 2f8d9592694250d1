pub mod constants;
pub mod error;
pub mod handle;
pub mod material;
pub mod trace;

pub use error::BrimstoneError;
pub use handle::{BrickHandle, HandleState};
pub use material::{MaterialId, PbrMaterial};
pub use trace::{TraceBrick, VoxelBits};
