use brimstone_core::constants::MAX_RAY_STEPS;
use brimstone_world::VoxelWorld;
use glam::{Mat4, UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::buffers::GpuTables;
use crate::passes::sdf::SdfPass;
use crate::passes::trace::{TracePass, TraceUniforms};

/// Which of the four traversal outputs the present pass should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DebugView {
    #[default]
    Albedo,
    Depth,
    Normal,
    Intensity,
}

impl DebugView {
    pub fn as_u32(self) -> u32 {
        match self {
            DebugView::Albedo => 0,
            DebugView::Depth => 1,
            DebugView::Normal => 2,
            DebugView::Intensity => 3,
        }
    }
}

/// Renderer configuration fixed at creation (viewport may change later
/// through `resize`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub max_ray_steps: u32,
    pub debug_view: DebugView,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            max_ray_steps: MAX_RAY_STEPS,
            debug_view: DebugView::Albedo,
        }
    }
}

/// Per-frame camera inputs.
#[derive(Debug, Clone, Copy)]
pub struct FrameParams {
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub camera_position: Vec3,
}

/// Owner of the whole device-side data plane: the host world, its GPU
/// table snapshots, the SDF propagation pass, and the traversal pass.
///
/// Per frame: mutate the world through `world_mut`, call `prepare` (one
/// upload plus an SDF rebuild when the topology changed), then `render`.
/// Submission order guarantees the SDF pass completes before any
/// traversal that reads its distances.
pub struct BrickmapPipeline {
    world: VoxelWorld,
    tables: GpuTables,
    sdf: SdfPass,
    trace: TracePass,
    config: RenderConfig,
}

impl BrickmapPipeline {
    pub fn new(device: &wgpu::Device, world: VoxelWorld, config: RenderConfig) -> Self {
        let tables = GpuTables::new(device, &world);
        let sdf = SdfPass::new(device, &tables);
        let trace = TracePass::new(device, &tables, config.width, config.height);
        Self {
            world,
            tables,
            sdf,
            trace,
            config,
        }
    }

    pub fn world(&self) -> &VoxelWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut VoxelWorld {
        &mut self.world
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Push host mutations to the device and, if the grid topology
    /// changed, rebuild the SDF on the device before the next trace.
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let recreated = self.tables.upload(device, queue, &self.world);
        if recreated {
            self.sdf.rebind(device, &self.tables);
            self.trace.rebind_scene(device, &self.tables);
        }
        if self.world.grid().sdf_dirty() {
            self.sdf.generate(device, queue, self.world.grid().dims());
            self.world.grid_mut().clear_sdf_dirty();
        }
    }

    /// Encode the traversal pass for one frame.
    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameParams,
    ) {
        let dims = self.world.grid().dims();
        self.trace.update_uniforms(
            queue,
            TraceUniforms {
                view_projection: frame.view_projection.to_cols_array_2d(),
                inverse_view_projection: frame.inverse_view_projection.to_cols_array_2d(),
                camera_position: frame.camera_position.to_array(),
                _pad0: 0.0,
                resolution: [self.config.width as f32, self.config.height as f32],
                render_mode: self.config.debug_view.as_u32(),
                max_ray_steps: self.config.max_ray_steps,
                grid_dims: dims.to_array(),
                _pad1: 0,
            },
        );
        self.trace.encode(encoder, self.config.width, self.config.height);
        self.tables.encode_seen_readback(encoder);
    }

    /// Recreate the output targets for a new viewport.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        self.trace.resize(device, width, height);
    }

    /// Merge completed seen-mask feedback into the host grid so the
    /// loader can schedule ingest for the cells rays touched.
    pub fn poll_seen_feedback(&self, device: &wgpu::Device) -> usize {
        let Some(words) = self.tables.poll_seen(device) else {
            return 0;
        };
        let dims = self.world.grid().dims();
        let mut marked = 0;
        for (word_index, mut word) in words.into_iter().enumerate() {
            while word != 0 {
                let bit = word.trailing_zeros();
                word &= word - 1;
                let i = word_index as u32 * 32 + bit;
                if i as usize >= self.world.grid().volume() {
                    break;
                }
                let at = UVec3::new(
                    i % dims.x,
                    (i / dims.x) % dims.y,
                    i / (dims.x * dims.y),
                );
                self.world.grid().mark_seen(at);
                marked += 1;
            }
        }
        marked
    }

    /// The traversal output selected by the config's debug view.
    pub fn output_view(&self) -> &wgpu::TextureView {
        match self.config.debug_view {
            DebugView::Albedo => self.trace.albedo_view(),
            DebugView::Depth => self.trace.depth_view(),
            DebugView::Normal => self.trace.normal_view(),
            DebugView::Intensity => self.trace.intensity_view(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_view_codes() {
        assert_eq!(DebugView::Albedo.as_u32(), 0);
        assert_eq!(DebugView::Depth.as_u32(), 1);
        assert_eq!(DebugView::Normal.as_u32(), 2);
        assert_eq!(DebugView::Intensity.as_u32(), 3);
    }

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert_eq!(config.max_ray_steps, MAX_RAY_STEPS);
        assert_eq!(config.debug_view, DebugView::Albedo);
    }
}
