//! Two-level DDA ray traversal over the brick grid (C5, host mirror).
//!
//! The outer walk runs in brick-cell units and consults the handle grid,
//! fast-skipping empty runs by the SDF distance; on a DATA cell the same
//! walk re-runs inside the brick's 8x8x8 voxel lattice against the
//! occupancy bitmap. The device kernel in `shaders/trace/ray_march.wgsl`
//! is a transcription of this module; the two must agree step for step.

use brimstone_core::constants::{BRICK_SIZE, MAX_DISTANCE, RAY_EPSILON};
use brimstone_core::{HandleState, TraceBrick};
use glam::{IVec3, Mat4, UVec2, UVec3, Vec3, Vec4};

use crate::VoxelWorld;

/// A resolved ray hit.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    /// Material color at the hit.
    pub color: [f32; 4],
    /// World-space hit position used for depth.
    pub position: Vec3,
    /// Face normal, derived from the last step axis and the ray sign.
    pub normal: Vec3,
    /// Grid cell of the hit brick.
    pub brick_pos: UVec3,
    /// Voxel within the brick for detailed hits; None for LOD hits.
    pub voxel_local: Option<UVec3>,
}

/// Outcome of tracing one ray: an optional hit plus the total DDA step
/// count (outer and inner combined), which feeds the intensity output.
#[derive(Debug, Clone, Copy)]
pub struct RayTrace {
    pub hit: Option<RayHit>,
    pub steps: u32,
}

/// The four per-pixel outputs of the traversal kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceOutput {
    pub albedo: [f32; 4],
    pub depth: f32,
    pub normal: [f32; 4],
    pub intensity: f32,
}

/// Select the axis with the smallest side distance. Ties prefer z, then
/// x, then y; all-equal picks z.
fn step_axis(side: Vec3) -> Vec3 {
    if side.z <= side.x && side.z <= side.y {
        Vec3::Z
    } else if side.x <= side.y {
        Vec3::X
    } else {
        Vec3::Y
    }
}

/// Nudge exactly-zero direction components so `1/dir` stays finite.
fn desingularize(dir: Vec3) -> Vec3 {
    Vec3::new(
        if dir.x == 0.0 { RAY_EPSILON } else { dir.x },
        if dir.y == 0.0 { RAY_EPSILON } else { dir.y },
        if dir.z == 0.0 { RAY_EPSILON } else { dir.z },
    )
}

/// Clip the ray against the grid AABB `[0, dims)`. Returns the ray
/// position advanced to the entry face (or unchanged if already inside).
fn clip_to_grid(origin: Vec3, dir: Vec3, dims: Vec3) -> Option<Vec3> {
    let inv = dir.recip();
    let t0 = (Vec3::ZERO - origin) * inv;
    let t1 = (dims - origin) * inv;
    let t_near = t0.min(t1).max_element();
    let t_far = t0.max(t1).min_element();
    if t_near > t_far || t_far < 0.0 {
        return None;
    }
    Some(origin + dir * t_near.max(0.0))
}

/// Distance along the ray from `origin` to the entry face of cell
/// `map`, clamped to zero for the cell the origin sits in.
fn entry_distance(map: Vec3, origin: Vec3, ray_sign: Vec3, delta: Vec3) -> f32 {
    let sub = ((map - origin) + 0.5 - ray_sign * 0.5) * delta;
    sub.max_element().max(0.0)
}

fn in_grid(cell: IVec3, dims: UVec3) -> bool {
    cell.x >= 0
        && cell.y >= 0
        && cell.z >= 0
        && cell.x < dims.x as i32
        && cell.y < dims.y as i32
        && cell.z < dims.z as i32
}

/// Walk the brick's 8x8x8 lattice from `entry` (brick-local units in
/// `[0, 8)`). On a set occupancy bit, returns the voxel cell and the
/// face mask of the step that reached it.
fn trace_brick(
    brick: &TraceBrick,
    entry: Vec3,
    dir: Vec3,
    world_mask: Vec3,
    steps: &mut u32,
    budget: u32,
) -> Option<(UVec3, Vec3)> {
    let size = BRICK_SIZE as f32;
    let pos = entry.clamp(Vec3::splat(RAY_EPSILON), Vec3::splat(size - RAY_EPSILON));
    let mut map = pos.floor();
    let ray_sign = dir.signum();
    let delta = dir.recip();
    let mut side = ((map - pos) + 0.5 + ray_sign * 0.5) * delta;
    let mut mask = world_mask;

    while map.min_element() >= 0.0 && map.max_element() < size {
        if *steps >= budget {
            return None;
        }
        *steps += 1;

        let voxel = map.as_uvec3();
        if brick.get(voxel.x, voxel.y, voxel.z) {
            return Some((voxel, mask));
        }

        mask = step_axis(side);
        map += mask * ray_sign;
        side += mask * ray_sign * delta;
    }
    None
}

/// Trace one ray through the world. Pure over C1-C3 except for the
/// seen-mask hint set on LOADING cells the ray crosses.
pub fn trace_ray(world: &VoxelWorld, origin: Vec3, dir: Vec3, max_steps: u32) -> RayTrace {
    let dir = desingularize(dir.normalize_or_zero());
    let dims = world.grid().dims();
    let mut steps = 0u32;

    let Some(start) = clip_to_grid(origin, dir, dims.as_vec3()) else {
        return RayTrace { hit: None, steps };
    };

    // The DDA origin moves forward on fast-skips; everything below is
    // relative to it.
    let mut dda_origin = start;
    let ray_sign = dir.signum();
    let delta = dir.recip();
    let mut map = dda_origin.floor();
    let mut side = ((map - dda_origin) + 0.5 + ray_sign * 0.5) * delta;
    let mut mask = step_axis(side);

    while steps < max_steps {
        let cell = map.as_ivec3();
        if !in_grid(cell, dims) {
            break;
        }
        steps += 1;
        let at = cell.as_uvec3();

        match world.grid().get(at).classify() {
            HandleState::Data(index) => {
                let Some(brick) = world.storage().trace_brick(index).copied() else {
                    debug_assert!(false, "DATA handle {index} without a trace brick");
                    // Recover as a miss for this cell and keep walking.
                    mask = step_axis(side);
                    map += mask * ray_sign;
                    side += mask * ray_sign * delta;
                    continue;
                };

                let t_entry = entry_distance(map, dda_origin, ray_sign, delta);
                let entry = dda_origin + dir * t_entry;
                let local = (entry - map) * BRICK_SIZE as f32;

                if let Some((voxel, hit_mask)) =
                    trace_brick(&brick, local, dir, mask, &mut steps, max_steps)
                {
                    let palette_index =
                        world.storage().read_voxel(&brick, voxel.x, voxel.y, voxel.z);
                    let color = world
                        .palettes()
                        .entry(brick.palette_offset(), palette_index)
                        .and_then(|id| world.materials().get(id))
                        .map(|m| m.color)
                        .unwrap_or([0.0; 4]);
                    let position = map + voxel.as_vec3() / BRICK_SIZE as f32;
                    return RayTrace {
                        hit: Some(RayHit {
                            color,
                            position,
                            normal: -hit_mask * ray_sign,
                            brick_pos: at,
                            voxel_local: Some(voxel),
                        }),
                        steps,
                    };
                }
            }
            HandleState::Lod(material) => {
                let t_entry = entry_distance(map, dda_origin, ray_sign, delta);
                let color = world
                    .materials()
                    .get(brimstone_core::MaterialId(material))
                    .map(|m| m.color)
                    .unwrap_or([0.0; 4]);
                return RayTrace {
                    hit: Some(RayHit {
                        color,
                        position: dda_origin + dir * t_entry,
                        normal: -mask * ray_sign,
                        brick_pos: at,
                        voxel_local: None,
                    }),
                    steps,
                };
            }
            HandleState::Loading => {
                // Not solid; step past one cell. Leave a hint for the
                // host loader.
                world.grid().mark_seen(at);
            }
            HandleState::Empty(d) => {
                if d > 1 && d < MAX_DISTANCE {
                    // Fast-skip: the nearest solid is at least d cells
                    // out, so jump d - 1 and re-anchor the walk.
                    let t_entry = entry_distance(map, dda_origin, ray_sign, delta);
                    dda_origin += dir * (t_entry + (d - 1) as f32);
                    map = dda_origin.floor();
                    side = ((map - dda_origin) + 0.5 + ray_sign * 0.5) * delta;
                    continue;
                }
            }
        }

        mask = step_axis(side);
        map += mask * ray_sign;
        side += mask * ray_sign * delta;
    }

    RayTrace { hit: None, steps }
}

/// Fold a trace result into the four per-pixel outputs.
pub fn shade(camera_origin: Vec3, dims: UVec3, trace: &RayTrace, max_steps: u32) -> TraceOutput {
    let intensity = (trace.steps as f32 / (6.0 * max_steps as f32))
        .sqrt()
        .clamp(0.0, 1.0);
    match &trace.hit {
        Some(hit) => {
            let depth = ((hit.position - camera_origin).length() / dims.as_vec3().length())
                .clamp(0.0, 1.0);
            let n = hit.normal * 0.5 + 0.5;
            TraceOutput {
                albedo: hit.color,
                depth,
                normal: [n.x, n.y, n.z, 1.0],
                intensity,
            }
        }
        None => TraceOutput {
            albedo: [0.0; 4],
            depth: 1.0,
            normal: [0.0; 4],
            intensity,
        },
    }
}

/// Reconstruct the world-space ray through a pixel center from the
/// inverse view-projection matrix.
pub fn camera_ray(
    inv_view_proj: Mat4,
    camera_pos: Vec3,
    pixel: UVec2,
    viewport: (u32, u32),
) -> Vec3 {
    let ndc_x = (2.0 * (pixel.x as f32 + 0.5)) / viewport.0 as f32 - 1.0;
    let ndc_y = 1.0 - (2.0 * (pixel.y as f32 + 0.5)) / viewport.1 as f32;
    let far = inv_view_proj * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
    (far.truncate() / far.w - camera_pos).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_axis_tie_breaks() {
        // Ties broken by z, then x, then y.
        assert_eq!(step_axis(Vec3::new(1.0, 1.0, 1.0)), Vec3::Z);
        assert_eq!(step_axis(Vec3::new(1.0, 1.0, 2.0)), Vec3::X);
        assert_eq!(step_axis(Vec3::new(2.0, 1.0, 2.0)), Vec3::Y);
        assert_eq!(step_axis(Vec3::new(1.0, 2.0, 1.0)), Vec3::Z);
        assert_eq!(step_axis(Vec3::new(0.5, 2.0, 1.0)), Vec3::X);
    }

    #[test]
    fn test_clip_misses_are_rejected_exactly() {
        let dims = Vec3::splat(4.0);
        // Parallel ray passing above the box.
        let dir = desingularize(Vec3::new(1.0, 0.0, 0.0));
        assert!(clip_to_grid(Vec3::new(-1.0, 5.0, 2.0), dir, dims).is_none());
        // Ray pointing away from the box.
        assert!(clip_to_grid(Vec3::new(-1.0, 2.0, 2.0), -dir, dims).is_none());
        // Ray into the box advances to the entry face.
        let entry = clip_to_grid(Vec3::new(-2.0, 2.0, 2.0), dir, dims).unwrap();
        assert!((entry.x - 0.0).abs() < 1e-4);
    }

    #[test]
    fn test_entry_distance_zero_inside_start_cell() {
        let dir = desingularize(Vec3::new(1.0, 0.0, 0.0));
        let sign = dir.signum();
        let delta = dir.recip();
        let origin = Vec3::new(2.5, 0.5, 0.5);
        let map = origin.floor();
        assert_eq!(entry_distance(map, origin, sign, delta), 0.0);
    }

    #[test]
    fn test_desingularize_leaves_nonzero_alone() {
        let d = Vec3::new(0.3, -0.2, 0.9);
        assert_eq!(desingularize(d), d);
        let z = desingularize(Vec3::new(0.0, 1.0, 0.0));
        assert!(z.x != 0.0 && z.z != 0.0);
    }
}
