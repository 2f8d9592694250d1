//! Jump-flood propagation of skip distances into EMPTY handles (C4).
//!
//! This is the host mirror of the device kernel: the same step schedule,
//! the same candidate rule, the same truncation. Each step reads a
//! snapshot of the previous step's field and writes a fresh one, which
//! is the CPU analogue of the dispatch-boundary memory barrier between
//! device rounds.

use brimstone_core::constants::MAX_DISTANCE;
use brimstone_core::{BrickHandle, HandleState};
use glam::{IVec3, UVec3};
use rayon::prelude::*;

use crate::grid::BrickGrid;

/// Number of steps for a grid with longest side `max_dim`: one init step
/// plus the halving radius sequence `max/2, max/4, .., 1`.
pub fn step_count(max_dim: u32) -> u32 {
    ceil_log2(max_dim) + 1
}

/// Propagation radius of step `s >= 1`. Zero-radius steps are no-ops.
pub fn step_radius(max_dim: u32, step: u32) -> u32 {
    max_dim >> step
}

fn ceil_log2(n: u32) -> u32 {
    debug_assert!(n >= 1);
    32 - (n - 1).leading_zeros()
}

/// Run the jump flood to fixed point for the grid's current topology.
///
/// Writes only EMPTY cells; DATA, LOD, and LOADING handles are read-only
/// inputs. Re-running with unchanged topology reproduces the same field.
pub fn propagate(grid: &mut BrickGrid) {
    let dims = grid.dims();
    let max_dim = dims.max_element().max(1);
    let steps = step_count(max_dim);
    log::debug!("sdf propagation over {dims} in {steps} steps");

    // Step 0: every EMPTY cell starts at "unknown / far".
    for i in 0..grid.volume() {
        if let HandleState::Empty(_) = grid.handles()[i].classify() {
            grid.set_by_index(i, BrickHandle::empty(MAX_DISTANCE));
        }
    }

    for s in 1..steps {
        let radius = step_radius(max_dim, s);
        if radius == 0 {
            continue;
        }
        flood_step(grid, radius);
    }

    grid.clear_sdf_dirty();
}

/// One propagation round at the given radius.
fn flood_step(grid: &mut BrickGrid, radius: u32) {
    let dims = grid.dims();
    let prev: Vec<BrickHandle> = grid.handles().to_vec();

    let updates: Vec<(usize, u32)> = (0..prev.len())
        .into_par_iter()
        .filter_map(|i| {
            let HandleState::Empty(current) = prev[i].classify() else {
                return None;
            };
            let p = delinearize(i as u32, dims);
            let mut best = current;
            for oz in -1i32..=1 {
                for oy in -1i32..=1 {
                    for ox in -1i32..=1 {
                        let hop = (ox != 0 || oy != 0 || oz != 0) as u32;
                        let n = p + IVec3::new(ox, oy, oz) * radius as i32;
                        let Some(ni) = index_of(n, dims) else {
                            continue;
                        };
                        let candidate = match prev[ni].classify() {
                            HandleState::Data(_) | HandleState::Lod(_) => (hop * radius) as f32,
                            HandleState::Empty(d) if d < MAX_DISTANCE => {
                                (hop * radius) as f32 + d as f32
                            }
                            _ => continue,
                        };
                        let candidate = candidate as u32;
                        if candidate < best {
                            best = candidate;
                        }
                    }
                }
            }
            (best < current).then_some((i, best))
        })
        .collect();

    for (i, distance) in updates {
        grid.set_by_index(i, BrickHandle::empty(distance));
    }
}

fn delinearize(i: u32, dims: UVec3) -> IVec3 {
    IVec3::new(
        (i % dims.x) as i32,
        ((i / dims.x) % dims.y) as i32,
        (i / (dims.x * dims.y)) as i32,
    )
}

fn index_of(p: IVec3, dims: UVec3) -> Option<usize> {
    if p.x < 0
        || p.y < 0
        || p.z < 0
        || p.x >= dims.x as i32
        || p.y >= dims.y as i32
        || p.z >= dims.z as i32
    {
        return None;
    }
    Some((p.x as u32 + p.y as u32 * dims.x + p.z as u32 * dims.x * dims.y) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_at(grid: &mut BrickGrid, at: UVec3) {
        grid.set(at, BrickHandle::data(0));
    }

    fn distance_at(grid: &BrickGrid, at: UVec3) -> u32 {
        match grid.classify(at) {
            HandleState::Empty(d) => d,
            other => panic!("expected EMPTY at {at}, got {other:?}"),
        }
    }

    #[test]
    fn test_step_schedule() {
        // 16-wide grid: init + radii 8, 4, 2, 1.
        assert_eq!(step_count(16), 5);
        let radii: Vec<u32> = (1..step_count(16)).map(|s| step_radius(16, s)).collect();
        assert_eq!(radii, vec![8, 4, 2, 1]);
        // Non-power-of-two sides produce a trailing zero-radius no-op.
        assert_eq!(step_count(20), 6);
        assert_eq!(step_radius(20, 5), 0);
    }

    #[test]
    fn test_all_empty_grid_saturates() {
        let mut grid = BrickGrid::new(UVec3::splat(4));
        propagate(&mut grid);
        for z in 0..4 {
            for y in 0..4 {
                for x in 0..4 {
                    assert_eq!(distance_at(&grid, UVec3::new(x, y, z)), MAX_DISTANCE);
                }
            }
        }
    }

    #[test]
    fn test_neighbors_of_solid_get_distance_one() {
        let mut grid = BrickGrid::new(UVec3::splat(8));
        solid_at(&mut grid, UVec3::new(4, 4, 4));
        propagate(&mut grid);
        assert_eq!(distance_at(&grid, UVec3::new(3, 4, 4)), 1);
        assert_eq!(distance_at(&grid, UVec3::new(5, 5, 5)), 1);
        assert_eq!(distance_at(&grid, UVec3::new(4, 4, 3)), 1);
    }

    #[test]
    fn test_distances_are_admissible() {
        // Stored distance never exceeds the true Chebyshev distance to
        // the nearest solid cell.
        let mut grid = BrickGrid::new(UVec3::splat(8));
        let solids = [UVec3::new(1, 1, 1), UVec3::new(6, 2, 5)];
        for s in solids {
            solid_at(&mut grid, s);
        }
        propagate(&mut grid);
        for z in 0..8u32 {
            for y in 0..8u32 {
                for x in 0..8u32 {
                    let at = UVec3::new(x, y, z);
                    if grid.get(at).is_data() {
                        continue;
                    }
                    let d = distance_at(&grid, at);
                    let truth = solids
                        .iter()
                        .map(|s| {
                            let dx = (s.x as i32 - x as i32).unsigned_abs();
                            let dy = (s.y as i32 - y as i32).unsigned_abs();
                            let dz = (s.z as i32 - z as i32).unsigned_abs();
                            dx.max(dy).max(dz)
                        })
                        .min()
                        .unwrap();
                    assert!(
                        d <= truth,
                        "cell {at}: stored {d} exceeds true distance {truth}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_solid_and_loading_cells_untouched() {
        let mut grid = BrickGrid::new(UVec3::splat(4));
        grid.set(UVec3::new(1, 1, 1), BrickHandle::data(9));
        grid.set(UVec3::new(2, 1, 1), BrickHandle::lod(5));
        grid.set(UVec3::new(3, 1, 1), BrickHandle::loading());
        propagate(&mut grid);
        assert_eq!(grid.classify(UVec3::new(1, 1, 1)), HandleState::Data(9));
        assert_eq!(grid.classify(UVec3::new(2, 1, 1)), HandleState::Lod(5));
        assert_eq!(grid.classify(UVec3::new(3, 1, 1)), HandleState::Loading);
    }

    #[test]
    fn test_idempotent_for_fixed_topology() {
        let mut grid = BrickGrid::new(UVec3::splat(8));
        solid_at(&mut grid, UVec3::new(7, 0, 3));
        solid_at(&mut grid, UVec3::new(0, 6, 6));
        propagate(&mut grid);
        let first: Vec<BrickHandle> = grid.handles().to_vec();
        propagate(&mut grid);
        assert_eq!(grid.handles(), first.as_slice());
    }

    #[test]
    fn test_clears_dirty_flag() {
        let mut grid = BrickGrid::new(UVec3::splat(2));
        grid.set(UVec3::new(0, 0, 0), BrickHandle::data(0));
        assert!(grid.sdf_dirty());
        propagate(&mut grid);
        assert!(!grid.sdf_dirty());
    }
}
