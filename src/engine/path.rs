use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::config::GOAL_REPROJECT_RADIUS;
use super::map::{GameMap, TileKind};

// --- A* internals ---

#[derive(Copy, Clone, Eq, PartialEq)]
struct AStarNode {
    f: i32,
    /// Insertion counter; earlier pushes win ties on f.
    seq: u32,
    x: usize,
    y: usize,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap via reversed ordering
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn move_cost(kind: TileKind) -> Option<i32> {
    match kind {
        TileKind::Passable => Some(1),
        TileKind::Slowdown => Some(2),
        TileKind::Impassable => None,
    }
}

/// If the goal tile is Impassable, reproject it to the nearest walkable tile
/// by expanding square rings up to GOAL_REPROJECT_RADIUS. The original goal is
/// returned when no walkable tile is found (the search then yields an empty
/// path).
fn reproject_goal(map: &GameMap, gx: usize, gy: usize) -> (usize, usize) {
    if map.tile_kind(gx as i64, gy as i64) != TileKind::Impassable {
        return (gx, gy);
    }
    for ring in 1..=GOAL_REPROJECT_RADIUS {
        let mut best: Option<(usize, usize, i64)> = None;
        for dy in -ring..=ring {
            for dx in -ring..=ring {
                if dx.abs() != ring && dy.abs() != ring {
                    continue; // interior of the ring was covered earlier
                }
                let nx = gx as i64 + dx as i64;
                let ny = gy as i64 + dy as i64;
                if map.tile_kind(nx, ny) == TileKind::Impassable {
                    continue;
                }
                let dist = (dx as i64) * (dx as i64) + (dy as i64) * (dy as i64);
                if best.map_or(true, |(_, _, d)| dist < d) {
                    best = Some((nx as usize, ny as usize, dist));
                }
            }
        }
        if let Some((bx, by, _)) = best {
            return (bx, by);
        }
    }
    (gx, gy)
}

/// A* over the 4-connected tile grid. Passable tiles cost 1, Slowdown tiles
/// cost 2, Impassable tiles are never entered. The heuristic is Manhattan
/// distance; node expansion is capped at width*height. The returned path
/// excludes the start tile; an empty path means no route was found.
pub fn find_path(
    map: &GameMap,
    start: (usize, usize),
    goal: (usize, usize),
) -> Vec<(usize, usize)> {
    let (sx, sy) = start;
    let (gx, gy) = reproject_goal(map, goal.0, goal.1);

    if map.tile_kind(sx as i64, sy as i64) == TileKind::Impassable
        || map.tile_kind(gx as i64, gy as i64) == TileKind::Impassable
    {
        return Vec::new();
    }
    if (sx, sy) == (gx, gy) {
        return Vec::new();
    }

    let w = map.width;
    let h = map.height;
    let size = w * h;

    let mut g_score = vec![i32::MAX; size];
    let mut came_from = vec![usize::MAX; size];
    let mut closed = vec![false; size];

    let start_idx = sy * w + sx;
    let goal_idx = gy * w + gx;
    g_score[start_idx] = 0;

    let heuristic = |tx: usize, ty: usize| -> i32 {
        (tx as i32 - gx as i32).abs() + (ty as i32 - gy as i32).abs()
    };

    let mut seq: u32 = 0;
    let mut open = BinaryHeap::new();
    open.push(AStarNode {
        f: heuristic(sx, sy),
        seq,
        x: sx,
        y: sy,
    });

    let dirs: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
    let mut expanded = 0usize;

    while let Some(current) = open.pop() {
        let cidx = current.y * w + current.x;
        if cidx == goal_idx {
            let mut path = Vec::new();
            let mut idx = goal_idx;
            while idx != start_idx {
                path.push((idx % w, idx / w));
                idx = came_from[idx];
            }
            path.reverse();
            return path;
        }

        if closed[cidx] {
            continue;
        }
        closed[cidx] = true;

        expanded += 1;
        if expanded > size {
            return Vec::new();
        }

        let current_g = g_score[cidx];
        for (dx, dy) in &dirs {
            let nx = current.x as i32 + dx;
            let ny = current.y as i32 + dy;
            let cost = match move_cost(map.tile_kind(nx as i64, ny as i64)) {
                Some(c) => c,
                None => continue,
            };
            let nx = nx as usize;
            let ny = ny as usize;
            let nidx = ny * w + nx;
            if closed[nidx] {
                continue;
            }
            let tentative_g = current_g + cost;
            if tentative_g < g_score[nidx] {
                g_score[nidx] = tentative_g;
                came_from[nidx] = cidx;
                seq += 1;
                open.push(AStarNode {
                    f: tentative_g + heuristic(nx, ny),
                    seq,
                    x: nx,
                    y: ny,
                });
            }
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_map(w: usize, h: usize) -> Vec<TileKind> {
        vec![TileKind::Passable; w * h]
    }

    #[test]
    fn test_straight_path_excludes_start() {
        let m = GameMap::from_grid(8, 8, open_map(8, 8));
        let path = find_path(&m, (1, 1), (4, 1));
        assert_eq!(path, vec![(2, 1), (3, 1), (4, 1)]);
    }

    #[test]
    fn test_same_tile_is_empty() {
        let m = GameMap::from_grid(8, 8, open_map(8, 8));
        assert!(find_path(&m, (3, 3), (3, 3)).is_empty());
    }

    #[test]
    fn test_routes_around_wall() {
        let mut tiles = open_map(8, 8);
        // Wall column at tx=4, rows 0..=5
        for ty in 0..=5 {
            tiles[ty * 8 + 4] = TileKind::Impassable;
        }
        let m = GameMap::from_grid(8, 8, tiles);
        let path = find_path(&m, (2, 2), (6, 2));
        assert!(!path.is_empty());
        for &(tx, ty) in &path {
            assert!(!(tx == 4 && ty <= 5), "path crossed the wall at ({tx}, {ty})");
        }
        assert_eq!(*path.last().unwrap(), (6, 2));
    }

    #[test]
    fn test_prefers_passable_over_slowdown() {
        // Row 1 is a slowdown corridor; row 0 stays passable. A route from
        // (0,1) to (4,1) should detour through row 0 (cost 1) rather than
        // walk the slowdown row (cost 2).
        let mut tiles = open_map(5, 3);
        for tx in 1..4 {
            tiles[5 + tx] = TileKind::Slowdown;
        }
        let m = GameMap::from_grid(5, 3, tiles);
        let path = find_path(&m, (0, 1), (4, 1));
        assert!(!path.is_empty());
        assert!(
            path.iter().any(|&(_, ty)| ty != 1),
            "expected a detour off the slowdown row, got {path:?}"
        );
    }

    #[test]
    fn test_unreachable_is_empty() {
        let mut tiles = open_map(8, 8);
        for ty in 0..8 {
            tiles[ty * 8 + 4] = TileKind::Impassable;
        }
        let m = GameMap::from_grid(8, 8, tiles);
        assert!(find_path(&m, (1, 1), (6, 6)).is_empty());
    }

    #[test]
    fn test_goal_reprojection() {
        let mut tiles = open_map(8, 8);
        tiles[3 * 8 + 6] = TileKind::Impassable; // goal tile itself
        let m = GameMap::from_grid(8, 8, tiles);
        let path = find_path(&m, (1, 3), (6, 3));
        assert!(!path.is_empty());
        let &(lx, ly) = path.last().unwrap();
        // Ends on a neighbor of the blocked goal
        assert!((lx as i32 - 6).abs() + (ly as i32 - 3).abs() == 1);
    }

    #[test]
    fn test_fully_blocked_goal_region() {
        // Goal buried in the middle of a solid 5x5 block: reprojection has
        // to expand several rings before it clears the block, and the path
        // ends on the first walkable tile outside it.
        let mut tiles = open_map(16, 16);
        for ty in 6..11 {
            for tx in 6..11 {
                tiles[ty * 16 + tx] = TileKind::Impassable;
            }
        }
        let m = GameMap::from_grid(16, 16, tiles);
        let path = find_path(&m, (1, 8), (8, 8));
        assert!(!path.is_empty());
        let &(lx, ly) = path.last().unwrap();
        assert_ne!((lx, ly), (8, 8));
        assert_ne!(m.tile_kind(lx as i64, ly as i64), TileKind::Impassable);
    }
}
