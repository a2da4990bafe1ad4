use rand::Rng;
use serde::Deserialize;
use thiserror::Error;

use super::config::TILE_SIZE;

/// Movement class of a single map tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TileKind {
    Passable,
    Impassable,
    Slowdown,
}

/// Tile ids that block movement when they appear on the "ground" or
/// "collisions" layers (rocks, walls, water).
const BLOCKING_TILE_IDS: &[u32] = &[17, 18, 19, 33, 34, 35, 46, 47, 48];

/// Tile ids that block movement when they appear on the "elevation" layer
/// (boulders).
const BLOCKING_ELEVATION_IDS: &[u32] = &[121, 122, 123];

/// Tile ids on the "terrain" layer that slow movement (mud, shallow water).
const SLOWDOWN_TILE_IDS: &[u32] = &[61, 62, 63];

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse map JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("map dimensions must be > 0")]
    EmptyDimensions,
    #[error("layer '{name}' has {got} tiles, expected {expected}")]
    LayerSize {
        name: String,
        got: usize,
        expected: usize,
    },
}

// --- JSON deserialization helpers ---

#[derive(Deserialize)]
struct MapJson {
    width: usize,
    height: usize,
    #[serde(default, rename = "tileSize")]
    tile_size: Option<f32>,
    layers: Vec<LayerJson>,
}

#[derive(Deserialize)]
struct LayerJson {
    name: String,
    /// Row-major tile ids, 0 = empty.
    data: Vec<u32>,
}

/// The arena map: an immutable grid of tile movement classes.
pub struct GameMap {
    pub width: usize,
    pub height: usize,
    pub tile_size: f32,
    tiles: Vec<TileKind>,
}

impl GameMap {
    /// Build a map directly from a grid of tile kinds. Used by tests and
    /// headless tools; the server loads maps with [`GameMap::from_json`].
    pub fn from_grid(width: usize, height: usize, tiles: Vec<TileKind>) -> Self {
        assert_eq!(tiles.len(), width * height);
        GameMap {
            width,
            height,
            tile_size: TILE_SIZE,
            tiles,
        }
    }

    /// Load a map from a JSON file on disk.
    pub fn load(path: &std::path::Path) -> Result<Self, MapError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse the layered JSON map format. Every layer carries a row-major
    /// grid of tile ids; the id sets above promote tiles to Impassable or
    /// Slowdown. Impassable beats Slowdown when a tile matches both.
    pub fn from_json(json: &str) -> Result<Self, MapError> {
        let map: MapJson = serde_json::from_str(json)?;

        if map.width == 0 || map.height == 0 {
            return Err(MapError::EmptyDimensions);
        }
        let expected = map.width * map.height;

        let mut tiles = vec![TileKind::Passable; expected];
        for layer in &map.layers {
            if layer.data.len() != expected {
                return Err(MapError::LayerSize {
                    name: layer.name.clone(),
                    got: layer.data.len(),
                    expected,
                });
            }
            for (idx, &id) in layer.data.iter().enumerate() {
                if id == 0 {
                    continue;
                }
                let blocking = match layer.name.as_str() {
                    "ground" | "collisions" => BLOCKING_TILE_IDS.contains(&id),
                    "elevation" => BLOCKING_ELEVATION_IDS.contains(&id),
                    _ => false,
                };
                if blocking {
                    tiles[idx] = TileKind::Impassable;
                } else if layer.name == "terrain"
                    && SLOWDOWN_TILE_IDS.contains(&id)
                    && tiles[idx] != TileKind::Impassable
                {
                    tiles[idx] = TileKind::Slowdown;
                }
            }
        }

        Ok(GameMap {
            width: map.width,
            height: map.height,
            tile_size: map.tile_size.unwrap_or(TILE_SIZE),
            tiles,
        })
    }

    #[inline]
    fn index(&self, tx: usize, ty: usize) -> usize {
        ty * self.width + tx
    }

    // --- Dimensions ---

    /// Map width in pixels.
    pub fn pixel_width(&self) -> f32 {
        self.width as f32 * self.tile_size
    }

    /// Map height in pixels.
    pub fn pixel_height(&self) -> f32 {
        self.height as f32 * self.tile_size
    }

    // --- Coordinate conversions ---

    /// Convert a pixel coordinate to a tile coordinate. Negative pixels map
    /// below tile 0 and are handled by the out-of-bounds checks in callers.
    pub fn pixel_to_tile(&self, px: f32) -> i64 {
        (px / self.tile_size).floor() as i64
    }

    /// Pixel coordinate of the center of tile `t` along one axis.
    pub fn tile_center(&self, t: usize) -> f32 {
        t as f32 * self.tile_size + self.tile_size / 2.0
    }

    // --- Tile queries ---

    /// Tile kind at tile coordinates. Out of bounds is Impassable.
    pub fn tile_kind(&self, tx: i64, ty: i64) -> TileKind {
        if tx < 0 || ty < 0 || tx as usize >= self.width || ty as usize >= self.height {
            return TileKind::Impassable;
        }
        self.tiles[self.index(tx as usize, ty as usize)]
    }

    /// Tile kind at a pixel position. Out of bounds is Impassable.
    pub fn tile_at(&self, px: f32, py: f32) -> TileKind {
        self.tile_kind(self.pixel_to_tile(px), self.pixel_to_tile(py))
    }

    /// True iff any tile overlapped by the axis-aligned square of half-extent
    /// `r` around (px, py) is Impassable.
    pub fn collides(&self, px: f32, py: f32, r: f32) -> bool {
        let min_tx = self.pixel_to_tile(px - r);
        let max_tx = self.pixel_to_tile(px + r);
        let min_ty = self.pixel_to_tile(py - r);
        let max_ty = self.pixel_to_tile(py + r);
        for ty in min_ty..=max_ty {
            for tx in min_tx..=max_tx {
                if self.tile_kind(tx, ty) == TileKind::Impassable {
                    return true;
                }
            }
        }
        false
    }

    /// True iff the tile under (px, py) slows movement.
    pub fn in_slowdown(&self, px: f32, py: f32) -> bool {
        self.tile_at(px, py) == TileKind::Slowdown
    }

    /// All Passable tile coordinates.
    pub fn passable_tiles(&self) -> Vec<(usize, usize)> {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, &k)| k == TileKind::Passable)
            .map(|(i, _)| (i % self.width, i / self.width))
            .collect()
    }

    /// Uniformly pick a Passable tile. Returns None only when the map has no
    /// passable tiles at all.
    pub fn random_passable(&self) -> Option<(usize, usize)> {
        let passable = self.passable_tiles();
        if passable.is_empty() {
            return None;
        }
        Some(passable[rand::thread_rng().gen_range(0..passable.len())])
    }

    /// Center pixel position of a random Passable tile.
    pub fn random_passable_center(&self) -> Option<(f32, f32)> {
        self.random_passable()
            .map(|(tx, ty)| (self.tile_center(tx), self.tile_center(ty)))
    }

    /// True iff (px, py) is inside the map and a body of half-extent `r`
    /// there would not collide.
    pub fn is_valid_spawn(&self, px: f32, py: f32, r: f32) -> bool {
        px >= r
            && py >= r
            && px <= self.pixel_width() - r
            && py <= self.pixel_height() - r
            && !self.collides(px, py, r)
    }
}
