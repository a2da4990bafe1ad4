// Gameplay constants. Distances are in pixels, durations in milliseconds
// unless noted otherwise.

/// Simulation tick period.
pub const TICK_PERIOD_MS: u64 = 30;

/// Side length of a map tile in pixels.
pub const TILE_SIZE: f32 = 32.0;

// Player
pub const PLAYER_RADIUS: f32 = 12.0;
pub const PLAYER_HIT_RADIUS: f32 = 20.0;
pub const PLAYER_SPEED: f32 = 150.0; // px/s
pub const SLOWDOWN_FACTOR: f32 = 0.5;
pub const BOOST_MULTIPLIER: f32 = 1.5;

// Freeze / thaw
pub const FREEZE_DURATION_MS: u64 = 5_000;
pub const FREEZE_IMMUNITY_MS: u64 = 3_000;
pub const SPEED_BOOST_MS: u64 = 3_000;

// Projectiles
pub const POTION_SPEED: f32 = 300.0; // px/s
pub const SPLASH_RADIUS: f32 = 60.0;
pub const ARRIVAL_EPSILON: f32 = 4.0;
pub const MAX_PROJECTILES: usize = 32;
pub const PROJECTILE_RETENTION_MS: u64 = 3_000;

// Items
pub const MAX_ALOE_ITEMS: usize = 5;
pub const ALOE_SPAWN_INTERVAL_MS: u64 = 10_000;
pub const PICKUP_RADIUS: f32 = 24.0;

// Quicksand events
pub const QUICKSAND_INTERVAL_MS: u64 = 30_000;
pub const QUICKSAND_DURATION_MS: u64 = 10_000;
pub const QUICKSAND_TILE_COUNT: usize = 6;
/// Tile id the client renders for covered tiles.
pub const QUICKSAND_TILE_ID: u32 = 64;

// Bots
pub const NUM_BOTS: usize = 4;
pub const DETECTION_RANGE: f32 = 300.0;
pub const EXTENDED_RANGE: f32 = 600.0;
pub const POTION_RANGE: f32 = 220.0;
pub const POTION_COOLDOWN_MS: u64 = 3_000;
pub const PATH_UPDATE_PERIOD_MS: u64 = 500;
pub const STUCK_THRESHOLD: u32 = 20;
pub const STUCK_MOVE_MIN: f32 = 0.75;
pub const CLUSTER_THRESHOLD: f32 = 96.0;
pub const MIN_SEPARATION: f32 = 200.0;
pub const ALOE_SEARCH_RANGE: f32 = 240.0;
pub const SKIRMISH_NEAR_CHANCE: f64 = 0.30;
pub const SKIRMISH_FAR_CHANCE: f64 = 0.20;
pub const ROAM_CANDIDATES: usize = 10;
pub const WAYPOINT_DEADZONE: f32 = 5.0;

// Spawning
pub const SPAWN_ATTEMPTS: usize = 50;

// Pathfinding
pub const GOAL_REPROJECT_RADIUS: i32 = 10;
