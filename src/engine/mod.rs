// The realtime simulation: map, pathfinding, projectiles, items, quicksand,
// bots, and the tick-driven world that owns them.

pub mod bot;
pub mod config;
pub mod game;
pub mod items;
pub mod map;
pub mod path;
pub mod player;
pub mod projectile;
pub mod quicksand;
