use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::messages::{
    GameStatePayload, InputKind, ItemSnapshot, PlayerSnapshot, ProjectileSnapshot,
    QuicksandSnapshot, Vec2,
};

use super::bot::{update_bots, BotAction, BotState};
use super::config::*;
use super::items::ItemManager;
use super::map::GameMap;
use super::player::Player;
use super::projectile::ProjectileEngine;
use super::quicksand::QuicksandScheduler;

/// The authoritative world: player and projectile tables, items, quicksand
/// and bots, advanced by a fixed-rate tick. All mutation goes through this
/// struct; the server wraps it in a mutex and broadcasts snapshots outside
/// the lock.
pub struct GameWorld {
    map: Arc<GameMap>,
    players: HashMap<String, Player>,
    bots: HashMap<String, BotState>,
    projectiles: ProjectileEngine,
    items: ItemManager,
    quicksand: QuicksandScheduler,
    last_tick: Instant,
    /// Reference pair for converting monotonic instants to unix seconds in
    /// snapshots.
    epoch_instant: Instant,
    epoch_unix: i64,
}

impl GameWorld {
    /// Create a world with the standard bot population.
    pub fn new(map: Arc<GameMap>, now: Instant) -> Self {
        Self::with_bots(map, now, NUM_BOTS)
    }

    /// Create a world with a specific number of bots. Tests use zero.
    pub fn with_bots(map: Arc<GameMap>, now: Instant, num_bots: usize) -> Self {
        let mut world = GameWorld {
            map,
            players: HashMap::new(),
            bots: HashMap::new(),
            projectiles: ProjectileEngine::new(),
            items: ItemManager::new(),
            quicksand: QuicksandScheduler::new(now),
            last_tick: now,
            epoch_instant: now,
            epoch_unix: chrono::Utc::now().timestamp(),
        };
        for i in 1..=num_bots {
            let id = format!("bot-{i}");
            let name = format!("Bot {i}");
            let (x, y) = world.spawn_position();
            world
                .players
                .insert(id.clone(), Player::new(&id, &name, true, x, y));
            world.bots.insert(id, BotState::new(x, y));
        }
        world
    }

    pub fn map(&self) -> &GameMap {
        &self.map
    }

    /// Pick a collision-free spawn. After SPAWN_ATTEMPTS failures the last
    /// candidate is accepted anyway; wall sliding unwedges the player.
    fn spawn_position(&self) -> (f32, f32) {
        let mut candidate = (self.map.pixel_width() / 2.0, self.map.pixel_height() / 2.0);
        for _ in 0..SPAWN_ATTEMPTS {
            if let Some((x, y)) = self.map.random_passable_center() {
                candidate = (x, y);
                if self.map.is_valid_spawn(x, y, PLAYER_RADIUS) {
                    return candidate;
                }
            }
        }
        tracing::warn!("no valid spawn found after {SPAWN_ATTEMPTS} attempts, using last candidate");
        candidate
    }

    // --- Player operations (called by the inbound router under the world lock) ---

    /// Add a player and return the assigned spawn position. Joining twice
    /// with the same id is idempotent and keeps the current position.
    pub fn add_player(&mut self, id: &str, name: &str) -> (f32, f32) {
        if let Some(existing) = self.players.get(id) {
            return (existing.x, existing.y);
        }
        let (x, y) = self.spawn_position();
        self.players
            .insert(id.to_string(), Player::new(id, name, false, x, y));
        tracing::info!(player_id = id, x, y, "player joined world");
        (x, y)
    }

    pub fn remove_player(&mut self, id: &str) {
        if self.players.remove(id).is_some() {
            tracing::info!(player_id = id, "player removed from world");
        }
        self.bots.remove(id);
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn bot_count(&self) -> usize {
        self.bots.len()
    }

    /// Current chase target of a bot, if any.
    pub fn bot_target(&self, id: &str) -> Option<String> {
        self.bots.get(id).and_then(|b| b.target_id.clone())
    }

    pub fn has_human_players(&self) -> bool {
        self.players.values().any(|p| !p.is_bot)
    }

    /// Apply one key edge. The flags are level-triggered, so repeated edges
    /// with the same level are no-ops.
    pub fn set_input(&mut self, id: &str, input: InputKind, pressed: bool) {
        if let Some(player) = self.players.get_mut(id) {
            player.inputs.set(input, pressed);
        }
    }

    /// Spawn a freeze potion from the player's current position toward the
    /// target. Frozen players cannot act.
    pub fn throw_potion(&mut self, id: &str, tx: f32, ty: f32, now: Instant) -> bool {
        let (x, y) = match self.players.get(id) {
            Some(p) if !p.is_frozen => (p.x, p.y),
            _ => return false,
        };
        self.projectiles.spawn_potion(id, x, y, tx, ty, now)
    }

    // --- Tick ---

    /// Advance the world one tick. Pass order is fixed: thaw, environment,
    /// items, projectiles, bots, movement, action drain, cleanup. The caller
    /// builds the snapshot right after; retention keeps just-detonated
    /// projectiles visible to it.
    pub fn tick(&mut self, now: Instant) {
        let dt = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;

        // 1. Thaw: expired freezes grant an immunity window and a boost.
        // Lapsed boost/immunity timers are dropped so snapshots report 0.
        for player in self.players.values_mut() {
            if player.is_frozen && player.frozen_until.map_or(true, |t| t <= now) {
                player.is_frozen = false;
                player.frozen_until = None;
                player.freeze_immunity_until = Some(now + Duration::from_millis(FREEZE_IMMUNITY_MS));
                player.speed_boost_until = Some(now + Duration::from_millis(SPEED_BOOST_MS));
            }
            if player.speed_boost_until.map_or(false, |t| t <= now) {
                player.speed_boost_until = None;
            }
            if player.freeze_immunity_until.map_or(false, |t| t <= now) {
                player.freeze_immunity_until = None;
            }
        }

        // 2. Environment events.
        self.quicksand.update(now, &self.map);

        // 3. Item spawn top-up, then pickups.
        self.items.spawn_pass(now, &self.map);
        self.items.pickup_pass(&mut self.players);

        // 4. Projectile flight and detonations.
        self.projectiles.update(now, dt, &mut self.players);

        // 5. Bot AI; potion throws are deferred to the drain below.
        let mut actions: Vec<BotAction> = Vec::new();
        update_bots(
            now,
            &self.map,
            &mut self.players,
            &mut self.bots,
            &self.items,
            &mut actions,
        );

        // 6. Movement with wall sliding.
        self.movement_pass(now, dt);

        // 7. Drain deferred bot actions.
        for action in actions {
            match action {
                BotAction::ThrowPotion {
                    bot_id,
                    target_x,
                    target_y,
                } => {
                    self.throw_potion(&bot_id, target_x, target_y, now);
                }
            }
        }

        // 8. Drop inactive projectiles past the retention window.
        self.projectiles.cleanup(now);
    }

    fn movement_pass(&mut self, now: Instant, dt: f32) {
        let map = &self.map;
        let quicksand = &self.quicksand;

        for player in self.players.values_mut() {
            if player.is_frozen {
                continue;
            }

            let slowed = map.in_slowdown(player.x, player.y)
                || quicksand.in_quicksand(map, player.x, player.y);
            let mut speed = PLAYER_SPEED;
            if slowed {
                speed *= SLOWDOWN_FACTOR;
            }
            if player.is_boosted(now) {
                speed *= BOOST_MULTIPLIER;
            }

            // Axis-aligned velocity straight from the flags; perpendicular
            // keys stack, so diagonals run faster than either axis alone.
            let mut vx = 0.0;
            let mut vy = 0.0;
            if player.inputs.left {
                vx -= speed;
            }
            if player.inputs.right {
                vx += speed;
            }
            if player.inputs.up {
                vy -= speed;
            }
            if player.inputs.down {
                vy += speed;
            }
            if vx == 0.0 && vy == 0.0 {
                continue;
            }

            let nx = (player.x + vx * dt).clamp(PLAYER_RADIUS, map.pixel_width() - PLAYER_RADIUS);
            let ny = (player.y + vy * dt).clamp(PLAYER_RADIUS, map.pixel_height() - PLAYER_RADIUS);

            if !map.collides(nx, ny, PLAYER_RADIUS) {
                player.x = nx;
                player.y = ny;
            } else if !map.collides(nx, player.y, PLAYER_RADIUS) {
                player.x = nx;
            } else if !map.collides(player.x, ny, PLAYER_RADIUS) {
                player.y = ny;
            }
        }
    }

    // --- Snapshot builder ---

    /// Unix seconds for a monotonic instant, for wire timestamps.
    pub fn unix_at(&self, t: Instant) -> i64 {
        self.epoch_unix + t.duration_since(self.epoch_instant).as_secs() as i64
    }

    /// Assemble the GAME_STATE payload, or None when no human players are
    /// connected (empty worlds emit no snapshots).
    pub fn snapshot(&self) -> Option<GameStatePayload> {
        if !self.has_human_players() {
            return None;
        }

        let mut ids: Vec<&String> = self.players.keys().collect();
        ids.sort();

        let players = ids
            .iter()
            .filter_map(|id| self.players.get(*id))
            .map(|p| PlayerSnapshot {
                id: p.id.clone(),
                position: Vec2 { x: p.x, y: p.y },
                is_frozen: p.is_frozen,
                frozen_until: p.frozen_until.filter(|_| p.is_frozen).map_or(0, |t| self.unix_at(t)),
                aloe_count: p.aloe_count,
                speed_boost_until: p.speed_boost_until.map_or(0, |t| self.unix_at(t)),
            })
            .collect();

        let projectiles = self
            .projectiles
            .iter()
            .map(|p| ProjectileSnapshot {
                id: p.id,
                kind: p.kind.as_str().to_string(),
                position: Vec2 { x: p.x, y: p.y },
                target: Vec2 {
                    x: p.target_x,
                    y: p.target_y,
                },
                owner_id: p.owner_id.clone(),
                active: p.active,
            })
            .collect();

        let items = self
            .items
            .iter()
            .filter(|i| i.active)
            .map(|i| ItemSnapshot {
                id: i.id,
                kind: i.kind.as_str().to_string(),
                position: Vec2 { x: i.x, y: i.y },
                active: i.active,
            })
            .collect();

        let quicksand = self.quicksand.active().map(|event| QuicksandSnapshot {
            tiles: event
                .tiles
                .iter()
                .map(|&(tx, ty)| (tx as u32, ty as u32))
                .collect(),
            expires_at: self.unix_at(event.expires_at),
            tile_id: QUICKSAND_TILE_ID,
        });

        Some(GameStatePayload {
            players,
            projectiles,
            items,
            quicksand,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::map::TileKind;

    fn open_world(now: Instant) -> GameWorld {
        let map = Arc::new(GameMap::from_grid(32, 32, vec![TileKind::Passable; 1024]));
        GameWorld::with_bots(map, now, 0)
    }

    fn run_ticks(world: &mut GameWorld, start: Instant, ticks: usize) -> Instant {
        let mut t = start;
        for _ in 0..ticks {
            t += Duration::from_millis(TICK_PERIOD_MS);
            world.tick(t);
        }
        t
    }

    #[test]
    fn test_spawn_is_collision_free() {
        let now = Instant::now();
        let mut world = open_world(now);
        let (x, y) = world.add_player("1", "alice");
        assert!(world.map().is_valid_spawn(x, y, PLAYER_RADIUS));
    }

    #[test]
    fn test_movement_right_approximately_base_speed() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        {
            let p = world.players.get_mut("1").unwrap();
            p.x = 100.0;
            p.y = 100.0;
        }
        world.set_input("1", InputKind::MoveRight, true);

        // 34 ticks * 30ms = 1.02s at 150 px/s
        run_ticks(&mut world, now, 34);
        let moved = world.player("1").unwrap().x - 100.0;
        assert!((moved - 153.0).abs() < 5.0, "moved {moved}");
    }

    #[test]
    fn test_input_idempotence() {
        let now = Instant::now();
        let mut once = open_world(now);
        once.add_player("1", "alice");
        once.players.get_mut("1").unwrap().x = 100.0;
        once.players.get_mut("1").unwrap().y = 100.0;
        once.set_input("1", InputKind::MoveRight, true);
        run_ticks(&mut once, now, 10);

        let mut twice = open_world(now);
        twice.add_player("1", "alice");
        twice.players.get_mut("1").unwrap().x = 100.0;
        twice.players.get_mut("1").unwrap().y = 100.0;
        twice.set_input("1", InputKind::MoveRight, true);
        twice.set_input("1", InputKind::MoveRight, true);
        run_ticks(&mut twice, now, 10);

        // The input is level-triggered: a duplicated press edge changes
        // nothing.
        assert_eq!(once.player("1").unwrap().x, twice.player("1").unwrap().x);
    }

    #[test]
    fn test_wall_sliding() {
        let now = Instant::now();
        // Solid column at tx=8; rows all passable otherwise.
        let mut tiles = vec![TileKind::Passable; 1024];
        for ty in 0..32 {
            tiles[ty * 32 + 8] = TileKind::Impassable;
        }
        let map = Arc::new(GameMap::from_grid(32, 32, tiles));
        let mut world = GameWorld::with_bots(map, now, 0);
        world.add_player("1", "alice");
        // Park just left of the wall
        let p = world.players.get_mut("1").unwrap();
        p.x = 8.0 * 32.0 - PLAYER_RADIUS - 1.0;
        p.y = 100.0;
        let x_before = p.x;

        // Push into the wall and down at once: x is blocked, y advances.
        world.set_input("1", InputKind::MoveRight, true);
        world.set_input("1", InputKind::MoveDown, true);
        run_ticks(&mut world, now, 5);

        let p = world.player("1").unwrap();
        assert!((p.x - x_before).abs() < 2.0, "x must stay at the wall");
        assert!(p.y > 100.0, "y must slide along the wall");
    }

    #[test]
    fn test_clamped_to_map_bounds() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        world.players.get_mut("1").unwrap().x = PLAYER_RADIUS + 1.0;
        world.players.get_mut("1").unwrap().y = 100.0;
        world.set_input("1", InputKind::MoveLeft, true);
        run_ticks(&mut world, now, 40);
        let p = world.player("1").unwrap();
        assert!(p.x >= PLAYER_RADIUS);
    }

    #[test]
    fn test_frozen_players_do_not_move() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        let p = world.players.get_mut("1").unwrap();
        p.freeze(now + Duration::from_secs(60));
        let x0 = p.x;
        world.set_input("1", InputKind::MoveRight, true);
        run_ticks(&mut world, now, 10);
        assert_eq!(world.player("1").unwrap().x, x0);
    }

    #[test]
    fn test_thaw_grants_immunity_and_boost() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        world
            .players
            .get_mut("1")
            .unwrap()
            .freeze(now + Duration::from_millis(100));

        let t = run_ticks(&mut world, now, 5); // 150ms > freeze end
        let p = world.player("1").unwrap();
        assert!(!p.is_frozen);
        assert!(p.is_immune(t));
        assert!(p.is_boosted(t));
    }

    #[test]
    fn test_boost_speeds_up_movement() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        {
            let p = world.players.get_mut("1").unwrap();
            p.x = 100.0;
            p.y = 100.0;
            p.speed_boost_until = Some(now + Duration::from_secs(60));
        }
        world.set_input("1", InputKind::MoveRight, true);
        run_ticks(&mut world, now, 10);
        let moved = world.player("1").unwrap().x - 100.0;
        let expected = PLAYER_SPEED * BOOST_MULTIPLIER * 0.3;
        assert!((moved - expected).abs() < 3.0, "moved {moved}, expected {expected}");
    }

    #[test]
    fn test_snapshot_skipped_without_humans() {
        let now = Instant::now();
        let map = Arc::new(GameMap::from_grid(32, 32, vec![TileKind::Passable; 1024]));
        let mut world = GameWorld::with_bots(map, now, 2);
        world.tick(now + Duration::from_millis(30));
        assert!(world.snapshot().is_none());

        world.add_player("1", "alice");
        assert!(world.snapshot().is_some());
    }

    #[test]
    fn test_snapshot_contents() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        // Target far outside the arena so the potion is still in flight.
        world.throw_potion("1", 5000.0, 5000.0, now);
        let t = run_ticks(&mut world, now, 1);

        let snap = world.snapshot().unwrap();
        assert_eq!(snap.players.len(), 1);
        assert_eq!(snap.players[0].id, "1");
        assert!(!snap.players[0].is_frozen);
        assert_eq!(snap.players[0].frozen_until, 0);
        assert_eq!(snap.projectiles.len(), 1);
        assert_eq!(snap.projectiles[0].owner_id, "1");
        assert!(snap.projectiles[0].active);
        let _ = t;
    }

    #[test]
    fn test_frozen_snapshot_timestamp() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        let until = now + Duration::from_secs(5);
        world.players.get_mut("1").unwrap().freeze(until);

        let snap = world.snapshot().unwrap();
        assert!(snap.players[0].is_frozen);
        assert_eq!(snap.players[0].frozen_until, world.unix_at(until));
    }

    #[test]
    fn test_remove_player() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        world.remove_player("1");
        assert!(world.player("1").is_none());
        assert!(!world.has_human_players());
    }

    #[test]
    fn test_join_is_idempotent() {
        let now = Instant::now();
        let mut world = open_world(now);
        let first = world.add_player("1", "alice");
        let second = world.add_player("1", "alice");
        assert_eq!(first, second);
        assert_eq!(world.players().count(), 1);
    }

    #[test]
    fn test_throw_potion_rejected_while_frozen() {
        let now = Instant::now();
        let mut world = open_world(now);
        world.add_player("1", "alice");
        world
            .players
            .get_mut("1")
            .unwrap()
            .freeze(now + Duration::from_secs(5));
        assert!(!world.throw_potion("1", 10.0, 10.0, now));
    }

    #[test]
    fn test_world_invariants_over_random_run() {
        let now = Instant::now();
        let map = Arc::new(GameMap::from_grid(32, 32, vec![TileKind::Passable; 1024]));
        let mut world = GameWorld::with_bots(map, now, NUM_BOTS);
        world.add_player("1", "alice");
        world.set_input("1", InputKind::MoveRight, true);
        world.set_input("1", InputKind::MoveDown, true);

        let mut t = now;
        for _ in 0..200 {
            t += Duration::from_millis(TICK_PERIOD_MS);
            world.tick(t);
            for p in world.players() {
                assert!(p.x >= PLAYER_RADIUS && p.x <= world.map().pixel_width() - PLAYER_RADIUS);
                assert!(p.y >= PLAYER_RADIUS && p.y <= world.map().pixel_height() - PLAYER_RADIUS);
                assert!(!world.map().collides(p.x, p.y, PLAYER_RADIUS));
                if p.is_frozen {
                    assert_eq!(p.aloe_count, 0);
                }
            }
            assert!(world.projectiles.active_count() <= MAX_PROJECTILES);
            assert!(world.items.active_count() <= MAX_ALOE_ITEMS);
        }
    }
}
