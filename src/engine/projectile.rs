use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::config::*;
use super::player::Player;

/// Kinds of projectile the server simulates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProjectileKind {
    FreezePotion,
}

impl ProjectileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectileKind::FreezePotion => "freeze_potion",
        }
    }
}

/// A kinematic projectile travelling in a straight line to its target.
#[derive(Clone, Debug)]
pub struct Projectile {
    pub id: u64,
    pub kind: ProjectileKind,
    pub owner_id: String,
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub speed: f32,
    pub active: bool,
    pub created_at: Instant,
}

/// Owns the projectile table: spawning with the live cap, per-tick advance
/// and detonation, and retention cleanup.
pub struct ProjectileEngine {
    projectiles: Vec<Projectile>,
    next_id: u64,
}

impl ProjectileEngine {
    pub fn new() -> Self {
        ProjectileEngine {
            projectiles: Vec::new(),
            next_id: 1,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.iter()
    }

    pub fn active_count(&self) -> usize {
        self.projectiles.iter().filter(|p| p.active).count()
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    /// Spawn a freeze potion from (x, y) toward (tx, ty). When the table is
    /// at capacity the oldest inactive projectile is evicted; if every slot
    /// is still active the spawn is dropped.
    pub fn spawn_potion(
        &mut self,
        owner_id: &str,
        x: f32,
        y: f32,
        tx: f32,
        ty: f32,
        now: Instant,
    ) -> bool {
        if self.projectiles.len() >= MAX_PROJECTILES {
            let oldest_inactive = self
                .projectiles
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.active)
                .min_by_key(|(_, p)| p.created_at)
                .map(|(i, _)| i);
            match oldest_inactive {
                Some(i) => {
                    self.projectiles.remove(i);
                }
                None => {
                    tracing::warn!(owner_id, "projectile cap reached, dropping potion throw");
                    return false;
                }
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.projectiles.push(Projectile {
            id,
            kind: ProjectileKind::FreezePotion,
            owner_id: owner_id.to_string(),
            x,
            y,
            target_x: tx,
            target_y: ty,
            speed: POTION_SPEED,
            active: true,
            created_at: now,
        });
        true
    }

    /// Advance every active projectile by `dt` seconds and detonate on
    /// arrival or on contact with a non-owner player.
    pub fn update(&mut self, now: Instant, dt: f32, players: &mut HashMap<String, Player>) {
        // Player ids in a stable order so contact tests are deterministic.
        let mut ids: Vec<String> = players.keys().cloned().collect();
        ids.sort();

        let mut detonations: Vec<(usize, f32, f32)> = Vec::new();

        for (pi, p) in self.projectiles.iter_mut().enumerate() {
            if !p.active {
                continue;
            }
            let dx = p.target_x - p.x;
            let dy = p.target_y - p.y;
            let remaining = (dx * dx + dy * dy).sqrt();
            let step = p.speed * dt;

            if remaining < ARRIVAL_EPSILON || remaining <= step {
                p.x = p.target_x;
                p.y = p.target_y;
                detonations.push((pi, p.x, p.y));
                continue;
            }

            p.x += dx / remaining * step;
            p.y += dy / remaining * step;

            let hit = ids.iter().any(|id| {
                if *id == p.owner_id {
                    return false;
                }
                players
                    .get(id)
                    .map_or(false, |pl| pl.distance_sq_to(p.x, p.y) <= PLAYER_HIT_RADIUS * PLAYER_HIT_RADIUS)
            });
            if hit {
                detonations.push((pi, p.x, p.y));
            }
        }

        for (pi, x, y) in detonations {
            let owner = self.projectiles[pi].owner_id.clone();
            self.projectiles[pi].active = false;
            Self::apply_splash(&owner, x, y, now, players);
        }
    }

    /// Freeze every non-owner player inside the splash radius whose immunity
    /// window has passed.
    fn apply_splash(
        owner_id: &str,
        x: f32,
        y: f32,
        now: Instant,
        players: &mut HashMap<String, Player>,
    ) {
        let frozen_until = now + Duration::from_millis(FREEZE_DURATION_MS);
        for player in players.values_mut() {
            if player.id == owner_id || player.is_immune(now) {
                continue;
            }
            if player.distance_sq_to(x, y) <= SPLASH_RADIUS * SPLASH_RADIUS {
                player.freeze(frozen_until);
            }
        }
    }

    /// Purge inactive projectiles older than the retention window.
    pub fn cleanup(&mut self, now: Instant) {
        let retention = Duration::from_millis(PROJECTILE_RETENTION_MS);
        self.projectiles
            .retain(|p| p.active || now.duration_since(p.created_at) < retention);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players_at(positions: &[(&str, f32, f32)]) -> HashMap<String, Player> {
        positions
            .iter()
            .map(|&(id, x, y)| (id.to_string(), Player::new(id, id, false, x, y)))
            .collect()
    }

    #[test]
    fn test_potion_reaches_target_and_freezes() {
        let now = Instant::now();
        let mut engine = ProjectileEngine::new();
        let mut players = players_at(&[("a", 100.0, 100.0), ("b", 400.0, 100.0)]);

        assert!(engine.spawn_potion("a", 100.0, 100.0, 400.0, 100.0, now));

        // 300 px at 300 px/s: just over a second of 30ms ticks
        let dt = 0.03;
        let mut t = now;
        for _ in 0..40 {
            t += Duration::from_millis(30);
            engine.update(t, dt, &mut players);
        }

        assert!(players["b"].is_frozen, "target inside splash must freeze");
        assert!(!players["a"].is_frozen, "owner is never frozen by own potion");
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_splash_radius_boundary() {
        let now = Instant::now();
        let mut engine = ProjectileEngine::new();
        let mut players = players_at(&[
            ("owner", 0.0, 0.0),
            ("near", 130.0, 100.0),
            ("far", 130.0 + SPLASH_RADIUS + 10.0, 100.0),
        ]);
        engine.spawn_potion("owner", 120.0, 100.0, 130.0, 100.0, now);
        // One tick is enough: remaining distance (10) is within one step.
        engine.update(now + Duration::from_millis(30), 0.03, &mut players);

        assert!(players["near"].is_frozen);
        assert!(!players["far"].is_frozen);
    }

    #[test]
    fn test_immunity_blocks_refreeze() {
        let now = Instant::now();
        let mut engine = ProjectileEngine::new();
        let mut players = players_at(&[("a", 0.0, 0.0), ("b", 204.0, 200.0)]);
        players.get_mut("b").unwrap().freeze_immunity_until =
            Some(now + Duration::from_secs(60));

        engine.spawn_potion("a", 200.0, 200.0, 204.0, 200.0, now);
        engine.update(now + Duration::from_millis(30), 0.03, &mut players);

        assert!(!players["b"].is_frozen);
    }

    #[test]
    fn test_contact_detonation_before_arrival() {
        let now = Instant::now();
        let mut engine = ProjectileEngine::new();
        // "b" stands on the flight path well before the target.
        let mut players = players_at(&[("a", 0.0, 100.0), ("b", 50.0, 100.0)]);
        engine.spawn_potion("a", 0.0, 100.0, 1000.0, 100.0, now);

        let mut t = now;
        for _ in 0..10 {
            t += Duration::from_millis(30);
            engine.update(t, 0.03, &mut players);
        }

        assert!(players["b"].is_frozen);
        // Detonated mid-flight, nowhere near the target
        let p = engine.iter().next().unwrap();
        assert!(!p.active);
        assert!(p.x < 200.0);
    }

    #[test]
    fn test_cap_evicts_oldest_inactive() {
        let now = Instant::now();
        let mut engine = ProjectileEngine::new();
        let mut players = players_at(&[("a", 0.0, 0.0)]);

        // Fill the table; each potion detonates instantly (target on top of
        // spawn) leaving inactive entries behind.
        for i in 0..MAX_PROJECTILES {
            let t = now + Duration::from_millis(i as u64);
            assert!(engine.spawn_potion("a", 0.0, 0.0, 1.0, 0.0, t));
            engine.update(t, 0.03, &mut players);
        }
        assert_eq!(engine.len(), MAX_PROJECTILES);
        assert_eq!(engine.active_count(), 0);

        let first_id = engine.iter().next().unwrap().id;
        assert!(engine.spawn_potion("a", 0.0, 0.0, 500.0, 0.0, now + Duration::from_secs(1)));
        assert_eq!(engine.len(), MAX_PROJECTILES);
        assert!(engine.iter().all(|p| p.id != first_id), "oldest inactive evicted");
    }

    #[test]
    fn test_cap_drops_when_all_active() {
        let now = Instant::now();
        let mut engine = ProjectileEngine::new();
        for _ in 0..MAX_PROJECTILES {
            assert!(engine.spawn_potion("a", 0.0, 0.0, 10_000.0, 0.0, now));
        }
        // Table full of active projectiles: the spawn is dropped.
        assert!(!engine.spawn_potion("a", 0.0, 0.0, 10_000.0, 0.0, now));
        assert_eq!(engine.len(), MAX_PROJECTILES);
    }

    #[test]
    fn test_retention_purge() {
        let now = Instant::now();
        let mut engine = ProjectileEngine::new();
        let mut players = players_at(&[("a", 0.0, 0.0)]);
        engine.spawn_potion("a", 0.0, 0.0, 1.0, 0.0, now);
        engine.update(now, 0.03, &mut players);
        assert_eq!(engine.len(), 1);

        engine.cleanup(now + Duration::from_millis(PROJECTILE_RETENTION_MS / 2));
        assert_eq!(engine.len(), 1);
        engine.cleanup(now + Duration::from_millis(PROJECTILE_RETENTION_MS + 100));
        assert_eq!(engine.len(), 0);
    }
}
