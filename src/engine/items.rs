use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::config::*;
use super::map::GameMap;
use super::player::Player;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ItemKind {
    Aloe,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Aloe => "aloe",
        }
    }
}

/// A pickup lying on the map.
#[derive(Clone, Debug)]
pub struct Item {
    pub id: u64,
    pub kind: ItemKind,
    pub x: f32,
    pub y: f32,
    pub active: bool,
    pub created_at: Instant,
}

/// Maintains the aloe population: interval-gated top-up spawning and
/// deterministic pickup resolution.
pub struct ItemManager {
    items: Vec<Item>,
    next_id: u64,
    last_spawn: Option<Instant>,
}

impl ItemManager {
    pub fn new() -> Self {
        ItemManager {
            items: Vec::new(),
            next_id: 1,
            last_spawn: None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn active_count(&self) -> usize {
        self.items.iter().filter(|i| i.active).count()
    }

    /// Nearest active item to (x, y) within `range`, as (x, y) of the item.
    pub fn nearest_within(&self, x: f32, y: f32, range: f32) -> Option<(f32, f32)> {
        self.items
            .iter()
            .filter(|i| i.active)
            .map(|i| {
                let dx = i.x - x;
                let dy = i.y - y;
                (i.x, i.y, dx * dx + dy * dy)
            })
            .filter(|&(_, _, d)| d <= range * range)
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(ix, iy, _)| (ix, iy))
    }

    /// Spawn pass: once `ALOE_SPAWN_INTERVAL_MS` has elapsed since the last
    /// pass, top the world back up to the cap on random passable tile
    /// centers.
    pub fn spawn_pass(&mut self, now: Instant, map: &GameMap) {
        if let Some(last) = self.last_spawn {
            if now.duration_since(last) < Duration::from_millis(ALOE_SPAWN_INTERVAL_MS) {
                return;
            }
        }
        self.last_spawn = Some(now);

        while self.active_count() < MAX_ALOE_ITEMS {
            let (x, y) = match map.random_passable_center() {
                Some(p) => p,
                None => return,
            };
            let id = self.next_id;
            self.next_id += 1;
            self.items.push(Item {
                id,
                kind: ItemKind::Aloe,
                x,
                y,
                active: true,
                created_at: now,
            });
        }
    }

    /// Pickup pass: items are visited in creation order; the first
    /// non-frozen player inside the pickup radius claims each item, which is
    /// removed exactly once.
    pub fn pickup_pass(&mut self, players: &mut HashMap<String, Player>) {
        let mut ids: Vec<String> = players.keys().cloned().collect();
        ids.sort();

        self.items.retain(|item| {
            if !item.active {
                return true;
            }
            for id in &ids {
                let player = match players.get_mut(id) {
                    Some(p) => p,
                    None => continue,
                };
                if player.is_frozen {
                    continue;
                }
                if player.distance_sq_to(item.x, item.y) <= PICKUP_RADIUS * PICKUP_RADIUS {
                    player.aloe_count += 1;
                    return false;
                }
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::map::TileKind;

    fn open_map() -> GameMap {
        GameMap::from_grid(10, 10, vec![TileKind::Passable; 100])
    }

    #[test]
    fn test_spawn_tops_up_to_cap() {
        let now = Instant::now();
        let map = open_map();
        let mut items = ItemManager::new();
        items.spawn_pass(now, &map);
        assert_eq!(items.active_count(), MAX_ALOE_ITEMS);
        // A second pass inside the interval does nothing even if items vanish
        items.items.clear();
        items.spawn_pass(now + Duration::from_secs(1), &map);
        assert_eq!(items.active_count(), 0);
        // After the interval it tops back up
        items.spawn_pass(now + Duration::from_millis(ALOE_SPAWN_INTERVAL_MS + 1), &map);
        assert_eq!(items.active_count(), MAX_ALOE_ITEMS);
    }

    #[test]
    fn test_spawns_on_passable_centers() {
        let now = Instant::now();
        let mut tiles = vec![TileKind::Impassable; 100];
        tiles[5 * 10 + 5] = TileKind::Passable;
        let map = GameMap::from_grid(10, 10, tiles);
        let mut items = ItemManager::new();
        items.spawn_pass(now, &map);
        for item in items.iter() {
            assert_eq!(item.x, map.tile_center(5));
            assert_eq!(item.y, map.tile_center(5));
        }
    }

    #[test]
    fn test_pickup_increments_and_removes() {
        let now = Instant::now();
        let mut items = ItemManager::new();
        items.items.push(Item {
            id: 1,
            kind: ItemKind::Aloe,
            x: 100.0,
            y: 100.0,
            active: true,
            created_at: now,
        });
        let mut players = HashMap::new();
        players.insert("a".to_string(), Player::new("a", "a", false, 104.0, 100.0));

        items.pickup_pass(&mut players);
        assert_eq!(players["a"].aloe_count, 1);
        assert_eq!(items.active_count(), 0);
    }

    #[test]
    fn test_pickup_exclusivity() {
        // Two players overlap the same aloe; exactly one increments and the
        // item is removed exactly once.
        let now = Instant::now();
        let mut items = ItemManager::new();
        items.items.push(Item {
            id: 1,
            kind: ItemKind::Aloe,
            x: 100.0,
            y: 100.0,
            active: true,
            created_at: now,
        });
        let mut players = HashMap::new();
        players.insert("a".to_string(), Player::new("a", "a", false, 98.0, 100.0));
        players.insert("b".to_string(), Player::new("b", "b", false, 102.0, 100.0));

        items.pickup_pass(&mut players);
        let total: u32 = players.values().map(|p| p.aloe_count).sum();
        assert_eq!(total, 1);
        assert_eq!(players["a"].aloe_count, 1, "creation-order winner is deterministic");
    }

    #[test]
    fn test_frozen_players_cannot_pick_up() {
        let now = Instant::now();
        let mut items = ItemManager::new();
        items.items.push(Item {
            id: 1,
            kind: ItemKind::Aloe,
            x: 100.0,
            y: 100.0,
            active: true,
            created_at: now,
        });
        let mut players = HashMap::new();
        let mut p = Player::new("a", "a", false, 100.0, 100.0);
        p.freeze(now + Duration::from_secs(5));
        players.insert("a".to_string(), p);

        items.pickup_pass(&mut players);
        assert_eq!(players["a"].aloe_count, 0);
        assert_eq!(items.active_count(), 1);
    }

    #[test]
    fn test_nearest_within() {
        let now = Instant::now();
        let mut items = ItemManager::new();
        for (id, x) in [(1u64, 300.0f32), (2, 150.0), (3, 900.0)] {
            items.items.push(Item {
                id,
                kind: ItemKind::Aloe,
                x,
                y: 0.0,
                active: true,
                created_at: now,
            });
        }
        assert_eq!(items.nearest_within(100.0, 0.0, 240.0), Some((150.0, 0.0)));
        assert_eq!(items.nearest_within(2000.0, 0.0, 240.0), None);
    }
}
