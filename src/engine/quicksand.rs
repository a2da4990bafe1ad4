use std::collections::HashSet;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

use super::config::*;
use super::map::GameMap;

/// One active quicksand event: the covered tiles and when they dry up.
#[derive(Clone, Debug)]
pub struct QuicksandEvent {
    pub tiles: HashSet<(usize, usize)>,
    pub expires_at: Instant,
}

/// Schedules quicksand events on a fixed cadence. At most one event is
/// active at a time; the successor is scheduled a full interval after the
/// previous expiry.
pub struct QuicksandScheduler {
    active: Option<QuicksandEvent>,
    next_event_at: Instant,
}

impl QuicksandScheduler {
    pub fn new(now: Instant) -> Self {
        QuicksandScheduler {
            active: None,
            next_event_at: now + Duration::from_millis(QUICKSAND_INTERVAL_MS),
        }
    }

    pub fn active(&self) -> Option<&QuicksandEvent> {
        self.active.as_ref()
    }

    /// Clear an expired event, then start a new one when due.
    pub fn update(&mut self, now: Instant, map: &GameMap) {
        let expired = self.active.as_ref().map_or(false, |e| e.expires_at <= now);
        if expired {
            self.active = None;
            self.next_event_at = now + Duration::from_millis(QUICKSAND_INTERVAL_MS);
        }

        if self.active.is_none() && now >= self.next_event_at {
            let passable = map.passable_tiles();
            let tiles: HashSet<(usize, usize)> = passable
                .choose_multiple(&mut rand::thread_rng(), QUICKSAND_TILE_COUNT)
                .copied()
                .collect();
            if !tiles.is_empty() {
                self.active = Some(QuicksandEvent {
                    tiles,
                    expires_at: now + Duration::from_millis(QUICKSAND_DURATION_MS),
                });
            } else {
                self.next_event_at = now + Duration::from_millis(QUICKSAND_INTERVAL_MS);
            }
        }
    }

    /// True iff the pixel position lies on a covered tile.
    pub fn in_quicksand(&self, map: &GameMap, px: f32, py: f32) -> bool {
        let event = match &self.active {
            Some(e) => e,
            None => return false,
        };
        let tx = map.pixel_to_tile(px);
        let ty = map.pixel_to_tile(py);
        if tx < 0 || ty < 0 {
            return false;
        }
        event.tiles.contains(&(tx as usize, ty as usize))
    }

    #[cfg(test)]
    pub fn force_event(&mut self, tiles: HashSet<(usize, usize)>, expires_at: Instant) {
        self.active = Some(QuicksandEvent { tiles, expires_at });
    }
}
