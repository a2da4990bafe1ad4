use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rand::Rng;

use super::config::*;
use super::items::ItemManager;
use super::map::GameMap;
use super::path::find_path;
use super::player::Player;

/// AI state for one bot. The bot's visible state (position, inputs, freeze
/// timers) lives in the player table under the same id.
#[derive(Clone, Debug)]
pub struct BotState {
    pub path: Vec<(usize, usize)>,
    pub path_index: usize,
    pub last_path_update: Option<Instant>,
    pub last_potion_throw: Option<Instant>,
    pub target_id: Option<String>,
    pub roam_target: Option<(f32, f32)>,
    pub is_roaming: bool,
    pub seeking_aloe: bool,
    pub last_position: (f32, f32),
    pub stuck_ticks: u32,
}

impl BotState {
    pub fn new(x: f32, y: f32) -> Self {
        BotState {
            path: Vec::new(),
            path_index: 0,
            last_path_update: None,
            last_potion_throw: None,
            target_id: None,
            roam_target: None,
            is_roaming: false,
            seeking_aloe: false,
            last_position: (x, y),
            stuck_ticks: 0,
        }
    }

    fn path_exhausted(&self) -> bool {
        self.path_index >= self.path.len()
    }
}

/// Action a bot decided on during the bot pass. Executed by the simulator
/// after the pass so the projectile table is not mutated mid-iteration.
#[derive(Clone, Debug)]
pub enum BotAction {
    ThrowPotion {
        bot_id: String,
        target_x: f32,
        target_y: f32,
    },
}

/// Immutable view of a player taken before the bot pass; positions do not
/// change until the movement pass.
struct PlayerInfo {
    id: String,
    x: f32,
    y: f32,
    is_bot: bool,
    is_frozen: bool,
}

fn dist_sq(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = ax - bx;
    let dy = ay - by;
    dx * dx + dy * dy
}

fn clamp_tile(map: &GameMap, px: f32, py: f32) -> (usize, usize) {
    let tx = map.pixel_to_tile(px).clamp(0, map.width as i64 - 1) as usize;
    let ty = map.pixel_to_tile(py).clamp(0, map.height as i64 - 1) as usize;
    (tx, ty)
}

/// Rank candidates: unclaimed before claimed, humans before bots, then
/// nearest first. Frozen players and the bot itself are excluded upstream.
fn find_best_target(
    bot_id: &str,
    bx: f32,
    by: f32,
    infos: &[PlayerInfo],
    claimed: &HashSet<String>,
) -> Option<String> {
    let mut best: Option<(bool, bool, f32, &str)> = None;
    for info in infos {
        if info.id == bot_id || info.is_frozen {
            continue;
        }
        let d2 = dist_sq(bx, by, info.x, info.y);
        if d2 > DETECTION_RANGE * DETECTION_RANGE {
            continue;
        }
        let key = (claimed.contains(&info.id), info.is_bot, d2, info.id.as_str());
        let better = match &best {
            None => true,
            Some((claimed_b, bot_b, d2_b, _)) => {
                (key.0, key.1) < (*claimed_b, *bot_b)
                    || ((key.0, key.1) == (*claimed_b, *bot_b) && key.2 < *d2_b)
            }
        };
        if better {
            best = Some(key);
        }
    }
    best.map(|(_, _, _, id)| id.to_string())
}

/// Pick the roam destination maximizing the minimum distance to the other
/// bots among ROAM_CANDIDATES random passable tiles, stopping early once the
/// minimum clears MIN_SEPARATION.
fn smart_roam_target(map: &GameMap, bot_id: &str, infos: &[PlayerInfo]) -> Option<(f32, f32)> {
    let mut best: Option<((f32, f32), f32)> = None;
    for _ in 0..ROAM_CANDIDATES {
        let (cx, cy) = map.random_passable_center()?;
        let min_d2 = infos
            .iter()
            .filter(|i| i.is_bot && i.id != bot_id)
            .map(|i| dist_sq(cx, cy, i.x, i.y))
            .fold(f32::INFINITY, f32::min);
        if best.map_or(true, |(_, b)| min_d2 > b) {
            best = Some(((cx, cy), min_d2));
        }
        if min_d2 >= MIN_SEPARATION * MIN_SEPARATION {
            break;
        }
    }
    best.map(|(pos, _)| pos)
}

/// Point movement inputs toward (tx, ty) with a per-axis deadzone.
fn steer_toward(player: &mut Player, tx: f32, ty: f32) {
    let dx = tx - player.x;
    let dy = ty - player.y;
    player.inputs.right = dx > WAYPOINT_DEADZONE;
    player.inputs.left = dx < -WAYPOINT_DEADZONE;
    player.inputs.down = dy > WAYPOINT_DEADZONE;
    player.inputs.up = dy < -WAYPOINT_DEADZONE;
}

fn clear_inputs(player: &mut Player) {
    player.inputs.up = false;
    player.inputs.down = false;
    player.inputs.left = false;
    player.inputs.right = false;
}

/// Advance along the current path: step the waypoint index once the bot is
/// within half a tile, then steer at the active waypoint. Returns false when
/// the path is exhausted (caller falls back to direct movement or re-plans).
fn follow_path(map: &GameMap, player: &mut Player, state: &mut BotState) -> bool {
    while state.path_index < state.path.len() {
        let (wtx, wty) = state.path[state.path_index];
        let wx = map.tile_center(wtx);
        let wy = map.tile_center(wty);
        if dist_sq(player.x, player.y, wx, wy) <= (map.tile_size / 2.0) * (map.tile_size / 2.0) {
            state.path_index += 1;
            continue;
        }
        steer_toward(player, wx, wy);
        return true;
    }
    false
}

fn plan_path_to(map: &GameMap, state: &mut BotState, from: (f32, f32), to: (f32, f32), now: Instant) {
    let start = clamp_tile(map, from.0, from.1);
    let goal = clamp_tile(map, to.0, to.1);
    state.path = find_path(map, start, goal);
    state.path_index = 0;
    state.last_path_update = Some(now);
}

fn start_roam(map: &GameMap, state: &mut BotState, bot_id: &str, pos: (f32, f32), infos: &[PlayerInfo], now: Instant) {
    state.target_id = None;
    state.seeking_aloe = false;
    state.is_roaming = true;
    state.roam_target = smart_roam_target(map, bot_id, infos);
    if let Some(t) = state.roam_target {
        plan_path_to(map, state, pos, t, now);
    } else {
        state.path.clear();
        state.path_index = 0;
    }
}

/// Run the AI for every bot. Decisions only mutate the bots' own input flags
/// and AI state; potion throws are collected into `actions` for the
/// simulator's action drain.
pub fn update_bots(
    now: Instant,
    map: &GameMap,
    players: &mut HashMap<String, Player>,
    bots: &mut HashMap<String, BotState>,
    items: &ItemManager,
    actions: &mut Vec<BotAction>,
) {
    let infos: Vec<PlayerInfo> = players
        .values()
        .map(|p| PlayerInfo {
            id: p.id.clone(),
            x: p.x,
            y: p.y,
            is_bot: p.is_bot,
            is_frozen: p.is_frozen,
        })
        .collect();

    // Per-tick claim set shared across bots so two bots do not chase the
    // same player when an alternative exists.
    let mut claimed: HashSet<String> = HashSet::new();

    let mut bot_ids: Vec<String> = bots.keys().cloned().collect();
    bot_ids.sort();

    for bot_id in bot_ids {
        let state = match bots.get_mut(&bot_id) {
            Some(s) => s,
            None => continue,
        };
        let player = match players.get_mut(&bot_id) {
            Some(p) => p,
            None => continue,
        };

        if player.is_frozen {
            clear_inputs(player);
            state.stuck_ticks = 0;
            state.last_position = (player.x, player.y);
            continue;
        }

        let pos = (player.x, player.y);

        // Stuck detection: pressing keys without progress forces a re-roam
        // with a fresh destination.
        let moved = dist_sq(pos.0, pos.1, state.last_position.0, state.last_position.1).sqrt();
        if player.inputs.any() && moved < STUCK_MOVE_MIN {
            state.stuck_ticks += 1;
        } else {
            state.stuck_ticks = 0;
        }
        state.last_position = pos;
        if state.stuck_ticks >= STUCK_THRESHOLD {
            state.stuck_ticks = 0;
            start_roam(map, state, &bot_id, pos, &infos, now);
        }

        // A frozen (or vanished) target is abandoned immediately.
        if let Some(tid) = &state.target_id {
            let gone = infos
                .iter()
                .find(|i| &i.id == tid)
                .map_or(true, |i| i.is_frozen);
            if gone {
                start_roam(map, state, &bot_id, pos, &infos, now);
            }
        }

        // Disperse bot clusters while roaming.
        if state.is_roaming {
            let crowding = infos
                .iter()
                .filter(|i| i.is_bot && i.id != bot_id)
                .filter(|i| dist_sq(pos.0, pos.1, i.x, i.y) <= CLUSTER_THRESHOLD * CLUSTER_THRESHOLD)
                .count();
            if crowding >= 2 {
                start_roam(map, state, &bot_id, pos, &infos, now);
            }
        }

        // Target selection runs every tick; claims steer bots apart. When
        // nothing is in detection range an existing (still valid) target is
        // kept, so skirmish pursuits beyond the detection range survive.
        let best = find_best_target(&bot_id, pos.0, pos.1, &infos, &claimed);
        if let Some(best_id) = best {
            if state.target_id.as_deref() != Some(best_id.as_str()) {
                state.path.clear();
                state.path_index = 0;
            }
            state.target_id = Some(best_id.clone());
            state.is_roaming = false;
            state.seeking_aloe = false;
            claimed.insert(best_id);
        } else if let Some(current) = state.target_id.clone() {
            claimed.insert(current);
        }

        if let Some(tid) = state.target_id.clone() {
            let target = infos.iter().find(|i| i.id == tid);
            let (tx, ty) = match target {
                Some(t) => (t.x, t.y),
                None => continue,
            };

            let stale = state
                .last_path_update
                .map_or(true, |t| now.duration_since(t) >= Duration::from_millis(PATH_UPDATE_PERIOD_MS));
            if stale || state.path_exhausted() {
                plan_path_to(map, state, pos, (tx, ty), now);
            }
            if !follow_path(map, player, state) {
                // Pathfinding came up empty; walk straight at the target.
                steer_toward(player, tx, ty);
            }

            let in_range = dist_sq(pos.0, pos.1, tx, ty) <= POTION_RANGE * POTION_RANGE;
            let off_cooldown = state
                .last_potion_throw
                .map_or(true, |t| now.duration_since(t) >= Duration::from_millis(POTION_COOLDOWN_MS));
            if in_range && off_cooldown {
                state.last_potion_throw = Some(now);
                actions.push(BotAction::ThrowPotion {
                    bot_id: bot_id.clone(),
                    target_x: tx,
                    target_y: ty,
                });
            }
            continue;
        }

        // No target. Keep following an in-progress errand before rolling the
        // skirmish die again.
        if (state.seeking_aloe || state.is_roaming) && !state.path_exhausted() {
            follow_path(map, player, state);
            continue;
        }
        state.seeking_aloe = false;
        state.is_roaming = false;

        let roll: f64 = rand::thread_rng().gen();
        if roll < SKIRMISH_NEAR_CHANCE {
            let near = infos
                .iter()
                .filter(|i| i.is_bot && i.id != bot_id && !i.is_frozen)
                .map(|i| (i.id.clone(), dist_sq(pos.0, pos.1, i.x, i.y)))
                .filter(|&(_, d2)| d2 <= EXTENDED_RANGE * EXTENDED_RANGE)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((id, _)) = near {
                claimed.insert(id.clone());
                state.target_id = Some(id);
                state.path.clear();
                state.path_index = 0;
                clear_inputs(player);
                continue;
            }
        } else if roll < SKIRMISH_NEAR_CHANCE + SKIRMISH_FAR_CHANCE {
            let far = infos
                .iter()
                .filter(|i| i.is_bot && i.id != bot_id && !i.is_frozen)
                .map(|i| (i.id.clone(), dist_sq(pos.0, pos.1, i.x, i.y)))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((id, _)) = far {
                claimed.insert(id.clone());
                state.target_id = Some(id);
                state.path.clear();
                state.path_index = 0;
                clear_inputs(player);
                continue;
            }
        }

        if let Some((ix, iy)) = items.nearest_within(pos.0, pos.1, ALOE_SEARCH_RANGE) {
            state.seeking_aloe = true;
            plan_path_to(map, state, pos, (ix, iy), now);
            follow_path(map, player, state);
            continue;
        }

        start_roam(map, state, &bot_id, pos, &infos, now);
        if !follow_path(map, player, state) {
            clear_inputs(player);
        }
    }
}
