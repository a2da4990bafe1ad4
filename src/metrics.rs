// Prometheus metrics definitions for the game backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("frostbrawl_connected_websockets", "Live WebSocket connections").unwrap();

    /// Players currently in the game world (bots included).
    pub static ref WORLD_PLAYERS: IntGauge =
        IntGauge::new("frostbrawl_world_players", "Players currently in the world").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Inbound wire messages decoded and dispatched.
    pub static ref MESSAGES_RECEIVED_TOTAL: IntCounter = IntCounter::new(
        "frostbrawl_messages_received_total",
        "Inbound wire messages dispatched",
    )
    .unwrap();

    /// Frames handed to the broadcaster.
    pub static ref FRAMES_BROADCAST_TOTAL: IntCounter = IntCounter::new(
        "frostbrawl_frames_broadcast_total",
        "Frames handed to the broadcaster",
    )
    .unwrap();

    /// Frames skipped for clients that lagged behind the broadcast channel.
    pub static ref BROADCAST_LAGGED_TOTAL: IntCounter = IntCounter::new(
        "frostbrawl_broadcast_lagged_total",
        "Frames skipped for lagging clients",
    )
    .unwrap();

    /// Inbound frames that failed to decode.
    pub static ref MALFORMED_FRAMES_TOTAL: IntCounter = IntCounter::new(
        "frostbrawl_malformed_frames_total",
        "Inbound frames that failed to decode",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Wall-clock duration of one simulation tick, in milliseconds.
    pub static ref GAME_TICK_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "frostbrawl_game_tick_duration_ms",
            "Simulation tick duration (ms)",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap();
}

/// Register all metrics with the global registry. Called once at startup.
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(CONNECTED_WEBSOCKETS.clone()))
        .ok();
    REGISTRY.register(Box::new(WORLD_PLAYERS.clone())).ok();
    REGISTRY
        .register(Box::new(MESSAGES_RECEIVED_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(FRAMES_BROADCAST_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(BROADCAST_LAGGED_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(MALFORMED_FRAMES_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(GAME_TICK_DURATION_MS.clone()))
        .ok();
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_after_register() {
        register_metrics();
        CONNECTED_WEBSOCKETS.set(3);
        let out = gather_metrics();
        assert!(out.contains("frostbrawl_connected_websockets"));
    }
}
