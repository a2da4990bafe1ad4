use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use frostbrawl_backend::api::{self, AppState};
use frostbrawl_backend::config::Config;
use frostbrawl_backend::engine::config::TICK_PERIOD_MS;
use frostbrawl_backend::engine::game::GameWorld;
use frostbrawl_backend::engine::map::GameMap;
use frostbrawl_backend::hub::Hub;
use frostbrawl_backend::messages::{encode_message, GameMessage};
use frostbrawl_backend::metrics;
use frostbrawl_backend::presence::PresenceStore;
use frostbrawl_backend::pubsub::PubSubBus;
use frostbrawl_backend::session::SessionStore;

#[tokio::main]
async fn main() {
    let cfg = Config::load();
    tracing_subscriber::fmt()
        .with_max_level(cfg.log_level)
        .init();
    metrics::register_metrics();

    let mut app = Router::new()
        .route("/health", get(api::health_check))
        .route("/metrics", get(api::metrics_handler));

    if cfg.api_server {
        tracing::info!("API_SERVER=true - simulator and pubsub disabled for this process");
    } else {
        // Fatal boot steps: map load and redis connects exit non-zero.
        let map = GameMap::load(&cfg.map_path).unwrap_or_else(|e| {
            tracing::error!("failed to load map {}: {e}", cfg.map_path.display());
            std::process::exit(1);
        });
        tracing::info!(
            width = map.width,
            height = map.height,
            "loaded map {}",
            cfg.map_path.display()
        );

        let sessions = SessionStore::connect(&cfg.redis_url, cfg.session_max_age)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("session store connect failed: {e}");
                std::process::exit(1);
            });
        let presence = PresenceStore::connect(&cfg.redis_url)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("presence store connect failed: {e}");
                std::process::exit(1);
            });
        // Stale membership from a previous run is meaningless.
        if let Err(e) = presence.clear().await {
            tracing::error!("presence clear failed: {e}");
            std::process::exit(1);
        }
        let bus = PubSubBus::connect(&cfg.redis_url).await.unwrap_or_else(|e| {
            tracing::error!("pubsub connect failed: {e}");
            std::process::exit(1);
        });

        let hub = Arc::new(Hub::new());
        let world = Arc::new(Mutex::new(GameWorld::new(Arc::new(map), Instant::now())));

        spawn_tick_loop(world.clone(), hub.clone());
        bus.spawn_subscribers(hub.clone(), presence.clone());

        let state = AppState {
            sessions,
            presence,
            bus,
            hub,
            world,
        };
        app = app.merge(api::router(state));
    }

    app = app.layer(cors_layer(&cfg.allowed_origins));

    let listener = tokio::net::TcpListener::bind(&cfg.addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("failed to bind {}: {e}", cfg.addr);
            std::process::exit(1);
        });
    tracing::info!("frostbrawl backend listening on {}", cfg.addr);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Run the fixed-rate simulation. The tick body executes under the world
/// lock; the snapshot bytes it produces are broadcast after the lock is
/// released so a slow client queue can never stall the simulator.
fn spawn_tick_loop(world: Arc<Mutex<GameWorld>>, hub: Arc<Hub>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(TICK_PERIOD_MS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let started = Instant::now();
            let snapshot = {
                let mut world = world.lock().unwrap();
                world.tick(started);
                world.snapshot()
            };
            metrics::GAME_TICK_DURATION_MS.observe(started.elapsed().as_secs_f64() * 1000.0);

            if let Some(snapshot) = snapshot {
                match encode_message(&GameMessage::GameState(snapshot)) {
                    Ok(frame) => hub.broadcast_frame(frame),
                    Err(e) => tracing::error!("failed to encode snapshot: {e}"),
                }
            }
        }
    });
}
