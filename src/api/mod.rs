// HTTP surface: health/metrics plus the websocket upgrade for the realtime
// game channel.

pub mod ws;

use std::sync::{Arc, Mutex};

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::engine::game::GameWorld;
use crate::hub::Hub;
use crate::metrics;
use crate::presence::PresenceStore;
use crate::pubsub::PubSubBus;
use crate::session::SessionStore;

/// Shared application state handed to every websocket connection.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub presence: PresenceStore,
    pub bus: PubSubBus,
    pub hub: Arc<Hub>,
    pub world: Arc<Mutex<GameWorld>>,
}

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "frostbrawl-backend" }))
}

pub async fn metrics_handler() -> impl IntoResponse {
    let body = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

/// Routes that need the realtime state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/game", get(ws::ws_game))
        .with_state(state)
}
