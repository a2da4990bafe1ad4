// Server error taxonomy. Boot-time failures are fatal; everything else is
// logged and the simulator keeps running.

use thiserror::Error;

use crate::engine::map::MapError;
use crate::messages::WireError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("map load failed: {0}")]
    MapLoad(#[from] MapError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("session store error: {0}")]
    Session(String),
}
