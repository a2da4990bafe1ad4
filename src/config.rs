// Application configuration, loaded once at boot from environment variables
// and CLI flags.

use std::path::PathBuf;

use tracing::Level;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP/websocket server.
    pub addr: String,
    /// Relational store connection string. Owned by the REST service; the
    /// realtime core never connects to it.
    pub database_url: String,
    /// Redis connection string for sessions, presence, and pubsub.
    pub redis_url: String,
    /// Session TTL in seconds.
    pub session_max_age: u64,
    /// Path to the world map JSON.
    pub map_path: PathBuf,
    /// CORS origins (CSV). Empty means permissive.
    pub allowed_origins: Vec<String>,
    /// Log level: error | warn | info | debug.
    pub log_level: Level,
    /// When true this process serves the REST API only: no simulator, no
    /// pubsub subscribers, no websocket endpoint.
    pub api_server: bool,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `ADDR` - listen address (default: `0.0.0.0:8080`)
    /// - `DATABASE_URL` - relational store DSN, handed to the REST layer
    /// - `REDIS_URL` - redis connection string (default: `redis://127.0.0.1:6379`)
    /// - `SESSION_MAX_AGE` - session TTL in seconds (default: 1800)
    /// - `MAP_PATH` - world map JSON (default: `data/map.json`)
    /// - `ALLOWED_ORIGINS` - CSV of CORS origins (default: permissive)
    /// - `LOG_LEVEL` - error|warn|info|debug (default: info)
    /// - `API_SERVER` - `true`/`1` to disable the realtime core
    ///
    /// CLI flags:
    /// - `--addr <ADDR>` - override the listen address
    /// - `--map <PATH>` - override the map path
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let addr = Self::parse_cli_value(&args, "--addr")
            .or_else(|| std::env::var("ADDR").ok())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/frostbrawl".to_string());

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let session_max_age = std::env::var("SESSION_MAX_AGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1800);

        let map_path = Self::parse_cli_value(&args, "--map")
            .or_else(|| std::env::var("MAP_PATH").ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/map.json"));

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|v| Self::parse_origins(&v))
            .unwrap_or_default();

        let log_level = std::env::var("LOG_LEVEL")
            .map(|v| Self::parse_log_level(&v))
            .unwrap_or(Level::INFO);

        let api_server = std::env::var("API_SERVER")
            .map(|v| Self::parse_bool(&v))
            .unwrap_or(false);

        Config {
            addr,
            database_url,
            redis_url,
            session_max_age,
            map_path,
            allowed_origins,
            log_level,
            api_server,
        }
    }

    /// Parse a CLI flag value like `--addr 0.0.0.0:9000`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    fn parse_bool(value: &str) -> bool {
        value.eq_ignore_ascii_case("true") || value == "1"
    }

    fn parse_origins(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn parse_log_level(value: &str) -> Level {
        match value.to_ascii_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "debug" => Level::DEBUG,
            _ => Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_value() {
        let args: Vec<String> = ["bin", "--addr", "127.0.0.1:9999", "--map", "m.json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            Config::parse_cli_value(&args, "--addr").as_deref(),
            Some("127.0.0.1:9999")
        );
        assert_eq!(
            Config::parse_cli_value(&args, "--map").as_deref(),
            Some("m.json")
        );
        assert_eq!(Config::parse_cli_value(&args, "--missing"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert!(Config::parse_bool("true"));
        assert!(Config::parse_bool("TRUE"));
        assert!(Config::parse_bool("1"));
        assert!(!Config::parse_bool("false"));
        assert!(!Config::parse_bool("0"));
        assert!(!Config::parse_bool(""));
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            Config::parse_origins("https://a.example, https://b.example"),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(Config::parse_origins("").is_empty());
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(Config::parse_log_level("error"), Level::ERROR);
        assert_eq!(Config::parse_log_level("WARN"), Level::WARN);
        assert_eq!(Config::parse_log_level("debug"), Level::DEBUG);
        assert_eq!(Config::parse_log_level("info"), Level::INFO);
        assert_eq!(Config::parse_log_level("bogus"), Level::INFO);
    }
}
