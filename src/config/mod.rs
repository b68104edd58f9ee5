//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::arena::ArenaSettings;
use crate::game::session::SessionSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS; empty means any origin
    pub client_origins: Vec<String>,

    /// Physics steps per second
    pub tick_rate: u32,
    /// Broadcast snapshots per second
    pub snapshot_rate: u32,

    pub min_players: usize,
    pub start_delay: Duration,
    pub elimination_interval: Duration,
    pub end_delay: Duration,
    pub tag_cooldown: Duration,

    /// Arena size used when no map file is given
    pub arena_width: f32,
    pub arena_height: f32,
    pub wall_thickness: f32,
    pub player_radius: f32,
    /// Force applied for a full-length input
    pub player_speed: f32,

    /// Optional JSON map descriptor
    pub map_path: Option<PathBuf>,
    /// Fixed seed for reproducible rounds
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // PORT wins over SERVER_ADDR, as hosting platforms set it
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr.clone()))?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origins,

            tick_rate: parse(&lookup, "TICK_RATE", 60)?,
            snapshot_rate: parse(&lookup, "SNAPSHOT_RATE", 30)?,

            min_players: parse(&lookup, "MIN_PLAYERS", 2)?,
            start_delay: millis(&lookup, "START_DELAY_MS", 5000)?,
            elimination_interval: millis(&lookup, "ELIMINATION_INTERVAL_MS", 10_000)?,
            end_delay: millis(&lookup, "END_DELAY_MS", 5000)?,
            tag_cooldown: millis(&lookup, "TAG_COOLDOWN_MS", 1000)?,

            arena_width: parse(&lookup, "ARENA_WIDTH", 3840.0)?,
            arena_height: parse(&lookup, "ARENA_HEIGHT", 2160.0)?,
            wall_thickness: parse(&lookup, "WALL_THICKNESS", 50.0)?,
            player_radius: parse(&lookup, "PLAYER_RADIUS", 75.0)?,
            player_speed: parse(&lookup, "PLAYER_SPEED", 2000.0)?,

            map_path: lookup("MAP_PATH").map(PathBuf::from),
            rng_seed: lookup("RNG_SEED").map(|v| parse_value("RNG_SEED", &v)).transpose()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_players < 2 {
            return Err(ConfigError::OutOfRange {
                key: "MIN_PLAYERS",
                reason: "a round needs at least 2 players",
            });
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::OutOfRange {
                key: "TICK_RATE",
                reason: "must be positive",
            });
        }
        if self.snapshot_rate == 0 || self.snapshot_rate > self.tick_rate {
            return Err(ConfigError::OutOfRange {
                key: "SNAPSHOT_RATE",
                reason: "must be between 1 and TICK_RATE",
            });
        }
        for (key, value) in [
            ("ARENA_WIDTH", self.arena_width),
            ("ARENA_HEIGHT", self.arena_height),
            ("PLAYER_RADIUS", self.player_radius),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::OutOfRange {
                    key,
                    reason: "must be a positive number",
                });
            }
        }
        for (key, value) in [
            ("WALL_THICKNESS", self.wall_thickness),
            ("PLAYER_SPEED", self.player_speed),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::OutOfRange {
                    key,
                    reason: "must be a non-negative number",
                });
            }
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            min_players: self.min_players,
            start_delay: self.start_delay,
            elimination_interval: self.elimination_interval,
            end_delay: self.end_delay,
            tag_cooldown: self.tag_cooldown,
        }
    }

    pub fn arena_settings(&self) -> ArenaSettings {
        ArenaSettings {
            tick_rate: self.tick_rate,
            snapshot_rate: self.snapshot_rate,
            player_radius: self.player_radius,
            player_speed: self.player_speed,
        }
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn millis<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse(lookup, key, default).map(Duration::from_millis)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{key} out of range: {reason}")]
    OutOfRange {
        key: &'static str,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.log_level, "info");
        assert!(config.client_origins.is_empty());
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.snapshot_rate, 30);
        assert_eq!(config.min_players, 2);
        assert_eq!(config.start_delay, Duration::from_secs(5));
        assert_eq!(config.elimination_interval, Duration::from_secs(10));
        assert_eq!(config.tag_cooldown, Duration::from_secs(1));
        assert_eq!(config.arena_width, 3840.0);
        assert_eq!(config.player_radius, 75.0);
        assert!(config.map_path.is_none());
        assert!(config.rng_seed.is_none());
    }

    #[test]
    fn test_port_overrides_server_addr() {
        let config = load(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:1234")]).unwrap();
        assert_eq!(config.server_addr.port(), 9000);

        let config = load(&[("SERVER_ADDR", "127.0.0.1:1234")]).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:1234".parse().unwrap());

        assert!(matches!(
            load(&[("PORT", "http")]),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_origins_are_split() {
        let config = load(&[("CLIENT_ORIGIN", "http://a.test, http://b.test,")]).unwrap();
        assert_eq!(config.client_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_overrides_flow_into_settings() {
        let config = load(&[
            ("MIN_PLAYERS", "3"),
            ("START_DELAY_MS", "250"),
            ("TICK_RATE", "30"),
            ("SNAPSHOT_RATE", "30"),
            ("RNG_SEED", "99"),
        ])
        .unwrap();
        let session = config.session_settings();
        assert_eq!(session.min_players, 3);
        assert_eq!(session.start_delay, Duration::from_millis(250));
        assert_eq!(config.arena_settings().tick_rate, 30);
        assert_eq!(config.rng_seed, Some(99));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            load(&[("TICK_RATE", "fast")]),
            Err(ConfigError::Invalid { key: "TICK_RATE", .. })
        ));
        assert!(matches!(
            load(&[("MIN_PLAYERS", "1")]),
            Err(ConfigError::OutOfRange { key: "MIN_PLAYERS", .. })
        ));
        assert!(matches!(
            load(&[("SNAPSHOT_RATE", "120")]),
            Err(ConfigError::OutOfRange { key: "SNAPSHOT_RATE", .. })
        ));
        assert!(matches!(
            load(&[("PLAYER_RADIUS", "-5")]),
            Err(ConfigError::OutOfRange { key: "PLAYER_RADIUS", .. })
        ));
        assert!(matches!(
            load(&[("RNG_SEED", "abc")]),
            Err(ConfigError::Invalid { key: "RNG_SEED", .. })
        ));
    }
}
