use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use bugsus_core::room::RoomConfig;

/// File read by [`ServerConfig::load`] from the working directory.
pub const CONFIG_FILE: &str = "bugsus.toml";

/// Top-level server configuration, loaded from `bugsus.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    /// Origin allowed by CORS; `*` allows any.
    pub cors_origin: String,
    pub limits: LimitsConfig,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            web_root: "web".to_string(),
            cors_origin: "*".to_string(),
            limits: LimitsConfig::default(),
            game: GameConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub ws_rate_limit_per_sec: f64,
    /// Outbound messages queued per player before broadcasts are skipped.
    pub player_message_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            ws_rate_limit_per_sec: 20.0,
            player_message_buffer: 64,
        }
    }
}

/// Game rules and phase timing applied to every new room.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub min_players: usize,
    pub max_players: usize,
    pub final_round: u8,
    pub categories: Vec<String>,
    pub default_category: String,
    pub category_vote_secs: u64,
    pub ejection_vote_secs: u64,
    pub role_reveal_ms: u64,
    pub work_period_secs: u64,
    pub result_display_ms: u64,
    pub summary_display_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        let room = RoomConfig::default();
        Self {
            min_players: room.min_players,
            max_players: room.max_players,
            final_round: room.final_round,
            categories: room.categories,
            default_category: room.default_category,
            category_vote_secs: room.category_vote_duration.as_secs(),
            ejection_vote_secs: room.ejection_vote_duration.as_secs(),
            role_reveal_ms: room.role_reveal_duration.as_millis() as u64,
            work_period_secs: room.work_period_duration.as_secs(),
            result_display_ms: room.result_display_duration.as_millis() as u64,
            summary_display_ms: room.summary_display_duration.as_millis() as u64,
        }
    }
}

impl GameConfig {
    /// Per-room template handed to the registry.
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            min_players: self.min_players,
            max_players: self.max_players,
            final_round: self.final_round,
            categories: self.categories.clone(),
            default_category: self.default_category.clone(),
            category_vote_duration: Duration::from_secs(self.category_vote_secs),
            ejection_vote_duration: Duration::from_secs(self.ejection_vote_secs),
            role_reveal_duration: Duration::from_millis(self.role_reveal_ms),
            work_period_duration: Duration::from_secs(self.work_period_secs),
            result_display_duration: Duration::from_millis(self.result_display_ms),
            summary_display_duration: Duration::from_millis(self.summary_display_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("listen_addr {0:?} is not a valid socket address")]
    InvalidListenAddr(String),
    #[error("cors_origin {0:?} is not a valid origin")]
    InvalidCorsOrigin(String),
    #[error("{0} must be > 0")]
    Zero(&'static str),
    #[error("game.min_players ({min}) must be at least 3 and no more than game.max_players ({max})")]
    PlayerBounds { min: usize, max: usize },
    #[error("game.categories must not be empty")]
    NoCategories,
    #[error("game.default_category {0:?} is not one of game.categories")]
    UnknownDefaultCategory(String),
}

impl ServerConfig {
    /// Check the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }
        if self.cors_origin != "*"
            && axum::http::HeaderValue::from_str(&self.cors_origin).is_err()
        {
            return Err(ConfigError::InvalidCorsOrigin(self.cors_origin.clone()));
        }

        if self.limits.max_ws_connections == 0 {
            return Err(ConfigError::Zero("limits.max_ws_connections"));
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            return Err(ConfigError::Zero("limits.ws_rate_limit_per_sec"));
        }
        if self.limits.player_message_buffer == 0 {
            return Err(ConfigError::Zero("limits.player_message_buffer"));
        }

        let game = &self.game;
        if game.min_players < 3 || game.min_players > game.max_players {
            return Err(ConfigError::PlayerBounds {
                min: game.min_players,
                max: game.max_players,
            });
        }
        if game.final_round == 0 {
            return Err(ConfigError::Zero("game.final_round"));
        }
        if game.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        if !game.categories.contains(&game.default_category) {
            return Err(ConfigError::UnknownDefaultCategory(
                game.default_category.clone(),
            ));
        }
        let durations = [
            ("game.category_vote_secs", game.category_vote_secs),
            ("game.ejection_vote_secs", game.ejection_vote_secs),
            ("game.role_reveal_ms", game.role_reveal_ms),
            ("game.work_period_secs", game.work_period_secs),
            ("game.result_display_ms", game.result_display_ms),
            ("game.summary_display_ms", game.summary_display_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*name));
        }
        Ok(())
    }

    /// Load config from `bugsus.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file_or_default(Path::new(CONFIG_FILE));
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Parse `path`, falling back to defaults when it is missing or invalid.
    pub fn from_file_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "Loaded configuration");
                    cfg
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to parse config: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                ServerConfig::default()
            },
        }
    }

    /// Apply `BUGSUS_*` (and `PORT`) overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(addr) = var("BUGSUS_LISTEN_ADDR") {
            self.listen_addr = addr;
        } else if let Some(port) = var("PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            self.listen_addr = format!("0.0.0.0:{port}");
        }
        if let Some(root) = var("BUGSUS_WEB_ROOT") {
            self.web_root = root;
        }
        if let Some(origin) = var("BUGSUS_CLIENT_URL") {
            self.cors_origin = origin;
        }

        // Limits overrides
        if let Some(val) = var("BUGSUS_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_ws_connections = n;
        }
        if let Some(val) = var("BUGSUS_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            self.limits.ws_rate_limit_per_sec = n;
        }
    }
}
