use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Wire protocol version the gateway expects in `Protocol-Version` / `hello.version`.
pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 8781;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Hard cap per inbound WS frame (text or binary).
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
/// Close the connection if `hello` doesn't complete within this window.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
/// WS ping cadence once a connection is `Ready`.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Process-level configuration (`chatd.toml` + `CHATD_*` env overrides).
///
/// Distinct from the per-agent `agent_config` JSON blob (§9 of the spec),
/// which stays opaque/dynamic and is never folded into this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub chat_record: ChatRecordDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            chat_record: ChatRecordDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_payload_bytes: default_max_payload(),
            handshake_timeout_ms: default_handshake_timeout(),
            heartbeat_interval_secs: default_heartbeat(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

/// HMAC-signed bearer token auth (spec.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_hmac_secret")]
    pub hmac_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            hmac_secret: default_hmac_secret(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Defaults for chat-record tunables (§6.2); per-agent `agent_config`
/// overrides these when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecordDefaults {
    #[serde(default = "default_compress_threshold")]
    pub compress_token_threshold: u64,
    #[serde(default = "default_load_history_limit")]
    pub load_history_limit: u64,
    #[serde(default = "default_keep_last_rounds")]
    pub keep_last_rounds: u64,
    #[serde(default = "default_memory_extract_max_length")]
    pub memory_extract_max_length: usize,
}

impl Default for ChatRecordDefaults {
    fn default() -> Self {
        Self {
            compress_token_threshold: default_compress_threshold(),
            load_history_limit: default_load_history_limit(),
            keep_last_rounds: default_keep_last_rounds(),
            memory_extract_max_length: default_memory_extract_max_length(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_payload() -> usize {
    MAX_PAYLOAD_BYTES
}
fn default_handshake_timeout() -> u64 {
    HANDSHAKE_TIMEOUT_MS
}
fn default_heartbeat() -> u64 {
    HEARTBEAT_INTERVAL_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.chatd/chatd.db")
}
fn default_pool_size() -> usize {
    8
}
fn default_hmac_secret() -> String {
    "change-me".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_compress_threshold() -> u64 {
    8000
}
fn default_load_history_limit() -> u64 {
    100
}
fn default_keep_last_rounds() -> u64 {
    1
}
fn default_memory_extract_max_length() -> usize {
    4000
}

impl AppConfig {
    /// Load from an optional TOML file path plus `CHATD_*` env overrides,
    /// e.g. `CHATD_SERVER_PORT=9000`.
    pub fn load(config_path: Option<&str>) -> crate::Result<Self> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::default(),
        ));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        } else {
            figment = figment.merge(Toml::file(default_config_path()));
        }
        figment = figment.merge(Env::prefixed("CHATD_").split("_"));
        figment
            .extract()
            .map_err(|e| crate::CoreError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.chatd/chatd.toml")
}

/// Install a `tracing-subscriber` global default from `logging.level`.
pub fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    if logging.json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
