use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: BTreeMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "api.base_url") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// All overrides as setting key -> env var name, in key order.
    pub fn all(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How long a request waits on a refresh another request started.
    #[serde(default = "default_refresh_wait_ms")]
    pub refresh_wait_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            refresh_wait_ms: default_refresh_wait_ms(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn refresh_wait(&self) -> Duration {
        Duration::from_millis(self.refresh_wait_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_credentials_backend")]
    pub backend: CredentialBackend,
    /// Keyring service name.
    #[serde(default = "default_credentials_service")]
    pub service: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: default_credentials_backend(),
            service: default_credentials_service(),
        }
    }
}

/// Where session credentials live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    Keyring,
    Memory,
}

impl std::fmt::Display for CredentialBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyring => write!(f, "keyring"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for CredentialBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown credential backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Maximum number of objects held in memory.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
    #[serde(default = "default_disk_timeout_ms")]
    pub disk_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            memory_limit: default_memory_limit(),
            disk_timeout_ms: default_disk_timeout_ms(),
        }
    }
}

impl CacheConfig {
    pub fn disk_timeout(&self) -> Duration {
        Duration::from_millis(self.disk_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
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

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_base_url() -> String {
    "https://carbn-test-01.mzinck.com".to_string()
}
const fn default_request_timeout_secs() -> u64 {
    240
}
const fn default_connect_timeout_secs() -> u64 {
    10
}
const fn default_refresh_wait_ms() -> u64 {
    5_000
}
fn default_credentials_backend() -> CredentialBackend {
    if cfg!(feature = "system-keyring") {
        CredentialBackend::Keyring
    } else {
        CredentialBackend::Memory
    }
}
fn default_credentials_service() -> String {
    "carbn".to_string()
}
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("carbn")
        .join("ImageCache")
}
const fn default_memory_limit() -> usize {
    200
}
const fn default_disk_timeout_ms() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `CARBN_` takes precedence over the
    /// file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Effective settings as `(key, value, env var if overridden)`, for display.
    pub fn settings_report(&self) -> Vec<(String, String, Option<String>)> {
        let entry = |key: &str, value: String| {
            (
                key.to_string(),
                value,
                self.env_overrides.env_var_for(key).map(str::to_string),
            )
        };
        vec![
            entry("api.base_url", self.api.base_url.clone()),
            entry("api.request_timeout_secs", self.api.request_timeout_secs.to_string()),
            entry("api.connect_timeout_secs", self.api.connect_timeout_secs.to_string()),
            entry("api.refresh_wait_ms", self.api.refresh_wait_ms.to_string()),
            entry("credentials.backend", self.credentials.backend.to_string()),
            entry("credentials.service", self.credentials.service.clone()),
            entry("cache.dir", self.cache.dir.display().to_string()),
            entry("cache.memory_limit", self.cache.memory_limit.to_string()),
            entry("cache.disk_timeout_ms", self.cache.disk_timeout_ms.to_string()),
            entry("logging.level", self.logging.level.clone()),
            entry("logging.json", self.logging.json.to_string()),
        ]
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        // -- Helpers (macros for concise per-field overrides) --

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    } else {
                        tracing::warn!(env = $env, value = %val, "Ignoring unparseable override");
                    }
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }

        // -- API --
        env_str!("api.base_url", "CARBN_API_BASE_URL", self.api.base_url);
        env_parse!(
            "api.request_timeout_secs",
            "CARBN_API_REQUEST_TIMEOUT_SECS",
            self.api.request_timeout_secs
        );
        env_parse!(
            "api.connect_timeout_secs",
            "CARBN_API_CONNECT_TIMEOUT_SECS",
            self.api.connect_timeout_secs
        );
        env_parse!(
            "api.refresh_wait_ms",
            "CARBN_API_REFRESH_WAIT_MS",
            self.api.refresh_wait_ms
        );

        // -- Credentials --
        env_parse!(
            "credentials.backend",
            "CARBN_CREDENTIALS_BACKEND",
            self.credentials.backend
        );
        env_str!(
            "credentials.service",
            "CARBN_CREDENTIALS_SERVICE",
            self.credentials.service
        );

        // -- Cache --
        env_path!("cache.dir", "CARBN_CACHE_DIR", self.cache.dir);
        env_parse!(
            "cache.memory_limit",
            "CARBN_CACHE_MEMORY_LIMIT",
            self.cache.memory_limit
        );
        env_parse!(
            "cache.disk_timeout_ms",
            "CARBN_CACHE_DISK_TIMEOUT_MS",
            self.cache.disk_timeout_ms
        );

        // -- Logging --
        env_str!("logging.level", "CARBN_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "CARBN_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
