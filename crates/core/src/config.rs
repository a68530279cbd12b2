//! Environment-based configuration.
//!
//! Every option reads one env var with its own default, so any subset
//! can be overridden independently. Call [`load_dotenv`] before
//! [`Config::from_env`] to pick up a local `.env` file.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

fn env_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(key, default_secs))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub dispatch: DispatchConfig,
    pub budget: BudgetConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            http: HttpConfig::from_env(),
            dispatch: DispatchConfig::from_env(),
            budget: BudgetConfig::from_env(),
            cache: CacheConfig::from_env(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  server:   name={}", self.server.name);
        tracing::info!(
            "  http:     {}://{}:{} cors={} websocket={}",
            self.http.scheme(),
            self.http.host,
            self.http.port,
            self.http.cors,
            self.http.websocket,
        );
        tracing::info!(
            "  timeouts: request={}s tool={}s",
            self.http.request_timeout.as_secs(),
            self.dispatch.tool_timeout.as_secs(),
        );
        tracing::info!(
            "  budget:   model_limit={} safety_margin={} response_limit={}",
            self.budget.model_token_limit,
            self.budget.safety_margin_tokens,
            self.budget.response_token_limit,
        );
        tracing::info!("  cache:    ttl={}s", self.cache.ttl.as_secs());
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            http: HttpConfig::default(),
            dispatch: DispatchConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

// ── Server identity ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            name: env_or("SERVER_NAME", "werkbank"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "werkbank".to_string(),
        }
    }
}

// ── HTTP / WebSocket binding ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Scheme reported about this server; TLS termination happens outside.
    pub https: bool,
    /// Answer CORS preflight with permissive allow-headers/methods.
    pub cors: bool,
    /// Expose the `/ws` upgrade endpoint.
    pub websocket: bool,
    /// How long the rpc endpoint waits for a correlated reply.
    pub request_timeout: Duration,
}

impl HttpConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_u16("PORT", 8090),
            https: env_bool("HTTPS", false),
            cors: env_bool("CORS", true),
            websocket: env_bool("WEBSOCKET", false),
            request_timeout: env_secs("REQUEST_TIMEOUT_SECS", 10),
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            https: false,
            cors: true,
            websocket: false,
            request_timeout: Duration::from_secs(10),
        }
    }
}

// ── Dispatch ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Default per-tool execution bound; descriptors may override.
    pub tool_timeout: Duration,
}

impl DispatchConfig {
    fn from_env() -> Self {
        Self {
            tool_timeout: env_secs("TOOL_TIMEOUT_SECS", 30),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(30),
        }
    }
}

// ── Token budget ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Context window of the model the agent client runs on.
    pub model_token_limit: u64,
    /// Absolute headroom subtracted when deriving an available budget.
    pub safety_margin_tokens: u64,
    /// Budget applied to responses when the request names none.
    pub response_token_limit: u64,
}

impl BudgetConfig {
    fn from_env() -> Self {
        Self {
            model_token_limit: env_u64("MODEL_TOKEN_LIMIT", 200_000),
            safety_margin_tokens: env_u64("TOKEN_SAFETY_MARGIN", 10_000),
            response_token_limit: env_u64("RESPONSE_TOKEN_LIMIT", 25_000),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            model_token_limit: 200_000,
            safety_margin_tokens: 10_000,
            response_token_limit: 25_000,
        }
    }
}

// ── Resource cache ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl: Duration,
}

impl CacheConfig {
    fn from_env() -> Self {
        Self {
            ttl: env_secs("CACHE_TTL_SECS", 300),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}
