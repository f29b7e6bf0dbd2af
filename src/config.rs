use std::env;
use std::fmt;
use std::net::{AddrParseError, SocketAddr};
use std::path::Path;
use std::time::Duration;

// Default configuration constants
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://instance.db?mode=rwc";
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 60 * 60 * 2;
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;
pub const DEFAULT_ADMIN_ROLE: i64 = 20;
/// Lowest `instance_admins.role` that passes the instance-admin permission check.
pub const MIN_INSTANCE_ADMIN_ROLE: i64 = 15;
pub const CONFIGURATION_BATCH_SIZE: usize = 100;
pub const SESSION_COOKIE: &str = "session_id";
/// How long a session stays valid after sign-in.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(String),
    #[error("invalid listen address: {0}")]
    InvalidAddr(#[from] AddrParseError),
    #[error("invalid value for {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Settings the server needs at startup, resolved from the environment.
#[derive(Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub secret_key: String,
    pub cache_ttl: Duration,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("listen_addr", &self.listen_addr)
            .field("database_url", &self.database_url)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Builds the config from environment variables. `host`/`port` come from the
    /// command line and win over `HOST`/`PORT`.
    pub fn from_env(host: Option<&str>, port: Option<u16>) -> Result<Self, ConfigError> {
        let host = host
            .map(str::to_string)
            .unwrap_or_else(|| env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()));
        let port = match port {
            Some(p) => p,
            None => get_port()?,
        };
        let listen_addr = format!("{}:{}", host, port).parse::<SocketAddr>()?;

        Ok(Self {
            listen_addr,
            database_url: get_database_url(),
            secret_key: get_secret_key()?,
            cache_ttl: get_cache_ttl()?,
        })
    }
}

pub fn load_env_file(env_file: Option<&str>) {
    if let Some(path) = env_file {
        dotenvy::from_path(Path::new(path)).ok();
    } else {
        dotenvy::dotenv().ok();
    }
}

/// `RUST_LOG` filter, defaulting to `info`. Read after [`load_env_file`].
pub fn log_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

pub fn get_database_url() -> String {
    sanitize_database_url(&env::var("DATABASE_URL").unwrap_or_default())
}

pub fn get_secret_key() -> Result<String, ConfigError> {
    match env::var("SECRET_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::MissingVar("SECRET_KEY".into())),
    }
}

pub fn get_cache_ttl() -> Result<Duration, ConfigError> {
    parse_env_number("CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL_SECONDS).map(Duration::from_secs)
}

fn get_port() -> Result<u16, ConfigError> {
    parse_env_number("PORT", DEFAULT_PORT)
}

fn parse_env_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        _ => Ok(default),
    }
}

pub fn sanitize_database_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_DATABASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}
