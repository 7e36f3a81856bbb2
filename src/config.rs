use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(1000);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(6000);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(300);
pub const NAMESPACE_VERSION: &str = "v1";

const CACHE_FILE: &str = "cache.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' (expected {expected})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Runtime settings for the resolver.
///
/// Compiled-in defaults, overridden by `TERMRESOLVE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_path: PathBuf,
    pub ttl: Duration,
    pub rate_limit: Duration,
    pub fetch_timeout: Duration,
    pub retry_backoff: Duration,
    pub online_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(|k| env::var(k).ok()),
            ttl: DEFAULT_TTL,
            rate_limit: DEFAULT_RATE_LIMIT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            online_enabled: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cache_path = var("TERMRESOLVE_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_cache_path(&lookup));

        let ttl = match var("TERMRESOLVE_TTL_SECS") {
            Some(v) => Duration::from_secs(parse_u64("TERMRESOLVE_TTL_SECS", &v)?),
            None => DEFAULT_TTL,
        };
        let rate_limit = duration_ms(
            var("TERMRESOLVE_RATE_LIMIT_MS"),
            "TERMRESOLVE_RATE_LIMIT_MS",
            DEFAULT_RATE_LIMIT,
        )?;
        let fetch_timeout = duration_ms(
            var("TERMRESOLVE_FETCH_TIMEOUT_MS"),
            "TERMRESOLVE_FETCH_TIMEOUT_MS",
            DEFAULT_FETCH_TIMEOUT,
        )?;
        let retry_backoff = duration_ms(
            var("TERMRESOLVE_RETRY_BACKOFF_MS"),
            "TERMRESOLVE_RETRY_BACKOFF_MS",
            DEFAULT_RETRY_BACKOFF,
        )?;
        let online_enabled = match var("TERMRESOLVE_ONLINE") {
            Some(v) => parse_flag("TERMRESOLVE_ONLINE", &v)?,
            None => true,
        };

        Ok(Self {
            cache_path,
            ttl,
            rate_limit,
            fetch_timeout,
            retry_backoff,
            online_enabled,
        })
    }
}

fn default_cache_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let base = lookup("XDG_CACHE_HOME")
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            lookup("HOME")
                .filter(|v| !v.trim().is_empty())
                .map(|h| PathBuf::from(h).join(".cache"))
        });
    match base {
        Some(dir) => dir.join("termresolve").join(CACHE_FILE),
        None => PathBuf::from(CACHE_FILE),
    }
}

fn duration_ms(
    value: Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(v) => Ok(Duration::from_millis(parse_u64(var, &v)?)),
        None => Ok(default),
    }
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
        expected: "a non-negative integer",
    })
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            expected: "a boolean flag",
        }),
    }
}
