use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.upnify.com/v4";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_USER_AGENT: &str = "UpnifIA/1.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upstream_base_url: String,
    pub upnify_token: Option<String>,
    pub request_timeout: Duration,
    pub check_timeout: Duration,
    pub raw_excerpt_len: usize,
    pub user_agent: String,
    pub public_url: String,
    pub is_production: bool,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_or(&var, "PORT", DEFAULT_PORT)?;
        let upstream_base_url = var("UPNIFY_API_URL")
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let request_timeout = Duration::from_secs(parse_or(&var, "REQUEST_TIMEOUT_SECS", 15)?);
        let check_timeout = Duration::from_secs(parse_or(&var, "CHECK_TIMEOUT_SECS", 10)?);
        let raw_excerpt_len = parse_or(&var, "RAW_EXCERPT_LEN", 200)?;
        let user_agent = var("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let public_url =
            var("PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{}", port));
        let is_production = var("APP_ENV").as_deref() == Some("production");

        Ok(Self {
            port,
            upstream_base_url,
            upnify_token: var("UPNIFY_TOKEN"),
            request_timeout,
            check_timeout,
            raw_excerpt_len,
            user_agent,
            public_url,
            is_production,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: key,
            value: raw,
        }),
        None => Ok(default),
    }
}
