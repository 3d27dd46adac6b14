use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_RECOGNITION_URL: &str = "https://api.openalpr.com/v3/recognize_bytes";
const DEFAULT_COUNTRY: &str = "eu";
const DEFAULT_REGISTRY_URL: &str = "https://thatcar.nz/c/";
const DEFAULT_DB_PATH: &str = "license_plates.db";
const DEFAULT_FRAMES_DIR: &str = "frames";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_FRAME_DIMENSION: u32 = 1920;

#[derive(Clone)]
pub struct Config {
    pub secret_key: String,
    pub recognition_url: Url,
    pub country: String,
    pub registry_url: Url,
    pub db_path: PathBuf,
    pub frames_dir: PathBuf,
    pub workers: usize,
    pub http_timeout: Duration,
    pub max_frame_dimension: u32,
    pub reset_db: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = lookup("OPENALPR_SECRET_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("OPENALPR_SECRET_KEY environment variable unset"))?;
        let workers = parse_or(&lookup, "WORKERS", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(anyhow!("WORKERS must be at least 1"));
        }
        let timeout_secs = parse_or(&lookup, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(anyhow!("HTTP_TIMEOUT_SECS must be greater than 0"));
        }
        Ok(Config {
            secret_key,
            recognition_url: url_or(&lookup, "OPENALPR_URL", DEFAULT_RECOGNITION_URL)?,
            country: lookup("OPENALPR_COUNTRY").unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            registry_url: url_or(&lookup, "REGISTRY_URL", DEFAULT_REGISTRY_URL)?,
            db_path: lookup("PLATES_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            frames_dir: lookup("FRAMES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAMES_DIR)),
            workers,
            http_timeout: Duration::from_secs(timeout_secs),
            max_frame_dimension: parse_or(
                &lookup,
                "MAX_FRAME_DIMENSION",
                DEFAULT_MAX_FRAME_DIMENSION,
            )?,
            reset_db: lookup("RESET_DB")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("secret_key", &"<redacted>")
            .field("recognition_url", &self.recognition_url.as_str())
            .field("country", &self.country)
            .field("registry_url", &self.registry_url.as_str())
            .field("db_path", &self.db_path)
            .field("frames_dir", &self.frames_dir)
            .field("workers", &self.workers)
            .field("http_timeout", &self.http_timeout)
            .field("max_frame_dimension", &self.max_frame_dimension)
            .field("reset_db", &self.reset_db)
            .finish()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {} value {:?}", key, raw)),
        None => Ok(default),
    }
}

fn url_or<F>(lookup: &F, key: &str, default: &str) -> Result<Url>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).with_context(|| format!("invalid {} value {:?}", key, raw))
}
