use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::engine::EngineSettings;

const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v9";
const DEFAULT_PACING_MS: u64 = 2500;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_FALLBACK_SECS: u64 = 5;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub api_base_url: String,
    pub data_dir: PathBuf,
    pub secrets_path: PathBuf,
    pub ledger_path: PathBuf,
    pub pacing_ms: u64,
    pub max_retries: u32,
    pub retry_fallback_secs: u64,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Self {
        let api_base_url = env::var("SCRUBBER_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = api_base_url.trim_end_matches('/').to_string();

        let data_dir = env::var("SCRUBBER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());
        let secrets_path = env::var("SCRUBBER_SECRETS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("secrets.json"));
        let ledger_path = env::var("SCRUBBER_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("ledger.db"));

        Self {
            api_base_url,
            data_dir,
            secrets_path,
            ledger_path,
            pacing_ms: env_number("SCRUBBER_PACING_MS", DEFAULT_PACING_MS),
            max_retries: env_number("SCRUBBER_MAX_RETRIES", DEFAULT_MAX_RETRIES).max(1),
            retry_fallback_secs: env_number("SCRUBBER_RETRY_FALLBACK_SECS", DEFAULT_RETRY_FALLBACK_SECS)
                .max(1),
            http_timeout_secs: env_number("SCRUBBER_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS).max(1),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            pacing: Duration::from_millis(self.pacing_ms),
            max_retries: self.max_retries,
            fallback_retry_after: Duration::from_secs(self.retry_fallback_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn default_data_dir() -> PathBuf {
    let base = env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    base.join(".local").join("share").join("discord-scrubber")
}
