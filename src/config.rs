use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::anti_tilt::clamp_pause_mins;

const DEFAULT_API_BASE: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub access_token: String,
    pub refresh_token: String,
    pub seed_player_id: Option<String>,
    pub poll_interval: Duration,
    pub stale_after: Duration,
    pub poll_jitter_pct: u8,
    pub request_timeout: Duration,
    pub fetch_parallelism: usize,
    pub anti_tilt_pause_mins: u32,
    pub store_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            access_token: String::new(),
            refresh_token: String::new(),
            seed_player_id: None,
            poll_interval: Duration::from_secs(300),
            stale_after: Duration::from_secs(60),
            poll_jitter_pct: 10,
            request_timeout: Duration::from_secs(30),
            fetch_parallelism: 4,
            anti_tilt_pause_mins: 30,
            store_path: None,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy` first if `.env` files should apply.
    pub fn from_env() -> Self {
        let api_base = env::var("DOTA_API_BASE")
            .ok()
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            api_base,
            access_token: env::var("DOTA_ACCESS_TOKEN").unwrap_or_default(),
            refresh_token: env::var("DOTA_REFRESH_TOKEN").unwrap_or_default(),
            seed_player_id: env::var("PLAYER_ID").ok().and_then(non_empty),
            poll_interval: Duration::from_secs(env_u64("REFRESH_POLL_SECS", 300).max(30)),
            stale_after: Duration::from_secs(env_u64("REFRESH_STALE_SECS", 60)),
            poll_jitter_pct: env_u64("POLL_JITTER_PCT", 10).clamp(0, 50) as u8,
            request_timeout: Duration::from_secs(env_u64("REQUEST_TIMEOUT_SECS", 30).max(5)),
            fetch_parallelism: env_u64("FETCH_PARALLELISM", 4).clamp(1, 16) as usize,
            anti_tilt_pause_mins: clamp_pause_mins(
                env_u64("ANTI_TILT_PAUSE_MINS", 30).min(u64::from(u32::MAX)) as u32,
            ),
            store_path: env::var("DOTA_INSIGHTS_STORE")
                .ok()
                .and_then(non_empty)
                .map(PathBuf::from),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn non_empty(val: String) -> Option<String> {
    let trimmed = val.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
