use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::http_cache::get_json_conditional;
use crate::http_client::http_client_with_timeout;
use crate::model::{Hero, PlayerStats, WinLoss};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerEndpoint {
    Stats,
    AdvancedStats,
    Profile,
    WinLoss,
    Benchmarks,
    Builds,
    ItemStats,
    HeroAnalysis,
    Matchups,
    RoleAnalysis,
    MetaComparison,
    WinConditions,
    AntiTilt,
}

impl PlayerEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            PlayerEndpoint::Stats => "stats",
            PlayerEndpoint::AdvancedStats => "advanced-stats",
            PlayerEndpoint::Profile => "profile",
            PlayerEndpoint::WinLoss => "wl",
            PlayerEndpoint::Benchmarks => "benchmarks",
            PlayerEndpoint::Builds => "builds",
            PlayerEndpoint::ItemStats => "items/stats",
            PlayerEndpoint::HeroAnalysis => "hero-analysis",
            PlayerEndpoint::Matchups => "matchups",
            PlayerEndpoint::RoleAnalysis => "role-analysis",
            PlayerEndpoint::MetaComparison => "meta-comparison",
            PlayerEndpoint::WinConditions => "win-conditions",
            PlayerEndpoint::AntiTilt => "anti-tilt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchEndpoint {
    Timeline,
    Phases,
    ItemTiming,
    Teamfights,
    Wardmap,
    Analysis,
    OpenDota,
}

impl MatchEndpoint {
    pub const TABS: [MatchEndpoint; 6] = [
        MatchEndpoint::Timeline,
        MatchEndpoint::Phases,
        MatchEndpoint::ItemTiming,
        MatchEndpoint::Teamfights,
        MatchEndpoint::Wardmap,
        MatchEndpoint::Analysis,
    ];

    pub fn path(self, match_id: u64) -> String {
        match self {
            MatchEndpoint::Timeline => format!("/api/match/{match_id}/timeline"),
            MatchEndpoint::Phases => format!("/api/match/{match_id}/phases"),
            MatchEndpoint::ItemTiming => format!("/api/match/{match_id}/item-timing"),
            MatchEndpoint::Teamfights => format!("/api/match/{match_id}/teamfights"),
            MatchEndpoint::Wardmap => format!("/api/match/{match_id}/wardmap"),
            MatchEndpoint::Analysis => format!("/api/analysis/match/{match_id}"),
            MatchEndpoint::OpenDota => format!("/api/opendota/match/{match_id}"),
        }
    }
}

pub fn player_path(player_id: &str, endpoint: PlayerEndpoint) -> String {
    format!("/api/player/{player_id}/{}", endpoint.path())
}

/// Data source seam for page controllers.
pub trait PlayerApi: Sync {
    fn player_json(&self, player_id: &str, endpoint: PlayerEndpoint) -> Result<Value>;

    fn match_json(&self, match_id: u64, endpoint: MatchEndpoint) -> Result<Value>;

    fn heroes(&self) -> Result<Vec<Hero>>;

    fn player_stats(&self, player_id: &str) -> Result<PlayerStats> {
        let raw = self.player_json(player_id, PlayerEndpoint::Stats)?;
        stats_from_value(raw)
    }

    fn win_loss(&self, player_id: &str) -> Result<WinLoss> {
        let raw = self.player_json(player_id, PlayerEndpoint::WinLoss)?;
        if raw.is_null() {
            return Ok(WinLoss::default());
        }
        serde_json::from_value(raw).context("invalid wl json")
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base: String,
    client: &'static Client,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            base: config.api_base.clone(),
            client: http_client_with_timeout(config.request_timeout)?,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base, path);
        let cached = get_json_conditional(self.client, &url, &[("Accept", "application/json")])?;
        Ok(cached.body)
    }
}

impl PlayerApi for ApiClient {
    fn player_json(&self, player_id: &str, endpoint: PlayerEndpoint) -> Result<Value> {
        let body = self.get(&player_path(player_id, endpoint))?;
        parse_json_value(&body).with_context(|| format!("player {}", endpoint.path()))
    }

    fn match_json(&self, match_id: u64, endpoint: MatchEndpoint) -> Result<Value> {
        let body = self.get(&endpoint.path(match_id))?;
        parse_json_value(&body).with_context(|| format!("match {match_id}"))
    }

    fn heroes(&self) -> Result<Vec<Hero>> {
        let body = self.get("/api/opendota/heroes")?;
        parse_heroes_json(&body)
    }

    fn player_stats(&self, player_id: &str) -> Result<PlayerStats> {
        let body = self.get(&player_path(player_id, PlayerEndpoint::Stats))?;
        parse_player_stats_json(&body)
    }
}

#[derive(Debug, Deserialize)]
struct StatsEnvelope {
    #[serde(default)]
    stats: Option<PlayerStats>,
}

pub fn parse_player_stats_json(raw: &str) -> Result<PlayerStats> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(PlayerStats::default());
    }
    let envelope: StatsEnvelope =
        serde_json::from_str(trimmed).context("invalid player stats json")?;
    Ok(envelope.stats.unwrap_or_default())
}

fn stats_from_value(raw: Value) -> Result<PlayerStats> {
    if raw.is_null() {
        return Ok(PlayerStats::default());
    }
    let envelope: StatsEnvelope =
        serde_json::from_value(raw).context("invalid player stats json")?;
    Ok(envelope.stats.unwrap_or_default())
}

pub fn parse_heroes_json(raw: &str) -> Result<Vec<Hero>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let mut heroes: Vec<Hero> = serde_json::from_str(trimmed).context("invalid heroes json")?;
    heroes.sort_by_key(|h| h.id);
    Ok(heroes)
}

pub fn parse_json_value(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).context("invalid json body")
}
