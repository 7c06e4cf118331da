use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Player slots below this value are on the Radiant side.
pub const RADIANT_SLOT_LIMIT: u8 = 128;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    #[serde(default)]
    pub winrate: f64,
    #[serde(default)]
    pub kda: f64,
    #[serde(default)]
    pub farm: FarmStats,
    #[serde(default)]
    pub matches: Vec<MatchRecord>,
    #[serde(default)]
    pub advanced: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FarmStats {
    #[serde(default, alias = "gold_per_min")]
    pub gpm: f64,
    #[serde(default, alias = "xp_per_min")]
    pub xpm: f64,
    #[serde(default)]
    pub last_hits: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: u64,
    #[serde(default)]
    pub hero_id: u32,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub gold_per_min: u32,
    #[serde(default)]
    pub xp_per_min: u32,
    #[serde(default)]
    pub last_hits: u32,
    /// Seconds.
    #[serde(default)]
    pub duration: u32,
    /// Unix seconds.
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub win: Option<bool>,
    #[serde(default)]
    pub radiant_win: Option<bool>,
    #[serde(default)]
    pub player_slot: Option<u8>,
}

impl MatchRecord {
    pub fn is_radiant(&self) -> Option<bool> {
        self.player_slot.map(|slot| slot < RADIANT_SLOT_LIMIT)
    }

    /// Explicit `win` wins; otherwise derived from side and `radiant_win`.
    pub fn is_win(&self) -> bool {
        if let Some(win) = self.win {
            return win;
        }
        match (self.radiant_win, self.is_radiant()) {
            (Some(radiant_win), Some(radiant)) => radiant_win == radiant,
            _ => false,
        }
    }

    pub fn kda(&self) -> f64 {
        (self.kills + self.assists) as f64 / self.deaths.max(1) as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinLoss {
    #[serde(default)]
    pub win: u32,
    #[serde(default)]
    pub lose: u32,
}

impl WinLoss {
    pub fn total(&self) -> u32 {
        self.win + self.lose
    }

    pub fn win_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.win as f64 * 100.0 / total as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hero {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub localized_name: String,
}

impl Hero {
    pub fn display_name(&self) -> &str {
        if self.localized_name.is_empty() {
            self.name.trim_start_matches("npc_dota_hero_")
        } else {
            &self.localized_name
        }
    }
}
