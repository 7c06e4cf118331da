use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::local_store::LocalStore;
use crate::model::MatchRecord;

pub const TILT_LOSS_STREAK: usize = 3;
pub const MIN_PAUSE_MINS: u32 = 1;
pub const MAX_PAUSE_MINS: u32 = 240;

pub fn clamp_pause_mins(minutes: u32) -> u32 {
    minutes.clamp(MIN_PAUSE_MINS, MAX_PAUSE_MINS)
}

/// Cooldown deadline kept in the local store. Advisory like the rest of the store.
pub struct AntiTiltTimer {
    store: LocalStore,
}

impl AntiTiltTimer {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// `minutes` is clamped to [`MIN_PAUSE_MINS`]..=[`MAX_PAUSE_MINS`].
    pub fn start_pause(&self, now: DateTime<Utc>, minutes: u32) -> Result<DateTime<Utc>> {
        let until = now + Duration::minutes(i64::from(clamp_pause_mins(minutes)));
        self.store.save_anti_tilt_pause_until(Some(until.timestamp()))?;
        Ok(until)
    }

    /// Remaining cooldown, or `None` once it has run out. Expired deadlines are cleared.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let until = self
            .store
            .anti_tilt_pause_until()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))?;
        if until <= now {
            let _ = self.store.save_anti_tilt_pause_until(None);
            return None;
        }
        Some(until - now)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.save_anti_tilt_pause_until(None)
    }
}

/// Consecutive losses counting back from the most recent match.
pub fn loss_streak(matches: &[MatchRecord]) -> usize {
    let mut ordered: Vec<&MatchRecord> = matches.iter().collect();
    ordered.sort_by_key(|m| std::cmp::Reverse((m.start_time, m.match_id)));
    ordered.iter().take_while(|m| !m.is_win()).count()
}

pub fn should_suggest_pause(matches: &[MatchRecord]) -> bool {
    loss_streak(matches) >= TILT_LOSS_STREAK
}
