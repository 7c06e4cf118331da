use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::Config;
use crate::model::PlayerStats;

/// Payloads that can tell which match is the most recent one they contain.
pub trait NewestMatch {
    fn newest_match_id(&self) -> Option<u64>;
}

impl NewestMatch for PlayerStats {
    fn newest_match_id(&self) -> Option<u64> {
        self.matches.iter().map(|m| m.match_id).max()
    }
}

pub type FetchFn<T> = Arc<dyn Fn(&str) -> Result<T> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub enabled: bool,
    pub poll_interval: Duration,
    pub stale_after: Duration,
    pub poll_jitter_pct: u8,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(300),
            stale_after: Duration::from_secs(60),
            poll_jitter_pct: 10,
        }
    }
}

impl RefreshOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: true,
            poll_interval: config.poll_interval,
            stale_after: config.stale_after,
            poll_jitter_pct: config.poll_jitter_pct,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshState {
    pub last_update: Option<DateTime<Utc>>,
    pub is_refreshing: bool,
    pub has_new_matches: bool,
    pub latest_known_match_id: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoPlayer,
    InFlight,
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Started,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    Applied {
        player_id: String,
        new_match: Option<u64>,
    },
    Failed {
        player_id: String,
        error: String,
    },
    /// Result of a fetch started for a previous subscription; dropped unapplied.
    Discarded { player_id: String },
}

struct Completion<T> {
    generation: u64,
    player_id: String,
    result: Result<T>,
}

/// Single-flight refresh controller for one subscribing page.
///
/// Fetches run on a worker thread and report back over a channel; results are only applied
/// on the owning thread through [`RefreshCoordinator::pump`] or
/// [`RefreshCoordinator::wait_for_completion`]. Every fetch is tagged with the generation it
/// started under; changing the player id or cancelling bumps the generation so late results
/// are discarded instead of applied. A discarded fetch still holds the single in-flight slot
/// until its completion arrives.
pub struct RefreshCoordinator<T> {
    fetch: FetchFn<T>,
    player_id: Option<String>,
    options: RefreshOptions,
    state: RefreshState,
    data: Option<T>,
    generation: u64,
    in_flight: bool,
    fetches_started: u64,
    next_poll: Option<Instant>,
    on_new_match: Option<Box<dyn FnMut(u64)>>,
    tx: Sender<Completion<T>>,
    rx: Receiver<Completion<T>>,
}

impl<T> RefreshCoordinator<T>
where
    T: NewestMatch + Send + 'static,
{
    pub fn new(fetch: FetchFn<T>, player_id: Option<String>, options: RefreshOptions) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            fetch,
            player_id,
            options,
            state: RefreshState::default(),
            data: None,
            generation: 0,
            in_flight: false,
            fetches_started: 0,
            next_poll: None,
            on_new_match: None,
            tx,
            rx,
        }
    }

    pub fn on_new_match(mut self, callback: impl FnMut(u64) + 'static) -> Self {
        self.on_new_match = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    pub fn fetches_started(&self) -> u64 {
        self.fetches_started
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.options.enabled = enabled;
        if !enabled {
            self.next_poll = None;
        }
    }

    /// Re-subscribes under a new key. Any in-flight result for the old key will be discarded,
    /// and no new fetch starts until it has arrived.
    pub fn set_player_id(&mut self, player_id: Option<String>) {
        if self.player_id == player_id {
            return;
        }
        self.player_id = player_id;
        self.reset();
    }

    /// Unsubscribe: in-flight results are discarded and the cached view is dropped.
    pub fn cancel(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.state = RefreshState::default();
        self.data = None;
        self.next_poll = None;
    }

    /// Takes data loaded outside the coordinator as the current view and new-match baseline.
    /// The next poll is scheduled one interval out.
    pub fn seed(&mut self, data: T, now: Instant) {
        let newest = data.newest_match_id();
        self.raise_watermark(newest);
        self.state.last_update = Some(Utc::now());
        self.state.last_error = None;
        self.data = Some(data);
        if self.options.enabled {
            self.next_poll = Some(now + self.jittered_interval());
        }
    }

    pub fn clear_new_matches_flag(&mut self) {
        self.state.has_new_matches = false;
    }

    /// `force` skips the freshness window but never the in-flight guard.
    pub fn refresh(&mut self, force: bool) -> RefreshTrigger {
        if !self.options.enabled {
            return RefreshTrigger::Skipped(SkipReason::Disabled);
        }
        let Some(player_id) = self.player_id.clone() else {
            return RefreshTrigger::Skipped(SkipReason::NoPlayer);
        };
        if self.in_flight {
            return RefreshTrigger::Skipped(SkipReason::InFlight);
        }
        if !force && self.is_fresh(Utc::now()) {
            return RefreshTrigger::Skipped(SkipReason::Fresh);
        }

        self.in_flight = true;
        self.state.is_refreshing = true;
        self.fetches_started += 1;
        let generation = self.generation;
        let fetch = self.fetch.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = fetch(&player_id);
            let _ = tx.send(Completion {
                generation,
                player_id,
                result,
            });
        });
        RefreshTrigger::Started
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.state.last_update else {
            return false;
        };
        match (now - last).to_std() {
            Ok(age) => age < self.options.stale_after,
            // Clock went backwards.
            Err(_) => true,
        }
    }

    /// Passive polling entry point. Feeds the same guarded `refresh(false)` as manual triggers.
    pub fn tick(&mut self, now: Instant) -> Option<RefreshTrigger> {
        if !self.options.enabled || self.player_id.is_none() {
            return None;
        }
        let due = match self.next_poll {
            Some(deadline) => now >= deadline,
            None => true,
        };
        if !due {
            return None;
        }
        self.next_poll = Some(now + self.jittered_interval());
        Some(self.refresh(false))
    }

    fn jittered_interval(&self) -> Duration {
        let base = self.options.poll_interval;
        let pct = u32::from(self.options.poll_jitter_pct.min(50));
        if pct == 0 {
            return base;
        }
        let spread = base.as_millis() as u64 * u64::from(pct) / 100;
        let offset = rand::thread_rng().gen_range(0..=spread * 2);
        Duration::from_millis(base.as_millis() as u64 - spread + offset)
    }

    /// Applies every completion that has already arrived.
    pub fn pump(&mut self) -> Vec<RefreshEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            events.push(self.apply(completion));
        }
        events
    }

    /// Blocks for the next completion (current or stale) and applies it.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> Option<RefreshEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => Some(self.apply(completion)),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn raise_watermark(&mut self, newest: Option<u64>) {
        self.state.latest_known_match_id = match (self.state.latest_known_match_id, newest) {
            (Some(known), Some(newest)) => Some(known.max(newest)),
            (known, newest) => known.or(newest),
        };
    }

    fn apply(&mut self, completion: Completion<T>) -> RefreshEvent {
        let Completion {
            generation,
            player_id,
            result,
        } = completion;
        self.in_flight = false;
        if generation != self.generation {
            return RefreshEvent::Discarded { player_id };
        }

        self.state.is_refreshing = false;
        match result {
            Ok(data) => {
                let newest = data.newest_match_id();
                let mut new_match = None;
                if let (Some(newest), Some(known)) = (newest, self.state.latest_known_match_id) {
                    if newest > known {
                        new_match = Some(newest);
                    }
                }
                if let Some(id) = new_match {
                    self.state.has_new_matches = true;
                    if let Some(callback) = self.on_new_match.as_mut() {
                        callback(id);
                    }
                }
                self.raise_watermark(newest);
                self.state.last_update = Some(Utc::now());
                self.state.last_error = None;
                self.data = Some(data);
                RefreshEvent::Applied {
                    player_id,
                    new_match,
                }
            }
            Err(err) => {
                let error = format!("{err:#}");
                self.state.last_error = Some(error.clone());
                RefreshEvent::Failed { player_id, error }
            }
        }
    }
}
