use std::collections::VecDeque;

use crate::identity::{IdentityError, IdentitySource, IdentityUpdate, IdentityView, LoadReport};
use crate::page::OverviewSummary;
use crate::refresh::{RefreshEvent, RefreshState, RefreshTrigger, SkipReason};

pub const MAX_LOGS: usize = 200;

#[derive(Debug, Default)]
pub struct AppState {
    pub identity: IdentityView,
    pub refresh: RefreshState,
    pub overview: Option<OverviewSummary>,
    pub new_match_alert: Option<u64>,
    pub logs: VecDeque<String>,
    unprinted: usize,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        self.unprinted += 1;
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
        self.unprinted = self.unprinted.min(self.logs.len());
    }

    /// Log lines pushed since the previous call, oldest first.
    pub fn take_unprinted(&mut self) -> Vec<String> {
        let start = self.logs.len() - self.unprinted;
        self.unprinted = 0;
        self.logs.iter().skip(start).cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub enum Delta {
    IdentityLoaded {
        report: LoadReport,
        identity: IdentityView,
    },
    IdentityChanged(IdentityUpdate),
    IdentityRejected(IdentityError),
    RefreshTriggered(RefreshTrigger),
    Refresh(RefreshEvent),
    SetRefreshState(RefreshState),
    SetOverview(OverviewSummary),
    AckNewMatch,
    Log(String),
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::IdentityLoaded { report, identity } => {
            let source = match report.source {
                IdentitySource::Remote => "server",
                IdentitySource::Mirror => "local mirror",
                IdentitySource::Empty => "nowhere",
            };
            if let Some(err) = report.remote_error {
                state.push_log(format!("[WARN] Player ID read failed: {err}"));
            }
            if let Some(err) = report.mirror_error {
                state.push_log(format!("[WARN] Local mirror not updated: {err}"));
            }
            match identity.player_id.as_deref() {
                Some(id) => state.push_log(format!(
                    "[INFO] Player ID {id} loaded from {source} ({} changes left)",
                    identity.changes_remaining
                )),
                None => state.push_log(format!("[INFO] No Player ID (checked {source})")),
            }
            state.identity = identity;
        }
        Delta::IdentityChanged(update) => {
            state.push_log(format!("[INFO] {}", update.message));
            if let Some(err) = update.mirror_error.as_deref() {
                state.push_log(format!("[WARN] Local mirror not updated: {err}"));
            }
            if update.identity.is_locked {
                state.push_log("[INFO] Player ID is now locked");
            }
            state.identity = update.identity;
        }
        Delta::IdentityRejected(err) => {
            state.push_log(format!("[WARN] Player ID change rejected: {err}"));
        }
        Delta::RefreshTriggered(trigger) => match trigger {
            RefreshTrigger::Started => {
                state.refresh.is_refreshing = true;
                state.push_log("[INFO] Refreshing player data");
            }
            RefreshTrigger::Skipped(SkipReason::InFlight) => {
                state.push_log("[INFO] Refresh already running");
            }
            RefreshTrigger::Skipped(SkipReason::Fresh) => {
                state.push_log("[INFO] Data is fresh, refresh skipped");
            }
            RefreshTrigger::Skipped(SkipReason::NoPlayer) => {
                state.push_log("[INFO] No Player ID, refresh skipped");
            }
            RefreshTrigger::Skipped(SkipReason::Disabled) => {}
        },
        Delta::Refresh(event) => match event {
            RefreshEvent::Applied {
                player_id,
                new_match,
            } => {
                state.refresh.is_refreshing = false;
                match new_match {
                    Some(id) => {
                        state.new_match_alert = Some(id);
                        state.push_log(format!("[INFO] New match {id} for player {player_id}"));
                    }
                    None => state.push_log(format!("[INFO] Player {player_id} data updated")),
                }
            }
            RefreshEvent::Failed { player_id, error } => {
                state.refresh.is_refreshing = false;
                state.push_log(format!("[WARN] Refresh for {player_id} failed: {error}"));
            }
            RefreshEvent::Discarded { player_id } => {
                state.push_log(format!("[INFO] Dropped stale result for {player_id}"));
            }
        },
        Delta::SetRefreshState(refresh) => {
            if !refresh.has_new_matches {
                state.new_match_alert = None;
            }
            state.refresh = refresh;
        }
        Delta::SetOverview(summary) => {
            state.overview = Some(summary);
        }
        Delta::AckNewMatch => {
            state.new_match_alert = None;
            state.refresh.has_new_matches = false;
        }
        Delta::Log(msg) => state.push_log(msg),
    }
}
