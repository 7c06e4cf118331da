use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use anyhow::Result;
use serde_json::Value;

use crate::aggregate::{self, ActivityHeatmap, HeroPerformance, WinLossSplit};
use crate::anti_tilt;
use crate::api::{MatchEndpoint, PlayerApi, PlayerEndpoint};
use crate::model::{Hero, PlayerStats, WinLoss};

const TOP_HEROES: usize = 5;
const TREND_WINDOW: usize = 10;

/// Proof that a result belongs to the most recent request for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// One independently loaded data source on a page. Failures stay local to the section and
/// leave previously loaded data in place.
#[derive(Debug, Clone)]
pub struct Section<T> {
    data: Option<T>,
    loading: bool,
    error: Option<String>,
    ticket: u64,
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            ticket: 0,
        }
    }
}

impl<T> Section<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Ticket {
        self.ticket += 1;
        self.loading = true;
        Ticket(self.ticket)
    }

    /// Returns `false` (and changes nothing) when the ticket has been superseded.
    pub fn commit(&mut self, ticket: Ticket, result: Result<T>) -> bool {
        if ticket.0 != self.ticket {
            return false;
        }
        self.loading = false;
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
            }
            Err(err) => self.error = Some(format!("{err:#}")),
        }
        true
    }

    /// Orphans any outstanding ticket without touching loaded data.
    pub fn invalidate(&mut self) {
        self.ticket += 1;
        self.loading = false;
    }

    pub fn clear(&mut self) {
        self.invalidate();
        self.data = None;
        self.error = None;
    }

    pub fn replace(&mut self, data: T) {
        self.invalidate();
        self.data = Some(data);
        self.error = None;
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn can_retry(&self) -> bool {
        self.error.is_some() && !self.loading
    }
}

/// A section whose request is keyed by a user selection (hero, role, match).
#[derive(Debug, Clone)]
pub struct Selection<K, T> {
    key: Option<K>,
    section: Section<T>,
}

impl<K, T> Default for Selection<K, T> {
    fn default() -> Self {
        Self {
            key: None,
            section: Section::default(),
        }
    }
}

impl<K: Clone + PartialEq, T> Selection<K, T> {
    /// Switching keys drops the old data and orphans its in-flight request. Re-selecting the
    /// current key is a no-op unless the last attempt failed.
    pub fn select(&mut self, key: K) -> Option<Ticket> {
        if self.key.as_ref() == Some(&key) && !self.section.can_retry() {
            return None;
        }
        if self.key.as_ref() != Some(&key) {
            self.section.clear();
            self.key = Some(key);
        }
        Some(self.section.begin())
    }

    pub fn commit(&mut self, ticket: Ticket, result: Result<T>) -> bool {
        self.section.commit(ticket, result)
    }

    pub fn selected(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn section(&self) -> &Section<T> {
        &self.section
    }
}

/// Tabs that fetch on first activation only.
#[derive(Debug, Clone)]
pub struct LazyTabs<Tab> {
    active: Tab,
    activated: HashSet<Tab>,
}

impl<Tab: Copy + Eq + Hash> LazyTabs<Tab> {
    pub fn new(initial: Tab) -> Self {
        Self {
            active: initial,
            activated: HashSet::new(),
        }
    }

    /// Returns `true` the first time `tab` is activated.
    pub fn activate(&mut self, tab: Tab) -> bool {
        self.active = tab;
        self.activated.insert(tab)
    }

    pub fn active(&self) -> Tab {
        self.active
    }

    pub fn was_activated(&self, tab: Tab) -> bool {
        self.activated.contains(&tab)
    }
}

/// Bounded pool for page fetches. Falls back to the caller's thread if the pool can't be built.
pub struct FetchPool {
    pool: Option<rayon::ThreadPool>,
}

impl FetchPool {
    pub fn new(threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.clamp(1, 16))
            .build()
            .ok();
        Self { pool }
    }

    pub fn install<T: Send>(&self, action: impl FnOnce() -> T + Send) -> T {
        if let Some(pool) = self.pool.as_ref() {
            pool.install(action)
        } else {
            action()
        }
    }
}

/// Runs three independent fetches concurrently; each result comes back on its own.
pub fn fetch_parallel3<A, B, C>(
    pool: &FetchPool,
    a: impl FnOnce() -> Result<A> + Send,
    b: impl FnOnce() -> Result<B> + Send,
    c: impl FnOnce() -> Result<C> + Send,
) -> (Result<A>, Result<B>, Result<C>)
where
    A: Send,
    B: Send,
    C: Send,
{
    pool.install(|| {
        let (ra, (rb, rc)) = rayon::join(a, || rayon::join(b, c));
        (ra, rb, rc)
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewSummary {
    pub matches: usize,
    pub win_rate: Option<f64>,
    pub mean_kda: Option<f64>,
    pub gpm_median: Option<f64>,
    pub gpm_p90: Option<f64>,
    pub top_heroes: Vec<HeroPerformance>,
    pub heatmap: ActivityHeatmap,
    pub split: WinLossSplit,
    pub trend: Vec<f64>,
    pub loss_streak: usize,
}

impl OverviewSummary {
    pub fn from_stats(stats: &PlayerStats) -> Self {
        let matches = &stats.matches;
        let kdas: Vec<f64> = matches.iter().map(|m| m.kda()).collect();
        let gpms: Vec<f64> = matches.iter().map(|m| m.gold_per_min as f64).collect();
        Self {
            matches: matches.len(),
            win_rate: aggregate::win_rate(matches),
            mean_kda: aggregate::mean(&kdas),
            gpm_median: aggregate::percentile(&gpms, 50.0),
            gpm_p90: aggregate::percentile(&gpms, 90.0),
            top_heroes: aggregate::top_heroes(matches, TOP_HEROES),
            heatmap: aggregate::activity_heatmap(matches),
            split: aggregate::win_loss_split(matches),
            trend: aggregate::rolling_win_rate(matches, TREND_WINDOW),
            loss_streak: anti_tilt::loss_streak(matches),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverviewSection {
    Stats,
    WinLoss,
    Profile,
}

#[derive(Debug, Default)]
pub struct OverviewPage {
    player_id: Option<String>,
    pub stats: Section<PlayerStats>,
    pub win_loss: Section<WinLoss>,
    pub profile: Section<Value>,
}

impl OverviewPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, api: &dyn PlayerApi, pool: &FetchPool, player_id: &str) {
        self.switch_player(player_id);
        let tickets = (self.stats.begin(), self.win_loss.begin(), self.profile.begin());
        let (stats, wl, profile) = fetch_parallel3(
            pool,
            || api.player_stats(player_id),
            || api.win_loss(player_id),
            || api.player_json(player_id, PlayerEndpoint::Profile),
        );
        self.stats.commit(tickets.0, stats);
        self.win_loss.commit(tickets.1, wl);
        self.profile.commit(tickets.2, profile);
    }

    pub fn retry(&mut self, api: &dyn PlayerApi, section: OverviewSection) {
        let Some(player_id) = self.player_id.clone() else {
            return;
        };
        match section {
            OverviewSection::Stats => {
                let ticket = self.stats.begin();
                self.stats.commit(ticket, api.player_stats(&player_id));
            }
            OverviewSection::WinLoss => {
                let ticket = self.win_loss.begin();
                self.win_loss.commit(ticket, api.win_loss(&player_id));
            }
            OverviewSection::Profile => {
                let ticket = self.profile.begin();
                self.profile
                    .commit(ticket, api.player_json(&player_id, PlayerEndpoint::Profile));
            }
        }
    }

    /// Takes stats delivered by a refresh coordinator, superseding any load in flight.
    pub fn apply_refreshed_stats(&mut self, stats: PlayerStats) {
        self.stats.replace(stats);
    }

    pub fn summary(&self) -> Option<OverviewSummary> {
        self.stats.data().map(OverviewSummary::from_stats)
    }

    fn switch_player(&mut self, player_id: &str) {
        if self.player_id.as_deref() == Some(player_id) {
            return;
        }
        self.player_id = Some(player_id.to_string());
        self.stats.clear();
        self.win_loss.clear();
        self.profile.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildsSection {
    Builds,
    Items,
    Heroes,
}

#[derive(Debug, Default)]
pub struct BuildsPage {
    player_id: Option<String>,
    pub builds: Section<Value>,
    pub items: Section<Value>,
    pub heroes: Section<Vec<Hero>>,
}

impl BuildsPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, api: &dyn PlayerApi, pool: &FetchPool, player_id: &str) {
        if self.player_id.as_deref() != Some(player_id) {
            self.player_id = Some(player_id.to_string());
            self.builds.clear();
            self.items.clear();
        }
        let builds_ticket = self.builds.begin();
        let items_ticket = self.items.begin();
        // The hero list doesn't depend on the player; fetch it once per page.
        let heroes_ticket = (self.heroes.data().is_none()).then(|| self.heroes.begin());

        let (builds, items, heroes) = fetch_parallel3(
            pool,
            || api.player_json(player_id, PlayerEndpoint::Builds),
            || api.player_json(player_id, PlayerEndpoint::ItemStats),
            || match heroes_ticket {
                Some(_) => api.heroes().map(Some),
                None => Ok(None),
            },
        );
        self.builds.commit(builds_ticket, builds);
        self.items.commit(items_ticket, items);
        if let Some(ticket) = heroes_ticket {
            self.heroes.commit(ticket, heroes.map(Option::unwrap_or_default));
        }
    }

    pub fn retry(&mut self, api: &dyn PlayerApi, section: BuildsSection) {
        match section {
            BuildsSection::Builds | BuildsSection::Items => {
                let Some(player_id) = self.player_id.clone() else {
                    return;
                };
                let (target, endpoint) = match section {
                    BuildsSection::Builds => (&mut self.builds, PlayerEndpoint::Builds),
                    _ => (&mut self.items, PlayerEndpoint::ItemStats),
                };
                let ticket = target.begin();
                target.commit(ticket, api.player_json(&player_id, endpoint));
            }
            BuildsSection::Heroes => {
                let ticket = self.heroes.begin();
                self.heroes.commit(ticket, api.heroes());
            }
        }
    }

    pub fn hero_name(&self, hero_id: u32) -> Option<&str> {
        self.heroes
            .data()?
            .iter()
            .find(|h| h.id == hero_id)
            .map(Hero::display_name)
    }
}

#[derive(Debug, Default)]
pub struct HeroAnalysisPage {
    player_id: Option<String>,
    pub analysis: Section<Value>,
    pub matchups: Selection<u32, Value>,
}

impl HeroAnalysisPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, api: &dyn PlayerApi, player_id: &str) {
        if self.player_id.as_deref() != Some(player_id) {
            self.player_id = Some(player_id.to_string());
            self.analysis.clear();
            self.matchups = Selection::default();
        }
        let ticket = self.analysis.begin();
        self.analysis
            .commit(ticket, api.player_json(player_id, PlayerEndpoint::HeroAnalysis));
    }

    /// Starts a matchups request for `hero_id`; `None` when nothing needs fetching.
    pub fn begin_hero(&mut self, hero_id: u32) -> Option<Ticket> {
        self.player_id.as_ref()?;
        self.matchups.select(hero_id)
    }

    pub fn commit_hero(&mut self, ticket: Ticket, result: Result<Value>) -> bool {
        self.matchups.commit(ticket, result)
    }

    pub fn select_hero(&mut self, api: &dyn PlayerApi, hero_id: u32) {
        let Some(ticket) = self.begin_hero(hero_id) else {
            return;
        };
        let Some(player_id) = self.player_id.clone() else {
            return;
        };
        let result = hero_matchups(api, &player_id, hero_id);
        self.commit_hero(ticket, result);
    }
}

/// Matchup rows for one hero out of the player's matchups payload.
pub fn hero_matchups(api: &dyn PlayerApi, player_id: &str, hero_id: u32) -> Result<Value> {
    let raw = api.player_json(player_id, PlayerEndpoint::Matchups)?;
    Ok(filter_hero_rows(&raw, hero_id))
}

fn filter_hero_rows(raw: &Value, hero_id: u32) -> Value {
    let rows = match raw {
        Value::Array(rows) => rows,
        Value::Object(map) => match map.get("matchups") {
            Some(Value::Array(rows)) => rows,
            _ => return Value::Array(Vec::new()),
        },
        _ => return Value::Array(Vec::new()),
    };
    Value::Array(
        rows.iter()
            .filter(|row| row.get("hero_id").and_then(Value::as_u64) == Some(u64::from(hero_id)))
            .cloned()
            .collect(),
    )
}

#[derive(Debug)]
pub struct MatchDetailPage {
    match_id: u64,
    tabs: LazyTabs<MatchEndpoint>,
    sections: HashMap<MatchEndpoint, Section<Value>>,
}

impl MatchDetailPage {
    pub fn new(match_id: u64) -> Self {
        Self {
            match_id,
            tabs: LazyTabs::new(MatchEndpoint::Timeline),
            sections: HashMap::new(),
        }
    }

    pub fn match_id(&self) -> u64 {
        self.match_id
    }

    pub fn active_tab(&self) -> MatchEndpoint {
        self.tabs.active()
    }

    /// Switches tab, fetching only on the tab's first activation. Returns whether it fetched.
    pub fn activate(&mut self, api: &dyn PlayerApi, tab: MatchEndpoint) -> bool {
        if !self.tabs.activate(tab) {
            return false;
        }
        self.fetch_tab(api, tab);
        true
    }

    pub fn retry(&mut self, api: &dyn PlayerApi, tab: MatchEndpoint) {
        if self.section(tab).is_some_and(Section::can_retry) {
            self.fetch_tab(api, tab);
        }
    }

    pub fn section(&self, tab: MatchEndpoint) -> Option<&Section<Value>> {
        self.sections.get(&tab)
    }

    fn fetch_tab(&mut self, api: &dyn PlayerApi, tab: MatchEndpoint) {
        let section = self.sections.entry(tab).or_default();
        let ticket = section.begin();
        section.commit(ticket, api.match_json(self.match_id, tab));
    }
}
