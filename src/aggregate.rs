use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike};

use crate::model::MatchRecord;

pub const WEEKDAYS: usize = 7;
pub const HOURS: usize = 24;

/// Matches per weekday (Monday first) and UTC hour.
pub type ActivityHeatmap = [[u32; HOURS]; WEEKDAYS];

#[derive(Debug, Clone, PartialEq)]
pub struct HeroPerformance {
    pub hero_id: u32,
    pub games: u32,
    pub wins: u32,
    pub win_rate: f64,
    pub avg_kda: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AverageLine {
    pub games: usize,
    pub kills: f64,
    pub deaths: f64,
    pub assists: f64,
    pub gpm: f64,
    pub xpm: f64,
    pub duration_mins: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WinLossSplit {
    pub wins: AverageLine,
    pub losses: AverageLine,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Linear interpolation between closest ranks; `p` is clamped to 0..=100.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Percent of matches won.
pub fn win_rate(matches: &[MatchRecord]) -> Option<f64> {
    if matches.is_empty() {
        return None;
    }
    let wins = matches.iter().filter(|m| m.is_win()).count();
    Some(wins as f64 * 100.0 / matches.len() as f64)
}

pub fn hero_performance(matches: &[MatchRecord]) -> Vec<HeroPerformance> {
    let mut by_hero: HashMap<u32, (u32, u32, f64)> = HashMap::new();
    for m in matches {
        let entry = by_hero.entry(m.hero_id).or_insert((0, 0, 0.0));
        entry.0 += 1;
        if m.is_win() {
            entry.1 += 1;
        }
        entry.2 += m.kda();
    }

    let mut rows: Vec<HeroPerformance> = by_hero
        .into_iter()
        .map(|(hero_id, (games, wins, kda_sum))| HeroPerformance {
            hero_id,
            games,
            wins,
            win_rate: wins as f64 * 100.0 / games as f64,
            avg_kda: kda_sum / games as f64,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.games
            .cmp(&a.games)
            .then(b.win_rate.total_cmp(&a.win_rate))
            .then(a.hero_id.cmp(&b.hero_id))
    });
    rows
}

pub fn top_heroes(matches: &[MatchRecord], n: usize) -> Vec<HeroPerformance> {
    let mut rows = hero_performance(matches);
    rows.truncate(n);
    rows
}

pub fn activity_heatmap(matches: &[MatchRecord]) -> ActivityHeatmap {
    let mut grid = [[0u32; HOURS]; WEEKDAYS];
    for m in matches {
        let Some(start) = DateTime::from_timestamp(m.start_time, 0) else {
            continue;
        };
        let day = start.weekday().num_days_from_monday() as usize;
        let hour = start.hour() as usize;
        grid[day][hour] += 1;
    }
    grid
}

pub fn win_loss_split(matches: &[MatchRecord]) -> WinLossSplit {
    let (wins, losses): (Vec<&MatchRecord>, Vec<&MatchRecord>) =
        matches.iter().partition(|m| m.is_win());
    WinLossSplit {
        wins: average_line(&wins),
        losses: average_line(&losses),
    }
}

fn average_line(matches: &[&MatchRecord]) -> AverageLine {
    if matches.is_empty() {
        return AverageLine::default();
    }
    let n = matches.len() as f64;
    let avg = |f: fn(&MatchRecord) -> f64| matches.iter().map(|m| f(m)).sum::<f64>() / n;
    AverageLine {
        games: matches.len(),
        kills: avg(|m| m.kills as f64),
        deaths: avg(|m| m.deaths as f64),
        assists: avg(|m| m.assists as f64),
        gpm: avg(|m| m.gold_per_min as f64),
        xpm: avg(|m| m.xp_per_min as f64),
        duration_mins: avg(|m| m.duration as f64 / 60.0),
    }
}

/// Win rate over a sliding window, oldest window first.
pub fn rolling_win_rate(matches: &[MatchRecord], window: usize) -> Vec<f64> {
    if window == 0 || matches.len() < window {
        return Vec::new();
    }
    let mut ordered: Vec<&MatchRecord> = matches.iter().collect();
    ordered.sort_by_key(|m| (m.start_time, m.match_id));
    ordered
        .windows(window)
        .map(|w| w.iter().filter(|m| m.is_win()).count() as f64 * 100.0 / window as f64)
        .collect()
}
