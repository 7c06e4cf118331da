use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use dota_insights::aggregate::{activity_heatmap, hero_performance, percentile};
use dota_insights::api::parse_player_stats_json;
use dota_insights::model::{MatchRecord, PlayerStats};
use dota_insights::page::OverviewSummary;

fn synthetic_stats(n: u64) -> PlayerStats {
    let matches = (0..n)
        .map(|idx| MatchRecord {
            match_id: 7_500_000_000 + idx,
            hero_id: (idx % 23) as u32 + 1,
            kills: (idx % 17) as u32,
            deaths: (idx % 9) as u32,
            assists: (idx % 21) as u32,
            gold_per_min: 300 + (idx * 37 % 500) as u32,
            xp_per_min: 350 + (idx * 53 % 500) as u32,
            duration: 1500 + (idx * 97 % 1800) as u32,
            start_time: 1_704_067_200 - (idx as i64) * 5_400,
            player_slot: Some(if idx % 2 == 0 { 1 } else { 129 }),
            radiant_win: Some(idx % 3 != 0),
            ..MatchRecord::default()
        })
        .collect();
    PlayerStats {
        matches,
        ..PlayerStats::default()
    }
}

fn bench_player_stats_parse(c: &mut Criterion) {
    c.bench_function("player_stats_parse", |b| {
        b.iter(|| {
            let stats = parse_player_stats_json(black_box(PLAYER_STATS_JSON)).unwrap();
            black_box(stats.matches.len());
        })
    });
}

fn bench_player_stats_parse_large(c: &mut Criterion) {
    let raw = serde_json::json!({ "stats": synthetic_stats(500) }).to_string();
    c.bench_function("player_stats_parse_500", |b| {
        b.iter(|| {
            let stats = parse_player_stats_json(black_box(&raw)).unwrap();
            black_box(stats.matches.len());
        })
    });
}

fn bench_overview_summary(c: &mut Criterion) {
    let stats = synthetic_stats(500);
    c.bench_function("overview_summary_500", |b| {
        b.iter(|| {
            let summary = OverviewSummary::from_stats(black_box(&stats));
            black_box(summary.top_heroes.len());
        })
    });
}

fn bench_aggregates(c: &mut Criterion) {
    let stats = synthetic_stats(2_000);
    let gpms: Vec<f64> = stats
        .matches
        .iter()
        .map(|m| m.gold_per_min as f64)
        .collect();

    c.bench_function("hero_performance_2000", |b| {
        b.iter(|| black_box(hero_performance(black_box(&stats.matches)).len()))
    });
    c.bench_function("activity_heatmap_2000", |b| {
        b.iter(|| black_box(activity_heatmap(black_box(&stats.matches))[0][0]))
    });
    c.bench_function("gpm_p90_2000", |b| {
        b.iter(|| black_box(percentile(black_box(&gpms), 90.0)))
    });
}

criterion_group!(
    perf,
    bench_player_stats_parse,
    bench_player_stats_parse_large,
    bench_overview_summary,
    bench_aggregates
);
criterion_main!(perf);

static PLAYER_STATS_JSON: &str = include_str!("../tests/fixtures/player_stats.json");
