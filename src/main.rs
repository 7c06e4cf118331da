use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use dota_insights::anti_tilt::{self, AntiTiltTimer};
use dota_insights::api::{ApiClient, PlayerApi};
use dota_insights::config::Config;
use dota_insights::identity::{
    HttpIdentityBackend, IdentityError, IdentityStore, IdentityUpdate, SessionTokens,
};
use dota_insights::local_store::LocalStore;
use dota_insights::model::PlayerStats;
use dota_insights::page::{FetchPool, OverviewPage};
use dota_insights::refresh::{
    FetchFn, RefreshCoordinator, RefreshEvent, RefreshOptions, RefreshTrigger, SkipReason,
};
use dota_insights::state::{AppState, Delta, apply_delta};

const LOOP_SLEEP: Duration = Duration::from_millis(900);

enum Command {
    Show,
    SetId(String),
    ClearId,
    Pause(Option<u32>),
    Watch,
}

enum WatchInput {
    Refresh,
    AckNewMatch,
    Quit,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let command = parse_command(std::env::args().skip(1).collect())?;
    let config = Config::from_env();
    let mirror = config
        .store_path
        .clone()
        .map(LocalStore::at)
        .unwrap_or_else(LocalStore::default_location);

    let backend = HttpIdentityBackend::new(&config)?;
    let tokens = SessionTokens::from_config(&config);
    let mut store = IdentityStore::new(backend, mirror.clone(), tokens);
    let mut state = AppState::new();
    let report = store.load();
    apply_delta(
        &mut state,
        Delta::IdentityLoaded {
            report,
            identity: store.identity(),
        },
    );

    let result = match command {
        Command::Show => {
            let view = store.identity();
            println!(
                "player_id={} changes={} remaining={} locked={}",
                view.player_id.as_deref().unwrap_or("-"),
                view.change_count,
                view.changes_remaining,
                view.is_locked
            );
            if let Some(left) = AntiTiltTimer::new(mirror).remaining(Utc::now()) {
                println!("anti-tilt pause: {} min left", left.num_minutes() + 1);
            }
            Ok(())
        }
        Command::SetId(raw) => {
            change_identity(&mut state, store.set_identity(Some(&raw)));
            Ok(())
        }
        Command::ClearId => {
            change_identity(&mut state, store.clear_identity());
            Ok(())
        }
        Command::Pause(minutes) => {
            let minutes = minutes.unwrap_or(config.anti_tilt_pause_mins);
            let until = AntiTiltTimer::new(mirror).start_pause(Utc::now(), minutes)?;
            state.push_log(format!("[INFO] Anti-tilt pause until {}", until.format("%H:%M UTC")));
            Ok(())
        }
        Command::Watch => {
            if store.player_id().is_none() {
                if let Some(seed) = config.seed_player_id.clone() {
                    change_identity(&mut state, store.set_identity(Some(&seed)));
                }
            }
            match store.player_id().map(str::to_string) {
                Some(player_id) => watch(&config, &mirror, &mut state, player_id),
                None => {
                    state.push_log("[WARN] No Player ID set; use `set-id <id>` or PLAYER_ID");
                    Ok(())
                }
            }
        }
    };

    flush_logs(&mut state);
    result
}

fn change_identity(state: &mut AppState, result: Result<IdentityUpdate, IdentityError>) {
    match result {
        Ok(update) => apply_delta(state, Delta::IdentityChanged(update)),
        Err(err) => apply_delta(state, Delta::IdentityRejected(err)),
    }
}

fn watch(
    config: &Config,
    mirror: &LocalStore,
    state: &mut AppState,
    player_id: String,
) -> Result<()> {
    let api = ApiClient::new(config)?;
    let pool = FetchPool::new(config.fetch_parallelism);
    state.push_log(format!("[INFO] Watching player {player_id} via {}", api.base()));

    let mut overview = OverviewPage::new();
    overview.load(&api, &pool, &player_id);
    for (name, error) in [
        ("stats", overview.stats.error()),
        ("win/loss", overview.win_loss.error()),
        ("profile", overview.profile.error()),
    ] {
        if let Some(error) = error {
            state.push_log(format!("[WARN] Overview {name} unavailable: {error}"));
        }
    }
    if let Some(wl) = overview.win_loss.data() {
        let rate = wl
            .win_rate()
            .map(|wr| format!(" ({wr:.1}%)"))
            .unwrap_or_default();
        state.push_log(format!("[INFO] Lifetime record {}W / {}L{rate}", wl.win, wl.lose));
    }
    publish_overview(state, &overview);
    if let Some(left) = AntiTiltTimer::new(mirror.clone()).remaining(Utc::now()) {
        state.push_log(format!(
            "[INFO] Anti-tilt pause active, {} min left",
            left.num_minutes() + 1
        ));
    }

    let fetch_api = api.clone();
    let fetch: FetchFn<PlayerStats> = Arc::new(move |id: &str| fetch_api.player_stats(id));
    let mut coordinator =
        RefreshCoordinator::new(fetch, Some(player_id), RefreshOptions::from_config(config))
            .on_new_match(|_| eprint!("\x07"));
    if let Some(stats) = overview.stats.data() {
        coordinator.seed(stats.clone(), Instant::now());
    }

    let input = spawn_input_reader();
    loop {
        flush_logs(state);
        thread::sleep(LOOP_SLEEP);

        while let Ok(cmd) = input.try_recv() {
            match cmd {
                WatchInput::Refresh => {
                    let trigger = coordinator.refresh(true);
                    apply_delta(state, Delta::RefreshTriggered(trigger));
                }
                WatchInput::AckNewMatch => {
                    coordinator.clear_new_matches_flag();
                    apply_delta(state, Delta::AckNewMatch);
                }
                WatchInput::Quit => return Ok(()),
            }
        }

        if let Some(trigger) = coordinator.tick(Instant::now()) {
            // Polls that find fresh data stay quiet.
            if trigger != RefreshTrigger::Skipped(SkipReason::Fresh) {
                apply_delta(state, Delta::RefreshTriggered(trigger));
            }
        }

        let events = coordinator.pump();
        if events.is_empty() {
            continue;
        }
        let applied = events
            .iter()
            .any(|event| matches!(event, RefreshEvent::Applied { .. }));
        for event in events {
            apply_delta(state, Delta::Refresh(event));
        }
        if let Some(stats) = coordinator.data().filter(|_| applied) {
            overview.apply_refreshed_stats(stats.clone());
            publish_overview(state, &overview);
            if anti_tilt::should_suggest_pause(&stats.matches) {
                state.push_log(format!(
                    "[WARN] {} losses in a row; consider `pause`",
                    anti_tilt::loss_streak(&stats.matches)
                ));
            }
        }
        apply_delta(state, Delta::SetRefreshState(coordinator.state().clone()));
    }
}

fn publish_overview(state: &mut AppState, overview: &OverviewPage) {
    let Some(summary) = overview.summary() else {
        return;
    };
    let win_rate = summary
        .win_rate
        .map(|wr| format!("{wr:.1}%"))
        .unwrap_or_else(|| "-".to_string());
    let kda = summary
        .mean_kda
        .map(|kda| format!("{kda:.2}"))
        .unwrap_or_else(|| "-".to_string());
    state.push_log(format!(
        "[INFO] {} recent matches, win rate {win_rate}, KDA {kda}",
        summary.matches
    ));
    apply_delta(state, Delta::SetOverview(summary));
}

fn spawn_input_reader() -> Receiver<WatchInput> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let cmd = match line.trim() {
                "r" | "refresh" => WatchInput::Refresh,
                "a" | "ack" => WatchInput::AckNewMatch,
                "q" | "quit" => WatchInput::Quit,
                _ => continue,
            };
            if tx.send(cmd).is_err() {
                break;
            }
        }
    });
    rx
}

fn flush_logs(state: &mut AppState) {
    let stamp = Utc::now().format("%H:%M:%S");
    for line in state.take_unprinted() {
        eprintln!("{stamp} {line}");
    }
}

fn parse_command(args: Vec<String>) -> Result<Command> {
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(Command::Watch);
    };
    match first.as_str() {
        "show" => Ok(Command::Show),
        "watch" => Ok(Command::Watch),
        "clear-id" => Ok(Command::ClearId),
        "set-id" => {
            let id = args.next().context("usage: set-id <player id>")?;
            Ok(Command::SetId(id))
        }
        "pause" => {
            let minutes = args
                .next()
                .map(|raw| raw.parse::<u32>().context("pause minutes must be a number"))
                .transpose()?;
            Ok(Command::Pause(minutes))
        }
        other => Err(anyhow!(
            "unknown command {other:?}; expected show, set-id, clear-id, pause or watch"
        )),
    }
}
