use std::fs;

use chrono::{Duration, TimeZone, Utc};

use dota_insights::anti_tilt::{AntiTiltTimer, clamp_pause_mins};
use dota_insights::local_store::{LocalStore, MirroredIdentity};

fn mirrored(player_id: Option<&str>, change_count: u32, is_locked: bool) -> MirroredIdentity {
    MirroredIdentity {
        player_id: player_id.map(str::to_string),
        change_count,
        is_locked,
    }
}

#[test]
fn keys_are_stored_independently() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = LocalStore::at(dir.path().join("nested").join("store.json"));
    assert_eq!(store.identity(), MirroredIdentity::default());

    store.save_identity(&mirrored(Some("123"), 2, false)).expect("save id");
    store.save_anti_tilt_pause_until(Some(1_700_000_000)).expect("save pause");
    assert_eq!(store.identity(), mirrored(Some("123"), 2, false));
    assert_eq!(store.anti_tilt_pause_until(), Some(1_700_000_000));

    store.save_identity(&mirrored(None, 3, true)).expect("clear id");
    assert_eq!(store.identity(), mirrored(None, 3, true));
    assert_eq!(store.anti_tilt_pause_until(), Some(1_700_000_000));
}

#[test]
fn unreadable_store_reads_as_empty() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("store.json");
    fs::write(&path, "{ definitely not json").expect("write junk");
    let store = LocalStore::at(&path);
    assert_eq!(store.identity().player_id, None);

    fs::write(&path, r#"{"version": 99, "player_id": "5"}"#).expect("write future version");
    assert_eq!(store.identity().player_id, None);

    store.save_identity(&mirrored(Some("6"), 0, false)).expect("overwrite");
    assert_eq!(store.identity().player_id.as_deref(), Some("6"));
}

#[test]
fn file_without_quota_fields_reads_as_unspent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("store.json");
    fs::write(&path, r#"{"version": 1, "player_id": "5"}"#).expect("write old file");
    assert_eq!(LocalStore::at(&path).identity(), mirrored(Some("5"), 0, false));
}

#[test]
fn disabled_store_accepts_writes_and_reads_empty() {
    let store = LocalStore::disabled();
    store.save_identity(&mirrored(Some("1"), 0, false)).expect("no-op write");
    assert_eq!(store.identity(), MirroredIdentity::default());
    assert!(store.path().is_none());
}

#[test]
fn anti_tilt_pause_expires_and_clears() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = LocalStore::at(dir.path().join("store.json"));
    let timer = AntiTiltTimer::new(store.clone());
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();

    let until = timer.start_pause(now, 30).expect("start pause");
    assert_eq!(until, now + Duration::minutes(30));
    assert_eq!(
        timer.remaining(now + Duration::minutes(10)),
        Some(Duration::minutes(20))
    );

    assert_eq!(timer.remaining(now + Duration::minutes(30)), None);
    assert_eq!(store.anti_tilt_pause_until(), None);
}

#[test]
fn anti_tilt_clear_ends_pause_early() {
    let dir = tempfile::tempdir().expect("temp dir");
    let timer = AntiTiltTimer::new(LocalStore::at(dir.path().join("store.json")));
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();

    timer.start_pause(now, 60).expect("start pause");
    timer.clear().expect("clear");
    assert_eq!(timer.remaining(now), None);
}

#[test]
fn anti_tilt_pause_length_is_clamped() {
    let dir = tempfile::tempdir().expect("temp dir");
    let timer = AntiTiltTimer::new(LocalStore::at(dir.path().join("store.json")));
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();

    let until = timer.start_pause(now, 0).expect("zero minutes");
    assert_eq!(until, now + Duration::minutes(1));
    assert!(timer.remaining(now).is_some());

    let until = timer.start_pause(now, 10_000).expect("too long");
    assert_eq!(until, now + Duration::minutes(240));
    assert_eq!(clamp_pause_mins(45), 45);
}
