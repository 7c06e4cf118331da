use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use dota_insights::identity::{
    IdentityBackend, IdentityError, IdentitySource, IdentityStore, RemoteIdentity, SessionTokens,
    UpdateResponse, validate_player_id,
};
use dota_insights::local_store::{LocalStore, MirroredIdentity};

#[derive(Default)]
struct FakeBackend {
    remote: Mutex<RemoteIdentity>,
    updates: AtomicUsize,
    read_error: Option<String>,
    write_error: Mutex<Option<String>>,
    report_count: bool,
}

impl FakeBackend {
    fn with_remote(player_id: Option<&str>, change_count: u32, is_locked: Option<bool>) -> Self {
        Self {
            remote: Mutex::new(RemoteIdentity {
                player_id: player_id.map(str::to_string),
                change_count,
                is_locked,
            }),
            ..Self::default()
        }
    }

    fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl IdentityBackend for FakeBackend {
    fn get_player_id(&self, _tokens: &SessionTokens) -> Result<RemoteIdentity> {
        if let Some(err) = self.read_error.as_ref() {
            return Err(anyhow!(err.clone()));
        }
        Ok(self.remote.lock().unwrap().clone())
    }

    fn update_player_id(
        &self,
        new_id: Option<&str>,
        _tokens: &SessionTokens,
    ) -> Result<UpdateResponse> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.write_error.lock().unwrap().clone() {
            return Ok(UpdateResponse {
                success: false,
                error: Some(err),
                ..UpdateResponse::default()
            });
        }
        let mut remote = self.remote.lock().unwrap();
        if remote.player_id.is_some() && remote.player_id.as_deref() != new_id {
            remote.change_count += 1;
        }
        remote.player_id = new_id.map(str::to_string);
        Ok(UpdateResponse {
            success: true,
            message: None,
            error: None,
            change_count: self.report_count.then_some(remote.change_count),
        })
    }
}

fn store_with(backend: FakeBackend) -> (IdentityStore<FakeBackend>, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mirror = LocalStore::at(dir.path().join("store.json"));
    let mut store = IdentityStore::new(backend, mirror, SessionTokens::default());
    store.load();
    (store, dir)
}

#[test]
fn three_changes_lock_the_identity() {
    let (mut store, _dir) = store_with(FakeBackend::default());

    let first = store.set_identity(Some("111111111")).expect("first set");
    assert!(!first.consumed_change);
    assert_eq!(store.identity().change_count, 0);

    store.set_identity(Some("222222222")).expect("change 1");
    assert_eq!(store.identity().change_count, 1);
    store.set_identity(Some("333333333")).expect("change 2");
    assert_eq!(store.identity().change_count, 2);
    let third = store.set_identity(Some("444444444")).expect("change 3");
    assert!(third.consumed_change);
    assert_eq!(store.identity().change_count, 3);
    assert!(store.identity().is_locked);
    assert_eq!(store.identity().changes_remaining, 0);

    let writes = store.backend().updates();
    let err = store.set_identity(Some("555555555")).unwrap_err();
    assert_eq!(err, IdentityError::Locked);
    assert_eq!(store.backend().updates(), writes);
    assert_eq!(store.player_id(), Some("444444444"));
}

#[test]
fn locked_identity_rejects_every_call_without_network() {
    let (mut store, _dir) = store_with(FakeBackend::with_remote(Some("42"), 3, None));
    assert!(store.identity().is_locked);

    assert_eq!(store.set_identity(Some("43")), Err(IdentityError::Locked));
    assert_eq!(store.set_identity(Some("42")), Err(IdentityError::Locked));
    assert_eq!(store.clear_identity(), Err(IdentityError::Locked));
    assert_eq!(store.backend().updates(), 0);
}

#[test]
fn setting_the_same_id_is_a_free_no_op() {
    let (mut store, _dir) = store_with(FakeBackend::with_remote(Some("123"), 2, None));

    let update = store.set_identity(Some("123")).expect("no-op succeeds");
    assert!(!update.consumed_change);
    assert_eq!(store.identity().change_count, 2);
    // Canonical form compares equal too.
    store.set_identity(Some(" 0123 ")).expect("no-op succeeds");
    assert_eq!(store.identity().change_count, 2);
    assert_eq!(store.backend().updates(), 0);
}

#[test]
fn invalid_ids_are_rejected_before_any_write() {
    let (mut store, _dir) = store_with(FakeBackend::default());
    for raw in ["", "abc", "-5", "+5", "12.5", "1 2"] {
        let err = store.set_identity(Some(raw)).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidInput(_)), "{raw:?}");
    }
    assert_eq!(store.backend().updates(), 0);
    assert_eq!(store.player_id(), None);
}

#[test]
fn quota_is_checked_when_remote_does_not_report_a_lock() {
    let (mut store, _dir) = store_with(FakeBackend::with_remote(Some("10"), 3, Some(false)));
    assert!(!store.identity().is_locked);

    assert_eq!(
        store.set_identity(Some("11")),
        Err(IdentityError::QuotaExceeded)
    );
    assert_eq!(store.backend().updates(), 0);
    assert_eq!(store.player_id(), Some("10"));
}

#[test]
fn remote_failure_leaves_local_state_untouched() {
    let (mut store, dir) = store_with(FakeBackend::with_remote(Some("10"), 1, None));
    *store.backend().write_error.lock().unwrap() = Some("session expired".to_string());

    let err = store.set_identity(Some("11")).unwrap_err();
    assert_eq!(
        err,
        IdentityError::RemoteWriteFailure("session expired".to_string())
    );
    assert_eq!(store.player_id(), Some("10"));
    assert_eq!(store.identity().change_count, 1);

    let mirror = LocalStore::at(dir.path().join("store.json"));
    assert_eq!(mirror.identity().player_id.as_deref(), Some("10"));
}

#[test]
fn successful_change_updates_the_mirror() {
    let (mut store, dir) = store_with(FakeBackend::default());
    store.set_identity(Some("555")).expect("first set");

    let mirror = LocalStore::at(dir.path().join("store.json"));
    assert_eq!(mirror.identity().player_id.as_deref(), Some("555"));
}

#[test]
fn clearing_an_existing_id_consumes_a_change() {
    let (mut store, _dir) = store_with(FakeBackend::with_remote(Some("10"), 0, None));

    let update = store.clear_identity().expect("clear");
    assert!(update.consumed_change);
    assert_eq!(store.player_id(), None);
    assert_eq!(store.identity().change_count, 1);

    // Nothing to clear: no-op.
    let update = store.clear_identity().expect("clear again");
    assert!(!update.consumed_change);
    assert_eq!(store.backend().updates(), 1);

    // Setting after a clear is a first-time set.
    store.set_identity(Some("20")).expect("set after clear");
    assert_eq!(store.identity().change_count, 1);
}

#[test]
fn remote_change_count_is_authoritative() {
    let backend = FakeBackend {
        report_count: true,
        ..FakeBackend::with_remote(Some("1"), 2, None)
    };
    let (mut store, _dir) = store_with(backend);

    store.set_identity(Some("2")).expect("change");
    assert_eq!(store.identity().change_count, 3);
    assert!(store.identity().is_locked);
}

fn offline_store(mirror: LocalStore) -> IdentityStore<FakeBackend> {
    let backend = FakeBackend {
        read_error: Some("connection refused".to_string()),
        ..FakeBackend::default()
    };
    IdentityStore::new(backend, mirror, SessionTokens::default())
}

#[test]
fn load_falls_back_to_mirror_when_remote_is_down() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mirror = LocalStore::at(dir.path().join("store.json"));
    mirror
        .save_identity(&MirroredIdentity {
            player_id: Some("777".to_string()),
            change_count: 1,
            is_locked: false,
        })
        .expect("seed mirror");

    let mut store = offline_store(mirror);
    let report = store.load();
    assert_eq!(report.source, IdentitySource::Mirror);
    assert!(report.remote_error.is_some());
    assert_eq!(store.player_id(), Some("777"));
    assert_eq!(store.identity().change_count, 1);
    assert_eq!(store.identity().changes_remaining, 2);
}

#[test]
fn locked_account_stays_locked_while_remote_is_down() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("store.json");

    // Lock the account while the server is reachable.
    let online = FakeBackend::with_remote(Some("333333333"), 2, None);
    let mut store = IdentityStore::new(online, LocalStore::at(&path), SessionTokens::default());
    store.load();
    store.set_identity(Some("444444444")).expect("third change");
    assert!(store.identity().is_locked);

    let mut offline = offline_store(LocalStore::at(&path));
    let report = offline.load();
    assert_eq!(report.source, IdentitySource::Mirror);
    assert!(offline.identity().is_locked);
    assert_eq!(offline.identity().change_count, 3);

    assert_eq!(
        offline.set_identity(Some("555555555")),
        Err(IdentityError::Locked)
    );
    assert_eq!(offline.clear_identity(), Err(IdentityError::Locked));
    assert_eq!(offline.backend().updates(), 0);
    assert_eq!(offline.player_id(), Some("444444444"));
}

#[test]
fn cleared_id_keeps_spent_quota_in_mirror() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("store.json");
    let online = FakeBackend::with_remote(Some("10"), 2, None);
    let mut store = IdentityStore::new(online, LocalStore::at(&path), SessionTokens::default());
    store.load();
    store.clear_identity().expect("clear");

    let mut offline = offline_store(LocalStore::at(&path));
    assert_eq!(offline.load().source, IdentitySource::Mirror);
    assert_eq!(offline.player_id(), None);
    assert!(offline.identity().is_locked);
}

#[test]
fn load_reports_mirror_write_failure() {
    let dir = tempfile::tempdir().expect("temp dir");
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "file").expect("write blocker");
    let mirror = LocalStore::at(blocker.join("store.json"));

    let mut store = IdentityStore::new(
        FakeBackend::with_remote(Some("888"), 0, None),
        mirror,
        SessionTokens::default(),
    );
    let report = store.load();
    assert_eq!(report.source, IdentitySource::Remote);
    assert!(report.mirror_error.is_some());
    assert_eq!(store.player_id(), Some("888"));
}

#[test]
fn remote_value_overrides_stale_mirror() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mirror = LocalStore::at(dir.path().join("store.json"));
    mirror
        .save_identity(&MirroredIdentity {
            player_id: Some("777".to_string()),
            change_count: 0,
            is_locked: false,
        })
        .expect("seed mirror");

    let mut store = IdentityStore::new(
        FakeBackend::with_remote(Some("888"), 1, None),
        mirror.clone(),
        SessionTokens::default(),
    );
    let report = store.load();
    assert_eq!(report.source, IdentitySource::Remote);
    assert_eq!(store.player_id(), Some("888"));
    assert_eq!(mirror.identity().player_id.as_deref(), Some("888"));
    assert_eq!(mirror.identity().change_count, 1);
}

#[test]
fn remote_identity_accepts_numeric_player_id() {
    let remote: RemoteIdentity =
        serde_json::from_str(r#"{"playerId": 123456, "changeCount": 2}"#).expect("json");
    assert_eq!(remote.player_id.as_deref(), Some("123456"));
    assert_eq!(remote.change_count, 2);
    assert_eq!(remote.is_locked, None);
}

#[test]
fn validate_canonicalises_leading_zeros() {
    assert_eq!(validate_player_id("000123").as_deref(), Ok("123"));
    assert_eq!(validate_player_id(" 0 ").as_deref(), Ok("0"));
}
