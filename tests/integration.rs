//! Integration tests for the store façade.

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vitalstore::{
    ChangeSource, ExtractedProfile, FixedClock, Identity, LocalCache, MemoryAuth, MemoryCache,
    MemoryRemote, ProfileExtraction, SignInMethod, Snapshot, Store, StoreConfig, StoreEvent,
    StoreParts, SubscriptionConfig, DEFAULT_CACHE_KEY,
};

const WAIT: Duration = Duration::from_secs(5);

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Harness {
    cache: MemoryCache,
    auth: MemoryAuth,
    remote: MemoryRemote,
    clock: FixedClock,
}

impl Harness {
    fn new(auth: MemoryAuth, today: NaiveDate) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Self {
            cache: MemoryCache::new(),
            auth,
            remote: MemoryRemote::new(),
            clock: FixedClock::new(today),
        }
    }

    fn open(&self) -> Store {
        Store::with_parts(
            StoreConfig {
                rollover_interval: None,
                ..Default::default()
            },
            StoreParts {
                cache: Box::new(self.cache.clone()),
                auth: Arc::new(self.auth.clone()),
                remote: Arc::new(self.remote.clone()),
                clock: Arc::new(self.clock.clone()),
            },
        )
        .unwrap()
    }

    fn cached(&self) -> Option<String> {
        self.cache.get(DEFAULT_CACHE_KEY).unwrap()
    }
}

/// Wait for the store to settle and for the engine to finish the work that
/// settling triggered.
fn settle(store: &Store) {
    assert!(store.wait_until_settled(WAIT), "store never settled");
    store.flush().unwrap();
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn ana() -> Identity {
    Identity::new("uid-ana")
}

// --- Startup ---

#[test]
fn test_first_launch_without_identity() {
    let h = Harness::new(MemoryAuth::new(), day(2024, 1, 1));
    let store = h.open();
    settle(&store);

    assert!(store.user().is_none());
    assert!(!store.is_loading());

    // Rollover stamps the date as soon as the store settles.
    let snapshot = store.snapshot();
    assert_eq!(snapshot.last_update_date, Some(day(2024, 1, 1)));
    let expected = Snapshot {
        last_update_date: snapshot.last_update_date,
        ..Default::default()
    };
    assert_eq!(*snapshot, expected);
    assert!(h.remote.writes().is_empty());
}

#[test]
fn test_cached_snapshot_is_visible_before_session_is_known() {
    let h = Harness::new(MemoryAuth::undetermined(), day(2024, 1, 1));
    h.cache
        .set(DEFAULT_CACHE_KEY, r#"{"water":750,"lastUpdateDate":"2024-01-01"}"#)
        .unwrap();

    let store = h.open();
    assert!(store.is_loading());
    assert_eq!(store.snapshot().water, 750.0);

    h.auth.set_session(None);
    settle(&store);
    assert_eq!(store.snapshot().water, 750.0);
}

#[test]
fn test_returning_identity_takes_remote_document() {
    let h = Harness {
        remote: MemoryRemote::with_document(
            "uid-ana",
            json!({"calories": 50, "water": 500, "lastUpdateDate": "2024-01-01"}),
        ),
        ..Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1))
    };
    h.cache
        .set(DEFAULT_CACHE_KEY, r#"{"water":100,"calories":900}"#)
        .unwrap();

    let store = h.open();
    settle(&store);

    assert_eq!(store.user(), Some(ana()));
    let snapshot = store.snapshot();
    assert_eq!(snapshot.calories, 50.0);
    assert_eq!(snapshot.water, 500.0);
    assert_eq!(snapshot.last_update_date, Some(day(2024, 1, 1)));

    // The cache holds the payload exactly as the remote sent it.
    let payload = json!({"calories": 50, "water": 500, "lastUpdateDate": "2024-01-01"});
    assert_eq!(h.cached(), Some(payload.to_string()));
    assert_eq!(h.remote.write_count("uid-ana"), 0);
}

#[test]
fn test_first_contact_seeds_remote_from_local() {
    let h = Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1));
    h.cache
        .set(
            DEFAULT_CACHE_KEY,
            r#"{"water":300,"profile":{"name":"Ana"},"lastUpdateDate":"2024-01-01"}"#,
        )
        .unwrap();

    let store = h.open();
    assert!(store.wait_until_settled(WAIT));

    // Seeding happens before the store reports settled.
    let document = h.remote.document("uid-ana").unwrap();
    assert_eq!(document["water"], json!(300.0));
    assert_eq!(document["profile"]["name"], "Ana");
    // Absent optional fields are written as explicit nulls.
    assert!(document["lastMeal"].is_null());
    assert!(document.as_object().unwrap().contains_key("lastMeal"));
    assert_eq!(h.remote.write_count("uid-ana"), 1);
}

#[test]
fn test_first_read_replaces_local_without_writing_back() {
    let h = Harness {
        remote: MemoryRemote::with_document(
            "uid-ana",
            json!({"water": 1200, "lastUpdateDate": "2024-01-01"}),
        ),
        ..Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1))
    };
    h.cache
        .set(DEFAULT_CACHE_KEY, r#"{"water":5,"lastUpdateDate":"2024-01-01"}"#)
        .unwrap();

    let store = h.open();
    settle(&store);

    assert_eq!(store.snapshot().water, 1200.0);
    assert_eq!(h.remote.write_count("uid-ana"), 0);
}

// --- Saves ---

#[test]
fn test_save_without_identity_stays_local() {
    let h = Harness::new(MemoryAuth::new(), day(2024, 1, 1));
    let store = h.open();
    settle(&store);

    store.modify(|s| s.add_calories(420.0)).unwrap();
    store.flush().unwrap();

    assert_eq!(store.snapshot().calories, 420.0);
    let cached = Snapshot::from_json_str(&h.cached().unwrap()).unwrap();
    assert_eq!(cached.calories, 420.0);
    assert!(h.remote.writes().is_empty());
}

#[test]
fn test_save_with_identity_mirrors_remote() {
    let h = Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1));
    let store = h.open();
    settle(&store);

    let mut next = (*store.snapshot()).clone();
    next.water = 700.0;
    next.profile.name = "Ana".into();
    store.save_store(next).unwrap();
    store.flush().unwrap();

    let document = h.remote.document("uid-ana").unwrap();
    assert_eq!(document["water"], json!(700.0));
    assert_eq!(document["profile"]["name"], "Ana");
}

#[test]
fn test_last_save_wins() {
    let h = Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1));
    let store = h.open();
    settle(&store);

    for water in [100.0, 200.0, 300.0] {
        let mut next = (*store.snapshot()).clone();
        next.water = water;
        store.save_store(next).unwrap();
    }
    store.flush().unwrap();

    assert_eq!(h.remote.document("uid-ana").unwrap()["water"], json!(300.0));
    assert!(wait_for(|| store.snapshot().water == 300.0));
}

#[test]
fn test_concurrent_modifications_are_serialized() {
    let h = Harness::new(MemoryAuth::new(), day(2024, 1, 1));
    let store = Arc::new(h.open());
    settle(&store);

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    store.modify(|s| s.add_water(10.0)).unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(store.snapshot().water, 1000.0);
}

// --- Remote pushes ---

#[test]
fn test_remote_push_replaces_snapshot() {
    let h = Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1));
    let store = h.open();
    settle(&store);
    let events = store.subscribe(SubscriptionConfig::default());

    h.remote.put_external(
        "uid-ana",
        json!({"water": 2000, "calories": 10, "lastUpdateDate": "2024-01-01"}),
    );

    assert!(wait_for(|| store.snapshot().water == 2000.0));
    assert_eq!(store.snapshot().calories, 10.0);

    let mut saw_remote = false;
    while let Ok(event) = events.recv_timeout(Duration::from_millis(100)) {
        if let StoreEvent::SnapshotChanged {
            source: ChangeSource::Remote,
        } = event
        {
            saw_remote = true;
        }
    }
    assert!(saw_remote);
}

#[test]
fn test_foreign_write_between_own_write_and_echo_converges() {
    let h = Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1));
    let store = h.open();
    settle(&store);

    // Our write is still on its way when another device writes.
    h.remote.set_write_delay(Some(Duration::from_millis(300)));
    store.modify(|s| s.water = 500.0).unwrap();
    h.remote.put_external(
        "uid-ana",
        json!({"water": 777, "lastUpdateDate": "2024-01-01"}),
    );
    store.flush().unwrap();

    // The remote ends with our write; so must memory.
    assert_eq!(h.remote.document("uid-ana").unwrap()["water"], json!(500.0));
    assert!(wait_for(|| store.snapshot().water == 500.0));
}

// --- Rollover ---

#[test]
fn test_rollover_on_day_change() {
    let h = Harness::new(MemoryAuth::new(), day(2024, 1, 1));
    let store = h.open();
    settle(&store);

    store
        .modify(|s| {
            s.add_water(500.0);
            s.add_calories(1200.0);
            s.toggle_exercise("monday", 0);
        })
        .unwrap();
    assert!(!store.check_rollover().unwrap());

    h.clock.set(day(2024, 1, 2));
    assert!(store.check_rollover().unwrap());

    let snapshot = store.snapshot();
    assert_eq!(snapshot.water, 0.0);
    assert_eq!(snapshot.calories, 0.0);
    assert!(snapshot.done_ex.is_empty());
    assert_eq!(snapshot.last_update_date, Some(day(2024, 1, 2)));

    // Idempotent within the day.
    assert!(!store.check_rollover().unwrap());
}

#[test]
fn test_save_with_stale_date_rolls_over() {
    let h = Harness::new(MemoryAuth::new(), day(2024, 1, 1));
    let store = h.open();
    settle(&store);
    h.clock.set(day(2024, 1, 2));

    let mut next = (*store.snapshot()).clone();
    next.water = 100.0;
    next.last_update_date = Some(day(2024, 1, 1));
    store.save_store(next).unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.water, 0.0);
    assert_eq!(snapshot.last_update_date, Some(day(2024, 1, 2)));
}

#[test]
fn test_rollover_after_remote_read() {
    let h = Harness {
        remote: MemoryRemote::with_document(
            "uid-ana",
            json!({"water": 800, "lastUpdateDate": "2024-01-01", "profile": {"name": "Ana"}}),
        ),
        ..Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 2))
    };

    let store = h.open();
    settle(&store);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.water, 0.0);
    assert_eq!(snapshot.profile.name, "Ana");
    assert_eq!(snapshot.last_update_date, Some(day(2024, 1, 2)));

    // The rolled-over snapshot is mirrored back.
    let document = h.remote.document("uid-ana").unwrap();
    assert_eq!(document["lastUpdateDate"], "2024-01-02");
}

#[test]
fn test_periodic_rollover_while_idle() {
    let h = Harness::new(MemoryAuth::new(), day(2024, 1, 1));
    let store = Store::with_parts(
        StoreConfig {
            rollover_interval: Some(Duration::from_millis(10)),
            ..Default::default()
        },
        StoreParts {
            cache: Box::new(h.cache.clone()),
            auth: Arc::new(h.auth.clone()),
            remote: Arc::new(h.remote.clone()),
            clock: Arc::new(h.clock.clone()),
        },
    )
    .unwrap();
    settle(&store);
    store.modify(|s| s.add_water(250.0)).unwrap();

    h.clock.advance(1);
    assert!(wait_for(|| store.snapshot().water == 0.0));
    assert_eq!(store.snapshot().last_update_date, Some(day(2024, 1, 2)));
}

// --- Profiles ---

#[test]
fn test_resupply_for_active_subject_records_evolution() {
    let h = Harness::new(MemoryAuth::new(), day(2024, 3, 1));
    let store = h.open();
    settle(&store);
    store
        .modify(|s| {
            s.profile.name = "Ana".into();
            s.profile.weight = Some(150.0);
        })
        .unwrap();

    let snapshot = store
        .apply_extraction(ProfileExtraction {
            subject_name: "Ana".into(),
            profile: ExtractedProfile {
                weight: Some(145.0),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

    assert_eq!(snapshot.profile.weight, Some(145.0));
    assert_eq!(snapshot.profile.evolution.len(), 1);
    assert_eq!(snapshot.profile.evolution[0].weight, Some(150.0));
    assert_eq!(snapshot.profile.evolution[0].date, day(2024, 3, 1));
    assert!(snapshot.profiles.is_empty());
    assert_eq!(*store.snapshot(), *snapshot);
}

#[test]
fn test_switching_subjects_round_trip() {
    let h = Harness::new(MemoryAuth::new(), day(2024, 3, 1));
    let store = h.open();
    settle(&store);
    store
        .modify(|s| {
            s.profile.name = "Ana".into();
            s.add_water(900.0);
        })
        .unwrap();

    let extraction = |name: &str| ProfileExtraction {
        subject_name: name.into(),
        ..Default::default()
    };

    let bea = store.apply_extraction(extraction("Bea")).unwrap();
    assert_eq!(bea.subject_name(), "Bea");
    assert_eq!(bea.water, 0.0);
    assert!(bea.profiles.contains_key("Ana"));

    let ana = store.apply_extraction(extraction("Ana")).unwrap();
    assert_eq!(ana.water, 900.0);
    assert!(ana.profiles.contains_key("Bea"));
    assert!(!ana.profiles.contains_key("Ana"));
}

// --- Session ---

#[test]
fn test_login_binds_identity() {
    let h = Harness {
        remote: MemoryRemote::with_document(
            "uid-ana",
            json!({"profile": {"name": "Ana"}, "lastUpdateDate": "2024-01-01"}),
        ),
        ..Harness::new(MemoryAuth::new(), day(2024, 1, 1))
    };
    h.auth.register(SignInMethod::Google, ana());

    let store = h.open();
    settle(&store);
    assert!(store.user().is_none());

    let identity = store.login(SignInMethod::Google).unwrap();
    assert_eq!(identity, ana());
    settle(&store);

    assert_eq!(store.user(), Some(ana()));
    assert_eq!(store.snapshot().profile.name, "Ana");
    assert_eq!(h.remote.subscriber_count("uid-ana"), 1);
    assert!(store.take_alert().is_none());
}

#[test]
fn test_identity_switch_moves_subscription() {
    let h = Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1));
    let store = h.open();
    settle(&store);
    assert_eq!(h.remote.subscriber_count("uid-ana"), 1);

    h.auth.set_session(Some(Identity::new("uid-bea")));
    settle(&store);

    assert_eq!(store.user(), Some(Identity::new("uid-bea")));
    assert_eq!(h.remote.subscriber_count("uid-ana"), 0);
    assert_eq!(h.remote.subscriber_count("uid-bea"), 1);
}

#[test]
fn test_logout_resets_local_state_only() {
    let h = Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1));
    let store = h.open();
    settle(&store);

    store.modify(|s| s.add_water(640.0)).unwrap();
    store.flush().unwrap();

    store.logout().unwrap();

    assert!(store.user().is_none());
    assert_eq!(*store.snapshot(), Snapshot::default());
    assert!(h.cached().is_none());
    assert_eq!(h.remote.subscriber_count("uid-ana"), 0);

    // The remote document survives logout.
    assert_eq!(h.remote.document("uid-ana").unwrap()["water"], json!(640.0));
}

#[test]
fn test_no_remote_push_after_logout() {
    let h = Harness::new(MemoryAuth::signed_in(ana()), day(2024, 1, 1));
    let store = h.open();
    settle(&store);

    store.logout().unwrap();
    h.remote.put_external("uid-ana", json!({"water": 999}));
    std::thread::sleep(Duration::from_millis(50));
    store.flush().unwrap();

    assert_eq!(store.snapshot().water, 0.0);
    assert!(h.cached().is_none());
}

// --- File-backed ---

#[test]
fn test_file_cache_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        cache_dir: dir.path().join("cache"),
        rollover_interval: None,
        ..Default::default()
    };

    {
        let store = Store::open(
            config.clone(),
            Arc::new(MemoryAuth::new()),
            Arc::new(MemoryRemote::new()),
        )
        .unwrap();
        settle(&store);
        store.modify(|s| s.profile.name = "Ana".into()).unwrap();
    }

    let store = Store::open(
        config,
        Arc::new(MemoryAuth::undetermined()),
        Arc::new(MemoryRemote::new()),
    )
    .unwrap();
    // Visible while still loading.
    assert!(store.is_loading());
    assert_eq!(store.snapshot().profile.name, "Ana");
}
