//! End-to-end pull/push scenarios against the fake backend.

use partsync_engine::{
    DatabaseApplier, MockTransport, RetryConfig, SyncConfig, SyncEngine, SyncError, SyncState,
};
use partsync_protocol::{PullResponse, SyncableTable, TableChanges};
use partsync_store::{Cart, Collection, Favorites, SyncStatus};
use partsync_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const BRANDS: &[SyncableTable] = &[SyncableTable::CarBrands];

#[test]
fn first_run_and_rerun_are_idempotent() {
    let db = TestDatabase::memory();
    let transport = MockTransport::new();
    transport.set_pull_response(
        PullResponse::new(5000).with_table(
            SyncableTable::CarBrands,
            TableChanges::new()
                .with_created(stamped(car_brand("cb1", "Toyota"), 1000, 1000))
                .with_created(stamped(car_brand("cb2", "Kia"), 1000, 1000)),
        ),
    );
    let engine = SyncEngine::new(
        SyncConfig::default(),
        transport,
        DatabaseApplier::new(db.handle()),
    );

    let outcome = engine.synchronize(BRANDS);
    assert!(outcome.success);
    assert_eq!(db.count(Collection::CAR_BRANDS).unwrap(), 2);
    assert_eq!(engine.applier().cursors().get(SyncableTable::CarBrands).unwrap(), 5000);

    let outcome = engine.synchronize(BRANDS);
    assert!(outcome.success);
    assert_eq!(db.count(Collection::CAR_BRANDS).unwrap(), 2);
    assert_eq!(outcome.report.table(SyncableTable::CarBrands).skipped, 2);
    assert_eq!(engine.transport().pull_requests()[1].last_pulled_at, 5000);
}

#[test]
fn incremental_pulls_follow_the_backend() {
    let backend = Arc::new(FakeBackend::new());
    backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota"));
    backend.upsert(SyncableTable::CarBrands, car_brand("cb2", "Kia"));
    backend.upsert(SyncableTable::Products, product("p1", "Oil filter", 12.5));

    let db = TestDatabase::memory();
    let engine = loopback_engine(Arc::clone(&backend), db.handle());

    let outcome = engine.synchronize(&[SyncableTable::CarBrands, SyncableTable::Products]);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(db.count(Collection::CAR_BRANDS).unwrap(), 2);
    assert_eq!(db.count(Collection::PRODUCTS).unwrap(), 1);

    backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota Motors"));
    backend.delete(SyncableTable::CarBrands, "cb2");
    backend.upsert(SyncableTable::Products, product("p2", "Brake pad", 40.0));

    let outcome = engine.synchronize(&[SyncableTable::CarBrands, SyncableTable::Products]);
    assert!(outcome.success);
    let brands = outcome.report.table(SyncableTable::CarBrands);
    assert_eq!((brands.updated, brands.deleted), (1, 1));
    assert_eq!(outcome.report.table(SyncableTable::Products).created, 1);

    let live = db.list(Collection::CAR_BRANDS).unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].text("name"), Some("Toyota Motors"));

    let tombstone = db
        .get_by_server_id(Collection::CAR_BRANDS, "cb2")
        .unwrap()
        .unwrap();
    assert!(tombstone.is_deleted());

    let price = db
        .get_by_server_id(Collection::PRODUCTS, "p2")
        .unwrap()
        .unwrap()
        .get("price")
        .and_then(|v| v.as_real());
    assert_eq!(price, Some(40.0));
}

#[test]
fn minimum_watermark_is_sent() {
    let backend = Arc::new(FakeBackend::new());
    let db = TestDatabase::memory();
    let engine = loopback_engine(Arc::clone(&backend), db.handle());

    let cursors = engine.applier().cursors();
    cursors.set(SyncableTable::CarBrands, 100).unwrap();
    cursors.set(SyncableTable::Categories, 200).unwrap();

    assert!(engine
        .synchronize(&[SyncableTable::Categories, SyncableTable::CarBrands])
        .success);
    assert_eq!(backend.pull_requests()[0].last_pulled_at, 100);

    let now = cursors.get(SyncableTable::CarBrands).unwrap();
    assert_eq!(cursors.get(SyncableTable::Categories).unwrap(), now);
    assert!(now > 200);
}

#[test]
fn server_errors_leave_state_untouched() {
    let backend = Arc::new(FakeBackend::new());
    backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota"));
    let db = TestDatabase::memory();
    let engine = loopback_engine(Arc::clone(&backend), db.handle());

    backend.fail_next(1, 503);
    let outcome = engine.synchronize(BRANDS);
    assert!(!outcome.success);
    assert!(outcome.retryable);
    assert!(outcome.error.unwrap().contains("503"));
    assert_eq!(engine.state(), SyncState::Error);
    assert_eq!(db.count(Collection::CAR_BRANDS).unwrap(), 0);
    assert_eq!(engine.applier().cursors().get(SyncableTable::CarBrands).unwrap(), 0);

    // Next call recovers.
    assert!(engine.synchronize(BRANDS).success);
    assert_eq!(db.count(Collection::CAR_BRANDS).unwrap(), 1);
}

#[test]
fn retry_rides_out_a_short_outage() {
    let backend = Arc::new(FakeBackend::new());
    backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota"));
    let db = TestDatabase::memory();
    let config = SyncConfig::new(LOOPBACK_URL).with_retry(
        RetryConfig::new(4)
            .with_initial_delay(Duration::from_millis(2))
            .with_jitter(false),
    );
    let engine = loopback_engine_with(config, Arc::clone(&backend), db.handle());

    backend.fail_next(2, 502);
    let outcome = engine.synchronize_with_retry(BRANDS);
    assert!(outcome.success);
    assert_eq!(engine.stats().retries, 2);
    assert_eq!(db.count(Collection::CAR_BRANDS).unwrap(), 1);
}

#[test]
fn bad_record_does_not_fail_the_pass() {
    let db = TestDatabase::memory();
    let transport = MockTransport::new();
    let broken = car_brand("cb_bad", "Broken").with("created_at", "yesterday");
    transport.set_pull_response(
        PullResponse::new(10).with_table(
            SyncableTable::CarBrands,
            TableChanges::new()
                .with_created(stamped(car_brand("cb1", "Toyota"), 1, 1))
                .with_created(broken.with("updated_at", 1))
                .with_created(stamped(car_brand("cb2", "Kia"), 1, 1)),
        ),
    );
    let engine = SyncEngine::new(
        SyncConfig::default(),
        transport,
        DatabaseApplier::new(db.handle()),
    );

    let outcome = engine.synchronize(BRANDS);
    assert!(outcome.success);
    assert_eq!(outcome.report.table(SyncableTable::CarBrands).created, 2);
    assert_eq!(outcome.report.total_failed(), 1);
    assert_eq!(engine.applier().cursors().get(SyncableTable::CarBrands).unwrap(), 10);
}

#[test]
fn cart_survives_pulls() {
    let backend = Arc::new(FakeBackend::new());
    backend.upsert(SyncableTable::Products, product("p1", "Oil filter", 12.5));
    let db = TestDatabase::memory();
    let cart = Cart::new(db.handle());
    cart.add("p1", 2).unwrap();
    cart.add("p9", 1).unwrap();

    let engine = loopback_engine(Arc::clone(&backend), db.handle());
    assert!(engine.synchronize(&[]).success);
    backend.delete(SyncableTable::Products, "p1");
    assert!(engine.synchronize(&[]).success);

    let items = cart.list().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items.iter().map(|i| i.quantity).sum::<u32>(), 3);
}

#[test]
fn bad_record_does_not_block_other_tables() {
    let db = TestDatabase::memory();
    let transport = MockTransport::new();
    let broken = car_brand("cb_bad", "Broken")
        .with("created_at", "yesterday")
        .with("updated_at", 1);
    transport.set_pull_response(
        PullResponse::new(20)
            .with_table(
                SyncableTable::CarBrands,
                TableChanges::new().with_created(broken),
            )
            .with_table(
                SyncableTable::Products,
                TableChanges::new()
                    .with_created(stamped(product("prod1", "Oil filter", 12.5), 1, 1))
                    .with_created(stamped(product("prod2", "Brake pad", 40.0), 1, 1)),
            )
            .with_table(
                SyncableTable::Categories,
                TableChanges::new().with_created(stamped(category("cat1", "Filters", 1), 1, 1)),
            ),
    );
    let engine = SyncEngine::new(
        SyncConfig::default(),
        transport,
        DatabaseApplier::new(db.handle()),
    );
    let tables = [
        SyncableTable::CarBrands,
        SyncableTable::Products,
        SyncableTable::Categories,
    ];

    let outcome = engine.synchronize(&tables);
    assert!(outcome.success);
    assert_eq!(outcome.report.table(SyncableTable::CarBrands).failed, 1);
    assert_eq!(outcome.report.table(SyncableTable::Products).created, 2);
    assert_eq!(outcome.report.table(SyncableTable::Categories).created, 1);
    assert_eq!(db.count(Collection::PRODUCTS).unwrap(), 2);
    assert_eq!(db.count(Collection::CATEGORIES).unwrap(), 1);
    assert_eq!(db.count(Collection::CAR_BRANDS).unwrap(), 0);

    let cursors = engine.applier().cursors();
    for table in tables {
        assert_eq!(cursors.get(table).unwrap(), 20, "{table}");
    }
}

#[test]
fn favorites_round_trip_through_the_backend() {
    let backend = Arc::new(FakeBackend::new());
    let db = TestDatabase::memory();
    let favorites = Favorites::new(db.handle());
    let engine = loopback_engine(Arc::clone(&backend), db.handle());

    assert!(favorites.toggle("u1", "p1").unwrap());
    assert!(favorites.toggle("u1", "p2").unwrap());

    let cycle = engine.sync();
    assert!(cycle.success());
    let push = cycle.push.unwrap();
    assert_eq!((push.pushed, push.acknowledged), (2, 2));
    assert_eq!(backend.live(SyncableTable::Favorites).len(), 2);
    assert!(db.pending(Collection::FAVORITES).unwrap().is_empty());

    // Un-favorite a pushed row: it becomes a pending tombstone.
    assert!(!favorites.toggle("u1", "p1").unwrap());
    let pending = db.pending(Collection::FAVORITES).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].sync_status, SyncStatus::Deleted);

    let push = engine.push_pending();
    assert!(push.success);
    assert_eq!(backend.push_requests()[1].changes["favorites"].deleted.len(), 1);
    assert_eq!(backend.live(SyncableTable::Favorites).len(), 1);

    // Pulling favorites back converges on the backend's view.
    let outcome = engine.synchronize(&[SyncableTable::Favorites]);
    assert!(outcome.success);
    assert_eq!(favorites.list("u1").unwrap().len(), 1);
    assert!(db.pending(Collection::FAVORITES).unwrap().is_empty());
}

#[test]
fn push_failure_keeps_favorites_pending() {
    let backend = Arc::new(FakeBackend::new());
    let db = TestDatabase::memory();
    let favorites = Favorites::new(db.handle());
    let engine = loopback_engine(Arc::clone(&backend), db.handle());

    favorites.toggle("u1", "p1").unwrap();
    backend.fail_next(1, 500);

    let push = engine.push_pending();
    assert!(!push.success);
    assert_eq!(push.acknowledged, 0);
    assert_eq!(db.pending(Collection::FAVORITES).unwrap().len(), 1);
    assert!(backend.live(SyncableTable::Favorites).is_empty());

    let push = engine.push_pending();
    assert!(push.success);
    assert_eq!(push.pushed, 1);
    assert!(db.pending(Collection::FAVORITES).unwrap().is_empty());
}

#[test]
fn pending_favorite_wins_over_pull_until_pushed() {
    let backend = Arc::new(FakeBackend::new());
    backend.upsert(SyncableTable::Favorites, favorite("fav1", "u1", "p1"));
    let db = TestDatabase::memory();
    let favorites = Favorites::new(db.handle());
    let engine = loopback_engine(Arc::clone(&backend), db.handle());

    assert!(engine.synchronize(&[SyncableTable::Favorites]).success);
    assert!(favorites.is_favorite("u1", "p1").unwrap());

    // Local un-favorite, then the backend deletes the same row.
    assert!(!favorites.toggle("u1", "p1").unwrap());
    backend.delete(SyncableTable::Favorites, "fav1");
    let outcome = engine.synchronize(&[SyncableTable::Favorites]);
    assert!(outcome.success);
    assert_eq!(outcome.report.table(SyncableTable::Favorites).skipped, 1);

    let row = db
        .get_by_server_id(Collection::FAVORITES, "fav1")
        .unwrap()
        .unwrap();
    assert_eq!(row.sync_status, SyncStatus::Deleted);
}

#[test]
fn non_pushable_tables_are_refused() {
    let db = TestDatabase::memory();
    let engine = loopback_engine(Arc::new(FakeBackend::new()), db.handle());
    assert!(matches!(
        engine.pending_changes(SyncableTable::Categories),
        Err(SyncError::NotPushable(SyncableTable::Categories))
    ));
}

#[test]
fn concurrent_identical_calls_issue_one_pull() {
    let db = TestDatabase::memory();
    let transport = MockTransport::new();
    transport.set_pull_response(PullResponse::new(42));
    transport.set_pull_delay(Duration::from_millis(300));
    let engine = Arc::new(SyncEngine::new(
        SyncConfig::default(),
        transport,
        DatabaseApplier::new(db.handle()),
    ));

    let callers = 4;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // Same set, different order and duplicates.
                let tables = if i % 2 == 0 {
                    vec![SyncableTable::CarBrands, SyncableTable::Products]
                } else {
                    vec![
                        SyncableTable::Products,
                        SyncableTable::CarBrands,
                        SyncableTable::Products,
                    ]
                };
                engine.synchronize(&tables)
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.join().unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.timestamp, Some(42));
    }
    assert_eq!(engine.transport().pull_count(), 1);
    assert_eq!(engine.stats().coalesced_calls, callers as u64 - 1);
}

#[test]
fn different_table_sets_are_serialized() {
    let backend = Arc::new(FakeBackend::new());
    backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota"));
    backend.upsert(SyncableTable::Categories, category("cat1", "Engine", 1));
    let db = TestDatabase::file();
    let engine = Arc::new(loopback_engine(Arc::clone(&backend), db.handle()));

    let other = Arc::clone(&engine);
    let handle = thread::spawn(move || other.synchronize(&[SyncableTable::Categories]));
    let brands = engine.synchronize(BRANDS);
    let categories = handle.join().unwrap();

    assert!(brands.success && categories.success);
    assert_eq!(backend.pull_count(), 2);
    assert_eq!(db.count(Collection::CATEGORIES).unwrap(), 1);
    assert_eq!(db.count(Collection::CAR_BRANDS).unwrap(), 1);
}

#[test]
fn state_survives_reopen() {
    let backend = Arc::new(FakeBackend::new());
    backend.upsert(SyncableTable::CarModels, car_model("cm1", "cb1", "Corolla"));
    let db = TestDatabase::file();
    {
        let engine = loopback_engine(Arc::clone(&backend), db.handle());
        assert!(engine.synchronize(&[SyncableTable::CarModels]).success);
    }

    let db = db.reopen();
    let engine = loopback_engine(Arc::clone(&backend), db.handle());
    let cursor = engine.applier().cursors().get(SyncableTable::CarModels).unwrap();
    assert!(cursor > 0);

    let model = db
        .get_by_server_id(Collection::CAR_MODELS, "cm1")
        .unwrap()
        .unwrap();
    assert_eq!(model.text("brand_server_id"), Some("cb1"));
    assert_eq!(model.text("variants_json"), Some(r#"["base","sport"]"#));

    assert!(engine.synchronize(&[SyncableTable::CarModels]).success);
    assert_eq!(backend.pull_requests()[1].last_pulled_at, cursor);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn applying_a_response_twice_changes_nothing(response in pull_response_strategy()) {
        let db = TestDatabase::memory();
        let transport = MockTransport::new();
        transport.set_pull_response(response);
        let engine = SyncEngine::new(
            SyncConfig::default(),
            transport,
            DatabaseApplier::new(db.handle()),
        );
        let tables = [SyncableTable::CarBrands, SyncableTable::Products];

        prop_assert!(engine.synchronize(&tables).success);
        let brands = db.list(Collection::CAR_BRANDS).unwrap();
        let products = db.list(Collection::PRODUCTS).unwrap();

        let again = engine.synchronize(&tables);
        prop_assert!(again.success);
        prop_assert_eq!(again.report.total_applied(), 0);
        prop_assert_eq!(db.list(Collection::CAR_BRANDS).unwrap(), brands);
        prop_assert_eq!(db.list(Collection::PRODUCTS).unwrap(), products);
    }
}
