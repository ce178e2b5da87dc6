//! Integration tests for the local store.

use partsync_protocol::SyncableTable;
use partsync_store::{
    Cart, Collection, CursorStore, Database, Favorites, LocalRecord, SyncStatus,
};
use std::sync::Arc;

fn product(server_id: &str, price: f64) -> LocalRecord {
    LocalRecord::new(server_id, 1_000, 2_000)
        .with("name", "Brake pad")
        .with("price", price)
        .with("is_hidden", false)
        .with("images_json", r#"["a.jpg","b.jpg"]"#)
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partsync.db");

    {
        let db = Arc::new(Database::open(&path).unwrap());
        db.transaction(|txn| {
            Collection::PRODUCTS.insert(txn, &product("p1", 19.5), SyncStatus::Synced)
        })
        .unwrap();
        CursorStore::new(Arc::clone(&db))
            .set(SyncableTable::Products, 5000)
            .unwrap();
        Cart::new(Arc::clone(&db)).add("p1", 2).unwrap();
        Favorites::new(db).toggle("u1", "p1").unwrap();
    }

    let db = Arc::new(Database::open(&path).unwrap());
    let row = db
        .get_by_server_id(Collection::PRODUCTS, "p1")
        .unwrap()
        .unwrap();
    assert_eq!(row.get("price").and_then(|v| v.as_real()), Some(19.5));
    assert_eq!(row.get("is_hidden").and_then(|v| v.as_bool()), Some(false));

    assert_eq!(
        CursorStore::new(Arc::clone(&db))
            .get(SyncableTable::Products)
            .unwrap(),
        5000
    );
    assert_eq!(Cart::new(Arc::clone(&db)).list().unwrap()[0].quantity, 2);
    assert!(Favorites::new(db).is_favorite("u1", "p1").unwrap());
}

#[test]
fn concurrent_writers_serialize() {
    let db = Arc::new(Database::open_in_memory().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                let record = product(&format!("p{i}"), f64::from(i));
                db.transaction(|txn| {
                    Collection::PRODUCTS.insert(txn, &record, SyncStatus::Synced)
                })
                .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.count(Collection::PRODUCTS).unwrap(), 8);
}
