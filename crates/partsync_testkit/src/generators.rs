//! Property-based test generators using proptest.

use crate::records::{car_brand, product, stamped};
use partsync_protocol::{PullResponse, RemoteRecord, SyncableTable, TableChanges};
use proptest::prelude::*;

/// Strategy for backend ids (`cb_3f9a`, ...).
pub fn server_id_strategy(prefix: &'static str) -> impl Strategy<Value = String> {
    "[a-f0-9]{4,12}".prop_map(move |suffix| format!("{prefix}_{suffix}"))
}

/// Strategy for epoch-millisecond timestamps between 2020 and 2030.
pub fn timestamp_strategy() -> impl Strategy<Value = i64> {
    1_577_836_800_000i64..1_893_456_000_000
}

/// Strategy for display names, Arabic included.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z][A-Za-z0-9 ]{0,20}",
        "[\u{0621}-\u{064A}]{1,12}",
    ]
}

/// Strategy for stamped car brands.
pub fn car_brand_strategy() -> impl Strategy<Value = RemoteRecord> {
    (server_id_strategy("cb"), name_strategy(), timestamp_strategy())
        .prop_map(|(id, name, ts)| stamped(car_brand(&id, &name), ts, ts))
}

/// Strategy for stamped products.
pub fn product_strategy() -> impl Strategy<Value = RemoteRecord> {
    (
        server_id_strategy("prod"),
        name_strategy(),
        0.0f64..10_000.0,
        timestamp_strategy(),
    )
        .prop_map(|(id, name, price, ts)| stamped(product(&id, &name, price), ts, ts))
}

/// Strategy for a pull response creating car brands and products.
///
/// Ids may repeat within a table, which the apply must absorb.
pub fn pull_response_strategy() -> impl Strategy<Value = PullResponse> {
    (
        timestamp_strategy(),
        prop::collection::vec(car_brand_strategy(), 0..8),
        prop::collection::vec(product_strategy(), 0..8),
    )
        .prop_map(|(timestamp, brands, products)| {
            PullResponse::new(timestamp)
                .with_table(
                    SyncableTable::CarBrands,
                    TableChanges {
                        created: brands,
                        ..TableChanges::default()
                    },
                )
                .with_table(
                    SyncableTable::Products,
                    TableChanges {
                        created: products,
                        ..TableChanges::default()
                    },
                )
        })
}
