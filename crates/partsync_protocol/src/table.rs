//! Replicated table identifiers.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A table that participates in replication.
///
/// The set is closed: the backend may report tables this client does not
/// know, but those arrive as plain strings and never become a
/// `SyncableTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncableTable {
    /// Vehicle manufacturers.
    CarBrands,
    /// Vehicle models, grouped under a car brand.
    CarModels,
    /// Part manufacturers.
    ProductBrands,
    /// Catalog categories (may nest via a parent).
    Categories,
    /// Catalog products.
    Products,
    /// Per-user favorite products. The only table the device originates.
    Favorites,
    /// Marketing sliders and banners.
    Promotions,
    /// Discounted product bundles.
    BundleOffers,
}

impl SyncableTable {
    /// Every replicated table.
    pub const ALL: [SyncableTable; 8] = [
        SyncableTable::CarBrands,
        SyncableTable::CarModels,
        SyncableTable::ProductBrands,
        SyncableTable::Categories,
        SyncableTable::Products,
        SyncableTable::Favorites,
        SyncableTable::Promotions,
        SyncableTable::BundleOffers,
    ];

    /// Tables pulled when the caller does not name any. Matches the
    /// backend's own default set.
    pub const DEFAULT_PULL: [SyncableTable; 5] = [
        SyncableTable::CarBrands,
        SyncableTable::CarModels,
        SyncableTable::ProductBrands,
        SyncableTable::Categories,
        SyncableTable::Products,
    ];

    /// Returns the wire name of the table.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncableTable::CarBrands => "car_brands",
            SyncableTable::CarModels => "car_models",
            SyncableTable::ProductBrands => "product_brands",
            SyncableTable::Categories => "categories",
            SyncableTable::Products => "products",
            SyncableTable::Favorites => "favorites",
            SyncableTable::Promotions => "promotions",
            SyncableTable::BundleOffers => "bundle_offers",
        }
    }

    /// Looks up a table by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for SyncableTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncableTable {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s.trim()).ok_or_else(|| ProtocolError::UnknownTable(s.to_string()))
    }
}
