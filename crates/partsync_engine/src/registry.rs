//! Table registry: one descriptor per replicated table.
//!
//! The descriptor ties a [`SyncableTable`] to its local [`Collection`], its
//! explicit field map, and whether the device may push it. The mapper,
//! the applier and the push phase all resolve tables through here.

use partsync_protocol::SyncableTable;
use partsync_store::Collection;

/// How a declared field is converted between representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// JSON string ⇄ TEXT.
    Text,
    /// JSON integer ⇄ INTEGER.
    Integer,
    /// JSON number ⇄ REAL.
    Real,
    /// JSON boolean ⇄ INTEGER 0/1.
    Bool,
    /// JSON array or object ⇄ TEXT holding its encoding.
    Json,
}

/// One declared field: remote name, local column, conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    /// Field name in the backend record.
    pub remote: &'static str,
    /// Column name in the local collection.
    pub local: &'static str,
    /// Conversion.
    pub kind: FieldKind,
}

const fn field(remote: &'static str, local: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        remote,
        local,
        kind,
    }
}

const fn text(name: &'static str) -> FieldSpec {
    field(name, name, FieldKind::Text)
}

/// A foreign key: `brand_id` is stored as `brand_server_id`.
const fn reference(remote: &'static str, local: &'static str) -> FieldSpec {
    field(remote, local, FieldKind::Text)
}

/// Everything the engine knows about one replicated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    /// The table.
    pub table: SyncableTable,
    /// Local collection backing it.
    pub collection: Collection,
    /// Declared fields, in column order.
    pub fields: &'static [FieldSpec],
    /// Whether locally originated changes are pushed upstream.
    pub pushable: bool,
}

static CAR_BRANDS: TableDescriptor = TableDescriptor {
    table: SyncableTable::CarBrands,
    collection: Collection::CAR_BRANDS,
    fields: &[
        text("name"),
        text("name_ar"),
        text("logo"),
        reference("distributor_id", "distributor_server_id"),
    ],
    pushable: false,
};

static CAR_MODELS: TableDescriptor = TableDescriptor {
    table: SyncableTable::CarModels,
    collection: Collection::CAR_MODELS,
    fields: &[
        reference("brand_id", "brand_server_id"),
        text("name"),
        text("name_ar"),
        field("year_start", "year_start", FieldKind::Integer),
        field("year_end", "year_end", FieldKind::Integer),
        text("image_url"),
        text("description"),
        text("description_ar"),
        field("variants", "variants_json", FieldKind::Json),
    ],
    pushable: false,
};

static PRODUCT_BRANDS: TableDescriptor = TableDescriptor {
    table: SyncableTable::ProductBrands,
    collection: Collection::PRODUCT_BRANDS,
    fields: &[
        text("name"),
        text("name_ar"),
        text("logo"),
        text("country_of_origin"),
        text("country_of_origin_ar"),
        reference("supplier_id", "supplier_server_id"),
    ],
    pushable: false,
};

static CATEGORIES: TableDescriptor = TableDescriptor {
    table: SyncableTable::Categories,
    collection: Collection::CATEGORIES,
    fields: &[
        text("name"),
        text("name_ar"),
        reference("parent_id", "parent_server_id"),
        text("icon"),
        text("image_data"),
        field("sort_order", "sort_order", FieldKind::Integer),
    ],
    pushable: false,
};

static PRODUCTS: TableDescriptor = TableDescriptor {
    table: SyncableTable::Products,
    collection: Collection::PRODUCTS,
    fields: &[
        text("name"),
        text("name_ar"),
        text("description"),
        text("description_ar"),
        field("price", "price", FieldKind::Real),
        text("sku"),
        reference("product_brand_id", "product_brand_server_id"),
        reference("category_id", "category_server_id"),
        text("image_url"),
        field("images", "images_json", FieldKind::Json),
        field("car_model_ids", "car_model_server_ids_json", FieldKind::Json),
        field("stock_quantity", "stock_quantity", FieldKind::Integer),
        field("hidden_status", "is_hidden", FieldKind::Bool),
        reference("added_by_admin_id", "added_by_admin_server_id"),
    ],
    pushable: false,
};

static FAVORITES: TableDescriptor = TableDescriptor {
    table: SyncableTable::Favorites,
    collection: Collection::FAVORITES,
    fields: &[
        reference("user_id", "user_server_id"),
        reference("product_id", "product_server_id"),
    ],
    pushable: true,
};

static PROMOTIONS: TableDescriptor = TableDescriptor {
    table: SyncableTable::Promotions,
    collection: Collection::PROMOTIONS,
    fields: &[
        text("title"),
        text("title_ar"),
        text("image"),
        text("promotion_type"),
        field("is_active", "is_active", FieldKind::Bool),
        reference("target_product_id", "target_product_server_id"),
        reference("target_car_model_id", "target_car_model_server_id"),
        field("sort_order", "sort_order", FieldKind::Integer),
    ],
    pushable: false,
};

static BUNDLE_OFFERS: TableDescriptor = TableDescriptor {
    table: SyncableTable::BundleOffers,
    collection: Collection::BUNDLE_OFFERS,
    fields: &[
        text("name"),
        text("name_ar"),
        text("description"),
        text("description_ar"),
        field("discount_percentage", "discount_percentage", FieldKind::Real),
        reference("target_car_model_id", "target_car_model_server_id"),
        field("product_ids", "product_server_ids_json", FieldKind::Json),
        text("image"),
        field("is_active", "is_active", FieldKind::Bool),
    ],
    pushable: false,
};

/// Returns the descriptor of a table.
pub fn descriptor(table: SyncableTable) -> &'static TableDescriptor {
    match table {
        SyncableTable::CarBrands => &CAR_BRANDS,
        SyncableTable::CarModels => &CAR_MODELS,
        SyncableTable::ProductBrands => &PRODUCT_BRANDS,
        SyncableTable::Categories => &CATEGORIES,
        SyncableTable::Products => &PRODUCTS,
        SyncableTable::Favorites => &FAVORITES,
        SyncableTable::Promotions => &PROMOTIONS,
        SyncableTable::BundleOffers => &BUNDLE_OFFERS,
    }
}

/// Resolves a wire name. Unknown names yield `None` so callers can skip them.
pub fn resolve_name(name: &str) -> Option<&'static TableDescriptor> {
    SyncableTable::from_name(name).map(descriptor)
}

/// Iterates over the tables the device pushes.
pub fn pushable() -> impl Iterator<Item = &'static TableDescriptor> {
    SyncableTable::ALL
        .into_iter()
        .map(descriptor)
        .filter(|d| d.pushable)
}
