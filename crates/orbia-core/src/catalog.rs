//! # Catalog Filter Model
//!
//! Typed filters for the catalog query engine, and the parser that turns
//! raw query-string parameters into them.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ?q=cola&stock=LOW&sort=price&dir=asc&page=2                            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  CatalogQueryParams   (strings; "" means absent)                        │
//! │        │  parse_query(&CatalogLimits)   ← rejects before any I/O         │
//! │        ▼                                                                │
//! │  CatalogQuery { filters: CatalogFilters, pagination: Pagination }       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  orbia-db: one predicate, used by both COUNT and SELECT                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::Item;
use crate::validation::validate_uuid;

/// Longest accepted search string, in characters.
pub const MAX_SEARCH_LEN: usize = 120;

/// Upper bound of the low-stock threshold.
pub const MAX_LOW_STOCK_THRESHOLD: i64 = 9_999;

/// Most ids a selection may carry, whatever the export cap. Each id is one
/// bound SQL parameter.
pub const MAX_SELECTED_ITEMS: i64 = 10_000;

// =============================================================================
// Limits
// =============================================================================

/// Tunables of the catalog engine, loaded from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Most rows an export may return before it is refused.
    pub export_row_cap: i64,
    pub default_low_stock_threshold: i64,
}

impl CatalogLimits {
    /// Largest accepted explicit selection.
    pub fn selection_cap(&self) -> i64 {
        self.export_row_cap.min(MAX_SELECTED_ITEMS)
    }
}

impl Default for CatalogLimits {
    fn default() -> Self {
        CatalogLimits {
            default_page_size: 20,
            max_page_size: 100,
            export_row_cap: 5_000,
            default_low_stock_threshold: 5,
        }
    }
}

// =============================================================================
// Filter Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Active,
    Inactive,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StockFilter {
    #[default]
    All,
    /// Stock total > 0.
    InStock,
    /// Stock total = 0.
    OutOfStock,
    /// Stock total <= threshold (includes zero).
    Low { threshold: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Name,
    Price,
    Stock,
    #[default]
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Every predicate and ordering the engine understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFilters {
    /// Case-insensitive substring of name, code or description.
    pub search: Option<String>,
    pub category_id: Option<String>,
    pub status: StatusFilter,
    /// Bounds on the stored manual price.
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub stock: StockFilter,
    pub sort: SortKey,
    pub direction: SortDirection,
    /// Restrict to an explicit selection (selected-rows export).
    pub item_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum Pagination {
    Page { page: u32, page_size: u32 },
    /// Every match, refused when the count exceeds the export cap.
    ExportAll,
}

impl Pagination {
    /// `(limit, offset)` for a page, `None` for an export.
    pub fn limit_offset(&self) -> Option<(i64, i64)> {
        match *self {
            Pagination::Page { page, page_size } => {
                let size = i64::from(page_size);
                Some((size, (i64::from(page.max(1)) - 1) * size))
            }
            Pagination::ExportAll => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    pub filters: CatalogFilters,
    pub pagination: Pagination,
}

impl CatalogQuery {
    pub fn page(filters: CatalogFilters, page: u32, page_size: u32) -> Self {
        CatalogQuery {
            filters,
            pagination: Pagination::Page { page, page_size },
        }
    }

    pub fn export(filters: CatalogFilters) -> Self {
        CatalogQuery {
            filters,
            pagination: Pagination::ExportAll,
        }
    }

    /// Rejects values the parser would never produce (hand-built queries).
    pub fn validate(&self, limits: &CatalogLimits) -> Result<(), ValidationError> {
        let f = &self.filters;
        if let Some(search) = &f.search {
            if search.chars().count() > MAX_SEARCH_LEN {
                return Err(ValidationError::TooLong {
                    field: "q".to_string(),
                    max: MAX_SEARCH_LEN,
                });
            }
        }
        for (field, bound) in [("minPrice", f.min_price), ("maxPrice", f.max_price)] {
            if bound.is_some_and(|b| b.is_negative()) {
                return Err(ValidationError::out_of_range(field, 0, i64::MAX));
            }
        }
        if let (Some(min), Some(max)) = (f.min_price, f.max_price) {
            if min > max {
                return Err(ValidationError::invalid("minPrice", "must not exceed maxPrice"));
            }
        }
        if let StockFilter::Low { threshold } = f.stock {
            if !(0..=MAX_LOW_STOCK_THRESHOLD).contains(&threshold) {
                return Err(ValidationError::out_of_range(
                    "lowStockThreshold",
                    0,
                    MAX_LOW_STOCK_THRESHOLD,
                ));
            }
        }
        if let Pagination::Page { page, page_size } = self.pagination {
            if page < 1 {
                return Err(ValidationError::out_of_range("page", 1, i64::from(u32::MAX)));
            }
            if page_size < 1 || page_size > limits.max_page_size {
                return Err(ValidationError::out_of_range(
                    "pageSize",
                    1,
                    i64::from(limits.max_page_size),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Output Rows
// =============================================================================

/// One listing row: the item plus values computed for the current mode.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRow {
    #[serde(flatten)]
    pub item: Item,
    /// Stock under the tenant's current mode.
    pub stock_total: i64,
    /// Unit price a sale in the store currency would charge right now.
    pub estimated_sale_price: Money,
    /// True when pricing failed and the manual price is shown instead.
    pub price_is_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    pub rows: Vec<CatalogRow>,
    /// Match count with no pagination applied.
    pub total: i64,
}

impl CatalogPage {
    pub fn empty() -> Self {
        CatalogPage {
            rows: Vec::new(),
            total: 0,
        }
    }
}

// =============================================================================
// Search Pattern
// =============================================================================

/// Separates the fields inside [`search_text`]; control characters never
/// reach a pattern, so a needle cannot match across two fields.
const SEARCH_FIELD_SEPARATOR: char = '\u{1f}';

/// Folded text the catalog search matches against: name, code and
/// description, lowercased with Unicode rules.
///
/// SQLite's `LOWER` only folds ASCII, so the folding happens here, when an
/// item is written, and the stored column is compared with a pattern folded
/// the same way by [`like_pattern`].
///
/// ```rust
/// use orbia_core::catalog::search_text;
///
/// assert_eq!(search_text("LÁPIZ Negro", Some("LAP-1"), None), "lápiz negro\u{1f}lap-1\u{1f}");
/// ```
pub fn search_text(name: &str, sku: Option<&str>, description: Option<&str>) -> String {
    let mut text = name.to_lowercase();
    text.push(SEARCH_FIELD_SEPARATOR);
    text.push_str(&sku.unwrap_or_default().to_lowercase());
    text.push(SEARCH_FIELD_SEPARATOR);
    text.push_str(&description.unwrap_or_default().to_lowercase());
    text
}

/// Lowercased `%needle%` LIKE pattern with `\` escaping `%`, `_` and `\`.
///
/// Folds with the same Unicode rules as [`search_text`] and drops control
/// characters.
///
/// ```rust
/// use orbia_core::catalog::like_pattern;
///
/// assert_eq!(like_pattern("Cola"), "%cola%");
/// assert_eq!(like_pattern("ÑANDÚ"), "%ñandú%");
/// assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
/// ```
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars().filter(|c| !c.is_control()) {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// =============================================================================
// Query-String Parsing
// =============================================================================

/// Catalog parameters as received over HTTP. Every field is optional and
/// blank values count as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogQueryParams {
    pub q: Option<String>,
    pub category_id: Option<String>,
    pub status: Option<String>,
    /// Legacy alias of `status`.
    pub state: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub stock: Option<String>,
    pub low_stock_threshold: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_int(field: &str, raw: &str) -> Result<i64, ValidationError> {
    raw.parse::<i64>()
        .map_err(|_| ValidationError::invalid(field, "must be an integer"))
}

fn parse_price(field: &str, raw: &str) -> Result<Money, ValidationError> {
    let value = Decimal::from_str(raw).map_err(|_| ValidationError::invalid(field, "must be a number"))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::out_of_range(field, 0, i64::MAX));
    }
    Money::from_decimal(value).ok_or_else(|| ValidationError::invalid(field, "is too large"))
}

impl CatalogQueryParams {
    /// Filters only, for callers that paginate themselves (exports).
    pub fn parse_filters(&self, limits: &CatalogLimits) -> Result<CatalogFilters, ValidationError> {
        let search = match present(&self.q) {
            Some(q) if q.chars().count() > MAX_SEARCH_LEN => {
                return Err(ValidationError::TooLong {
                    field: "q".to_string(),
                    max: MAX_SEARCH_LEN,
                })
            }
            other => other.map(str::to_string),
        };

        let category_id = match present(&self.category_id) {
            Some(id) => {
                validate_uuid("categoryId", id)?;
                Some(id.to_string())
            }
            None => None,
        };

        let status = match present(&self.status).or_else(|| present(&self.state)) {
            None => StatusFilter::default(),
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "active" => StatusFilter::Active,
                "inactive" => StatusFilter::Inactive,
                "all" => StatusFilter::All,
                _ => return Err(ValidationError::invalid("status", "expected active, inactive or all")),
            },
        };

        let min_price = present(&self.min_price)
            .map(|raw| parse_price("minPrice", raw))
            .transpose()?;
        let max_price = present(&self.max_price)
            .map(|raw| parse_price("maxPrice", raw))
            .transpose()?;

        let threshold = match present(&self.low_stock_threshold) {
            None => limits.default_low_stock_threshold,
            Some(raw) => {
                let t = parse_int("lowStockThreshold", raw)?;
                if !(0..=MAX_LOW_STOCK_THRESHOLD).contains(&t) {
                    return Err(ValidationError::out_of_range(
                        "lowStockThreshold",
                        0,
                        MAX_LOW_STOCK_THRESHOLD,
                    ));
                }
                t
            }
        };

        let stock = match present(&self.stock) {
            None => StockFilter::All,
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "all" => StockFilter::All,
                "in" => StockFilter::InStock,
                "out" => StockFilter::OutOfStock,
                "low" => StockFilter::Low { threshold },
                _ => return Err(ValidationError::invalid("stock", "expected all, in, out or low")),
            },
        };

        let sort = match present(&self.sort) {
            None => SortKey::default(),
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "name" => SortKey::Name,
                "price" => SortKey::Price,
                "stock" => SortKey::Stock,
                "createdat" | "created_at" => SortKey::CreatedAt,
                _ => {
                    return Err(ValidationError::invalid(
                        "sort",
                        "expected name, price, stock or createdAt",
                    ))
                }
            },
        };

        let direction = match present(&self.dir) {
            None => SortDirection::default(),
            Some(d) => match d.to_ascii_lowercase().as_str() {
                "asc" => SortDirection::Asc,
                "desc" => SortDirection::Desc,
                _ => return Err(ValidationError::invalid("dir", "expected asc or desc")),
            },
        };

        let filters = CatalogFilters {
            search,
            category_id,
            status,
            min_price,
            max_price,
            stock,
            sort,
            direction,
            item_ids: None,
        };

        // bounds and threshold re-checked in one place
        CatalogQuery::export(filters.clone()).validate(limits)?;
        Ok(filters)
    }

    /// Full paginated query.
    pub fn parse_query(&self, limits: &CatalogLimits) -> Result<CatalogQuery, ValidationError> {
        let filters = self.parse_filters(limits)?;

        let page = match present(&self.page) {
            None => 1,
            Some(raw) => parse_int("page", raw)?,
        };
        if page < 1 || page > i64::from(u32::MAX) {
            return Err(ValidationError::out_of_range("page", 1, i64::from(u32::MAX)));
        }

        let max = i64::from(limits.max_page_size);
        let page_size = match present(&self.page_size) {
            None => i64::from(limits.default_page_size.min(limits.max_page_size)),
            Some(raw) => parse_int("pageSize", raw)?,
        };
        if !(1..=max).contains(&page_size) {
            return Err(ValidationError::out_of_range("pageSize", 1, max));
        }

        Ok(CatalogQuery::page(filters, page as u32, page_size as u32))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
