//! # Catalog Query Engine
//!
//! Paginated, filtered, sorted item listings and capped exports.
//!
//! ## One Predicate, Two Statements
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CatalogQuery                                                           │
//! │       │                                                                 │
//! │       ├── load_context → StockMode → StockExpression                    │
//! │       │                                                                 │
//! │       │   push_source(): FROM products p [LEFT JOIN branch aggregate]   │
//! │       │                  WHERE tenant AND search AND category AND ...   │
//! │       │                       │                                         │
//! │       │        ┌──────────────┴──────────────┐                          │
//! │       │        ▼                             ▼                          │
//! │       │  SELECT COUNT(*) ...           SELECT cols, stock_total ...     │
//! │       │  (total)                       ORDER BY key, p.id LIMIT/OFFSET  │
//! │       │                                                                 │
//! │       └── estimated price per row through the pricing resolver,         │
//! │           rates cached for the page, manual price on failure            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both statements run in one read transaction, so `total` and `rows` see
//! the same snapshot. The stock expression is the ledger's own
//! ([`StockExpression`]); a listing can never disagree with
//! `get_item_stock`.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use orbia_core::catalog::{
    like_pattern, CatalogFilters, CatalogLimits, CatalogPage, CatalogQuery, CatalogQueryParams,
    CatalogRow, Pagination, SortKey, StatusFilter, StockFilter,
};
use orbia_core::{CoreError, Item};

use crate::error::{DbError, EngineResult};
use crate::repository::product::ITEM_COLUMNS;
use crate::repository::stock::StockExpression;
use crate::repository::tenant::load_context;
use crate::services::pricing::{estimate_on, RateCache};

#[derive(Debug, sqlx::FromRow)]
struct CatalogItemRow {
    #[sqlx(flatten)]
    item: Item,
    stock_total: i64,
}

/// Pushes FROM, JOIN and WHERE. The only place the predicate is written.
fn push_source(
    qb: &mut QueryBuilder<'_, Sqlite>,
    tenant_id: &str,
    expr: StockExpression,
    filters: &CatalogFilters,
) {
    qb.push(" FROM products p");
    expr.push_join(qb, tenant_id);

    qb.push(" WHERE p.tenant_id = ");
    qb.push_bind(tenant_id.to_string());

    if let Some(search) = &filters.search {
        qb.push(" AND p.search_text LIKE ");
        qb.push_bind(like_pattern(search));
        qb.push(" ESCAPE '\\'");
    }

    if let Some(category_id) = &filters.category_id {
        qb.push(" AND p.category_id = ");
        qb.push_bind(category_id.clone());
    }

    match filters.status {
        StatusFilter::Active => {
            qb.push(" AND p.is_active = 1");
        }
        StatusFilter::Inactive => {
            qb.push(" AND p.is_active = 0");
        }
        StatusFilter::All => {}
    }

    if let Some(min) = filters.min_price {
        qb.push(" AND p.price_cents >= ");
        qb.push_bind(min.cents());
    }
    if let Some(max) = filters.max_price {
        qb.push(" AND p.price_cents <= ");
        qb.push_bind(max.cents());
    }

    let stock = expr.column();
    match filters.stock {
        StockFilter::All => {}
        StockFilter::InStock => {
            qb.push(format!(" AND {} > 0", stock));
        }
        StockFilter::OutOfStock => {
            qb.push(format!(" AND {} = 0", stock));
        }
        StockFilter::Low { threshold } => {
            qb.push(format!(" AND {} <= ", stock));
            qb.push_bind(threshold);
        }
    }

    if let Some(ids) = &filters.item_ids {
        qb.push(" AND p.id IN (");
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(id.clone());
        }
        list.push_unseparated(")");
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, expr: StockExpression, filters: &CatalogFilters) {
    let key = match filters.sort {
        SortKey::Name => "LOWER(p.name)",
        SortKey::Price => "p.price_cents",
        SortKey::Stock => expr.column(),
        SortKey::CreatedAt => "p.created_at",
    };
    let dir = filters.direction.as_sql();
    // id breaks ties so pages never overlap
    qb.push(format!(" ORDER BY {key} {dir}, p.id {dir}"));
}

/// Catalog listing and export.
///
/// ## Usage
/// ```rust,ignore
/// let query = params.parse_query(db.catalog_limits())?;
/// let page = db.catalog().query_items(&tenant_id, &query).await?;
/// println!("{} of {}", page.rows.len(), page.total);
/// ```
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
    limits: CatalogLimits,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool, limits: CatalogLimits) -> Self {
        CatalogRepository { pool, limits }
    }

    pub fn limits(&self) -> &CatalogLimits {
        &self.limits
    }

    /// Runs a typed query.
    ///
    /// `Pagination::ExportAll` counts first and fails with `ExportTooLarge`
    /// when the match count exceeds the export cap; nothing is truncated.
    pub async fn query_items(&self, tenant_id: &str, query: &CatalogQuery) -> EngineResult<CatalogPage> {
        query.validate(&self.limits)?;
        let filters = &query.filters;

        if let Some(ids) = &filters.item_ids {
            if ids.is_empty() {
                return Ok(CatalogPage::empty());
            }
            let selected = i64::try_from(ids.len()).unwrap_or(i64::MAX);
            let cap = self.limits.selection_cap();
            if selected > cap {
                info!(tenant_id = %tenant_id, selected, cap, "Selection refused");
                return Err(CoreError::ExportTooLarge { matched: selected, cap }.into());
            }
        }

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let ctx = load_context(&mut tx, tenant_id).await?;
        let expr = StockExpression::for_mode(ctx.mode);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        push_source(&mut count, tenant_id, expr, filters);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        if query.pagination == Pagination::ExportAll && total > self.limits.export_row_cap {
            info!(
                tenant_id = %tenant_id,
                matched = total,
                cap = self.limits.export_row_cap,
                "Export refused"
            );
            return Err(CoreError::ExportTooLarge {
                matched: total,
                cap: self.limits.export_row_cap,
            }
            .into());
        }

        let mut data = QueryBuilder::<Sqlite>::new("SELECT ");
        data.push(ITEM_COLUMNS);
        data.push(format!(", {} AS stock_total", expr.column()));
        push_source(&mut data, tenant_id, expr, filters);
        push_order(&mut data, expr, filters);
        if let Some((limit, offset)) = query.pagination.limit_offset() {
            data.push(" LIMIT ");
            data.push_bind(limit);
            data.push(" OFFSET ");
            data.push_bind(offset);
        }

        let fetched: Vec<CatalogItemRow> = data.build_query_as().fetch_all(&mut *tx).await?;

        let mut cache = RateCache::new();
        let mut rows = Vec::with_capacity(fetched.len());
        for row in fetched {
            let (estimated_sale_price, price_is_fallback) =
                estimate_on(&mut tx, &mut cache, tenant_id, ctx.currency(), &row.item).await?;
            rows.push(CatalogRow {
                item: row.item,
                stock_total: row.stock_total,
                estimated_sale_price,
                price_is_fallback,
            });
        }

        tx.commit().await.map_err(DbError::from)?;

        debug!(
            tenant_id = %tenant_id,
            mode = ctx.mode.as_str(),
            total,
            returned = rows.len(),
            "Catalog query"
        );
        Ok(CatalogPage { rows, total })
    }

    /// Parses raw query-string parameters, then runs the page query.
    pub async fn query_params(&self, tenant_id: &str, params: &CatalogQueryParams) -> EngineResult<CatalogPage> {
        let query = params.parse_query(&self.limits)?;
        self.query_items(tenant_id, &query).await
    }

    /// Every match of the filter parameters, subject to the export cap.
    pub async fn export_filtered(&self, tenant_id: &str, params: &CatalogQueryParams) -> EngineResult<CatalogPage> {
        let filters = params.parse_filters(&self.limits)?;
        self.query_items(tenant_id, &CatalogQuery::export(filters)).await
    }

    /// The explicitly selected items, subject to the export cap.
    pub async fn export_selected(&self, tenant_id: &str, item_ids: Vec<String>) -> EngineResult<CatalogPage> {
        let filters = CatalogFilters {
            item_ids: Some(item_ids),
            ..CatalogFilters::default()
        };
        self.query_items(tenant_id, &CatalogQuery::export(filters)).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::stock::StockAdjustment;
    use orbia_core::catalog::{SortDirection, StockFilter};
    use orbia_core::{ItemDraft, Money, MovementReason, PricingMode, StockMode, Tenant};
    use rust_decimal::Decimal;

    async fn setup() -> (Database, Tenant) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create("Librería", "ARS", StockMode::Global)
            .await
            .unwrap();
        (db, tenant)
    }

    async fn add(db: &Database, tenant: &Tenant, name: &str, sku: &str, price: i64, stock: i64) -> Item {
        db.items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: name.to_string(),
                    sku: Some(sku.to_string()),
                    price_cents: price,
                    initial_stock: Some(stock),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap()
    }

    fn names(page: &CatalogPage) -> Vec<&str> {
        page.rows.iter().map(|r| r.item.name.as_str()).collect()
    }

    fn filters() -> CatalogFilters {
        CatalogFilters::default()
    }

    #[tokio::test]
    async fn test_total_matches_filtered_rows() {
        let (db, tenant) = setup().await;
        add(&db, &tenant, "Cuaderno A4", "CU-A4", 1_500, 10).await;
        add(&db, &tenant, "Cuaderno A5", "CU-A5", 1_200, 0).await;
        add(&db, &tenant, "Lápiz", "LP-1", 300, 3).await;
        add(&db, &tenant, "Goma", "GM-1", 200, 50).await;

        let f = CatalogFilters {
            min_price: Some(Money::from_cents(250)),
            stock: StockFilter::InStock,
            sort: SortKey::Price,
            direction: SortDirection::Asc,
            ..filters()
        };
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(f.clone(), 1, 1))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(names(&page), vec!["Lápiz"]);

        let page2 = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(f, 2, 1))
            .await
            .unwrap();
        assert_eq!(page2.total, 2);
        assert_eq!(names(&page2), vec!["Cuaderno A4"]);
    }

    #[tokio::test]
    async fn test_search_folds_accented_capitals() {
        let (db, tenant) = setup().await;
        add(&db, &tenant, "LÁPIZ NEGRO", "LAP-1", 500, 1).await;
        let nandu = add(&db, &tenant, "Ñandú", "NAN-1", 900, 1).await;

        let search = |s: &str| CatalogFilters {
            search: Some(s.to_string()),
            ..filters()
        };
        for needle in ["lápiz", "LÁPIZ", "Lápiz Negro"] {
            let page = db
                .catalog()
                .query_items(&tenant.id, &CatalogQuery::page(search(needle), 1, 20))
                .await
                .unwrap();
            assert_eq!(names(&page), vec!["LÁPIZ NEGRO"], "needle {needle}");
        }
        for needle in ["ñandú", "ÑANDÚ"] {
            let page = db
                .catalog()
                .query_items(&tenant.id, &CatalogQuery::page(search(needle), 1, 20))
                .await
                .unwrap();
            assert_eq!(page.total, 1, "needle {needle}");
        }

        // edits refresh the folded text
        db.items()
            .update(
                &tenant.id,
                &nandu.id,
                ItemDraft {
                    name: "Peluche".to_string(),
                    sku: Some("NAN-1".to_string()),
                    description: Some("Ñandú de TELA".to_string()),
                    price_cents: 900,
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(search("ñandú de tela"), 1, 20))
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Peluche"]);
    }

    #[tokio::test]
    async fn test_search_name_code_description() {
        let (db, tenant) = setup().await;
        add(&db, &tenant, "Cuaderno", "CU-1", 1_000, 1).await;
        add(&db, &tenant, "Carpeta", "CP-1", 1_000, 1).await;
        add(&db, &tenant, "100% algodón", "TX_1", 1_000, 1).await;

        let search = |s: &str| CatalogFilters {
            search: Some(s.to_string()),
            sort: SortKey::Name,
            direction: SortDirection::Asc,
            ..filters()
        };
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(search("CUADER"), 1, 20))
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Cuaderno"]);

        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(search("cp-"), 1, 20))
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Carpeta"]);

        // wildcards are literal
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(search("%"), 1, 20))
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["100% algodón"]);
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(search("x_"), 1, 20))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_status_and_category_filters() {
        let (db, tenant) = setup().await;
        let cat = db.items().create_category(&tenant.id, "Papel", 0).await.unwrap();
        let a = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Resma".to_string(),
                    category_id: Some(cat.id.clone()),
                    price_cents: 5_000,
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();
        let b = add(&db, &tenant, "Regla", "RG-1", 800, 2).await;
        db.items().set_active(&tenant.id, &b.id, false).await.unwrap();

        let by_cat = CatalogFilters {
            category_id: Some(cat.id.clone()),
            ..filters()
        };
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(by_cat, 1, 20))
            .await
            .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].item.id, a.id);

        let inactive = CatalogFilters {
            status: StatusFilter::Inactive,
            ..filters()
        };
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(inactive, 1, 20))
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Regla"]);
    }

    #[tokio::test]
    async fn test_low_stock_includes_zero() {
        let (db, tenant) = setup().await;
        add(&db, &tenant, "Cero", "Z-0", 100, 0).await;
        add(&db, &tenant, "Tres", "Z-3", 100, 3).await;
        add(&db, &tenant, "Diez", "Z-10", 100, 10).await;

        let low = CatalogFilters {
            stock: StockFilter::Low { threshold: 3 },
            sort: SortKey::Stock,
            direction: SortDirection::Asc,
            ..filters()
        };
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(low, 1, 20))
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Cero", "Tres"]);

        let out = CatalogFilters {
            stock: StockFilter::OutOfStock,
            ..filters()
        };
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(out, 1, 20))
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Cero"]);
    }

    #[tokio::test]
    async fn test_by_branch_stock_expression_matches_ledger() {
        let (db, tenant) = setup().await;
        let item = add(&db, &tenant, "Mochila", "MC-1", 9_000, 7).await;
        let a = db.tenants().create_branch(&tenant.id, "Centro").await.unwrap();
        let b = db.tenants().create_branch(&tenant.id, "Norte").await.unwrap();
        db.tenants()
            .set_stock_mode(&tenant.id, StockMode::ByBranch)
            .await
            .unwrap();

        for (branch, delta) in [(&a.id, 2), (&b.id, 1)] {
            db.stock()
                .adjust_stock(StockAdjustment {
                    tenant_id: tenant.id.clone(),
                    item_id: item.id.clone(),
                    branch_id: Some(branch.clone()),
                    delta,
                    reason: MovementReason::Adjustment,
                    note: None,
                    actor_id: "u".to_string(),
                })
                .await
                .unwrap();
        }

        let low = CatalogFilters {
            stock: StockFilter::Low { threshold: 3 },
            ..filters()
        };
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(low, 1, 20))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].stock_total, 3);

        let ledger = db.stock().get_item_stock(&tenant.id, &item.id).await.unwrap();
        assert_eq!(ledger.total, page.rows[0].stock_total);
    }

    #[tokio::test]
    async fn test_export_cap_and_selection() {
        let db = Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_catalog_limits(CatalogLimits {
                export_row_cap: 2,
                ..CatalogLimits::default()
            });
        let tenant = db
            .tenants()
            .create("Librería", "ARS", StockMode::Global)
            .await
            .unwrap();
        let a = add(&db, &tenant, "A", "A-1", 100, 1).await;
        let b = add(&db, &tenant, "B", "B-1", 100, 1).await;
        add(&db, &tenant, "C", "C-1", 100, 1).await;

        let err = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::export(filters()))
            .await
            .unwrap_err();
        match err.as_domain() {
            Some(CoreError::ExportTooLarge { matched, cap }) => {
                assert_eq!(*matched, 3);
                assert_eq!(*cap, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let page = db
            .catalog()
            .export_selected(&tenant.id, vec![a.id.clone(), b.id.clone()])
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.rows.len(), 2);

        let empty = db.catalog().export_selected(&tenant.id, Vec::new()).await.unwrap();
        assert_eq!(empty.total, 0);
        assert!(empty.rows.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_selection_refused_before_query() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "A", "A-1", 100, 1).await;

        let mut ids: Vec<String> = (0..40_000).map(|n| format!("missing-{n}")).collect();
        ids.push(a.id.clone());
        let err = db.catalog().export_selected(&tenant.id, ids).await.unwrap_err();
        assert_eq!(err.code(), "EXPORT_TOO_LARGE");
        match err.as_domain() {
            Some(CoreError::ExportTooLarge { matched, cap }) => {
                assert_eq!(*matched, 40_001);
                assert_eq!(*cap, db.catalog_limits().export_row_cap);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // a selection at the cap still runs
        let cap = db.catalog_limits().selection_cap() as usize;
        let mut ids: Vec<String> = (1..cap).map(|n| format!("missing-{n}")).collect();
        ids.push(a.id.clone());
        let page = db.catalog().export_selected(&tenant.id, ids).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_estimated_price_and_fallback() {
        let (db, tenant) = setup().await;
        db.rates().upsert(None, "USD", "ARS", Decimal::from(1_000)).await.unwrap();
        db.items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Importado".to_string(),
                    pricing_mode: PricingMode::Margin,
                    price_cents: 1,
                    cost_amount_cents: Some(800),
                    cost_currency: Some("USD".to_string()),
                    margin_bps: Some(2_000),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();
        db.items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Sin cotización".to_string(),
                    price_cents: 4_200,
                    currency: Some("BRL".to_string()),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();

        let sorted = CatalogFilters {
            sort: SortKey::Name,
            direction: SortDirection::Asc,
            ..filters()
        };
        let page = db
            .catalog()
            .query_items(&tenant.id, &CatalogQuery::page(sorted, 1, 20))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let imported = &page.rows[0];
        assert_eq!(imported.estimated_sale_price, Money::from_major(10_000));
        assert!(!imported.price_is_fallback);

        let unpriced = &page.rows[1];
        assert_eq!(unpriced.estimated_sale_price.cents(), 4_200);
        assert!(unpriced.price_is_fallback);
    }

    #[tokio::test]
    async fn test_raw_params_rejected_before_io() {
        let (db, tenant) = setup().await;
        let params = CatalogQueryParams {
            page_size: Some("1000".to_string()),
            ..CatalogQueryParams::default()
        };
        let err = db.catalog().query_params(&tenant.id, &params).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let params = CatalogQueryParams {
            stock: Some("LOW".to_string()),
            low_stock_threshold: Some("2".to_string()),
            ..CatalogQueryParams::default()
        };
        add(&db, &tenant, "Poco", "P-1", 100, 2).await;
        add(&db, &tenant, "Mucho", "M-1", 100, 20).await;
        let page = db.catalog().query_params(&tenant.id, &params).await.unwrap();
        assert_eq!(names(&page), vec!["Poco"]);
    }
}
