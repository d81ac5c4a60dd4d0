//! # Sale Commit Pipeline
//!
//! Turns a cart into a persisted, priced, stock-consistent sale.
//!
//! ## Transaction Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  commit_sale(SaleDraft)                                                 │
//! │       │                                                                 │
//! │       ├── validate input (cart size, quantities, currency, notes)       │
//! │       │                                                                 │
//! │  BEGIN ── lock tenant row (write lock for the whole commit)             │
//! │       │                                                                 │
//! │       ├── 1. each line: item exists + active, unit price resolved       │
//! │       │      in the sale currency (or the MANUAL override)              │
//! │       ├── 2. subtotal, discount (≤ subtotal), surcharge, total          │
//! │       ├── 3. counter += 1 → V-000042                                    │
//! │       ├── 4. each line: ledger delta -qty, reason=sale, ref=sale id     │
//! │       │      any InsufficientStock → ROLLBACK everything                │
//! │       ├── 5. INSERT sales + sale_items (name / code snapshots)          │
//! │       │                                                                 │
//! │  COMMIT ──► SaleRecord                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dropping the transaction on any `?` rolls back: no counter bump, no
//! movement and no partial sale survive a failed commit.

use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use orbia_core::totals::SaleTotals;
use orbia_core::validation::{
    normalize_currency, validate_amount_cents, validate_cart_size, validate_notes, validate_quantity,
};
use orbia_core::{
    CoreError, Item, Money, MovementReason, PricingMode, Sale, SaleDraft, SaleItem, SaleRecord,
    ValidationError, SALE_COUNTER_KEY,
};

use crate::error::{DbError, EngineResult};
use crate::pool::begin_tenant_write;
use crate::repository::product::require_item;
use crate::repository::stock::{apply_delta, resolve_branch, DeltaRequest};
use crate::repository::tenant::{load_context, require_live_branch};
use crate::services::pricing::{resolve_on, RateCache};

/// Renders the receipt number of a counter value.
pub fn format_sale_number(seq: i64) -> String {
    format!("V-{:06}", seq)
}

/// Allocates the next sale number of a tenant. Never reused.
async fn next_sale_seq(conn: &mut SqliteConnection, tenant_id: &str) -> EngineResult<i64> {
    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO tenant_counters (tenant_id, key, value)
        VALUES (?1, ?2, 1)
        ON CONFLICT (tenant_id, key) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(tenant_id)
    .bind(SALE_COUNTER_KEY)
    .fetch_one(&mut *conn)
    .await?;
    Ok(seq)
}

/// A cart line after pricing.
struct PricedLine {
    item: Item,
    quantity: i64,
    unit_price: Money,
    line_total: Money,
}

/// Sale commit service.
///
/// ## Usage
/// ```rust,ignore
/// let record = db.checkout().commit_sale(draft).await?;
/// printer.print(&record);
/// ```
#[derive(Debug, Clone)]
pub struct CheckoutService {
    pool: SqlitePool,
}

impl CheckoutService {
    /// Creates a new CheckoutService.
    pub fn new(pool: SqlitePool) -> Self {
        CheckoutService { pool }
    }

    /// Commits a sale atomically. See the module docs for the steps.
    ///
    /// ## Errors
    /// `ItemNotFound`, `ItemInactive`, `InsufficientStock`, `RateNotFound`,
    /// `PricingConfigInvalid`, `BranchRequired`, `BranchNotFound`,
    /// `PriceOverrideNotAllowed`, validation errors, and retryable
    /// `STORE_BUSY` storage errors.
    pub async fn commit_sale(&self, draft: SaleDraft) -> EngineResult<SaleRecord> {
        validate_cart_size(draft.lines.len())?;
        for line in &draft.lines {
            validate_quantity(line.quantity)?;
            if let Some(price) = line.unit_price_override {
                validate_amount_cents("unitPrice", price.cents())?;
            }
        }
        let currency = normalize_currency(&draft.currency)?;
        let notes = validate_notes(draft.notes.as_deref())?;
        let tenant_id = draft.tenant_id.as_str();

        let mut tx = begin_tenant_write(&self.pool, tenant_id).await?;
        let ctx = load_context(&mut tx, tenant_id).await?;

        // stock branch (by-branch mode) and the branch recorded on the sale
        let stock_branch = resolve_branch(&mut tx, &ctx, draft.branch_id.as_deref()).await?;
        let sale_branch = match (&stock_branch, draft.branch_id.as_deref()) {
            (Some(b), _) => Some(b.clone()),
            (None, Some(b)) => Some(require_live_branch(&mut tx, tenant_id, b).await?.id),
            (None, None) => None,
        };

        // 1. price every line
        let mut cache = RateCache::new();
        let mut priced = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            let item = require_item(&mut tx, tenant_id, &line.product_id).await?;
            if !item.is_active {
                return Err(CoreError::ItemInactive(item.id).into());
            }

            let unit_price = match line.unit_price_override {
                Some(price) if item.pricing_mode == PricingMode::Manual => price,
                Some(_) => return Err(CoreError::PriceOverrideNotAllowed(item.id).into()),
                None => resolve_on(&mut tx, &mut cache, tenant_id, ctx.currency(), &item, &currency).await?,
            };

            let line_total = unit_price
                .checked_mul_quantity(line.quantity)
                .ok_or_else(|| ValidationError::too_large("lineTotal"))?;

            priced.push(PricedLine {
                line_total,
                item,
                quantity: line.quantity,
                unit_price,
            });
        }

        // 2. totals
        let line_totals: Vec<Money> = priced.iter().map(|l| l.line_total).collect();
        let totals = SaleTotals::compute(&line_totals, draft.discount, draft.surcharge)?;

        // 3. number
        let seq = next_sale_seq(&mut tx, tenant_id).await?;
        let sale_number = format_sale_number(seq);
        let sale_id = Uuid::new_v4().to_string();

        debug!(tenant_id = %tenant_id, sale_number = %sale_number, lines = priced.len(), "Committing sale");

        // 4. stock
        for line in &priced {
            apply_delta(
                &mut tx,
                &ctx,
                &line.item,
                DeltaRequest {
                    branch_id: stock_branch.as_deref(),
                    delta: -line.quantity,
                    reason: MovementReason::Sale,
                    note: None,
                    reference_id: Some(&sale_id),
                    actor_id: &draft.actor_id,
                },
            )
            .await?;
        }

        // 5. persist
        let now = Utc::now();
        let sale = Sale {
            id: sale_id,
            tenant_id: tenant_id.to_string(),
            branch_id: sale_branch,
            cashier_id: draft.actor_id.clone(),
            customer_id: draft.customer_id.clone(),
            sale_seq: seq,
            sale_number,
            currency,
            subtotal_cents: totals.subtotal.cents(),
            discount_type: draft.discount.kind(),
            discount_value: draft.discount.stored_value(),
            discount_cents: totals.discount.cents(),
            surcharge_type: draft.surcharge.kind(),
            surcharge_value: draft.surcharge.stored_value(),
            surcharge_cents: totals.surcharge.cents(),
            total_cents: totals.total.cents(),
            payment_method: draft.payment_method,
            notes,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, tenant_id, branch_id, cashier_id, customer_id, sale_seq, sale_number,
                currency, subtotal_cents, discount_type, discount_value, discount_cents,
                surcharge_type, surcharge_value, surcharge_cents, total_cents,
                payment_method, notes, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.tenant_id)
        .bind(&sale.branch_id)
        .bind(&sale.cashier_id)
        .bind(&sale.customer_id)
        .bind(sale.sale_seq)
        .bind(&sale.sale_number)
        .bind(&sale.currency)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_type)
        .bind(sale.discount_value)
        .bind(sale.discount_cents)
        .bind(sale.surcharge_type)
        .bind(sale.surcharge_value)
        .bind(sale.surcharge_cents)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for line in priced {
            let item = SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale.id.clone(),
                tenant_id: sale.tenant_id.clone(),
                branch_id: sale.branch_id.clone(),
                product_id: line.item.id,
                product_name_snapshot: line.item.name,
                sku_snapshot: line.item.sku,
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                line_total_cents: line.line_total.cents(),
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, tenant_id, branch_id, product_id, product_name_snapshot,
                    sku_snapshot, quantity, unit_price_cents, line_total_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&item.id)
            .bind(&item.sale_id)
            .bind(&item.tenant_id)
            .bind(&item.branch_id)
            .bind(&item.product_id)
            .bind(&item.product_name_snapshot)
            .bind(&item.sku_snapshot)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;

            items.push(item);
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            tenant_id = %sale.tenant_id,
            sale_id = %sale.id,
            sale_number = %sale.sale_number,
            total = %sale.total(),
            mode = ctx.mode.as_str(),
            "Sale committed"
        );
        Ok(SaleRecord { sale, items })
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
    use orbia_core::totals::{Adjustment, AdjustmentKind};
    use orbia_core::{CartLine, ItemDraft, PaymentMethod, StockMode, Tenant};
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::str::FromStr;

    async fn setup() -> (Database, Tenant) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create("Despensa", "ARS", StockMode::Global)
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

    fn draft(tenant: &Tenant, lines: Vec<CartLine>) -> SaleDraft {
        SaleDraft {
            tenant_id: tenant.id.clone(),
            branch_id: None,
            actor_id: "cashier-1".to_string(),
            customer_id: None,
            currency: "ARS".to_string(),
            payment_method: PaymentMethod::Cash,
            notes: None,
            discount: Adjustment::None,
            surcharge: Adjustment::None,
            lines,
        }
    }

    async fn stock_of(db: &Database, tenant: &Tenant, item: &Item) -> i64 {
        db.stock().get_item_stock(&tenant.id, &item.id).await.unwrap().total
    }

    #[tokio::test]
    async fn test_percent_discount_sale() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Arroz", "A", 10_000, 10).await;
        let b = add(&db, &tenant, "Bizcochos", "B", 5_000, 10).await;

        let mut d = draft(&tenant, vec![CartLine::new(&a.id, 3), CartLine::new(&b.id, 1)]);
        d.discount = Adjustment::percent(10);
        let record = db.checkout().commit_sale(d).await.unwrap();

        let sale = &record.sale;
        assert_eq!(sale.sale_number, "V-000001");
        assert_eq!(sale.subtotal_cents, 35_000);
        assert_eq!(sale.discount_cents, 3_500);
        assert_eq!(sale.discount_type, AdjustmentKind::Percent);
        assert_eq!(sale.discount_value, 1_000);
        assert_eq!(sale.total_cents, 31_500);
        assert_eq!(record.items.len(), 2);
        assert_eq!(record.items[0].line_total_cents, 30_000);

        assert_eq!(stock_of(&db, &tenant, &a).await, 7);
        assert_eq!(stock_of(&db, &tenant, &b).await, 9);

        let movements = db.stock().movements_for_reference(&tenant.id, &sale.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.reason == MovementReason::Sale));
        assert_eq!(movements.iter().map(|m| -m.quantity_delta).sum::<i64>(), 4);
    }

    #[tokio::test]
    async fn test_fixed_discount_and_percent_surcharge() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Aceite", "AC", 20_000, 5).await;

        let mut d = draft(&tenant, vec![CartLine::new(&a.id, 1)]);
        d.discount = Adjustment::fixed(Money::from_cents(50_000));
        d.surcharge = Adjustment::percent(10);
        let sale = db.checkout().commit_sale(d).await.unwrap().sale;
        // discount floors at the subtotal, surcharge applies to what is left
        assert_eq!(sale.discount_cents, 20_000);
        assert_eq!(sale.surcharge_cents, 0);
        assert_eq!(sale.total_cents, 0);

        let mut d = draft(&tenant, vec![CartLine::new(&a.id, 1)]);
        d.discount = Adjustment::fixed(Money::from_cents(5_000));
        d.surcharge = Adjustment::percent(10);
        let sale = db.checkout().commit_sale(d).await.unwrap().sale;
        assert_eq!(sale.surcharge_cents, 1_500);
        assert_eq!(sale.total_cents, 16_500);
    }

    #[tokio::test]
    async fn test_insufficient_line_rolls_back_everything() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Azúcar", "AZ", 1_000, 5).await;
        let b = add(&db, &tenant, "Café", "CF", 3_000, 1).await;

        let err = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new(&a.id, 2), CartLine::new(&b.id, 2)]))
            .await
            .unwrap_err();
        match err.as_domain() {
            Some(CoreError::InsufficientStock { item_id, requested, available, .. }) => {
                assert_eq!(item_id, &b.id);
                assert_eq!(*requested, 2);
                assert_eq!(*available, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert_eq!(stock_of(&db, &tenant, &a).await, 5);
        assert_eq!(db.sales().count(&tenant.id).await.unwrap(), 0);

        // the failed commit did not consume a number
        let ok = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new(&a.id, 1)]))
            .await
            .unwrap();
        assert_eq!(ok.sale.sale_number, "V-000001");
    }

    #[tokio::test]
    async fn test_item_checks() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Fideos", "FD", 900, 5).await;
        db.items().set_active(&tenant.id, &a.id, false).await.unwrap();

        let err = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new(&a.id, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ITEM_INACTIVE");

        let err = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new("missing", 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ITEM_NOT_FOUND");

        let err = db
            .checkout()
            .commit_sale(draft(&tenant, Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new(&a.id, 0)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_price_override_manual_only() {
        let (db, tenant) = setup().await;
        let manual = add(&db, &tenant, "Pan", "PN", 1_000, 5).await;
        let margin = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Queso".to_string(),
                    pricing_mode: PricingMode::Margin,
                    cost_amount_cents: Some(8_000),
                    cost_currency: Some("ARS".to_string()),
                    margin_bps: Some(2_000),
                    initial_stock: Some(5),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();

        let mut line = CartLine::new(&manual.id, 2);
        line.unit_price_override = Some(Money::from_cents(800));
        let record = db.checkout().commit_sale(draft(&tenant, vec![line])).await.unwrap();
        assert_eq!(record.items[0].unit_price_cents, 800);
        assert_eq!(record.sale.total_cents, 1_600);

        let mut line = CartLine::new(&margin.id, 1);
        line.unit_price_override = Some(Money::from_cents(1));
        let err = db.checkout().commit_sale(draft(&tenant, vec![line])).await.unwrap_err();
        assert_eq!(err.code(), "PRICE_OVERRIDE_NOT_ALLOWED");

        let record = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new(&margin.id, 1)]))
            .await
            .unwrap();
        assert_eq!(record.items[0].unit_price_cents, 10_000);
    }

    #[tokio::test]
    async fn test_sale_in_foreign_currency() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Vino", "VN", 150_000, 5).await;

        let mut d = draft(&tenant, vec![CartLine::new(&a.id, 1)]);
        d.currency = "usd".to_string();
        let err = db.checkout().commit_sale(d.clone()).await.unwrap_err();
        assert_eq!(err.code(), "RATE_NOT_FOUND");
        assert_eq!(stock_of(&db, &tenant, &a).await, 5);

        db.rates()
            .upsert(Some(&tenant.id), "ARS", "USD", Decimal::from_str("0.001").unwrap())
            .await
            .unwrap();
        let record = db.checkout().commit_sale(d).await.unwrap();
        assert_eq!(record.sale.currency, "USD");
        assert_eq!(record.items[0].unit_price_cents, 150);
    }

    #[tokio::test]
    async fn test_snapshots_survive_catalog_edits() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Leche", "LC", 1_200, 5).await;
        let record = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new(&a.id, 1)]))
            .await
            .unwrap();

        db.items()
            .update(
                &tenant.id,
                &a.id,
                ItemDraft {
                    name: "Leche Entera".to_string(),
                    sku: Some("LC-2".to_string()),
                    price_cents: 1_500,
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();

        let stored = db.sales().get(&tenant.id, &record.sale.id).await.unwrap();
        assert_eq!(stored.items[0].product_name_snapshot, "Leche");
        assert_eq!(stored.items[0].sku_snapshot.as_deref(), Some("LC"));
        assert_eq!(stored.items[0].unit_price_cents, 1_200);

        let err = db.sales().get(&tenant.id, "nope").await.unwrap_err();
        assert_eq!(err.code(), "SALE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_by_branch_sale_decrements_branch_row() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Jabón", "JB", 700, 0).await;
        let centro = db.tenants().create_branch(&tenant.id, "Centro").await.unwrap();
        db.tenants()
            .set_stock_mode(&tenant.id, StockMode::ByBranch)
            .await
            .unwrap();
        db.stock()
            .adjust_stock(StockAdjustment {
                tenant_id: tenant.id.clone(),
                item_id: a.id.clone(),
                branch_id: Some(centro.id.clone()),
                delta: 4,
                reason: MovementReason::Adjustment,
                note: None,
                actor_id: "u".to_string(),
            })
            .await
            .unwrap();

        let err = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new(&a.id, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BRANCH_REQUIRED");

        let mut d = draft(&tenant, vec![CartLine::new(&a.id, 3)]);
        d.branch_id = Some(centro.id.clone());
        let record = db.checkout().commit_sale(d).await.unwrap();
        assert_eq!(record.sale.branch_id.as_deref(), Some(centro.id.as_str()));

        let stock = db.stock().get_item_stock(&tenant.id, &a.id).await.unwrap();
        assert_eq!(stock.total, 1);
        assert_eq!(stock.by_branch[0].stock, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sale_numbers_are_unique() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Chicle", "CH", 100, 100).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let checkout = db.checkout();
            let d = draft(&tenant, vec![CartLine::new(&a.id, 1)]);
            handles.push(tokio::spawn(async move { checkout.commit_sale(d).await }));
        }

        let mut seqs = HashSet::new();
        for handle in handles {
            let record = handle.await.unwrap().unwrap();
            assert!(seqs.insert(record.sale.sale_seq));
        }
        assert_eq!(seqs, (1..=10).collect::<HashSet<i64>>());
        assert_eq!(stock_of(&db, &tenant, &a).await, 90);
    }

    #[tokio::test]
    async fn test_concurrent_sales_never_oversell() {
        let (db, tenant) = setup().await;
        let c = add(&db, &tenant, "Caramelo", "C", 100, 2).await;

        let first = db.checkout();
        let second = db.checkout();
        let d1 = draft(&tenant, vec![CartLine::new(&c.id, 2)]);
        let d2 = d1.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { first.commit_sale(d1).await }),
            tokio::spawn(async move { second.commit_sale(d2).await }),
        );
        let results = [r1.unwrap(), r2.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(failure.code(), "INSUFFICIENT_STOCK");
        assert_eq!(stock_of(&db, &tenant, &c).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contended_sales_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(
            DbConfig::new(dir.path().join("orbia.db"))
                .max_connections(8)
                .busy_timeout(std::time::Duration::from_secs(30)),
        )
        .await
        .unwrap();
        let tenant = db
            .tenants()
            .create("Kiosco", "ARS", StockMode::Global)
            .await
            .unwrap();
        let item = add(&db, &tenant, "Alfajor", "ALF", 500, 12).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let checkout = db.checkout();
            let d = draft(&tenant, vec![CartLine::new(&item.id, 1)]);
            handles.push(tokio::spawn(async move { checkout.commit_sale(d).await }));
        }

        let mut numbers = HashSet::new();
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(record) => assert!(numbers.insert(record.sale.sale_number)),
                Err(e) => {
                    assert_eq!(e.code(), "INSUFFICIENT_STOCK");
                    refused += 1;
                }
            }
        }

        assert_eq!(numbers.len(), 12);
        assert_eq!(refused, 8);
        let expected: HashSet<String> = (1..=12).map(format_sale_number).collect();
        assert_eq!(numbers, expected);
        assert_eq!(stock_of(&db, &tenant, &item).await, 0);
        assert_eq!(db.sales().count(&tenant.id).await.unwrap(), 12);
        db.close().await;
    }

    #[tokio::test]
    async fn test_oversized_amounts_are_rejected() {
        let (db, tenant) = setup().await;
        let a = add(&db, &tenant, "Mate", "MATE", 100, 10).await;

        let mut d = draft(&tenant, vec![CartLine::new(&a.id, 1)]);
        d.surcharge = Adjustment::fixed(Money::from_cents(i64::MAX));
        let err = db.checkout().commit_sale(d).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let mut line = CartLine::new(&a.id, 3);
        line.unit_price_override = Some(Money::from_cents(i64::MAX / 2));
        let err = db.checkout().commit_sale(draft(&tenant, vec![line])).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        // nothing was consumed by the refused drafts
        assert_eq!(stock_of(&db, &tenant, &a).await, 10);
        let record = db
            .checkout()
            .commit_sale(draft(&tenant, vec![CartLine::new(&a.id, 1)]))
            .await
            .unwrap();
        assert_eq!(record.sale.sale_number, "V-000001");
    }

    #[test]
    fn test_sale_number_format() {
        assert_eq!(format_sale_number(1), "V-000001");
        assert_eq!(format_sale_number(1_234_567), "V-1234567");
    }
}
