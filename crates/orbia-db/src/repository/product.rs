//! # Item Repository
//!
//! Catalog item writes and point lookups. Listing lives in
//! [`catalog`](super::catalog); stock changes go through the
//! [`StockLedger`](super::stock::StockLedger).
//!
//! ## Write-time Checks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ItemDraft                                                              │
//! │       │                                                                 │
//! │       ├── name trimmed, 1..=200 chars                                   │
//! │       ├── sku → uppercase, whitespace removed, unique per tenant        │
//! │       ├── currencies → 3-letter uppercase                               │
//! │       ├── MARGIN → cost amount + cost currency + 0 <= margin < 100%     │
//! │       │            else PricingConfigInvalid                            │
//! │       └── category must belong to the tenant                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT / UPDATE products                                               │
//! │       │                                                                 │
//! │       └── global mode + opening stock → `initial` movement              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use orbia_core::catalog::search_text;
use orbia_core::pricing::margin_price;
use orbia_core::validation::{
    normalize_currency, normalize_sku, validate_amount_cents, validate_name, validate_notes,
    validate_stock_level,
};
use orbia_core::{
    Category, CoreError, Item, ItemDraft, Money, MovementReason, PricingMode, StockMode,
    ValidationError,
};

use crate::error::{DbError, DbResult, EngineResult};
use crate::pool::begin_tenant_write;
use crate::repository::stock::{insert_movement, NewMovement};
use crate::repository::tenant::load_context;

/// Item columns, qualified with the `p` alias.
pub(crate) const ITEM_COLUMNS: &str = r#"
    p.id, p.tenant_id, p.category_id, p.name, p.description, p.sku,
    p.price_cents, p.cost_cents, p.currency, p.pricing_mode,
    p.cost_amount_cents, p.cost_currency, p.margin_bps,
    p.stock, p.is_active, p.created_at, p.updated_at
"#;

// =============================================================================
// Connection-level helpers
// =============================================================================

/// Fetches an item of the tenant. Items of other tenants are invisible.
pub(crate) async fn fetch_item(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    item_id: &str,
) -> DbResult<Option<Item>> {
    let sql = format!(
        "SELECT {} FROM products p WHERE p.id = ?1 AND p.tenant_id = ?2",
        ITEM_COLUMNS
    );
    let item = sqlx::query_as::<_, Item>(&sql)
        .bind(item_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(item)
}

pub(crate) async fn require_item(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    item_id: &str,
) -> EngineResult<Item> {
    fetch_item(conn, tenant_id, item_id)
        .await?
        .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()).into())
}

fn draft_search_text(draft: &ItemDraft) -> String {
    search_text(&draft.name, draft.sku.as_deref(), draft.description.as_deref())
}

/// Checks and normalizes a draft before it reaches the store.
fn normalize_draft(item_id: &str, draft: ItemDraft) -> EngineResult<ItemDraft> {
    let invalid = |reason: &str| CoreError::PricingConfigInvalid {
        item_id: item_id.to_string(),
        reason: reason.to_string(),
    };

    validate_amount_cents("price", draft.price_cents)?;
    if let Some(cost) = draft.cost_cents {
        validate_amount_cents("cost", cost)?;
    }
    if let Some(stock) = draft.initial_stock {
        validate_stock_level(stock)?;
    }

    let currency = draft.currency.as_deref().map(normalize_currency).transpose()?;
    let cost_currency = draft
        .cost_currency
        .as_deref()
        .map(normalize_currency)
        .transpose()?;

    if draft.pricing_mode == PricingMode::Margin {
        let cost = draft
            .cost_amount_cents
            .ok_or_else(|| invalid("margin pricing requires a cost amount"))?;
        validate_amount_cents("costAmount", cost)?;
        let margin = draft
            .margin_bps
            .ok_or_else(|| invalid("margin pricing requires a margin"))?;
        if cost_currency.is_none() {
            return Err(invalid("margin pricing requires a cost currency").into());
        }
        margin_price(Money::from_cents(cost), margin).map_err(|e| match e {
            CoreError::PricingConfigInvalid { reason, .. } => invalid(&reason),
            other => other,
        })?;
    } else if let Some(cost) = draft.cost_amount_cents {
        validate_amount_cents("costAmount", cost)?;
    }

    Ok(ItemDraft {
        name: validate_name("name", &draft.name)?,
        description: validate_notes(draft.description.as_deref())?,
        sku: match draft.sku.as_deref() {
            Some(raw) => normalize_sku(raw)?,
            None => None,
        },
        currency,
        cost_currency,
        ..draft
    })
}

async fn ensure_sku_free(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    sku: Option<&str>,
    except_item: Option<&str>,
) -> EngineResult<()> {
    let Some(sku) = sku else { return Ok(()) };

    let taken: Option<String> = sqlx::query_scalar(
        "SELECT id FROM products WHERE tenant_id = ?1 AND sku = ?2 AND id IS NOT ?3",
    )
    .bind(tenant_id)
    .bind(sku)
    .bind(except_item)
    .fetch_optional(&mut *conn)
    .await?;

    if taken.is_some() {
        return Err(ValidationError::Duplicate {
            field: "sku".to_string(),
            value: sku.to_string(),
        }
        .into());
    }
    Ok(())
}

async fn ensure_category(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    category_id: Option<&str>,
) -> EngineResult<()> {
    let Some(category_id) = category_id else { return Ok(()) };

    let found: Option<String> =
        sqlx::query_scalar("SELECT id FROM product_categories WHERE id = ?1 AND tenant_id = ?2")
            .bind(category_id)
            .bind(tenant_id)
            .fetch_optional(&mut *conn)
            .await?;

    if found.is_none() {
        return Err(DbError::not_found("Category", category_id).into());
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog items and categories.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    /// Creates a new ItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ItemRepository { pool }
    }

    /// Creates an item.
    ///
    /// In global mode `initial_stock` becomes `products.stock` and is logged
    /// as an `initial` movement. In by-branch mode it is ignored: branch
    /// rows are filled through the ledger.
    pub async fn create(&self, tenant_id: &str, actor_id: &str, draft: ItemDraft) -> EngineResult<Item> {
        let id = Uuid::new_v4().to_string();
        let draft = normalize_draft(&id, draft)?;

        let mut tx = begin_tenant_write(&self.pool, tenant_id).await?;
        let ctx = load_context(&mut tx, tenant_id).await?;
        ensure_sku_free(&mut tx, tenant_id, draft.sku.as_deref(), None).await?;
        ensure_category(&mut tx, tenant_id, draft.category_id.as_deref()).await?;

        let opening = match ctx.mode {
            StockMode::Global => draft.initial_stock.unwrap_or(0),
            StockMode::ByBranch => 0,
        };
        let now = Utc::now();

        debug!(tenant_id = %tenant_id, sku = ?draft.sku, "Inserting item");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, category_id, name, description, sku,
                price_cents, cost_cents, currency, pricing_mode,
                cost_amount_cents, cost_currency, margin_bps,
                stock, is_active, search_text, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13,
                ?14, 1, ?15, ?16, ?16
            )
            "#,
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(&draft.category_id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.sku)
        .bind(draft.price_cents)
        .bind(draft.cost_cents)
        .bind(&draft.currency)
        .bind(draft.pricing_mode)
        .bind(draft.cost_amount_cents)
        .bind(&draft.cost_currency)
        .bind(draft.margin_bps)
        .bind(opening)
        .bind(draft_search_text(&draft))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if opening > 0 {
            insert_movement(
                &mut tx,
                &NewMovement {
                    tenant_id,
                    product_id: &id,
                    branch_id: None,
                    delta: opening,
                    reason: MovementReason::Initial,
                    note: None,
                    reference_id: None,
                    actor_id,
                },
            )
            .await?;
        }

        let item = require_item(&mut tx, tenant_id, &id).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(tenant_id = %tenant_id, item_id = %item.id, mode = ctx.mode.as_str(), "Item created");
        Ok(item)
    }

    /// Replaces the editable fields of an item. Stock is untouched.
    pub async fn update(&self, tenant_id: &str, item_id: &str, draft: ItemDraft) -> EngineResult<Item> {
        let draft = normalize_draft(item_id, draft)?;

        let mut tx = begin_tenant_write(&self.pool, tenant_id).await?;
        require_item(&mut tx, tenant_id, item_id).await?;
        ensure_sku_free(&mut tx, tenant_id, draft.sku.as_deref(), Some(item_id)).await?;
        ensure_category(&mut tx, tenant_id, draft.category_id.as_deref()).await?;

        debug!(tenant_id = %tenant_id, item_id = %item_id, "Updating item");

        sqlx::query(
            r#"
            UPDATE products SET
                category_id = ?3,
                name = ?4,
                description = ?5,
                sku = ?6,
                price_cents = ?7,
                cost_cents = ?8,
                currency = ?9,
                pricing_mode = ?10,
                cost_amount_cents = ?11,
                cost_currency = ?12,
                margin_bps = ?13,
                search_text = ?14,
                updated_at = ?15
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(item_id)
        .bind(tenant_id)
        .bind(&draft.category_id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.sku)
        .bind(draft.price_cents)
        .bind(draft.cost_cents)
        .bind(&draft.currency)
        .bind(draft.pricing_mode)
        .bind(draft.cost_amount_cents)
        .bind(&draft.cost_currency)
        .bind(draft.margin_bps)
        .bind(draft_search_text(&draft))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let item = require_item(&mut tx, tenant_id, item_id).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(item)
    }

    /// Activates or deactivates an item. Inactive items cannot be sold.
    pub async fn set_active(&self, tenant_id: &str, item_id: &str, active: bool) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = ?1, updated_at = ?2 WHERE id = ?3 AND tenant_id = ?4",
        )
        .bind(active)
        .bind(Utc::now())
        .bind(item_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ItemNotFound(item_id.to_string()).into());
        }

        info!(tenant_id = %tenant_id, item_id = %item_id, active, "Item status changed");
        Ok(())
    }

    /// Gets an item by ID.
    pub async fn get(&self, tenant_id: &str, item_id: &str) -> DbResult<Option<Item>> {
        let mut conn = self.pool.acquire().await?;
        fetch_item(&mut conn, tenant_id, item_id).await
    }

    /// Gets an item by code; the input is normalized first.
    pub async fn get_by_sku(&self, tenant_id: &str, raw_sku: &str) -> EngineResult<Option<Item>> {
        let Some(sku) = normalize_sku(raw_sku)? else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {} FROM products p WHERE p.tenant_id = ?1 AND p.sku = ?2",
            ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, Item>(&sql)
            .bind(tenant_id)
            .bind(&sku)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    /// Creates a category.
    pub async fn create_category(
        &self,
        tenant_id: &str,
        name: &str,
        sort_order: i64,
    ) -> EngineResult<Category> {
        let category = Category {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: validate_name("name", name)?,
            sort_order,
        };

        sqlx::query(
            "INSERT INTO product_categories (id, tenant_id, name, sort_order) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&category.id)
        .bind(&category.tenant_id)
        .bind(&category.name)
        .bind(category.sort_order)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("category", &category.name),
            other => other,
        })?;

        Ok(category)
    }

    pub async fn list_categories(&self, tenant_id: &str) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, tenant_id, name, sort_order
            FROM product_categories
            WHERE tenant_id = ?1
            ORDER BY sort_order, name
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
