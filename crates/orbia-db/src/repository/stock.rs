//! # Stock Ledger
//!
//! One interface over the two inventory representations, plus the
//! append-only movement log.
//!
//! ## Representations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Stock Ledger                                    │
//! │                                                                         │
//! │   TenantContext.mode                                                    │
//! │        │                                                                │
//! │        ├── Global ─────► products.stock            (source of truth)    │
//! │        │                                                                │
//! │        └── ByBranch ───► product_stock_by_branch   (source of truth)    │
//! │                               │  row created at 0 on first write        │
//! │                               ▼                                         │
//! │                          products.stock = Σ live branches (denormalized)│
//! │                                                                         │
//! │   Every non-zero change ──► stock_movements (never updated or deleted)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## No Overselling
//! A decrement is ONE conditional statement:
//!
//! ```text
//! UPDATE ... SET stock = stock + :delta
//! WHERE ... AND stock + :delta >= 0
//! RETURNING stock
//! ```
//!
//! No row back means the stock was not there; nothing was written and the
//! caller gets `InsufficientStock`. Writers are serialized by the SQLite
//! write lock taken in [`begin_tenant_write`], so the check and the write
//! cannot interleave with another sale.

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use orbia_core::validation::{validate_notes, validate_stock_level};
use orbia_core::{
    BranchStock, CoreError, Item, ItemStock, MovementHistoryEntry, MovementReason, StockMode,
    StockMovement, ValidationError, MAX_MOVEMENT_HISTORY,
};

use crate::error::{DbError, DbResult, EngineResult};
use crate::pool::begin_tenant_write;
use crate::repository::product::require_item;
use crate::repository::tenant::{load_context, require_live_branch, TenantContext};

// =============================================================================
// Shared stock expression
// =============================================================================

/// The stock total of a `products p` row under one mode.
///
/// The catalog and the ledger both build their SQL from this, so a listing
/// and a stock read can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StockExpression {
    mode: StockMode,
}

impl StockExpression {
    pub(crate) fn for_mode(mode: StockMode) -> Self {
        StockExpression { mode }
    }

    /// Pushes the aggregate join (by-branch only). Goes right after `FROM products p`.
    pub(crate) fn push_join(&self, qb: &mut QueryBuilder<'_, Sqlite>, tenant_id: &str) {
        if self.mode == StockMode::ByBranch {
            qb.push(
                " LEFT JOIN (SELECT s.product_id, SUM(s.stock) AS stock_total \
                 FROM product_stock_by_branch s \
                 JOIN branches b ON b.id = s.branch_id AND b.deleted_at IS NULL \
                 WHERE s.tenant_id = ",
            );
            qb.push_bind(tenant_id.to_string());
            qb.push(" GROUP BY s.product_id) sa ON sa.product_id = p.id");
        }
    }

    /// Scalar expression for filtering, sorting and selecting.
    pub(crate) fn column(&self) -> &'static str {
        match self.mode {
            StockMode::Global => "COALESCE(p.stock, 0)",
            StockMode::ByBranch => "COALESCE(sa.stock_total, 0)",
        }
    }
}

// =============================================================================
// Movements
// =============================================================================

/// A movement about to be written.
#[derive(Debug, Clone)]
pub(crate) struct NewMovement<'a> {
    pub tenant_id: &'a str,
    pub product_id: &'a str,
    pub branch_id: Option<&'a str>,
    pub delta: i64,
    pub reason: MovementReason,
    pub note: Option<&'a str>,
    pub reference_id: Option<&'a str>,
    pub actor_id: &'a str,
}

/// Appends one movement and returns its id.
pub(crate) async fn insert_movement(conn: &mut SqliteConnection, m: &NewMovement<'_>) -> DbResult<String> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, tenant_id, product_id, branch_id, quantity_delta,
            reason, note, reference_id, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&id)
    .bind(m.tenant_id)
    .bind(m.product_id)
    .bind(m.branch_id)
    .bind(m.delta)
    .bind(m.reason)
    .bind(m.note)
    .bind(m.reference_id)
    .bind(m.actor_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

// =============================================================================
// Applying deltas
// =============================================================================

/// Result of one ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub item_id: String,
    /// Branch written in by-branch mode; `None` in global mode.
    pub branch_id: Option<String>,
    pub delta: i64,
    /// Level of the written row after the change (branch row or item).
    pub level_after: i64,
    /// `None` when the delta was zero and nothing was recorded.
    pub movement_id: Option<String>,
}

/// One delta to apply through [`apply_delta`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeltaRequest<'a> {
    pub branch_id: Option<&'a str>,
    pub delta: i64,
    pub reason: MovementReason,
    pub note: Option<&'a str>,
    pub reference_id: Option<&'a str>,
    pub actor_id: &'a str,
}

/// Picks the branch a write applies to.
///
/// Global mode ignores the branch. By-branch mode requires a live branch of
/// the tenant.
pub(crate) async fn resolve_branch(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    branch_id: Option<&str>,
) -> EngineResult<Option<String>> {
    match ctx.mode {
        StockMode::Global => Ok(None),
        StockMode::ByBranch => {
            let branch_id =
                branch_id.ok_or_else(|| CoreError::BranchRequired(ctx.tenant_id().to_string()))?;
            let branch = require_live_branch(conn, ctx.tenant_id(), branch_id).await?;
            Ok(Some(branch.id))
        }
    }
}

/// Applies a signed delta inside the caller's transaction.
///
/// `req.branch_id` must already be resolved through [`resolve_branch`].
/// A zero delta writes nothing. A delta that would take the level below
/// zero fails with `InsufficientStock` and writes nothing.
pub(crate) async fn apply_delta(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    item: &Item,
    req: DeltaRequest<'_>,
) -> EngineResult<StockChange> {
    let tenant_id = ctx.tenant_id();
    let now = Utc::now();

    if req.delta == 0 {
        let level = current_level(conn, ctx, &item.id, req.branch_id).await?;
        return Ok(StockChange {
            item_id: item.id.clone(),
            branch_id: req.branch_id.map(str::to_string),
            delta: 0,
            level_after: level,
            movement_id: None,
        });
    }

    let level_after: Option<i64> = match (ctx.mode, req.branch_id) {
        (StockMode::Global, _) => {
            sqlx::query_scalar(
                r#"
                UPDATE products
                SET stock = COALESCE(stock, 0) + ?1, updated_at = ?2
                WHERE id = ?3 AND tenant_id = ?4 AND COALESCE(stock, 0) + ?1 >= 0
                RETURNING stock
                "#,
            )
            .bind(req.delta)
            .bind(now)
            .bind(&item.id)
            .bind(tenant_id)
            .fetch_optional(&mut *conn)
            .await?
        }
        (StockMode::ByBranch, Some(branch_id)) => {
            sqlx::query(
                r#"
                INSERT INTO product_stock_by_branch (tenant_id, product_id, branch_id, stock, updated_at)
                VALUES (?1, ?2, ?3, 0, ?4)
                ON CONFLICT (product_id, branch_id) DO NOTHING
                "#,
            )
            .bind(tenant_id)
            .bind(&item.id)
            .bind(branch_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            sqlx::query_scalar(
                r#"
                UPDATE product_stock_by_branch
                SET stock = stock + ?1, updated_at = ?2
                WHERE product_id = ?3 AND branch_id = ?4 AND tenant_id = ?5 AND stock + ?1 >= 0
                RETURNING stock
                "#,
            )
            .bind(req.delta)
            .bind(now)
            .bind(&item.id)
            .bind(branch_id)
            .bind(tenant_id)
            .fetch_optional(&mut *conn)
            .await?
        }
        (StockMode::ByBranch, None) => {
            return Err(CoreError::BranchRequired(tenant_id.to_string()).into());
        }
    };

    let Some(level_after) = level_after else {
        let available = current_level(conn, ctx, &item.id, req.branch_id).await?;
        warn!(
            tenant_id = %tenant_id,
            item_id = %item.id,
            branch_id = ?req.branch_id,
            requested = -req.delta,
            available,
            "Stock decrement refused"
        );
        return Err(CoreError::InsufficientStock {
            item_id: item.id.clone(),
            label: item.label().to_string(),
            requested: -req.delta,
            available,
        }
        .into());
    };

    if ctx.mode == StockMode::ByBranch {
        resync_item_total(conn, tenant_id, &item.id).await?;
    }

    let movement_id = insert_movement(
        conn,
        &NewMovement {
            tenant_id,
            product_id: &item.id,
            branch_id: req.branch_id,
            delta: req.delta,
            reason: req.reason,
            note: req.note,
            reference_id: req.reference_id,
            actor_id: req.actor_id,
        },
    )
    .await?;

    debug!(
        tenant_id = %tenant_id,
        item_id = %item.id,
        branch_id = ?req.branch_id,
        delta = req.delta,
        level_after,
        "Stock delta applied"
    );

    Ok(StockChange {
        item_id: item.id.clone(),
        branch_id: req.branch_id.map(str::to_string),
        delta: req.delta,
        level_after,
        movement_id: Some(movement_id),
    })
}

/// Level of the row a write would touch.
async fn current_level(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    item_id: &str,
    branch_id: Option<&str>,
) -> DbResult<i64> {
    let level: Option<i64> = match (ctx.mode, branch_id) {
        (StockMode::ByBranch, Some(branch_id)) => {
            sqlx::query_scalar(
                "SELECT stock FROM product_stock_by_branch WHERE product_id = ?1 AND branch_id = ?2 AND tenant_id = ?3",
            )
            .bind(item_id)
            .bind(branch_id)
            .bind(ctx.tenant_id())
            .fetch_optional(&mut *conn)
            .await?
        }
        _ => sqlx::query_scalar(
            "SELECT COALESCE(stock, 0) FROM products WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(item_id)
        .bind(ctx.tenant_id())
        .fetch_optional(&mut *conn)
        .await?,
    };
    Ok(level.unwrap_or(0))
}

/// Total of one item through the shared stock expression of the current mode.
async fn item_total(conn: &mut SqliteConnection, ctx: &TenantContext, item_id: &str) -> DbResult<i64> {
    let expr = StockExpression::for_mode(ctx.mode);
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
    qb.push(expr.column());
    qb.push(" FROM products p");
    expr.push_join(&mut qb, ctx.tenant_id());
    qb.push(" WHERE p.id = ");
    qb.push_bind(item_id.to_string());
    qb.push(" AND p.tenant_id = ");
    qb.push_bind(ctx.tenant_id().to_string());

    let total: Option<i64> = qb.build_query_scalar().fetch_optional(&mut *conn).await?;
    Ok(total.unwrap_or(0))
}

/// Recomputes the denormalized total of one item from live branches.
async fn resync_item_total(conn: &mut SqliteConnection, tenant_id: &str, item_id: &str) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE products
        SET stock = (
            SELECT COALESCE(SUM(s.stock), 0)
            FROM product_stock_by_branch s
            JOIN branches b ON b.id = s.branch_id AND b.deleted_at IS NULL
            WHERE s.product_id = products.id AND s.tenant_id = products.tenant_id
        )
        WHERE id = ?1 AND tenant_id = ?2
        "#,
    )
    .bind(item_id)
    .bind(tenant_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Recomputes every denormalized total of a tenant (after a branch delete).
pub(crate) async fn resync_all_branch_totals(conn: &mut SqliteConnection, tenant_id: &str) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET stock = (
            SELECT COALESCE(SUM(s.stock), 0)
            FROM product_stock_by_branch s
            JOIN branches b ON b.id = s.branch_id AND b.deleted_at IS NULL
            WHERE s.product_id = products.id AND s.tenant_id = products.tenant_id
        )
        WHERE tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .execute(&mut *conn)
    .await?;

    debug!(tenant_id = %tenant_id, items = result.rows_affected(), "Branch totals resynced");
    Ok(())
}

// =============================================================================
// Ledger
// =============================================================================

/// A manual stock correction.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub tenant_id: String,
    pub item_id: String,
    /// Required in by-branch mode, ignored in global mode.
    pub branch_id: Option<String>,
    pub delta: i64,
    pub reason: MovementReason,
    pub note: Option<String>,
    pub actor_id: String,
}

/// The stock ledger.
///
/// ## Usage
/// ```rust,ignore
/// let ledger = db.stock();
/// let stock = ledger.get_item_stock(&tenant_id, &item_id).await?;
/// ledger.adjust_stock(StockAdjustment { delta: -2, .. }).await?;
/// ```
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    /// Creates a new StockLedger.
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Stock of one item under the tenant's current mode.
    ///
    /// In by-branch mode every live branch is listed, zero-filled.
    pub async fn get_item_stock(&self, tenant_id: &str, item_id: &str) -> EngineResult<ItemStock> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        let ctx = load_context(&mut conn, tenant_id).await?;
        require_item(&mut conn, tenant_id, item_id).await?;

        let total = item_total(&mut conn, &ctx, item_id).await?;

        let by_branch = match ctx.mode {
            StockMode::Global => Vec::new(),
            StockMode::ByBranch => {
                sqlx::query_as::<_, BranchStock>(
                    r#"
                    SELECT b.id AS branch_id, b.name AS branch_name, COALESCE(s.stock, 0) AS stock
                    FROM branches b
                    LEFT JOIN product_stock_by_branch s
                           ON s.branch_id = b.id AND s.product_id = ?1
                    WHERE b.tenant_id = ?2 AND b.deleted_at IS NULL
                    ORDER BY b.created_at, b.id
                    "#,
                )
                .bind(item_id)
                .bind(tenant_id)
                .fetch_all(&mut *conn)
                .await?
            }
        };

        Ok(ItemStock {
            item_id: item_id.to_string(),
            mode: ctx.mode,
            total,
            by_branch,
        })
    }

    /// Applies a signed delta and records a movement, atomically.
    pub async fn adjust_stock(&self, adj: StockAdjustment) -> EngineResult<StockChange> {
        let note = validate_notes(adj.note.as_deref())?;

        let mut tx = begin_tenant_write(&self.pool, &adj.tenant_id).await?;
        let ctx = load_context(&mut tx, &adj.tenant_id).await?;
        let item = require_item(&mut tx, &adj.tenant_id, &adj.item_id).await?;
        let branch_id = resolve_branch(&mut tx, &ctx, adj.branch_id.as_deref()).await?;

        let change = apply_delta(
            &mut tx,
            &ctx,
            &item,
            DeltaRequest {
                branch_id: branch_id.as_deref(),
                delta: adj.delta,
                reason: adj.reason,
                note: note.as_deref(),
                reference_id: None,
                actor_id: &adj.actor_id,
            },
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;

        if change.movement_id.is_some() {
            info!(
                tenant_id = %adj.tenant_id,
                item_id = %adj.item_id,
                delta = adj.delta,
                level_after = change.level_after,
                "Stock adjusted"
            );
        }
        Ok(change)
    }

    /// Sets an absolute level by routing `target - current` through
    /// [`adjust_stock`](Self::adjust_stock) semantics.
    pub async fn set_stock(
        &self,
        tenant_id: &str,
        item_id: &str,
        branch_id: Option<&str>,
        target: i64,
        actor_id: &str,
        note: Option<&str>,
    ) -> EngineResult<StockChange> {
        validate_stock_level(target)?;
        let note = validate_notes(note)?;

        let mut tx = begin_tenant_write(&self.pool, tenant_id).await?;
        let ctx = load_context(&mut tx, tenant_id).await?;
        let item = require_item(&mut tx, tenant_id, item_id).await?;
        let branch_id = resolve_branch(&mut tx, &ctx, branch_id).await?;

        let current = current_level(&mut tx, &ctx, item_id, branch_id.as_deref()).await?;
        let change = apply_delta(
            &mut tx,
            &ctx,
            &item,
            DeltaRequest {
                branch_id: branch_id.as_deref(),
                delta: target - current,
                reason: MovementReason::Adjustment,
                note: note.as_deref(),
                reference_id: None,
                actor_id,
            },
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(change)
    }

    /// Moves quantity between two branches of a by-branch tenant.
    ///
    /// Writes a `transfer_out` and a `transfer_in` movement sharing one
    /// reference id. Returns `(out, in)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn transfer_stock(
        &self,
        tenant_id: &str,
        item_id: &str,
        from_branch: &str,
        to_branch: &str,
        quantity: i64,
        actor_id: &str,
        note: Option<&str>,
    ) -> EngineResult<(StockChange, StockChange)> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        if from_branch == to_branch {
            return Err(ValidationError::invalid("toBranchId", "must differ from fromBranchId").into());
        }
        let note = validate_notes(note)?;

        let mut tx = begin_tenant_write(&self.pool, tenant_id).await?;
        let ctx = load_context(&mut tx, tenant_id).await?;
        if ctx.mode != StockMode::ByBranch {
            return Err(CoreError::InvalidStockMode {
                tenant_id: tenant_id.to_string(),
                reason: "transfers need by-branch stock".to_string(),
            }
            .into());
        }
        let item = require_item(&mut tx, tenant_id, item_id).await?;
        let from = resolve_branch(&mut tx, &ctx, Some(from_branch)).await?;
        let to = resolve_branch(&mut tx, &ctx, Some(to_branch)).await?;
        let transfer_id = Uuid::new_v4().to_string();

        let out = apply_delta(
            &mut tx,
            &ctx,
            &item,
            DeltaRequest {
                branch_id: from.as_deref(),
                delta: -quantity,
                reason: MovementReason::TransferOut,
                note: note.as_deref(),
                reference_id: Some(&transfer_id),
                actor_id,
            },
        )
        .await?;
        let inbound = apply_delta(
            &mut tx,
            &ctx,
            &item,
            DeltaRequest {
                branch_id: to.as_deref(),
                delta: quantity,
                reason: MovementReason::TransferIn,
                note: note.as_deref(),
                reference_id: Some(&transfer_id),
                actor_id,
            },
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(
            tenant_id = %tenant_id,
            item_id = %item_id,
            from = %from_branch,
            to = %to_branch,
            quantity,
            "Stock transferred"
        );
        Ok((out, inbound))
    }

    /// Movement history (kardex), newest first, at most 300 rows.
    ///
    /// `stock_after` is anchored on the current level of the scope and walked
    /// backwards, so it stays exact even when older rows are cut off. The
    /// scope is the branch row when `branch_id` is given in by-branch mode,
    /// otherwise the item total exactly as [`get_item_stock`](Self::get_item_stock)
    /// reports it.
    pub async fn list_movements(
        &self,
        tenant_id: &str,
        item_id: &str,
        branch_id: Option<&str>,
    ) -> EngineResult<Vec<MovementHistoryEntry>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        let ctx = load_context(&mut conn, tenant_id).await?;
        require_item(&mut conn, tenant_id, item_id).await?;

        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, tenant_id, product_id, branch_id, quantity_delta,
                   reason, note, reference_id, actor_id, created_at
            FROM stock_movements
            WHERE tenant_id = ?1 AND product_id = ?2 AND (?3 IS NULL OR branch_id = ?3)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?4
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(branch_id)
        .bind(MAX_MOVEMENT_HISTORY)
        .fetch_all(&mut *conn)
        .await?;

        let mut level = match (ctx.mode, branch_id) {
            (StockMode::ByBranch, Some(branch_id)) => {
                current_level(&mut conn, &ctx, item_id, Some(branch_id)).await?
            }
            _ => item_total(&mut conn, &ctx, item_id).await?,
        };

        let mut entries = Vec::with_capacity(movements.len());
        for movement in movements {
            let stock_after = level;
            level -= movement.quantity_delta;
            entries.push(MovementHistoryEntry {
                movement,
                stock_after,
            });
        }
        Ok(entries)
    }

    /// Movements written by one sale (reference id = sale id).
    pub async fn movements_for_reference(
        &self,
        tenant_id: &str,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, tenant_id, product_id, branch_id, quantity_delta,
                   reason, note, reference_id, actor_id, created_at
            FROM stock_movements
            WHERE tenant_id = ?1 AND reference_id = ?2
            ORDER BY rowid
            "#,
        )
        .bind(tenant_id)
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use orbia_core::{ItemDraft, Tenant};

    async fn setup() -> (Database, Tenant, Item) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create("Ferretería", "ARS", StockMode::Global)
            .await
            .unwrap();
        let item = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Tornillo".to_string(),
                    sku: Some("T-1".to_string()),
                    price_cents: 100,
                    initial_stock: Some(5),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();
        (db, tenant, item)
    }

    fn adj(tenant: &Tenant, item: &Item, branch: Option<&str>, delta: i64) -> StockAdjustment {
        StockAdjustment {
            tenant_id: tenant.id.clone(),
            item_id: item.id.clone(),
            branch_id: branch.map(str::to_string),
            delta,
            reason: MovementReason::Adjustment,
            note: None,
            actor_id: "user-1".to_string(),
        }
    }

    async fn to_by_branch(db: &Database, tenant: &Tenant) -> (String, String) {
        let a = db.tenants().create_branch(&tenant.id, "A").await.unwrap();
        let b = db.tenants().create_branch(&tenant.id, "B").await.unwrap();
        db.tenants()
            .set_stock_mode(&tenant.id, StockMode::ByBranch)
            .await
            .unwrap();
        (a.id, b.id)
    }

    #[tokio::test]
    async fn test_global_adjust_and_refuse_negative() {
        let (db, tenant, item) = setup().await;
        let ledger = db.stock();

        let change = ledger.adjust_stock(adj(&tenant, &item, None, -3)).await.unwrap();
        assert_eq!(change.level_after, 2);
        assert!(change.branch_id.is_none());

        let err = ledger.adjust_stock(adj(&tenant, &item, None, -3)).await.unwrap_err();
        match err.as_domain() {
            Some(CoreError::InsufficientStock { requested, available, label, .. }) => {
                assert_eq!(*requested, 3);
                assert_eq!(*available, 2);
                assert_eq!(label, "T-1");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let stock = ledger.get_item_stock(&tenant.id, &item.id).await.unwrap();
        assert_eq!(stock.mode, StockMode::Global);
        assert_eq!(stock.total, 2);
        assert!(stock.by_branch.is_empty());
    }

    #[tokio::test]
    async fn test_zero_delta_records_nothing() {
        let (db, tenant, item) = setup().await;
        let change = db.stock().adjust_stock(adj(&tenant, &item, None, 0)).await.unwrap();
        assert!(change.movement_id.is_none());
        assert_eq!(change.level_after, 5);

        let history = db.stock().list_movements(&tenant.id, &item.id, None).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_global_mode_ignores_branch() {
        let (db, tenant, item) = setup().await;
        let change = db
            .stock()
            .adjust_stock(adj(&tenant, &item, Some("whatever"), 1))
            .await
            .unwrap();
        assert!(change.branch_id.is_none());
        assert_eq!(change.level_after, 6);
    }

    #[tokio::test]
    async fn test_by_branch_rows_and_denormalized_total() {
        let (db, tenant, item) = setup().await;
        let (a, b) = to_by_branch(&db, &tenant).await;
        let ledger = db.stock();

        let err = ledger.adjust_stock(adj(&tenant, &item, None, 4)).await.unwrap_err();
        assert_eq!(err.code(), "BRANCH_REQUIRED");
        let err = ledger
            .adjust_stock(adj(&tenant, &item, Some("ghost"), 4))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BRANCH_NOT_FOUND");

        ledger.adjust_stock(adj(&tenant, &item, Some(&a), 4)).await.unwrap();
        ledger.adjust_stock(adj(&tenant, &item, Some(&b), 6)).await.unwrap();

        // first write to an absent row starts at 0
        let err = ledger.adjust_stock(adj(&tenant, &item, Some(&a), -5)).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");

        let stock = ledger.get_item_stock(&tenant.id, &item.id).await.unwrap();
        assert_eq!(stock.mode, StockMode::ByBranch);
        assert_eq!(stock.total, 10);
        assert_eq!(stock.by_branch.len(), 2);
        assert_eq!(stock.by_branch.iter().map(|b| b.stock).sum::<i64>(), 10);

        let item_row = db.items().get(&tenant.id, &item.id).await.unwrap().unwrap();
        assert_eq!(item_row.stock, Some(10));

        // deleted branches stop counting
        db.tenants().delete_branch(&tenant.id, &b).await.unwrap();
        let stock = ledger.get_item_stock(&tenant.id, &item.id).await.unwrap();
        assert_eq!(stock.total, 4);
        assert_eq!(stock.by_branch.len(), 1);
    }

    #[tokio::test]
    async fn test_set_stock_computes_delta() {
        let (db, tenant, item) = setup().await;
        let change = db
            .stock()
            .set_stock(&tenant.id, &item.id, None, 9, "u", Some("recount"))
            .await
            .unwrap();
        assert_eq!(change.delta, 4);
        assert_eq!(change.level_after, 9);

        let same = db
            .stock()
            .set_stock(&tenant.id, &item.id, None, 9, "u", None)
            .await
            .unwrap();
        assert!(same.movement_id.is_none());

        assert!(db
            .stock()
            .set_stock(&tenant.id, &item.id, None, -1, "u", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_transfer_between_branches() {
        let (db, tenant, item) = setup().await;
        let ledger = db.stock();

        let err = ledger
            .transfer_stock(&tenant.id, &item.id, "x", "y", 1, "u", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STOCK_MODE");

        let (a, b) = to_by_branch(&db, &tenant).await;
        ledger.adjust_stock(adj(&tenant, &item, Some(&a), 5)).await.unwrap();

        let (out, inbound) = ledger
            .transfer_stock(&tenant.id, &item.id, &a, &b, 3, "u", None)
            .await
            .unwrap();
        assert_eq!(out.level_after, 2);
        assert_eq!(inbound.level_after, 3);

        let err = ledger
            .transfer_stock(&tenant.id, &item.id, &a, &b, 3, "u", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");

        let stock = ledger.get_item_stock(&tenant.id, &item.id).await.unwrap();
        assert_eq!(stock.total, 5);
    }

    #[tokio::test]
    async fn test_kardex_running_stock() {
        let (db, tenant, item) = setup().await;
        let ledger = db.stock();
        ledger.adjust_stock(adj(&tenant, &item, None, -2)).await.unwrap();
        ledger.adjust_stock(adj(&tenant, &item, None, 10)).await.unwrap();

        let history = ledger.list_movements(&tenant.id, &item.id, None).await.unwrap();
        let deltas: Vec<i64> = history.iter().map(|h| h.movement.quantity_delta).collect();
        let after: Vec<i64> = history.iter().map(|h| h.stock_after).collect();
        assert_eq!(deltas, vec![10, -2, 5]);
        assert_eq!(after, vec![13, 3, 5]);
    }

    #[tokio::test]
    async fn test_kardex_anchors_on_mode_total() {
        let (db, tenant, item) = setup().await;
        let branch = db.tenants().create_branch(&tenant.id, "Centro").await.unwrap();
        db.tenants()
            .set_stock_mode(&tenant.id, StockMode::ByBranch)
            .await
            .unwrap();

        // products.stock still holds the global 5; no branch row exists yet
        let ledger = db.stock();
        let history = ledger.list_movements(&tenant.id, &item.id, None).await.unwrap();
        let total = ledger.get_item_stock(&tenant.id, &item.id).await.unwrap().total;
        assert_eq!(total, 0);
        assert_eq!(history[0].stock_after, total);

        ledger
            .adjust_stock(adj(&tenant, &item, Some(&branch.id), 3))
            .await
            .unwrap();
        let history = ledger.list_movements(&tenant.id, &item.id, None).await.unwrap();
        assert_eq!(history[0].movement.quantity_delta, 3);
        assert_eq!(history[0].stock_after, 3);

        let scoped = ledger
            .list_movements(&tenant.id, &item.id, Some(&branch.id))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].stock_after, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contended_decrements_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(
            DbConfig::new(dir.path().join("ledger.db"))
                .max_connections(8)
                .busy_timeout(std::time::Duration::from_secs(30)),
        )
        .await
        .unwrap();
        let tenant = db
            .tenants()
            .create("Ferretería", "ARS", StockMode::Global)
            .await
            .unwrap();
        let item = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Arandela".to_string(),
                    sku: Some("A-1".to_string()),
                    price_cents: 50,
                    initial_stock: Some(10),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = db.stock();
            let request = adj(&tenant, &item, None, -1);
            handles.push(tokio::spawn(async move { ledger.adjust_stock(request).await }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e.code(), "INSUFFICIENT_STOCK"),
            }
        }
        assert_eq!(ok, 10);

        let stock = db.stock().get_item_stock(&tenant.id, &item.id).await.unwrap();
        assert_eq!(stock.total, 0);
        let history = db.stock().list_movements(&tenant.id, &item.id, None).await.unwrap();
        assert_eq!(history.len(), 11);
        assert!(history.iter().all(|h| h.stock_after >= 0));
        db.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_go_negative() {
        let (db, tenant, item) = setup().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = db.stock();
            let request = adj(&tenant, &item, None, -1);
            handles.push(tokio::spawn(async move { ledger.adjust_stock(request).await }));
        }

        let mut ok = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => {
                    assert_eq!(e.code(), "INSUFFICIENT_STOCK");
                    refused += 1;
                }
            }
        }
        assert_eq!(ok, 5);
        assert_eq!(refused, 3);

        let stock = db.stock().get_item_stock(&tenant.id, &item.id).await.unwrap();
        assert_eq!(stock.total, 0);
    }
}
