//! # Tenant Repository
//!
//! Tenants, branches and the stock-mode selector.
//!
//! ## Stock Mode Selector
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stored preference   live branches   effective mode                     │
//! │  ─────────────────   ─────────────   ──────────────                     │
//! │  global              any             global                             │
//! │  by_branch           0               global                             │
//! │  by_branch           ≥ 1             by_branch                          │
//! │                                                                         │
//! │  Read at the start of every operation through `load_context`.          │
//! │  The ledger, the catalog and the commit pipeline all ask here; none    │
//! │  of them infers the mode on its own.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use orbia_core::validation::{normalize_currency, validate_name};
use orbia_core::{Branch, CoreError, StockMode, Tenant};

use crate::error::{DbError, DbResult, EngineResult};

/// Tenant settings resolved for one operation.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
    /// Effective mode (preference gated by live branches).
    pub mode: StockMode,
}

impl TenantContext {
    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    /// Store currency, uppercase.
    pub fn currency(&self) -> &str {
        &self.tenant.currency
    }
}

// =============================================================================
// Connection-level helpers (usable inside a transaction)
// =============================================================================

pub(crate) async fn fetch_tenant(conn: &mut SqliteConnection, tenant_id: &str) -> DbResult<Tenant> {
    sqlx::query_as::<_, Tenant>(
        "SELECT id, name, currency, stock_mode, created_at FROM tenants WHERE id = ?1",
    )
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Tenant", tenant_id))
}

async fn count_live_branches(conn: &mut SqliteConnection, tenant_id: &str) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM branches WHERE tenant_id = ?1 AND deleted_at IS NULL",
    )
    .bind(tenant_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Loads the tenant and its effective stock mode.
pub(crate) async fn load_context(
    conn: &mut SqliteConnection,
    tenant_id: &str,
) -> DbResult<TenantContext> {
    let tenant = fetch_tenant(conn, tenant_id).await?;
    let live = count_live_branches(conn, tenant_id).await?;
    let mode = StockMode::effective(tenant.stock_mode, live);

    debug!(tenant_id = %tenant_id, mode = mode.as_str(), live_branches = live, "Resolved stock mode");
    Ok(TenantContext { tenant, mode })
}

/// Fetches a branch that is live and belongs to the tenant.
pub(crate) async fn require_live_branch(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
) -> EngineResult<Branch> {
    let branch = sqlx::query_as::<_, Branch>(
        r#"
        SELECT id, tenant_id, name, deleted_at, created_at
        FROM branches
        WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL
        "#,
    )
    .bind(branch_id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?;

    branch.ok_or_else(|| CoreError::BranchNotFound(branch_id.to_string()).into())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for tenants and branches.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    pool: SqlitePool,
}

impl TenantRepository {
    /// Creates a new TenantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TenantRepository { pool }
    }

    /// Creates a tenant with a store currency and a stock-mode preference.
    pub async fn create(
        &self,
        name: &str,
        currency: &str,
        stock_mode: StockMode,
    ) -> EngineResult<Tenant> {
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            name: validate_name("name", name)?,
            currency: normalize_currency(currency)?,
            stock_mode,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO tenants (id, name, currency, stock_mode, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.currency)
        .bind(tenant.stock_mode)
        .bind(tenant.created_at)
        .execute(&self.pool)
        .await?;

        info!(tenant_id = %tenant.id, currency = %tenant.currency, "Tenant created");
        Ok(tenant)
    }

    /// Gets a tenant by ID.
    pub async fn get(&self, tenant_id: &str) -> DbResult<Option<Tenant>> {
        let mut conn = self.pool.acquire().await?;
        match fetch_tenant(&mut conn, tenant_id).await {
            Ok(t) => Ok(Some(t)),
            Err(DbError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Effective stock mode right now.
    pub async fn resolve_stock_mode(&self, tenant_id: &str) -> DbResult<StockMode> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_context(&mut conn, tenant_id).await?.mode)
    }

    /// Stores the stock-mode preference.
    ///
    /// `by_branch` needs at least one live branch, otherwise
    /// [`CoreError::InvalidStockMode`]. Returns the new effective mode.
    pub async fn set_stock_mode(&self, tenant_id: &str, mode: StockMode) -> EngineResult<StockMode> {
        let mut tx = crate::pool::begin_tenant_write(&self.pool, tenant_id).await?;

        if mode == StockMode::ByBranch && count_live_branches(&mut tx, tenant_id).await? == 0 {
            return Err(CoreError::InvalidStockMode {
                tenant_id: tenant_id.to_string(),
                reason: "tenant has no branches".to_string(),
            }
            .into());
        }

        sqlx::query("UPDATE tenants SET stock_mode = ?1 WHERE id = ?2")
            .bind(mode)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        let effective = load_context(&mut tx, tenant_id).await?.mode;
        tx.commit().await?;

        info!(tenant_id = %tenant_id, mode = effective.as_str(), "Stock mode changed");
        Ok(effective)
    }

    /// Creates a branch.
    pub async fn create_branch(&self, tenant_id: &str, name: &str) -> EngineResult<Branch> {
        let branch = Branch {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: validate_name("name", name)?,
            deleted_at: None,
            created_at: Utc::now(),
        };

        let mut tx = crate::pool::begin_tenant_write(&self.pool, tenant_id).await?;
        sqlx::query(
            "INSERT INTO branches (id, tenant_id, name, deleted_at, created_at) VALUES (?1, ?2, ?3, NULL, ?4)",
        )
        .bind(&branch.id)
        .bind(&branch.tenant_id)
        .bind(&branch.name)
        .bind(branch.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(tenant_id = %tenant_id, branch_id = %branch.id, "Branch created");
        Ok(branch)
    }

    /// Soft-deletes a branch. Its stock rows stop counting toward totals,
    /// even when they still hold units; move them first with
    /// [`StockLedger::transfer_stock`](crate::repository::stock::StockLedger::transfer_stock)
    /// to keep them.
    pub async fn delete_branch(&self, tenant_id: &str, branch_id: &str) -> EngineResult<()> {
        let mut tx = crate::pool::begin_tenant_write(&self.pool, tenant_id).await?;
        require_live_branch(&mut tx, tenant_id, branch_id).await?;

        sqlx::query("UPDATE branches SET deleted_at = ?1 WHERE id = ?2 AND tenant_id = ?3")
            .bind(Utc::now())
            .bind(branch_id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        // Removing the last branch turns the tenant global; products.stock then
        // keeps the last denormalized total as its starting value.
        if load_context(&mut tx, tenant_id).await?.mode == StockMode::ByBranch {
            crate::repository::stock::resync_all_branch_totals(&mut tx, tenant_id).await?;
        }
        tx.commit().await?;

        info!(tenant_id = %tenant_id, branch_id = %branch_id, "Branch deleted");
        Ok(())
    }

    /// Live branches, oldest first.
    pub async fn list_branches(&self, tenant_id: &str) -> DbResult<Vec<Branch>> {
        let branches = sqlx::query_as::<_, Branch>(
            r#"
            SELECT id, tenant_id, name, deleted_at, created_at
            FROM branches
            WHERE tenant_id = ?1 AND deleted_at IS NULL
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(branches)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
