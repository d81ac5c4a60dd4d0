//! # Exchange Rate Repository
//!
//! Conversion factors between currency codes.
//!
//! ## Lookup Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  rate(base, target, tenant?)                                            │
//! │       │                                                                 │
//! │       ├── uppercase both codes                                          │
//! │       ├── base == target?          → 1 (no query)                       │
//! │       ├── tenant row for the pair? → use it                             │
//! │       ├── global row (tenant NULL)? → use it                            │
//! │       └── otherwise                → RateNotFound { base, target }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rates are stored as decimal TEXT so no precision is lost to floats.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use orbia_core::validation::normalize_currency;
use orbia_core::{CoreError, ExchangeRate, ValidationError};

use crate::error::{DbError, DbResult, EngineResult};

#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    id: String,
    tenant_id: Option<String>,
    base_currency: String,
    target_currency: String,
    rate: String,
    updated_at: DateTime<Utc>,
}

impl RateRow {
    fn into_rate(self) -> DbResult<ExchangeRate> {
        Ok(ExchangeRate {
            rate: parse_rate(&self.rate)?,
            id: self.id,
            tenant_id: self.tenant_id,
            base_currency: self.base_currency,
            target_currency: self.target_currency,
            updated_at: self.updated_at,
        })
    }
}

fn parse_rate(raw: &str) -> DbResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| DbError::corrupt("exchange_rates.rate", e.to_string()))
}

// =============================================================================
// Connection-level lookup
// =============================================================================

/// Resolves `1 base = rate target`, tenant row first, global row second.
pub(crate) async fn find_rate(
    conn: &mut SqliteConnection,
    tenant_id: Option<&str>,
    base: &str,
    target: &str,
) -> EngineResult<Decimal> {
    let base = base.trim().to_ascii_uppercase();
    let target = target.trim().to_ascii_uppercase();

    if base == target {
        return Ok(Decimal::ONE);
    }

    // tenant rows sort before the global row
    let raw: Option<String> = sqlx::query_scalar(
        r#"
        SELECT rate
        FROM exchange_rates
        WHERE base_currency = ?1
          AND target_currency = ?2
          AND (tenant_id = ?3 OR tenant_id IS NULL)
        ORDER BY tenant_id IS NULL
        LIMIT 1
        "#,
    )
    .bind(&base)
    .bind(&target)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?;

    match raw {
        Some(raw) => {
            let rate = parse_rate(&raw)?;
            debug!(base = %base, target = %target, rate = %rate, "Exchange rate resolved");
            Ok(rate)
        }
        None => Err(CoreError::RateNotFound { base, target }.into()),
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for exchange rates.
#[derive(Debug, Clone)]
pub struct ExchangeRateRepository {
    pool: SqlitePool,
}

impl ExchangeRateRepository {
    /// Creates a new ExchangeRateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ExchangeRateRepository { pool }
    }

    /// Looks up a rate. See the module docs for the order.
    pub async fn rate(&self, base: &str, target: &str, tenant_id: Option<&str>) -> EngineResult<Decimal> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        find_rate(&mut conn, tenant_id, base, target).await
    }

    /// Inserts or replaces the rate for a pair. `tenant_id = None` writes
    /// the global row.
    pub async fn upsert(
        &self,
        tenant_id: Option<&str>,
        base: &str,
        target: &str,
        rate: Decimal,
    ) -> EngineResult<ExchangeRate> {
        let base = normalize_currency(base)?;
        let target = normalize_currency(target)?;
        if base == target {
            return Err(ValidationError::invalid("targetCurrency", "must differ from baseCurrency").into());
        }
        if rate <= Decimal::ZERO {
            return Err(ValidationError::MustBePositive {
                field: "rate".to_string(),
            }
            .into());
        }

        let rate = rate.normalize();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let updated = sqlx::query(
            r#"
            UPDATE exchange_rates
            SET rate = ?1, updated_at = ?2
            WHERE tenant_id IS ?3 AND base_currency = ?4 AND target_currency = ?5
            "#,
        )
        .bind(rate.to_string())
        .bind(now)
        .bind(tenant_id)
        .bind(&base)
        .bind(&target)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO exchange_rates (id, tenant_id, base_currency, target_currency, rate, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(tenant_id)
            .bind(&base)
            .bind(&target)
            .bind(rate.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT id, tenant_id, base_currency, target_currency, rate, updated_at
            FROM exchange_rates
            WHERE tenant_id IS ?1 AND base_currency = ?2 AND target_currency = ?3
            "#,
        )
        .bind(tenant_id)
        .bind(&base)
        .bind(&target)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(
            tenant_id = tenant_id.unwrap_or("global"),
            base = %base,
            target = %target,
            rate = %rate,
            "Exchange rate saved"
        );
        Ok(row.into_rate()?)
    }

    /// Rates visible to a tenant: its own rows plus the global ones.
    pub async fn list(&self, tenant_id: &str) -> DbResult<Vec<ExchangeRate>> {
        let rows = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT id, tenant_id, base_currency, target_currency, rate, updated_at
            FROM exchange_rates
            WHERE tenant_id = ?1 OR tenant_id IS NULL
            ORDER BY base_currency, target_currency, tenant_id IS NULL
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RateRow::into_rate).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
