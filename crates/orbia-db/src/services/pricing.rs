//! # Pricing Resolver
//!
//! Resolves the unit price an item sells for in a given currency.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Item ──► orbia_core::pricing::price_source ──► (amount, currency)      │
//! │                                                      │                  │
//! │                        currency == target? ── yes ──► rate = 1          │
//! │                                                      │ no               │
//! │                               RateCache hit? ─ yes ──► cached rate      │
//! │                                                      │ no               │
//! │                                         find_rate (tenant, then global) │
//! │                                                      │                  │
//! │                                                      ▼                  │
//! │                          orbia_core::pricing::unit_price (round once)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two callers, two failure policies:
//! - the commit pipeline aborts on any pricing error;
//! - the catalog falls back to the stored manual price and flags the row.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use orbia_core::pricing::{price_source, unit_price};
use orbia_core::validation::normalize_currency;
use orbia_core::{CoreError, Item, Money};

use crate::error::{DbError, EngineError, EngineResult};
use crate::repository::exchange::find_rate;
use crate::repository::tenant::fetch_tenant;

/// Rates already looked up during one operation, keyed by `(base, target)`.
///
/// Lives for a single catalog page or sale commit, never longer, so a rate
/// edit is visible to the next operation.
#[derive(Debug, Default)]
pub struct RateCache {
    rates: HashMap<(String, String), Decimal>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn rate(
        &mut self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        base: &str,
        target: &str,
    ) -> EngineResult<Decimal> {
        if base == target {
            return Ok(Decimal::ONE);
        }
        let key = (base.to_string(), target.to_string());
        if let Some(rate) = self.rates.get(&key) {
            return Ok(*rate);
        }
        let rate = find_rate(conn, Some(tenant_id), base, target).await?;
        self.rates.insert(key, rate);
        Ok(rate)
    }
}

/// Resolves on an existing connection (or transaction).
pub(crate) async fn resolve_on(
    conn: &mut SqliteConnection,
    cache: &mut RateCache,
    tenant_id: &str,
    store_currency: &str,
    item: &Item,
    target_currency: &str,
) -> EngineResult<Money> {
    let target = target_currency.trim().to_ascii_uppercase();
    let source = price_source(item, store_currency)?;
    let rate = cache.rate(conn, tenant_id, &source.currency, &target).await?;

    let price = unit_price(&source, rate).map_err(|e| match e {
        CoreError::PricingConfigInvalid { reason, .. } => CoreError::PricingConfigInvalid {
            item_id: item.id.clone(),
            reason,
        },
        other => other,
    })?;

    debug!(
        item_id = %item.id,
        from = %source.currency,
        to = %target,
        rate = %rate,
        price = %price,
        "Unit price resolved"
    );
    Ok(price)
}

/// Listing variant: returns `(price, is_fallback)`.
///
/// Domain failures (missing rate, broken MARGIN data) degrade to the stored
/// manual price. Store failures still propagate.
pub(crate) async fn estimate_on(
    conn: &mut SqliteConnection,
    cache: &mut RateCache,
    tenant_id: &str,
    store_currency: &str,
    item: &Item,
) -> EngineResult<(Money, bool)> {
    match resolve_on(conn, cache, tenant_id, store_currency, item, store_currency).await {
        Ok(price) => Ok((price, false)),
        Err(EngineError::Domain(e)) => {
            warn!(
                tenant_id = %tenant_id,
                item_id = %item.id,
                code = e.code(),
                error = %e,
                "Pricing failed, showing manual price"
            );
            Ok((item.price(), true))
        }
        Err(e) => Err(e),
    }
}

/// Read-only pricing service.
#[derive(Debug, Clone)]
pub struct PricingResolver {
    pool: SqlitePool,
}

impl PricingResolver {
    /// Creates a new PricingResolver.
    pub fn new(pool: SqlitePool) -> Self {
        PricingResolver { pool }
    }

    /// Unit price of `item` in `target_currency` for the tenant.
    ///
    /// Fails with `RateNotFound` or `PricingConfigInvalid`; no fallback.
    pub async fn resolve_unit_price(
        &self,
        item: &Item,
        tenant_id: &str,
        target_currency: &str,
    ) -> EngineResult<Money> {
        let target = normalize_currency(target_currency)?;
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        let tenant = fetch_tenant(&mut conn, tenant_id).await?;
        let mut cache = RateCache::new();
        resolve_on(&mut conn, &mut cache, tenant_id, &tenant.currency, item, &target).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use orbia_core::{ItemDraft, PricingMode, StockMode, Tenant};

    async fn setup() -> (Database, Tenant) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create("Almacén", "ARS", StockMode::Global)
            .await
            .unwrap();
        (db, tenant)
    }

    #[tokio::test]
    async fn test_manual_same_currency_is_identity() {
        let (db, tenant) = setup().await;
        let item = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Yerba".to_string(),
                    price_cents: 25_050,
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();

        let price = db
            .pricing()
            .resolve_unit_price(&item, &tenant.id, "ars")
            .await
            .unwrap();
        assert_eq!(price.cents(), 25_050);
    }

    #[tokio::test]
    async fn test_manual_usd_item_converted() {
        let (db, tenant) = setup().await;
        db.rates().upsert(None, "USD", "ARS", Decimal::from(1_000)).await.unwrap();
        let item = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Auriculares".to_string(),
                    price_cents: 1_000,
                    currency: Some("usd".to_string()),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();

        let price = db.pricing().resolve_unit_price(&item, &tenant.id, "ARS").await.unwrap();
        assert_eq!(price, Money::from_major(10_000));
    }

    #[tokio::test]
    async fn test_margin_item_price_on_final_price() {
        let (db, tenant) = setup().await;
        let item = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Cable".to_string(),
                    pricing_mode: PricingMode::Margin,
                    cost_amount_cents: Some(8_000),
                    cost_currency: Some("ARS".to_string()),
                    margin_bps: Some(2_000),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();

        let price = db.pricing().resolve_unit_price(&item, &tenant.id, "ARS").await.unwrap();
        assert_eq!(price, Money::from_major(100));
    }

    #[tokio::test]
    async fn test_missing_rate_fails_but_estimate_falls_back() {
        let (db, tenant) = setup().await;
        let item = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Perfume".to_string(),
                    price_cents: 5_000,
                    currency: Some("EUR".to_string()),
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();

        let err = db
            .pricing()
            .resolve_unit_price(&item, &tenant.id, "ARS")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RATE_NOT_FOUND");

        let mut conn = db.pool().acquire().await.unwrap();
        let mut cache = RateCache::new();
        let (price, fallback) = estimate_on(&mut conn, &mut cache, &tenant.id, "ARS", &item)
            .await
            .unwrap();
        assert!(fallback);
        assert_eq!(price.cents(), 5_000);
    }

    #[tokio::test]
    async fn test_broken_margin_row_reports_item() {
        let (db, tenant) = setup().await;
        let mut item = db
            .items()
            .create(
                &tenant.id,
                "u",
                ItemDraft {
                    name: "Legacy".to_string(),
                    price_cents: 700,
                    ..ItemDraft::default()
                },
            )
            .await
            .unwrap();
        // row as written before write-time checks existed
        item.pricing_mode = PricingMode::Margin;

        let err = db
            .pricing()
            .resolve_unit_price(&item, &tenant.id, "ARS")
            .await
            .unwrap_err();
        match err.as_domain() {
            Some(CoreError::PricingConfigInvalid { item_id, .. }) => assert_eq!(item_id, &item.id),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
