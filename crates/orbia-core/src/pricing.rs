//! # Pricing Module
//!
//! The arithmetic half of the pricing resolver. Rate lookups live in
//! `orbia-db`; everything here is a pure function of item data and a rate.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  MANUAL                          MARGIN                                 │
//! │  ──────                          ──────                                 │
//! │  amount   = price                amount   = cost / (1 - margin)        │
//! │  currency = item.currency        currency = cost_currency              │
//! │             ?? store currency                                          │
//! │                    │                        │                           │
//! │                    └──────────┬─────────────┘                           │
//! │                               ▼                                         │
//! │            unit price = round2(amount × rate(currency → target))       │
//! │                                                                         │
//! │  Margin is on the FINAL price: 80 at 20% → 100 (not 96).               │
//! │  Rounding happens once, after conversion, half away from zero.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Item, PricingMode};
use crate::MAX_MARGIN_BPS;

// =============================================================================
// Price Source
// =============================================================================

/// Unrounded price of an item in its own currency, before conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSource {
    pub amount: Decimal,
    /// Uppercase currency code of `amount`.
    pub currency: String,
}

/// Determines what an item costs and in which currency.
///
/// MARGIN items without cost, cost currency or a valid margin fail with
/// [`CoreError::PricingConfigInvalid`]; item writes reject those, so this
/// only fires on rows that predate the check.
pub fn price_source(item: &Item, store_currency: &str) -> CoreResult<PriceSource> {
    match item.pricing_mode {
        PricingMode::Manual => Ok(PriceSource {
            amount: item.price().to_decimal(),
            currency: item.native_currency(store_currency).to_ascii_uppercase(),
        }),
        PricingMode::Margin => {
            let invalid = |reason: &str| CoreError::PricingConfigInvalid {
                item_id: item.id.clone(),
                reason: reason.to_string(),
            };

            let cost = item
                .cost_amount_cents
                .ok_or_else(|| invalid("missing cost amount"))?;
            let cost_currency = item
                .cost_currency
                .as_deref()
                .ok_or_else(|| invalid("missing cost currency"))?;
            let margin_bps = item.margin_bps.ok_or_else(|| invalid("missing margin"))?;

            let amount = margin_price(Money::from_cents(cost), margin_bps).map_err(|e| match e {
                CoreError::PricingConfigInvalid { reason, .. } => invalid(&reason),
                other => other,
            })?;

            Ok(PriceSource {
                amount,
                currency: cost_currency.to_ascii_uppercase(),
            })
        }
    }
}

/// `cost / (1 - margin_bps / 10000)`, unrounded.
///
/// ```rust
/// use orbia_core::money::Money;
/// use orbia_core::pricing::margin_price;
///
/// let price = margin_price(Money::from_major(80), 2_000).unwrap();
/// assert_eq!(Money::from_decimal(price).unwrap(), Money::from_major(100));
/// ```
pub fn margin_price(cost: Money, margin_bps: i64) -> CoreResult<Decimal> {
    if cost.is_negative() {
        return Err(config_invalid("cost amount must not be negative"));
    }
    if !(0..MAX_MARGIN_BPS).contains(&margin_bps) {
        return Err(config_invalid("margin must be at least 0% and below 100%"));
    }

    let keep = Decimal::from(MAX_MARGIN_BPS - margin_bps) / Decimal::from(MAX_MARGIN_BPS);
    cost.to_decimal()
        .checked_div(keep)
        .ok_or_else(|| config_invalid("margin price overflow"))
}

fn config_invalid(reason: &str) -> CoreError {
    CoreError::PricingConfigInvalid {
        item_id: String::new(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// Conversion
// =============================================================================

/// Applies `rate` and rounds to minor units once.
///
/// ```rust
/// use orbia_core::money::Money;
/// use orbia_core::pricing::convert;
/// use rust_decimal::Decimal;
///
/// // 10 USD at 1000 ARS/USD
/// let ars = convert(Money::from_major(10).to_decimal(), Decimal::from(1000)).unwrap();
/// assert_eq!(ars, Money::from_major(10_000));
/// ```
pub fn convert(amount: Decimal, rate: Decimal) -> CoreResult<Money> {
    amount
        .checked_mul(rate)
        .and_then(Money::from_decimal)
        .ok_or_else(|| config_invalid("converted price out of range"))
}

/// Final unit price of `source` given the rate from its currency to the
/// target (1 for the same currency).
pub fn unit_price(source: &PriceSource, rate: Decimal) -> CoreResult<Money> {
    let price = convert(source.amount, rate)?;
    if price.is_negative() {
        return Err(config_invalid("resolved price is negative"));
    }
    Ok(price)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    fn item(mode: PricingMode) -> Item {
        Item {
            id: "item-1".to_string(),
            tenant_id: "t-1".to_string(),
            category_id: None,
            name: "Widget".to_string(),
            description: None,
            sku: Some("W-1".to_string()),
            price_cents: 1_000,
            cost_cents: None,
            currency: None,
            pricing_mode: mode,
            cost_amount_cents: None,
            cost_currency: None,
            margin_bps: None,
            stock: Some(10),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_margin_is_on_final_price() {
        let price = margin_price(Money::from_major(80), 2_000).unwrap();
        assert_eq!(Money::from_decimal(price).unwrap().cents(), 10_000);

        // Zero margin sells at cost
        let price = margin_price(Money::from_cents(1_234), 0).unwrap();
        assert_eq!(Money::from_decimal(price).unwrap().cents(), 1_234);
    }

    #[test]
    fn test_margin_bounds() {
        assert!(margin_price(Money::from_major(80), 10_000).is_err());
        assert!(margin_price(Money::from_major(80), -1).is_err());
        assert!(margin_price(Money::from_cents(-1), 2_000).is_err());
    }

    #[test]
    fn test_manual_price_uses_store_currency_by_default() {
        let source = price_source(&item(PricingMode::Manual), "ars").unwrap();
        assert_eq!(source.currency, "ARS");
        assert_eq!(source.amount, Decimal::from_str("10.00").unwrap());
    }

    #[test]
    fn test_manual_price_converted() {
        let mut it = item(PricingMode::Manual);
        it.currency = Some("USD".to_string());
        let source = price_source(&it, "ARS").unwrap();
        assert_eq!(source.currency, "USD");

        let price = unit_price(&source, Decimal::from(1_000)).unwrap();
        assert_eq!(price.cents(), 1_000_000);
    }

    #[test]
    fn test_margin_item_rounds_once_after_conversion() {
        let mut it = item(PricingMode::Margin);
        it.cost_amount_cents = Some(1_000);
        it.cost_currency = Some("usd".to_string());
        it.margin_bps = Some(3_000);

        // 10 / 0.7 = 14.285714.. ; × 1.5 = 21.428571.. → 21.43
        let source = price_source(&it, "ARS").unwrap();
        assert_eq!(source.currency, "USD");
        let price = unit_price(&source, Decimal::from_str("1.5").unwrap()).unwrap();
        assert_eq!(price.cents(), 2_143);
    }

    #[test]
    fn test_margin_item_missing_data_names_item() {
        let mut it = item(PricingMode::Margin);
        it.cost_amount_cents = Some(1_000);
        it.cost_currency = Some("USD".to_string());

        match price_source(&it, "ARS") {
            Err(CoreError::PricingConfigInvalid { item_id, reason }) => {
                assert_eq!(item_id, "item-1");
                assert_eq!(reason, "missing margin");
            }
            other => panic!("unexpected: {:?}", other),
        }

        it.margin_bps = Some(10_000);
        match price_source(&it, "ARS") {
            Err(CoreError::PricingConfigInvalid { item_id, .. }) => assert_eq!(item_id, "item-1"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
