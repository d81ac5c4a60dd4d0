//! # Sale Totals
//!
//! Discount, surcharge and total of a sale from its line totals.
//!
//! ## Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  subtotal  = Σ line_total                                               │
//! │                                                                         │
//! │  discount  = NONE    → 0                                                │
//! │              PERCENT → min(subtotal, subtotal × pct)                    │
//! │              FIXED   → min(subtotal, value)                             │
//! │                                                                         │
//! │  surcharge = NONE    → 0                                                │
//! │              PERCENT → (subtotal - discount) × pct                      │
//! │              FIXED   → value                                            │
//! │                                                                         │
//! │  total     = subtotal - discount + surcharge                            │
//! │                                                                         │
//! │  0 <= discount <= subtotal, surcharge >= 0, so total >= 0               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Percentages are basis points (1000 = 10%) so every step stays integer.
//! A percent discount above 100% is clamped to the subtotal; a percent
//! surcharge has no upper bound. Any sum that leaves i64 is a
//! `TooLarge` validation error, never a panic.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::MAX_AMOUNT_CENTS;

// =============================================================================
// Adjustment
// =============================================================================

/// Stored discriminant of an [`Adjustment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdjustmentKind {
    None,
    Percent,
    Fixed,
}

/// A discount or surcharge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Adjustment {
    #[default]
    None,
    /// Basis points of the base amount.
    Percent { bps: i64 },
    /// Flat amount in the sale currency.
    Fixed { amount: Money },
}

impl Adjustment {
    /// Whole-percent shorthand: `percent(10)` is 10%.
    pub const fn percent(whole: i64) -> Self {
        Adjustment::Percent { bps: whole * 100 }
    }

    pub const fn fixed(amount: Money) -> Self {
        Adjustment::Fixed { amount }
    }

    pub fn kind(&self) -> AdjustmentKind {
        match self {
            Adjustment::None => AdjustmentKind::None,
            Adjustment::Percent { .. } => AdjustmentKind::Percent,
            Adjustment::Fixed { .. } => AdjustmentKind::Fixed,
        }
    }

    /// Value as persisted next to the kind: bps, minor units, or 0.
    pub fn stored_value(&self) -> i64 {
        match self {
            Adjustment::None => 0,
            Adjustment::Percent { bps } => *bps,
            Adjustment::Fixed { amount } => amount.cents(),
        }
    }

    /// Rebuilds an adjustment from its persisted columns.
    pub fn from_stored(kind: AdjustmentKind, value: i64) -> Self {
        match kind {
            AdjustmentKind::None => Adjustment::None,
            AdjustmentKind::Percent => Adjustment::Percent { bps: value },
            AdjustmentKind::Fixed => Adjustment::Fixed {
                amount: Money::from_cents(value),
            },
        }
    }

    fn validate(&self, field: &str) -> Result<(), ValidationError> {
        match self {
            Adjustment::None => Ok(()),
            Adjustment::Percent { bps } if *bps >= 0 => Ok(()),
            Adjustment::Percent { .. } => Err(ValidationError::out_of_range(field, 0, i64::MAX)),
            Adjustment::Fixed { amount } if (0..=MAX_AMOUNT_CENTS).contains(&amount.cents()) => {
                Ok(())
            }
            Adjustment::Fixed { .. } => {
                Err(ValidationError::out_of_range(field, 0, MAX_AMOUNT_CENTS))
            }
        }
    }

    /// Raw amount of this adjustment on `base`, uncapped.
    fn amount_on(&self, field: &str, base: Money) -> Result<Money, ValidationError> {
        match self {
            Adjustment::None => Ok(Money::zero()),
            Adjustment::Percent { bps } => base
                .percentage_of(*bps)
                .ok_or_else(|| ValidationError::too_large(field)),
            Adjustment::Fixed { amount } => Ok(*amount),
        }
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Computed amounts of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub surcharge: Money,
    pub total: Money,
}

impl SaleTotals {
    /// Computes totals from line totals and the requested adjustments.
    ///
    /// Fails with a validation error on negative lines, negative or
    /// oversized fixed amounts, negative percentages, and totals that do
    /// not fit in minor units.
    pub fn compute(
        line_totals: &[Money],
        discount: Adjustment,
        surcharge: Adjustment,
    ) -> CoreResult<SaleTotals> {
        if line_totals.iter().any(Money::is_negative) {
            return Err(ValidationError::out_of_range("lineTotal", 0, i64::MAX).into());
        }
        discount.validate("discount")?;
        surcharge.validate("surcharge")?;

        let subtotal =
            Money::checked_sum(line_totals).ok_or_else(|| ValidationError::too_large("subtotal"))?;
        let discount = discount.amount_on("discount", subtotal)?.min(subtotal);
        let surcharge = surcharge.amount_on("surcharge", subtotal - discount)?;
        let total = (subtotal - discount)
            .checked_add(surcharge)
            .ok_or_else(|| ValidationError::too_large("total"))?;

        Ok(SaleTotals {
            subtotal,
            discount,
            surcharge,
            total,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
