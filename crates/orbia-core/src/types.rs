//! # Domain Types
//!
//! Core domain types used throughout Orbia.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Item       │   │      Sale       │   │  StockMovement  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  append-only    │       │
//! │  │  sku (business) │   │  sale_number    │   │  quantity_delta │       │
//! │  │  pricing_mode   │   │  totals         │   │  reason         │       │
//! │  │  stock (global) │   │  SaleItem[]     │   │  actor          │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   StockMode     │   │  PricingMode    │   │  ExchangeRate   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Global         │   │  Manual         │   │  tenant? / pair │       │
//! │  │  ByBranch       │   │  Margin         │   │  rate (Decimal) │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! `SaleItem` copies name, code and price at commit time. Later edits to the
//! live `Item` never change a historical sale.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::totals::{Adjustment, AdjustmentKind};

// =============================================================================
// Tenant Settings
// =============================================================================

/// Which inventory representation is authoritative for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockMode {
    /// One integer per item for the whole tenant (`products.stock`).
    Global,
    /// One row per (item, branch); the item total is their sum.
    ByBranch,
}

impl StockMode {
    /// Effective mode from the stored preference and the live branch count.
    ///
    /// A tenant without branches is always global, whatever it prefers.
    pub fn effective(preference: StockMode, live_branches: i64) -> StockMode {
        if live_branches > 0 && preference == StockMode::ByBranch {
            StockMode::ByBranch
        } else {
            StockMode::Global
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockMode::Global => "global",
            StockMode::ByBranch => "by_branch",
        }
    }
}

impl Default for StockMode {
    fn default() -> Self {
        StockMode::Global
    }
}

/// An isolated business account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Store currency; items without their own currency are priced in it.
    pub currency: String,
    /// Stored preference. See [`StockMode::effective`].
    pub stock_mode: StockMode,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A physical store of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Items
// =============================================================================

/// How the sale price of an item is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum PricingMode {
    /// `price_cents` as entered.
    Manual,
    /// Derived from cost and a margin on the final price.
    Margin,
}

impl Default for PricingMode {
    fn default() -> Self {
        PricingMode::Manual
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub sort_order: i64,
}

/// A catalog item (product).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub tenant_id: String,
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// Normalized code, unique per tenant.
    pub sku: Option<String>,
    /// Manual price in `currency` minor units.
    pub price_cents: i64,
    /// Informational cost, kept for reporting.
    pub cost_cents: Option<i64>,
    /// Native currency of `price_cents`; `None` means the store currency.
    pub currency: Option<String>,
    pub pricing_mode: PricingMode,
    /// MARGIN only: cost in `cost_currency` minor units.
    pub cost_amount_cents: Option<i64>,
    pub cost_currency: Option<String>,
    /// MARGIN only: margin on final price, basis points (2000 = 20%).
    pub margin_bps: Option<i64>,
    /// Global-mode stock; in by-branch mode a denormalized branch sum.
    pub stock: Option<i64>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Human label for error messages: the code if present, else the id.
    pub fn label(&self) -> &str {
        self.sku.as_deref().unwrap_or(&self.id)
    }

    /// Currency `price_cents` is expressed in.
    pub fn native_currency<'a>(&'a self, store_currency: &'a str) -> &'a str {
        self.currency.as_deref().unwrap_or(store_currency)
    }
}

/// Input for creating or replacing an item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price_cents: i64,
    pub cost_cents: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub pricing_mode: PricingMode,
    pub cost_amount_cents: Option<i64>,
    pub cost_currency: Option<String>,
    pub margin_bps: Option<i64>,
    /// Opening stock; honoured only in global mode.
    pub initial_stock: Option<i64>,
}

// =============================================================================
// Stock
// =============================================================================

/// Why a stock quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    /// Opening stock at item creation.
    Initial,
    /// Decrement by a committed sale.
    Sale,
    /// Manual correction.
    Adjustment,
    TransferOut,
    TransferIn,
}

/// Immutable audit record of one stock change.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    pub branch_id: Option<String>,
    pub quantity_delta: i64,
    pub reason: MovementReason,
    pub note: Option<String>,
    /// Sale id for `Sale` movements.
    pub reference_id: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Movement plus the running stock level after it (kardex line).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MovementHistoryEntry {
    #[serde(flatten)]
    pub movement: StockMovement,
    pub stock_after: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BranchStock {
    pub branch_id: String,
    pub branch_name: String,
    pub stock: i64,
}

/// Stock view of one item under the tenant's current mode.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemStock {
    pub item_id: String,
    pub mode: StockMode,
    pub total: i64,
    /// Every live branch, zero-filled; empty in global mode.
    pub by_branch: Vec<BranchStock>,
}

// =============================================================================
// Exchange Rates
// =============================================================================

/// Conversion factor `1 base = rate target`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub id: String,
    /// `None` for the global row.
    pub tenant_id: Option<String>,
    pub base_currency: String,
    pub target_currency: String,
    #[ts(as = "String")]
    pub rate: Decimal,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sales
// =============================================================================

/// Payment label. No processor is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Card,
    Other,
}

/// One cart line as submitted by the register.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    /// Cashier-entered price; MANUAL items only.
    #[serde(default)]
    pub unit_price_override: Option<Money>,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            product_id: product_id.into(),
            quantity,
            unit_price_override: None,
        }
    }
}

/// Everything the commit pipeline needs, already authenticated upstream.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleDraft {
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub actor_id: String,
    pub customer_id: Option<String>,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    #[serde(default)]
    pub discount: Adjustment,
    #[serde(default)]
    pub surcharge: Adjustment,
    pub lines: Vec<CartLine>,
}

/// Persisted sale header. Immutable after commit.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    /// Raw per-tenant counter value.
    pub sale_seq: i64,
    /// Rendered number, e.g. `V-000042`.
    pub sale_number: String,
    pub currency: String,
    pub subtotal_cents: i64,
    pub discount_type: AdjustmentKind,
    /// Basis points for PERCENT, minor units for FIXED, 0 for NONE.
    pub discount_value: i64,
    pub discount_cents: i64,
    pub surcharge_type: AdjustmentKind,
    pub surcharge_value: i64,
    pub surcharge_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// Frozen line of a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub product_id: String,
    pub product_name_snapshot: String,
    pub sku_snapshot: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// Sale header with its lines, as handed to receipt printing.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

// =============================================================================
// Unit Tests
// =============================================================================
