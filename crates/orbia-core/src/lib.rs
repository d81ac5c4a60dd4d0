//! # orbia-core: Pure Business Logic for the Orbia back office
//!
//! Everything in this crate is deterministic and free of I/O. The storage
//! crate (`orbia-db`) feeds it rows and persists what it computes.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Orbia Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Request layer (auth, plan gating, HTTP) - external        │   │
//! │  │    resolves tenant / branch / actor, then calls the engine       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    orbia-db (Store + Pipeline)                   │   │
//! │  │   commit_sale, adjust_stock, query_items, rate lookup            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ orbia-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ │   │
//! │  │   │  types  │ │  money  │ │ pricing │ │ totals  │ │ catalog  │ │   │
//! │  │   │  Item   │ │  Money  │ │ margin  │ │discount │ │ filters  │ │   │
//! │  │   │  Sale   │ │         │ │ convert │ │surcharge│ │ sorting  │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └──────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Item, Sale, StockMovement, ExchangeRate, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`pricing`] - Margin formula and currency conversion
//! - [`totals`] - Discount / surcharge / total computation for a sale
//! - [`catalog`] - Catalog filter model and its validation
//! - [`error`] - Domain error types
//! - [`validation`] - Input validators
//!
//! ## Example Usage
//!
//! ```rust
//! use orbia_core::money::Money;
//! use orbia_core::totals::{Adjustment, SaleTotals};
//!
//! let lines = [Money::from_cents(30_000), Money::from_cents(5_000)];
//! let totals = SaleTotals::compute(&lines, Adjustment::percent(10), Adjustment::None).unwrap();
//!
//! assert_eq!(totals.subtotal.cents(), 35_000);
//! assert_eq!(totals.discount.cents(), 3_500);
//! assert_eq!(totals.total.cents(), 31_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod money;
pub mod pricing;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single sale.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Guards against typing 1000 instead of 10 at the register.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Upper bound for a margin percentage, in basis points (exclusive).
///
/// The margin formula divides by `1 - margin`, so 100% is undefined.
pub const MAX_MARGIN_BPS: i64 = 10_000;

/// Largest amount a caller may enter, in minor units (prices, costs,
/// overrides, fixed adjustments): one trillion major units.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000_000;

/// Maximum rows returned by a movement history (kardex) query.
pub const MAX_MOVEMENT_HISTORY: i64 = 300;

/// Counter key used for sale numbers in `tenant_counters`.
pub const SALE_COUNTER_KEY: &str = "sales";
