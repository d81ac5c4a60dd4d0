//! # Validation Module
//!
//! Input validation utilities for Orbia.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request layer (external)                                     │
//! │  ├── Auth, tenant resolution                                           │
//! │  └── Deserialization                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Code normalization (uppercase, no whitespace)                     │
//! │  ├── Currency codes, quantities, margins                               │
//! │  └── Rejects before any store access                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (tenant_id, sku)                                           │
//! │  └── CHECK (stock >= 0)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use orbia_core::validation::{normalize_sku, validate_quantity};
//!
//! assert_eq!(normalize_sku(" coke 330 ").unwrap().as_deref(), Some("COKE330"));
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_AMOUNT_CENTS, MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_MARGIN_BPS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_SKU_LEN: usize = 50;
const MAX_NAME_LEN: usize = 200;
const MAX_NOTES_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Normalizes an item code: uppercase, all whitespace removed.
///
/// Empty input means "no code" and yields `Ok(None)`.
///
/// ## Rules
/// - At most 50 characters after normalization
/// - Letters, digits, `-`, `_`, `.` and `/` only
///
/// ```rust
/// use orbia_core::validation::normalize_sku;
///
/// assert_eq!(normalize_sku("ab-1").unwrap().as_deref(), Some("AB-1"));
/// assert_eq!(normalize_sku("   ").unwrap(), None);
/// assert!(normalize_sku("bad*code").is_err());
/// ```
pub fn normalize_sku(raw: &str) -> ValidationResult<Option<String>> {
    let sku: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();

    if sku.is_empty() {
        return Ok(None);
    }

    if sku.chars().count() > MAX_SKU_LEN {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: MAX_SKU_LEN,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(ValidationError::invalid(
            "sku",
            "must contain only letters, numbers, '-', '_', '.' and '/'",
        ));
    }

    Ok(Some(sku))
}

/// Validates an item, category, tenant or branch name; returns it trimmed.
pub fn validate_name(field: &str, name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(name.to_string())
}

/// Trims free-text notes; blank becomes `None`.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        });
    }

    Ok(Some(notes.to_string()))
}

/// Normalizes an ISO-4217 style currency code to uppercase.
///
/// ```rust
/// use orbia_core::validation::normalize_currency;
///
/// assert_eq!(normalize_currency(" usd ").unwrap(), "USD");
/// assert!(normalize_currency("US").is_err());
/// ```
pub fn normalize_currency(code: &str) -> ValidationResult<String> {
    let code = code.trim().to_ascii_uppercase();

    if code.is_empty() {
        return Err(ValidationError::required("currency"));
    }

    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::invalid("currency", "must be a 3-letter code"));
    }

    Ok(code)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::out_of_range("quantity", 1, MAX_ITEM_QUANTITY));
    }

    Ok(())
}

/// Validates an entered amount in minor units. Zero is allowed (free items).
///
/// ## Rules
/// - Must not be negative
/// - Must not exceed MAX_AMOUNT_CENTS
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_AMOUNT_CENTS).contains(&cents) {
        return Err(ValidationError::out_of_range(field, 0, MAX_AMOUNT_CENTS));
    }

    Ok(())
}

/// Validates a margin in basis points: `0 <= bps < 10000`.
pub fn validate_margin_bps(bps: i64) -> ValidationResult<()> {
    if !(0..MAX_MARGIN_BPS).contains(&bps) {
        return Err(ValidationError::out_of_range("marginPct", 0, MAX_MARGIN_BPS - 1));
    }

    Ok(())
}

/// Validates an opening or absolute stock level.
pub fn validate_stock_level(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::out_of_range("stock", 0, i64::MAX));
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in a sale: at least one, at most 100.
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::required("items"));
    }

    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::out_of_range("items", 1, MAX_CART_ITEMS as i64));
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ```rust
/// use orbia_core::validation::validate_uuid;
///
/// assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(id.trim())
        .map_err(|_| ValidationError::invalid(field, "must be a valid UUID"))?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
