//! # Error Types
//!
//! Domain-specific error types for orbia-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  orbia-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations (user-actionable)     │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  orbia-db errors (separate crate)                                      │
//! │  ├── DbError          - Store failures                                 │
//! │  └── EngineError      - CoreError | DbError, returned by every op      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → request layer       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant names the offending entity so the caller can show
//! "insufficient stock for X" instead of a blanket failure.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Item does not exist or belongs to another tenant.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Item exists but has been deactivated.
    #[error("Item is inactive: {0}")]
    ItemInactive(String),

    /// Not enough stock to apply a decrement.
    ///
    /// ## User Workflow
    /// ```text
    /// Commit sale (qty: 5)
    ///      │
    ///      ▼
    /// Decrement: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "COKE", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 COKE in stock"
    /// ```
    #[error("Insufficient stock for {label}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        /// Code when the item has one, otherwise the item id.
        label: String,
        requested: i64,
        available: i64,
    },

    /// No exchange rate row exists for the pair (tenant or global).
    #[error("Exchange rate not found: {base} -> {target}")]
    RateNotFound { base: String, target: String },

    /// MARGIN pricing without usable cost / margin data.
    #[error("Invalid pricing configuration for item {item_id}: {reason}")]
    PricingConfigInvalid { item_id: String, reason: String },

    /// A by-branch operation was attempted on a tenant that is not (or cannot
    /// be) in by-branch mode.
    #[error("Stock mode not available for tenant {tenant_id}: {reason}")]
    InvalidStockMode { tenant_id: String, reason: String },

    /// Tenant is in by-branch mode but no branch was supplied.
    #[error("A branch is required for tenant {0}")]
    BranchRequired(String),

    /// Branch does not exist, is deleted, or belongs to another tenant.
    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// A cashier-entered unit price was sent for a MARGIN item.
    #[error("Manual price not allowed for margin-priced item {0}")]
    PriceOverrideNotAllowed(String),

    /// Catalog export matched more rows than the configured cap.
    #[error("Export matches {matched} items, more than the limit of {cap}; narrow the filters")]
    ExportTooLarge { matched: i64, cap: i64 },

    /// Sale does not exist for the tenant.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ItemNotFound(_) => "ITEM_NOT_FOUND",
            CoreError::ItemInactive(_) => "ITEM_INACTIVE",
            CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CoreError::RateNotFound { .. } => "RATE_NOT_FOUND",
            CoreError::PricingConfigInvalid { .. } => "PRICING_CONFIG_INVALID",
            CoreError::InvalidStockMode { .. } => "INVALID_STOCK_MODE",
            CoreError::BranchRequired(_) => "BRANCH_REQUIRED",
            CoreError::BranchNotFound(_) => "BRANCH_NOT_FOUND",
            CoreError::PriceOverrideNotAllowed(_) => "PRICE_OVERRIDE_NOT_ALLOWED",
            CoreError::ExportTooLarge { .. } => "EXPORT_TOO_LARGE",
            CoreError::SaleNotFound(_) => "SALE_NOT_FOUND",
            CoreError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any store access.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Computed amount does not fit in minor units.
    #[error("{field} is too large")]
    TooLarge { field: String },

    /// Invalid format (e.g., invalid UUID, unknown enum value).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate code).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn out_of_range(field: &str, min: i64, max: i64) -> Self {
        ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        }
    }

    pub fn too_large(field: &str) -> Self {
        ValidationError::TooLarge {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = CoreError::InsufficientStock {
            item_id: "i-1".to_string(),
            label: "COKE-330".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for COKE-330: available 3, requested 5"
        );
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
    }

    #[test]
    fn test_rate_not_found_names_pair() {
        let err = CoreError::RateNotFound {
            base: "USD".to_string(),
            target: "ARS".to_string(),
        };
        assert_eq!(err.to_string(), "Exchange rate not found: USD -> ARS");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("sku").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.code(), "VALIDATION_ERROR");
    }
}
