//! # orbia-db: Store Layer and Commit Pipeline for Orbia
//!
//! SQLite access, the stock ledger, the catalog query engine and the sale
//! commit transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Orbia Data Flow                                  │
//! │                                                                         │
//! │  Request layer (tenant, branch and actor already resolved)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     orbia-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │   │
//! │  │   │   Database    │    │  Repositories │    │   Services   │    │   │
//! │  │   │   (pool.rs)   │    │               │    │              │    │   │
//! │  │   │               │    │ TenantRepo    │    │ Pricing      │    │   │
//! │  │   │ SqlitePool    │◄───│ ItemRepo      │◄───│ Checkout     │    │   │
//! │  │   │ tenant lock   │    │ StockLedger   │    │              │    │   │
//! │  │   │ migrations    │    │ CatalogRepo   │    │              │    │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, repository accessors, tenant write lock
//! - [`config`] - Environment configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - `DbError` and the engine-wide `EngineError`
//! - [`repository`] - Tenants, items, rates, stock ledger, catalog, sales
//! - [`services`] - Pricing resolver and sale commit pipeline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use orbia_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("orbia.db")).await?;
//! let record = db.checkout().commit_sale(draft).await?;
//! let page = db.catalog().query_params(&tenant_id, &params).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod services;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use error::{DbError, DbResult, EngineError, EngineResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::exchange::ExchangeRateRepository;
pub use repository::product::ItemRepository;
pub use repository::sale::SaleRepository;
pub use repository::stock::{StockAdjustment, StockChange, StockLedger};
pub use repository::tenant::{TenantContext, TenantRepository};
pub use services::checkout::CheckoutService;
pub use services::pricing::PricingResolver;
