//! # Repository Module
//!
//! Store access for the engine, one repository per aggregate.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database accessors                                                     │
//! │       │                                                                 │
//! │       ├── tenants()  → TenantRepository      tenants, branches, mode    │
//! │       ├── items()    → ItemRepository        item writes, categories    │
//! │       ├── rates()    → ExchangeRateRepository                           │
//! │       ├── stock()    → StockLedger           deltas, transfers, kardex  │
//! │       ├── catalog()  → CatalogRepository     listings and exports       │
//! │       └── sales()    → SaleRepository        committed sales (read)     │
//! │                                                                         │
//! │  Each module also exposes `pub(crate)` helpers that take a              │
//! │  `&mut SqliteConnection`, so services can compose them inside one       │
//! │  transaction.                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod exchange;
pub mod product;
pub mod sale;
pub mod stock;
pub mod tenant;
