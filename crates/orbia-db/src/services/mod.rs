//! # Services
//!
//! Operations that span several repositories.
//!
//! - [`pricing`] - Pricing resolver (item + rate lookup → unit price)
//! - [`checkout`] - Sale commit pipeline

pub mod checkout;
pub mod pricing;
