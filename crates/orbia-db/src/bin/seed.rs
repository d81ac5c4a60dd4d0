//! # Demo Tenant Seeder
//!
//! Provisions a demo tenant and walks it through the engine once.
//!
//! ## Usage
//! ```bash
//! # Database from ORBIA_DATABASE_PATH (default ./orbia.db)
//! cargo run -p orbia-db --bin seed
//!
//! # Explicit path, per-branch stock
//! cargo run -p orbia-db --bin seed -- --db ./data/demo.db --by-branch
//!
//! # More logging
//! RUST_LOG=orbia_db=debug cargo run -p orbia-db --bin seed
//! ```
//!
//! ## What It Creates
//! - Tenant "Orbia Demo" (ARS), two branches
//! - Categories and items: MANUAL in ARS, MANUAL in USD, MARGIN on a USD cost
//! - USD→ARS global rate
//! - Opening stock, one sale, and a low-stock listing printed as JSON

use std::env;

use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use orbia_core::catalog::{CatalogFilters, CatalogQuery, SortKey, StockFilter};
use orbia_core::totals::Adjustment;
use orbia_core::{CartLine, ItemDraft, MovementReason, PaymentMethod, PricingMode, SaleDraft, StockMode};
use orbia_db::{DbConfig, EngineConfig, StockAdjustment};

const ACTOR: &str = "seed";

/// (category, name, sku, price cents, currency, opening stock)
const MANUAL_ITEMS: &[(&str, &str, &str, i64, Option<&str>, i64)] = &[
    ("Almacén", "Yerba Mate 1kg", "YER-1KG", 420_000, None, 24),
    ("Almacén", "Café Molido 500g", "CAF-500", 610_000, None, 3),
    ("Almacén", "Azúcar 1kg", "AZU-1KG", 120_000, None, 0),
    ("Electrónica", "Auriculares Bluetooth", "AUR-BT", 2_500, Some("USD"), 6),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,orbia_db=debug,sqlx=warn")),
        )
        .init();

    let mut config = EngineConfig::from_env()?;
    let mut by_branch = false;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.db = DbConfig::new(&args[i + 1]).max_connections(config.db.max_connections);
                    i += 1;
                }
            }
            "--by-branch" => by_branch = true,
            "--help" | "-h" => {
                println!("Orbia demo seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $ORBIA_DATABASE_PATH or ./orbia.db)");
                println!("      --by-branch    Track stock per branch");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let db = config.connect().await?;
    info!(path = %config.db.database_path.display(), "Database ready");

    let tenants = db.tenants();
    let tenant = tenants
        .create("Orbia Demo", &config.default_currency, StockMode::Global)
        .await?;
    let centro = tenants.create_branch(&tenant.id, "Centro").await?;
    let norte = tenants.create_branch(&tenant.id, "Norte").await?;

    db.rates().upsert(None, "USD", "ARS", Decimal::from(1_050)).await?;

    let mut categories = Vec::new();
    for (order, name) in ["Almacén", "Electrónica"].into_iter().enumerate() {
        categories.push(db.items().create_category(&tenant.id, name, order as i64).await?);
    }
    let category_id = |name: &str| {
        categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id.clone())
    };

    let mut items = Vec::new();
    for (category, name, sku, price, currency, stock) in MANUAL_ITEMS {
        let item = db
            .items()
            .create(
                &tenant.id,
                ACTOR,
                ItemDraft {
                    category_id: category_id(*category),
                    name: name.to_string(),
                    sku: Some(sku.to_string()),
                    price_cents: *price,
                    currency: currency.map(str::to_string),
                    initial_stock: Some(*stock),
                    ..ItemDraft::default()
                },
            )
            .await?;
        items.push(item);
    }

    let cable = db
        .items()
        .create(
            &tenant.id,
            ACTOR,
            ItemDraft {
                category_id: category_id("Electrónica"),
                name: "Cable USB-C".to_string(),
                sku: Some("USB-C-1M".to_string()),
                pricing_mode: PricingMode::Margin,
                cost_amount_cents: Some(400),
                cost_currency: Some("USD".to_string()),
                margin_bps: Some(2_000),
                initial_stock: Some(10),
                ..ItemDraft::default()
            },
        )
        .await?;
    items.push(cable);

    if by_branch {
        tenants.set_stock_mode(&tenant.id, StockMode::ByBranch).await?;
        for item in &items {
            for (branch, qty) in [(&centro.id, 8), (&norte.id, 2)] {
                db.stock()
                    .adjust_stock(StockAdjustment {
                        tenant_id: tenant.id.clone(),
                        item_id: item.id.clone(),
                        branch_id: Some(branch.clone()),
                        delta: qty,
                        reason: MovementReason::Adjustment,
                        note: Some("opening count".to_string()),
                        actor_id: ACTOR.to_string(),
                    })
                    .await?;
            }
        }
    }

    let record = db
        .checkout()
        .commit_sale(SaleDraft {
            tenant_id: tenant.id.clone(),
            branch_id: Some(centro.id.clone()),
            actor_id: ACTOR.to_string(),
            customer_id: None,
            currency: tenant.currency.clone(),
            payment_method: PaymentMethod::Cash,
            notes: Some("demo sale".to_string()),
            discount: Adjustment::percent(10),
            surcharge: Adjustment::None,
            lines: vec![CartLine::new(&items[0].id, 2), CartLine::new(&items[4].id, 1)],
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&record)?);

    let low = db
        .catalog()
        .query_items(
            &tenant.id,
            &CatalogQuery::page(
                CatalogFilters {
                    stock: StockFilter::Low {
                        threshold: db.catalog_limits().default_low_stock_threshold,
                    },
                    sort: SortKey::Stock,
                    ..CatalogFilters::default()
                },
                1,
                db.catalog_limits().default_page_size,
            ),
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&low)?);

    info!(
        tenant_id = %tenant.id,
        sale_number = %record.sale.sale_number,
        low_stock = low.total,
        "Seed complete"
    );
    db.close().await;
    Ok(())
}
