//! # Sale Repository
//!
//! Read side of committed sales. Writes happen only in
//! [`CheckoutService`](crate::services::checkout::CheckoutService); a sale is
//! immutable once committed.

use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;

use orbia_core::{CoreError, Sale, SaleItem, SaleRecord};

use crate::error::{DbError, DbResult, EngineResult};

const SALE_COLUMNS: &str = r#"
    id, tenant_id, branch_id, cashier_id, customer_id, sale_seq, sale_number,
    currency, subtotal_cents, discount_type, discount_value, discount_cents,
    surcharge_type, surcharge_value, surcharge_cents, total_cents,
    payment_method, notes, created_at, updated_at
"#;

/// Loads a sale with its lines on an existing connection.
pub(crate) async fn fetch_record(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    sale_id: &str,
) -> EngineResult<SaleRecord> {
    let sql = format!("SELECT {} FROM sales WHERE id = ?1 AND tenant_id = ?2", SALE_COLUMNS);
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(sale_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

    let items = sqlx::query_as::<_, SaleItem>(
        r#"
        SELECT id, sale_id, tenant_id, branch_id, product_id, product_name_snapshot,
               sku_snapshot, quantity, unit_price_cents, line_total_cents, created_at
        FROM sale_items
        WHERE sale_id = ?1 AND tenant_id = ?2
        ORDER BY rowid
        "#,
    )
    .bind(sale_id)
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(SaleRecord { sale, items })
}

/// Repository for committed sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// A sale with its frozen lines.
    pub async fn get(&self, tenant_id: &str, sale_id: &str) -> EngineResult<SaleRecord> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        fetch_record(&mut conn, tenant_id, sale_id).await
    }

    /// Sale headers, newest first.
    pub async fn list(&self, tenant_id: &str, page: u32, page_size: u32) -> DbResult<Vec<Sale>> {
        let limit = i64::from(page_size.max(1));
        let offset = (i64::from(page.max(1)) - 1) * limit;

        let sql = format!(
            "SELECT {} FROM sales WHERE tenant_id = ?1 ORDER BY sale_seq DESC LIMIT ?2 OFFSET ?3",
            SALE_COLUMNS
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    pub async fn count(&self, tenant_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
