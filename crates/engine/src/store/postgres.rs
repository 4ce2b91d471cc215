//! Postgres-backed ledger store implementation.
//!
//! This module persists SKU counters, the append-only stock journal, and
//! sales orders in PostgreSQL. Multi-record commits run inside a database
//! transaction so a crash can never leave half of a stock movement visible.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE skus (
//!     product_id       UUID PRIMARY KEY,
//!     stock_on_hand    BIGINT NOT NULL CHECK (stock_on_hand >= 0),
//!     committed_stock  BIGINT NOT NULL
//!         CHECK (committed_stock >= 0 AND committed_stock <= stock_on_hand),
//!     reorder_point    BIGINT NOT NULL,
//!     updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE stock_transactions (
//!     transaction_id   BIGSERIAL PRIMARY KEY,
//!     product_id       UUID NOT NULL REFERENCES skus (product_id),
//!     side             TEXT NOT NULL CHECK (side IN ('debit', 'credit')),
//!     operation        TEXT NOT NULL,
//!     amount           BIGINT NOT NULL CHECK (amount > 0),
//!     unit_price       BIGINT NOT NULL CHECK (unit_price >= 0),
//!     counterparty_id  UUID,
//!     user_id          UUID,
//!     occurred_at      TIMESTAMPTZ NOT NULL,
//!     deleted          BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE INDEX idx_stock_transactions_product
//!     ON stock_transactions (product_id, transaction_id);
//!
//! CREATE TABLE sales_orders (
//!     order_id     UUID PRIMARY KEY,
//!     customer_id  UUID NOT NULL,
//!     order_time   TIMESTAMPTZ NOT NULL,
//!     status       TEXT NOT NULL,
//!     status_time  TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX idx_sales_orders_status ON sales_orders (status);
//!
//! CREATE TABLE sales_order_entries (
//!     entry_id            UUID PRIMARY KEY,
//!     order_id            UUID NOT NULL
//!         REFERENCES sales_orders (order_id) ON DELETE CASCADE,
//!     product_id          UUID NOT NULL,
//!     quantity            BIGINT NOT NULL CHECK (quantity >= 0),
//!     unit_price          BIGINT NOT NULL CHECK (unit_price >= 0),
//!     fulfilled_quantity  BIGINT NOT NULL
//!         CHECK (fulfilled_quantity >= 0 AND fulfilled_quantity <= quantity),
//!     UNIQUE (order_id, product_id)
//! );
//! ```
//!
//! Journal ids come from the `BIGSERIAL`; under the per-record locks held by
//! the services there is a single writer per product, so ids are assigned in
//! journal order.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | SKU or order id collision on insert |
//! | Database (foreign key violation) | `23503` | `Backend` | Movement for a product without a SKU row |
//! | Database (check constraint violation) | `23514` | `Backend` | Counter row violating the record invariant |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | RowNotFound | N/A | `Backend` | Unexpected row not found (queries use fetch_optional/fetch_all) |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresLedgerStore` is `Send + Sync` and can be shared across threads.
//! All operations use the SQLx connection pool which handles thread-safe
//! connection management. The synchronous [`LedgerStore`] impl bridges onto
//! the ambient tokio runtime.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use depot_core::{CounterpartyId, CustomerId, EntryId, OrderId, ProductId, UserId};
use depot_orders::{OrderStatus, SalesOrder, SalesOrderEntry};
use depot_stock::{
    Attribution, NewStockTransaction, OperationCode, SkuRecord, StockTransaction, TransactionId,
    TransactionSide,
};

use super::{LedgerStore, StoreError};

/// Postgres-backed ledger store.
///
/// One row per SKU, append-only journal rows, and order header + entry rows
/// replaced wholesale on update. Uniqueness (`Duplicate`) and referential
/// integrity are enforced by the database; the record invariants are
/// re-validated on load through the domain `from_parts` constructors, so a
/// row edited behind the engine's back surfaces as `Backend` instead of
/// entering the services silently.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    /// Create a new PostgresLedgerStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(product_id = %sku.product_id()), err)]
    pub async fn insert_sku(&self, sku: &SkuRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO skus (product_id, stock_on_hand, committed_stock, reorder_point)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(sku.product_id().as_uuid())
        .bind(sku.stock_on_hand())
        .bind(sku.committed_stock())
        .bind(sku.reorder_point())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_sku", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id.as_uuid()), err)]
    pub async fn load_sku(&self, product_id: ProductId) -> Result<Option<SkuRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, stock_on_hand, committed_stock, reorder_point
            FROM skus
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_sku", e))?;

        match row {
            Some(row) => {
                let sku_row = SkuRow::from_row(&row)
                    .map_err(|e| StoreError::Backend(format!("failed to read sku row: {e}")))?;
                Ok(Some(sku_row.into_record()?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn list_skus(&self) -> Result<Vec<SkuRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, stock_on_hand, committed_stock, reorder_point
            FROM skus
            ORDER BY product_id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_skus", e))?;

        let mut skus = Vec::with_capacity(rows.len());
        for row in rows {
            let sku_row = SkuRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("failed to read sku row: {e}")))?;
            skus.push(sku_row.into_record()?);
        }

        Span::current().record("sku_count", skus.len());
        Ok(skus)
    }

    #[instrument(skip(self, skus), fields(sku_count = skus.len()), err)]
    pub async fn update_skus(&self, skus: &[SkuRecord]) -> Result<(), StoreError> {
        if skus.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for sku in skus {
            write_sku_tx(&mut tx, sku).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, sku, movement),
        fields(
            product_id = %sku.product_id(),
            side = movement.side.as_str(),
            operation = movement.operation.as_str(),
            amount = movement.amount
        ),
        err
    )]
    pub async fn commit_movement(
        &self,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        write_sku_tx(&mut tx, sku).await?;
        let stored = insert_movement_tx(&mut tx, movement).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("transaction_id", stored.transaction_id.as_u64());
        Ok(stored)
    }

    #[instrument(
        skip(self, sku),
        fields(product_id = %sku.product_id(), transaction_id = %transaction_id),
        err
    )]
    pub async fn commit_void(
        &self,
        sku: &SkuRecord,
        transaction_id: TransactionId,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        write_sku_tx(&mut tx, sku).await?;

        let result = sqlx::query("UPDATE stock_transactions SET deleted = TRUE WHERE transaction_id = $1")
            .bind(transaction_id.as_u64() as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("void_transaction", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("transaction {transaction_id}")));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id), err)]
    pub async fn load_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<StockTransaction>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT transaction_id, product_id, side, operation, amount, unit_price,
                   counterparty_id, user_id, occurred_at, deleted
            FROM stock_transactions
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id.as_u64() as i64)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_transaction", e))?;

        match row {
            Some(row) => {
                let txn_row = TransactionRow::from_row(&row).map_err(|e| {
                    StoreError::Backend(format!("failed to read transaction row: {e}"))
                })?;
                Ok(Some(txn_row.into_transaction()?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(product_id = %product_id.as_uuid()), err)]
    pub async fn transactions_for(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, product_id, side, operation, amount, unit_price,
                   counterparty_id, user_id, occurred_at, deleted
            FROM stock_transactions
            WHERE product_id = $1
            ORDER BY transaction_id ASC
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions_for", e))?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            let txn_row = TransactionRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("failed to read transaction row: {e}")))?;
            transactions.push(txn_row.into_transaction()?);
        }

        Span::current().record("entry_count", transactions.len());
        Ok(transactions)
    }

    #[instrument(skip(self, order), fields(order_id = %order.order_id()), err)]
    pub async fn insert_order(&self, order: &SalesOrder) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO sales_orders (order_id, customer_id, order_time, status, status_time)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.order_id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.order_time())
        .bind(order.status().as_str())
        .bind(order.status_time())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        insert_entries_tx(&mut tx, order).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %order_id.as_uuid()), err)]
    pub async fn load_order(&self, order_id: OrderId) -> Result<Option<SalesOrder>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT order_id, customer_id, order_time, status, status_time
            FROM sales_orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order_row = OrderRow::from_row(&row)
            .map_err(|e| StoreError::Backend(format!("failed to read order row: {e}")))?;

        let entry_rows = sqlx::query(
            r#"
            SELECT entry_id, order_id, product_id, quantity, unit_price, fulfilled_quantity
            FROM sales_order_entries
            WHERE order_id = $1
            ORDER BY entry_id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_entries", e))?;

        let mut entries = Vec::with_capacity(entry_rows.len());
        for row in entry_rows {
            let entry_row = EntryRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("failed to read entry row: {e}")))?;
            entries.push(entry_row.into_entry()?);
        }

        Ok(Some(order_row.into_order(entries)?))
    }

    #[instrument(
        skip(self, order),
        fields(order_id = %order.order_id(), status = order.status().as_str()),
        err
    )]
    pub async fn update_order(&self, order: &SalesOrder) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        update_order_tx(&mut tx, order).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %order_id.as_uuid()), err)]
    pub async fn remove_order(&self, order_id: OrderId) -> Result<(), StoreError> {
        // Entry rows go with the header via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM sales_orders WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("order {order_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        let statuses: Vec<String> = OrderStatus::all()
            .into_iter()
            .filter(|status| status.retains_reservation())
            .map(|status| status.as_str().to_string())
            .collect();

        let order_rows = sqlx::query(
            r#"
            SELECT order_id, customer_id, order_time, status, status_time
            FROM sales_orders
            WHERE status = ANY($1)
            ORDER BY order_id ASC
            "#,
        )
        .bind(&statuses)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_orders", e))?;

        let mut headers = Vec::with_capacity(order_rows.len());
        for row in order_rows {
            let order_row = OrderRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("failed to read order row: {e}")))?;
            headers.push(order_row);
        }

        let order_ids: Vec<Uuid> = headers.iter().map(|row| row.order_id).collect();
        let entry_rows = sqlx::query(
            r#"
            SELECT entry_id, order_id, product_id, quantity, unit_price, fulfilled_quantity
            FROM sales_order_entries
            WHERE order_id = ANY($1)
            ORDER BY order_id ASC, entry_id ASC
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_order_entries", e))?;

        let mut entries_by_order: HashMap<Uuid, Vec<SalesOrderEntry>> = HashMap::new();
        for row in entry_rows {
            let entry_row = EntryRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("failed to read entry row: {e}")))?;
            let order_id = entry_row.order_id;
            entries_by_order
                .entry(order_id)
                .or_default()
                .push(entry_row.into_entry()?);
        }

        let mut orders = Vec::with_capacity(headers.len());
        for header in headers {
            let entries = entries_by_order.remove(&header.order_id).unwrap_or_default();
            orders.push(header.into_order(entries)?);
        }

        Span::current().record("order_count", orders.len());
        Ok(orders)
    }

    #[instrument(
        skip(self, order, sku, movement),
        fields(
            order_id = %order.order_id(),
            product_id = %sku.product_id(),
            amount = movement.amount
        ),
        err
    )]
    pub async fn commit_fulfillment(
        &self,
        order: &SalesOrder,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        update_order_tx(&mut tx, order).await?;
        write_sku_tx(&mut tx, sku).await?;
        let stored = insert_movement_tx(&mut tx, movement).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("transaction_id", stored.transaction_id.as_u64());
        Ok(stored)
    }
}

/// Overwrite one SKU row inside an open transaction.
async fn write_sku_tx(
    tx: &mut Transaction<'_, Postgres>,
    sku: &SkuRecord,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE skus
        SET stock_on_hand = $2, committed_stock = $3, reorder_point = $4, updated_at = NOW()
        WHERE product_id = $1
        "#,
    )
    .bind(sku.product_id().as_uuid())
    .bind(sku.stock_on_hand())
    .bind(sku.committed_stock())
    .bind(sku.reorder_point())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_sku", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Missing(format!("sku {}", sku.product_id())));
    }
    Ok(())
}

/// Append one journal row inside an open transaction and return the stored
/// entry with its `BIGSERIAL`-assigned id.
async fn insert_movement_tx(
    tx: &mut Transaction<'_, Postgres>,
    movement: NewStockTransaction,
) -> Result<StockTransaction, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO stock_transactions (
            product_id, side, operation, amount, unit_price,
            counterparty_id, user_id, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING transaction_id
        "#,
    )
    .bind(movement.product_id.as_uuid())
    .bind(movement.side.as_str())
    .bind(movement.operation.as_str())
    .bind(movement.amount)
    .bind(movement.unit_price as i64)
    .bind(movement.attribution.counterparty.map(|id| *id.as_uuid()))
    .bind(movement.attribution.user.map(|id| *id.as_uuid()))
    .bind(movement.occurred_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;

    let transaction_id: i64 = row
        .try_get("transaction_id")
        .map_err(|e| StoreError::Backend(format!("failed to read transaction_id: {e}")))?;

    Ok(StockTransaction::from_new(
        TransactionId::new(transaction_id as u64),
        movement,
    ))
}

/// Overwrite an order header and replace its entry rows inside an open
/// transaction.
async fn update_order_tx(
    tx: &mut Transaction<'_, Postgres>,
    order: &SalesOrder,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE sales_orders
        SET customer_id = $2, order_time = $3, status = $4, status_time = $5
        WHERE order_id = $1
        "#,
    )
    .bind(order.order_id().as_uuid())
    .bind(order.customer_id().as_uuid())
    .bind(order.order_time())
    .bind(order.status().as_str())
    .bind(order.status_time())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_order", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Missing(format!("order {}", order.order_id())));
    }

    sqlx::query("DELETE FROM sales_order_entries WHERE order_id = $1")
        .bind(order.order_id().as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_order_entries", e))?;

    insert_entries_tx(tx, order).await
}

/// Insert an order's entry rows inside an open transaction.
async fn insert_entries_tx(
    tx: &mut Transaction<'_, Postgres>,
    order: &SalesOrder,
) -> Result<(), StoreError> {
    for entry in order.entries() {
        sqlx::query(
            r#"
            INSERT INTO sales_order_entries (
                entry_id, order_id, product_id, quantity, unit_price, fulfilled_quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.entry_id().as_uuid())
        .bind(order.order_id().as_uuid())
        .bind(entry.product_id().as_uuid())
        .bind(entry.quantity())
        .bind(entry.unit_price() as i64)
        .bind(entry.fulfilled_quantity())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order_entry", e))?;
    }
    Ok(())
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    "23505" => {
                        // Unique violation: id collision on insert
                        StoreError::Duplicate(msg)
                    }
                    "23503" => {
                        // Foreign key violation
                        StoreError::Backend(msg)
                    }
                    "23514" => {
                        // Check constraint violation
                        StoreError::Backend(msg)
                    }
                    _ => StoreError::Backend(msg),
                }
            } else {
                StoreError::Backend(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            // Should not happen: queries use fetch_optional/fetch_all
            StoreError::Backend(format!("unexpected row not found in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Fetch the ambient tokio runtime handle for the synchronous trait bridge.
fn runtime_handle() -> Result<tokio::runtime::Handle, StoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Backend(
            "PostgresLedgerStore requires an async runtime (tokio); \
             call from within a tokio runtime context"
                .to_string(),
        )
    })
}

// SQLx row types

#[derive(Debug)]
struct SkuRow {
    product_id: Uuid,
    stock_on_hand: i64,
    committed_stock: i64,
    reorder_point: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SkuRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(SkuRow {
            product_id: row.try_get("product_id")?,
            stock_on_hand: row.try_get("stock_on_hand")?,
            committed_stock: row.try_get("committed_stock")?,
            reorder_point: row.try_get("reorder_point")?,
        })
    }
}

impl SkuRow {
    fn into_record(self) -> Result<SkuRecord, StoreError> {
        SkuRecord::from_parts(
            ProductId::from_uuid(self.product_id),
            self.stock_on_hand,
            self.committed_stock,
            self.reorder_point,
        )
        .map_err(|e| StoreError::Backend(format!("invalid sku row: {e}")))
    }
}

#[derive(Debug)]
struct TransactionRow {
    transaction_id: i64,
    product_id: Uuid,
    side: String,
    operation: String,
    amount: i64,
    unit_price: i64,
    counterparty_id: Option<Uuid>,
    user_id: Option<Uuid>,
    occurred_at: DateTime<Utc>,
    deleted: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for TransactionRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            transaction_id: row.try_get("transaction_id")?,
            product_id: row.try_get("product_id")?,
            side: row.try_get("side")?,
            operation: row.try_get("operation")?,
            amount: row.try_get("amount")?,
            unit_price: row.try_get("unit_price")?,
            counterparty_id: row.try_get("counterparty_id")?,
            user_id: row.try_get("user_id")?,
            occurred_at: row.try_get("occurred_at")?,
            deleted: row.try_get("deleted")?,
        })
    }
}

impl TransactionRow {
    fn into_transaction(self) -> Result<StockTransaction, StoreError> {
        let side = TransactionSide::parse(&self.side)
            .ok_or_else(|| StoreError::Backend(format!("unknown transaction side '{}'", self.side)))?;
        let operation = OperationCode::parse(&self.operation).ok_or_else(|| {
            StoreError::Backend(format!("unknown operation code '{}'", self.operation))
        })?;

        Ok(StockTransaction {
            transaction_id: TransactionId::new(self.transaction_id as u64),
            product_id: ProductId::from_uuid(self.product_id),
            side,
            operation,
            amount: self.amount,
            unit_price: self.unit_price as u64,
            attribution: Attribution::new(
                self.counterparty_id.map(CounterpartyId::from_uuid),
                self.user_id.map(UserId::from_uuid),
            ),
            occurred_at: self.occurred_at,
            deleted: self.deleted,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    order_id: Uuid,
    customer_id: Uuid,
    order_time: DateTime<Utc>,
    status: String,
    status_time: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for OrderRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            order_time: row.try_get("order_time")?,
            status: row.try_get("status")?,
            status_time: row.try_get("status_time")?,
        })
    }
}

impl OrderRow {
    fn into_order(self, entries: Vec<SalesOrderEntry>) -> Result<SalesOrder, StoreError> {
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown order status '{}'", self.status)))?;
        SalesOrder::from_parts(
            OrderId::from_uuid(self.order_id),
            CustomerId::from_uuid(self.customer_id),
            self.order_time,
            status,
            self.status_time,
            entries,
        )
        .map_err(|e| StoreError::Backend(format!("invalid order rows: {e}")))
    }
}

#[derive(Debug)]
struct EntryRow {
    entry_id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    unit_price: i64,
    fulfilled_quantity: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EntryRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            entry_id: row.try_get("entry_id")?,
            order_id: row.try_get("order_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            fulfilled_quantity: row.try_get("fulfilled_quantity")?,
        })
    }
}

impl EntryRow {
    fn into_entry(self) -> Result<SalesOrderEntry, StoreError> {
        SalesOrderEntry::from_parts(
            EntryId::from_uuid(self.entry_id),
            ProductId::from_uuid(self.product_id),
            self.quantity,
            self.unit_price as u64,
            self.fulfilled_quantity,
        )
        .map_err(|e| StoreError::Backend(format!("invalid entry row: {e}")))
    }
}

// Implement LedgerStore trait
//
// The LedgerStore trait is synchronous, but Postgres operations require
// async. tokio::runtime::Handle bridges the two: this works when called
// from within a tokio runtime (e.g., from blocking worker threads spawned
// by async intake handlers).

impl LedgerStore for PostgresLedgerStore {
    fn insert_sku(&self, sku: &SkuRecord) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.insert_sku(sku))
    }

    fn load_sku(&self, product_id: ProductId) -> Result<Option<SkuRecord>, StoreError> {
        runtime_handle()?.block_on(self.load_sku(product_id))
    }

    fn list_skus(&self) -> Result<Vec<SkuRecord>, StoreError> {
        runtime_handle()?.block_on(self.list_skus())
    }

    fn update_skus(&self, skus: &[SkuRecord]) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.update_skus(skus))
    }

    fn commit_movement(
        &self,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        runtime_handle()?.block_on(self.commit_movement(sku, movement))
    }

    fn commit_void(
        &self,
        sku: &SkuRecord,
        transaction_id: TransactionId,
    ) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.commit_void(sku, transaction_id))
    }

    fn load_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<StockTransaction>, StoreError> {
        runtime_handle()?.block_on(self.load_transaction(transaction_id))
    }

    fn transactions_for(&self, product_id: ProductId) -> Result<Vec<StockTransaction>, StoreError> {
        runtime_handle()?.block_on(self.transactions_for(product_id))
    }

    fn insert_order(&self, order: &SalesOrder) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.insert_order(order))
    }

    fn load_order(&self, order_id: OrderId) -> Result<Option<SalesOrder>, StoreError> {
        runtime_handle()?.block_on(self.load_order(order_id))
    }

    fn update_order(&self, order: &SalesOrder) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.update_order(order))
    }

    fn remove_order(&self, order_id: OrderId) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.remove_order(order_id))
    }

    fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        runtime_handle()?.block_on(self.open_orders())
    }

    fn commit_fulfillment(
        &self,
        order: &SalesOrder,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        runtime_handle()?.block_on(self.commit_fulfillment(order, sku, movement))
    }
}
