//! Durable storage boundary for stock and order records.
//!
//! This module defines the keyed store the services persist through without
//! making storage assumptions: an in-memory implementation backs tests and
//! dev, a Postgres implementation backs production. Serializing callers is
//! NOT this layer's job; the services hold per-record locks around every
//! read-modify-write cycle. What this layer does guarantee is that each
//! method commits atomically.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

use std::sync::Arc;

use thiserror::Error;

use depot_core::{DomainError, OrderId, ProductId};
use depot_orders::SalesOrder;
use depot_stock::{NewStockTransaction, SkuRecord, StockTransaction, TransactionId};

/// Store operation error.
///
/// Infrastructure failures (storage, decoding, uniqueness) as opposed to
/// domain failures. Services convert these into [`DomainError`] at their
/// boundary via the `From` impl below.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same key already exists.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// No record under the requested key.
    #[error("missing record: {0}")]
    Missing(String),

    /// The backend failed, or returned data that does not decode into a
    /// valid domain record.
    #[error("storage backend: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate(_) => DomainError::AlreadyExists,
            StoreError::Missing(_) => DomainError::NotFound,
            StoreError::Backend(msg) => DomainError::inconsistent(msg),
        }
    }
}

/// Keyed store for SKU records, the stock journal, and sales orders.
///
/// ## Commit Semantics
///
/// Every method is one atomic commit: after it returns `Ok`, every record it
/// names is durable; after `Err`, none are. The compound commits
/// ([`LedgerStore::commit_movement`], [`LedgerStore::commit_void`],
/// [`LedgerStore::commit_fulfillment`], [`LedgerStore::update_skus`]) exist
/// precisely so a service can settle a multi-record operation without any
/// observable intermediate state.
///
/// ## Journal Semantics
///
/// Stock transactions are append-only. The store assigns each committed
/// movement the next [`TransactionId`] (monotonic per store, no gaps under a
/// single writer). The only after-the-fact change a journal entry ever sees
/// is the `deleted` soft-cancel flag set by [`LedgerStore::commit_void`];
/// rows are never removed.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - reject duplicate SKU inserts (`Duplicate`)
/// - fail updates of records that were never inserted (`Missing`)
/// - keep journal order identical to transaction id order
/// - be `Send + Sync`; the services share one store across threads
pub trait LedgerStore: Send + Sync {
    /// Insert a fresh SKU record. Fails `Duplicate` if the product already
    /// has one.
    fn insert_sku(&self, sku: &SkuRecord) -> Result<(), StoreError>;

    /// Load one SKU record, or `None` if the product has none.
    fn load_sku(&self, product_id: ProductId) -> Result<Option<SkuRecord>, StoreError>;

    /// Every SKU record, ascending by product id.
    fn list_skus(&self) -> Result<Vec<SkuRecord>, StoreError>;

    /// Overwrite a batch of SKU records in one commit.
    ///
    /// Every record must already exist; a batch containing an unknown
    /// product fails `Missing` with nothing written.
    fn update_skus(&self, skus: &[SkuRecord]) -> Result<(), StoreError>;

    /// Commit a stock movement: overwrite the SKU record and append the
    /// journal entry, returning it with its assigned id.
    fn commit_movement(
        &self,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError>;

    /// Commit a void: overwrite the corrected SKU record and flag the
    /// journal entry deleted.
    fn commit_void(&self, sku: &SkuRecord, transaction_id: TransactionId)
    -> Result<(), StoreError>;

    /// Load one journal entry, or `None` for an id never assigned.
    fn load_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<StockTransaction>, StoreError>;

    /// A product's full journal (voided entries included), in id order.
    fn transactions_for(&self, product_id: ProductId) -> Result<Vec<StockTransaction>, StoreError>;

    /// Insert a fresh order. Fails `Duplicate` on id collision.
    fn insert_order(&self, order: &SalesOrder) -> Result<(), StoreError>;

    /// Load one order with its entries, or `None` if unknown.
    fn load_order(&self, order_id: OrderId) -> Result<Option<SalesOrder>, StoreError>;

    /// Overwrite an order and its entry set in one commit.
    fn update_order(&self, order: &SalesOrder) -> Result<(), StoreError>;

    /// Delete an order and its entries. Fails `Missing` if unknown.
    fn remove_order(&self, order_id: OrderId) -> Result<(), StoreError>;

    /// Every order currently holding a reservation, ascending by order id.
    ///
    /// This is the input to commitment reconciliation: the committed counter
    /// of each SKU must equal the summed outstanding quantities of exactly
    /// these orders.
    fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError>;

    /// Commit a fulfillment: overwrite the order and the SKU record and
    /// append the sale journal entry, all in one commit.
    fn commit_fulfillment(
        &self,
        order: &SalesOrder,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn insert_sku(&self, sku: &SkuRecord) -> Result<(), StoreError> {
        (**self).insert_sku(sku)
    }

    fn load_sku(&self, product_id: ProductId) -> Result<Option<SkuRecord>, StoreError> {
        (**self).load_sku(product_id)
    }

    fn list_skus(&self) -> Result<Vec<SkuRecord>, StoreError> {
        (**self).list_skus()
    }

    fn update_skus(&self, skus: &[SkuRecord]) -> Result<(), StoreError> {
        (**self).update_skus(skus)
    }

    fn commit_movement(
        &self,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        (**self).commit_movement(sku, movement)
    }

    fn commit_void(
        &self,
        sku: &SkuRecord,
        transaction_id: TransactionId,
    ) -> Result<(), StoreError> {
        (**self).commit_void(sku, transaction_id)
    }

    fn load_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<StockTransaction>, StoreError> {
        (**self).load_transaction(transaction_id)
    }

    fn transactions_for(&self, product_id: ProductId) -> Result<Vec<StockTransaction>, StoreError> {
        (**self).transactions_for(product_id)
    }

    fn insert_order(&self, order: &SalesOrder) -> Result<(), StoreError> {
        (**self).insert_order(order)
    }

    fn load_order(&self, order_id: OrderId) -> Result<Option<SalesOrder>, StoreError> {
        (**self).load_order(order_id)
    }

    fn update_order(&self, order: &SalesOrder) -> Result<(), StoreError> {
        (**self).update_order(order)
    }

    fn remove_order(&self, order_id: OrderId) -> Result<(), StoreError> {
        (**self).remove_order(order_id)
    }

    fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        (**self).open_orders()
    }

    fn commit_fulfillment(
        &self,
        order: &SalesOrder,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        (**self).commit_fulfillment(order, sku, movement)
    }
}
