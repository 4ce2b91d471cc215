//! Stock ledger service.
//!
//! Sole writer of physical stock and sole producer of journal entries.
//! Every mutation runs as lock, load, domain arithmetic, one-commit persist;
//! the journal entry and the counter move together or not at all.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use depot_core::{DomainError, DomainResult, ProductId};
use depot_stock::{
    Attribution, NewStockTransaction, OperationCode, SkuRecord, StockTransaction, TransactionId,
    TransactionSide, derived_on_hand,
};

use crate::config::EngineConfig;
use crate::locks::KeyLocks;
use crate::store::LedgerStore;

/// What still ties a SKU to the ledger when the catalogue wants it retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetirementBlockers {
    /// Physical units still on hand.
    pub stock_on_hand: i64,
    /// Journal entries that are not voided.
    pub active_journal_entries: usize,
}

impl RetirementBlockers {
    /// Nothing blocks retirement: no stock, no live journal history.
    pub fn is_clear(&self) -> bool {
        self.stock_on_hand == 0 && self.active_journal_entries == 0
    }
}

/// Stock ledger: journaled debits and credits against per-product counters.
pub struct StockLedger {
    store: Arc<dyn LedgerStore>,
    locks: Arc<KeyLocks<ProductId>>,
    lock_wait: Duration,
}

impl StockLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<KeyLocks<ProductId>>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            locks,
            lock_wait: config.lock_wait,
        }
    }

    /// Admit a product to stock keeping, all counters zero.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn create_sku(&self, product_id: ProductId, reorder_point: i64) -> DomainResult<SkuRecord> {
        let sku = SkuRecord::new(product_id, reorder_point);
        self.store.insert_sku(&sku)?;
        info!(product_id = %product_id, reorder_point, "sku created");
        Ok(sku)
    }

    /// Point-in-time snapshot of one SKU record.
    pub fn sku(&self, product_id: ProductId) -> DomainResult<SkuRecord> {
        self.store.load_sku(product_id)?.ok_or(DomainError::NotFound)
    }

    /// SKUs at or below their reorder point, for the purchasing side.
    pub fn reorder_alerts(&self) -> DomainResult<Vec<SkuRecord>> {
        let skus = self.store.list_skus()?;
        Ok(skus.into_iter().filter(SkuRecord::needs_reorder).collect())
    }

    /// Journal a stock inflow.
    #[instrument(skip(self, attribution), fields(product_id = %product_id, amount))]
    pub fn debit(
        &self,
        product_id: ProductId,
        amount: i64,
        unit_price: u64,
        operation: OperationCode,
        attribution: Attribution,
    ) -> DomainResult<StockTransaction> {
        let _guard = self.locks.acquire(product_id, self.lock_wait)?;
        let mut sku = self.sku(product_id)?;
        sku.debit(amount)?;
        let movement = NewStockTransaction {
            product_id,
            side: TransactionSide::Debit,
            operation,
            amount,
            unit_price,
            attribution,
            occurred_at: Utc::now(),
        };
        let transaction = self.store.commit_movement(&sku, movement)?;
        debug!(
            product_id = %product_id,
            transaction_id = %transaction.transaction_id,
            operation = operation.as_str(),
            amount,
            "stock debited"
        );
        Ok(transaction)
    }

    /// Journal a stock outflow of unreserved units.
    ///
    /// Guarded against the sellable quantity: units committed to orders
    /// cannot leave here, only through fulfillment.
    #[instrument(skip(self, attribution), fields(product_id = %product_id, amount))]
    pub fn credit(
        &self,
        product_id: ProductId,
        amount: i64,
        unit_price: u64,
        operation: OperationCode,
        attribution: Attribution,
    ) -> DomainResult<StockTransaction> {
        let _guard = self.locks.acquire(product_id, self.lock_wait)?;
        let mut sku = self.sku(product_id)?;
        sku.credit(amount)?;
        let movement = NewStockTransaction {
            product_id,
            side: TransactionSide::Credit,
            operation,
            amount,
            unit_price,
            attribution,
            occurred_at: Utc::now(),
        };
        let transaction = self.store.commit_movement(&sku, movement)?;
        debug!(
            product_id = %product_id,
            transaction_id = %transaction.transaction_id,
            operation = operation.as_str(),
            amount,
            "stock credited"
        );
        Ok(transaction)
    }

    /// Void a journal entry: reverse its counter effect and flag it deleted.
    ///
    /// The entry stays in the journal for the audit trail. Voiding a debit
    /// whose units are meanwhile promised to orders fails
    /// `InsufficientStock` and changes nothing; release the reservations
    /// first.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub fn void_transaction(&self, transaction_id: TransactionId) -> DomainResult<()> {
        // First read just finds the product to lock.
        let transaction = self
            .store
            .load_transaction(transaction_id)?
            .ok_or(DomainError::NotFound)?;

        let _guard = self.locks.acquire(transaction.product_id, self.lock_wait)?;
        // Re-read under the lock: a concurrent void may have won.
        let transaction = self
            .store
            .load_transaction(transaction_id)?
            .ok_or(DomainError::NotFound)?;
        if transaction.deleted {
            return Err(DomainError::invalid_state(format!(
                "transaction {transaction_id} is already voided"
            )));
        }

        let mut sku = self.sku(transaction.product_id)?;
        sku.apply_correction(-transaction.signed_amount())?;
        self.store.commit_void(&sku, transaction_id)?;
        warn!(
            product_id = %transaction.product_id,
            transaction_id = %transaction_id,
            side = transaction.side.as_str(),
            amount = transaction.amount,
            "journal entry voided"
        );
        Ok(())
    }

    /// A product's full journal, voided entries included, in id order.
    pub fn transactions(&self, product_id: ProductId) -> DomainResult<Vec<StockTransaction>> {
        // Existence check so an empty journal and an unknown product differ.
        self.sku(product_id)?;
        Ok(self.store.transactions_for(product_id)?)
    }

    /// Balance the journal implies for a product, ignoring voided entries.
    pub fn derived_on_hand(&self, product_id: ProductId) -> DomainResult<i64> {
        self.sku(product_id)?;
        let journal = self.store.transactions_for(product_id)?;
        Ok(derived_on_hand(&journal))
    }

    /// Audit one product: the stored counter must equal the journal fold.
    ///
    /// A mismatch means a write bypassed the ledger; it is reported as
    /// `Inconsistent` and logged, never repaired silently.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn verify(&self, product_id: ProductId) -> DomainResult<()> {
        let _guard = self.locks.acquire(product_id, self.lock_wait)?;
        let sku = self.sku(product_id)?;
        let journal = self.store.transactions_for(product_id)?;
        let derived = derived_on_hand(&journal);
        if derived != sku.stock_on_hand() {
            error!(
                product_id = %product_id,
                stored = sku.stock_on_hand(),
                derived,
                "stock counter does not match its journal"
            );
            return Err(DomainError::inconsistent(format!(
                "sku {product_id}: stored stock_on_hand {} but journal derives {derived}",
                sku.stock_on_hand()
            )));
        }
        Ok(())
    }

    /// What blocks retiring a product from the catalogue.
    ///
    /// Retirement is the catalogue's call; the ledger only reports whether
    /// stock remains or live journal entries still reference the product.
    pub fn retirement_blockers(&self, product_id: ProductId) -> DomainResult<RetirementBlockers> {
        let sku = self.sku(product_id)?;
        let journal = self.store.transactions_for(product_id)?;
        Ok(RetirementBlockers {
            stock_on_hand: sku.stock_on_hand(),
            active_journal_entries: journal.iter().filter(|entry| !entry.deleted).count(),
        })
    }

    /// Settle the stock side of a fulfillment: one fused step that credits
    /// physical stock and releases the matching reservation, plus the sale
    /// journal entry to commit with it.
    ///
    /// Counter mutation happens on the caller's copy; the caller owns the
    /// locks and the commit.
    pub(crate) fn settle_sale(
        &self,
        sku: &mut SkuRecord,
        amount: i64,
        unit_price: u64,
        attribution: Attribution,
    ) -> DomainResult<NewStockTransaction> {
        sku.fulfill(amount)?;
        Ok(NewStockTransaction {
            product_id: sku.product_id(),
            side: TransactionSide::Credit,
            operation: OperationCode::Sale,
            amount,
            unit_price,
            attribution,
            occurred_at: Utc::now(),
        })
    }
}
