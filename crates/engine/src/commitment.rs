//! Commitment tracker.
//!
//! Sole writer of the committed counter. Reservations never move physical
//! stock; they promise sellable units to confirmed orders and shrink what
//! `available_for_sale` reports. The order-shaped operations act on the
//! whole outstanding set of an order under ascending multi-key locks, so a
//! confirmation either reserves every position or none of them.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use depot_core::{DomainError, DomainResult, ProductId};
use depot_stock::SkuRecord;

use crate::config::EngineConfig;
use crate::locks::KeyLocks;
use crate::store::LedgerStore;

/// Reservation bookkeeping against SKU records.
pub struct CommitmentTracker {
    store: Arc<dyn LedgerStore>,
    locks: Arc<KeyLocks<ProductId>>,
    lock_wait: Duration,
}

impl CommitmentTracker {
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

    /// Promise sellable units to an order.
    #[instrument(skip(self), fields(product_id = %product_id, amount))]
    pub fn reserve(&self, product_id: ProductId, amount: i64) -> DomainResult<()> {
        let _guard = self.locks.acquire(product_id, self.lock_wait)?;
        let mut sku = self.load(product_id)?;
        sku.reserve(amount)?;
        self.store.update_skus(&[sku])?;
        debug!(product_id = %product_id, amount, "stock reserved");
        Ok(())
    }

    /// Return promised units to the sellable pool.
    ///
    /// Releasing more than is committed means a reservation was lost track
    /// of upstream. The record is persisted floored at zero so recovery
    /// starts from a valid state, but the call still fails `Inconsistent`
    /// for the caller to report.
    #[instrument(skip(self), fields(product_id = %product_id, amount))]
    pub fn release(&self, product_id: ProductId, amount: i64) -> DomainResult<()> {
        let _guard = self.locks.acquire(product_id, self.lock_wait)?;
        let mut sku = self.load(product_id)?;
        match sku.release(amount) {
            Ok(()) => {
                self.store.update_skus(&[sku])?;
                debug!(product_id = %product_id, amount, "reservation released");
                Ok(())
            }
            Err(error @ DomainError::Inconsistent(_)) => {
                // Keep the clamped record; the drift is reported, not hidden.
                error!(
                    product_id = %product_id,
                    amount,
                    "release exceeded committed stock; counter floored at zero"
                );
                self.store.update_skus(&[sku])?;
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Reserve an order's whole outstanding set, all or nothing.
    ///
    /// Products are locked in ascending order and mutated on copies; the
    /// batch is persisted only after every position fits, so a shortfall on
    /// the last product leaves the first untouched.
    #[instrument(skip(self, requirements), fields(product_count = requirements.len()))]
    pub(crate) fn reserve_for_order(
        &self,
        requirements: &[(ProductId, i64)],
    ) -> DomainResult<()> {
        if requirements.is_empty() {
            return Ok(());
        }
        let products: Vec<ProductId> = requirements.iter().map(|(product, _)| *product).collect();
        let _guard = self.locks.acquire_many(&products, self.lock_wait)?;

        let mut updated = Vec::with_capacity(requirements.len());
        for (product_id, amount) in requirements {
            let mut sku = self.load(*product_id)?;
            if let Err(error) = sku.reserve(*amount) {
                warn!(
                    product_id = %product_id,
                    amount,
                    %error,
                    "order reservation rejected; no position was reserved"
                );
                return Err(error);
            }
            updated.push(sku);
        }
        self.store.update_skus(&updated)?;
        debug!(product_count = updated.len(), "order reservations committed");
        Ok(())
    }

    /// Release an order's whole outstanding set.
    ///
    /// Unlike reservation this must not stop halfway: an order leaving the
    /// reservation band gives every position back even if one of them turns
    /// out to be over-released. Such a drift is clamped, persisted, and
    /// reported through the first `Inconsistent` error after the rest of
    /// the batch has been handled.
    #[instrument(skip(self, requirements), fields(product_count = requirements.len()))]
    pub(crate) fn release_for_order(
        &self,
        requirements: &[(ProductId, i64)],
    ) -> DomainResult<()> {
        if requirements.is_empty() {
            return Ok(());
        }
        let products: Vec<ProductId> = requirements.iter().map(|(product, _)| *product).collect();
        let _guard = self.locks.acquire_many(&products, self.lock_wait)?;

        let mut updated = Vec::with_capacity(requirements.len());
        let mut first_error: Option<DomainError> = None;
        for (product_id, amount) in requirements {
            let mut sku = self.load(*product_id)?;
            match sku.release(*amount) {
                Ok(()) => updated.push(sku),
                Err(error @ DomainError::Inconsistent(_)) => {
                    error!(
                        product_id = %product_id,
                        amount,
                        "release exceeded committed stock; counter floored at zero"
                    );
                    updated.push(sku);
                    first_error.get_or_insert(error);
                }
                Err(error) => return Err(error),
            }
        }
        self.store.update_skus(&updated)?;
        match first_error {
            None => {
                debug!(product_count = updated.len(), "order reservations released");
                Ok(())
            }
            Some(error) => Err(error),
        }
    }

    fn load(&self, product_id: ProductId) -> DomainResult<SkuRecord> {
        self.store.load_sku(product_id)?.ok_or(DomainError::NotFound)
    }
}
