//! Fulfillment and reconciliation.
//!
//! [`FulfillmentCoordinator`] turns a reserved order position into shipped
//! goods: one call moves physical stock out, settles the matching share of
//! the commitment, appends the sale to the journal, and advances the
//! order's fulfillment bookkeeping, persisted together as a single store
//! commit. It also re-derives committed counters from open orders when the
//! stored values are suspected to have drifted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument};

use depot_core::{DomainError, DomainResult, OrderId, ProductId};
use depot_orders::OrderStatus;
use depot_stock::{Attribution, StockTransaction};

use crate::config::EngineConfig;
use crate::ledger::StockLedger;
use crate::locks::KeyLocks;
use crate::store::LedgerStore;

/// What one fulfillment call produced.
#[derive(Debug, Clone)]
pub struct FulfillmentOutcome {
    /// The sale journal entry recording the outbound movement.
    pub transaction: StockTransaction,
    /// Order status after the fulfillment was booked.
    pub order_status: OrderStatus,
}

/// One committed-counter correction applied by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentRepair {
    pub product_id: ProductId,
    /// Counter value found in the store.
    pub stored_committed: i64,
    /// Counter value re-derived from open orders.
    pub derived_committed: i64,
    /// Value actually written, capped at the product's stock on hand.
    pub applied_committed: i64,
}

impl CommitmentRepair {
    /// False when the derived demand exceeded physical stock and the
    /// written value had to be capped short of it.
    pub fn fully_applied(&self) -> bool {
        self.applied_committed == self.derived_committed
    }
}

/// Shipment service bridging orders and stock.
pub struct FulfillmentCoordinator {
    store: Arc<dyn LedgerStore>,
    order_locks: Arc<KeyLocks<OrderId>>,
    product_locks: Arc<KeyLocks<ProductId>>,
    ledger: Arc<StockLedger>,
    lock_wait: Duration,
}

impl FulfillmentCoordinator {
    /// Wire the coordinator over shared storage and locks.
    ///
    /// When the config enables startup reconciliation, committed counters
    /// are rebuilt from open orders before the coordinator is handed out; a
    /// store failure during that pass fails construction.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        order_locks: Arc<KeyLocks<OrderId>>,
        product_locks: Arc<KeyLocks<ProductId>>,
        ledger: Arc<StockLedger>,
        config: &EngineConfig,
    ) -> DomainResult<Self> {
        let coordinator = Self {
            store,
            order_locks,
            product_locks,
            ledger,
            lock_wait: config.lock_wait,
        };
        if config.reconcile_on_start {
            let repairs = coordinator.reconcile_commitments()?;
            info!(
                repairs = repairs.len(),
                "startup commitment reconciliation finished"
            );
        }
        Ok(coordinator)
    }

    /// Ship `amount` units of one order position, journaled at `unit_price`.
    ///
    /// The coordinator never consults the catalogue; callers pass the price
    /// the sale was agreed at, normally the entry's snapshot. Stock
    /// counters, the journal entry and the order's fulfillment progress are
    /// persisted in one commit; any validation failure leaves all three
    /// untouched.
    ///
    /// The order lock is taken first and held across the product lock,
    /// matching the ordering used by status transitions.
    #[instrument(
        skip(self, attribution),
        fields(order_id = %order_id, product_id = %product_id, amount, unit_price),
    )]
    pub fn fulfill(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        amount: i64,
        unit_price: u64,
        attribution: Attribution,
    ) -> DomainResult<FulfillmentOutcome> {
        let _order_guard = self.order_locks.acquire(order_id, self.lock_wait)?;
        let mut order = self
            .store
            .load_order(order_id)?
            .ok_or(DomainError::NotFound)?;
        let order_status = order.record_fulfillment(product_id, amount, Utc::now())?;

        let _product_guard = self.product_locks.acquire(product_id, self.lock_wait)?;
        let mut sku = self
            .store
            .load_sku(product_id)?
            .ok_or(DomainError::NotFound)?;
        let movement = self
            .ledger
            .settle_sale(&mut sku, amount, unit_price, attribution)?;
        let transaction = self.store.commit_fulfillment(&order, &sku, movement)?;

        info!(
            order_id = %order_id,
            product_id = %product_id,
            amount,
            order_status = order_status.as_str(),
            "order position fulfilled"
        );
        Ok(FulfillmentOutcome {
            transaction,
            order_status,
        })
    }

    /// Rebuild committed counters from open orders and repair drift.
    ///
    /// Expected committed stock per product is the sum of outstanding
    /// quantities across all orders whose status retains a reservation.
    /// Each product whose stored counter disagrees is re-checked and
    /// corrected under its lock. When derived demand exceeds physical
    /// stock the counter is capped at stock on hand and the shortfall is
    /// reported, not invented.
    ///
    /// Intended to run at startup, before the services take traffic;
    /// counters written while orders are concurrently confirmed can be
    /// stale by the time they land.
    #[instrument(skip(self))]
    pub fn reconcile_commitments(&self) -> DomainResult<Vec<CommitmentRepair>> {
        let mut derived: BTreeMap<ProductId, i64> = BTreeMap::new();
        for order in self.store.open_orders()? {
            for (product_id, outstanding) in order.outstanding_by_product() {
                *derived.entry(product_id).or_insert(0) += outstanding;
            }
        }

        let mut repairs = Vec::new();
        for sku in self.store.list_skus()? {
            let product_id = sku.product_id();
            let expected = derived.remove(&product_id).unwrap_or(0);
            if sku.committed_stock() == expected {
                continue;
            }

            let _guard = self.product_locks.acquire(product_id, self.lock_wait)?;
            let mut current = self
                .store
                .load_sku(product_id)?
                .ok_or(DomainError::NotFound)?;
            if current.committed_stock() == expected {
                continue;
            }

            let applied = expected.min(current.stock_on_hand());
            let repair = CommitmentRepair {
                product_id,
                stored_committed: current.committed_stock(),
                derived_committed: expected,
                applied_committed: applied,
            };
            current.set_committed(applied)?;
            self.store.update_skus(&[current])?;

            error!(
                product_id = %product_id,
                stored = repair.stored_committed,
                derived = repair.derived_committed,
                applied = repair.applied_committed,
                "committed stock drift repaired"
            );
            if !repair.fully_applied() {
                error!(
                    product_id = %product_id,
                    shortfall = repair.derived_committed - repair.applied_committed,
                    "open-order demand exceeds physical stock"
                );
            }
            repairs.push(repair);
        }

        // Open-order demand against products with no stock record cannot
        // be repaired here; surface it and move on.
        for (product_id, outstanding) in derived {
            error!(
                product_id = %product_id,
                outstanding,
                "open orders reference a product with no stock record"
            );
        }

        Ok(repairs)
    }
}
