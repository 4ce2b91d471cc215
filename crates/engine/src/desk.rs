//! Order desk.
//!
//! Lifecycle service for sales orders: intake, entry editing with catalogue
//! price snapshots, and status transitions. The desk owns the order locks
//! and hands every stock consequence of a transition to the commitment
//! tracker, ordering the two so a failed reservation leaves the order's
//! persisted status untouched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};

use depot_core::{CustomerId, DomainError, DomainResult, EntryId, OrderId, ProductId};
use depot_orders::{OrderStatus, SalesOrder, SalesOrderEntry, TransitionEffect};

use crate::catalogue::PriceSource;
use crate::commitment::CommitmentTracker;
use crate::config::EngineConfig;
use crate::locks::KeyLocks;
use crate::store::LedgerStore;

/// Sales order lifecycle service.
pub struct OrderDesk {
    store: Arc<dyn LedgerStore>,
    locks: Arc<KeyLocks<OrderId>>,
    tracker: Arc<CommitmentTracker>,
    prices: Arc<dyn PriceSource>,
    lock_wait: Duration,
}

impl OrderDesk {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<KeyLocks<OrderId>>,
        tracker: Arc<CommitmentTracker>,
        prices: Arc<dyn PriceSource>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            locks,
            tracker,
            prices,
            lock_wait: config.lock_wait,
        }
    }

    /// Open a fresh order for a customer.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub fn create_order(&self, customer_id: CustomerId) -> DomainResult<SalesOrder> {
        let order = SalesOrder::new(OrderId::new(), customer_id, Utc::now());
        self.store.insert_order(&order)?;
        info!(order_id = %order.order_id(), customer_id = %customer_id, "order created");
        Ok(order)
    }

    /// Point-in-time snapshot of one order.
    pub fn order(&self, order_id: OrderId) -> DomainResult<SalesOrder> {
        self.load(order_id)
    }

    /// Add a product position, snapshotting its current catalogue price.
    #[instrument(skip(self), fields(order_id = %order_id, product_id = %product_id, quantity))]
    pub fn add_entry(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
    ) -> DomainResult<SalesOrderEntry> {
        let _guard = self.locks.acquire(order_id, self.lock_wait)?;
        let mut order = self.load(order_id)?;
        let unit_price = self.prices.unit_price(product_id)?;
        let entry = SalesOrderEntry::new(EntryId::new(), product_id, quantity, unit_price)?;
        order.add_entry(entry.clone())?;
        self.store.update_order(&order)?;
        Ok(entry)
    }

    /// Edit a position. `None` keeps the current product or quantity.
    ///
    /// Re-pointing the entry at a different product takes a fresh price
    /// snapshot; a pure quantity change keeps the price the entry was sold
    /// at.
    #[instrument(skip(self), fields(order_id = %order_id, entry_id = %entry_id))]
    pub fn update_entry(
        &self,
        order_id: OrderId,
        entry_id: EntryId,
        product_id: Option<ProductId>,
        quantity: Option<i64>,
    ) -> DomainResult<SalesOrderEntry> {
        let _guard = self.locks.acquire(order_id, self.lock_wait)?;
        let mut order = self.load(order_id)?;
        let current = order.entry(entry_id).ok_or(DomainError::NotFound)?;

        let new_product = product_id.unwrap_or(current.product_id());
        let new_quantity = quantity.unwrap_or(current.quantity());
        let unit_price = if new_product == current.product_id() {
            current.unit_price()
        } else {
            self.prices.unit_price(new_product)?
        };

        order.update_entry(entry_id, new_product, new_quantity, unit_price)?;
        self.store.update_order(&order)?;
        let updated = order.entry(entry_id).ok_or(DomainError::NotFound)?.clone();
        Ok(updated)
    }

    /// Drop a position from a still-changeable order.
    #[instrument(skip(self), fields(order_id = %order_id, entry_id = %entry_id))]
    pub fn remove_entry(&self, order_id: OrderId, entry_id: EntryId) -> DomainResult<()> {
        let _guard = self.locks.acquire(order_id, self.lock_wait)?;
        let mut order = self.load(order_id)?;
        order.remove_entry(entry_id)?;
        self.store.update_order(&order)?;
        Ok(())
    }

    /// Move an order to a new status, applying the stock consequences.
    ///
    /// Entering the reservation band reserves the order's outstanding
    /// quantities all-or-nothing: if any position cannot be covered, the
    /// persisted order keeps its previous status and no stock is touched.
    /// Leaving the band releases outstanding reservations; the status
    /// change is persisted even if a release uncovers commitment drift,
    /// with the drift reported to the caller after the fact.
    #[instrument(skip(self), fields(order_id = %order_id, status = status.as_str()))]
    pub fn set_status(&self, order_id: OrderId, status: OrderStatus) -> DomainResult<SalesOrder> {
        let _guard = self.locks.acquire(order_id, self.lock_wait)?;
        let mut order = self.load(order_id)?;
        let previous = order.status();
        let effect = order.transition(status, Utc::now())?;

        match effect {
            TransitionEffect::Reserve => {
                if order.entries().is_empty() {
                    return Err(DomainError::invalid_state(format!(
                        "order {order_id} has no entries to reserve"
                    )));
                }
                self.tracker.reserve_for_order(&order.outstanding_by_product())?;
                self.store.update_order(&order)?;
            }
            TransitionEffect::Release => {
                // The release must not block the transition: a canceled
                // order stays canceled even when the reservation turns out
                // to have drifted, with the drift reported afterwards.
                let released = self.tracker.release_for_order(&order.outstanding_by_product());
                self.store.update_order(&order)?;
                released?;
            }
            TransitionEffect::None => {
                self.store.update_order(&order)?;
            }
        }

        info!(
            order_id = %order_id,
            from = previous.as_str(),
            to = status.as_str(),
            "order status changed"
        );
        Ok(order)
    }

    /// Remove an order outright. Only orders still in `New` qualify;
    /// everything past intake is closed by transition and kept on file.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn remove_order(&self, order_id: OrderId) -> DomainResult<()> {
        let _guard = self.locks.acquire(order_id, self.lock_wait)?;
        let order = self.load(order_id)?;
        if order.status() != OrderStatus::New {
            return Err(DomainError::invalid_state(format!(
                "only new orders can be removed; order {order_id} is {}",
                order.status()
            )));
        }
        self.store.remove_order(order_id)?;
        info!(order_id = %order_id, "order removed");
        Ok(())
    }

    fn load(&self, order_id: OrderId) -> DomainResult<SalesOrder> {
        self.store.load_order(order_id)?.ok_or(DomainError::NotFound)
    }
}
