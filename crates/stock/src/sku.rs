use serde::{Deserialize, Serialize};

use depot_core::{DomainError, DomainResult, ProductId};

/// Per-product stock record (one SKU per catalogue product).
///
/// Two counters are persisted: physical units on hand and units committed to
/// confirmed orders. The sellable quantity is always derived from them at
/// read time and never stored. Every mutator preserves the record invariant
/// `0 <= committed_stock <= stock_on_hand`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuRecord {
    product_id: ProductId,
    stock_on_hand: i64,
    committed_stock: i64,
    reorder_point: i64,
}

impl SkuRecord {
    /// Fresh record with all counters zero (product admitted to the catalogue).
    pub fn new(product_id: ProductId, reorder_point: i64) -> Self {
        Self {
            product_id,
            stock_on_hand: 0,
            committed_stock: 0,
            reorder_point,
        }
    }

    /// Rebuild a record from persisted counters, validating the invariant.
    ///
    /// Stores use this when loading rows; a row that fails here was corrupted
    /// outside this crate and surfaces as `Inconsistent`.
    pub fn from_parts(
        product_id: ProductId,
        stock_on_hand: i64,
        committed_stock: i64,
        reorder_point: i64,
    ) -> DomainResult<Self> {
        if stock_on_hand < 0 || committed_stock < 0 || committed_stock > stock_on_hand {
            return Err(DomainError::inconsistent(format!(
                "sku {product_id}: stock_on_hand={stock_on_hand}, committed_stock={committed_stock}"
            )));
        }
        Ok(Self {
            product_id,
            stock_on_hand,
            committed_stock,
            reorder_point,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn stock_on_hand(&self) -> i64 {
        self.stock_on_hand
    }

    pub fn committed_stock(&self) -> i64 {
        self.committed_stock
    }

    pub fn reorder_point(&self) -> i64 {
        self.reorder_point
    }

    /// Units sellable right now. Derived, never persisted.
    pub fn available_for_sale(&self) -> i64 {
        self.stock_on_hand - self.committed_stock
    }

    /// Informational threshold check for the catalogue/purchasing side.
    pub fn needs_reorder(&self) -> bool {
        self.stock_on_hand <= self.reorder_point
    }

    /// Increase physical stock. No upper bound.
    pub fn debit(&mut self, amount: i64) -> DomainResult<()> {
        ensure_positive(amount)?;
        self.stock_on_hand += amount;
        Ok(())
    }

    /// Decrease physical stock.
    ///
    /// Only unreserved stock may leave this way: the guard is against the
    /// sellable quantity, not the raw on-hand count, so committed units stay
    /// covered. Reserved units leave through [`SkuRecord::fulfill`].
    pub fn credit(&mut self, amount: i64) -> DomainResult<()> {
        ensure_positive(amount)?;
        let available = self.available_for_sale();
        if amount > available {
            return Err(DomainError::insufficient_stock(amount, available));
        }
        self.stock_on_hand -= amount;
        Ok(())
    }

    /// Reserve sellable units for a confirmed order.
    pub fn reserve(&mut self, amount: i64) -> DomainResult<()> {
        ensure_positive(amount)?;
        let available = self.available_for_sale();
        if amount > available {
            return Err(DomainError::insufficient_stock(amount, available));
        }
        self.committed_stock += amount;
        Ok(())
    }

    /// Release previously reserved units.
    ///
    /// Releasing more than is committed means an upstream caller lost track
    /// of a reservation. The counter is floored at zero so reconciliation
    /// starts from a valid record, but the call still fails `Inconsistent`;
    /// callers must report it, not swallow it.
    pub fn release(&mut self, amount: i64) -> DomainResult<()> {
        ensure_positive(amount)?;
        if amount > self.committed_stock {
            let committed = self.committed_stock;
            self.committed_stock = 0;
            return Err(DomainError::inconsistent(format!(
                "release of {amount} exceeds committed stock {committed} for {}",
                self.product_id
            )));
        }
        self.committed_stock -= amount;
        Ok(())
    }

    /// Convert reserved units into an actual outflow: one atomic step that
    /// credits physical stock and releases the matching reservation.
    ///
    /// Split into a separate credit and release, the record would transit a
    /// state with `committed_stock > stock_on_hand`; fused, no observable
    /// state ever violates the invariant.
    pub fn fulfill(&mut self, amount: i64) -> DomainResult<()> {
        ensure_positive(amount)?;
        if amount > self.stock_on_hand {
            return Err(DomainError::insufficient_stock(amount, self.stock_on_hand));
        }
        if amount > self.committed_stock {
            return Err(DomainError::inconsistent(format!(
                "fulfillment of {amount} exceeds committed stock {} for {}",
                self.committed_stock, self.product_id
            )));
        }
        self.stock_on_hand -= amount;
        self.committed_stock -= amount;
        Ok(())
    }

    /// Overwrite the committed counter from re-derived order reservations.
    ///
    /// Reconciliation only; every other write path goes through
    /// [`SkuRecord::reserve`] / [`SkuRecord::release`] / [`SkuRecord::fulfill`].
    pub fn set_committed(&mut self, committed: i64) -> DomainResult<()> {
        if committed < 0 || committed > self.stock_on_hand {
            return Err(DomainError::inconsistent(format!(
                "committed_stock {committed} out of range for {} (stock_on_hand {})",
                self.product_id, self.stock_on_hand
            )));
        }
        self.committed_stock = committed;
        Ok(())
    }

    /// Apply a signed correction to physical stock (voided ledger entry).
    ///
    /// Reversing a debit may not strand committed units uncovered; reversing
    /// a credit adds the units back.
    pub fn apply_correction(&mut self, delta: i64) -> DomainResult<()> {
        let new_on_hand = self.stock_on_hand + delta;
        if new_on_hand < self.committed_stock {
            return Err(DomainError::insufficient_stock(
                -delta,
                self.available_for_sale(),
            ));
        }
        self.stock_on_hand = new_on_hand;
        Ok(())
    }
}

fn ensure_positive(amount: i64) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::invalid_amount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
