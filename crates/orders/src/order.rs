use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{CustomerId, DomainError, DomainResult, EntryId, OrderId, ProductId};

use crate::status::OrderStatus;

/// One product position on a sales order.
///
/// `unit_price` is a snapshot taken from the catalogue when the entry was
/// added or re-pointed at a different product; later catalogue changes never
/// touch it. `fulfilled_quantity` counts units already shipped against the
/// entry, so `quantity - fulfilled_quantity` is what the order still claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderEntry {
    entry_id: EntryId,
    product_id: ProductId,
    quantity: i64,
    unit_price: u64,
    fulfilled_quantity: i64,
}

impl SalesOrderEntry {
    /// New entry with nothing fulfilled yet. Zero quantity is allowed; staff
    /// often add the position first and fill the count in later.
    pub fn new(
        entry_id: EntryId,
        product_id: ProductId,
        quantity: i64,
        unit_price: u64,
    ) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::invalid_amount(format!(
                "entry quantity must be non-negative, got {quantity}"
            )));
        }
        Ok(Self {
            entry_id,
            product_id,
            quantity,
            unit_price,
            fulfilled_quantity: 0,
        })
    }

    /// Rebuild an entry from persisted fields, validating the bookkeeping.
    pub fn from_parts(
        entry_id: EntryId,
        product_id: ProductId,
        quantity: i64,
        unit_price: u64,
        fulfilled_quantity: i64,
    ) -> DomainResult<Self> {
        if quantity < 0 || fulfilled_quantity < 0 || fulfilled_quantity > quantity {
            return Err(DomainError::inconsistent(format!(
                "entry {entry_id}: quantity={quantity}, fulfilled={fulfilled_quantity}"
            )));
        }
        Ok(Self {
            entry_id,
            product_id,
            quantity,
            unit_price,
            fulfilled_quantity,
        })
    }

    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Price in smallest currency unit (e.g., cents), snapshotted at edit time.
    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn fulfilled_quantity(&self) -> i64 {
        self.fulfilled_quantity
    }

    /// Units the order still claims against stock.
    pub fn outstanding(&self) -> i64 {
        self.quantity - self.fulfilled_quantity
    }

    pub fn is_fulfilled(&self) -> bool {
        self.outstanding() == 0
    }

    fn record_fulfillment(&mut self, amount: i64) -> DomainResult<()> {
        if amount <= 0 {
            return Err(DomainError::invalid_amount(format!(
                "fulfillment amount must be positive, got {amount}"
            )));
        }
        let outstanding = self.outstanding();
        if amount > outstanding {
            return Err(DomainError::invalid_amount(format!(
                "fulfillment of {amount} exceeds outstanding {outstanding} on entry {}",
                self.entry_id
            )));
        }
        self.fulfilled_quantity += amount;
        Ok(())
    }
}

/// What a status transition means for the commitment tracker.
///
/// The order itself knows nothing about stock; it only classifies the
/// transition so the service layer can reserve or release around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Pure bookkeeping change, stock untouched.
    None,
    /// Order entered the reservation band: reserve its outstanding quantities.
    Reserve,
    /// Order left the reservation band: release its outstanding quantities.
    Release,
}

/// Sales order: customer header plus product entries, gated by status.
///
/// At most one entry per product, so fulfillment can address positions by
/// product id. All mutators are pure in-memory operations; callers persist
/// the order (and any stock effect) afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    order_id: OrderId,
    customer_id: CustomerId,
    order_time: DateTime<Utc>,
    status: OrderStatus,
    status_time: DateTime<Utc>,
    entries: Vec<SalesOrderEntry>,
}

impl SalesOrder {
    /// Fresh order in `New` with no entries.
    pub fn new(order_id: OrderId, customer_id: CustomerId, at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            customer_id,
            order_time: at,
            status: OrderStatus::New,
            status_time: at,
            entries: Vec::new(),
        }
    }

    /// Rebuild an order from persisted fields.
    ///
    /// Rejects duplicate products among the entries; a row set that fails
    /// here was corrupted outside this crate.
    pub fn from_parts(
        order_id: OrderId,
        customer_id: CustomerId,
        order_time: DateTime<Utc>,
        status: OrderStatus,
        status_time: DateTime<Utc>,
        entries: Vec<SalesOrderEntry>,
    ) -> DomainResult<Self> {
        for (index, entry) in entries.iter().enumerate() {
            let duplicate = entries[..index]
                .iter()
                .any(|earlier| earlier.product_id == entry.product_id);
            if duplicate {
                return Err(DomainError::inconsistent(format!(
                    "order {order_id}: duplicate entry for product {}",
                    entry.product_id
                )));
            }
        }
        Ok(Self {
            order_id,
            customer_id,
            order_time,
            status,
            status_time,
            entries,
        })
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn order_time(&self) -> DateTime<Utc> {
        self.order_time
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// When the current status was entered.
    pub fn status_time(&self) -> DateTime<Utc> {
        self.status_time
    }

    pub fn entries(&self) -> &[SalesOrderEntry] {
        &self.entries
    }

    pub fn entry(&self, entry_id: EntryId) -> Option<&SalesOrderEntry> {
        self.entries.iter().find(|entry| entry.entry_id == entry_id)
    }

    /// Unique thanks to the one-entry-per-product rule.
    pub fn entry_for_product(&self, product_id: ProductId) -> Option<&SalesOrderEntry> {
        self.entries
            .iter()
            .find(|entry| entry.product_id == product_id)
    }

    pub fn is_changeable(&self) -> bool {
        self.status.is_changeable()
    }

    pub fn is_fully_fulfilled(&self) -> bool {
        self.entries.iter().all(SalesOrderEntry::is_fulfilled)
    }

    /// Outstanding units per product, ascending by product id.
    ///
    /// Positions already fully fulfilled (and zero-quantity entries) are
    /// omitted; this is exactly the set a reservation or release acts on.
    pub fn outstanding_by_product(&self) -> Vec<(ProductId, i64)> {
        let mut outstanding: Vec<(ProductId, i64)> = self
            .entries
            .iter()
            .filter(|entry| entry.outstanding() > 0)
            .map(|entry| (entry.product_id, entry.outstanding()))
            .collect();
        outstanding.sort_by_key(|(product_id, _)| *product_id);
        outstanding
    }

    /// Add a new product position.
    pub fn add_entry(&mut self, entry: SalesOrderEntry) -> DomainResult<()> {
        self.ensure_changeable()?;
        if self.entry_for_product(entry.product_id).is_some() {
            return Err(DomainError::invalid_state(format!(
                "order {} already has an entry for product {}",
                self.order_id, entry.product_id
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Re-point or re-count an existing position.
    ///
    /// The caller supplies the full replacement state, including the price
    /// snapshot for whichever product the entry now names.
    pub fn update_entry(
        &mut self,
        entry_id: EntryId,
        product_id: ProductId,
        quantity: i64,
        unit_price: u64,
    ) -> DomainResult<()> {
        self.ensure_changeable()?;
        if quantity < 0 {
            return Err(DomainError::invalid_amount(format!(
                "entry quantity must be non-negative, got {quantity}"
            )));
        }
        let conflict = self
            .entries
            .iter()
            .any(|entry| entry.entry_id != entry_id && entry.product_id == product_id);
        if conflict {
            return Err(DomainError::invalid_state(format!(
                "order {} already has an entry for product {product_id}",
                self.order_id
            )));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.entry_id == entry_id)
            .ok_or(DomainError::NotFound)?;
        if quantity < entry.fulfilled_quantity {
            return Err(DomainError::invalid_amount(format!(
                "quantity {quantity} is below the {} units already fulfilled",
                entry.fulfilled_quantity
            )));
        }
        entry.product_id = product_id;
        entry.quantity = quantity;
        entry.unit_price = unit_price;
        Ok(())
    }

    /// Drop a position entirely.
    pub fn remove_entry(&mut self, entry_id: EntryId) -> DomainResult<SalesOrderEntry> {
        self.ensure_changeable()?;
        let position = self
            .entries
            .iter()
            .position(|entry| entry.entry_id == entry_id)
            .ok_or(DomainError::NotFound)?;
        Ok(self.entries.remove(position))
    }

    /// Move the order to a new status and classify the stock effect.
    ///
    /// Terminal orders accept nothing further. Between non-terminal statuses
    /// any move is allowed; what the caller must act on is the returned
    /// [`TransitionEffect`], derived from whether the order enters or leaves
    /// the reservation band.
    pub fn transition(
        &mut self,
        new_status: OrderStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<TransitionEffect> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "order {} is {} and closed to transitions",
                self.order_id, self.status
            )));
        }
        let effect = match (
            self.status.retains_reservation(),
            new_status.retains_reservation(),
        ) {
            (false, true) => TransitionEffect::Reserve,
            (true, false) => TransitionEffect::Release,
            _ => TransitionEffect::None,
        };
        self.status = new_status;
        self.status_time = at;
        Ok(effect)
    }

    /// Book fulfilled units against the product's entry and roll the status.
    ///
    /// Only valid while the order holds a reservation. Afterwards the order
    /// is `Completed` if every entry is settled, `PartiallyCompleted`
    /// otherwise; the matching stock movement is the caller's business.
    /// Returns the status the order ended up in.
    pub fn record_fulfillment(
        &mut self,
        product_id: ProductId,
        amount: i64,
        at: DateTime<Utc>,
    ) -> DomainResult<OrderStatus> {
        if !self.status.retains_reservation() {
            return Err(DomainError::invalid_state(format!(
                "order {} holds no reservation in status {}",
                self.order_id, self.status
            )));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.product_id == product_id)
            .ok_or(DomainError::NotFound)?;
        entry.record_fulfillment(amount)?;
        self.status = if self.is_fully_fulfilled() {
            OrderStatus::Completed
        } else {
            OrderStatus::PartiallyCompleted
        };
        self.status_time = at;
        Ok(self.status)
    }

    fn ensure_changeable(&self) -> DomainResult<()> {
        if !self.status.is_changeable() {
            return Err(DomainError::order_locked(format!(
                "order {} entries are frozen in status {}",
                self.order_id, self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_order_id() -> OrderId {
        OrderId::new()
    }

    fn test_customer_id() -> CustomerId {
        CustomerId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn order_with_entry(quantity: i64) -> (SalesOrder, ProductId) {
        let mut order = SalesOrder::new(test_order_id(), test_customer_id(), test_time());
        let product_id = test_product_id();
        let entry = SalesOrderEntry::new(EntryId::new(), product_id, quantity, 100).unwrap();
        order.add_entry(entry).unwrap();
        (order, product_id)
    }

    #[test]
    fn new_order_starts_in_new_with_no_entries() {
        let order = SalesOrder::new(test_order_id(), test_customer_id(), test_time());
        assert_eq!(order.status(), OrderStatus::New);
        assert!(order.entries().is_empty());
        assert!(order.is_changeable());
    }

    #[test]
    fn entries_can_be_added_updated_and_removed_while_changeable() {
        let (mut order, _) = order_with_entry(5);
        let entry_id = order.entries()[0].entry_id();

        order.update_entry(entry_id, order.entries()[0].product_id(), 8, 120).unwrap();
        assert_eq!(order.entries()[0].quantity(), 8);
        assert_eq!(order.entries()[0].unit_price(), 120);

        let removed = order.remove_entry(entry_id).unwrap();
        assert_eq!(removed.entry_id(), entry_id);
        assert!(order.entries().is_empty());
    }

    #[test]
    fn duplicate_product_entries_are_rejected() {
        let (mut order, product_id) = order_with_entry(5);
        let duplicate = SalesOrderEntry::new(EntryId::new(), product_id, 2, 100).unwrap();
        match order.add_entry(duplicate) {
            Err(DomainError::InvalidState(_)) => {}
            other => panic!("Expected InvalidState for duplicate product, got {other:?}"),
        }

        let second = SalesOrderEntry::new(EntryId::new(), test_product_id(), 2, 100).unwrap();
        let second_id = second.entry_id();
        order.add_entry(second).unwrap();
        match order.update_entry(second_id, product_id, 2, 100) {
            Err(DomainError::InvalidState(_)) => {}
            other => panic!("Expected InvalidState for duplicate product, got {other:?}"),
        }
    }

    #[test]
    fn entries_freeze_once_the_order_leaves_the_changeable_band() {
        let (mut order, product_id) = order_with_entry(5);
        let entry_id = order.entries()[0].entry_id();
        order.transition(OrderStatus::Confirmed, test_time()).unwrap();

        let extra = SalesOrderEntry::new(EntryId::new(), test_product_id(), 1, 100).unwrap();
        match order.add_entry(extra) {
            Err(DomainError::OrderLocked(_)) => {}
            other => panic!("Expected OrderLocked after confirmation, got {other:?}"),
        }
        match order.update_entry(entry_id, product_id, 9, 100) {
            Err(DomainError::OrderLocked(_)) => {}
            other => panic!("Expected OrderLocked after confirmation, got {other:?}"),
        }
        match order.remove_entry(entry_id) {
            Err(DomainError::OrderLocked(_)) => {}
            other => panic!("Expected OrderLocked after confirmation, got {other:?}"),
        }
        assert_eq!(order.entries()[0].quantity(), 5);
    }

    #[test]
    fn transition_classifies_reservation_effects() {
        let (mut order, _) = order_with_entry(5);

        assert_eq!(
            order.transition(OrderStatus::Checking, test_time()).unwrap(),
            TransitionEffect::None
        );
        assert_eq!(
            order.transition(OrderStatus::Confirmed, test_time()).unwrap(),
            TransitionEffect::Reserve
        );
        assert_eq!(
            order.transition(OrderStatus::Paid, test_time()).unwrap(),
            TransitionEffect::None
        );
        assert_eq!(
            order.transition(OrderStatus::Canceled, test_time()).unwrap(),
            TransitionEffect::Release
        );
    }

    #[test]
    fn terminal_orders_accept_no_transitions() {
        let (mut order, _) = order_with_entry(5);
        order.transition(OrderStatus::Canceled, test_time()).unwrap();
        match order.transition(OrderStatus::New, test_time()) {
            Err(DomainError::InvalidState(_)) => {}
            other => panic!("Expected InvalidState from a canceled order, got {other:?}"),
        }
        assert_eq!(order.status(), OrderStatus::Canceled);
    }

    #[test]
    fn fulfillment_rolls_the_status_and_books_the_entry() {
        let (mut order, product_id) = order_with_entry(10);
        order.transition(OrderStatus::Confirmed, test_time()).unwrap();

        let status = order.record_fulfillment(product_id, 4, test_time()).unwrap();
        assert_eq!(status, OrderStatus::PartiallyCompleted);
        assert_eq!(order.entries()[0].fulfilled_quantity(), 4);
        assert_eq!(order.entries()[0].outstanding(), 6);

        let status = order.record_fulfillment(product_id, 6, test_time()).unwrap();
        assert_eq!(status, OrderStatus::Completed);
        assert!(order.is_fully_fulfilled());
    }

    #[test]
    fn fulfillment_beyond_outstanding_is_rejected() {
        let (mut order, product_id) = order_with_entry(10);
        order.transition(OrderStatus::Confirmed, test_time()).unwrap();
        order.record_fulfillment(product_id, 4, test_time()).unwrap();

        match order.record_fulfillment(product_id, 7, test_time()) {
            Err(DomainError::InvalidAmount(_)) => {}
            other => panic!("Expected InvalidAmount for over-fulfillment, got {other:?}"),
        }
        match order.record_fulfillment(product_id, 0, test_time()) {
            Err(DomainError::InvalidAmount(_)) => {}
            other => panic!("Expected InvalidAmount for zero fulfillment, got {other:?}"),
        }
        assert_eq!(order.entries()[0].fulfilled_quantity(), 4);
    }

    #[test]
    fn fulfillment_requires_a_reservation() {
        let (mut order, product_id) = order_with_entry(10);
        match order.record_fulfillment(product_id, 1, test_time()) {
            Err(DomainError::InvalidState(_)) => {}
            other => panic!("Expected InvalidState before confirmation, got {other:?}"),
        }
    }

    #[test]
    fn fulfillment_of_an_unknown_product_is_not_found() {
        let (mut order, _) = order_with_entry(10);
        order.transition(OrderStatus::Confirmed, test_time()).unwrap();
        match order.record_fulfillment(test_product_id(), 1, test_time()) {
            Err(DomainError::NotFound) => {}
            other => panic!("Expected NotFound for unknown product, got {other:?}"),
        }
    }

    #[test]
    fn quantity_cannot_drop_below_fulfilled() {
        let (mut order, product_id) = order_with_entry(10);
        order.transition(OrderStatus::Confirmed, test_time()).unwrap();
        order.record_fulfillment(product_id, 4, test_time()).unwrap();
        // Partially completed retains the reservation but is past the
        // changeable band, so shrink attempts fail on the lock first.
        let entry_id = order.entries()[0].entry_id();
        match order.update_entry(entry_id, product_id, 2, 100) {
            Err(DomainError::OrderLocked(_)) => {}
            other => panic!("Expected OrderLocked, got {other:?}"),
        }

        // A replacement failing the fulfilled floor directly.
        let entry = SalesOrderEntry::from_parts(entry_id, product_id, 10, 100, 4).unwrap();
        let mut fresh = SalesOrder::new(test_order_id(), test_customer_id(), test_time());
        fresh.add_entry(entry).unwrap();
        match fresh.update_entry(entry_id, product_id, 2, 100) {
            Err(DomainError::InvalidAmount(_)) => {}
            other => panic!("Expected InvalidAmount below fulfilled floor, got {other:?}"),
        }
    }

    #[test]
    fn outstanding_by_product_is_ascending_and_skips_settled_entries() {
        let mut order = SalesOrder::new(test_order_id(), test_customer_id(), test_time());
        let mut products: Vec<ProductId> = (0..4).map(|_| test_product_id()).collect();
        for product_id in &products {
            let entry = SalesOrderEntry::new(EntryId::new(), *product_id, 5, 100).unwrap();
            order.add_entry(entry).unwrap();
        }
        order.transition(OrderStatus::Confirmed, test_time()).unwrap();
        order.record_fulfillment(products[2], 5, test_time()).unwrap();

        let outstanding = order.outstanding_by_product();
        products.sort();
        let expected: Vec<(ProductId, i64)> = products
            .into_iter()
            .filter(|product_id| order.entry_for_product(*product_id).unwrap().outstanding() > 0)
            .map(|product_id| (product_id, 5))
            .collect();
        assert_eq!(outstanding, expected);
        assert_eq!(outstanding.len(), 3);
        assert!(outstanding.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }

    #[test]
    fn from_parts_rejects_duplicate_products_and_bad_bookkeeping() {
        let order_id = test_order_id();
        let product_id = test_product_id();
        let first = SalesOrderEntry::from_parts(EntryId::new(), product_id, 5, 100, 0).unwrap();
        let second = SalesOrderEntry::from_parts(EntryId::new(), product_id, 3, 100, 0).unwrap();
        match SalesOrder::from_parts(
            order_id,
            test_customer_id(),
            test_time(),
            OrderStatus::New,
            test_time(),
            vec![first, second],
        ) {
            Err(DomainError::Inconsistent(_)) => {}
            other => panic!("Expected Inconsistent for duplicate products, got {other:?}"),
        }

        match SalesOrderEntry::from_parts(EntryId::new(), product_id, 5, 100, 7) {
            Err(DomainError::Inconsistent(_)) => {}
            other => panic!("Expected Inconsistent for fulfilled > quantity, got {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Any accepted sequence of fulfillments keeps the entry bookkeeping
        /// within bounds and lands the status on the right side of done.
        #[test]
        fn fulfillment_bookkeeping_stays_within_bounds(
            quantity in 1i64..200,
            amounts in proptest::collection::vec(1i64..60, 1..12),
        ) {
            let (mut order, product_id) = order_with_entry(quantity);
            order.transition(OrderStatus::Confirmed, test_time()).unwrap();

            let mut accepted = 0i64;
            for amount in amounts {
                match order.record_fulfillment(product_id, amount, test_time()) {
                    Ok(status) => {
                        accepted += amount;
                        let expected = if accepted == quantity {
                            OrderStatus::Completed
                        } else {
                            OrderStatus::PartiallyCompleted
                        };
                        prop_assert_eq!(status, expected);
                    }
                    Err(DomainError::InvalidAmount(_)) => {
                        // Overshoot: entry must be untouched by the attempt.
                        prop_assert_eq!(order.entries()[0].fulfilled_quantity(), accepted);
                    }
                    Err(DomainError::InvalidState(_)) => {
                        // Already completed; nothing more may land.
                        prop_assert!(order.status().is_terminal());
                    }
                    Err(other) => return Err(TestCaseError::fail(format!("unexpected {other:?}"))),
                }
                let entry = &order.entries()[0];
                prop_assert!(entry.fulfilled_quantity() >= 0);
                prop_assert!(entry.fulfilled_quantity() <= entry.quantity());
            }
            prop_assert_eq!(order.entries()[0].fulfilled_quantity(), accepted);
        }
    }
}
