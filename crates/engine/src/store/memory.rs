use std::collections::HashMap;
use std::sync::RwLock;

use depot_core::{OrderId, ProductId};
use depot_orders::SalesOrder;
use depot_stock::{NewStockTransaction, SkuRecord, StockTransaction, TransactionId};

use super::{LedgerStore, StoreError};

#[derive(Debug, Default)]
struct State {
    skus: HashMap<ProductId, SkuRecord>,
    journal: Vec<StockTransaction>,
    last_transaction_id: u64,
    orders: HashMap<OrderId, SalesOrder>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Not optimized for performance; every method takes
/// the single state lock, which trivially gives the all-or-nothing commit
/// the trait requires.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: RwLock<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

impl State {
    fn append_movement(&mut self, movement: NewStockTransaction) -> StockTransaction {
        self.last_transaction_id += 1;
        let stored =
            StockTransaction::from_new(TransactionId::new(self.last_transaction_id), movement);
        self.journal.push(stored.clone());
        stored
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn insert_sku(&self, sku: &SkuRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.skus.contains_key(&sku.product_id()) {
            return Err(StoreError::Duplicate(format!("sku {}", sku.product_id())));
        }
        state.skus.insert(sku.product_id(), sku.clone());
        Ok(())
    }

    fn load_sku(&self, product_id: ProductId) -> Result<Option<SkuRecord>, StoreError> {
        Ok(self.read()?.skus.get(&product_id).cloned())
    }

    fn list_skus(&self) -> Result<Vec<SkuRecord>, StoreError> {
        let state = self.read()?;
        let mut skus: Vec<SkuRecord> = state.skus.values().cloned().collect();
        skus.sort_by_key(SkuRecord::product_id);
        Ok(skus)
    }

    fn update_skus(&self, skus: &[SkuRecord]) -> Result<(), StoreError> {
        let mut state = self.write()?;
        // Validate the whole batch before writing any of it.
        for sku in skus {
            if !state.skus.contains_key(&sku.product_id()) {
                return Err(StoreError::Missing(format!("sku {}", sku.product_id())));
            }
        }
        for sku in skus {
            state.skus.insert(sku.product_id(), sku.clone());
        }
        Ok(())
    }

    fn commit_movement(
        &self,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        let mut state = self.write()?;
        if !state.skus.contains_key(&sku.product_id()) {
            return Err(StoreError::Missing(format!("sku {}", sku.product_id())));
        }
        state.skus.insert(sku.product_id(), sku.clone());
        Ok(state.append_movement(movement))
    }

    fn commit_void(
        &self,
        sku: &SkuRecord,
        transaction_id: TransactionId,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.skus.contains_key(&sku.product_id()) {
            return Err(StoreError::Missing(format!("sku {}", sku.product_id())));
        }
        let entry = state
            .journal
            .iter_mut()
            .find(|entry| entry.transaction_id == transaction_id)
            .ok_or_else(|| StoreError::Missing(format!("transaction {transaction_id}")))?;
        entry.deleted = true;
        state.skus.insert(sku.product_id(), sku.clone());
        Ok(())
    }

    fn load_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<StockTransaction>, StoreError> {
        let state = self.read()?;
        Ok(state
            .journal
            .iter()
            .find(|entry| entry.transaction_id == transaction_id)
            .cloned())
    }

    fn transactions_for(&self, product_id: ProductId) -> Result<Vec<StockTransaction>, StoreError> {
        let state = self.read()?;
        Ok(state
            .journal
            .iter()
            .filter(|entry| entry.product_id == product_id)
            .cloned()
            .collect())
    }

    fn insert_order(&self, order: &SalesOrder) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.orders.contains_key(&order.order_id()) {
            return Err(StoreError::Duplicate(format!("order {}", order.order_id())));
        }
        state.orders.insert(order.order_id(), order.clone());
        Ok(())
    }

    fn load_order(&self, order_id: OrderId) -> Result<Option<SalesOrder>, StoreError> {
        Ok(self.read()?.orders.get(&order_id).cloned())
    }

    fn update_order(&self, order: &SalesOrder) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.orders.contains_key(&order.order_id()) {
            return Err(StoreError::Missing(format!("order {}", order.order_id())));
        }
        state.orders.insert(order.order_id(), order.clone());
        Ok(())
    }

    fn remove_order(&self, order_id: OrderId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state
            .orders
            .remove(&order_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::Missing(format!("order {order_id}")))
    }

    fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        let state = self.read()?;
        let mut open: Vec<SalesOrder> = state
            .orders
            .values()
            .filter(|order| order.status().retains_reservation())
            .cloned()
            .collect();
        open.sort_by_key(SalesOrder::order_id);
        Ok(open)
    }

    fn commit_fulfillment(
        &self,
        order: &SalesOrder,
        sku: &SkuRecord,
        movement: NewStockTransaction,
    ) -> Result<StockTransaction, StoreError> {
        let mut state = self.write()?;
        if !state.orders.contains_key(&order.order_id()) {
            return Err(StoreError::Missing(format!("order {}", order.order_id())));
        }
        if !state.skus.contains_key(&sku.product_id()) {
            return Err(StoreError::Missing(format!("sku {}", sku.product_id())));
        }
        state.orders.insert(order.order_id(), order.clone());
        state.skus.insert(sku.product_id(), sku.clone());
        Ok(state.append_movement(movement))
    }
}
