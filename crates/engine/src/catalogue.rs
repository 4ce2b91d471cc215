//! Catalogue-facing price seam.
//!
//! Order entries snapshot their unit price from the catalogue at edit time;
//! nothing in the engine re-reads a price after the snapshot. This trait is
//! the whole surface the engine needs from the catalogue side of the house.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use depot_core::{DomainError, DomainResult, ProductId};

/// Source of current catalogue unit prices.
///
/// Implementations answer "what does this product cost right now"; the
/// engine stamps the answer onto the order entry and never asks again for
/// that entry.
pub trait PriceSource: Send + Sync {
    /// Current unit price in the smallest currency unit.
    ///
    /// `NotFound` for products the catalogue does not carry.
    fn unit_price(&self, product_id: ProductId) -> DomainResult<u64>;
}

impl<P> PriceSource for Arc<P>
where
    P: PriceSource + ?Sized,
{
    fn unit_price(&self, product_id: ProductId) -> DomainResult<u64> {
        (**self).unit_price(product_id)
    }
}

/// Fixed price table.
///
/// Intended for tests/dev; production wires the real catalogue in behind
/// [`PriceSource`].
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    prices: RwLock<HashMap<ProductId, u64>>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a product's price.
    pub fn set_price(&self, product_id: ProductId, unit_price: u64) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(product_id, unit_price);
        }
    }
}

impl PriceSource for StaticPriceSource {
    fn unit_price(&self, product_id: ProductId) -> DomainResult<u64> {
        let prices = self
            .prices
            .read()
            .map_err(|_| DomainError::inconsistent("price table lock poisoned"))?;
        prices.get(&product_id).copied().ok_or(DomainError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_products_have_no_price() {
        let prices = StaticPriceSource::new();
        let product_id = ProductId::new();
        match prices.unit_price(product_id) {
            Err(DomainError::NotFound) => {}
            other => panic!("Expected NotFound, got {other:?}"),
        }

        prices.set_price(product_id, 250);
        assert_eq!(prices.unit_price(product_id).unwrap(), 250);
    }
}
