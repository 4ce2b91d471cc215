//! Stock domain module.
//!
//! This crate contains the business rules for physical and committed stock,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). The per-product record arithmetic lives here; serialization of
//! calls and durability live in `depot-engine`.

pub mod sku;
pub mod transaction;

pub use sku::SkuRecord;
pub use transaction::{
    Attribution, NewStockTransaction, OperationCode, StockTransaction, TransactionId,
    TransactionSide, derived_on_hand,
};
