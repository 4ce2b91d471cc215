//! Service layer: guarded stock and order operations over a shared store.
//!
//! Four services cover the write paths, all operating on the same
//! [`LedgerStore`] behind per-key locks:
//!
//! - [`StockLedger`] moves physical stock and keeps the journal,
//! - [`CommitmentTracker`] reserves and releases sellable stock,
//! - [`OrderDesk`] runs the sales order lifecycle,
//! - [`FulfillmentCoordinator`] ships reserved positions and reconciles
//!   committed counters against open orders.
//!
//! Stores come in two flavors: [`MemoryLedgerStore`] for tests and
//! single-process use, [`PostgresLedgerStore`] for durable deployments.

pub mod catalogue;
pub mod commitment;
pub mod config;
pub mod desk;
pub mod fulfillment;
pub mod ledger;
pub mod locks;
pub mod store;

pub use catalogue::{PriceSource, StaticPriceSource};
pub use commitment::CommitmentTracker;
pub use config::{DEFAULT_LOCK_WAIT, EngineConfig};
pub use desk::OrderDesk;
pub use fulfillment::{CommitmentRepair, FulfillmentCoordinator, FulfillmentOutcome};
pub use ledger::{RetirementBlockers, StockLedger};
pub use locks::{KeyGuard, KeyLocks};
pub use store::{LedgerStore, MemoryLedgerStore, PostgresLedgerStore, StoreError};
