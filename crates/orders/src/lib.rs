//! Sales order domain module.
//!
//! Pure order state: the status lifecycle, entry bookkeeping, and the
//! classification of transitions into stock effects. No IO and no stock
//! arithmetic here; reservations and fulfillment stock movements are applied
//! by the services in `depot-engine` based on what these types report.

pub mod order;
pub mod status;

pub use order::{SalesOrder, SalesOrderEntry, TransitionEffect};
pub use status::OrderStatus;
