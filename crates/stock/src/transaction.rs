use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{CounterpartyId, ProductId, UserId};

/// Journal entry identifier.
///
/// Monotonic per store, assigned at write time. Not a uuid: the ordering of
/// transaction ids is the ordering of the journal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for TransactionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Which way a movement changes physical stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSide {
    /// Stock on hand increases.
    Debit,
    /// Stock on hand decreases.
    Credit,
}

impl TransactionSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "debit" => Some(Self::Debit),
            "credit" => Some(Self::Credit),
            _ => None,
        }
    }

    /// Sign applied to the amount when folding a journal into a balance.
    pub fn sign(self) -> i64 {
        match self {
            Self::Debit => 1,
            Self::Credit => -1,
        }
    }
}

/// Business reason for a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCode {
    Purchase,
    Sale,
    SaleReturn,
    PurchaseReturn,
    /// Inter-SKU correction: stock moved between gradings of a product,
    /// recorded as a paired debit/credit.
    Regrade,
    WriteOff,
}

impl OperationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Sale => "sale",
            Self::SaleReturn => "sale_return",
            Self::PurchaseReturn => "purchase_return",
            Self::Regrade => "regrade",
            Self::WriteOff => "write_off",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "purchase" => Some(Self::Purchase),
            "sale" => Some(Self::Sale),
            "sale_return" => Some(Self::SaleReturn),
            "purchase_return" => Some(Self::PurchaseReturn),
            "regrade" => Some(Self::Regrade),
            "write_off" => Some(Self::WriteOff),
            _ => None,
        }
    }
}

/// Who was on the other end of a movement, and who recorded it.
///
/// Both sides are opaque attribution for the audit trail; nothing in the core
/// dereferences them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub counterparty: Option<CounterpartyId>,
    pub user: Option<UserId>,
}

impl Attribution {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(counterparty: Option<CounterpartyId>, user: Option<UserId>) -> Self {
        Self { counterparty, user }
    }
}

/// A stock movement ready to be journaled (no id yet).
///
/// The store assigns the [`TransactionId`] during commit, the same way
/// sequence numbers are assigned at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockTransaction {
    pub product_id: ProductId,
    pub side: TransactionSide,
    pub operation: OperationCode,
    /// Positive unit count; the side carries the direction.
    pub amount: i64,
    /// Unit price in the smallest currency unit at the time of the movement.
    pub unit_price: u64,
    pub attribution: Attribution,
    pub occurred_at: DateTime<Utc>,
}

/// Immutable ledger entry: one debit or credit applied to a product's stock.
///
/// Never mutated after the write except for the `deleted` soft-cancel flag;
/// a deleted entry drops out of balance derivation but stays in the journal
/// so the audit history is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub transaction_id: TransactionId,
    pub product_id: ProductId,
    pub side: TransactionSide,
    pub operation: OperationCode,
    pub amount: i64,
    pub unit_price: u64,
    pub attribution: Attribution,
    pub occurred_at: DateTime<Utc>,
    pub deleted: bool,
}

impl StockTransaction {
    /// Promote an uncommitted movement once the store has assigned its id.
    pub fn from_new(transaction_id: TransactionId, movement: NewStockTransaction) -> Self {
        Self {
            transaction_id,
            product_id: movement.product_id,
            side: movement.side,
            operation: movement.operation,
            amount: movement.amount,
            unit_price: movement.unit_price,
            attribution: movement.attribution,
            occurred_at: movement.occurred_at,
            deleted: false,
        }
    }

    /// Signed effect of this entry on stock on hand; zero once voided.
    pub fn signed_amount(&self) -> i64 {
        if self.deleted {
            0
        } else {
            self.side.sign() * self.amount
        }
    }
}

/// Fold a product's journal into the balance it implies.
///
/// Voided entries contribute nothing. The result is what `stock_on_hand`
/// should read if every movement went through the ledger; the audit pass
/// compares the two.
pub fn derived_on_hand<'a>(entries: impl IntoIterator<Item = &'a StockTransaction>) -> i64 {
    entries.into_iter().map(StockTransaction::signed_amount).sum()
}
