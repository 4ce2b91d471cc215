use serde::{Deserialize, Serialize};

/// Sales order lifecycle status.
///
/// The lifecycle is not strictly linear: back-office staff move orders
/// between the non-terminal statuses as paperwork catches up with reality.
/// What matters to the stock side is the classification below, not the
/// exact path taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Checking,
    Accepted,
    Confirmed,
    Paid,
    Canceled,
    Picked,
    Shipped,
    PartiallyCompleted,
    Completed,
}

impl OrderStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Canceled | Self::Completed => true,
            Self::New
            | Self::Checking
            | Self::Accepted
            | Self::Confirmed
            | Self::Paid
            | Self::Picked
            | Self::Shipped
            | Self::PartiallyCompleted => false,
        }
    }

    /// Whether order entries may still be added, edited, or removed.
    ///
    /// Past `Accepted` the order's quantities back a stock commitment, so
    /// the entry set is frozen.
    pub fn is_changeable(self) -> bool {
        match self {
            Self::New | Self::Checking | Self::Accepted => true,
            Self::Confirmed
            | Self::Paid
            | Self::Canceled
            | Self::Picked
            | Self::Shipped
            | Self::PartiallyCompleted
            | Self::Completed => false,
        }
    }

    /// Whether an order in this status holds a reservation against stock.
    ///
    /// Entering this band reserves outstanding quantities; leaving it
    /// releases whatever is still outstanding.
    pub fn retains_reservation(self) -> bool {
        match self {
            Self::Confirmed | Self::Paid | Self::Picked | Self::Shipped | Self::PartiallyCompleted => {
                true
            }
            Self::New | Self::Checking | Self::Accepted | Self::Canceled | Self::Completed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Accepted => "accepted",
            Self::Confirmed => "confirmed",
            Self::Paid => "paid",
            Self::Canceled => "canceled",
            Self::Picked => "picked",
            Self::Shipped => "shipped",
            Self::PartiallyCompleted => "partially_completed",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "checking" => Some(Self::Checking),
            "accepted" => Some(Self::Accepted),
            "confirmed" => Some(Self::Confirmed),
            "paid" => Some(Self::Paid),
            "canceled" => Some(Self::Canceled),
            "picked" => Some(Self::Picked),
            "shipped" => Some(Self::Shipped),
            "partially_completed" => Some(Self::PartiallyCompleted),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Every status, for exhaustive sweeps in reconciliation and tests.
    pub fn all() -> [Self; 10] {
        [
            Self::New,
            Self::Checking,
            Self::Accepted,
            Self::Confirmed,
            Self::Paid,
            Self::Canceled,
            Self::Picked,
            Self::Shipped,
            Self::PartiallyCompleted,
            Self::Completed,
        ]
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_canceled_and_completed_are_terminal() {
        for status in OrderStatus::all() {
            let expected = matches!(status, OrderStatus::Canceled | OrderStatus::Completed);
            assert_eq!(status.is_terminal(), expected, "status {status}");
        }
    }

    #[test]
    fn changeable_band_ends_at_accepted() {
        assert!(OrderStatus::New.is_changeable());
        assert!(OrderStatus::Checking.is_changeable());
        assert!(OrderStatus::Accepted.is_changeable());
        assert!(!OrderStatus::Confirmed.is_changeable());
        assert!(!OrderStatus::Canceled.is_changeable());
        assert!(!OrderStatus::Completed.is_changeable());
    }

    #[test]
    fn reservation_band_runs_from_confirmed_to_partially_completed() {
        for status in OrderStatus::all() {
            let expected = matches!(
                status,
                OrderStatus::Confirmed
                    | OrderStatus::Paid
                    | OrderStatus::Picked
                    | OrderStatus::Shipped
                    | OrderStatus::PartiallyCompleted
            );
            assert_eq!(status.retains_reservation(), expected, "status {status}");
        }
    }

    #[test]
    fn wire_names_parse_back_to_the_same_status() {
        for status in OrderStatus::all() {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("draft"), None);
    }
}
