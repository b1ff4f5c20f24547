/// Item status definitions for tracking batch progress
///
/// The same enum is written to `batch_logs.status` and held in memory by
/// [`ItemState`](crate::state::ItemState), so the persisted and in-memory
/// views cannot drift apart.
use std::fmt;

/// Lifecycle status of one item in a batch
///
/// ```text
/// Pending -> InProgress -> Completed | Failed | Skipped
/// Pending | InProgress -> Cancelled
/// ```
///
/// `Pending` may also go straight to `Skipped` when the duplicate check hits
/// before any work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    // ===== Active States =====
    /// Registered for the batch, not yet touched
    Pending,

    /// Currently being fetched and extracted
    InProgress,

    // ===== Terminal States =====
    /// Extracted and persisted
    Completed,

    /// Extraction or persistence failed; the batch stopped here
    Failed,

    /// Source ID already persisted by an earlier batch
    Skipped,

    /// Batch was cancelled before this item finished
    Cancelled,
}

impl ItemStatus {
    /// Returns true if no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true for `Pending` and `InProgress`
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Skipped)
                | (Self::Pending, Self::Cancelled)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
                | (Self::InProgress, Self::Skipped)
                | (Self::InProgress, Self::Cancelled)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_states() -> [Self; 6] {
        [
            Self::Pending,
            Self::InProgress,
            Self::Completed,
            Self::Failed,
            Self::Skipped,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
