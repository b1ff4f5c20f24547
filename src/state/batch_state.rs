use crate::crawler::SourceReference;
use crate::state::ItemStatus;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Batch-level status
///
/// `Running` is the only non-terminal value. `Empty` is the distinguished
/// "no items found" outcome: the sitemap resolved to nothing and storage was
/// never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Empty,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Empty => "empty",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "empty" => Some(Self::Empty),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Per-item lifecycle record
#[derive(Debug, Clone)]
pub struct ItemState {
    pub reference: SourceReference,
    pub status: ItemStatus,
    /// Fetch attempts made by the extractor (0 until the item is extracted)
    pub attempts: u32,
    pub error_detail: Option<String>,
    /// Row ID of the persisted log entry, once registered
    pub log_id: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ItemState {
    pub fn new(reference: SourceReference) -> Self {
        Self {
            reference,
            status: ItemStatus::Pending,
            attempts: 0,
            error_detail: None,
            log_id: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Moves the item to `next`, stamping start/finish times
    ///
    /// Rejects any move the state machine does not allow, which includes every
    /// move out of a terminal status.
    pub fn transition(&mut self, next: ItemStatus) -> Result<(), HarvestError> {
        if !self.status.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        if next == ItemStatus::InProgress {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        Ok(())
    }
}

/// One orchestration pass over a resolved set of source references
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub batch_id: Uuid,
    pub items: Vec<ItemState>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchRun {
    /// Creates a run with every reference registered as `Pending`
    pub fn new(references: Vec<SourceReference>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            items: references.into_iter().map(ItemState::new).collect(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Number of items currently in `status`
    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }
}
