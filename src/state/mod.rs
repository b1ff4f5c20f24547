//! State module for tracking batch progress
//!
//! # Components
//!
//! - `ItemStatus`: lifecycle of one item (pending, in progress, completed, etc.),
//!   shared by in-memory state and persisted log rows
//! - `ItemState`: one item's status, attempts and error detail
//! - `BatchRun` / `BatchStatus`: one orchestration pass and its outcome

mod batch_state;
mod item_status;

pub use batch_state::{BatchRun, BatchStatus, ItemState};
pub use item_status::ItemStatus;
