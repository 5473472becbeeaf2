//! Transaction state machine.
//!
//! # States
//! - Pending: request in flight, nothing has resolved it yet
//! - Completed: the response reached end-of-message
//! - TimedOut: the watchdog fired first
//! - Failed: the connection reported an error first
//!
//! # State Transitions
//! ```text
//! Pending → Completed | TimedOut | Failed
//! ```
//! Terminal states never change. A signal arriving after resolution is
//! ignored and reported as such.

use std::time::Instant;

use uuid::Uuid;

use crate::transaction::TransactionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Completed,
    TimedOut,
    Failed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Completed => "completed",
            TransactionState::TimedOut => "timed_out",
            TransactionState::Failed => "failed",
        }
    }
}

/// The signal that resolves a transaction.
#[derive(Debug)]
pub enum Resolution<T> {
    Completed(T),
    TimedOut,
    Failed(TransactionError),
}

impl<T> Resolution<T> {
    fn state(&self) -> TransactionState {
        match self {
            Resolution::Completed(_) => TransactionState::Completed,
            Resolution::TimedOut => TransactionState::TimedOut,
            Resolution::Failed(_) => TransactionState::Failed,
        }
    }
}

/// One request's lifecycle. The first resolution wins.
#[derive(Debug)]
pub struct Transaction<T> {
    id: Uuid,
    state: TransactionState,
    resolution: Option<Resolution<T>>,
    started_at: Instant,
}

impl<T> Transaction<T> {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: TransactionState::Pending,
            resolution: None,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Resolve the transaction. Returns false, leaving the current outcome
    /// untouched, if it was already resolved.
    pub fn resolve(&mut self, resolution: Resolution<T>) -> bool {
        if self.state.is_terminal() {
            tracing::trace!(
                transaction_id = %self.id,
                state = self.state.as_str(),
                ignored = resolution.state().as_str(),
                "Late signal ignored"
            );
            return false;
        }
        self.state = resolution.state();
        self.resolution = Some(resolution);
        true
    }

    /// The winning resolution, if any.
    pub fn into_resolution(self) -> Option<Resolution<T>> {
        self.resolution
    }
}

impl<T> Default for Transaction<T> {
    fn default() -> Self {
        Self::new()
    }
}
