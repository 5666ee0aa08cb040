//! Cooperative cancellation, checked between pipeline stages.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::StageName;

/// Shared flag that asks a running pipeline to stop.
///
/// Clones share the same flag, so one clone can be handed to a signal
/// handler or another thread while the pipeline holds the other. A stage
/// that is already running finishes; the next one does not start.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of a run that may be cancelled.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T> {
    /// Every stage ran.
    Completed(T),
    /// The run stopped early. Nothing was produced.
    Cancelled {
        /// The last stage that finished, or `None` if none did.
        after: Option<StageName>,
    },
}

impl<T> Outcome<T> {
    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled { .. } => None,
        }
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
