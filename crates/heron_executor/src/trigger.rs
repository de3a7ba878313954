use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// After-trigger queue for the current transaction.
///
/// Only the statement-context protocol lives here: a context must be open
/// before any row-level trigger event can be enqueued during plan
/// initialization, and every open is balanced by one close at query end.
/// Firing semantics belong to the trigger subsystem proper.
#[derive(Debug, Default)]
pub struct AfterTriggerQueue {
    query_depth: AtomicUsize,
}

impl AfterTriggerQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a statement-level context for one query.
    pub fn begin_statement_context(&self) {
        self.query_depth.fetch_add(1, Ordering::AcqRel);
    }

    /// Close the most recently opened statement-level context.
    pub fn end_statement_context(&self) {
        let prev = self.query_depth.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            // underflow: a close without a matching open
            self.query_depth.store(0, Ordering::Release);
            tracing::warn!("after-trigger statement context closed without open");
        }
    }

    /// Number of statement contexts currently open.
    pub fn query_depth(&self) -> usize {
        self.query_depth.load(Ordering::Acquire)
    }
}
