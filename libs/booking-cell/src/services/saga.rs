// libs/booking-cell/src/services/saga.rs
use futures::future::BoxFuture;
use std::future::Future;
use tracing::{error, info};

type UndoFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

/// Explicit undo list for the accept saga. Each committed side effect pushes
/// a labeled closure; on failure the stack unwinds in reverse order. Undo
/// failures are logged for manual cleanup and never replace the primary
/// error the caller sees.
pub struct CompensationStack {
    steps: Vec<(&'static str, UndoFn)>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Register an undo action for a side effect that just committed.
    pub fn arm<F, Fut>(&mut self, label: &'static str, undo: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.steps.push((label, Box::new(move || Box::pin(undo()))));
    }

    /// Drop all undo actions. Called once the saga outcome is final and the
    /// committed records must stand.
    pub fn disarm(&mut self) {
        self.steps.clear();
    }

    pub fn is_armed(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Run every undo action, newest first. `primary_failure` is the error
    /// that triggered the unwind; it rides along in the logs so cleanup
    /// failures can be traced back to their cause.
    pub async fn unwind(mut self, primary_failure: &str) {
        while let Some((label, undo)) = self.steps.pop() {
            match undo().await {
                Ok(()) => {
                    info!("Compensation '{}' completed (cause: {})", label, primary_failure);
                }
                Err(cleanup_error) => {
                    error!(
                        "Compensation '{}' failed: {} (cause: {}); manual cleanup may be required",
                        label, cleanup_error, primary_failure
                    );
                }
            }
        }
    }
}

impl Default for CompensationStack {
    fn default() -> Self {
        Self::new()
    }
}
