use rdpl_core::{Error, Result};
use tracing::{info, warn};

type UndoAction<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

/// Compensating actions for a multi-step operation, run newest first on rollback.
#[derive(Default)]
pub struct UndoLog<'a> {
    actions: Vec<(&'static str, UndoAction<'a>)>,
}

impl<'a> UndoLog<'a> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, label: &'static str, action: impl FnOnce() -> Result<()> + 'a) {
        self.actions.push((label, Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Discards the recorded actions; the operation is complete.
    pub fn commit(self) {}

    /// Runs every recorded action in reverse order and returns the ones that failed.
    pub fn rollback(self) -> Vec<Error> {
        let mut failures = Vec::new();
        for (label, action) in self.actions.into_iter().rev() {
            match action() {
                Ok(()) => info!(step = label, "rolled back"),
                Err(err) => {
                    warn!(step = label, error = %err, "rollback step failed");
                    failures.push(err);
                }
            }
        }
        failures
    }
}
