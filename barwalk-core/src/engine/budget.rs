//! Cooperative cancellation for a single run.
//!
//! Checked once per bar. The orchestrator owns the flag and the clock; the
//! simulator only reads them, so a cancelled or timed-out unit stops at a bar
//! boundary and never leaves partially-applied fills behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunBudget<'a> {
    pub cancel: Option<&'a AtomicBool>,
    pub deadline: Option<Instant>,
}

impl<'a> RunBudget<'a> {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn check(&self, bar_index: usize) -> Result<(), EngineError> {
        if self.cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Err(EngineError::Cancelled { bar_index });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(EngineError::TimedOut { bar_index });
        }
        Ok(())
    }
}
