//! Mirror of the wizard position into the navigable `step` URL parameter.

use std::sync::Mutex;

/// Receives every step change so the browser location stays in sync.
pub trait StepRouter: Send + Sync {
    /// Replace the current location (initial mount, re-clamps).
    fn replace_step(&self, step: u32);

    /// Push a new history entry (Next / Previous).
    fn push_step(&self, step: u32);

    /// The step currently in the location bar.
    fn current_step(&self) -> Option<u32>;
}

/// Query string for `step`.
pub fn step_query(step: u32) -> String {
    format!("?step={step}")
}

/// In-memory history stack.
#[derive(Default)]
pub struct StepHistory {
    entries: Mutex<Vec<u32>>,
}

impl StepHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<u32> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl StepRouter for StepHistory {
    fn replace_step(&self, step: u32) {
        if let Ok(mut entries) = self.entries.lock() {
            match entries.last_mut() {
                Some(last) => *last = step,
                None => entries.push(step),
            }
        }
    }

    fn push_step(&self, step: u32) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(step);
        }
    }

    fn current_step(&self) -> Option<u32> {
        self.entries.lock().ok().and_then(|e| e.last().copied())
    }
}
