//! Progress sinks for running procedures
//!
//! An action is the caller's write-only view of a running procedure: it is
//! told the description of each step right before that step executes.

use std::sync::Mutex;

/// Receives the description of the step about to run
pub trait ActionSink: Send + Sync {
    fn record_step(&self, description: &str);
}

/// Sink that only emits a tracing event per step
#[derive(Debug, Clone)]
pub struct LogAction {
    label: String,
}

impl LogAction {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ActionSink for LogAction {
    fn record_step(&self, description: &str) {
        tracing::info!(action = %self.label, "{}...", description);
    }
}

/// Sink that keeps every recorded step, most recent last
#[derive(Debug, Default)]
pub struct RecordingAction {
    steps: Mutex<Vec<String>>,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The step currently (or last) being executed
    pub fn current(&self) -> Option<String> {
        self.steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }
}

impl ActionSink for RecordingAction {
    fn record_step(&self, description: &str) {
        self.steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(description.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_action() {
        let action = RecordingAction::new();
        assert_eq!(action.current(), None);

        action.record_step("Creating Kubernetes Network");
        action.record_step("Creating Kubernetes Subnet");

        assert_eq!(
            action.steps(),
            vec!["Creating Kubernetes Network", "Creating Kubernetes Subnet"]
        );
        assert_eq!(action.current().as_deref(), Some("Creating Kubernetes Subnet"));
    }
}
