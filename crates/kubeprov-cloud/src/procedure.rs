//! Ordered, fail-fast step procedures
//!
//! A [`Procedure`] runs its steps strictly in the order they were added. Each
//! step gets a snapshot of the outputs discovered so far and returns only the
//! fields it discovered itself; those are merged into the caller's outputs as
//! soon as the step succeeds. The first failing step ends the run. Nothing is
//! rolled back and nothing is retried.

use crate::action::ActionSink;
use crate::error::{CloudError, Result};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::time::Instant;

/// Fields discovered by steps and threaded through a procedure
pub trait StepOutputs: Clone + Default + Send + Sync {
    /// Fold the fields one step discovered into the accumulated outputs
    fn merge(&mut self, discovered: Self);
}

impl StepOutputs for () {
    fn merge(&mut self, _discovered: Self) {}
}

type StepAction<'a, O> = Box<dyn FnOnce(O) -> BoxFuture<'a, Result<O>> + Send + 'a>;

struct Step<'a, O> {
    description: String,
    action: StepAction<'a, O>,
}

/// A named sequence of steps reporting progress to an action sink
pub struct Procedure<'a, O: StepOutputs = ()> {
    name: String,
    action: &'a dyn ActionSink,
    steps: Vec<Step<'a, O>>,
}

impl<'a, O: StepOutputs + 'a> Procedure<'a, O> {
    pub fn new(name: impl Into<String>, action: &'a dyn ActionSink) -> Self {
        Self {
            name: name.into(),
            action,
            steps: Vec::new(),
        }
    }

    /// Append a step; it receives the outputs accumulated before it runs
    pub fn add_step<F, Fut>(&mut self, description: impl Into<String>, action: F) -> &mut Self
    where
        F: FnOnce(O) -> Fut + Send + 'a,
        Fut: Future<Output = Result<O>> + Send + 'a,
    {
        self.steps.push(Step {
            description: description.into(),
            action: Box::new(move |outputs| action(outputs).boxed()),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn descriptions(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.description.as_str()).collect()
    }

    /// Run every step in order, merging discoveries into `outputs`.
    ///
    /// On failure `outputs` keeps whatever the succeeded steps discovered and
    /// the error names the failed step.
    pub async fn run(self, outputs: &mut O) -> Result<()> {
        let total = self.steps.len();
        let started = Instant::now();
        tracing::info!(procedure = %self.name, steps = total, "Starting procedure");

        for (index, step) in self.steps.into_iter().enumerate() {
            self.action.record_step(&step.description);
            tracing::info!(
                procedure = %self.name,
                step = %step.description,
                index = index + 1,
                total,
                "Running step"
            );

            let step_started = Instant::now();
            match (step.action)(outputs.clone()).await {
                Ok(discovered) => {
                    outputs.merge(discovered);
                    tracing::debug!(
                        step = %step.description,
                        elapsed_ms = step_started.elapsed().as_millis() as u64,
                        "Step completed"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        procedure = %self.name,
                        step = %step.description,
                        error = %e,
                        "Step failed"
                    );
                    return Err(CloudError::StepFailed {
                        step: step.description,
                        source: Box::new(e),
                    });
                }
            }
        }

        tracing::info!(
            procedure = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Procedure completed"
        );
        Ok(())
    }
}
