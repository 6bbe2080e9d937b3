//! Saga Orchestrator
//!
//! Executes an ordered list of steps, stopping on the first failure and
//! unwinding the executed prefix in reverse (LIFO) order. There is no
//! cross-service atomicity: once every forward action has succeeded the
//! result is final in each external system.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::types::{SagaContext, SagaReport, SagaStep};

/// Orchestrator for one saga run.
///
/// Stateless: all run state lives in the steps and the report.
#[derive(Debug, Clone, Default)]
pub struct SagaOrchestrator;

impl SagaOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Execute every step in order. On the first error, invoke
    /// `compensate` exactly once on each previously completed step, last
    /// executed first. A failing compensation is logged and counted but
    /// never aborts the unwind — the caller decides what to do with an
    /// unconfirmed cleanup.
    pub async fn run(&self, steps: &[Arc<dyn SagaStep>], ctx: &SagaContext) -> SagaReport {
        let started = Instant::now();
        let mut executed = 0usize;
        let mut failure = None;

        for step in steps {
            debug!(saga_id = %ctx.saga_id, step = step.name(), "Executing saga step");
            match step.execute(ctx).await {
                Ok(()) => executed += 1,
                Err(e) => {
                    warn!(
                        saga_id = %ctx.saga_id,
                        step = step.name(),
                        error = %e,
                        "Saga step failed, starting compensation"
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        let Some(failure) = failure else {
            info!(
                saga_id = %ctx.saga_id,
                steps = executed,
                "Saga completed"
            );
            return SagaReport {
                saga_id: ctx.saga_id,
                succeeded: true,
                steps_executed: executed as u32,
                compensations_executed: 0,
                cleanup_complete: true,
                error: None,
                duration: started.elapsed(),
            };
        };

        let mut compensations_executed = 0u32;
        let mut cleanup_complete = true;

        for step in steps[..executed].iter().rev() {
            if !step.has_compensation() {
                debug!(
                    saga_id = %ctx.saga_id,
                    step = step.name(),
                    "Skipping step without compensation"
                );
                continue;
            }

            match step.compensate(ctx).await {
                Ok(()) => {
                    compensations_executed += 1;
                    info!(
                        saga_id = %ctx.saga_id,
                        step = step.name(),
                        "Compensation step executed successfully"
                    );
                }
                Err(e) => {
                    cleanup_complete = false;
                    error!(
                        saga_id = %ctx.saga_id,
                        step = step.name(),
                        error = %e,
                        "Compensation step failed"
                    );
                    // Keep compensating the remaining steps.
                }
            }
        }

        SagaReport {
            saga_id: ctx.saga_id,
            succeeded: false,
            steps_executed: executed as u32,
            compensations_executed,
            cleanup_complete,
            error: Some(failure.to_string()),
            duration: started.elapsed(),
        }
    }
}
