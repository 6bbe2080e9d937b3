//! Saga Types - Core types for the completion/cancellation saga
//!
//! A saga is an ordered list of steps, each pairing a forward action with
//! a compensating one. No framework: composition is an explicit
//! `Vec<Arc<dyn SagaStep>>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::clients::RequestContext;
use crate::shared_kernel::JobId;

// ============================================================================
// Idempotency - saga_id generation with UUID v5
// ============================================================================

/// Deterministic saga ID for a completion/cancellation run on a job.
///
/// Same job always produces the same saga id, which makes duplicate
/// deliveries of the same request identifiable in logs and audits.
#[inline]
pub fn saga_id_for_completion(job_id: &JobId) -> Uuid {
    let namespace = Uuid::NAMESPACE_OID;
    let input = format!("completion-saga-{}", job_id);
    Uuid::new_v5(&namespace, input.as_bytes())
}

// ============================================================================
// SagaId
// ============================================================================

/// Unique identifier for a saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SagaId(pub Uuid);

impl SagaId {
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SagaId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SagaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Terminal action
// ============================================================================

/// Which terminal transition a completion saga applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalAction {
    Complete,
    Cancel,
}

impl TerminalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalAction::Complete => "complete",
            TerminalAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for TerminalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SagaError
// ============================================================================

/// Errors that can occur during saga execution.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    /// A saga step failed its forward action
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// Compensation failed
    #[error("Compensation for step '{step}' failed: {message}")]
    CompensationFailed { step: String, message: String },
}

impl SagaError {
    pub fn step_failed(step: &str, err: impl fmt::Display) -> Self {
        SagaError::StepFailed {
            step: step.to_string(),
            message: err.to_string(),
        }
    }

    pub fn compensation_failed(step: &str, err: impl fmt::Display) -> Self {
        SagaError::CompensationFailed {
            step: step.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for saga operations.
pub type SagaResult<T = ()> = std::result::Result<T, SagaError>;

// ============================================================================
// SagaStep
// ============================================================================

/// Trait defining a single step in a saga.
///
/// Each step applies a forward action and, if a later step fails, undoes
/// it. Steps capture whatever "before" state they need during `execute`
/// so that `compensate` is a no-op when `execute` did nothing.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Name of this step for logging and reports.
    fn name(&self) -> &'static str;

    /// Apply the forward effect. An error stops the saga and triggers
    /// compensation of all previously executed steps.
    async fn execute(&self, ctx: &SagaContext) -> SagaResult<()>;

    /// Undo whatever `execute` completed. Must be safe to call when
    /// `execute` touched nothing. Failures are reported to the
    /// orchestrator, which logs them and keeps unwinding.
    async fn compensate(&self, ctx: &SagaContext) -> SagaResult<()>;

    /// Steps with no reverse action are skipped during unwind.
    fn has_compensation(&self) -> bool {
        true
    }
}

// ============================================================================
// SagaContext
// ============================================================================

/// Execution context carried through one saga run.
#[derive(Debug, Clone)]
pub struct SagaContext {
    pub saga_id: SagaId,
    /// Identity stamped on every remote call made by the steps.
    pub request: RequestContext,
    pub started_at: DateTime<Utc>,
}

impl SagaContext {
    pub fn new(saga_id: SagaId, request: RequestContext) -> Self {
        Self {
            saga_id,
            request,
            started_at: Utc::now(),
        }
    }
}

// ============================================================================
// SagaReport
// ============================================================================

/// Outcome of one saga run. Not persisted; used by the caller to pick the
/// user-facing message and, when cleanup could not be confirmed, to mark
/// the aggregate broken.
#[derive(Debug, Clone)]
pub struct SagaReport {
    pub saga_id: SagaId,
    pub succeeded: bool,
    pub steps_executed: u32,
    pub compensations_executed: u32,
    /// False when any compensation itself failed during unwind.
    pub cleanup_complete: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

impl SagaReport {
    pub fn is_success(&self) -> bool {
        self.succeeded
    }

    /// Failed, but every compensation ran to completion: safe to retry.
    pub fn is_rolled_back(&self) -> bool {
        !self.succeeded && self.cleanup_complete
    }

    /// Failed and the rollback could not be confirmed: the aggregate must
    /// be flagged for manual remediation.
    pub fn needs_manual_intervention(&self) -> bool {
        !self.succeeded && !self.cleanup_complete
    }
}
