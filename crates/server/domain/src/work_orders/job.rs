//! Job entity: one execution unit (one container) within a work order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::refs::SetRef;
use crate::shared_kernel::{JobId, JobState, Result, WorkOrderId};

/// One execution unit belonging to exactly one work order.
///
/// Jobs are created when a work order is split into per-container units of
/// work and are never destroyed; their timestamps record terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub work_order_id: WorkOrderId,
    pub container_barcode: String,
    pub status: JobState,
    pub input_set: Option<SetRef>,
    /// The per-job result set produced at completion.
    pub output_set: Option<SetRef>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(work_order_id: WorkOrderId, container_barcode: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            work_order_id,
            container_barcode: container_barcode.into(),
            status: JobState::Queued,
            input_set: None,
            output_set: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    pub fn with_input_set(mut self, set: SetRef) -> Self {
        self.input_set = Some(set);
        self
    }

    /// Queued → Active, stamping `started_at`.
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.status.ensure_transition_to(&JobState::Active)?;
        self.status = JobState::Active;
        self.started_at = Some(at);
        Ok(())
    }

    /// Active → Completed, stamping `completed_at`.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.status.ensure_transition_to(&JobState::Completed)?;
        self.status = JobState::Completed;
        self.completed_at = Some(at);
        Ok(())
    }

    /// Queued|Active → Cancelled, stamping `cancelled_at`.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.status.ensure_transition_to(&JobState::Cancelled)?;
        self.status = JobState::Cancelled;
        self.cancelled_at = Some(at);
        Ok(())
    }

    /// Absorbing failure state, reachable from any non-terminal state.
    pub fn mark_broken(&mut self) -> Result<()> {
        self.status.ensure_transition_to(&JobState::Broken)?;
        self.status = JobState::Broken;
        Ok(())
    }

    /// Unguarded broken flag. Only the completion service uses this,
    /// when a saga rollback could not be confirmed and the job must be
    /// flagged whatever state the partial unwind left it in.
    pub fn flag_broken(&mut self) {
        self.status = JobState::Broken;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path() {
        let mut job = Job::new(WorkOrderId::new(), "TUBE-1");
        assert_eq!(job.status, JobState::Queued);

        job.start(Utc::now()).unwrap();
        assert_eq!(job.status, JobState::Active);
        assert!(job.started_at.is_some());

        job.complete(Utc::now()).unwrap();
        assert_eq!(job.status, JobState::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.is_terminal());
    }

    #[test]
    fn completion_requires_an_active_job() {
        let mut job = Job::new(WorkOrderId::new(), "TUBE-1");
        assert!(job.complete(Utc::now()).is_err());
    }

    #[test]
    fn cancellation_is_allowed_before_start() {
        let mut job = Job::new(WorkOrderId::new(), "TUBE-1");
        job.cancel(Utc::now()).unwrap();
        assert_eq!(job.status, JobState::Cancelled);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn terminal_jobs_reject_further_transitions() {
        let mut job = Job::new(WorkOrderId::new(), "TUBE-1");
        job.start(Utc::now()).unwrap();
        job.complete(Utc::now()).unwrap();

        assert!(job.cancel(Utc::now()).is_err());
        assert!(job.mark_broken().is_err());
    }

    #[test]
    fn broken_is_reachable_from_queued_and_active() {
        let mut queued = Job::new(WorkOrderId::new(), "TUBE-1");
        queued.mark_broken().unwrap();
        assert_eq!(queued.status, JobState::Broken);

        let mut active = Job::new(WorkOrderId::new(), "TUBE-2");
        active.start(Utc::now()).unwrap();
        active.mark_broken().unwrap();
        assert_eq!(active.status, JobState::Broken);
    }
}
