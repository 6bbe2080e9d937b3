//! Step que transiciona el job a su estado terminal.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

use crate::saga::types::{SagaContext, SagaError, SagaResult, SagaStep, TerminalAction};
use crate::shared_kernel::JobId;
use crate::work_orders::{Job, JobRepository};

/// Transitions the job to `completed` or `cancelled`, stamping the
/// matching timestamp. The full job is captured before mutation so the
/// compensation can clear the terminal timestamp and put the prior
/// non-terminal state back.
pub struct UpdateJobStep {
    jobs: Arc<dyn JobRepository>,
    job_id: JobId,
    action: TerminalAction,
    previous: Mutex<Option<Job>>,
}

impl UpdateJobStep {
    pub fn new(jobs: Arc<dyn JobRepository>, job_id: JobId, action: TerminalAction) -> Self {
        Self {
            jobs,
            job_id,
            action,
            previous: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SagaStep for UpdateJobStep {
    fn name(&self) -> &'static str {
        "UpdateJob"
    }

    async fn execute(&self, _ctx: &SagaContext) -> SagaResult<()> {
        let mut job = self
            .jobs
            .find_by_id(&self.job_id)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?
            .ok_or_else(|| {
                SagaError::step_failed(self.name(), format!("job {} not found", self.job_id))
            })?;

        *self.previous.lock().unwrap() = Some(job.clone());

        let now = Utc::now();
        match self.action {
            TerminalAction::Complete => job.complete(now),
            TerminalAction::Cancel => job.cancel(now),
        }
        .map_err(|e| SagaError::step_failed(self.name(), e))?;

        self.jobs
            .save(&job)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))
    }

    async fn compensate(&self, _ctx: &SagaContext) -> SagaResult<()> {
        let previous = self.previous.lock().unwrap().take();
        let Some(previous) = previous else {
            return Ok(());
        };
        self.jobs
            .save(&previous)
            .await
            .map_err(|e| SagaError::compensation_failed(self.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::RequestContext;
    use crate::saga::types::SagaId;
    use crate::shared_kernel::{JobState, WorkOrderId};
    use crate::testing::InMemoryJobRepository;

    fn ctx() -> SagaContext {
        SagaContext::new(SagaId::new(), RequestContext::system())
    }

    async fn seeded_active_job(repo: &InMemoryJobRepository) -> Job {
        let mut job = Job::new(WorkOrderId::new(), "TUBE-1");
        job.start(Utc::now()).unwrap();
        repo.save(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn completes_an_active_job() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = seeded_active_job(&repo).await;

        let step = UpdateJobStep::new(repo.clone(), job.id, TerminalAction::Complete);
        step.execute(&ctx()).await.unwrap();

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobState::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn cancelling_stamps_cancelled_at() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = seeded_active_job(&repo).await;

        let step = UpdateJobStep::new(repo.clone(), job.id, TerminalAction::Cancel);
        step.execute(&ctx()).await.unwrap();

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobState::Cancelled);
        assert!(stored.cancelled_at.is_some());
    }

    #[tokio::test]
    async fn completing_a_terminal_job_fails() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let mut job = seeded_active_job(&repo).await;
        job.complete(Utc::now()).unwrap();
        repo.save(&job).await.unwrap();

        let step = UpdateJobStep::new(repo.clone(), job.id, TerminalAction::Complete);
        assert!(step.execute(&ctx()).await.is_err());
    }

    #[tokio::test]
    async fn compensation_returns_the_job_to_its_prior_state() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = seeded_active_job(&repo).await;

        let step = UpdateJobStep::new(repo.clone(), job.id, TerminalAction::Complete);
        step.execute(&ctx()).await.unwrap();
        step.compensate(&ctx()).await.unwrap();

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobState::Active);
        assert!(stored.completed_at.is_none());
    }

    #[tokio::test]
    async fn compensation_without_execution_is_a_no_op() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = seeded_active_job(&repo).await;

        let step = UpdateJobStep::new(repo.clone(), job.id, TerminalAction::Complete);
        step.compensate(&ctx()).await.unwrap();

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobState::Active);
    }
}
