//! Completion/Cancellation entry point
//!
//! Builds the seven saga steps in their fixed order for one job, runs the
//! orchestrator and translates the report into one of exactly three
//! user-facing outcomes. A job whose rollback could not be confirmed is
//! marked broken here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use labops_server_domain::clients::{
    ContainerClient, MaterialClient, MaterialUpdate, NewContainer, NewMaterialRequest, Notifier,
    RequestContext, SetClient,
};
use labops_server_domain::event_bus::EventBus;
use labops_server_domain::events::DomainEvent;
use labops_server_domain::saga::{
    CreateContainersStep, CreateMasterSetStep, CreateNewMaterialsStep, LockSetStep,
    SagaContext, SagaId, SagaOrchestrator, SagaStep, TerminalAction, UpdateJobStep,
    UpdateOldMaterialsStep, UpdateWorkOrderStep, saga_id_for_completion,
};
use labops_server_domain::shared_kernel::{DomainError, JobId, JobState, Result};
use labops_server_domain::work_orders::{
    Job, JobRepository, WorkOrder, WorkOrderRepository, WorkPlanRepository, is_concluded,
};

/// Request payload for completing or cancelling a job. Sub-lists the
/// caller leaves out default to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionPayload {
    #[serde(default)]
    pub new_materials: Vec<NewMaterialRequest>,
    #[serde(default)]
    pub updated_materials: Vec<MaterialUpdate>,
    #[serde(default)]
    pub containers: Vec<NewContainer>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// The three user-visible outcomes of a completion/cancellation request.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// Everything succeeded.
    Success { message: String },
    /// The saga failed but rolled back cleanly; the request may be
    /// retried as-is.
    Retryable { message: String },
    /// The rollback could not be confirmed; the job is broken and needs
    /// manual remediation.
    Fatal { message: String },
}

impl CompletionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionOutcome::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            CompletionOutcome::Success { message }
            | CompletionOutcome::Retryable { message }
            | CompletionOutcome::Fatal { message } => message,
        }
    }
}

fn past_tense(action: TerminalAction) -> &'static str {
    match action {
        TerminalAction::Complete => "completed",
        TerminalAction::Cancel => "cancelled",
    }
}

/// Service running the completion/cancellation saga for one job.
pub struct CompletionService {
    materials: Arc<dyn MaterialClient>,
    containers: Arc<dyn ContainerClient>,
    sets: Arc<dyn SetClient>,
    work_orders: Arc<dyn WorkOrderRepository>,
    work_plans: Arc<dyn WorkPlanRepository>,
    jobs: Arc<dyn JobRepository>,
    event_bus: Arc<dyn EventBus>,
    notifier: Arc<dyn Notifier>,
    orchestrator: SagaOrchestrator,
}

impl CompletionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        materials: Arc<dyn MaterialClient>,
        containers: Arc<dyn ContainerClient>,
        sets: Arc<dyn SetClient>,
        work_orders: Arc<dyn WorkOrderRepository>,
        work_plans: Arc<dyn WorkPlanRepository>,
        jobs: Arc<dyn JobRepository>,
        event_bus: Arc<dyn EventBus>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            materials,
            containers,
            sets,
            work_orders,
            work_plans,
            jobs,
            event_bus,
            notifier,
            orchestrator: SagaOrchestrator::new(),
        }
    }

    /// Run the saga for `job_id`. The terminal-state guard rejects the
    /// request before any step is built, so a second completion attempt
    /// on a finished job never touches a remote store.
    pub async fn process(
        &self,
        job_id: JobId,
        payload: CompletionPayload,
        action: TerminalAction,
        request: RequestContext,
    ) -> Result<CompletionOutcome> {
        let job = self
            .jobs
            .find_by_id(&job_id)
            .await?
            .ok_or(DomainError::JobNotFound { job_id })?;

        if let Some(rejection) = Self::guard(&job, action) {
            return Ok(rejection);
        }

        let work_order = self
            .work_orders
            .find_by_id(&job.work_order_id)
            .await?
            .ok_or(DomainError::WorkOrderNotFound {
                work_order_id: job.work_order_id,
            })?;

        let saga_ctx = SagaContext::new(
            SagaId::from_uuid(saga_id_for_completion(&job_id)),
            request.clone(),
        );
        let steps = self.build_steps(&job, &work_order, &payload, action);

        info!(
            job_id = %job_id,
            work_order_id = %work_order.id,
            action = %action,
            saga_id = %saga_ctx.saga_id,
            "🔄 CompletionService: Running completion saga"
        );

        let report = self.orchestrator.run(&steps, &saga_ctx).await;

        if report.is_success() {
            self.publish_success(&job, &work_order, action, &request)
                .await;
            return Ok(CompletionOutcome::Success {
                message: format!("The job was {} successfully", past_tense(action)),
            });
        }

        if report.is_rolled_back() {
            warn!(
                job_id = %job_id,
                error = report.error.as_deref().unwrap_or("unknown"),
                "CompletionService: Saga failed, rollback confirmed"
            );
            return Ok(CompletionOutcome::Retryable {
                message: format!(
                    "The job could not be {}; no changes were made. Please try again.",
                    past_tense(action)
                ),
            });
        }

        // Rollback unconfirmed: flag the job and hand the mess to a human.
        self.mark_job_broken(&job_id, report.error.as_deref()).await;
        Ok(CompletionOutcome::Fatal {
            message: "The job could not be processed and its state is inconsistent. \
                      Please contact support."
                .to_string(),
        })
    }

    /// Terminal-state and transition guard, evaluated before any step.
    fn guard(job: &Job, action: TerminalAction) -> Option<CompletionOutcome> {
        if job.status.is_terminal() {
            return Some(CompletionOutcome::Retryable {
                message: format!("The job is already {} and cannot be {}", job.status, action),
            });
        }
        if action == TerminalAction::Complete && job.status != JobState::Active {
            return Some(CompletionOutcome::Retryable {
                message: "Only an active job can be completed".to_string(),
            });
        }
        None
    }

    /// The seven steps in their fixed order. The material steps are
    /// shared with the lock-set step, which needs their output.
    fn build_steps(
        &self,
        job: &Job,
        work_order: &WorkOrder,
        payload: &CompletionPayload,
        action: TerminalAction,
    ) -> Vec<Arc<dyn SagaStep>> {
        let create_containers = Arc::new(CreateContainersStep::new(
            self.containers.clone(),
            payload.containers.clone(),
        ));
        let new_materials = Arc::new(CreateNewMaterialsStep::new(
            self.materials.clone(),
            self.containers.clone(),
            payload.new_materials.clone(),
        ));
        let updated_materials = Arc::new(UpdateOldMaterialsStep::new(
            self.materials.clone(),
            payload.updated_materials.clone(),
        ));
        let update_job = Arc::new(UpdateJobStep::new(self.jobs.clone(), job.id, action));
        let update_work_order = Arc::new(UpdateWorkOrderStep::new(
            self.work_orders.clone(),
            work_order.id,
            action,
            payload.comment.clone(),
        ));
        let lock_set = Arc::new(LockSetStep::new(
            self.sets.clone(),
            self.work_orders.clone(),
            self.jobs.clone(),
            work_order.id,
            job.id,
            new_materials.clone(),
            updated_materials.clone(),
        ));
        let master_set = Arc::new(CreateMasterSetStep::new(
            self.sets.clone(),
            self.work_orders.clone(),
            self.work_plans.clone(),
            self.jobs.clone(),
            work_order.id,
        ));

        vec![
            create_containers,
            new_materials,
            updated_materials,
            update_job,
            update_work_order,
            lock_set,
            master_set,
        ]
    }

    /// Post-saga side effects. None of these may fail the request.
    async fn publish_success(
        &self,
        job: &Job,
        work_order: &WorkOrder,
        action: TerminalAction,
        request: &RequestContext,
    ) {
        let now = Utc::now();
        let correlation_id = Some(request.correlation_id.to_string());
        let actor = Some(request.actor.clone());

        let event = match action {
            TerminalAction::Complete => DomainEvent::JobCompleted {
                job_id: job.id,
                work_order_id: work_order.id,
                occurred_at: now,
                correlation_id: correlation_id.clone(),
                actor: actor.clone(),
            },
            TerminalAction::Cancel => DomainEvent::JobCancelled {
                job_id: job.id,
                work_order_id: work_order.id,
                occurred_at: now,
                correlation_id: correlation_id.clone(),
                actor: actor.clone(),
            },
        };
        if let Err(e) = self.event_bus.publish(&event).await {
            error!(job_id = %job.id, error = %e, "Failed to publish job event");
        }

        let concluded = match self.jobs.find_by_work_order(&work_order.id).await {
            Ok(jobs) => is_concluded(&jobs),
            Err(e) => {
                error!(work_order_id = %work_order.id, error = %e, "Failed to reload jobs");
                false
            }
        };
        if !concluded {
            return;
        }

        info!(work_order_id = %work_order.id, "✅ Work order concluded");
        let event = DomainEvent::WorkOrderConcluded {
            work_order_id: work_order.id,
            occurred_at: now,
            correlation_id,
            actor,
        };
        if let Err(e) = self.event_bus.publish(&event).await {
            error!(work_order_id = %work_order.id, error = %e, "Failed to publish concluded event");
        }
        if let Err(e) = self
            .notifier
            .work_order_concluded(work_order.id, &work_order.owner_email)
            .await
        {
            error!(work_order_id = %work_order.id, error = %e, "Failed to notify owner");
        }
    }

    async fn mark_job_broken(&self, job_id: &JobId, reason: Option<&str>) {
        error!(
            job_id = %job_id,
            error = reason.unwrap_or("unknown"),
            "🚨 CompletionService: Rollback unconfirmed, marking job broken"
        );

        match self.jobs.find_by_id(job_id).await {
            Ok(Some(mut job)) => {
                job.flag_broken();
                if let Err(e) = self.jobs.save(&job).await {
                    error!(job_id = %job_id, error = %e, "Failed to persist broken job");
                }
                if let Err(e) = self
                    .notifier
                    .developer_alert(
                        job.work_order_id,
                        "completion saga",
                        reason.unwrap_or("compensation failed"),
                    )
                    .await
                {
                    error!(job_id = %job_id, error = %e, "Failed to alert developers");
                }
            }
            Ok(None) => error!(job_id = %job_id, "Job vanished while marking broken"),
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to load job to mark broken"),
        }
    }
}
