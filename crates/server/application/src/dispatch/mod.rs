//! Work-order dispatch
//!
//! `Dispatcher` performs the one-shot submission of a work order to the
//! external LIMS. `DispatchWorkOrderJob` wraps it with the broker health
//! gate, bounded retries and the terminal broken transition; the
//! surrounding queue mechanism (here `DispatchJobRunner`) owns the
//! rescheduling.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use labops_server_domain::clients::{
    BrokerStatus, LimsClient, LimsJob, LimsOrder, Notifier, RequestContext, SetClient,
};
use labops_server_domain::event_bus::EventBus;
use labops_server_domain::events::DomainEvent;
use labops_server_domain::shared_kernel::{
    DomainError, JobId, JobState, Result, WorkOrderId, WorkOrderState,
};
use labops_server_domain::work_orders::{
    JobRepository, WorkOrder, WorkOrderRepository, WorkPlanRepository,
};

/// Attempt counter state carried by the queue runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchAttempt {
    /// 0-based attempt index; strictly increases per retry.
    pub attempt: u32,
    pub max_retry_count: u32,
}

impl DispatchAttempt {
    pub fn first(max_retry_count: u32) -> Self {
        Self {
            attempt: 0,
            max_retry_count,
        }
    }

    /// The attempt at index `max_retry_count - 1` is the last one
    /// allowed.
    pub fn is_final(&self) -> bool {
        self.attempt + 1 >= self.max_retry_count
    }

    pub fn next(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Error raised by one dispatch attempt. The queue retries `Retryable`
/// after the configured interval and records `Exhausted` terminally.
#[derive(Debug, thiserror::Error)]
pub enum DispatchJobError {
    #[error("work order {work_order_id} dispatch failed (attempt {attempt}): {message}")]
    Retryable {
        work_order_id: WorkOrderId,
        attempt: u32,
        message: String,
    },

    #[error("work order {work_order_id} dispatch exhausted after {attempts} attempts: {message}")]
    Exhausted {
        work_order_id: WorkOrderId,
        attempts: u32,
        message: String,
    },
}

/// Result of the one-shot LIMS submission.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub dispatched: bool,
    pub errors: Vec<String>,
}

/// One-shot submission of a work order to the LIMS.
///
/// Assumes the dispatch policy already passed at enqueue time; this only
/// assembles the submission payload and performs the call.
pub struct Dispatcher {
    lims: Arc<dyn LimsClient>,
    jobs: Arc<dyn JobRepository>,
    sets: Arc<dyn SetClient>,
}

impl Dispatcher {
    pub fn new(
        lims: Arc<dyn LimsClient>,
        jobs: Arc<dyn JobRepository>,
        sets: Arc<dyn SetClient>,
    ) -> Self {
        Self { lims, jobs, sets }
    }

    pub async fn dispatch(
        &self,
        work_order: &WorkOrder,
        ctx: &RequestContext,
    ) -> Result<DispatchOutcome> {
        let jobs = self.jobs.find_by_work_order(&work_order.id).await?;

        let mut lims_jobs = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let material_ids = match &job.input_set {
                Some(input) => match input.resolve(self.sets.as_ref(), ctx).await {
                    Ok(resolved) => resolved.material_ids(),
                    Err(e) => {
                        return Ok(DispatchOutcome {
                            dispatched: false,
                            errors: e.messages(),
                        });
                    }
                },
                None => Vec::new(),
            };
            lims_jobs.push(LimsJob {
                job_id: job.id,
                container_barcode: job.container_barcode.clone(),
                material_ids,
            });
        }

        let order = LimsOrder {
            work_order_id: work_order.id,
            process_modules: work_order.process_modules.clone(),
            owner_email: work_order.owner_email.clone(),
            jobs: lims_jobs,
        };

        match self.lims.submit(&order, ctx).await {
            Ok(()) => Ok(DispatchOutcome {
                dispatched: true,
                errors: Vec::new(),
            }),
            Err(e) => Ok(DispatchOutcome {
                dispatched: false,
                errors: e.messages(),
            }),
        }
    }
}

/// The bounded-retry dispatch job: one `perform` call per queue attempt.
pub struct DispatchWorkOrderJob {
    dispatcher: Arc<Dispatcher>,
    broker: Arc<dyn BrokerStatus>,
    work_orders: Arc<dyn WorkOrderRepository>,
    work_plans: Arc<dyn WorkPlanRepository>,
    jobs: Arc<dyn JobRepository>,
    event_bus: Arc<dyn EventBus>,
    notifier: Arc<dyn Notifier>,
}

impl DispatchWorkOrderJob {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        broker: Arc<dyn BrokerStatus>,
        work_orders: Arc<dyn WorkOrderRepository>,
        work_plans: Arc<dyn WorkPlanRepository>,
        jobs: Arc<dyn JobRepository>,
        event_bus: Arc<dyn EventBus>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            dispatcher,
            broker,
            work_orders,
            work_plans,
            jobs,
            event_bus,
            notifier,
        }
    }

    /// Run one dispatch attempt for `work_order_id`.
    pub async fn perform(
        &self,
        work_order_id: WorkOrderId,
        attempt: DispatchAttempt,
        ctx: &RequestContext,
    ) -> std::result::Result<(), DispatchJobError> {
        match self.attempt_once(work_order_id, attempt, ctx).await {
            Ok(result) => result,
            Err(unexpected) => {
                // Anything outside the dispatch-failure path alerts the
                // developers with the attempt context.
                error!(
                    work_order_id = %work_order_id,
                    attempt = attempt.attempt,
                    error = %unexpected,
                    "❌ DispatchWorkOrderJob: Unexpected error during attempt"
                );
                if let Err(e) = self
                    .notifier
                    .developer_alert(
                        work_order_id,
                        &format!("dispatch attempt {}", attempt.attempt),
                        &unexpected.to_string(),
                    )
                    .await
                {
                    error!(work_order_id = %work_order_id, error = %e, "Failed to alert developers");
                }
                self.fail_attempt(work_order_id, attempt, vec![unexpected.to_string()], true)
                    .await
            }
        }
    }

    async fn attempt_once(
        &self,
        work_order_id: WorkOrderId,
        attempt: DispatchAttempt,
        ctx: &RequestContext,
    ) -> Result<std::result::Result<(), DispatchJobError>> {
        let mut order = self
            .work_orders
            .find_by_id(&work_order_id)
            .await?
            .ok_or(DomainError::WorkOrderNotFound { work_order_id })?;

        // The policy gate passed at enqueue time; the order goes active
        // on the first attempt so retries observe an in-flight order.
        if attempt.attempt == 0 && order.status == WorkOrderState::Queued {
            order.activate()?;
            self.work_orders.save(&order).await?;
        }

        if self.broker.events_enabled() && !self.broker.working().await {
            warn!(
                work_order_id = %work_order_id,
                attempt = attempt.attempt,
                "DispatchWorkOrderJob: Broker not working, failing attempt"
            );
            return Ok(self
                .fail_attempt(
                    work_order_id,
                    attempt,
                    vec!["broker not working".to_string()],
                    false,
                )
                .await);
        }

        let outcome = self.dispatcher.dispatch(&order, ctx).await?;
        if !outcome.dispatched {
            return Ok(self
                .fail_attempt(work_order_id, attempt, outcome.errors, false)
                .await);
        }

        order.record_dispatch(Utc::now());
        self.work_orders.save(&order).await?;

        let forwarded_job_ids = self.forwarded_jobs(&order).await;
        let event = DomainEvent::WorkOrderDispatched {
            work_order_id: order.id,
            forwarded_job_ids,
            occurred_at: Utc::now(),
            correlation_id: Some(ctx.correlation_id.to_string()),
            actor: Some(ctx.actor.clone()),
        };
        if let Err(e) = self.event_bus.publish(&event).await {
            error!(work_order_id = %order.id, error = %e, "Failed to publish dispatched event");
        }
        if let Err(e) = self
            .notifier
            .work_order_dispatched(order.id, &order.owner_email)
            .await
        {
            error!(work_order_id = %order.id, error = %e, "Failed to notify owner");
        }

        info!(
            work_order_id = %order.id,
            attempt = attempt.attempt,
            "✅ DispatchWorkOrderJob: Work order dispatched"
        );
        Ok(Ok(()))
    }

    /// Fail the current attempt: retryable until the final one, which
    /// breaks the order and notifies.
    async fn fail_attempt(
        &self,
        work_order_id: WorkOrderId,
        attempt: DispatchAttempt,
        errors: Vec<String>,
        already_alerted: bool,
    ) -> std::result::Result<(), DispatchJobError> {
        let message = errors.join("; ");

        if !attempt.is_final() {
            warn!(
                work_order_id = %work_order_id,
                attempt = attempt.attempt,
                error = %message,
                "🔁 DispatchWorkOrderJob: Attempt failed, queue will retry"
            );
            return Err(DispatchJobError::Retryable {
                work_order_id,
                attempt: attempt.attempt,
                message,
            });
        }

        error!(
            work_order_id = %work_order_id,
            attempts = attempt.max_retry_count,
            error = %message,
            "🚨 DispatchWorkOrderJob: Retries exhausted, breaking work order"
        );

        let owner_email = match self.work_orders.find_by_id(&work_order_id).await {
            Ok(Some(mut order)) => {
                if let Err(e) = order.mark_broken() {
                    error!(work_order_id = %work_order_id, error = %e, "Could not break work order");
                } else if let Err(e) = self.work_orders.save(&order).await {
                    error!(work_order_id = %work_order_id, error = %e, "Failed to persist broken order");
                }
                order.owner_email
            }
            _ => String::new(),
        };

        let event = DomainEvent::WorkOrderBroken {
            work_order_id,
            reason: message.clone(),
            occurred_at: Utc::now(),
            correlation_id: None,
            actor: None,
        };
        if let Err(e) = self.event_bus.publish(&event).await {
            error!(work_order_id = %work_order_id, error = %e, "Failed to publish broken event");
        }
        if let Err(e) = self
            .notifier
            .work_order_dispatch_failed(work_order_id, &owner_email, &errors)
            .await
        {
            error!(work_order_id = %work_order_id, error = %e, "Failed to notify owner");
        }
        if !already_alerted
            && let Err(e) = self
                .notifier
                .developer_alert(
                    work_order_id,
                    &format!("dispatch attempt {}", attempt.attempt),
                    &message,
                )
                .await
        {
            error!(work_order_id = %work_order_id, error = %e, "Failed to alert developers");
        }

        Err(DispatchJobError::Exhausted {
            work_order_id,
            attempts: attempt.max_retry_count,
            message,
        })
    }

    /// Completed jobs of the predecessor order in the plan pipeline;
    /// they ride along in the dispatched event.
    async fn forwarded_jobs(&self, order: &WorkOrder) -> Vec<JobId> {
        let plan = match self.work_plans.find_by_id(&order.work_plan_id).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(work_order_id = %order.id, error = %e, "Failed to load plan");
                return Vec::new();
            }
        };
        let Some(predecessor_id) = plan.and_then(|p| p.predecessor_of(&order.id)) else {
            return Vec::new();
        };
        match self.jobs.find_by_work_order(&predecessor_id).await {
            Ok(jobs) => jobs
                .into_iter()
                .filter(|j| j.status == JobState::Completed)
                .map(|j| j.id)
                .collect(),
            Err(e) => {
                error!(work_order_id = %order.id, error = %e, "Failed to load forwarded jobs");
                Vec::new()
            }
        }
    }
}

/// In-process queue driver: serialized attempts per work order with a
/// fixed interval between them.
pub struct DispatchJobRunner {
    job: Arc<DispatchWorkOrderJob>,
    max_retry_count: u32,
    retry_interval: Duration,
}

impl DispatchJobRunner {
    pub fn new(job: Arc<DispatchWorkOrderJob>, max_retry_count: u32, retry_interval: Duration) -> Self {
        Self {
            job,
            max_retry_count,
            retry_interval,
        }
    }

    /// Drive attempts until success or exhaustion.
    pub async fn run(
        &self,
        work_order_id: WorkOrderId,
        ctx: &RequestContext,
    ) -> std::result::Result<(), DispatchJobError> {
        let mut attempt = DispatchAttempt::first(self.max_retry_count);
        loop {
            match self.job.perform(work_order_id, attempt, ctx).await {
                Ok(()) => return Ok(()),
                Err(DispatchJobError::Retryable { .. }) => {
                    info!(
                        work_order_id = %work_order_id,
                        attempt = attempt.attempt,
                        retry_in_secs = self.retry_interval.as_secs(),
                        "DispatchJobRunner: Rescheduling dispatch attempt"
                    );
                    tokio::time::sleep(self.retry_interval).await;
                    attempt = attempt.next();
                }
                Err(exhausted) => return Err(exhausted),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labops_server_domain::clients::ProjectNodeId;
    use labops_server_domain::testing::{
        InMemoryJobRepository, InMemoryLimsClient, InMemorySetClient, InMemoryWorkOrderRepository,
        InMemoryWorkPlanRepository, RecordingEventBus, RecordingNotifier, StaticBroker,
    };
    use labops_server_domain::work_orders::{Job, SetRef, WorkPlan};
    use labops_shared::states::WorkPlanState;

    struct Fixture {
        lims: Arc<InMemoryLimsClient>,
        sets: Arc<InMemorySetClient>,
        work_orders: Arc<InMemoryWorkOrderRepository>,
        work_plans: Arc<InMemoryWorkPlanRepository>,
        jobs: Arc<InMemoryJobRepository>,
        event_bus: Arc<RecordingEventBus>,
        notifier: Arc<RecordingNotifier>,
        order: WorkOrder,
    }

    async fn fixture() -> Fixture {
        let lims = Arc::new(InMemoryLimsClient::new());
        let sets = Arc::new(InMemorySetClient::new());
        let work_orders = Arc::new(InMemoryWorkOrderRepository::new());
        let work_plans = Arc::new(InMemoryWorkPlanRepository::new());
        let jobs = Arc::new(InMemoryJobRepository::new());

        let mut plan = WorkPlan::new(ProjectNodeId(1));
        plan.status = WorkPlanState::Active;

        let input = sets.seed_set("input", true, None);
        let order = WorkOrder::new(plan.id, 0, "owner@lab.example")
            .with_process_modules(vec!["QC".to_string()])
            .with_input_set(SetRef::new(input.id));
        plan.work_order_ids.push(order.id);

        work_orders.save(&order).await.unwrap();
        work_plans.save(&plan).await.unwrap();
        jobs.save(&Job::new(order.id, "TUBE-1")).await.unwrap();

        Fixture {
            lims,
            sets,
            work_orders,
            work_plans,
            jobs,
            event_bus: Arc::new(RecordingEventBus::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            order,
        }
    }

    fn job_with_broker(fx: &Fixture, broker: StaticBroker) -> DispatchWorkOrderJob {
        let dispatcher = Arc::new(Dispatcher::new(
            fx.lims.clone(),
            fx.jobs.clone(),
            fx.sets.clone(),
        ));
        DispatchWorkOrderJob::new(
            dispatcher,
            Arc::new(broker),
            fx.work_orders.clone(),
            fx.work_plans.clone(),
            fx.jobs.clone(),
            fx.event_bus.clone(),
            fx.notifier.clone(),
        )
    }

    #[tokio::test]
    async fn successful_dispatch_emits_event_and_notifies_owner() {
        let fx = fixture().await;
        let job = job_with_broker(&fx, StaticBroker::enabled(true));

        job.perform(
            fx.order.id,
            DispatchAttempt::first(3),
            &RequestContext::system(),
        )
        .await
        .unwrap();

        let order = fx
            .work_orders
            .find_by_id(&fx.order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, WorkOrderState::Active);
        assert!(order.dispatch_date.is_some());

        assert_eq!(fx.lims.submitted().len(), 1);
        assert_eq!(fx.notifier.dispatched().len(), 1);
        assert!(
            fx.event_bus
                .published()
                .iter()
                .any(|e| e.event_type() == "WorkOrderDispatched")
        );
    }

    #[tokio::test]
    async fn broker_down_fails_before_the_lims_call() {
        let fx = fixture().await;
        let job = job_with_broker(&fx, StaticBroker::enabled(false));

        let err = job
            .perform(
                fx.order.id,
                DispatchAttempt::first(3),
                &RequestContext::system(),
            )
            .await
            .unwrap_err();

        match err {
            DispatchJobError::Retryable { message, .. } => {
                assert!(message.contains("broker not working"));
            }
            other => panic!("expected retryable, got {:?}", other),
        }
        assert_eq!(fx.lims.calls(), 0);
    }

    #[tokio::test]
    async fn disabled_broker_bypasses_the_health_gate() {
        let fx = fixture().await;
        let job = job_with_broker(&fx, StaticBroker::disabled());

        job.perform(
            fx.order.id,
            DispatchAttempt::first(3),
            &RequestContext::system(),
        )
        .await
        .unwrap();
        assert_eq!(fx.lims.submitted().len(), 1);
    }

    #[tokio::test]
    async fn retryable_until_the_final_attempt_index() {
        let fx = fixture().await;
        fx.lims.fail_always();
        let job = job_with_broker(&fx, StaticBroker::enabled(true));
        let ctx = RequestContext::system();

        // Attempts 0 and 1 are retryable; attempt 2 == max - 1 is final.
        let mut attempt = DispatchAttempt::first(3);
        for expected in 0..2u32 {
            let err = job.perform(fx.order.id, attempt, &ctx).await.unwrap_err();
            match err {
                DispatchJobError::Retryable { attempt: a, .. } => assert_eq!(a, expected),
                other => panic!("expected retryable, got {:?}", other),
            }
            attempt = attempt.next();
        }

        let err = job.perform(fx.order.id, attempt, &ctx).await.unwrap_err();
        assert!(matches!(err, DispatchJobError::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn exhaustion_breaks_the_order_and_notifies_once_each() {
        let fx = fixture().await;
        fx.lims.fail_always();
        let job = job_with_broker(&fx, StaticBroker::enabled(true));
        let ctx = RequestContext::system();

        let mut attempt = DispatchAttempt::first(3);
        while job.perform(fx.order.id, attempt, &ctx).await.is_err() {
            if attempt.is_final() {
                break;
            }
            attempt = attempt.next();
        }

        let order = fx
            .work_orders
            .find_by_id(&fx.order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, WorkOrderState::Broken);

        // Exactly one owner-facing failure and one developer alert
        // across the whole attempt series.
        assert_eq!(fx.notifier.dispatch_failed().len(), 1);
        assert_eq!(fx.notifier.developer_alerts().len(), 1);
        assert!(fx.notifier.dispatched().is_empty());
        assert!(
            fx.event_bus
                .published()
                .iter()
                .any(|e| e.event_type() == "WorkOrderBroken")
        );
    }

    #[tokio::test]
    async fn first_attempt_activates_a_queued_order() {
        let fx = fixture().await;
        fx.lims.fail_always();
        let job = job_with_broker(&fx, StaticBroker::enabled(true));

        let _ = job
            .perform(
                fx.order.id,
                DispatchAttempt::first(3),
                &RequestContext::system(),
            )
            .await;

        let order = fx
            .work_orders
            .find_by_id(&fx.order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, WorkOrderState::Active);
    }

    #[tokio::test]
    async fn runner_drives_attempts_to_exhaustion() {
        let fx = fixture().await;
        fx.lims.fail_always();
        let job = Arc::new(job_with_broker(&fx, StaticBroker::enabled(true)));
        let runner = DispatchJobRunner::new(job, 3, Duration::from_millis(5));

        let err = runner
            .run(fx.order.id, &RequestContext::system())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchJobError::Exhausted { .. }));
        // One LIMS call per attempt.
        assert_eq!(fx.lims.calls(), 3);
        let order = fx
            .work_orders
            .find_by_id(&fx.order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, WorkOrderState::Broken);
        assert_eq!(fx.notifier.dispatch_failed().len(), 1);
        assert_eq!(fx.notifier.developer_alerts().len(), 1);
    }

    #[tokio::test]
    async fn runner_stops_after_a_transient_failure_clears() {
        let fx = fixture().await;
        fx.lims.fail_times(2);
        let job = Arc::new(job_with_broker(&fx, StaticBroker::enabled(true)));
        let runner = DispatchJobRunner::new(job, 3, Duration::from_millis(5));

        runner
            .run(fx.order.id, &RequestContext::system())
            .await
            .unwrap();

        assert_eq!(fx.lims.calls(), 3);
        assert_eq!(fx.lims.submitted().len(), 1);
        let order = fx
            .work_orders
            .find_by_id(&fx.order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, WorkOrderState::Active);
        assert!(order.dispatch_date.is_some());
    }

    #[tokio::test]
    async fn dispatched_event_carries_forwarded_jobs_from_the_predecessor() {
        let fx = fixture().await;

        // Predecessor order with one completed and one cancelled job.
        let mut plan = fx
            .work_plans
            .find_by_id(&fx.order.work_plan_id)
            .await
            .unwrap()
            .unwrap();
        let predecessor = WorkOrder::new(plan.id, 0, "owner@lab.example");
        plan.work_order_ids.insert(0, predecessor.id);
        fx.work_plans.save(&plan).await.unwrap();
        fx.work_orders.save(&predecessor).await.unwrap();

        let mut done = Job::new(predecessor.id, "TUBE-A");
        done.start(Utc::now()).unwrap();
        done.complete(Utc::now()).unwrap();
        fx.jobs.save(&done).await.unwrap();
        let mut dropped = Job::new(predecessor.id, "TUBE-B");
        dropped.cancel(Utc::now()).unwrap();
        fx.jobs.save(&dropped).await.unwrap();

        let job = job_with_broker(&fx, StaticBroker::enabled(true));
        job.perform(
            fx.order.id,
            DispatchAttempt::first(3),
            &RequestContext::system(),
        )
        .await
        .unwrap();

        let forwarded = fx
            .event_bus
            .published()
            .into_iter()
            .find_map(|e| match e {
                DomainEvent::WorkOrderDispatched {
                    forwarded_job_ids, ..
                } => Some(forwarded_job_ids),
                _ => None,
            })
            .unwrap();
        assert_eq!(forwarded, vec![done.id]);
    }
}
