//! End-to-end completion/cancellation saga flows against the in-memory
//! adapters.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;

use labops_server_application::completion::{
    CompletionOutcome, CompletionPayload, CompletionService,
};
use labops_server_domain::clients::{ContainerLocation, NewMaterialRequest, ProjectNodeId, RequestContext};
use labops_server_domain::events::DomainEvent;
use labops_server_domain::event_bus::EventBus;
use labops_server_domain::saga::TerminalAction;
use labops_server_domain::shared_kernel::{JobState, MaterialId};
use labops_server_domain::testing::{
    InMemoryContainerClient, InMemoryMaterialClient, InMemorySetClient, RecordingNotifier,
};
use labops_server_domain::work_orders::{
    Job, JobRepository, WorkOrder, WorkOrderRepository, WorkPlan, WorkPlanRepository,
};
use labops_server_infrastructure::messaging::InMemoryEventBus;
use labops_server_infrastructure::persistence::{
    InMemoryJobStore, InMemoryWorkOrderStore, InMemoryWorkPlanStore,
};
use labops_shared::states::WorkPlanState;

struct Harness {
    materials: Arc<InMemoryMaterialClient>,
    containers: Arc<InMemoryContainerClient>,
    sets: Arc<InMemorySetClient>,
    work_orders: Arc<InMemoryWorkOrderStore>,
    work_plans: Arc<InMemoryWorkPlanStore>,
    jobs: Arc<InMemoryJobStore>,
    event_bus: Arc<InMemoryEventBus>,
    notifier: Arc<RecordingNotifier>,
    order: WorkOrder,
}

impl Harness {
    async fn new() -> Self {
        let materials = Arc::new(InMemoryMaterialClient::new());
        let containers = Arc::new(InMemoryContainerClient::new());
        let sets = Arc::new(InMemorySetClient::new());
        let work_orders = Arc::new(InMemoryWorkOrderStore::new());
        let work_plans = Arc::new(InMemoryWorkPlanStore::new());
        let jobs = Arc::new(InMemoryJobStore::new());

        let mut plan = WorkPlan::new(ProjectNodeId(1));
        plan.status = WorkPlanState::Active;

        let mut order = WorkOrder::new(plan.id, 0, "owner@lab.example");
        order.activate().unwrap();
        plan.work_order_ids.push(order.id);

        work_orders.save(&order).await.unwrap();
        work_plans.save(&plan).await.unwrap();

        Self {
            materials,
            containers,
            sets,
            work_orders,
            work_plans,
            jobs,
            event_bus: Arc::new(InMemoryEventBus::default()),
            notifier: Arc::new(RecordingNotifier::new()),
            order,
        }
    }

    async fn active_job(&self, barcode: &str) -> Job {
        self.containers.seed_tube(barcode);
        let mut job = Job::new(self.order.id, barcode);
        job.start(Utc::now()).unwrap();
        self.jobs.save(&job).await.unwrap();
        job
    }

    fn service(&self) -> CompletionService {
        CompletionService::new(
            self.materials.clone(),
            self.containers.clone(),
            self.sets.clone(),
            self.work_orders.clone(),
            self.work_plans.clone(),
            self.jobs.clone(),
            self.event_bus.clone(),
            self.notifier.clone(),
        )
    }
}

fn one_tube_material(barcode: &str) -> CompletionPayload {
    let mut attributes = HashMap::new();
    attributes.insert(
        "supplier".to_string(),
        serde_json::Value::String("lab".to_string()),
    );
    CompletionPayload {
        new_materials: vec![NewMaterialRequest {
            attributes,
            container: ContainerLocation {
                barcode: barcode.to_string(),
                address: None,
            },
        }],
        ..Default::default()
    }
}

// Scenario: one active job, one new material in a tube, all remotes
// healthy. The job completes and a locked result set holds exactly the
// new material.
#[tokio::test]
async fn completing_a_job_produces_a_locked_result_set() {
    let harness = Harness::new().await;
    let job = harness.active_job("TUBE-1").await;

    let outcome = harness
        .service()
        .process(
            job.id,
            one_tube_material("TUBE-1"),
            TerminalAction::Complete,
            RequestContext::new("user@lab.example"),
        )
        .await
        .unwrap();

    assert!(outcome.is_success(), "{}", outcome.message());

    let stored = harness.jobs.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobState::Completed);

    let result_set = stored.output_set.expect("result set recorded");
    let set = harness.sets.get(&result_set.id).unwrap();
    assert!(set.locked);
    assert_eq!(set.owner.as_deref(), Some("owner@lab.example"));
    assert_eq!(harness.sets.materials_of(&result_set.id).len(), 1);
}

// Scenario: the remote call locking the result set fails. The job stays
// active, the created material is destroyed, the outcome is retryable.
#[tokio::test]
async fn lock_failure_unwinds_every_side_effect() {
    let harness = Harness::new().await;
    let job = harness.active_job("TUBE-1").await;
    harness.sets.fail_next_update();

    let outcome = harness
        .service()
        .process(
            job.id,
            one_tube_material("TUBE-1"),
            TerminalAction::Complete,
            RequestContext::new("user@lab.example"),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, CompletionOutcome::Retryable { .. }));

    let stored = harness.jobs.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobState::Active);
    assert!(stored.completed_at.is_none());
    assert!(stored.output_set.is_none());

    // The created material was destroyed and the tube is empty again.
    assert_eq!(harness.materials.destroyed().len(), 1);
    assert!(
        harness
            .containers
            .find_barcode("TUBE-1")
            .unwrap()
            .material_ids()
            .is_empty()
    );
}

// Scenario: a work order with two jobs. The first completion does not
// conclude the order; the second does, creating a master set that
// unions both result sets and firing the concluded event.
#[tokio::test]
async fn second_job_completion_concludes_the_order_with_a_master_set() {
    let harness = Harness::new().await;
    let first = harness.active_job("TUBE-1").await;
    let second = harness.active_job("TUBE-2").await;

    let mut concluded_events = harness
        .event_bus
        .subscribe("labops.work_orders.concluded")
        .await
        .unwrap();

    let service = harness.service();
    let ctx = RequestContext::new("user@lab.example");

    let outcome = service
        .process(
            first.id,
            one_tube_material("TUBE-1"),
            TerminalAction::Complete,
            ctx.clone(),
        )
        .await
        .unwrap();
    assert!(outcome.is_success(), "{}", outcome.message());

    // Not concluded yet: no master set, no notification.
    assert!(harness.notifier.concluded().is_empty());
    let first_stored = harness.jobs.find_by_id(&first.id).await.unwrap().unwrap();
    let first_set = first_stored.output_set.clone().unwrap();

    let outcome = service
        .process(
            second.id,
            one_tube_material("TUBE-2"),
            TerminalAction::Complete,
            ctx,
        )
        .await
        .unwrap();
    assert!(outcome.is_success(), "{}", outcome.message());

    let event = concluded_events.next().await.unwrap().unwrap();
    assert!(matches!(event, DomainEvent::WorkOrderConcluded { work_order_id, .. }
        if work_order_id == harness.order.id));
    assert_eq!(harness.notifier.concluded().len(), 1);

    // The order's finished set is now the master set with both
    // materials.
    let second_stored = harness.jobs.find_by_id(&second.id).await.unwrap().unwrap();
    let second_set = second_stored.output_set.clone().unwrap();
    let order = harness
        .work_orders
        .find_by_id(&harness.order.id)
        .await
        .unwrap()
        .unwrap();
    let master = order.finished_set.unwrap();
    assert_ne!(master.id, first_set.id);
    assert_ne!(master.id, second_set.id);

    let mut expected: Vec<MaterialId> = harness.sets.materials_of(&first_set.id);
    expected.extend(harness.sets.materials_of(&second_set.id));
    let mut members = harness.sets.materials_of(&master.id);
    members.sort_by_key(|m| m.0);
    expected.sort_by_key(|m| m.0);
    assert_eq!(members, expected);
    assert!(harness.sets.get(&master.id).unwrap().locked);
}

// Cancelling the only job concludes the order too; the result set is
// empty but still locked.
#[tokio::test]
async fn cancelling_the_only_job_concludes_the_order() {
    let harness = Harness::new().await;
    let job = harness.active_job("TUBE-1").await;

    let outcome = harness
        .service()
        .process(
            job.id,
            CompletionPayload {
                comment: Some("sample degraded".to_string()),
                ..Default::default()
            },
            TerminalAction::Cancel,
            RequestContext::new("user@lab.example"),
        )
        .await
        .unwrap();
    assert!(outcome.is_success(), "{}", outcome.message());

    let stored = harness.jobs.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobState::Cancelled);

    let order = harness
        .work_orders
        .find_by_id(&harness.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.comment.as_deref(), Some("sample degraded"));
    assert_eq!(harness.notifier.concluded().len(), 1);
}

// A second saga on an already-terminal job is rejected before any step
// runs.
#[tokio::test]
async fn repeated_completion_is_rejected_without_side_effects() {
    let harness = Harness::new().await;
    let job = harness.active_job("TUBE-1").await;
    let service = harness.service();
    let ctx = RequestContext::new("user@lab.example");

    let outcome = service
        .process(
            job.id,
            one_tube_material("TUBE-1"),
            TerminalAction::Complete,
            ctx.clone(),
        )
        .await
        .unwrap();
    assert!(outcome.is_success());
    let destroyed_before = harness.materials.destroyed().len();

    let outcome = service
        .process(job.id, one_tube_material("TUBE-1"), TerminalAction::Complete, ctx)
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Retryable { .. }));
    assert_eq!(harness.materials.destroyed().len(), destroyed_before);
}
