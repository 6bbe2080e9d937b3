//! In-memory fakes for the domain ports.
//!
//! Used by unit tests across the workspace and by local development
//! wiring. Every fake records the calls it receives; the richer ones
//! support failure injection so sagas and retry paths can be exercised
//! without a real remote.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::clients::{
    BrokerStatus, ClientError, ClientResult, Container, ContainerClient, ContainerContents,
    LimsClient, LimsOrder, Material, MaterialClient, MaterialSet, NewContainer, NewMaterial,
    Notifier, PricingClient, ProjectClient, ProjectNode, ProjectNodeId, RequestContext,
    SetClient, SetUpdate, SetWithMaterials, Slot,
};
use crate::event_bus::{EventBus, EventBusError};
use crate::events::DomainEvent;
use crate::shared_kernel::{
    ContainerId, DomainError, JobId, MaterialId, Result, SetId, WorkOrderId, WorkPlanId,
};
use crate::work_orders::{Job, JobRepository, WorkOrder, WorkOrderRepository, WorkPlan, WorkPlanRepository};

// ============================================================================
// Material client
// ============================================================================

#[derive(Default)]
pub struct InMemoryMaterialClient {
    materials: Mutex<HashMap<MaterialId, Material>>,
    destroyed: Mutex<Vec<MaterialId>>,
}

impl InMemoryMaterialClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_material(&self, attributes: HashMap<String, Value>) -> Material {
        let material = Material {
            id: MaterialId::new(),
            available: true,
            attributes,
        };
        self.materials
            .lock()
            .unwrap()
            .insert(material.id, material.clone());
        material
    }

    pub fn get(&self, id: &MaterialId) -> Option<Material> {
        self.materials.lock().unwrap().get(id).cloned()
    }

    pub fn destroyed(&self) -> Vec<MaterialId> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MaterialClient for InMemoryMaterialClient {
    async fn create(
        &self,
        materials: Vec<NewMaterial>,
        _ctx: &RequestContext,
    ) -> ClientResult<Vec<Material>> {
        let mut store = self.materials.lock().unwrap();
        let mut created = Vec::with_capacity(materials.len());
        for new in materials {
            let material = Material {
                id: MaterialId::new(),
                available: true,
                attributes: new.attributes,
            };
            store.insert(material.id, material.clone());
            created.push(material);
        }
        Ok(created)
    }

    async fn find(&self, id: &MaterialId, _ctx: &RequestContext) -> ClientResult<Material> {
        self.materials
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("material {}", id)))
    }

    async fn update(
        &self,
        id: &MaterialId,
        attributes: HashMap<String, Value>,
        _ctx: &RequestContext,
    ) -> ClientResult<Material> {
        let mut store = self.materials.lock().unwrap();
        let material = store
            .get_mut(id)
            .ok_or_else(|| ClientError::NotFound(format!("material {}", id)))?;
        for (key, value) in attributes {
            material.attributes.insert(key, value);
        }
        Ok(material.clone())
    }

    async fn destroy(&self, id: &MaterialId, _ctx: &RequestContext) -> ClientResult<()> {
        self.materials.lock().unwrap().remove(id);
        self.destroyed.lock().unwrap().push(*id);
        Ok(())
    }
}

// ============================================================================
// Container client
// ============================================================================

#[derive(Default)]
pub struct InMemoryContainerClient {
    containers: Mutex<HashMap<ContainerId, Container>>,
    destroyed: Mutex<Vec<ContainerId>>,
}

impl InMemoryContainerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_tube(&self, barcode: &str) -> Container {
        self.seed(Container {
            id: ContainerId::new(),
            barcode: barcode.to_string(),
            print_count: 0,
            contents: ContainerContents::Tube { material: None },
        })
    }

    pub fn seed_plate(&self, barcode: &str, addresses: &[&str]) -> Container {
        self.seed(Container {
            id: ContainerId::new(),
            barcode: barcode.to_string(),
            print_count: 0,
            contents: ContainerContents::Plate {
                slots: addresses
                    .iter()
                    .map(|a| Slot {
                        address: a.to_string(),
                        material: None,
                    })
                    .collect(),
            },
        })
    }

    fn seed(&self, container: Container) -> Container {
        self.containers
            .lock()
            .unwrap()
            .insert(container.id, container.clone());
        container
    }

    pub fn find_barcode(&self, barcode: &str) -> Option<Container> {
        self.containers
            .lock()
            .unwrap()
            .values()
            .find(|c| c.barcode == barcode)
            .cloned()
    }

    pub fn destroyed(&self) -> Vec<ContainerId> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerClient for InMemoryContainerClient {
    async fn find_by_barcode(
        &self,
        barcode: &str,
        _ctx: &RequestContext,
    ) -> ClientResult<Option<Container>> {
        Ok(self.find_barcode(barcode))
    }

    async fn create(
        &self,
        containers: Vec<NewContainer>,
        _ctx: &RequestContext,
    ) -> ClientResult<Vec<Container>> {
        let mut created = Vec::with_capacity(containers.len());
        for new in containers {
            let contents = match new.slot_addresses {
                Some(addresses) => ContainerContents::Plate {
                    slots: addresses
                        .into_iter()
                        .map(|address| Slot {
                            address,
                            material: None,
                        })
                        .collect(),
                },
                None => ContainerContents::Tube { material: None },
            };
            created.push(self.seed(Container {
                id: ContainerId::new(),
                barcode: new.barcode,
                print_count: 0,
                contents,
            }));
        }
        Ok(created)
    }

    async fn destroy(&self, id: &ContainerId, _ctx: &RequestContext) -> ClientResult<()> {
        self.containers.lock().unwrap().remove(id);
        self.destroyed.lock().unwrap().push(*id);
        Ok(())
    }

    async fn save(&self, container: &Container, _ctx: &RequestContext) -> ClientResult<()> {
        self.containers
            .lock()
            .unwrap()
            .insert(container.id, container.clone());
        Ok(())
    }
}

// ============================================================================
// Set client
// ============================================================================

#[derive(Default)]
pub struct InMemorySetClient {
    sets: Mutex<HashMap<SetId, MaterialSet>>,
    members: Mutex<HashMap<SetId, Vec<Material>>>,
    find_calls: AtomicUsize,
    fail_next_create: AtomicU32,
    fail_next_set_materials: AtomicU32,
    fail_next_update: AtomicU32,
}

impl InMemorySetClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_set(&self, name: &str, locked: bool, owner: Option<&str>) -> MaterialSet {
        let set = MaterialSet {
            id: SetId::new(),
            name: name.to_string(),
            locked,
            owner: owner.map(str::to_string),
        };
        self.sets.lock().unwrap().insert(set.id, set.clone());
        set
    }

    pub fn seed_set_materials(&self, set_id: &SetId, materials: &[MaterialId]) {
        let records = materials
            .iter()
            .map(|id| Material {
                id: *id,
                available: true,
                attributes: HashMap::new(),
            })
            .collect();
        self.members.lock().unwrap().insert(*set_id, records);
    }

    pub fn seed_material_in_set(&self, set_id: &SetId, material: MaterialId, available: bool) {
        self.members
            .lock()
            .unwrap()
            .entry(*set_id)
            .or_default()
            .push(Material {
                id: material,
                available,
                attributes: HashMap::new(),
            });
    }

    pub fn get(&self, id: &SetId) -> Option<MaterialSet> {
        self.sets.lock().unwrap().get(id).cloned()
    }

    pub fn materials_of(&self, id: &SetId) -> Vec<MaterialId> {
        self.members
            .lock()
            .unwrap()
            .get(id)
            .map(|m| m.iter().map(|m| m.id).collect())
            .unwrap_or_default()
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_create(&self) {
        self.fail_next_create.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fail_next_set_materials(&self) {
        self.fail_next_set_materials.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fail_next_update(&self) {
        self.fail_next_update.fetch_add(1, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32, what: &str) -> ClientResult<()> {
        if counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ClientError::Network(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl SetClient for InMemorySetClient {
    async fn create(&self, name: &str, _ctx: &RequestContext) -> ClientResult<MaterialSet> {
        Self::take_failure(&self.fail_next_create, "create")?;
        Ok(self.seed_set(name, false, None))
    }

    async fn set_materials(
        &self,
        set_id: &SetId,
        materials: &[MaterialId],
        _ctx: &RequestContext,
    ) -> ClientResult<()> {
        Self::take_failure(&self.fail_next_set_materials, "set_materials")?;
        if !self.sets.lock().unwrap().contains_key(set_id) {
            return Err(ClientError::NotFound(format!("set {}", set_id)));
        }
        self.seed_set_materials(set_id, materials);
        Ok(())
    }

    async fn update(
        &self,
        set_id: &SetId,
        update: SetUpdate,
        _ctx: &RequestContext,
    ) -> ClientResult<MaterialSet> {
        Self::take_failure(&self.fail_next_update, "update")?;
        let mut sets = self.sets.lock().unwrap();
        let set = sets
            .get_mut(set_id)
            .ok_or_else(|| ClientError::NotFound(format!("set {}", set_id)))?;
        if let Some(owner) = update.owner {
            set.owner = Some(owner);
        }
        if let Some(locked) = update.locked {
            set.locked = locked;
        }
        Ok(set.clone())
    }

    async fn find_with_materials(
        &self,
        set_id: &SetId,
        _ctx: &RequestContext,
    ) -> ClientResult<SetWithMaterials> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let set = self
            .get(set_id)
            .ok_or_else(|| ClientError::NotFound(format!("set {}", set_id)))?;
        let materials = self
            .members
            .lock()
            .unwrap()
            .get(set_id)
            .cloned()
            .unwrap_or_default();
        Ok(SetWithMaterials { set, materials })
    }
}

// ============================================================================
// Pricing and project clients
// ============================================================================

#[derive(Default)]
pub struct InMemoryPricingClient {
    priced: Mutex<Vec<(String, String)>>,
}

impl InMemoryPricingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_price(&self, cost_code: &str, module: &str) {
        self.priced
            .lock()
            .unwrap()
            .push((cost_code.to_string(), module.to_string()));
    }

    pub fn remove_price(&self, cost_code: &str, module: &str) {
        self.priced
            .lock()
            .unwrap()
            .retain(|(c, m)| !(c == cost_code && m == module));
    }
}

#[async_trait]
impl PricingClient for InMemoryPricingClient {
    async fn missing_unit_prices(
        &self,
        module_names: &[String],
        cost_code: &str,
        _ctx: &RequestContext,
    ) -> ClientResult<Vec<String>> {
        let priced = self.priced.lock().unwrap();
        Ok(module_names
            .iter()
            .filter(|name| {
                !priced
                    .iter()
                    .any(|(c, m)| c == cost_code && m == name.as_str())
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProjectClient {
    nodes: Mutex<HashMap<i64, ProjectNode>>,
}

impl InMemoryProjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_node(&self, id: i64, parent: Option<i64>, cost_code: Option<&str>) {
        self.nodes.lock().unwrap().insert(
            id,
            ProjectNode {
                id: ProjectNodeId(id),
                parent_id: parent.map(ProjectNodeId),
                name: format!("node-{}", id),
                cost_code: cost_code.map(str::to_string),
            },
        );
    }

    pub fn clear_cost_codes(&self) {
        for node in self.nodes.lock().unwrap().values_mut() {
            node.cost_code = None;
        }
    }
}

#[async_trait]
impl ProjectClient for InMemoryProjectClient {
    async fn node(
        &self,
        id: ProjectNodeId,
        _ctx: &RequestContext,
    ) -> ClientResult<Option<ProjectNode>> {
        Ok(self.nodes.lock().unwrap().get(&id.0).cloned())
    }
}

// ============================================================================
// LIMS client
// ============================================================================

#[derive(Default)]
pub struct InMemoryLimsClient {
    submitted: Mutex<Vec<LimsOrder>>,
    calls: AtomicUsize,
    fail_times: AtomicU32,
}

impl InMemoryLimsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` submissions with a network error.
    pub fn fail_times(&self, n: u32) {
        self.fail_times.store(n, Ordering::SeqCst);
    }

    pub fn fail_always(&self) {
        self.fail_times.store(u32::MAX, Ordering::SeqCst);
    }

    /// Successful submissions, in order.
    pub fn submitted(&self) -> Vec<LimsOrder> {
        self.submitted.lock().unwrap().clone()
    }

    /// Total submit calls, failures included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LimsClient for InMemoryLimsClient {
    async fn submit(&self, order: &LimsOrder, _ctx: &RequestContext) -> ClientResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ClientError::Network("LIMS unavailable".to_string()));
        }
        self.submitted.lock().unwrap().push(order.clone());
        Ok(())
    }
}

// ============================================================================
// Broker, notifier and event bus
// ============================================================================

/// Broker status fake with a switchable health flag.
pub struct StaticBroker {
    events_enabled: bool,
    working: std::sync::atomic::AtomicBool,
}

impl StaticBroker {
    pub fn enabled(working: bool) -> Self {
        Self {
            events_enabled: true,
            working: std::sync::atomic::AtomicBool::new(working),
        }
    }

    pub fn disabled() -> Self {
        Self {
            events_enabled: false,
            working: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_working(&self, working: bool) {
        self.working.store(working, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerStatus for StaticBroker {
    fn events_enabled(&self) -> bool {
        self.events_enabled
    }

    async fn working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }
}

/// Notifier fake recording every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    dispatched: Mutex<Vec<(WorkOrderId, String)>>,
    dispatch_failed: Mutex<Vec<(WorkOrderId, String, Vec<String>)>>,
    concluded: Mutex<Vec<(WorkOrderId, String)>>,
    developer_alerts: Mutex<Vec<(WorkOrderId, String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<(WorkOrderId, String)> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatch_failed(&self) -> Vec<(WorkOrderId, String, Vec<String>)> {
        self.dispatch_failed.lock().unwrap().clone()
    }

    pub fn concluded(&self) -> Vec<(WorkOrderId, String)> {
        self.concluded.lock().unwrap().clone()
    }

    pub fn developer_alerts(&self) -> Vec<(WorkOrderId, String, String)> {
        self.developer_alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn work_order_dispatched(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
    ) -> ClientResult<()> {
        self.dispatched
            .lock()
            .unwrap()
            .push((work_order_id, owner_email.to_string()));
        Ok(())
    }

    async fn work_order_dispatch_failed(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
        errors: &[String],
    ) -> ClientResult<()> {
        self.dispatch_failed.lock().unwrap().push((
            work_order_id,
            owner_email.to_string(),
            errors.to_vec(),
        ));
        Ok(())
    }

    async fn work_order_concluded(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
    ) -> ClientResult<()> {
        self.concluded
            .lock()
            .unwrap()
            .push((work_order_id, owner_email.to_string()));
        Ok(())
    }

    async fn developer_alert(
        &self,
        work_order_id: WorkOrderId,
        context: &str,
        detail: &str,
    ) -> ClientResult<()> {
        self.developer_alerts.lock().unwrap().push((
            work_order_id,
            context.to_string(),
            detail.to_string(),
        ));
        Ok(())
    }
}

/// Event bus fake collecting published events.
#[derive(Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, event: &DomainEvent) -> std::result::Result<(), EventBusError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn subscribe(
        &self,
        _topic: &str,
    ) -> std::result::Result<
        BoxStream<'static, std::result::Result<DomainEvent, EventBusError>>,
        EventBusError,
    > {
        Ok(futures::stream::empty().boxed())
    }
}

// ============================================================================
// Repositories
// ============================================================================

#[derive(Default)]
pub struct InMemoryWorkOrderRepository {
    orders: Mutex<HashMap<WorkOrderId, WorkOrder>>,
}

impl InMemoryWorkOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkOrderRepository for InMemoryWorkOrderRepository {
    async fn find_by_id(&self, id: &WorkOrderId) -> Result<Option<WorkOrder>> {
        Ok(self.orders.lock().unwrap().get(id).cloned())
    }

    async fn save(&self, work_order: &WorkOrder) -> Result<()> {
        self.orders
            .lock()
            .unwrap()
            .insert(work_order.id, work_order.clone());
        Ok(())
    }

    async fn find_queued(&self) -> Result<Vec<WorkOrder>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.status == labops_shared::states::WorkOrderState::Queued)
            .cloned()
            .collect())
    }
}

/// Job repository keeping insertion order, so per-work-order listings are
/// stable in tests.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.jobs.lock().unwrap().clear();
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == *id)
            .cloned())
    }

    async fn save(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => jobs.push(job.clone()),
        }
        Ok(())
    }

    async fn find_by_work_order(&self, id: &WorkOrderId) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.work_order_id == *id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryWorkPlanRepository {
    plans: Mutex<HashMap<WorkPlanId, WorkPlan>>,
}

impl InMemoryWorkPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkPlanRepository for InMemoryWorkPlanRepository {
    async fn find_by_id(&self, id: &WorkPlanId) -> Result<Option<WorkPlan>> {
        Ok(self.plans.lock().unwrap().get(id).cloned())
    }

    async fn save(&self, plan: &WorkPlan) -> Result<()> {
        self.plans.lock().unwrap().insert(plan.id, plan.clone());
        Ok(())
    }
}

/// A job repository that fails a configurable window of `save` calls;
/// used to exercise the compensation-failure path.
pub struct FailingJobRepository {
    inner: InMemoryJobRepository,
    ok_budget: AtomicU32,
    fail_budget: AtomicU32,
}

impl FailingJobRepository {
    /// Succeed the first `ok_first` saves, fail the next `fail_next`,
    /// then succeed again.
    pub fn fail_saves(ok_first: u32, fail_next: u32) -> Self {
        Self {
            inner: InMemoryJobRepository::new(),
            ok_budget: AtomicU32::new(ok_first),
            fail_budget: AtomicU32::new(fail_next),
        }
    }

    pub fn seed(&self, job: &Job) {
        self.inner.jobs.lock().unwrap().push(job.clone());
    }

    pub fn stored(&self, id: &JobId) -> Option<Job> {
        self.inner
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == *id)
            .cloned()
    }
}

#[async_trait]
impl JobRepository for FailingJobRepository {
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, job: &Job) -> Result<()> {
        if self
            .ok_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return self.inner.save(job).await;
        }
        if self
            .fail_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DomainError::InfrastructureError {
                message: "injected save failure".to_string(),
            });
        }
        self.inner.save(job).await
    }

    async fn find_by_work_order(&self, id: &WorkOrderId) -> Result<Vec<Job>> {
        self.inner.find_by_work_order(id).await
    }
}
