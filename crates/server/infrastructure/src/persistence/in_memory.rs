//! DashMap-backed repositories for local and development runs.

use async_trait::async_trait;
use dashmap::DashMap;

use labops_server_domain::shared_kernel::{
    JobId, Result, WorkOrderId, WorkOrderState, WorkPlanId,
};
use labops_server_domain::work_orders::{
    Job, JobRepository, WorkOrder, WorkOrderRepository, WorkPlan, WorkPlanRepository,
};

#[derive(Default)]
pub struct InMemoryWorkOrderStore {
    orders: DashMap<WorkOrderId, WorkOrder>,
}

impl InMemoryWorkOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkOrderRepository for InMemoryWorkOrderStore {
    async fn find_by_id(&self, id: &WorkOrderId) -> Result<Option<WorkOrder>> {
        Ok(self.orders.get(id).map(|entry| entry.clone()))
    }

    async fn save(&self, work_order: &WorkOrder) -> Result<()> {
        self.orders.insert(work_order.id, work_order.clone());
        Ok(())
    }

    async fn find_queued(&self) -> Result<Vec<WorkOrder>> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| entry.status == WorkOrderState::Queued)
            .map(|entry| entry.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobStore {
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.get(id).map(|entry| entry.clone()))
    }

    async fn save(&self, job: &Job) -> Result<()> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_work_order(&self, id: &WorkOrderId) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| entry.work_order_id == *id)
            .map(|entry| entry.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryWorkPlanStore {
    plans: DashMap<WorkPlanId, WorkPlan>,
}

impl InMemoryWorkPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkPlanRepository for InMemoryWorkPlanStore {
    async fn find_by_id(&self, id: &WorkPlanId) -> Result<Option<WorkPlan>> {
        Ok(self.plans.get(id).map(|entry| entry.clone()))
    }

    async fn save(&self, plan: &WorkPlan) -> Result<()> {
        self.plans.insert(plan.id, plan.clone());
        Ok(())
    }
}
