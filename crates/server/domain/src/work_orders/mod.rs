//! Work Order Bounded Context
//!
//! Maneja el ciclo de vida de work orders, sus jobs y el work plan que
//! las agrupa en un pipeline ordenado.

pub mod job;
pub mod refs;

pub use job::Job;
pub use refs::SetRef;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::ProjectNodeId;
use crate::shared_kernel::{
    JobId, Result, WorkOrderId, WorkOrderState, WorkPlanId, WorkPlanState,
};

/// One ordered unit of lab work, dispatchable to the external LIMS.
///
/// Referenced sets and materials are owned by external services and only
/// referenced here by UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub work_plan_id: WorkPlanId,
    /// Position of this order in the plan's pipeline.
    pub order_index: usize,
    pub status: WorkOrderState,
    pub process_modules: Vec<String>,
    pub owner_email: String,
    pub comment: Option<String>,
    pub dispatch_date: Option<DateTime<Utc>>,
    pub input_set: Option<SetRef>,
    /// The result set of the order: per-job result set while jobs finish,
    /// the master set once the order is concluded.
    pub finished_set: Option<SetRef>,
}

impl WorkOrder {
    pub fn new(
        work_plan_id: WorkPlanId,
        order_index: usize,
        owner_email: impl Into<String>,
    ) -> Self {
        Self {
            id: WorkOrderId::new(),
            work_plan_id,
            order_index,
            status: WorkOrderState::Queued,
            process_modules: Vec::new(),
            owner_email: owner_email.into(),
            comment: None,
            dispatch_date: None,
            input_set: None,
            finished_set: None,
        }
    }

    pub fn with_process_modules(mut self, modules: Vec<String>) -> Self {
        self.process_modules = modules;
        self
    }

    pub fn with_input_set(mut self, set: SetRef) -> Self {
        self.input_set = Some(set);
        self
    }

    /// Guarded state transition.
    pub fn set_status(&mut self, status: WorkOrderState) -> Result<()> {
        self.status.ensure_transition_to(&status)?;
        self.status = status;
        Ok(())
    }

    /// Unguarded restore. Only saga compensation may use this to put a
    /// captured previous status back.
    pub fn restore_status(&mut self, status: WorkOrderState) {
        self.status = status;
    }

    /// Queued → Active, when the order is handed to the dispatch job.
    pub fn activate(&mut self) -> Result<()> {
        self.set_status(WorkOrderState::Active)
    }

    /// Absorbing failure state.
    pub fn mark_broken(&mut self) -> Result<()> {
        self.set_status(WorkOrderState::Broken)
    }

    pub fn record_dispatch(&mut self, at: DateTime<Utc>) {
        self.dispatch_date = Some(at);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// The plan a work order belongs to: an ordered pipeline of orders under
/// one project node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkPlan {
    pub id: WorkPlanId,
    pub project_id: ProjectNodeId,
    pub status: WorkPlanState,
    /// Pipeline order; successor/predecessor lookups use this.
    pub work_order_ids: Vec<WorkOrderId>,
}

impl WorkPlan {
    pub fn new(project_id: ProjectNodeId) -> Self {
        Self {
            id: WorkPlanId::new(),
            project_id,
            status: WorkPlanState::Construction,
            work_order_ids: Vec::new(),
        }
    }

    pub fn successor_of(&self, id: &WorkOrderId) -> Option<WorkOrderId> {
        let idx = self.work_order_ids.iter().position(|w| w == id)?;
        self.work_order_ids.get(idx + 1).copied()
    }

    pub fn predecessor_of(&self, id: &WorkOrderId) -> Option<WorkOrderId> {
        let idx = self.work_order_ids.iter().position(|w| w == id)?;
        idx.checked_sub(1)
            .and_then(|prev| self.work_order_ids.get(prev))
            .copied()
    }
}

// ============================================================================
// Repository ports
// ============================================================================

#[async_trait]
pub trait WorkOrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &WorkOrderId) -> Result<Option<WorkOrder>>;

    async fn save(&self, work_order: &WorkOrder) -> Result<()>;

    /// Orders waiting to be dispatched.
    async fn find_queued(&self) -> Result<Vec<WorkOrder>>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    async fn save(&self, job: &Job) -> Result<()>;

    async fn find_by_work_order(&self, id: &WorkOrderId) -> Result<Vec<Job>>;
}

#[async_trait]
pub trait WorkPlanRepository: Send + Sync {
    async fn find_by_id(&self, id: &WorkPlanId) -> Result<Option<WorkPlan>>;

    async fn save(&self, plan: &WorkPlan) -> Result<()>;
}

/// A work order is concluded once every one of its jobs is terminal.
pub fn is_concluded(jobs: &[Job]) -> bool {
    !jobs.is_empty() && jobs.iter().all(|j| j.is_terminal())
}
