//! Shared kernel re-exports and the domain error type.

pub use labops_shared::ids::{
    ContainerId, CorrelationId, JobId, MaterialId, SetId, WorkOrderId, WorkPlanId,
};
pub use labops_shared::states::{JobState, WorkOrderState, WorkPlanState};

use crate::clients::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Work order not found: {work_order_id}")]
    WorkOrderNotFound { work_order_id: WorkOrderId },

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: JobId },

    #[error("Work plan not found: {work_plan_id}")]
    WorkPlanNotFound { work_plan_id: WorkPlanId },

    #[error(transparent)]
    InvalidStateTransition(#[from] labops_shared::SharedError),

    #[error(transparent)]
    ClientError(#[from] ClientError),

    #[error("Infrastructure error: {message}")]
    InfrastructureError { message: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
