//! Completion/Cancellation Saga
//!
//! Orchestrates the side effects of finishing a job against several
//! independent external stores, with per-step compensation standing in
//! for the distributed transaction that does not exist.

pub mod orchestrator;
pub mod steps;
pub mod types;

pub use orchestrator::SagaOrchestrator;
pub use types::{
    SagaContext, SagaError, SagaId, SagaReport, SagaResult, SagaStep, TerminalAction,
    saga_id_for_completion,
};

pub use steps::{
    CreateContainersStep, CreateMasterSetStep, CreateNewMaterialsStep, LockSetStep,
    UpdateJobStep, UpdateOldMaterialsStep, UpdateWorkOrderStep,
};
