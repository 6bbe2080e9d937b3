//! Concrete steps of the completion/cancellation saga, in their fixed
//! execution order.

pub mod create_containers;
pub mod create_materials;
pub mod lock_set;
pub mod master_set;
pub mod update_job;
pub mod update_materials;
pub mod update_work_order;

pub use create_containers::CreateContainersStep;
pub use create_materials::CreateNewMaterialsStep;
pub use lock_set::LockSetStep;
pub use master_set::CreateMasterSetStep;
pub use update_job::UpdateJobStep;
pub use update_materials::UpdateOldMaterialsStep;
pub use update_work_order::UpdateWorkOrderStep;
