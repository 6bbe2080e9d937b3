//! Step que crea y bloquea el set de resultados del job.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

use super::{CreateNewMaterialsStep, UpdateOldMaterialsStep};
use crate::clients::{SetClient, SetUpdate};
use crate::saga::types::{SagaContext, SagaError, SagaResult, SagaStep};
use crate::shared_kernel::{JobId, SetId, WorkOrderId};
use crate::work_orders::{JobRepository, SetRef, WorkOrderRepository};

/// Creates a named, timestamped result set, fills it with the materials
/// the material steps produced and updated, locks it under the work
/// order's owner, and records it as the job's output set and the work
/// order's finished set.
///
/// The material steps are threaded in as shared instances so this step
/// can read what they accumulated. Local references are only recorded
/// after every remote call succeeded, so a mid-step failure leaves no
/// dangling local state for the unwind to care about.
pub struct LockSetStep {
    sets: Arc<dyn SetClient>,
    work_orders: Arc<dyn WorkOrderRepository>,
    jobs: Arc<dyn JobRepository>,
    work_order_id: WorkOrderId,
    job_id: JobId,
    new_materials: Arc<CreateNewMaterialsStep>,
    updated_materials: Arc<UpdateOldMaterialsStep>,
    locked_set: Mutex<Option<SetId>>,
}

impl LockSetStep {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sets: Arc<dyn SetClient>,
        work_orders: Arc<dyn WorkOrderRepository>,
        jobs: Arc<dyn JobRepository>,
        work_order_id: WorkOrderId,
        job_id: JobId,
        new_materials: Arc<CreateNewMaterialsStep>,
        updated_materials: Arc<UpdateOldMaterialsStep>,
    ) -> Self {
        Self {
            sets,
            work_orders,
            jobs,
            work_order_id,
            job_id,
            new_materials,
            updated_materials,
            locked_set: Mutex::new(None),
        }
    }

    pub fn locked_set_id(&self) -> Option<SetId> {
        *self.locked_set.lock().unwrap()
    }
}

#[async_trait]
impl SagaStep for LockSetStep {
    fn name(&self) -> &'static str {
        "LockSet"
    }

    async fn execute(&self, ctx: &SagaContext) -> SagaResult<()> {
        let mut order = self
            .work_orders
            .find_by_id(&self.work_order_id)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?
            .ok_or_else(|| {
                SagaError::step_failed(
                    self.name(),
                    format!("work order {} not found", self.work_order_id),
                )
            })?;
        let mut job = self
            .jobs
            .find_by_id(&self.job_id)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?
            .ok_or_else(|| {
                SagaError::step_failed(self.name(), format!("job {} not found", self.job_id))
            })?;

        let name = format!(
            "Work order {} job {} {}",
            order.id,
            job.id,
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        let set = self
            .sets
            .create(&name, &ctx.request)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;

        let mut material_ids = self.new_materials.created_material_ids();
        material_ids.extend(self.updated_materials.updated_material_ids());
        self.sets
            .set_materials(&set.id, &material_ids, &ctx.request)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;

        self.sets
            .update(
                &set.id,
                SetUpdate {
                    owner: Some(order.owner_email.clone()),
                    locked: Some(true),
                },
                &ctx.request,
            )
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;

        job.output_set = Some(SetRef::new(set.id));
        self.jobs
            .save(&job)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;

        order.finished_set = Some(SetRef::new(set.id));
        self.work_orders
            .save(&order)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;

        *self.locked_set.lock().unwrap() = Some(set.id);
        Ok(())
    }

    async fn compensate(&self, _ctx: &SagaContext) -> SagaResult<()> {
        // The remote set is left behind; only the local references are
        // cleared.
        let recorded = self.locked_set.lock().unwrap().take();
        if recorded.is_none() {
            return Ok(());
        }

        if let Some(mut job) = self
            .jobs
            .find_by_id(&self.job_id)
            .await
            .map_err(|e| SagaError::compensation_failed(self.name(), e))?
        {
            job.output_set = None;
            self.jobs
                .save(&job)
                .await
                .map_err(|e| SagaError::compensation_failed(self.name(), e))?;
        }

        if let Some(mut order) = self
            .work_orders
            .find_by_id(&self.work_order_id)
            .await
            .map_err(|e| SagaError::compensation_failed(self.name(), e))?
        {
            order.finished_set = None;
            self.work_orders
                .save(&order)
                .await
                .map_err(|e| SagaError::compensation_failed(self.name(), e))?;
        }

        Ok(())
    }
}
