//! Step que agrega los sets de resultados de todos los jobs en un master
//! set cuando la work order queda concluida.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::clients::{SetClient, SetUpdate};
use crate::saga::types::{SagaContext, SagaError, SagaResult, SagaStep};
use crate::shared_kernel::{MaterialId, WorkOrderId};
use crate::work_orders::{
    JobRepository, SetRef, WorkOrderRepository, WorkPlanRepository, is_concluded,
};

/// Runs only when, after this job's terminal transition, every job of the
/// work order is terminal. Reloads all jobs' result sets, unions their
/// materials into a newly created master set, locks it, records it as the
/// work order's finished set, and seeds the successor work order's input
/// set when the plan pipeline has one. No-op otherwise.
///
/// Compensation is deliberately a no-op: undoing the cross-job aggregate
/// could orphan a successor work order's seeded input set.
pub struct CreateMasterSetStep {
    sets: Arc<dyn SetClient>,
    work_orders: Arc<dyn WorkOrderRepository>,
    work_plans: Arc<dyn WorkPlanRepository>,
    jobs: Arc<dyn JobRepository>,
    work_order_id: WorkOrderId,
}

impl CreateMasterSetStep {
    pub fn new(
        sets: Arc<dyn SetClient>,
        work_orders: Arc<dyn WorkOrderRepository>,
        work_plans: Arc<dyn WorkPlanRepository>,
        jobs: Arc<dyn JobRepository>,
        work_order_id: WorkOrderId,
    ) -> Self {
        Self {
            sets,
            work_orders,
            work_plans,
            jobs,
            work_order_id,
        }
    }
}

#[async_trait]
impl SagaStep for CreateMasterSetStep {
    fn name(&self) -> &'static str {
        "CreateMasterSet"
    }

    fn has_compensation(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &SagaContext) -> SagaResult<()> {
        let jobs = self
            .jobs
            .find_by_work_order(&self.work_order_id)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;

        if !is_concluded(&jobs) {
            debug!(
                work_order_id = %self.work_order_id,
                "Work order not concluded yet, skipping master set"
            );
            return Ok(());
        }

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

        // Reload every job's result set; cancelled jobs without one
        // contribute nothing.
        let mut material_ids: Vec<MaterialId> = Vec::new();
        for job in &jobs {
            let Some(output) = &job.output_set else {
                continue;
            };
            let resolved = self
                .sets
                .find_with_materials(&output.id, &ctx.request)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?;
            for id in resolved.material_ids() {
                if !material_ids.contains(&id) {
                    material_ids.push(id);
                }
            }
        }

        let master = self
            .sets
            .create(&format!("Work order {} master", order.id), &ctx.request)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;
        self.sets
            .set_materials(&master.id, &material_ids, &ctx.request)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;
        self.sets
            .update(
                &master.id,
                SetUpdate {
                    owner: Some(order.owner_email.clone()),
                    locked: Some(true),
                },
                &ctx.request,
            )
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;

        order.finished_set = Some(SetRef::new(master.id));
        self.work_orders
            .save(&order)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;

        // Seed the next order in the pipeline, if any.
        let plan = self
            .work_plans
            .find_by_id(&order.work_plan_id)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))?;
        if let Some(plan) = plan
            && let Some(successor_id) = plan.successor_of(&order.id)
            && let Some(mut successor) = self
                .work_orders
                .find_by_id(&successor_id)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?
        {
            successor.input_set = Some(SetRef::new(master.id));
            self.work_orders
                .save(&successor)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?;
        }

        Ok(())
    }

    async fn compensate(&self, _ctx: &SagaContext) -> SagaResult<()> {
        // Accepted gap: cross-job aggregate state is not safely
        // reversible.
        Ok(())
    }
}
