//! Step que aplica actualizaciones a materiales ya existentes.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::clients::{Material, MaterialClient, MaterialUpdate};
use crate::saga::types::{SagaContext, SagaError, SagaResult, SagaStep};
use crate::shared_kernel::MaterialId;

/// For each update keyed by an existing material identifier: fetch the
/// current remote state, keep it as the before-snapshot, then apply the
/// update.
pub struct UpdateOldMaterialsStep {
    materials: Arc<dyn MaterialClient>,
    updates: Vec<MaterialUpdate>,
    before: Mutex<Vec<Material>>,
}

impl UpdateOldMaterialsStep {
    pub fn new(materials: Arc<dyn MaterialClient>, updates: Vec<MaterialUpdate>) -> Self {
        Self {
            materials,
            updates,
            before: Mutex::new(Vec::new()),
        }
    }

    /// Materials updated so far; the lock-set step reads this.
    pub fn updated_material_ids(&self) -> Vec<MaterialId> {
        self.before.lock().unwrap().iter().map(|m| m.id).collect()
    }
}

#[async_trait]
impl SagaStep for UpdateOldMaterialsStep {
    fn name(&self) -> &'static str {
        "UpdateOldMaterials"
    }

    async fn execute(&self, ctx: &SagaContext) -> SagaResult<()> {
        for update in &self.updates {
            let current = self
                .materials
                .find(&update.id, &ctx.request)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?;

            self.before.lock().unwrap().push(current);

            self.materials
                .update(&update.id, update.attributes.clone(), &ctx.request)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?;
        }
        Ok(())
    }

    async fn compensate(&self, ctx: &SagaContext) -> SagaResult<()> {
        let snapshots = self.before.lock().unwrap().clone();
        for snapshot in snapshots.iter().rev() {
            self.materials
                .update(&snapshot.id, snapshot.attributes.clone(), &ctx.request)
                .await
                .map_err(|e| SagaError::compensation_failed(self.name(), e))?;
        }
        Ok(())
    }
}
