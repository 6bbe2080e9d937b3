//! Step que crea los materiales nuevos y los coloca en sus contenedores.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::clients::{
    Container, ContainerClient, MaterialClient, NewMaterial, NewMaterialRequest,
};
use crate::saga::types::{SagaContext, SagaError, SagaResult, SagaStep};
use crate::shared_kernel::MaterialId;

/// For each requested material: strip the embedded container reference,
/// create the material remotely, resolve its container by barcode, place
/// the material (slot address for plates, direct reference for tubes) and
/// persist the container.
///
/// Accumulates the created materials and a pre-mutation snapshot of every
/// touched container, first touch wins.
pub struct CreateNewMaterialsStep {
    materials: Arc<dyn MaterialClient>,
    containers: Arc<dyn ContainerClient>,
    requested: Vec<NewMaterialRequest>,
    created: Mutex<Vec<MaterialId>>,
    touched_containers: Mutex<Vec<Container>>,
}

impl CreateNewMaterialsStep {
    pub fn new(
        materials: Arc<dyn MaterialClient>,
        containers: Arc<dyn ContainerClient>,
        requested: Vec<NewMaterialRequest>,
    ) -> Self {
        Self {
            materials,
            containers,
            requested,
            created: Mutex::new(Vec::new()),
            touched_containers: Mutex::new(Vec::new()),
        }
    }

    /// Materials created so far; the lock-set step reads this.
    pub fn created_material_ids(&self) -> Vec<MaterialId> {
        self.created.lock().unwrap().clone()
    }

    fn snapshot_container(&self, container: &Container) {
        let mut snapshots = self.touched_containers.lock().unwrap();
        // Deduplicated by identity: keep the first (pre-mutation) state.
        if !snapshots.iter().any(|c| c.id == container.id) {
            snapshots.push(container.clone());
        }
    }
}

#[async_trait]
impl SagaStep for CreateNewMaterialsStep {
    fn name(&self) -> &'static str {
        "CreateNewMaterials"
    }

    async fn execute(&self, ctx: &SagaContext) -> SagaResult<()> {
        for request in &self.requested {
            let created = self
                .materials
                .create(
                    vec![NewMaterial {
                        attributes: request.attributes.clone(),
                    }],
                    &ctx.request,
                )
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?;
            let material = created.into_iter().next().ok_or_else(|| {
                SagaError::step_failed(self.name(), "material store returned no record")
            })?;
            // Track immediately: a failure further down must still see
            // this material during the unwind.
            self.created.lock().unwrap().push(material.id);

            let mut container = self
                .containers
                .find_by_barcode(&request.container.barcode, &ctx.request)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?
                .ok_or_else(|| {
                    SagaError::step_failed(
                        self.name(),
                        format!("container {} not found", request.container.barcode),
                    )
                })?;

            self.snapshot_container(&container);

            container
                .place_material(material.id, request.container.address.as_deref())
                .map_err(|e| SagaError::step_failed(self.name(), e))?;
            self.containers
                .save(&container, &ctx.request)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?;
        }
        Ok(())
    }

    async fn compensate(&self, ctx: &SagaContext) -> SagaResult<()> {
        // Containers go back to their pre-mutation state first, then the
        // created materials are destroyed.
        let snapshots = self.touched_containers.lock().unwrap().clone();
        for snapshot in &snapshots {
            self.containers
                .save(snapshot, &ctx.request)
                .await
                .map_err(|e| SagaError::compensation_failed(self.name(), e))?;
        }

        loop {
            let next = self.created.lock().unwrap().last().copied();
            let Some(id) = next else { break };

            self.materials
                .destroy(&id, &ctx.request)
                .await
                .map_err(|e| SagaError::compensation_failed(self.name(), e))?;
            self.created.lock().unwrap().pop();
        }
        Ok(())
    }
}
