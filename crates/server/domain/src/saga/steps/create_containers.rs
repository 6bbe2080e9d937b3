//! Step que crea los contenedores nuevos pedidos por el payload.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::clients::{ContainerClient, NewContainer};
use crate::saga::types::{SagaContext, SagaError, SagaResult, SagaStep};
use crate::shared_kernel::ContainerId;

/// Creates every requested container that is not already present in the
/// container store, matched by barcode. Only containers this step created
/// are tracked for compensation; pre-existing ones are left alone.
pub struct CreateContainersStep {
    containers: Arc<dyn ContainerClient>,
    requested: Vec<NewContainer>,
    created: Mutex<Vec<ContainerId>>,
}

impl CreateContainersStep {
    pub fn new(containers: Arc<dyn ContainerClient>, requested: Vec<NewContainer>) -> Self {
        Self {
            containers,
            requested,
            created: Mutex::new(Vec::new()),
        }
    }

    #[cfg(test)]
    pub fn created_container_ids(&self) -> Vec<ContainerId> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl SagaStep for CreateContainersStep {
    fn name(&self) -> &'static str {
        "CreateContainers"
    }

    async fn execute(&self, ctx: &SagaContext) -> SagaResult<()> {
        for request in &self.requested {
            let existing = self
                .containers
                .find_by_barcode(&request.barcode, &ctx.request)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?;
            if existing.is_some() {
                continue;
            }

            let created = self
                .containers
                .create(vec![request.clone()], &ctx.request)
                .await
                .map_err(|e| SagaError::step_failed(self.name(), e))?;

            let mut tracked = self.created.lock().unwrap();
            tracked.extend(created.into_iter().map(|c| c.id));
        }
        Ok(())
    }

    async fn compensate(&self, ctx: &SagaContext) -> SagaResult<()> {
        // Drain the tracked list as each container is destroyed so a
        // partial unwind never destroys the same container twice.
        loop {
            let next = self.created.lock().unwrap().last().copied();
            let Some(id) = next else { break };

            self.containers
                .destroy(&id, &ctx.request)
                .await
                .map_err(|e| SagaError::compensation_failed(self.name(), e))?;
            self.created.lock().unwrap().pop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::RequestContext;
    use crate::saga::types::SagaId;
    use crate::testing::InMemoryContainerClient;

    fn ctx() -> SagaContext {
        SagaContext::new(SagaId::new(), RequestContext::system())
    }

    #[tokio::test]
    async fn creates_only_missing_containers() {
        let client = Arc::new(InMemoryContainerClient::new());
        client.seed_tube("EXISTING-1");

        let step = CreateContainersStep::new(
            client.clone(),
            vec![
                NewContainer::tube("EXISTING-1"),
                NewContainer::tube("NEW-1"),
            ],
        );

        step.execute(&ctx()).await.unwrap();

        assert_eq!(step.created_container_ids().len(), 1);
        assert!(client.find_barcode("NEW-1").is_some());
    }

    #[tokio::test]
    async fn compensation_destroys_only_what_was_created() {
        let client = Arc::new(InMemoryContainerClient::new());
        client.seed_tube("EXISTING-1");

        let step = CreateContainersStep::new(
            client.clone(),
            vec![
                NewContainer::tube("EXISTING-1"),
                NewContainer::tube("NEW-1"),
                NewContainer::plate("NEW-2", vec!["A1".to_string()]),
            ],
        );

        step.execute(&ctx()).await.unwrap();
        step.compensate(&ctx()).await.unwrap();

        assert!(client.find_barcode("EXISTING-1").is_some());
        assert!(client.find_barcode("NEW-1").is_none());
        assert!(client.find_barcode("NEW-2").is_none());
        assert!(step.created_container_ids().is_empty());
    }

    #[tokio::test]
    async fn compensation_without_execution_is_a_no_op() {
        let client = Arc::new(InMemoryContainerClient::new());
        let step = CreateContainersStep::new(client.clone(), vec![NewContainer::tube("NEW-1")]);

        step.compensate(&ctx()).await.unwrap();
        assert_eq!(client.destroyed().len(), 0);
    }
}
