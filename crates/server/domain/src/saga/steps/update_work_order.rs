//! Step que transiciona la work order y aplica el comentario del payload.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::saga::types::{SagaContext, SagaError, SagaResult, SagaStep, TerminalAction};
use crate::shared_kernel::{WorkOrderId, WorkOrderState};
use crate::work_orders::WorkOrderRepository;

/// Captures the work order's current status and comment, then sets the
/// status matching the requested terminal action and applies the new
/// comment. Setting the status it already has is a no-op.
pub struct UpdateWorkOrderStep {
    work_orders: Arc<dyn WorkOrderRepository>,
    work_order_id: WorkOrderId,
    action: TerminalAction,
    comment: Option<String>,
    previous: Mutex<Option<(WorkOrderState, Option<String>)>>,
}

impl UpdateWorkOrderStep {
    pub fn new(
        work_orders: Arc<dyn WorkOrderRepository>,
        work_order_id: WorkOrderId,
        action: TerminalAction,
        comment: Option<String>,
    ) -> Self {
        Self {
            work_orders,
            work_order_id,
            action,
            comment,
            previous: Mutex::new(None),
        }
    }

    fn target_state(&self) -> WorkOrderState {
        match self.action {
            TerminalAction::Complete => WorkOrderState::Completed,
            TerminalAction::Cancel => WorkOrderState::Cancelled,
        }
    }
}

#[async_trait]
impl SagaStep for UpdateWorkOrderStep {
    fn name(&self) -> &'static str {
        "UpdateWorkOrder"
    }

    async fn execute(&self, _ctx: &SagaContext) -> SagaResult<()> {
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

        *self.previous.lock().unwrap() = Some((order.status, order.comment.clone()));

        let target = self.target_state();
        if order.status != target {
            order
                .set_status(target)
                .map_err(|e| SagaError::step_failed(self.name(), e))?;
        }
        if let Some(comment) = &self.comment {
            order.comment = Some(comment.clone());
        }

        self.work_orders
            .save(&order)
            .await
            .map_err(|e| SagaError::step_failed(self.name(), e))
    }

    async fn compensate(&self, _ctx: &SagaContext) -> SagaResult<()> {
        let previous = self.previous.lock().unwrap().take();
        let Some((status, comment)) = previous else {
            return Ok(());
        };

        let mut order = self
            .work_orders
            .find_by_id(&self.work_order_id)
            .await
            .map_err(|e| SagaError::compensation_failed(self.name(), e))?
            .ok_or_else(|| {
                SagaError::compensation_failed(
                    self.name(),
                    format!("work order {} not found", self.work_order_id),
                )
            })?;

        order.restore_status(status);
        order.comment = comment;

        self.work_orders
            .save(&order)
            .await
            .map_err(|e| SagaError::compensation_failed(self.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::RequestContext;
    use crate::saga::types::SagaId;
    use crate::shared_kernel::WorkPlanId;
    use crate::testing::InMemoryWorkOrderRepository;
    use crate::work_orders::WorkOrder;

    fn ctx() -> SagaContext {
        SagaContext::new(SagaId::new(), RequestContext::system())
    }

    async fn seeded_active_order(repo: &InMemoryWorkOrderRepository) -> WorkOrder {
        let mut order = WorkOrder::new(WorkPlanId::new(), 0, "owner@lab.example");
        order.comment = Some("original".to_string());
        order.activate().unwrap();
        repo.save(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn completes_the_order_and_applies_the_comment() {
        let repo = Arc::new(InMemoryWorkOrderRepository::new());
        let order = seeded_active_order(&repo).await;

        let step = UpdateWorkOrderStep::new(
            repo.clone(),
            order.id,
            TerminalAction::Complete,
            Some("all done".to_string()),
        );
        step.execute(&ctx()).await.unwrap();

        let stored = repo.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkOrderState::Completed);
        assert_eq!(stored.comment.as_deref(), Some("all done"));
    }

    #[tokio::test]
    async fn absent_comment_keeps_the_existing_one() {
        let repo = Arc::new(InMemoryWorkOrderRepository::new());
        let order = seeded_active_order(&repo).await;

        let step = UpdateWorkOrderStep::new(repo.clone(), order.id, TerminalAction::Cancel, None);
        step.execute(&ctx()).await.unwrap();

        let stored = repo.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkOrderState::Cancelled);
        assert_eq!(stored.comment.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn same_status_is_a_no_op_transition() {
        let repo = Arc::new(InMemoryWorkOrderRepository::new());
        let mut order = seeded_active_order(&repo).await;
        order.set_status(WorkOrderState::Completed).unwrap();
        repo.save(&order).await.unwrap();

        // A second job completing against an already-completed order must
        // not trip the transition guard.
        let step = UpdateWorkOrderStep::new(repo.clone(), order.id, TerminalAction::Complete, None);
        step.execute(&ctx()).await.unwrap();

        let stored = repo.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkOrderState::Completed);
    }

    #[tokio::test]
    async fn compensation_restores_status_and_comment() {
        let repo = Arc::new(InMemoryWorkOrderRepository::new());
        let order = seeded_active_order(&repo).await;

        let step = UpdateWorkOrderStep::new(
            repo.clone(),
            order.id,
            TerminalAction::Complete,
            Some("all done".to_string()),
        );
        step.execute(&ctx()).await.unwrap();
        step.compensate(&ctx()).await.unwrap();

        let stored = repo.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkOrderState::Active);
        assert_eq!(stored.comment.as_deref(), Some("original"));
    }
}
