//! Dispatchable work-order policy
//!
//! A pure validation gate run before a work order may be dispatched to
//! the LIMS. Every business-rule check runs regardless of earlier
//! failures and the violations accumulate into one verdict; nothing is
//! mutated anywhere.

use std::sync::Arc;

use crate::clients::{PricingClient, ProjectClient, ProjectNodeId, RequestContext, SetClient};
use crate::shared_kernel::{Result, WorkOrderState};
use crate::work_orders::{JobRepository, WorkOrder, WorkPlanRepository};

// Project hierarchies are shallow; the walk is bounded to stay safe
// against cyclic parent links in the remote service.
const MAX_HIERARCHY_HOPS: usize = 32;

/// The outcome of evaluating the policy: a list of human-readable
/// violations, empty when the order may be dispatched.
#[derive(Debug, Clone, Default)]
pub struct PolicyVerdict {
    violations: Vec<String>,
    /// Cost code resolved during evaluation, reused by the dispatcher.
    cost_code: Option<String>,
}

impl PolicyVerdict {
    pub fn is_dispatchable(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<String> {
        self.violations
    }

    pub fn cost_code(&self) -> Option<&str> {
        self.cost_code.as_deref()
    }
}

/// Aggregates the independent dispatchability checks for one work order.
pub struct DispatchableWorkOrderPolicy {
    pricing: Arc<dyn PricingClient>,
    projects: Arc<dyn ProjectClient>,
    sets: Arc<dyn SetClient>,
    work_plans: Arc<dyn WorkPlanRepository>,
    jobs: Arc<dyn JobRepository>,
}

impl DispatchableWorkOrderPolicy {
    pub fn new(
        pricing: Arc<dyn PricingClient>,
        projects: Arc<dyn ProjectClient>,
        sets: Arc<dyn SetClient>,
        work_plans: Arc<dyn WorkPlanRepository>,
        jobs: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            pricing,
            projects,
            sets,
            work_plans,
            jobs,
        }
    }

    /// Evaluate every check. Remote failures abort the evaluation; rule
    /// violations never do.
    pub async fn evaluate(
        &self,
        work_order: &WorkOrder,
        ctx: &RequestContext,
    ) -> Result<PolicyVerdict> {
        let mut violations = Vec::new();

        let plan = self.work_plans.find_by_id(&work_order.work_plan_id).await?;

        let cost_code = match &plan {
            Some(plan) => self.resolve_cost_code(plan.project_id, ctx).await?,
            None => None,
        };
        if cost_code.is_none() {
            violations.push("cost code can not be found".to_string());
        }

        if work_order.status != WorkOrderState::Queued {
            violations.push("status must be queued".to_string());
        }

        match &plan {
            Some(plan) if plan.status.is_active() => {}
            _ => violations.push("work plan must be active".to_string()),
        }

        // Unit prices can only be checked under a resolved cost code; a
        // missing code is already reported above.
        if let Some(code) = &cost_code
            && !work_order.process_modules.is_empty()
        {
            let missing = self
                .pricing
                .missing_unit_prices(&work_order.process_modules, code, ctx)
                .await?;
            if !missing.is_empty() {
                violations.push(format!(
                    "process modules could not be validated: [{}]",
                    missing.join(", ")
                ));
            }
        }

        if let Some(input) = &work_order.input_set {
            let resolved = input.resolve(self.sets.as_ref(), ctx).await?;
            if resolved.materials.iter().any(|m| !m.available) {
                violations.push("materials are not all available".to_string());
            }
        }

        if self
            .jobs
            .find_by_work_order(&work_order.id)
            .await?
            .is_empty()
        {
            violations.push("work order has no jobs".to_string());
        }

        Ok(PolicyVerdict {
            violations,
            cost_code,
        })
    }

    /// Walk the project hierarchy upward to the first node carrying a
    /// cost code.
    async fn resolve_cost_code(
        &self,
        node_id: ProjectNodeId,
        ctx: &RequestContext,
    ) -> Result<Option<String>> {
        let mut current = Some(node_id);
        for _ in 0..MAX_HIERARCHY_HOPS {
            let Some(id) = current else { break };
            match self.projects.node(id, ctx).await? {
                None => return Ok(None),
                Some(node) => {
                    if let Some(code) = node.cost_code {
                        return Ok(Some(code));
                    }
                    current = node.parent_id;
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_kernel::{MaterialId, WorkPlanState};
    use crate::testing::{
        InMemoryJobRepository, InMemoryPricingClient, InMemoryProjectClient, InMemorySetClient,
        InMemoryWorkPlanRepository,
    };
    use crate::work_orders::{Job, SetRef, WorkPlan};

    struct Fixture {
        pricing: Arc<InMemoryPricingClient>,
        projects: Arc<InMemoryProjectClient>,
        sets: Arc<InMemorySetClient>,
        work_plans: Arc<InMemoryWorkPlanRepository>,
        jobs: Arc<InMemoryJobRepository>,
        order: WorkOrder,
    }

    /// A fully dispatchable work order: active plan, resolvable cost
    /// code, priced modules, available materials and one job.
    async fn fixture() -> Fixture {
        let pricing = Arc::new(InMemoryPricingClient::new());
        let projects = Arc::new(InMemoryProjectClient::new());
        let sets = Arc::new(InMemorySetClient::new());
        let work_plans = Arc::new(InMemoryWorkPlanRepository::new());
        let jobs = Arc::new(InMemoryJobRepository::new());

        // Cost code lives on the parent node.
        projects.seed_node(1, None, Some("S1234"));
        projects.seed_node(2, Some(1), None);

        let mut plan = WorkPlan::new(ProjectNodeId(2));
        plan.status = WorkPlanState::Active;

        let input = sets.seed_set("input", true, None);
        let material = MaterialId::new();
        sets.seed_material_in_set(&input.id, material, true);

        let order = WorkOrder::new(plan.id, 0, "owner@lab.example")
            .with_process_modules(vec!["QC".to_string(), "Genotyping".to_string()])
            .with_input_set(SetRef::new(input.id));

        plan.work_order_ids.push(order.id);
        work_plans.save(&plan).await.unwrap();

        pricing.seed_price("S1234", "QC");
        pricing.seed_price("S1234", "Genotyping");

        jobs.save(&Job::new(order.id, "TUBE-1")).await.unwrap();

        Fixture {
            pricing,
            projects,
            sets,
            work_plans,
            jobs,
            order,
        }
    }

    fn policy(fx: &Fixture) -> DispatchableWorkOrderPolicy {
        DispatchableWorkOrderPolicy::new(
            fx.pricing.clone(),
            fx.projects.clone(),
            fx.sets.clone(),
            fx.work_plans.clone(),
            fx.jobs.clone(),
        )
    }

    #[tokio::test]
    async fn a_well_formed_queued_order_is_dispatchable() {
        let fx = fixture().await;
        let verdict = policy(&fx)
            .evaluate(&fx.order, &RequestContext::system())
            .await
            .unwrap();
        assert!(verdict.is_dispatchable(), "{:?}", verdict.violations());
        assert_eq!(verdict.cost_code(), Some("S1234"));
    }

    #[tokio::test]
    async fn active_status_and_unpriced_module_accumulate_two_violations() {
        let mut fx = fixture().await;
        fx.order.activate().unwrap();
        fx.pricing.remove_price("S1234", "Genotyping");

        let verdict = policy(&fx)
            .evaluate(&fx.order, &RequestContext::system())
            .await
            .unwrap();

        assert!(!verdict.is_dispatchable());
        assert_eq!(verdict.violations().len(), 2);
        assert!(
            verdict
                .violations()
                .contains(&"status must be queued".to_string())
        );
        assert!(verdict.violations().contains(
            &"process modules could not be validated: [Genotyping]".to_string()
        ));
    }

    #[tokio::test]
    async fn missing_cost_code_is_reported() {
        let fx = fixture().await;
        fx.projects.clear_cost_codes();

        let verdict = policy(&fx)
            .evaluate(&fx.order, &RequestContext::system())
            .await
            .unwrap();

        assert!(
            verdict
                .violations()
                .contains(&"cost code can not be found".to_string())
        );
        assert!(verdict.cost_code().is_none());
    }

    #[tokio::test]
    async fn inactive_plan_is_reported() {
        let fx = fixture().await;
        let mut plan = fx
            .work_plans
            .find_by_id(&fx.order.work_plan_id)
            .await
            .unwrap()
            .unwrap();
        plan.status = WorkPlanState::Construction;
        fx.work_plans.save(&plan).await.unwrap();

        let verdict = policy(&fx)
            .evaluate(&fx.order, &RequestContext::system())
            .await
            .unwrap();
        assert!(
            verdict
                .violations()
                .contains(&"work plan must be active".to_string())
        );
    }

    #[tokio::test]
    async fn unavailable_material_is_reported() {
        let fx = fixture().await;
        let input_id = fx.order.input_set.as_ref().unwrap().id;
        fx.sets.seed_material_in_set(&input_id, MaterialId::new(), false);

        let verdict = policy(&fx)
            .evaluate(&fx.order, &RequestContext::system())
            .await
            .unwrap();
        assert!(
            verdict
                .violations()
                .contains(&"materials are not all available".to_string())
        );
    }

    #[tokio::test]
    async fn order_without_jobs_is_reported() {
        let fx = fixture().await;
        fx.jobs.clear();

        let verdict = policy(&fx)
            .evaluate(&fx.order, &RequestContext::system())
            .await
            .unwrap();
        assert!(
            verdict
                .violations()
                .contains(&"work order has no jobs".to_string())
        );
    }

    #[tokio::test]
    async fn every_check_runs_and_all_violations_accumulate() {
        let mut fx = fixture().await;
        fx.order.activate().unwrap();
        fx.projects.clear_cost_codes();
        fx.jobs.clear();
        let mut plan = fx
            .work_plans
            .find_by_id(&fx.order.work_plan_id)
            .await
            .unwrap()
            .unwrap();
        plan.status = WorkPlanState::Closed;
        fx.work_plans.save(&plan).await.unwrap();

        let verdict = policy(&fx)
            .evaluate(&fx.order, &RequestContext::system())
            .await
            .unwrap();

        // cost code + status + plan + jobs. Pricing is unreachable
        // without a cost code; materials are still available.
        assert_eq!(verdict.violations().len(), 4);
    }
}
