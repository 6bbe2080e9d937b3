use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared_kernel::{JobId, WorkOrderId};

/// Representa un evento de dominio que ha ocurrido en el sistema.
/// Los eventos son hechos inmutables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DomainEvent {
    /// Un job ha sido completado por la saga de completion
    JobCompleted {
        job_id: JobId,
        work_order_id: WorkOrderId,
        occurred_at: DateTime<Utc>,
        correlation_id: Option<String>,
        actor: Option<String>,
    },
    /// Un job ha sido cancelado por la saga de cancellation
    JobCancelled {
        job_id: JobId,
        work_order_id: WorkOrderId,
        occurred_at: DateTime<Utc>,
        correlation_id: Option<String>,
        actor: Option<String>,
    },
    /// Todos los jobs de la work order han alcanzado estado terminal
    WorkOrderConcluded {
        work_order_id: WorkOrderId,
        occurred_at: DateTime<Utc>,
        correlation_id: Option<String>,
        actor: Option<String>,
    },
    /// La work order fue enviada al LIMS externo
    WorkOrderDispatched {
        work_order_id: WorkOrderId,
        /// Jobs reenviados desde la work order anterior del pipeline
        forwarded_job_ids: Vec<JobId>,
        occurred_at: DateTime<Utc>,
        correlation_id: Option<String>,
        actor: Option<String>,
    },
    /// La work order quedó en estado irrecuperable
    WorkOrderBroken {
        work_order_id: WorkOrderId,
        reason: String,
        occurred_at: DateTime<Utc>,
        correlation_id: Option<String>,
        actor: Option<String>,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::JobCompleted { .. } => "JobCompleted",
            DomainEvent::JobCancelled { .. } => "JobCancelled",
            DomainEvent::WorkOrderConcluded { .. } => "WorkOrderConcluded",
            DomainEvent::WorkOrderDispatched { .. } => "WorkOrderDispatched",
            DomainEvent::WorkOrderBroken { .. } => "WorkOrderBroken",
        }
    }

    /// Broker subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::JobCompleted { .. } => "labops.jobs.completed",
            DomainEvent::JobCancelled { .. } => "labops.jobs.cancelled",
            DomainEvent::WorkOrderConcluded { .. } => "labops.work_orders.concluded",
            DomainEvent::WorkOrderDispatched { .. } => "labops.work_orders.dispatched",
            DomainEvent::WorkOrderBroken { .. } => "labops.work_orders.broken",
        }
    }

    pub fn work_order_id(&self) -> WorkOrderId {
        match self {
            DomainEvent::JobCompleted { work_order_id, .. }
            | DomainEvent::JobCancelled { work_order_id, .. }
            | DomainEvent::WorkOrderConcluded { work_order_id, .. }
            | DomainEvent::WorkOrderDispatched { work_order_id, .. }
            | DomainEvent::WorkOrderBroken { work_order_id, .. } => *work_order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_map_to_stable_subjects() {
        let event = DomainEvent::WorkOrderDispatched {
            work_order_id: WorkOrderId::new(),
            forwarded_job_ids: vec![],
            occurred_at: Utc::now(),
            correlation_id: None,
            actor: None,
        };
        assert_eq!(event.subject(), "labops.work_orders.dispatched");
        assert_eq!(event.event_type(), "WorkOrderDispatched");
    }

    #[test]
    fn events_serialize_round_trip() {
        let event = DomainEvent::JobCompleted {
            job_id: JobId::new(),
            work_order_id: WorkOrderId::new(),
            occurred_at: Utc::now(),
            correlation_id: Some("corr-1".to_string()),
            actor: Some("user@lab.example".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
