//! Ports for every external collaborator the core depends on.
//!
//! Each operation is a remote call that can fail with a network or
//! validation error. Adapters live in the infrastructure crate; the
//! `testing` module provides in-memory fakes.
//!
//! Every call takes an explicit [`RequestContext`] — there is no ambient
//! request identity anywhere in the system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::shared_kernel::{ContainerId, CorrelationId, JobId, MaterialId, SetId, WorkOrderId};

/// Errors surfaced by remote-service clients
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Remote call failed: {0}")]
    Network(String),

    #[error("Remote validation failed: {}", messages.join("; "))]
    Validation { messages: Vec<String> },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation {
            messages: vec![message.into()],
        }
    }

    /// The structured error list carried by this failure.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ClientError::Validation { messages } => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Explicit per-call identity stamped onto every remote request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: String,
    pub correlation_id: CorrelationId,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            correlation_id: CorrelationId::new(),
        }
    }

    /// Context for operations initiated by the server itself.
    pub fn system() -> Self {
        Self::new("system:labops-server")
    }
}

// ============================================================================
// Materials
// ============================================================================

/// A material record in the external material registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub available: bool,
    pub attributes: HashMap<String, Value>,
}

/// Creation payload for a material (container reference already stripped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMaterial {
    pub attributes: HashMap<String, Value>,
}

/// A requested new material together with where it should end up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMaterialRequest {
    pub attributes: HashMap<String, Value>,
    pub container: ContainerLocation,
}

/// Target location of a material inside a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerLocation {
    pub barcode: String,
    /// Slot address for plate-like containers; `None` for tubes.
    pub address: Option<String>,
}

/// Update payload keyed by an existing material identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialUpdate {
    pub id: MaterialId,
    pub attributes: HashMap<String, Value>,
}

#[async_trait]
pub trait MaterialClient: Send + Sync {
    async fn create(
        &self,
        materials: Vec<NewMaterial>,
        ctx: &RequestContext,
    ) -> ClientResult<Vec<Material>>;

    async fn find(&self, id: &MaterialId, ctx: &RequestContext) -> ClientResult<Material>;

    async fn update(
        &self,
        id: &MaterialId,
        attributes: HashMap<String, Value>,
        ctx: &RequestContext,
    ) -> ClientResult<Material>;

    async fn destroy(&self, id: &MaterialId, ctx: &RequestContext) -> ClientResult<()>;
}

// ============================================================================
// Containers
// ============================================================================

/// One addressed slot of a plate-like container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub address: String,
    pub material: Option<MaterialId>,
}

/// Contents of a container: addressed slots (plates) or one direct
/// material reference (tubes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContainerContents {
    Plate { slots: Vec<Slot> },
    Tube { material: Option<MaterialId> },
}

/// A container record in the external container registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub barcode: String,
    pub print_count: u32,
    pub contents: ContainerContents,
}

impl Container {
    pub fn is_plate(&self) -> bool {
        matches!(self.contents, ContainerContents::Plate { .. })
    }

    /// Place a material into this container, by slot address for plates
    /// or directly for tubes.
    pub fn place_material(
        &mut self,
        material: MaterialId,
        address: Option<&str>,
    ) -> ClientResult<()> {
        match (&mut self.contents, address) {
            (ContainerContents::Plate { slots }, Some(addr)) => {
                let slot = slots.iter_mut().find(|s| s.address == addr).ok_or_else(|| {
                    ClientError::validation(format!("no slot {} in container", addr))
                })?;
                slot.material = Some(material);
                Ok(())
            }
            (ContainerContents::Plate { .. }, None) => Err(ClientError::validation(
                "plate containers need a slot address",
            )),
            (ContainerContents::Tube { material: slot }, _) => {
                *slot = Some(material);
                Ok(())
            }
        }
    }

    pub fn material_ids(&self) -> Vec<MaterialId> {
        match &self.contents {
            ContainerContents::Plate { slots } => {
                slots.iter().filter_map(|s| s.material).collect()
            }
            ContainerContents::Tube { material } => material.iter().copied().collect(),
        }
    }
}

/// Creation payload for a container. A new container always starts with a
/// print count of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContainer {
    pub barcode: String,
    /// Slot addresses for a plate; `None` creates a tube.
    pub slot_addresses: Option<Vec<String>>,
}

impl NewContainer {
    pub fn tube(barcode: impl Into<String>) -> Self {
        Self {
            barcode: barcode.into(),
            slot_addresses: None,
        }
    }

    pub fn plate(barcode: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            barcode: barcode.into(),
            slot_addresses: Some(addresses),
        }
    }
}

#[async_trait]
pub trait ContainerClient: Send + Sync {
    async fn find_by_barcode(
        &self,
        barcode: &str,
        ctx: &RequestContext,
    ) -> ClientResult<Option<Container>>;

    async fn create(
        &self,
        containers: Vec<NewContainer>,
        ctx: &RequestContext,
    ) -> ClientResult<Vec<Container>>;

    async fn destroy(&self, id: &ContainerId, ctx: &RequestContext) -> ClientResult<()>;

    /// Persist the full state of a container.
    async fn save(&self, container: &Container, ctx: &RequestContext) -> ClientResult<()>;
}

// ============================================================================
// Sets
// ============================================================================

/// A named collection of material references, managed externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSet {
    pub id: SetId,
    pub name: String,
    pub locked: bool,
    pub owner: Option<String>,
}

/// Partial update for a set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetUpdate {
    pub owner: Option<String>,
    pub locked: Option<bool>,
}

/// A set together with its resolved materials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetWithMaterials {
    pub set: MaterialSet,
    pub materials: Vec<Material>,
}

impl SetWithMaterials {
    pub fn material_ids(&self) -> Vec<MaterialId> {
        self.materials.iter().map(|m| m.id).collect()
    }
}

#[async_trait]
pub trait SetClient: Send + Sync {
    async fn create(&self, name: &str, ctx: &RequestContext) -> ClientResult<MaterialSet>;

    async fn set_materials(
        &self,
        set_id: &SetId,
        materials: &[MaterialId],
        ctx: &RequestContext,
    ) -> ClientResult<()>;

    async fn update(
        &self,
        set_id: &SetId,
        update: SetUpdate,
        ctx: &RequestContext,
    ) -> ClientResult<MaterialSet>;

    async fn find_with_materials(
        &self,
        set_id: &SetId,
        ctx: &RequestContext,
    ) -> ClientResult<SetWithMaterials>;
}

// ============================================================================
// Pricing and project hierarchy
// ============================================================================

#[async_trait]
pub trait PricingClient: Send + Sync {
    /// Returns the subset of `module_names` without a resolvable unit
    /// price under `cost_code`.
    async fn missing_unit_prices(
        &self,
        module_names: &[String],
        cost_code: &str,
        ctx: &RequestContext,
    ) -> ClientResult<Vec<String>>;
}

/// Node identifier in the external project hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectNodeId(pub i64);

impl fmt::Display for ProjectNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One node of the project hierarchy. Cost codes live on some ancestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    pub id: ProjectNodeId,
    pub parent_id: Option<ProjectNodeId>,
    pub name: String,
    pub cost_code: Option<String>,
}

#[async_trait]
pub trait ProjectClient: Send + Sync {
    async fn node(
        &self,
        id: ProjectNodeId,
        ctx: &RequestContext,
    ) -> ClientResult<Option<ProjectNode>>;
}

// ============================================================================
// LIMS
// ============================================================================

/// The submission payload sent to the external LIMS for one work order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimsOrder {
    pub work_order_id: WorkOrderId,
    pub process_modules: Vec<String>,
    pub owner_email: String,
    pub jobs: Vec<LimsJob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimsJob {
    pub job_id: JobId,
    pub container_barcode: String,
    pub material_ids: Vec<MaterialId>,
}

#[async_trait]
pub trait LimsClient: Send + Sync {
    async fn submit(&self, order: &LimsOrder, ctx: &RequestContext) -> ClientResult<()>;
}

// ============================================================================
// Broker health
// ============================================================================

/// Capability gate for broker-backed eventing.
///
/// Two implementations exist: a live monitor over the NATS connection and
/// a disabled no-op selected at boot when eventing is switched off.
#[async_trait]
pub trait BrokerStatus: Send + Sync {
    /// Whether broker-backed eventing is enabled at all.
    fn events_enabled(&self) -> bool;

    /// Whether the broker is currently reachable and healthy.
    async fn working(&self) -> bool;
}

// ============================================================================
// Notifications
// ============================================================================

/// Fire-and-forget notification sink. Delivery failures are logged by the
/// caller, never propagated.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn work_order_dispatched(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
    ) -> ClientResult<()>;

    async fn work_order_dispatch_failed(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
        errors: &[String],
    ) -> ClientResult<()>;

    async fn work_order_concluded(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
    ) -> ClientResult<()>;

    /// Internal developer-facing alert carrying attempt context.
    async fn developer_alert(
        &self,
        work_order_id: WorkOrderId,
        context: &str,
        detail: &str,
    ) -> ClientResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tube_takes_a_direct_material_reference() {
        let mut container = Container {
            id: ContainerId::new(),
            barcode: "TUBE-1".to_string(),
            print_count: 0,
            contents: ContainerContents::Tube { material: None },
        };
        let material = MaterialId::new();
        container.place_material(material, None).unwrap();
        assert_eq!(container.material_ids(), vec![material]);
    }

    #[test]
    fn plate_requires_a_known_slot_address() {
        let mut container = Container {
            id: ContainerId::new(),
            barcode: "PLATE-1".to_string(),
            print_count: 0,
            contents: ContainerContents::Plate {
                slots: vec![
                    Slot {
                        address: "A1".to_string(),
                        material: None,
                    },
                    Slot {
                        address: "A2".to_string(),
                        material: None,
                    },
                ],
            },
        };

        let material = MaterialId::new();
        assert!(container.place_material(material, None).is_err());
        assert!(container.place_material(material, Some("Z9")).is_err());
        container.place_material(material, Some("A2")).unwrap();
        assert_eq!(container.material_ids(), vec![material]);
    }

    #[test]
    fn validation_error_exposes_structured_messages() {
        let err = ClientError::Validation {
            messages: vec!["bad barcode".to_string(), "bad owner".to_string()],
        };
        assert_eq!(err.messages().len(), 2);
        assert!(err.to_string().contains("bad barcode"));
    }
}
