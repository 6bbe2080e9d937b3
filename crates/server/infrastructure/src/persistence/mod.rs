//! Persistence adapters.
//!
//! Local state is small (work orders, jobs, plans) and lives behind the
//! domain repository ports; the in-memory adapters here back local and
//! development deployments.

pub mod in_memory;

pub use in_memory::{
    InMemoryJobStore, InMemoryWorkOrderStore, InMemoryWorkPlanStore,
};
