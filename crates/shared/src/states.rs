use crate::error::SharedError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Estados posibles de una work order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOrderState {
    Queued,
    Active,
    Completed,
    Cancelled,
    Broken,
}

impl WorkOrderState {
    /// Valida si una transición de estado es válida según el State Machine del dominio
    ///
    /// Transiciones válidas:
    /// - Queued → Active, Cancelled, Broken
    /// - Active → Completed, Cancelled, Broken
    /// - Completed, Cancelled, Broken → (terminal, no transiciones salientes)
    pub fn can_transition_to(&self, new_state: &WorkOrderState) -> bool {
        match (self, new_state) {
            (s, n) if s == n => false,

            (WorkOrderState::Queued, WorkOrderState::Active) => true,
            (WorkOrderState::Queued, WorkOrderState::Cancelled) => true,
            (WorkOrderState::Queued, WorkOrderState::Broken) => true,

            (WorkOrderState::Active, WorkOrderState::Completed) => true,
            (WorkOrderState::Active, WorkOrderState::Cancelled) => true,
            (WorkOrderState::Active, WorkOrderState::Broken) => true,

            _ => false,
        }
    }

    /// Valida la transición y devuelve un error tipado si no es posible
    pub fn ensure_transition_to(&self, new_state: &WorkOrderState) -> Result<(), SharedError> {
        if self.can_transition_to(new_state) {
            Ok(())
        } else {
            Err(SharedError::InvalidStateTransition {
                from: self.to_string(),
                to: new_state.to_string(),
            })
        }
    }

    /// Retorna true si el estado es terminal (no se puede continuar)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkOrderState::Completed | WorkOrderState::Cancelled | WorkOrderState::Broken
        )
    }

    /// Retorna true si el estado está en progreso
    pub fn is_in_progress(&self) -> bool {
        matches!(self, WorkOrderState::Queued | WorkOrderState::Active)
    }
}

impl fmt::Display for WorkOrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkOrderState::Queued => write!(f, "QUEUED"),
            WorkOrderState::Active => write!(f, "ACTIVE"),
            WorkOrderState::Completed => write!(f, "COMPLETED"),
            WorkOrderState::Cancelled => write!(f, "CANCELLED"),
            WorkOrderState::Broken => write!(f, "BROKEN"),
        }
    }
}

impl FromStr for WorkOrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(WorkOrderState::Queued),
            "ACTIVE" => Ok(WorkOrderState::Active),
            "COMPLETED" => Ok(WorkOrderState::Completed),
            "CANCELLED" => Ok(WorkOrderState::Cancelled),
            "BROKEN" => Ok(WorkOrderState::Broken),
            _ => Err(format!("Invalid WorkOrderState: {}", s)),
        }
    }
}

/// Estados posibles de un job
///
/// Un job comparte el mismo ciclo de vida que su work order: es una unidad
/// de ejecución (un contenedor) dentro de ella.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Active,
    Completed,
    Cancelled,
    Broken,
}

impl JobState {
    /// Transiciones válidas:
    /// - Queued → Active, Cancelled, Broken
    /// - Active → Completed, Cancelled, Broken
    /// - Completed, Cancelled, Broken → (terminal)
    pub fn can_transition_to(&self, new_state: &JobState) -> bool {
        match (self, new_state) {
            (s, n) if s == n => false,

            (JobState::Queued, JobState::Active) => true,
            (JobState::Queued, JobState::Cancelled) => true,
            (JobState::Queued, JobState::Broken) => true,

            (JobState::Active, JobState::Completed) => true,
            (JobState::Active, JobState::Cancelled) => true,
            (JobState::Active, JobState::Broken) => true,

            _ => false,
        }
    }

    /// Valida la transición y devuelve un error tipado si no es posible
    pub fn ensure_transition_to(&self, new_state: &JobState) -> Result<(), SharedError> {
        if self.can_transition_to(new_state) {
            Ok(())
        } else {
            Err(SharedError::InvalidStateTransition {
                from: self.to_string(),
                to: new_state.to_string(),
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Broken
        )
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Active)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "QUEUED"),
            JobState::Active => write!(f, "ACTIVE"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Cancelled => write!(f, "CANCELLED"),
            JobState::Broken => write!(f, "BROKEN"),
        }
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(JobState::Queued),
            "ACTIVE" => Ok(JobState::Active),
            "COMPLETED" => Ok(JobState::Completed),
            "CANCELLED" => Ok(JobState::Cancelled),
            "BROKEN" => Ok(JobState::Broken),
            _ => Err(format!("Invalid JobState: {}", s)),
        }
    }
}

/// Estados del ciclo de vida de un work plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkPlanState {
    Construction,
    Active,
    Closed,
    Cancelled,
    Broken,
}

impl WorkPlanState {
    pub fn is_active(&self) -> bool {
        matches!(self, WorkPlanState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkPlanState::Closed | WorkPlanState::Cancelled | WorkPlanState::Broken
        )
    }
}

impl fmt::Display for WorkPlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkPlanState::Construction => write!(f, "CONSTRUCTION"),
            WorkPlanState::Active => write!(f, "ACTIVE"),
            WorkPlanState::Closed => write!(f, "CLOSED"),
            WorkPlanState::Cancelled => write!(f, "CANCELLED"),
            WorkPlanState::Broken => write!(f, "BROKEN"),
        }
    }
}

impl FromStr for WorkPlanState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONSTRUCTION" => Ok(WorkPlanState::Construction),
            "ACTIVE" => Ok(WorkPlanState::Active),
            "CLOSED" => Ok(WorkPlanState::Closed),
            "CANCELLED" => Ok(WorkPlanState::Cancelled),
            "BROKEN" => Ok(WorkPlanState::Broken),
            _ => Err(format!("Invalid WorkPlanState: {}", s)),
        }
    }
}
