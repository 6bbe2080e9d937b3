//! Application layer for the LabOps platform.
//!
//! Wires the domain saga and policy into the two externally visible use
//! cases: completing/cancelling a job and dispatching a work order to
//! the LIMS with bounded retries.

pub mod completion;
pub mod dispatch;
