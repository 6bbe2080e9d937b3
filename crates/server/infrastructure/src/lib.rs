//! Infrastructure adapters for the LabOps platform.
//!
//! NATS-backed messaging and broker health, in-memory persistence for
//! local and development deployments, and the logging notification sink.

pub mod messaging;
pub mod notifications;
pub mod persistence;
