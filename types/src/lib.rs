//! Core domain types for Arbor.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Both the tree actors and their clients speak in these types.

mod ids;
mod operation;

pub use ids::{NodeId, RequestId};
pub use operation::{OperationKind, OperationReply, Position};
