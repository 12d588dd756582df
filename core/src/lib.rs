//! Actor-per-node binary tree set with concurrent compaction.
//!
//! Each tree node runs as its own task and talks to its neighbours only
//! through messages. A coordinator task owns the root and drives
//! compaction: a GC cycle copies every present value into a fresh tree while
//! new operations queue up, then swaps roots and replays the queue.
//!
//! ```text
//! client -> ArborSet -> Coordinator -> root -> ... -> node
//!    ^                                                 |
//!    +------------------ OperationReply ---------------+
//! ```

mod coordinator;
mod errors;
mod handle;
mod message;
mod node;
mod scheduler;

pub use arbor_types::{NodeId, OperationKind, OperationReply, Position, RequestId};
pub use coordinator::SetStatus;
pub use errors::SetError;
pub use handle::ArborSet;
pub use message::{Operation, ReplySink, Requester};
