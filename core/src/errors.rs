//! Errors surfaced to clients of the set.

use arbor_types::{OperationKind, RequestId};

#[derive(Debug, thiserror::Error)]
pub enum SetError {
    #[error("set coordinator is no longer running")]
    CoordinatorClosed,
    #[error("request {id} was dropped before a reply arrived")]
    ReplyDropped { id: RequestId },
    #[error("request {id} ({kind}) received a reply of the wrong kind")]
    UnexpectedReply { id: RequestId, kind: OperationKind },
}
