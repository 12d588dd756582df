//! Operations and the addresses their replies travel to.

use arbor_types::{OperationKind, OperationReply, RequestId};
use tokio::sync::mpsc;

use crate::node::{NodeMsg, NodeRef};

/// Client-side address for replies.
pub type ReplySink = mpsc::UnboundedSender<OperationReply>;

/// Opaque return address captured in every [`Operation`].
///
/// Clients build one from a [`ReplySink`]. Inside the tree a node can also
/// be a requester when it re-inserts its own value during compaction.
#[derive(Debug, Clone)]
pub struct Requester(Route);

#[derive(Debug, Clone)]
enum Route {
    Client(ReplySink),
    Node(NodeRef),
}

impl Requester {
    #[must_use]
    pub fn client(sink: ReplySink) -> Self {
        Self(Route::Client(sink))
    }

    pub(crate) fn node(node: NodeRef) -> Self {
        Self(Route::Node(node))
    }

    fn deliver(&self, reply: OperationReply) {
        match &self.0 {
            Route::Client(sink) => {
                if sink.send(reply).is_err() {
                    tracing::trace!(id = %reply.id(), "Requester went away before its reply");
                }
            }
            Route::Node(node) => node.send(NodeMsg::Reply(reply)),
        }
    }
}

impl From<ReplySink> for Requester {
    fn from(sink: ReplySink) -> Self {
        Self::client(sink)
    }
}

/// A single insert, contains, or remove request.
///
/// Not `Clone`: answering consumes the operation, so each one yields
/// exactly one reply.
#[derive(Debug)]
pub struct Operation {
    kind: OperationKind,
    requester: Requester,
    id: RequestId,
    value: i64,
}

impl Operation {
    #[must_use]
    pub fn new(kind: OperationKind, requester: Requester, id: RequestId, value: i64) -> Self {
        Self {
            kind,
            requester,
            id,
            value,
        }
    }

    #[must_use]
    pub fn insert(requester: Requester, id: RequestId, value: i64) -> Self {
        Self::new(OperationKind::Insert, requester, id, value)
    }

    #[must_use]
    pub fn contains(requester: Requester, id: RequestId, value: i64) -> Self {
        Self::new(OperationKind::Contains, requester, id, value)
    }

    #[must_use]
    pub fn remove(requester: Requester, id: RequestId, value: i64) -> Self {
        Self::new(OperationKind::Remove, requester, id, value)
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.value
    }

    pub(crate) fn finish(self) {
        self.requester
            .deliver(OperationReply::OperationFinished { id: self.id });
    }

    pub(crate) fn answer(self, result: bool) {
        self.requester.deliver(OperationReply::ContainsResult {
            id: self.id,
            result,
        });
    }
}
