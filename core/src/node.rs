//! Tree node actor.
//!
//! Every node is its own tokio task holding one value, a tombstone flag, and
//! up to two children. Nodes never touch each other's state; everything
//! happens through the unbounded mailbox behind a [`NodeRef`], so sends never
//! block and a node handles exactly one message at a time.
//!
//! # Compaction
//!
//! `CopyTo(new_root)` retires a node. It re-inserts its own value into the new
//! tree if present, fans `CopyTo` out to its children, and reports
//! `CopyFinished` to its parent once its own insert is confirmed and every
//! child has reported. A retired node never returns to normal operation.
//!
//! ```text
//! Normal --CopyTo--> Copying { outstanding, insert_confirmed } --all done--> Retired
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use arbor_types::{NodeId, OperationKind, OperationReply, Position, RequestId};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::message::{Operation, Requester};

/// Value carried by a fresh root. The root starts removed, so the sentinel
/// never answers as a member unless a client inserts it.
pub(crate) const ROOT_SENTINEL: i64 = 0;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> NodeId {
    NodeId::new(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug)]
pub(crate) enum NodeMsg {
    Op(Operation),
    /// Reply from the new tree to this node's own compaction insert.
    Reply(OperationReply),
    CopyTo { new_root: NodeRef, parent: Parent },
    CopyFinished(NodeId),
    Stop,
}

/// Signal the old root sends the coordinator when its subtree is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CopyDone {
    pub root: NodeId,
}

/// Who a node reports `CopyFinished` to.
#[derive(Debug, Clone)]
pub(crate) enum Parent {
    Node(NodeRef),
    Coordinator(mpsc::UnboundedSender<CopyDone>),
}

impl Parent {
    fn notify(&self, from: NodeId) {
        match self {
            Parent::Node(node) => node.send(NodeMsg::CopyFinished(from)),
            Parent::Coordinator(tx) => {
                if tx.send(CopyDone { root: from }).is_err() {
                    tracing::debug!(node = %from, "Coordinator gone before copy completed");
                }
            }
        }
    }
}

/// Address of a running node.
#[derive(Debug, Clone)]
pub(crate) struct NodeRef {
    id: NodeId,
    tx: mpsc::UnboundedSender<NodeMsg>,
}

impl NodeRef {
    /// Spawn a node task on the current runtime.
    pub fn spawn(value: i64, present: bool) -> Self {
        let id = next_node_id();
        let (tx, inbox) = mpsc::unbounded_channel();
        let this = Self { id, tx };
        let node = TreeNode {
            id,
            value,
            present,
            children: HashMap::new(),
            state: NodeState::Normal,
            this: this.clone(),
        };
        let span = tracing::trace_span!("node", node = %id, value);
        tokio::spawn(node.run(inbox).instrument(span));
        this
    }

    /// Fresh empty root for a new tree generation.
    pub fn spawn_root() -> Self {
        Self::spawn(ROOT_SENTINEL, false)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Sends to a torn-down node are dropped.
    pub fn send(&self, msg: NodeMsg) {
        if self.tx.send(msg).is_err() {
            tracing::trace!(node = %self.id, "Dropped message for stopped node");
        }
    }
}

#[derive(Debug)]
enum NodeState {
    Normal,
    Copying {
        parent: Parent,
        outstanding: HashSet<NodeId>,
        insert_confirmed: bool,
    },
    Retired,
}

struct TreeNode {
    id: NodeId,
    value: i64,
    present: bool,
    children: HashMap<Position, NodeRef>,
    state: NodeState,
    this: NodeRef,
}

impl TreeNode {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<NodeMsg>) {
        while let Some(msg) = inbox.recv().await {
            match msg {
                NodeMsg::Op(op) => self.handle_operation(op),
                NodeMsg::Reply(reply) => self.handle_reply(reply),
                NodeMsg::CopyTo { new_root, parent } => self.start_copy(&new_root, parent),
                NodeMsg::CopyFinished(child) => self.handle_child_finished(child),
                NodeMsg::Stop => {
                    for child in self.children.values() {
                        child.send(NodeMsg::Stop);
                    }
                    tracing::trace!("Node stopped");
                    break;
                }
            }
        }
    }

    fn handle_operation(&mut self, op: Operation) {
        if !matches!(self.state, NodeState::Normal) {
            // Per-sender FIFO delivers every operation ahead of the CopyTo
            // that follows it, so nothing should reach a retired node.
            tracing::error!(
                kind = %op.kind(),
                id = %op.id(),
                target = op.value(),
                "Operation reached a retired node; dropping"
            );
            return;
        }

        let Some(position) = Position::route(op.value(), self.value) else {
            match op.kind() {
                OperationKind::Insert => {
                    self.present = true;
                    op.finish();
                }
                OperationKind::Remove => {
                    self.present = false;
                    op.finish();
                }
                OperationKind::Contains => op.answer(self.present),
            }
            return;
        };

        if let Some(child) = self.children.get(&position) {
            tracing::trace!(kind = %op.kind(), target = op.value(), %position, "Forwarding");
            child.send(NodeMsg::Op(op));
            return;
        }

        match op.kind() {
            OperationKind::Insert => {
                let child = NodeRef::spawn(op.value(), true);
                tracing::trace!(child = %child.id(), target = op.value(), %position, "Created child");
                self.children.insert(position, child);
                op.finish();
            }
            OperationKind::Remove => op.finish(),
            OperationKind::Contains => op.answer(false),
        }
    }

    fn start_copy(&mut self, new_root: &NodeRef, parent: Parent) {
        if !matches!(self.state, NodeState::Normal) {
            tracing::warn!("Duplicate CopyTo ignored");
            return;
        }

        if self.present {
            new_root.send(NodeMsg::Op(Operation::insert(
                Requester::node(self.this.clone()),
                RequestId::from_value(self.value),
                self.value,
            )));
        }

        let outstanding: HashSet<NodeId> = self.children.values().map(NodeRef::id).collect();
        for child in self.children.values() {
            child.send(NodeMsg::CopyTo {
                new_root: new_root.clone(),
                parent: Parent::Node(self.this.clone()),
            });
        }

        self.state = NodeState::Copying {
            parent,
            outstanding,
            insert_confirmed: !self.present,
        };
        self.finish_copy_if_done();
    }

    fn handle_reply(&mut self, reply: OperationReply) {
        let own_id = RequestId::from_value(self.value);
        match (&mut self.state, reply) {
            (
                NodeState::Copying {
                    insert_confirmed, ..
                },
                OperationReply::OperationFinished { id },
            ) if id == own_id => {
                *insert_confirmed = true;
            }
            (_, reply) => {
                tracing::warn!(?reply, "Unexpected reply");
                return;
            }
        }
        self.finish_copy_if_done();
    }

    fn handle_child_finished(&mut self, child: NodeId) {
        let NodeState::Copying { outstanding, .. } = &mut self.state else {
            tracing::warn!(%child, "CopyFinished outside of a copy");
            return;
        };
        if !outstanding.remove(&child) {
            tracing::warn!(%child, "CopyFinished from unknown child");
            return;
        }
        self.finish_copy_if_done();
    }

    fn finish_copy_if_done(&mut self) {
        let NodeState::Copying {
            outstanding,
            insert_confirmed,
            ..
        } = &self.state
        else {
            return;
        };
        if !*insert_confirmed || !outstanding.is_empty() {
            return;
        }

        if let NodeState::Copying { parent, .. } =
            std::mem::replace(&mut self.state, NodeState::Retired)
        {
            tracing::trace!("Copy finished");
            parent.notify(self.id);
        }
    }
}
