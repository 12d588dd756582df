//! Set coordinator actor.
//!
//! Owns the current root and the compaction lifecycle. In normal mode every
//! operation is forwarded to the root untouched. A GC trigger spawns a fresh
//! root, tells the old root to copy itself over, and buffers operations
//! until the old root reports completion. The buffer is then replayed in
//! arrival order against the new root and the old tree is torn down.

use std::collections::VecDeque;
use std::ops::ControlFlow;

use tokio::sync::{mpsc, oneshot};

use crate::message::Operation;
use crate::node::{CopyDone, NodeMsg, NodeRef, Parent};

#[derive(Debug)]
pub(crate) enum Command {
    Op(Operation),
    Gc,
    Status(oneshot::Sender<SetStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetStatus {
    /// Completed compaction cycles.
    pub generation: u64,
    /// Whether a compaction cycle is in flight.
    pub collecting: bool,
    /// Operations buffered behind the in-flight cycle.
    pub pending: usize,
}

enum Mode {
    Normal,
    Collecting {
        new_root: NodeRef,
        pending: VecDeque<Operation>,
    },
}

pub(crate) struct Coordinator {
    root: NodeRef,
    mode: Mode,
    generation: u64,
    done_tx: mpsc::UnboundedSender<CopyDone>,
    done_rx: mpsc::UnboundedReceiver<CopyDone>,
}

impl Coordinator {
    pub fn new() -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            root: NodeRef::spawn_root(),
            mode: Mode::Normal,
            generation: 0,
            done_tx,
            done_rx,
        }
    }

    /// Process commands until shutdown or until every command sender is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                Some(done) = self.done_rx.recv() => self.finish_gc(done),
                command = commands.recv() => match command {
                    Some(command) => {
                        if let ControlFlow::Break(ack) = self.handle_command(command) {
                            // Refuse new commands, then drop whatever was already queued.
                            commands.close();
                            while commands.try_recv().is_ok() {}
                            let _ = ack.send(());
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("All set handles dropped");
                        self.teardown();
                        break;
                    }
                },
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<oneshot::Sender<()>> {
        match command {
            Command::Op(op) => match &mut self.mode {
                Mode::Normal => self.root.send(NodeMsg::Op(op)),
                Mode::Collecting { pending, .. } => {
                    tracing::trace!(kind = %op.kind(), id = %op.id(), "Buffered during GC");
                    pending.push_back(op);
                }
            },
            Command::Gc => self.start_gc(),
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown(ack) => {
                self.teardown();
                return ControlFlow::Break(ack);
            }
        }
        ControlFlow::Continue(())
    }

    fn start_gc(&mut self) {
        if matches!(self.mode, Mode::Collecting { .. }) {
            tracing::debug!(
                generation = self.generation,
                "GC already in flight; ignoring trigger"
            );
            return;
        }

        let new_root = NodeRef::spawn_root();
        tracing::debug!(
            generation = self.generation,
            old_root = %self.root.id(),
            new_root = %new_root.id(),
            "GC started"
        );
        self.root.send(NodeMsg::CopyTo {
            new_root: new_root.clone(),
            parent: Parent::Coordinator(self.done_tx.clone()),
        });
        self.mode = Mode::Collecting {
            new_root,
            pending: VecDeque::new(),
        };
    }

    fn finish_gc(&mut self, done: CopyDone) {
        if done.root != self.root.id() || matches!(self.mode, Mode::Normal) {
            tracing::warn!(from = %done.root, "Stray copy completion ignored");
            return;
        }

        let Mode::Collecting { new_root, pending } =
            std::mem::replace(&mut self.mode, Mode::Normal)
        else {
            return;
        };

        let replayed = pending.len();
        for op in pending {
            new_root.send(NodeMsg::Op(op));
        }

        let old_root = std::mem::replace(&mut self.root, new_root);
        old_root.send(NodeMsg::Stop);
        self.generation += 1;

        tracing::debug!(
            generation = self.generation,
            root = %self.root.id(),
            replayed,
            "GC finished"
        );
    }

    fn status(&self) -> SetStatus {
        let (collecting, pending) = match &self.mode {
            Mode::Normal => (false, 0),
            Mode::Collecting { pending, .. } => (true, pending.len()),
        };
        SetStatus {
            generation: self.generation,
            collecting,
            pending,
        }
    }

    /// Stop every live tree. Buffered operations are dropped unanswered.
    fn teardown(&mut self) {
        self.root.send(NodeMsg::Stop);
        if let Mode::Collecting { new_root, pending } =
            std::mem::replace(&mut self.mode, Mode::Normal)
        {
            tracing::debug!(dropped = pending.len(), "Shutting down mid-GC");
            new_root.send(NodeMsg::Stop);
        }
    }
}

#[cfg(test)]
mod tests {
    use arbor_types::{NodeId, OperationReply, RequestId};

    use super::*;
    use crate::message::{ReplySink, Requester};

    impl Coordinator {
        fn root_id(&self) -> NodeId {
            self.root.id()
        }
    }

    fn client() -> (ReplySink, mpsc::UnboundedReceiver<OperationReply>) {
        mpsc::unbounded_channel()
    }

    fn insert(tx: &ReplySink, id: i64, value: i64) -> Command {
        Command::Op(Operation::insert(
            Requester::client(tx.clone()),
            RequestId::new(id),
            value,
        ))
    }

    fn contains(tx: &ReplySink, id: i64, value: i64) -> Command {
        Command::Op(Operation::contains(
            Requester::client(tx.clone()),
            RequestId::new(id),
            value,
        ))
    }

    #[tokio::test]
    async fn operations_are_buffered_while_collecting() {
        let mut coordinator = Coordinator::new();
        let (tx, mut rx) = client();

        coordinator.start_gc();
        let _ = coordinator.handle_command(insert(&tx, 1, 10));
        let _ = coordinator.handle_command(contains(&tx, 2, 10));

        let status = coordinator.status();
        assert!(status.collecting);
        assert_eq!(status.pending, 2);
        assert!(rx.try_recv().is_err());

        let done = coordinator.done_rx.recv().await.unwrap();
        coordinator.finish_gc(done);

        assert_eq!(
            rx.recv().await.unwrap(),
            OperationReply::OperationFinished {
                id: RequestId::new(1)
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            OperationReply::ContainsResult {
                id: RequestId::new(2),
                result: true
            }
        );
        let status = coordinator.status();
        assert_eq!(status.generation, 1);
        assert!(!status.collecting);
    }

    #[tokio::test]
    async fn second_trigger_while_collecting_is_ignored() {
        let mut coordinator = Coordinator::new();
        let old_root = coordinator.root_id();

        coordinator.start_gc();
        coordinator.start_gc();

        let done = coordinator.done_rx.recv().await.unwrap();
        assert_eq!(done.root, old_root);
        coordinator.finish_gc(done);
        assert_eq!(coordinator.status().generation, 1);
        assert!(coordinator.done_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stray_completion_does_not_swap_roots() {
        let mut coordinator = Coordinator::new();
        let root = coordinator.root_id();

        coordinator.finish_gc(CopyDone {
            root: NodeId::new(u64::MAX),
        });
        assert_eq!(coordinator.root_id(), root);
        assert_eq!(coordinator.status().generation, 0);
    }

    #[tokio::test]
    async fn gc_swaps_in_new_root() {
        let mut coordinator = Coordinator::new();
        let old_root = coordinator.root_id();

        coordinator.start_gc();
        let done = coordinator.done_rx.recv().await.unwrap();
        coordinator.finish_gc(done);

        assert_ne!(coordinator.root_id(), old_root);
    }
}
