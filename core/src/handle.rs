//! Client-facing handle for the set.
//!
//! Turns method calls into operations with fresh correlation ids and
//! matches the replies coming back out of the tree. A single reader task
//! owns the reply channel and routes each reply to the `oneshot` registered
//! for its id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use arbor_config::ArborConfig;
use arbor_types::{OperationKind, OperationReply, RequestId};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::coordinator::{Command, Coordinator, SetStatus};
use crate::errors::SetError;
use crate::message::{Operation, ReplySink, Requester};
use crate::scheduler;

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<OperationReply>>>>;

/// A concurrent set of integers backed by an actor-per-node binary tree.
///
/// Every method takes `&self`; share the handle behind an `Arc` to issue
/// requests from many tasks at once.
pub struct ArborSet {
    commands: mpsc::Sender<Command>,
    reply_tx: ReplySink,
    pending: PendingMap,
    next_id: AtomicI64,
    coordinator: Mutex<Option<JoinHandle<()>>>,
    reader: JoinHandle<()>,
    gc_trigger: Option<JoinHandle<()>>,
}

impl ArborSet {
    /// Start the coordinator (and the periodic GC trigger, if configured) on
    /// the current tokio runtime.
    #[must_use]
    pub fn spawn(config: &ArborConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(config.command_capacity());
        let coordinator = tokio::spawn(Coordinator::new().run(command_rx));

        let gc_trigger = config.gc_interval().map(|interval| {
            tracing::info!(interval_ms = interval.as_millis() as u64, "Periodic GC enabled");
            scheduler::spawn_periodic_gc(interval, &commands)
        });

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<OperationReply>();
        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(reply) = reply_rx.recv().await {
                let sender = reader_pending.lock().await.remove(&reply.id());
                match sender {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => tracing::warn!(id = %reply.id(), "Reply for unknown request"),
                }
            }
        });

        Self {
            commands,
            reply_tx,
            pending,
            next_id: AtomicI64::new(1),
            coordinator: Mutex::new(Some(coordinator)),
            reader,
            gc_trigger,
        }
    }

    pub async fn insert(&self, value: i64) -> Result<(), SetError> {
        self.request(OperationKind::Insert, value).await.map(|_| ())
    }

    pub async fn remove(&self, value: i64) -> Result<(), SetError> {
        self.request(OperationKind::Remove, value).await.map(|_| ())
    }

    pub async fn contains(&self, value: i64) -> Result<bool, SetError> {
        // `request` has already checked the reply shape.
        let reply = self.request(OperationKind::Contains, value).await?;
        Ok(matches!(
            reply,
            OperationReply::ContainsResult { result: true, .. }
        ))
    }

    /// Trigger a compaction cycle. Returns once the trigger is queued.
    ///
    /// Operations issued afterwards are answered after the cycle completes.
    pub async fn gc(&self) -> Result<(), SetError> {
        self.commands
            .send(Command::Gc)
            .await
            .map_err(|_| SetError::CoordinatorClosed)
    }

    pub async fn status(&self) -> Result<SetStatus, SetError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Status(tx))
            .await
            .map_err(|_| SetError::CoordinatorClosed)?;
        rx.await.map_err(|_| SetError::CoordinatorClosed)
    }

    /// Hand the coordinator an operation built by the caller.
    ///
    /// The reply goes to the operation's own requester; this handle does not
    /// track it.
    pub async fn submit(&self, op: Operation) -> Result<(), SetError> {
        self.commands
            .send(Command::Op(op))
            .await
            .map_err(|_| SetError::CoordinatorClosed)
    }

    /// Tear down the coordinator and every tree it owns.
    ///
    /// Requests still in flight fail with [`SetError::ReplyDropped`]; later
    /// requests fail with [`SetError::CoordinatorClosed`].
    pub async fn shutdown(&self) {
        if let Some(trigger) = &self.gc_trigger {
            trigger.abort();
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        if let Some(coordinator) = self.coordinator.lock().await.take()
            && let Err(e) = coordinator.await
        {
            tracing::warn!("Coordinator task failed: {e}");
        }

        let abandoned = {
            let mut pending = self.pending.lock().await;
            let count = pending.len();
            pending.clear();
            count
        };
        tracing::info!(abandoned, "Set shut down");
    }

    async fn request(
        &self,
        kind: OperationKind,
        value: i64,
    ) -> Result<OperationReply, SetError> {
        let id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let op = Operation::new(kind, Requester::client(self.reply_tx.clone()), id, value);
        if self.commands.send(Command::Op(op)).await.is_err() {
            // Don't leak the pending entry if the coordinator is gone.
            self.pending.lock().await.remove(&id);
            return Err(SetError::CoordinatorClosed);
        }

        match rx.await {
            Ok(reply) if reply.answers(kind) => Ok(reply),
            Ok(_) => Err(SetError::UnexpectedReply { id, kind }),
            Err(_) => Err(SetError::ReplyDropped { id }),
        }
    }
}

impl Drop for ArborSet {
    fn drop(&mut self) {
        if let Some(trigger) = &self.gc_trigger {
            trigger.abort();
        }
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_unique_per_handle() {
        let set = ArborSet::spawn(&ArborConfig::default());
        set.insert(1).await.unwrap();
        set.insert(2).await.unwrap();
        assert_eq!(set.next_id.load(Ordering::Relaxed), 3);
        assert!(set.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_reply_is_ignored() {
        let set = ArborSet::spawn(&ArborConfig::default());
        set.reply_tx
            .send(OperationReply::OperationFinished {
                id: RequestId::new(-5),
            })
            .unwrap();
        assert!(!set.contains(5).await.unwrap());
    }

    #[tokio::test]
    async fn shutdown_closes_coordinator() {
        let set = ArborSet::spawn(&ArborConfig::default());
        set.insert(3).await.unwrap();
        set.shutdown().await;
        assert!(set.coordinator.lock().await.is_none());
        // A second shutdown finds nothing left to join.
        set.shutdown().await;

        assert!(matches!(
            set.insert(4).await,
            Err(SetError::CoordinatorClosed)
        ));
        assert!(matches!(set.status().await, Err(SetError::CoordinatorClosed)));
    }
}
