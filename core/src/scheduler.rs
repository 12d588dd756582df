//! Periodic GC trigger.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::Command;

/// Send a GC trigger every `interval` until the coordinator goes away.
///
/// Holds only a weak sender, so the trigger never keeps the coordinator
/// alive on its own.
pub(crate) fn spawn_periodic_gc(
    interval: Duration,
    commands: &mpsc::Sender<Command>,
) -> JoinHandle<()> {
    let commands = commands.downgrade();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(tx) = commands.upgrade() else { break };
            if tx.send(Command::Gc).await.is_err() {
                break;
            }
            tracing::trace!("Periodic GC trigger sent");
        }
        tracing::debug!("Periodic GC trigger stopped");
    })
}
