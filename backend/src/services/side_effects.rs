//! Best-effort side effects
//!
//! Statistics deltas and notifications run on a single background worker fed
//! by a bounded queue. A failure there is logged and dropped; it can never
//! surface as the failure of the request that produced it. Effects are
//! applied in the order they were enqueued. Each effect runs on its own task
//! so a panic takes down only that effect, not the worker.

use shared::{Actor, StatisticsDelta};
use tokio::sync::{mpsc, oneshot};

use super::{NotificationSink, StatisticsService};

/// Work handed to the background worker
#[derive(Debug)]
pub enum SideEffect {
    Statistics(StatisticsDelta),
    Notify { actor: Actor, message: String },
    /// Acknowledged once everything enqueued before it has run
    Flush(oneshot::Sender<()>),
}

/// Handle for enqueueing side effects
#[derive(Clone)]
pub struct SideEffectDispatcher {
    sender: mpsc::Sender<SideEffect>,
}

impl SideEffectDispatcher {
    /// Start the worker on the current tokio runtime
    pub fn spawn(
        statistics: StatisticsService,
        notifications: NotificationSink,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(receiver, statistics, notifications));
        Self { sender }
    }

    pub async fn statistics(&self, delta: StatisticsDelta) {
        if delta.is_empty() {
            return;
        }
        self.enqueue(SideEffect::Statistics(delta)).await;
    }

    pub async fn notify(&self, actor: &Actor, message: impl Into<String>) {
        self.enqueue(SideEffect::Notify {
            actor: actor.clone(),
            message: message.into(),
        })
        .await;
    }

    /// Wait until every effect enqueued so far has been attempted
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        self.enqueue(SideEffect::Flush(ack)).await;
        let _ = done.await;
    }

    async fn enqueue(&self, effect: SideEffect) {
        if let Err(mpsc::error::SendError(effect)) = self.sender.send(effect).await {
            tracing::warn!(?effect, "Side-effect worker stopped, effect dropped");
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<SideEffect>,
    statistics: StatisticsService,
    notifications: NotificationSink,
) {
    tracing::debug!("Side-effect worker started");
    while let Some(effect) = receiver.recv().await {
        if let SideEffect::Flush(ack) = effect {
            let _ = ack.send(());
            continue;
        }

        let task = tokio::spawn(apply_effect(
            effect,
            statistics.clone(),
            notifications.clone(),
        ));
        if let Err(e) = task.await {
            tracing::error!("Side effect aborted, worker continues: {}", e);
        }
    }
    tracing::debug!("Side-effect worker stopped");
}

async fn apply_effect(
    effect: SideEffect,
    statistics: StatisticsService,
    notifications: NotificationSink,
) {
    match effect {
        SideEffect::Statistics(delta) => {
            if let Err(e) = statistics.apply_delta(&delta).await {
                tracing::warn!(
                    ?delta,
                    "Statistics update failed, counters will drift until recompute: {}",
                    e
                );
            }
        }
        SideEffect::Notify { actor, message } => {
            if let Err(e) = notifications.record(&actor, &message).await {
                tracing::warn!(actor_id = %actor.id, "Notification write failed: {}", e);
            }
        }
        SideEffect::Flush(ack) => {
            let _ = ack.send(());
        }
    }
}
