//! Event watcher
//!
//! Turns declaration change notifications and periodic resync ticks into
//! reconcile triggers. Only the fact that something changed is queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use certwarden_common::IngressDefaults;

use crate::queue::{DebounceQueue, ReconcileTrigger};
use crate::store::{ResourceStore, WatchEvent, WatchStream};

pub struct EventWatcher {
    store: Arc<dyn ResourceStore>,
    queue: Arc<DebounceQueue<ReconcileTrigger>>,
    defaults: IngressDefaults,
    namespace: Option<String>,
    resync_interval: Duration,
}

impl EventWatcher {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        queue: Arc<DebounceQueue<ReconcileTrigger>>,
        defaults: IngressDefaults,
        namespace: Option<String>,
        resync_interval: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            defaults,
            namespace,
            resync_interval,
        }
    }

    /// Queue a trigger for `event` unless it is a no-op.
    ///
    /// Returns whether a trigger was queued.
    pub fn handle(&self, event: &WatchEvent) -> bool {
        if let WatchEvent::Updated { old, new } = event {
            if old.same_content(new) {
                trace!(ingress = %new.key, "Update without content change, ignoring");
                return false;
            }
        }

        let rule = event.rule();
        if let Some(reason) = rule.ignore_reason(&self.defaults) {
            debug!(
                kind = event.kind(),
                ingress = %rule.key,
                reason = %reason,
                "Ignoring event for unmanaged ingress"
            );
            return false;
        }

        debug!(kind = event.kind(), ingress = %rule.key, "Ingress changed, queueing reconcile");
        self.queue.add(ReconcileTrigger);
        true
    }

    /// Watch until `shutdown` is cancelled.
    ///
    /// The first resync tick fires immediately. If the watch cannot be
    /// opened or closes, resync ticks keep triggering passes.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut events: Option<WatchStream> = match self.store.watch(self.namespace.as_deref()).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "Failed to watch ingresses, relying on resync only");
                None
            }
        };

        let mut resync = interval(self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            namespace = self.namespace.as_deref().unwrap_or("<all>"),
            resync_secs = self.resync_interval.as_secs(),
            "Starting ingress watcher"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Ingress watcher stopping");
                    break;
                }
                _ = resync.tick() => {
                    trace!("Resync tick");
                    self.queue.add(ReconcileTrigger);
                }
                event = next_event(&mut events) => match event {
                    Some(event) => {
                        self.handle(&event);
                    }
                    None => {
                        warn!("Ingress watch closed, relying on resync only");
                        events = None;
                    }
                },
            }
        }
    }
}

async fn next_event(events: &mut Option<WatchStream>) -> Option<WatchEvent> {
    match events {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}
