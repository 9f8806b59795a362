//! Controller wiring and lifecycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use certwarden_config::Config;

use crate::ca::CaClient;
use crate::errors::ControllerError;
use crate::provider::ProviderRegistry;
use crate::queue::{DebounceQueue, ReconcileTrigger};
use crate::reconciler::Reconciler;
use crate::store::ResourceStore;
use crate::watcher::EventWatcher;

/// Runs the event watcher and the reconciler until cancelled.
pub struct Controller {
    config: Arc<Config>,
    store: Arc<dyn ResourceStore>,
    ca: Arc<dyn CaClient>,
    providers: ProviderRegistry,
    queue: Arc<DebounceQueue<ReconcileTrigger>>,
}

impl Controller {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ResourceStore>,
        ca: Arc<dyn CaClient>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            config,
            store,
            ca,
            providers,
            queue: Arc::new(DebounceQueue::new()),
        }
    }

    /// Queue shared by the watcher and the reconciler.
    pub fn queue(&self) -> Arc<DebounceQueue<ReconcileTrigger>> {
        self.queue.clone()
    }

    /// Run until `shutdown` is cancelled, then stop both tasks.
    ///
    /// A pass in progress is allowed to finish.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        let settings = &self.config.controller;

        let reconciler = Reconciler::new(
            settings,
            self.store.clone(),
            self.ca.clone(),
            self.providers,
            self.queue.clone(),
        )
        .map_err(|e| ControllerError::Configuration(e.to_string()))?;

        let watcher = EventWatcher::new(
            self.store.clone(),
            self.queue.clone(),
            settings.ingress_defaults(),
            settings.namespace().map(str::to_string),
            settings.resync_interval(),
        );

        info!(
            namespace = settings.namespace().unwrap_or("<all>"),
            minimum_validity_days = settings.minimum_validity_days,
            "Controller started"
        );

        let watcher_task = tokio::spawn(watcher.run(shutdown.clone()));
        let mut reconciler_task = tokio::spawn(reconciler.run());

        let early_exit = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, stopping controller");
                None
            }
            joined = &mut reconciler_task => Some(match joined {
                Ok(()) => "reconciler returned".to_string(),
                Err(e) => e.to_string(),
            }),
        };

        self.queue.shut_down();

        if let Some(reason) = early_exit {
            error!(reason = %reason, "Reconciler exited before shutdown, stopping controller");
            shutdown.cancel();
            if let Err(e) = watcher_task.await {
                error!(error = %e, "Watcher task failed");
            }
            return Err(ControllerError::ReconcilerExited(reason));
        }

        if let Err(e) = watcher_task.await {
            error!(error = %e, "Watcher task failed");
        }
        if let Err(e) = reconciler_task.await {
            error!(error = %e, "Reconciler task failed");
        }

        info!("Controller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use certwarden_common::annotations::ANNOTATION_ENABLED;
    use certwarden_common::RoutingRule;

    use crate::ca::{CaError, CertificateBundle, SelfSignedIssuer};
    use crate::store::MemoryStore;

    struct PanickingCa;

    #[async_trait]
    impl CaClient for PanickingCa {
        async fn obtain_certificate(&self, _hosts: &[String]) -> Result<CertificateBundle, CaError> {
            panic!("issuer bug");
        }
    }

    fn managed(name: &str, host: &str) -> RoutingRule {
        RoutingRule::new("default", name)
            .with_annotation(ANNOTATION_ENABLED, "true")
            .with_tls(format!("{}-tls", name), vec![host])
    }

    #[tokio::test]
    async fn test_reconciler_panic_ends_run() {
        let store = Arc::new(MemoryStore::new());
        store.apply_rule(managed("web", "a.example.com"));

        let controller = Controller::new(
            Arc::new(Config::default()),
            store,
            Arc::new(PanickingCa),
            ProviderRegistry::new(),
        );
        let shutdown = CancellationToken::new();

        let result = tokio::time::timeout(Duration::from_secs(5), controller.run(shutdown.clone()))
            .await
            .expect("controller should stop on its own");
        assert!(matches!(result, Err(ControllerError::ReconcilerExited(_))));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_returns_ok() {
        let store = Arc::new(MemoryStore::new());
        store.apply_rule(managed("web", "a.example.com"));

        let controller = Controller::new(
            Arc::new(Config::default()),
            store.clone(),
            Arc::new(SelfSignedIssuer::new(90)),
            ProviderRegistry::new(),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(controller.run(shutdown.clone()));

        for _ in 0..100 {
            if store.secret(&certwarden_common::ObjectKey::new("default", "web-tls")).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(store.secret(&certwarden_common::ObjectKey::new("default", "web-tls")).is_some());
    }
}
