//! Routing provider notification
//!
//! Every pass, each registered provider sees `reset`, then `process` for
//! each managed declaration that selects it, then `finalize`. A provider's
//! failures are logged and never touch another provider's sequence.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use certwarden_common::{IngressDefaults, ObjectKey, RoutingRule};

/// Error reported by a routing provider.
#[derive(Debug, Error)]
#[error("provider '{provider}' failed: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// A convergence target notified once per pass.
#[async_trait]
pub trait RoutingProvider: Send {
    /// Registered name, matched against the lowercased provider selector.
    fn name(&self) -> &str;

    /// Clear per-pass state.
    async fn reset(&mut self) -> Result<(), ProviderError>;

    /// Take one declaration into account.
    async fn process(&mut self, rule: &RoutingRule) -> Result<(), ProviderError>;

    /// Apply what was collected this pass.
    async fn finalize(&mut self) -> Result<(), ProviderError>;
}

/// What happened to one provider during a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderPass {
    pub reset_failed: bool,
    pub processed: Vec<ObjectKey>,
    pub process_failures: usize,
    pub finalize_failed: bool,
}

/// Per-provider outcomes of one notification round, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderReport {
    pub providers: BTreeMap<String, ProviderPass>,
}

impl ProviderReport {
    pub fn get(&self, name: &str) -> Option<&ProviderPass> {
        self.providers.get(name)
    }
}

/// Providers registered by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn RoutingProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its lowercased name, replacing any
    /// provider already registered under that name.
    pub fn register(&mut self, provider: Box<dyn RoutingProvider>) {
        let name = provider.name().to_lowercase();
        if self.providers.insert(name.clone(), provider).is_some() {
            warn!(provider = %name, "Replacing already registered provider");
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Run one notification round over the managed declarations.
    pub async fn notify(&mut self, rules: &[&RoutingRule], defaults: &IngressDefaults) -> ProviderReport {
        let mut report = ProviderReport::default();

        for (name, provider) in self.providers.iter_mut() {
            let mut pass = ProviderPass::default();

            if let Err(e) = provider.reset().await {
                warn!(provider = %name, error = %e, "Provider reset failed, skipping its declarations this pass");
                pass.reset_failed = true;
            } else {
                for rule in rules.iter().filter(|rule| rule.provider(defaults) == *name) {
                    match provider.process(rule).await {
                        Ok(()) => pass.processed.push(rule.key.clone()),
                        Err(e) => {
                            warn!(provider = %name, ingress = %rule.key, error = %e, "Provider failed to process declaration");
                            pass.process_failures += 1;
                        }
                    }
                }
            }

            if let Err(e) = provider.finalize().await {
                warn!(provider = %name, error = %e, "Provider finalize failed");
                pass.finalize_failed = true;
            }

            debug!(
                provider = %name,
                processed = pass.processed.len(),
                failures = pass.process_failures,
                "Provider notified"
            );
            report.providers.insert(name.clone(), pass);
        }

        report
    }
}

/// Provider that only logs the declarations routed to it.
pub struct LoggingProvider {
    name: String,
    pending: Vec<ObjectKey>,
}

impl LoggingProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: Vec::new(),
        }
    }
}

#[async_trait]
impl RoutingProvider for LoggingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reset(&mut self) -> Result<(), ProviderError> {
        self.pending.clear();
        Ok(())
    }

    async fn process(&mut self, rule: &RoutingRule) -> Result<(), ProviderError> {
        debug!(provider = %self.name, ingress = %rule.key, "Provider received declaration");
        self.pending.push(rule.key.clone());
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), ProviderError> {
        info!(
            provider = %self.name,
            ingresses = ?self.pending.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Provider converged"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwarden_common::annotations::{ANNOTATION_ENABLED, ANNOTATION_INGRESS_PROVIDER};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every call; fails the configured steps.
    struct RecordingProvider {
        name: String,
        calls: Arc<Mutex<Vec<String>>>,
        fail_reset: bool,
        fail_process: bool,
    }

    impl RecordingProvider {
        fn new(name: &str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                calls: calls.clone(),
                fail_reset: false,
                fail_process: false,
            }
        }
    }

    #[async_trait]
    impl RoutingProvider for RecordingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn reset(&mut self) -> Result<(), ProviderError> {
            self.calls.lock().push(format!("{}:reset", self.name));
            if self.fail_reset {
                return Err(ProviderError::new(&self.name, "reset refused"));
            }
            Ok(())
        }

        async fn process(&mut self, rule: &RoutingRule) -> Result<(), ProviderError> {
            self.calls.lock().push(format!("{}:process:{}", self.name, rule.key));
            if self.fail_process {
                return Err(ProviderError::new(&self.name, "process refused"));
            }
            Ok(())
        }

        async fn finalize(&mut self) -> Result<(), ProviderError> {
            self.calls.lock().push(format!("{}:finalize", self.name));
            Ok(())
        }
    }

    fn defaults() -> IngressDefaults {
        IngressDefaults {
            default_class: "nginx".to_string(),
            supported_classes: vec!["nginx".to_string(), "gce".to_string()],
            default_provider: "nginx".to_string(),
        }
    }

    fn rule(name: &str, provider: Option<&str>) -> RoutingRule {
        let rule = RoutingRule::new("default", name).with_annotation(ANNOTATION_ENABLED, "true");
        match provider {
            Some(p) => rule.with_annotation(ANNOTATION_INGRESS_PROVIDER, p),
            None => rule,
        }
    }

    #[tokio::test]
    async fn test_reset_failure_isolated() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut failing = RecordingProvider::new("gce", &calls);
        failing.fail_reset = true;

        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(failing));
        registry.register(Box::new(RecordingProvider::new("nginx", &calls)));

        let a = rule("a", Some("gce"));
        let b = rule("b", None);
        let report = registry.notify(&[&a, &b], &defaults()).await;

        assert_eq!(
            *calls.lock(),
            vec![
                "gce:reset",
                "gce:finalize",
                "nginx:reset",
                "nginx:process:default/b",
                "nginx:finalize",
            ]
        );
        assert!(report.get("gce").unwrap().reset_failed);
        assert_eq!(report.get("nginx").unwrap().processed, vec![b.key.clone()]);
    }

    #[tokio::test]
    async fn test_process_failure_continues() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut failing = RecordingProvider::new("nginx", &calls);
        failing.fail_process = true;

        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(failing));

        let a = rule("a", None);
        let b = rule("b", None);
        let report = registry.notify(&[&a, &b], &defaults()).await;

        let pass = report.get("nginx").unwrap();
        assert_eq!(pass.process_failures, 2);
        assert_eq!(calls.lock().last().map(String::as_str), Some("nginx:finalize"));
    }

    #[tokio::test]
    async fn test_provider_annotation_case_normalized() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(RecordingProvider::new("nginx", &calls)));

        let a = rule("a", Some("Nginx"));
        let report = registry.notify(&[&a], &defaults()).await;
        assert_eq!(report.get("nginx").unwrap().processed, vec![a.key.clone()]);
    }

    #[tokio::test]
    async fn test_logging_provider_sequence() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(LoggingProvider::new("Nginx")));
        assert_eq!(registry.names(), vec!["nginx"]);

        let a = rule("a", None);
        let report = registry.notify(&[&a], &defaults()).await;
        let pass = report.get("nginx").unwrap();
        assert!(!pass.reset_failed && !pass.finalize_failed);
        assert_eq!(pass.processed.len(), 1);
    }
}
