//! Reconciliation engine
//!
//! A single consumer pulls triggers from the debounce queue and runs one
//! full convergence pass per trigger:
//!
//! 1. list declarations fresh from the store (a failure aborts the pass)
//! 2. drop ignored declarations
//! 3. flatten TLS requirements in declaration order
//! 4. notify routing providers
//! 5. drop every requirement whose secret is claimed more than once
//! 6. remove excluded hosts
//! 7. run the certificate lifecycle for each requirement, collecting errors
//! 8. queue a retry if any requirement failed

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use certwarden_common::{HostFilter, IngressDefaults, ObjectKey, PassId, RoutingRule, TlsSpec};
use certwarden_config::{ConfigError, ControllerConfig};

use crate::ca::CaClient;
use crate::errors::{ControllerError, SecretConflict, TlsError};
use crate::lifecycle::{CertificateLifecycle, LifecycleOutcome};
use crate::provider::{ProviderRegistry, ProviderReport};
use crate::queue::{DebounceQueue, ReconcileTrigger};
use crate::store::ResourceStore;

/// Summary of one reconciliation pass.
#[derive(Debug, Default)]
pub struct PassReport {
    pub pass_id: PassId,
    /// Declarations listed from the store
    pub declarations: usize,
    /// Declarations left alone (unsupported class or not enabled)
    pub ignored: usize,
    pub conflicts: Vec<SecretConflict>,
    /// Terminal lifecycle state per processed secret
    pub outcomes: Vec<(ObjectKey, LifecycleOutcome)>,
    pub errors: Vec<TlsError>,
    pub providers: ProviderReport,
    pub retry_requested: bool,
}

impl PassReport {
    pub fn issued(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, LifecycleOutcome::Issued { .. }))
            .count()
    }
}

/// Split `specs` into those with a unique secret and the conflicts.
///
/// Requirements sharing a secret are all dropped, never first-wins.
/// Retained requirements keep their order; conflicts are ordered by the
/// first occurrence of their secret.
pub fn dedup_secrets(specs: Vec<TlsSpec>) -> (Vec<TlsSpec>, Vec<SecretConflict>) {
    let mut counts: HashMap<&ObjectKey, usize> = HashMap::new();
    for spec in &specs {
        *counts.entry(&spec.secret).or_default() += 1;
    }

    let mut conflicts: Vec<SecretConflict> = Vec::new();
    let mut retained = Vec::new();
    let mut duplicated = Vec::new();
    for spec in &specs {
        if counts[&spec.secret] == 1 {
            retained.push(spec.clone());
        } else {
            duplicated.push(spec);
        }
    }

    for spec in duplicated {
        let claimant = (spec.rule.clone(), spec.hosts.clone());
        match conflicts.iter_mut().find(|c| c.secret == spec.secret) {
            Some(conflict) => conflict.claimants.push(claimant),
            None => conflicts.push(SecretConflict {
                secret: spec.secret.clone(),
                claimants: vec![claimant],
            }),
        }
    }

    (retained, conflicts)
}

/// Owns the runtime collaborators and runs passes one at a time.
pub struct Reconciler {
    namespace: Option<String>,
    defaults: IngressDefaults,
    host_filter: HostFilter,
    store: Arc<dyn ResourceStore>,
    lifecycle: CertificateLifecycle,
    providers: ProviderRegistry,
    queue: Arc<DebounceQueue<ReconcileTrigger>>,
}

impl Reconciler {
    pub fn new(
        config: &ControllerConfig,
        store: Arc<dyn ResourceStore>,
        ca: Arc<dyn CaClient>,
        providers: ProviderRegistry,
        queue: Arc<DebounceQueue<ReconcileTrigger>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            namespace: config.namespace().map(str::to_string),
            defaults: config.ingress_defaults(),
            host_filter: config.host_filter()?,
            lifecycle: CertificateLifecycle::new(store.clone(), ca, config.minimum_validity()),
            store,
            providers,
            queue,
        })
    }

    /// Run one convergence pass.
    ///
    /// Only a listing failure is returned as an error; per-requirement
    /// failures are collected in the report and cause a retry trigger.
    pub async fn reconcile(&mut self) -> Result<PassReport, ControllerError> {
        let pass_id = PassId::new();
        let span = info_span!("reconcile", pass_id = %pass_id);
        self.reconcile_pass(pass_id).instrument(span).await
    }

    async fn reconcile_pass(&mut self, pass_id: PassId) -> Result<PassReport, ControllerError> {
        let rules = self.store.list_rules(self.namespace.as_deref()).await?;

        let mut report = PassReport {
            pass_id,
            declarations: rules.len(),
            ..Default::default()
        };

        let managed: Vec<&RoutingRule> = rules
            .iter()
            .filter(|rule| match rule.ignore_reason(&self.defaults) {
                Some(reason) => {
                    debug!(ingress = %rule.key, reason = %reason, "Ignoring ingress");
                    false
                }
                None => true,
            })
            .collect();
        report.ignored = rules.len() - managed.len();

        let specs: Vec<TlsSpec> = managed.iter().flat_map(|rule| rule.tls_specs()).collect();

        report.providers = self.providers.notify(&managed, &self.defaults).await;

        let (specs, conflicts) = dedup_secrets(specs);
        for conflict in &conflicts {
            warn!(secret = %conflict.secret, "{}", conflict);
        }
        report.conflicts = conflicts;

        for spec in specs {
            let hosts = self.host_filter.filter(&spec.hosts);
            let spec = spec.with_hosts(hosts);

            match self.lifecycle.process(&spec).await {
                Ok(outcome) => report.outcomes.push((spec.secret.clone(), outcome)),
                Err(e) => {
                    let err = TlsError::new(&spec, e);
                    error!(
                        ingress = %err.rule,
                        secret = %err.secret,
                        domains = ?err.hosts,
                        error = %err.source,
                        "Failed to process TLS requirement"
                    );
                    report.errors.push(err);
                }
            }
        }

        if !report.errors.is_empty() {
            warn!(failed = report.errors.len(), "Some TLS requirements failed, queueing a retry");
            self.queue.add(ReconcileTrigger);
            report.retry_requested = true;
        }

        info!(
            declarations = report.declarations,
            ignored = report.ignored,
            conflicts = report.conflicts.len(),
            issued = report.issued(),
            failed = report.errors.len(),
            "Reconcile pass finished"
        );
        Ok(report)
    }

    /// Consume triggers until the queue is shut down.
    pub async fn run(mut self) {
        let host_filters: Vec<&str> = self.host_filter.patterns().iter().map(|re| re.as_str()).collect();
        info!(providers = ?self.providers.names(), host_filters = ?host_filters, "Starting reconciler");

        while let Some(trigger) = self.queue.get().await {
            if let Err(e) = self.reconcile().await {
                error!(error = %e, "Reconcile pass aborted, waiting for the next trigger");
            }
            self.queue.done(&trigger);
        }

        info!("Reconciler stopped");
    }
}
