//! Controller, store and issuer configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use certwarden_common::{HostFilter, IngressDefaults};

use crate::ConfigError;

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ControllerConfig {
    /// Namespace to watch; empty watches all namespaces.
    pub watch_namespace: String,
    /// Full resync period in seconds.
    pub resync_interval_secs: u64,
    /// Certificates expiring within this many days are renewed.
    pub minimum_validity_days: u64,
    pub default_ingress_class: String,
    pub default_provider: String,
    pub supported_ingress_classes: Vec<String>,
    pub supported_providers: Vec<String>,
    /// Host exclusion patterns, tried in order.
    pub host_filters: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: String::new(),
            resync_interval_secs: default_resync_interval_secs(),
            minimum_validity_days: default_minimum_validity_days(),
            default_ingress_class: "nginx".to_string(),
            default_provider: "nginx".to_string(),
            supported_ingress_classes: vec!["nginx".to_string(), "gce".to_string()],
            supported_providers: vec!["nginx".to_string(), "gce".to_string()],
            host_filters: Vec::new(),
        }
    }
}

pub(crate) fn default_resync_interval_secs() -> u64 {
    60
}

pub(crate) fn default_minimum_validity_days() -> u64 {
    30
}

impl ControllerConfig {
    /// `None` when all namespaces are watched.
    pub fn namespace(&self) -> Option<&str> {
        Some(self.watch_namespace.as_str()).filter(|ns| !ns.is_empty())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn minimum_validity(&self) -> Duration {
        Duration::from_secs(self.minimum_validity_days.saturating_mul(24 * 3600))
    }

    /// Class and provider defaults for interpreting declarations.
    pub fn ingress_defaults(&self) -> IngressDefaults {
        IngressDefaults {
            default_class: self.default_ingress_class.to_lowercase(),
            supported_classes: self
                .supported_ingress_classes
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
            default_provider: self.default_provider.to_lowercase(),
        }
    }

    /// Compile the host filters in configuration order.
    pub fn host_filter(&self) -> Result<HostFilter, ConfigError> {
        let patterns = self
            .host_filters
            .iter()
            .map(|pattern| {
                regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidHostFilter {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HostFilter::new(patterns))
    }
}

/// Split a comma separated filter list, trimming entries and skipping
/// empty ones.
pub fn parse_host_filter_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resource store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StoreConfig {
    /// Root directory of the file-backed store.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/certwarden"),
        }
    }
}

/// Certificate issuer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IssuerConfig {
    /// Lifetime of issued certificates in days.
    pub validity_days: u64,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self { validity_days: 90 }
    }
}
