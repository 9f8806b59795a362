//! Routing declarations and the TLS requirements they carry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::annotations::{ANNOTATION_ENABLED, ANNOTATION_INGRESS_CLASS, ANNOTATION_INGRESS_PROVIDER};
use crate::hosts::normalize_hosts;
use crate::ids::ObjectKey;

/// One TLS entry as declared on a routing declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsEntry {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub secret_name: String,
}

/// HTTP path routed to a backend service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePath {
    #[serde(default)]
    pub path: String,
    pub service_name: String,
    pub service_port: u16,
}

/// Host-scoped group of routed paths.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub paths: Vec<RoutePath>,
}

/// Class and provider defaults used to interpret declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressDefaults {
    pub default_class: String,
    pub supported_classes: Vec<String>,
    pub default_provider: String,
}

/// A routing declaration (an ingress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    #[serde(flatten)]
    pub key: ObjectKey,
    /// Volatile revision stamp, ignored when comparing content.
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub tls: Vec<TlsEntry>,
    #[serde(default)]
    pub rules: Vec<RouteRule>,
}

/// Why a declaration is left alone by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IgnoreReason {
    #[error("ingress class '{0}' is not supported")]
    UnsupportedClass(String),

    #[error("missing annotation '{key}'", key = ANNOTATION_ENABLED)]
    NotAnnotated,

    #[error("annotation '{key}' is '{0}', not 'true'", key = ANNOTATION_ENABLED)]
    NotEnabled(String),
}

/// Requested ingress class is not in the supported list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ingress class '{class}' is not supported (supported: {})", .supported.join(", "))]
pub struct UnsupportedClass {
    pub class: String,
    pub supported: Vec<String>,
}

/// Match `class` case-insensitively against `supported`, returning the
/// lowercased class.
pub fn resolve_ingress_class(supported: &[String], class: &str) -> Result<String, UnsupportedClass> {
    let class = class.to_lowercase();
    if supported.iter().any(|s| s.to_lowercase() == class) {
        Ok(class)
    } else {
        Err(UnsupportedClass {
            class,
            supported: supported.to_vec(),
        })
    }
}

impl RoutingRule {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: ObjectKey::new(namespace, name),
            resource_version: String::new(),
            annotations: BTreeMap::new(),
            tls: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_tls<S: Into<String>>(mut self, secret_name: impl Into<String>, hosts: Vec<S>) -> Self {
        self.tls.push(TlsEntry {
            hosts: hosts.into_iter().map(Into::into).collect(),
            secret_name: secret_name.into(),
        });
        self
    }

    pub fn namespace(&self) -> &str {
        &self.key.namespace
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Routing class: the class annotation if set, else the default.
    pub fn ingress_class(&self, defaults: &IngressDefaults) -> String {
        self.annotation(ANNOTATION_INGRESS_CLASS)
            .unwrap_or(defaults.default_class.as_str())
            .to_lowercase()
    }

    /// Provider name: the provider annotation if set, else the default.
    pub fn provider(&self, defaults: &IngressDefaults) -> String {
        self.annotation(ANNOTATION_INGRESS_PROVIDER)
            .unwrap_or(defaults.default_provider.as_str())
            .to_lowercase()
    }

    /// `Some(reason)` when the controller must not act on this declaration.
    pub fn ignore_reason(&self, defaults: &IngressDefaults) -> Option<IgnoreReason> {
        let class = self.ingress_class(defaults);
        if resolve_ingress_class(&defaults.supported_classes, &class).is_err() {
            return Some(IgnoreReason::UnsupportedClass(class));
        }

        match self.annotations.get(ANNOTATION_ENABLED) {
            None => Some(IgnoreReason::NotAnnotated),
            Some(v) if v == "true" => None,
            Some(v) => Some(IgnoreReason::NotEnabled(v.clone())),
        }
    }

    /// TLS requirements in declaration order, hosts lowercased.
    pub fn tls_specs(&self) -> Vec<TlsSpec> {
        self.tls
            .iter()
            .map(|entry| TlsSpec {
                rule: self.key.clone(),
                secret: ObjectKey::new(self.key.namespace.clone(), entry.secret_name.clone()),
                hosts: normalize_hosts(&entry.hosts),
            })
            .collect()
    }

    /// Structural equality ignoring `resource_version`.
    pub fn same_content(&self, other: &RoutingRule) -> bool {
        self.key == other.key
            && self.annotations == other.annotations
            && self.tls == other.tls
            && self.rules == other.rules
    }
}

/// One TLS requirement: a host set and the secret it is persisted into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSpec {
    /// Declaration the requirement came from.
    pub rule: ObjectKey,
    /// Secret key, always in the declaration's namespace.
    pub secret: ObjectKey,
    pub hosts: Vec<String>,
}

impl TlsSpec {
    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> IngressDefaults {
        IngressDefaults {
            default_class: "nginx".to_string(),
            supported_classes: vec!["nginx".to_string(), "gce".to_string(), "custom".to_string()],
            default_provider: "nginx".to_string(),
        }
    }

    fn enabled_rule() -> RoutingRule {
        RoutingRule::new("default", "web").with_annotation(ANNOTATION_ENABLED, "true")
    }

    #[test]
    fn test_tls_specs() {
        let rule = enabled_rule()
            .with_tls("secret1", vec!["domain1", "domain2"])
            .with_tls("secret2", vec!["domain3"]);

        let specs = rule.tls_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].secret, ObjectKey::new("default", "secret1"));
        assert_eq!(specs[0].hosts, vec!["domain1", "domain2"]);
        assert_eq!(specs[1].secret, ObjectKey::new("default", "secret2"));
        assert_eq!(specs[1].hosts, vec!["domain3"]);
        assert_eq!(specs[1].rule, ObjectKey::new("default", "web"));
    }

    #[test]
    fn test_tls_specs_lowercase_hosts() {
        let rule = enabled_rule().with_tls("secret", vec!["WWW.Example.com"]);
        assert_eq!(rule.tls_specs()[0].hosts, vec!["www.example.com"]);
    }

    #[test]
    fn test_resolve_ingress_class() {
        let supported = defaults().supported_classes;
        assert_eq!(resolve_ingress_class(&supported, "Nginx").unwrap(), "nginx");
        assert_eq!(resolve_ingress_class(&supported, "gce").unwrap(), "gce");
        assert!(resolve_ingress_class(&supported, "customlb").is_err());
    }

    #[test]
    fn test_provider_resolution() {
        let d = defaults();
        assert_eq!(enabled_rule().provider(&d), "nginx");

        let rule = enabled_rule().with_annotation(ANNOTATION_INGRESS_PROVIDER, "Nginx");
        assert_eq!(rule.provider(&d), "nginx");

        let rule = enabled_rule().with_annotation(ANNOTATION_INGRESS_PROVIDER, "GCE");
        assert_eq!(rule.provider(&d), "gce");

        let rule = enabled_rule().with_annotation(ANNOTATION_INGRESS_PROVIDER, "");
        assert_eq!(rule.provider(&d), "nginx");
    }

    #[test]
    fn test_ignore_reason() {
        let d = defaults();
        assert_eq!(enabled_rule().ignore_reason(&d), None);

        let rule = RoutingRule::new("default", "web");
        assert_eq!(rule.ignore_reason(&d), Some(IgnoreReason::NotAnnotated));

        let rule = RoutingRule::new("default", "web").with_annotation(ANNOTATION_ENABLED, "false");
        assert_eq!(
            rule.ignore_reason(&d),
            Some(IgnoreReason::NotEnabled("false".to_string()))
        );

        let rule = enabled_rule().with_annotation(ANNOTATION_INGRESS_CLASS, "Traefik");
        assert_eq!(
            rule.ignore_reason(&d),
            Some(IgnoreReason::UnsupportedClass("traefik".to_string()))
        );

        let rule = enabled_rule().with_annotation(ANNOTATION_INGRESS_CLASS, "GCE");
        assert_eq!(rule.ignore_reason(&d), None);
    }

    #[test]
    fn test_same_content_ignores_resource_version() {
        let mut a = enabled_rule().with_tls("secret", vec!["a.example.com"]);
        let mut b = a.clone();
        a.resource_version = "1".to_string();
        b.resource_version = "2".to_string();
        assert!(a.same_content(&b));

        b.tls[0].hosts.push("b.example.com".to_string());
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_rule_json_shape() {
        let json = r#"{
            "namespace": "shop",
            "name": "frontend",
            "annotations": {"kubernetes.io/tls-acme": "true"},
            "tls": [{"hosts": ["Shop.example.com"], "secretName": "shop-tls"}],
            "rules": [{"host": "shop.example.com", "paths": [{"path": "/", "serviceName": "web", "servicePort": 80}]}]
        }"#;
        let rule: RoutingRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.key, ObjectKey::new("shop", "frontend"));
        assert_eq!(rule.resource_version, "");
        assert_eq!(rule.tls[0].secret_name, "shop-tls");
        assert_eq!(rule.rules[0].paths[0].service_port, 80);
        assert_eq!(rule.tls_specs()[0].hosts, vec!["shop.example.com"]);
    }
}
