//! KDL configuration parsing.
//!
//! - `helpers`: Common parsing utility functions
//! - block parsers for `controller`, `store` and `issuer`

mod helpers;

pub use helpers::{
    get_int_entry, get_string_args, get_string_entry, get_u64_entry, offset_to_line_col,
};

use std::path::PathBuf;
use tracing::trace;

use crate::controller::{ControllerConfig, IssuerConfig, StoreConfig};
use crate::{Config, ConfigError};

/// Convert a parsed KDL document to Config
pub fn parse_kdl_document(doc: kdl::KdlDocument) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "controller" => {
                config.controller = parse_controller_config(node)?;
            }
            "store" => {
                config.store = parse_store_config(node)?;
            }
            "issuer" => {
                config.issuer = parse_issuer_config(node)?;
            }
            other => return Err(ConfigError::UnknownBlock(other.to_string())),
        }
    }

    Ok(config)
}

/// Parse controller configuration block
pub fn parse_controller_config(node: &kdl::KdlNode) -> Result<ControllerConfig, ConfigError> {
    trace!("Parsing controller configuration block");

    let defaults = ControllerConfig::default();
    let config = ControllerConfig {
        watch_namespace: get_string_entry(node, "watch-namespace")
            .unwrap_or(defaults.watch_namespace),
        resync_interval_secs: get_u64_entry(node, "resync-interval-secs")?
            .unwrap_or(defaults.resync_interval_secs),
        minimum_validity_days: get_u64_entry(node, "minimum-validity-days")?
            .unwrap_or(defaults.minimum_validity_days),
        default_ingress_class: get_string_entry(node, "default-ingress-class")
            .unwrap_or(defaults.default_ingress_class),
        default_provider: get_string_entry(node, "default-provider")
            .unwrap_or(defaults.default_provider),
        supported_ingress_classes: get_string_args(node, "supported-ingress-classes")
            .unwrap_or(defaults.supported_ingress_classes),
        supported_providers: get_string_args(node, "supported-providers")
            .unwrap_or(defaults.supported_providers),
        host_filters: get_string_args(node, "host-filters").unwrap_or(defaults.host_filters),
    };

    trace!(
        watch_namespace = %config.watch_namespace,
        resync_interval_secs = config.resync_interval_secs,
        minimum_validity_days = config.minimum_validity_days,
        host_filters = config.host_filters.len(),
        "Parsed controller configuration"
    );

    Ok(config)
}

/// Parse store configuration block
pub fn parse_store_config(node: &kdl::KdlNode) -> Result<StoreConfig, ConfigError> {
    let defaults = StoreConfig::default();
    Ok(StoreConfig {
        path: get_string_entry(node, "path")
            .map(PathBuf::from)
            .unwrap_or(defaults.path),
    })
}

/// Parse issuer configuration block
pub fn parse_issuer_config(node: &kdl::KdlNode) -> Result<IssuerConfig, ConfigError> {
    let defaults = IssuerConfig::default();
    Ok(IssuerConfig {
        validity_days: get_u64_entry(node, "validity-days")?.unwrap_or(defaults.validity_days),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Config, ConfigError> {
        let doc: kdl::KdlDocument = content.parse().unwrap();
        parse_kdl_document(doc)
    }

    #[test]
    fn test_parse_full_document() {
        let config = parse(
            r#"
            controller {
                watch-namespace "shop"
                resync-interval-secs 120
                minimum-validity-days 21
                default-ingress-class "gce"
                default-provider "gce"
                supported-ingress-classes "nginx" "gce" "custom"
                supported-providers "nginx" "gce"
                host-filters ".*\\.internal$" "^\\*\\..*"
            }
            store {
                path "/tmp/certwarden"
            }
            issuer {
                validity-days 30
            }
            "#,
        )
        .unwrap();

        assert_eq!(config.controller.watch_namespace, "shop");
        assert_eq!(config.controller.resync_interval_secs, 120);
        assert_eq!(config.controller.minimum_validity_days, 21);
        assert_eq!(config.controller.default_ingress_class, "gce");
        assert_eq!(
            config.controller.supported_ingress_classes,
            vec!["nginx", "gce", "custom"]
        );
        assert_eq!(
            config.controller.host_filters,
            vec![r".*\.internal$", r"^\*\..*"]
        );
        assert_eq!(config.store.path, PathBuf::from("/tmp/certwarden"));
        assert_eq!(config.issuer.validity_days, 30);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = parse("controller {\n}\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_block_rejected() {
        match parse("listeners {\n}\n") {
            Err(ConfigError::UnknownBlock(name)) => assert_eq!(name, "listeners"),
            other => panic!("expected UnknownBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_integer_rejected() {
        let result = parse("controller {\n    resync-interval-secs -5\n}\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_offset_to_line_col() {
        let content = "a\nbc\nd";
        assert_eq!(offset_to_line_col(content, 0), (1, 1));
        assert_eq!(offset_to_line_col(content, 3), (2, 2));
        assert_eq!(offset_to_line_col(content, 5), (3, 1));
    }
}
