//! Configuration for Certwarden
//!
//! Loads the controller configuration from KDL (or JSON) and validates it.
//! The loaded value is immutable for the lifetime of the process.
//!
//! # Module Organization
//!
//! - [`controller`]: controller, store and issuer sections
//! - [`validate`]: validation and linting
//! - `kdl`: KDL format parsing
//!
//! # Example
//!
//! ```kdl
//! controller {
//!     watch-namespace ""
//!     resync-interval-secs 60
//!     minimum-validity-days 30
//!     default-ingress-class "nginx"
//!     default-provider "nginx"
//!     supported-ingress-classes "nginx" "gce"
//!     supported-providers "nginx" "gce"
//!     host-filters ".*\\.internal$"
//! }
//! store {
//!     path "/var/lib/certwarden"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod controller;
mod kdl;
pub mod validate;

pub use controller::{parse_host_filter_list, ControllerConfig, IssuerConfig, StoreConfig};
pub use validate::{validate_config, ErrorCategory, ValidationError, ValidationResult, ValidationWarning};

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Parse(String),

    #[error("unsupported config format '{0}' (expected .kdl or .json)")]
    UnsupportedFormat(String),

    #[error("unknown top-level configuration block '{0}' (valid blocks: controller, store, issuer)")]
    UnknownBlock(String),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("invalid host filter '{pattern}': {source}")]
    InvalidHostFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("configuration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub store: StoreConfig,
    pub issuer: IssuerConfig,
}

impl Config {
    /// Load configuration from a file, picking the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("kdl");

        match extension {
            "kdl" => Self::from_kdl(&content),
            "json" => Self::from_json(&content),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Parse configuration from KDL format
    pub fn from_kdl(content: &str) -> Result<Self, ConfigError> {
        let doc: ::kdl::KdlDocument = content
            .parse()
            .map_err(|e: ::kdl::KdlError| ConfigError::Parse(render_kdl_error(content, &e)))?;

        kdl::parse_kdl_document(doc)
    }

    /// Parse configuration from JSON format
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("JSON configuration parse error: {}", e)))
    }

    /// Validate the configuration, failing on any error.
    pub fn validate(&self) -> Result<ValidationResult, ConfigError> {
        let result = validate_config(self);
        if result.is_valid() {
            Ok(result)
        } else {
            Err(ConfigError::Validation(
                result.errors.iter().map(|e| e.to_string()).collect(),
            ))
        }
    }
}

fn render_kdl_error(content: &str, e: &::kdl::KdlError) -> String {
    use miette::Diagnostic;

    let mut error_msg = String::from("KDL configuration parse error:\n\n");
    let lines: Vec<&str> = content.lines().collect();
    let mut found_details = false;

    if let Some(related) = e.related() {
        for diagnostic in related {
            error_msg.push_str(&format!("  {}\n", diagnostic));
            found_details = true;

            if let Some(labels) = diagnostic.labels() {
                for label in labels {
                    let (line, col) = kdl::offset_to_line_col(content, label.offset());
                    error_msg.push_str(&format!("\n  --> at line {}, column {}\n", line, col));

                    if let Some(line_content) = lines.get(line.saturating_sub(1)) {
                        error_msg.push_str(&format!("{:>4} | {}\n", line, line_content));
                        error_msg.push_str(&format!("     | {}^", " ".repeat(col.saturating_sub(1))));
                        if let Some(label_msg) = label.label() {
                            error_msg.push_str(&format!(" {}", label_msg));
                        }
                        error_msg.push('\n');
                    }
                }
            }

            if let Some(help) = diagnostic.help() {
                error_msg.push_str(&format!("\n  Help: {}\n", help));
            }
        }
    }

    if !found_details {
        error_msg.push_str(&format!("  {}\n", e));
    }

    error_msg
}
