//! Configuration validation and linting.

use std::fmt;

use certwarden_common::resolve_ingress_class;

use crate::Config;

/// Upper bound for day counts (about 100 years).
pub const MAX_VALIDITY_DAYS: u64 = 36_500;

/// Validation error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Out-of-range scalar value
    Value,
    /// Default not present in its supported list
    Logic,
    /// Host filter pattern does not compile
    HostFilter,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Value => write!(f, "Value"),
            ErrorCategory::Logic => write!(f, "Logic"),
            ErrorCategory::HostFilter => write!(f, "HostFilter"),
        }
    }
}

/// Validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Validation result containing errors and warnings
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a configuration for errors and questionable settings.
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    let controller = &config.controller;

    if controller.resync_interval_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Value,
            "resync-interval-secs must be greater than zero",
        ));
    }

    if controller.minimum_validity_days == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Value,
            "minimum-validity-days must be greater than zero",
        ));
    } else if controller.minimum_validity_days > MAX_VALIDITY_DAYS {
        result.add_error(ValidationError::new(
            ErrorCategory::Value,
            format!(
                "minimum-validity-days must be at most {}, got {}",
                MAX_VALIDITY_DAYS, controller.minimum_validity_days
            ),
        ));
    }

    if config.issuer.validity_days == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Value,
            "issuer validity-days must be greater than zero",
        ));
    } else if config.issuer.validity_days > MAX_VALIDITY_DAYS {
        result.add_error(ValidationError::new(
            ErrorCategory::Value,
            format!(
                "issuer validity-days must be at most {}, got {}",
                MAX_VALIDITY_DAYS, config.issuer.validity_days
            ),
        ));
    } else if config.issuer.validity_days <= controller.minimum_validity_days {
        result.add_warning(ValidationWarning::new(format!(
            "issuer validity ({} days) does not exceed minimum-validity-days ({}); \
             every pass will renew issued certificates",
            config.issuer.validity_days, controller.minimum_validity_days
        )));
    }

    if controller.supported_ingress_classes.is_empty() {
        result.add_error(ValidationError::new(
            ErrorCategory::Logic,
            "supported-ingress-classes must not be empty",
        ));
    } else if let Err(e) = resolve_ingress_class(
        &controller.supported_ingress_classes,
        &controller.default_ingress_class,
    ) {
        result.add_error(ValidationError::new(
            ErrorCategory::Logic,
            format!("default-ingress-class: {}", e),
        ));
    }

    if controller.supported_providers.is_empty() {
        result.add_error(ValidationError::new(
            ErrorCategory::Logic,
            "supported-providers must not be empty",
        ));
    } else if !controller
        .supported_providers
        .iter()
        .any(|p| p.eq_ignore_ascii_case(&controller.default_provider))
    {
        result.add_error(ValidationError::new(
            ErrorCategory::Logic,
            format!(
                "default-provider '{}' is not one of the supported providers ({})",
                controller.default_provider,
                controller.supported_providers.join(", ")
            ),
        ));
    }

    for pattern in &controller.host_filters {
        if let Err(e) = regex::Regex::new(pattern) {
            result.add_error(ValidationError::new(
                ErrorCategory::HostFilter,
                format!("host filter '{}' is not a valid regular expression: {}", pattern, e),
            ));
        }
    }

    if controller.namespace().is_none() {
        result.add_warning(ValidationWarning::new(
            "watch-namespace is empty; routing declarations in all namespaces are watched",
        ));
    }

    result
}
