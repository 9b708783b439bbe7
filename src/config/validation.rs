//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (retry intervals, budgets)
//! - Require certificate material location under mutual TLS
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AgentConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::IpAddr;

use thiserror::Error;

use crate::config::schema::AgentConfig;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("retry.max_retries must be at least 1")]
    NoRetries,

    #[error("retry.initial_interval_ms must be greater than zero")]
    ZeroInterval,

    #[error("retry.max_interval_ms ({max}) is below retry.initial_interval_ms ({initial})")]
    IntervalOrder { initial: u64, max: u64 },

    #[error("node.ip_address '{0}' is not an IP address")]
    InvalidNodeIp(String),
}

pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.mesh.service_cluster.trim().is_empty() {
        errors.push(ValidationError::Empty("mesh.service_cluster"));
    }
    if config.mesh.mutual_tls() && config.mesh.auth_certs_path.trim().is_empty() {
        errors.push(ValidationError::Empty("mesh.auth_certs_path"));
    }
    if config.runner.binary_path.trim().is_empty() {
        errors.push(ValidationError::Empty("runner.binary_path"));
    }
    if config.runner.config_dir.trim().is_empty() {
        errors.push(ValidationError::Empty("runner.config_dir"));
    }
    if config.runner.file_prefix.trim().is_empty() {
        errors.push(ValidationError::Empty("runner.file_prefix"));
    }

    let retry = &config.retry;
    if retry.max_retries == 0 {
        errors.push(ValidationError::NoRetries);
    }
    if retry.initial_interval_ms == 0 {
        errors.push(ValidationError::ZeroInterval);
    }
    if retry.max_interval_ms < retry.initial_interval_ms {
        errors.push(ValidationError::IntervalOrder {
            initial: retry.initial_interval_ms,
            max: retry.max_interval_ms,
        });
    }

    if config.node.ip_address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidNodeIp(config.node.ip_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
