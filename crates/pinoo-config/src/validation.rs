// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are within valid ranges and consistent with
//! each other before a session is built from them.

use crate::{ConfigError, ConfigResult, PinooConfig};
use uuid::Uuid;

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Required fields
/// - GATT identifiers
/// - Timing values and their relationships
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation found
pub fn validate_config(config: &PinooConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_link_identifiers(config, &mut errors);
    validate_timing(config, &mut errors);
    validate_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_required_fields(config: &PinooConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.peripheral.name_prefix.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "peripheral.name_prefix".to_string(),
        });
    }
    if config.simulator.peripheral_name.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "simulator.peripheral_name".to_string(),
        });
    }
}

fn validate_link_identifiers(config: &PinooConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.link.service_id == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "link.service_id".to_string(),
            reason: "must be non-zero".to_string(),
        });
    }

    let write = parse_uuid("link.write_characteristic", &config.link.write_characteristic, errors);
    let notify = parse_uuid(
        "link.notify_characteristic",
        &config.link.notify_characteristic,
        errors,
    );
    if let (Some(write), Some(notify)) = (write, notify) {
        if write == notify {
            errors.push(ConfigValidationError::InvalidValue {
                field: "link.notify_characteristic".to_string(),
                reason: "must differ from link.write_characteristic".to_string(),
            });
        }
    }
}

fn parse_uuid(field: &str, value: &str, errors: &mut Vec<ConfigValidationError>) -> Option<Uuid> {
    match Uuid::parse_str(value) {
        Ok(uuid) => Some(uuid),
        Err(e) => {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("not a UUID ({})", e),
            });
            None
        }
    }
}

fn validate_timing(config: &PinooConfig, errors: &mut Vec<ConfigValidationError>) {
    let positive = [
        ("timing.watchdog_interval_ms", config.timing.watchdog_interval_ms),
        ("timing.busy_grace_period_ms", config.timing.busy_grace_period_ms),
        ("timing.send_interval_ms", config.timing.send_interval_ms),
        (
            "simulator.telemetry_interval_ms",
            config.simulator.telemetry_interval_ms,
        ),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: "must be positive".to_string(),
            });
        }
    }

    // A simulator slower than the watchdog would trip it on every frame gap.
    if config.simulator.telemetry_interval_ms >= config.timing.watchdog_interval_ms {
        errors.push(ConfigValidationError::InvalidValue {
            field: "simulator.telemetry_interval_ms".to_string(),
            reason: format!(
                "must be below timing.watchdog_interval_ms ({})",
                config.timing.watchdog_interval_ms
            ),
        });
    }
}

fn validate_logging(config: &PinooConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.logging.format != "text" && config.logging.format != "json" {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: "must be 'text' or 'json'".to_string(),
        });
    }
}
