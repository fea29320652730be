// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later tiers win:
//! 1. TOML file (base values)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, PinooConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "pinoo_configuration.toml";

/// Find the pinoo configuration file
///
/// Search order:
/// 1. `PINOO_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to five parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("PINOO_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by PINOO_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet PINOO_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<PinooConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: PinooConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Like [`load_config`], but starts from built-in defaults when no file exists
///
/// An explicitly given `config_path` that does not exist is still an error.
pub fn load_config_or_default(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<PinooConfig> {
    if config_path.is_some() {
        return load_config(config_path, cli_args);
    }
    match find_config_file() {
        Ok(path) => load_config(Some(&path), cli_args),
        Err(ConfigError::FileNotFound(_)) if env::var("PINOO_CONFIG_PATH").is_err() => {
            let mut config = PinooConfig::default();
            apply_environment_overrides(&mut config);
            if let Some(cli) = cli_args {
                apply_cli_overrides(&mut config, cli);
            }
            Ok(config)
        }
        Err(e) => Err(e),
    }
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `PINOO_PERIPHERAL_KIND` -> `peripheral.kind`
/// - `PINOO_NAME_PREFIX` -> `peripheral.name_prefix`
/// - `PINOO_LINK_ENCODING` -> `link.encoding`
/// - `PINOO_WATCHDOG_INTERVAL_MS` -> `timing.watchdog_interval_ms`
/// - `PINOO_BUSY_GRACE_PERIOD_MS` -> `timing.busy_grace_period_ms`
/// - `PINOO_SEND_INTERVAL_MS` -> `timing.send_interval_ms`
/// - `PINOO_SIM_TELEMETRY_INTERVAL_MS` -> `simulator.telemetry_interval_ms`
/// - `PINOO_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut PinooConfig) {
    let vars: HashMap<String, String> = [
        ("PINOO_PERIPHERAL_KIND", "peripheral_kind"),
        ("PINOO_NAME_PREFIX", "name_prefix"),
        ("PINOO_LINK_ENCODING", "encoding"),
        ("PINOO_WATCHDOG_INTERVAL_MS", "watchdog_interval_ms"),
        ("PINOO_BUSY_GRACE_PERIOD_MS", "busy_grace_period_ms"),
        ("PINOO_SEND_INTERVAL_MS", "send_interval_ms"),
        ("PINOO_SIM_TELEMETRY_INTERVAL_MS", "telemetry_interval_ms"),
        ("PINOO_LOG_LEVEL", "log_level"),
    ]
    .iter()
    .filter_map(|(var, key)| env::var(var).ok().map(|value| (key.to_string(), value)))
    .collect();

    apply_cli_overrides(config, &vars);
}

/// Apply CLI argument overrides to configuration
///
/// Values that fail to parse are ignored and the previous value is kept.
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of override keys (e.g., `{"watchdog_interval_ms": "3000"}`)
pub fn apply_cli_overrides(config: &mut PinooConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("peripheral_kind") {
        if let Ok(kind) = value.parse() {
            config.peripheral.kind = kind;
        }
    }
    if let Some(value) = cli_args.get("name_prefix") {
        config.peripheral.name_prefix = value.clone();
    }
    if let Some(value) = cli_args.get("encoding") {
        if let Ok(encoding) = value.parse() {
            config.link.encoding = encoding;
        }
    }

    if let Some(value) = cli_args.get("watchdog_interval_ms") {
        if let Ok(ms) = value.parse::<u64>() {
            config.timing.watchdog_interval_ms = ms;
        }
    }
    if let Some(value) = cli_args.get("busy_grace_period_ms") {
        if let Ok(ms) = value.parse::<u64>() {
            config.timing.busy_grace_period_ms = ms;
        }
    }
    if let Some(value) = cli_args.get("send_interval_ms") {
        if let Ok(ms) = value.parse::<u64>() {
            config.timing.send_interval_ms = ms;
        }
    }
    if let Some(value) = cli_args.get("telemetry_interval_ms") {
        if let Ok(ms) = value.parse::<u64>() {
            config.simulator.telemetry_interval_ms = ms;
        }
    }

    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}
