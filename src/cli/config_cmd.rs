// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.

use crate::config::{self, EffectiveConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show(json_output: bool) -> i32 {
    let cfg = config::load().effective_config();
    if json_output {
        return match serde_json::to_string_pretty(&cfg) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error serializing config: {}", e);
                1
            }
        };
    }
    for line in config_lines(&cfg) {
        println!("{}", line);
    }
    0
}

/// Print documented defaults (no env overrides) to stdout.
pub fn run_defaults() {
    println!("MODEL_OTA_MOUNT_POINT=/sdcard");
    println!("MODEL_OTA_SELECTION_FILE=/sdcard/selected_model");
    println!("MODEL_OTA_SELECTION_WRITE=replace");
    println!("MODEL_OTA_MODEL_PACKAGE=model");
    println!("MODEL_OTA_EXTRA_PACKAGES=");
    println!("MODEL_OTA_MAX_PACKAGE_NAME_LEN=63");
    println!("MODEL_OTA_MAX_COMPONENTS=4");
    println!("MODEL_OTA_MAX_HEADER_LEN=128");
    println!("MODEL_OTA_MAX_LABELS=8");
    println!("MODEL_OTA_POLL_INTERVAL_MS=5000");
    println!("MODEL_OTA_RESTART_ON_SWAP=true");
    println!("MODEL_OTA_SOURCE_DIR=");
    println!("MODEL_OTA_BLOCK_SIZE=1024");
    println!("MODEL_OTA_LOG_LEVEL=info");
    println!("MODEL_OTA_LOG_FORMAT=json");
    println!("MODEL_OTA_LOG_FILE=");
}

/// Collect misconfiguration warnings.
pub fn validate(cfg: &EffectiveConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if cfg.model_package.len() > cfg.max_package_name_len {
        warnings.push(format!(
            "MODEL_OTA_MODEL_PACKAGE ({} bytes) exceeds MODEL_OTA_MAX_PACKAGE_NAME_LEN ({}); no model will ever be accepted",
            cfg.model_package.len(),
            cfg.max_package_name_len
        ));
    }

    if cfg.extra_packages.iter().any(|p| p == &cfg.model_package) {
        warnings.push("MODEL_OTA_EXTRA_PACKAGES repeats the model package".to_string());
    }

    if cfg.source_dir.is_none() {
        warnings.push("MODEL_OTA_SOURCE_DIR is unset; `run` has no manifest source".to_string());
    }

    if !std::path::Path::new(&cfg.mount_point).is_dir() {
        warnings.push(format!("MODEL_OTA_MOUNT_POINT ({}) is not a directory", cfg.mount_point));
    }

    warnings
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let cfg = config::load().effective_config();
    let warnings = validate(&cfg);
    if warnings.is_empty() {
        println!("Configuration is valid.");
        return 0;
    }
    for w in &warnings {
        eprintln!("WARNING: {}", w);
    }
    1
}

fn config_lines(cfg: &EffectiveConfig) -> Vec<String> {
    vec![
        format!("MODEL_OTA_MOUNT_POINT={}", cfg.mount_point),
        format!("MODEL_OTA_SELECTION_FILE={}", cfg.selection_file),
        format!("MODEL_OTA_SELECTION_WRITE={}", cfg.selection_write),
        format!("MODEL_OTA_MODEL_PACKAGE={}", cfg.model_package),
        format!("MODEL_OTA_EXTRA_PACKAGES={}", cfg.extra_packages.join(",")),
        format!("MODEL_OTA_MAX_PACKAGE_NAME_LEN={}", cfg.max_package_name_len),
        format!("MODEL_OTA_MAX_COMPONENTS={}", cfg.max_components),
        format!("MODEL_OTA_MAX_HEADER_LEN={}", cfg.max_header_len),
        format!("MODEL_OTA_MAX_LABELS={}", cfg.max_labels),
        format!("MODEL_OTA_POLL_INTERVAL_MS={}", cfg.poll_interval_ms),
        format!("MODEL_OTA_RESTART_ON_SWAP={}", cfg.restart_on_swap),
        format!("MODEL_OTA_SOURCE_DIR={}", cfg.source_dir.as_deref().unwrap_or("")),
        format!("MODEL_OTA_BLOCK_SIZE={}", cfg.block_size),
        format!("MODEL_OTA_LOG_LEVEL={}", cfg.log_level),
        format!("MODEL_OTA_LOG_FORMAT={}", cfg.log_format),
        format!("MODEL_OTA_LOG_FILE={}", cfg.log_file.as_deref().unwrap_or("")),
    ]
}
