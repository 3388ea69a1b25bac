// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `MODEL_OTA_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MODEL_OTA_MOUNT_POINT` | `/sdcard` | Artifact storage directory |
//! | `MODEL_OTA_SELECTION_FILE` | `<mount>/selected_model` | Persisted selection record |
//! | `MODEL_OTA_SELECTION_WRITE` | `replace` | `replace` or `atomic` |
//! | `MODEL_OTA_MODEL_PACKAGE` | `model` | Package holding the model |
//! | `MODEL_OTA_EXTRA_PACKAGES` | (empty) | Comma-separated extra packages |
//! | `MODEL_OTA_MAX_PACKAGE_NAME_LEN` | 63 | Max package name length |
//! | `MODEL_OTA_MAX_COMPONENTS` | 4 | Download queue capacity |
//! | `MODEL_OTA_MAX_HEADER_LEN` | 128 | Max model header length (bytes) |
//! | `MODEL_OTA_MAX_LABELS` | 8 | Max labels per model |
//! | `MODEL_OTA_POLL_INTERVAL_MS` | 5000 | Main loop period |
//! | `MODEL_OTA_RESTART_ON_SWAP` | `true` | Restart instead of swapping in place |
//! | `MODEL_OTA_SOURCE_DIR` | (unset) | Local release directory for `run` |
//! | `MODEL_OTA_BLOCK_SIZE` | 1024 | Local transfer block size (bytes) |
//! | `MODEL_OTA_LOG_LEVEL` | `info` | Log filter directive |
//! | `MODEL_OTA_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `MODEL_OTA_LOG_FILE` | (unset) | Write logs to this file |

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{LoaderConfig, WriteMode, HEADER_END, HEADER_START};
use crate::ota::{DownloadQueueConfig, ListenerConfig, WorkerConfig, DEFAULT_BLOCK_SIZE};
use crate::telemetry::{LogConfig, LogFormat};
use crate::RuntimeConfig;

pub const SELECTION_FILE_NAME: &str = "selected_model";

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub mount_point: String,
    pub selection_file: String,
    pub selection_write: String,
    pub model_package: String,
    pub extra_packages: Vec<String>,
    pub max_package_name_len: usize,
    pub max_components: usize,
    pub max_header_len: usize,
    pub max_labels: usize,
    pub poll_interval_ms: u64,
    pub restart_on_swap: bool,
    pub source_dir: Option<String>,
    pub block_size: usize,
    pub log_level: String,
    pub log_format: String,
    pub log_file: Option<String>,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub worker: WorkerConfig,
    pub listener: ListenerConfig,
    pub queue: DownloadQueueConfig,
    pub loader: LoaderConfig,
    pub selection_file: PathBuf,
    pub selection_write: WriteMode,
    pub poll_interval: Duration,
    pub restart_on_swap: bool,
    pub source_dir: Option<PathBuf>,
    pub block_size: usize,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).map(|v| v.to_ascii_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Non-empty string env var.
fn parse_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_list(key: &str) -> Vec<String> {
    parse_string(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Load package filter configuration from environment.
fn load_listener_config() -> ListenerConfig {
    let defaults = ListenerConfig::default();
    let model_package = parse_string("MODEL_OTA_MODEL_PACKAGE").unwrap_or(defaults.model_package);
    let max_package_name_len =
        parse_usize("MODEL_OTA_MAX_PACKAGE_NAME_LEN", defaults.max_package_name_len).max(1);
    ListenerConfig {
        model_package,
        extra_packages: parse_list("MODEL_OTA_EXTRA_PACKAGES"),
        max_package_name_len,
    }
}

/// Load model loader limits from environment.
fn load_loader_config() -> LoaderConfig {
    let defaults = LoaderConfig::default();
    // floor: both sentinels plus the newline
    let min_header = HEADER_START.len() + HEADER_END.len() + 1;
    let max_header_len = parse_usize("MODEL_OTA_MAX_HEADER_LEN", defaults.max_header_len).max(min_header);
    let max_labels = parse_usize("MODEL_OTA_MAX_LABELS", defaults.max_labels).max(1);
    LoaderConfig { max_header_len, max_labels }
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let format = parse_string("MODEL_OTA_LOG_FORMAT")
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or(defaults.format);
    LogConfig {
        format,
        level: parse_string("MODEL_OTA_LOG_LEVEL").unwrap_or(defaults.level),
        output_path: parse_string("MODEL_OTA_LOG_FILE").map(PathBuf::from),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let listener = load_listener_config();

    let mount_point = parse_string("MODEL_OTA_MOUNT_POINT")
        .map(PathBuf::from)
        .unwrap_or_else(|| WorkerConfig::default().mount_point);
    let worker = WorkerConfig {
        mount_point: mount_point.clone(),
        model_package: listener.model_package.clone(),
    };

    let selection_file = parse_string("MODEL_OTA_SELECTION_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| mount_point.join(SELECTION_FILE_NAME));
    let selection_write = parse_string("MODEL_OTA_SELECTION_WRITE")
        .and_then(|v| v.parse::<WriteMode>().ok())
        .unwrap_or_default();

    let capacity = parse_usize("MODEL_OTA_MAX_COMPONENTS", DownloadQueueConfig::default().capacity).max(1);
    let poll_ms = parse_u64("MODEL_OTA_POLL_INTERVAL_MS", 5000).max(100);

    EnvConfig {
        worker,
        listener,
        queue: DownloadQueueConfig { capacity },
        loader: load_loader_config(),
        selection_file,
        selection_write,
        poll_interval: Duration::from_millis(poll_ms),
        restart_on_swap: parse_bool("MODEL_OTA_RESTART_ON_SWAP", true),
        source_dir: parse_string("MODEL_OTA_SOURCE_DIR").map(PathBuf::from),
        block_size: parse_usize("MODEL_OTA_BLOCK_SIZE", DEFAULT_BLOCK_SIZE).max(1),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Configuration for [`crate::Runtime::new`].
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            worker: self.worker.clone(),
            listener: self.listener.clone(),
            queue: self.queue.clone(),
            loader: self.loader.clone(),
            selection_file: self.selection_file.clone(),
            selection_write: self.selection_write,
            restart_on_swap: self.restart_on_swap,
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            mount_point: self.worker.mount_point.display().to_string(),
            selection_file: self.selection_file.display().to_string(),
            selection_write: match self.selection_write {
                WriteMode::Replace => "replace".into(),
                WriteMode::Atomic => "atomic".into(),
            },
            model_package: self.listener.model_package.clone(),
            extra_packages: self.listener.extra_packages.clone(),
            max_package_name_len: self.listener.max_package_name_len,
            max_components: self.queue.capacity,
            max_header_len: self.loader.max_header_len,
            max_labels: self.loader.max_labels,
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            restart_on_swap: self.restart_on_swap,
            source_dir: self.source_dir.as_ref().map(|p| p.display().to_string()),
            block_size: self.block_size,
            log_level: self.log.level.clone(),
            log_format: match self.log.format {
                LogFormat::Json => "json".into(),
                LogFormat::Pretty => "pretty".into(),
            },
            log_file: self.log.output_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) const ENV_KEYS: &[&str] = &[
        "MODEL_OTA_MOUNT_POINT",
        "MODEL_OTA_SELECTION_FILE",
        "MODEL_OTA_SELECTION_WRITE",
        "MODEL_OTA_MODEL_PACKAGE",
        "MODEL_OTA_EXTRA_PACKAGES",
        "MODEL_OTA_MAX_PACKAGE_NAME_LEN",
        "MODEL_OTA_MAX_COMPONENTS",
        "MODEL_OTA_MAX_HEADER_LEN",
        "MODEL_OTA_MAX_LABELS",
        "MODEL_OTA_POLL_INTERVAL_MS",
        "MODEL_OTA_RESTART_ON_SWAP",
        "MODEL_OTA_SOURCE_DIR",
        "MODEL_OTA_BLOCK_SIZE",
        "MODEL_OTA_LOG_LEVEL",
        "MODEL_OTA_LOG_FORMAT",
        "MODEL_OTA_LOG_FILE",
    ];

    pub(crate) fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.worker.mount_point, PathBuf::from("/sdcard"));
        assert_eq!(cfg.selection_file, PathBuf::from("/sdcard/selected_model"));
        assert_eq!(cfg.selection_write, WriteMode::Replace);
        assert_eq!(cfg.listener.model_package, "model");
        assert!(cfg.listener.extra_packages.is_empty());
        assert_eq!(cfg.listener.max_package_name_len, 63);
        assert_eq!(cfg.queue.capacity, 4);
        assert_eq!(cfg.loader.max_header_len, 128);
        assert_eq!(cfg.loader.max_labels, 8);
        assert_eq!(cfg.poll_interval, Duration::from_millis(5000));
        assert!(cfg.restart_on_swap);
        assert!(cfg.source_dir.is_none());
        assert_eq!(cfg.block_size, 1024);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MODEL_OTA_MOUNT_POINT", "/mnt/card");
        std::env::set_var("MODEL_OTA_MAX_COMPONENTS", "8");
        std::env::set_var("MODEL_OTA_EXTRA_PACKAGES", "labels, audio ,");
        std::env::set_var("MODEL_OTA_SELECTION_WRITE", "atomic");
        std::env::set_var("MODEL_OTA_RESTART_ON_SWAP", "off");
        let cfg = load();
        assert_eq!(cfg.worker.mount_point, PathBuf::from("/mnt/card"));
        assert_eq!(cfg.selection_file, PathBuf::from("/mnt/card/selected_model"));
        assert_eq!(cfg.queue.capacity, 8);
        assert_eq!(cfg.listener.extra_packages, ["labels", "audio"]);
        assert_eq!(cfg.selection_write, WriteMode::Atomic);
        assert!(!cfg.restart_on_swap);
        clear_env_vars();
    }

    #[test]
    fn test_model_package_flows_to_worker() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MODEL_OTA_MODEL_PACKAGE", "kws");
        let cfg = load();
        assert_eq!(cfg.listener.model_package, "kws");
        assert_eq!(cfg.worker.model_package, "kws");
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MODEL_OTA_MAX_COMPONENTS", "lots");
        std::env::set_var("MODEL_OTA_SELECTION_WRITE", "sometimes");
        std::env::set_var("MODEL_OTA_RESTART_ON_SWAP", "maybe");
        let cfg = load();
        assert_eq!(cfg.queue.capacity, 4);
        assert_eq!(cfg.selection_write, WriteMode::Replace);
        assert!(cfg.restart_on_swap);
        clear_env_vars();
    }

    #[test]
    fn test_floors_are_applied() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MODEL_OTA_MAX_COMPONENTS", "0");
        std::env::set_var("MODEL_OTA_MAX_HEADER_LEN", "4");
        std::env::set_var("MODEL_OTA_POLL_INTERVAL_MS", "1");
        let cfg = load();
        assert_eq!(cfg.queue.capacity, 1);
        assert_eq!(cfg.loader.max_header_len, HEADER_START.len() + HEADER_END.len() + 1);
        assert_eq!(cfg.poll_interval, Duration::from_millis(100));
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_mirrors_env_config() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        let eff = cfg.effective_config();
        assert_eq!(eff.mount_point, "/sdcard");
        assert_eq!(eff.selection_write, "replace");
        assert_eq!(eff.max_components, cfg.queue.capacity);
        assert_eq!(eff.poll_interval_ms, 5000);
        assert!(eff.source_dir.is_none());
    }
}
