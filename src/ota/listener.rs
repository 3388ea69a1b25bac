// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Manifest listener.
//!
//! Invoked by the OTA client whenever a new manifest arrives. Runs in the
//! client's notification context, so it only filters components and hands
//! descriptors to the download queue. It never blocks and never touches the
//! loaded model or the selection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::queue::QueueProducer;
use crate::models::{ComponentDescriptor, Manifest, ManifestError};

/// Reserved package identifier of the model artifact.
pub const MODEL_PACKAGE_NAME: &str = "model";
pub const DEFAULT_MAX_PACKAGE_NAME_LEN: usize = 63;

/// Which packages the listener accepts.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Package holding the model artifact.
    pub model_package: String,
    /// Additional packages to download alongside the model.
    pub extra_packages: Vec<String>,
    pub max_package_name_len: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            model_package: MODEL_PACKAGE_NAME.to_string(),
            extra_packages: Vec::new(),
            max_package_name_len: DEFAULT_MAX_PACKAGE_NAME_LEN,
        }
    }
}

impl ListenerConfig {
    /// Case-sensitive match against the accepted package set.
    pub fn accepts(&self, package: &str) -> bool {
        package == self.model_package || self.extra_packages.iter().any(|p| p == package)
    }
}

/// Outcome of one manifest delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerReport {
    /// Descriptors placed on the queue.
    pub enqueued: usize,
    /// Components whose package is not accepted.
    pub skipped: usize,
    /// Components with an oversized or unusable name or version.
    pub rejected: usize,
    /// Accepted components lost to a full queue.
    pub dropped: usize,
}

/// Cumulative counters across deliveries.
#[derive(Debug, Default)]
struct ListenerStats {
    manifests: AtomicU64,
    invalid_manifests: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of [`ManifestListener`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStatsSnapshot {
    pub manifests: u64,
    pub invalid_manifests: u64,
    pub enqueued: u64,
    pub dropped: u64,
}

/// Filters manifest components onto the download queue.
#[derive(Debug, Clone)]
pub struct ManifestListener {
    producer: QueueProducer,
    config: Arc<ListenerConfig>,
    stats: Arc<ListenerStats>,
}

impl ManifestListener {
    pub fn new(producer: QueueProducer, config: ListenerConfig) -> Self {
        Self {
            producer,
            config: Arc::new(config),
            stats: Arc::new(ListenerStats::default()),
        }
    }

    /// Decode a raw manifest payload and process it.
    pub fn on_payload(&self, payload: &[u8]) -> ListenerReport {
        self.on_manifest(Manifest::from_json(payload))
    }

    /// Process a manifest delivery. Decoding errors are logged and ignored.
    pub fn on_manifest(&self, manifest: Result<Manifest, ManifestError>) -> ListenerReport {
        let mut report = ListenerReport::default();

        let manifest = match manifest {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "Error converting payload to manifest");
                self.stats.invalid_manifests.fetch_add(1, Ordering::Relaxed);
                return report;
            }
        };
        self.stats.manifests.fetch_add(1, Ordering::Relaxed);
        debug!(
            sequence = manifest.sequence_number,
            components = manifest.components.len(),
            "Manifest received"
        );

        for component in &manifest.components {
            info!(package = %component.package, version = %component.version, "Package found");

            let len = component.package.len();
            if len > self.config.max_package_name_len {
                error!(
                    len,
                    max = self.config.max_package_name_len,
                    "Package name too long"
                );
                report.rejected += 1;
                continue;
            }

            if !self.config.accepts(&component.package) {
                info!(package = %component.package, "Skipping download for package");
                report.skipped += 1;
                continue;
            }

            let descriptor =
                match ComponentDescriptor::from_component(component, self.config.max_package_name_len) {
                    Ok(d) => Box::new(d),
                    Err(e) => {
                        error!(package = %component.package, error = %e, "Component rejected");
                        report.rejected += 1;
                        continue;
                    }
                };

            match self.producer.try_enqueue(descriptor) {
                Ok(()) => {
                    info!(package = %component.package, version = %component.version, "Queued for download");
                    report.enqueued += 1;
                }
                Err(e) => {
                    warn!(package = %component.package, error = %e, "Failed to enqueue component");
                    report.dropped += 1;
                }
            }
        }

        self.stats.enqueued.fetch_add(report.enqueued as u64, Ordering::Relaxed);
        self.stats.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        report
    }

    pub fn stats(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            manifests: self.stats.manifests.load(Ordering::Relaxed),
            invalid_manifests: self.stats.invalid_manifests.load(Ordering::Relaxed),
            enqueued: self.stats.enqueued.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}
