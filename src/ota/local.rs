// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Directory-backed OTA transport.
//!
//! Serves manifests and artifacts from a local directory laid out like the
//! cloud release:
//!
//! ```text
//! <source>/manifest.json
//! <source>/<package>_<version>
//! ```
//!
//! Used by the `run` command for bench setups and by integration tests.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{Block, BlockSink, ClientError, OtaClient};
use super::listener::{ListenerReport, ManifestListener};
use crate::models::ComponentDescriptor;

pub const DEFAULT_BLOCK_SIZE: usize = 1024;
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Streams artifacts from a source directory in fixed-size blocks.
#[derive(Debug, Clone)]
pub struct LocalOtaClient {
    source_dir: PathBuf,
    block_size: usize,
}

impl LocalOtaClient {
    pub fn new(source_dir: impl Into<PathBuf>, block_size: usize) -> Self {
        Self { source_dir: source_dir.into(), block_size: block_size.max(1) }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.source_dir.join(MANIFEST_FILE_NAME)
    }
}

impl OtaClient for LocalOtaClient {
    fn download_component(
        &self,
        component: &ComponentDescriptor,
        sink: &mut BlockSink<'_>,
    ) -> Result<(), ClientError> {
        let path = self.source_dir.join(component.artifact_name());
        let mut file = File::open(&path)
            .map_err(|e| ClientError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let total = file
            .metadata()
            .map_err(|e| ClientError::Transfer(e.to_string()))?
            .len();

        let mut buf = vec![0u8; self.block_size];
        let mut remaining = total;
        let mut index = 0u32;

        loop {
            let len = remaining.min(self.block_size as u64) as usize;
            file.read_exact(&mut buf[..len])
                .map_err(|e| ClientError::Transfer(format!("block {}: {}", index, e)))?;
            remaining -= len as u64;

            let is_last = remaining == 0;
            sink(Block { index, data: &buf[..len], is_last })?;
            debug!(index, len, is_last, "Block delivered");

            if is_last {
                return Ok(());
            }
            index += 1;
        }
    }
}

/// Polls a manifest file and feeds changes to the listener.
///
/// Stands in for the cloud client's manifest observation: it runs on its own
/// task and only ever talks to the listener.
#[derive(Debug)]
pub struct ManifestWatcher {
    manifest_path: PathBuf,
    interval: Duration,
    listener: ManifestListener,
    last_seen: Option<Vec<u8>>,
}

impl ManifestWatcher {
    pub fn new(manifest_path: PathBuf, interval: Duration, listener: ManifestListener) -> Self {
        Self { manifest_path, interval, listener, last_seen: None }
    }

    /// Deliver the manifest if it changed since the last check.
    pub async fn poll_once(&mut self) -> Option<ListenerReport> {
        let payload = match tokio::fs::read(&self.manifest_path).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.manifest_path.display(), error = %e, "Unable to read manifest");
                return None;
            }
        };

        if self.last_seen.as_deref() == Some(payload.as_slice()) {
            return None;
        }

        let report = self.listener.on_payload(&payload);
        self.last_seen = Some(payload);
        info!(
            enqueued = report.enqueued,
            skipped = report.skipped,
            rejected = report.rejected,
            dropped = report.dropped,
            "Manifest delivered"
        );
        Some(report)
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(path = %self.manifest_path.display(), "Observing manifest");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.poll_once().await;
        }
        debug!("Manifest watcher stopped");
    }
}
