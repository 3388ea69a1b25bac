// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Download worker and model selection.
//!
//! Polled once per main loop iteration. Each poll drains the download queue,
//! fetches every component that is not already in storage, and tracks which
//! artifact should become the selected model.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::client::{Block, BlockError, ClientError, OtaClient};
use super::queue::{DescriptorBox, QueueConsumer};
use super::listener::MODEL_PACKAGE_NAME;
use crate::error::ErrorClass;
use crate::models::{ComponentDescriptor, SelectionStore};

pub const DEFAULT_MOUNT_POINT: &str = "/sdcard";

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Error opening {path} for writing: {source}")]
    Open { path: PathBuf, source: std::io::Error },

    #[error("Download of {path} failed: {source}")]
    Download { path: PathBuf, source: ClientError },
}

impl WorkerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Open { .. } => ErrorClass::Io,
            Self::Download { source, .. } => source.class(),
        }
    }
}

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory artifacts are written to.
    pub mount_point: PathBuf,
    /// Package whose artifact becomes the selected model.
    pub model_package: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            model_package: MODEL_PACKAGE_NAME.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Storage path of a component: `{mount}/{package}_{version}`.
    pub fn artifact_path(&self, descriptor: &ComponentDescriptor) -> PathBuf {
        self.mount_point.join(descriptor.artifact_name())
    }
}

/// What happened to one dequeued component.
#[derive(Debug)]
pub enum ComponentOutcome {
    /// Artifact streamed into storage.
    Downloaded { bytes: u64 },
    /// An artifact already existed at the derived path; nothing was written.
    AlreadyPresent,
    Failed(WorkerError),
}

/// Result of applying the drain's candidate to the selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionUpdate {
    /// No model component was processed in this drain.
    #[default]
    NoCandidate,
    /// Candidate equals the current selection.
    Unchanged,
    /// Selection persisted and the new-model flag raised.
    Updated(String),
    /// Persisting failed; in-memory selection left as it was.
    Failed,
}

/// Summary of one [`DownloadWorker::poll`].
#[derive(Debug, Default)]
pub struct PollReport {
    pub processed: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
    pub bytes_written: u64,
    pub candidate: Option<String>,
    pub selection: SelectionUpdate,
}

/// Selected model path, in memory and persisted.
#[derive(Debug)]
pub struct ModelSelection {
    store: SelectionStore,
    current: Option<String>,
    new_model_available: bool,
}

impl ModelSelection {
    /// Seed the in-memory selection from the persisted record.
    pub fn open(store: SelectionStore) -> Self {
        let current = match store.load() {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Unable to read selection record, starting empty");
                None
            }
        };
        if let Some(path) = &current {
            info!(selected = %path, "Restored model selection");
        }
        Self { store, current, new_model_available: false }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn new_model_available(&self) -> bool {
        self.new_model_available
    }

    /// Clear the new-model flag, returning the selection if it was raised.
    pub fn take_new_model(&mut self) -> Option<String> {
        if !std::mem::take(&mut self.new_model_available) {
            return None;
        }
        self.current.clone()
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    fn apply(&mut self, candidate: String) -> SelectionUpdate {
        if self.current.as_deref() == Some(candidate.as_str()) {
            debug!(selected = %candidate, "Selected model unchanged");
            return SelectionUpdate::Unchanged;
        }

        if let Err(e) = self.store.store(&candidate) {
            error!(error = %e, class = %e.class(), "Failed to persist model selection");
            return SelectionUpdate::Failed;
        }

        info!(selected = %candidate, "New model selected");
        self.current = Some(candidate.clone());
        self.new_model_available = true;
        SelectionUpdate::Updated(candidate)
    }
}

/// Drains the download queue on the main loop.
#[derive(Debug)]
pub struct DownloadWorker {
    consumer: QueueConsumer,
    config: WorkerConfig,
    selection: ModelSelection,
}

impl DownloadWorker {
    pub fn new(consumer: QueueConsumer, config: WorkerConfig, selection: ModelSelection) -> Self {
        Self { consumer, config, selection }
    }

    pub fn selection(&self) -> &ModelSelection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut ModelSelection {
        &mut self.selection
    }

    /// Drain the queue completely, then update the selection.
    pub fn poll<C: OtaClient + ?Sized>(&mut self, client: &C) -> PollReport {
        let mut report = PollReport::default();

        while let Ok(descriptor) = self.consumer.try_dequeue() {
            report.processed += 1;

            let path = self.config.artifact_path(&descriptor);
            let is_model = descriptor.package == *self.config.model_package.as_str();

            match self.process(client, descriptor, &path) {
                ComponentOutcome::Downloaded { bytes } => {
                    report.downloaded += 1;
                    report.bytes_written += bytes;
                }
                ComponentOutcome::AlreadyPresent => report.already_present += 1,
                ComponentOutcome::Failed(e) => {
                    if e.class().is_warning() {
                        warn!(path = %path.display(), error = %e, class = %e.class(), "Component not downloaded");
                    } else {
                        error!(path = %path.display(), error = %e, class = %e.class(), "Component download failed");
                    }
                    report.failed += 1;
                }
            }

            // Server has told us this is the most recent release, whatever
            // became of the transfer.
            if is_model {
                report.candidate = Some(path.to_string_lossy().into_owned());
            }
        }

        if let Some(candidate) = report.candidate.clone() {
            report.selection = self.selection.apply(candidate);
        }
        report
    }

    /// Fetch one component. The descriptor is dropped on return, whatever the outcome.
    fn process<C: OtaClient + ?Sized>(
        &self,
        client: &C,
        descriptor: DescriptorBox,
        path: &Path,
    ) -> ComponentOutcome {
        if path.exists() {
            info!(path = %path.display(), "Package already exists in storage");
            return ComponentOutcome::AlreadyPresent;
        }

        info!(path = %path.display(), "Opening file for writing");
        let mut file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(source) => {
                return ComponentOutcome::Failed(WorkerError::Open { path: path.to_path_buf(), source });
            }
        };

        let mut bytes = 0u64;
        let mut sink = |block: Block<'_>| -> Result<(), BlockError> {
            write_artifact_block(&mut file, block)?;
            bytes += block.data.len() as u64;
            Ok(())
        };

        // A failed transfer leaves the partial file in place.
        match client.download_component(&descriptor, &mut sink) {
            Ok(()) => ComponentOutcome::Downloaded { bytes },
            Err(source) => {
                ComponentOutcome::Failed(WorkerError::Download { path: path.to_path_buf(), source })
            }
        }
    }
}

/// Append one block to the open artifact file.
fn write_artifact_block(file: &mut File, block: Block<'_>) -> Result<(), BlockError> {
    file.write_all(block.data)
        .map_err(|source| BlockError::Write { index: block.index, source })?;
    if block.is_last {
        file.flush()
            .map_err(|source| BlockError::Write { index: block.index, source })?;
        info!(blocks = block.index + 1, "Block download complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_is_package_underscore_version() {
        let config = WorkerConfig {
            mount_point: PathBuf::from("/sdcard"),
            ..Default::default()
        };
        let component = crate::models::ManifestComponent {
            package: "model".into(),
            version: "1.2.3".into(),
            ..Default::default()
        };
        let descriptor = ComponentDescriptor::from_component(&component, 63).unwrap();
        assert_eq!(config.artifact_path(&descriptor), PathBuf::from("/sdcard/model_1.2.3"));
    }

    #[test]
    fn take_new_model_clears_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut selection = ModelSelection::open(SelectionStore::new(dir.path().join("selected")));
        assert_eq!(selection.take_new_model(), None);

        let update = selection.apply("/sdcard/model_1.0".into());
        assert_eq!(update, SelectionUpdate::Updated("/sdcard/model_1.0".into()));
        assert!(selection.new_model_available());
        assert_eq!(selection.take_new_model().as_deref(), Some("/sdcard/model_1.0"));
        assert!(!selection.new_model_available());
        assert_eq!(selection.take_new_model(), None);
    }

    #[test]
    fn identical_candidate_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = SelectionStore::new(dir.path().join("selected"));
        store.store("/sdcard/model_1.0").unwrap();

        let mut selection = ModelSelection::open(store);
        assert_eq!(selection.current(), Some("/sdcard/model_1.0"));
        assert_eq!(selection.apply("/sdcard/model_1.0".into()), SelectionUpdate::Unchanged);
        assert!(!selection.new_model_available());
    }

    #[test]
    fn failed_persist_keeps_previous_selection() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist, so the write fails.
        let store = SelectionStore::new(dir.path().join("missing").join("selected"));
        let mut selection = ModelSelection::open(store);

        assert_eq!(selection.apply("/sdcard/model_2.0".into()), SelectionUpdate::Failed);
        assert_eq!(selection.current(), None);
        assert!(!selection.new_model_available());
    }
}
