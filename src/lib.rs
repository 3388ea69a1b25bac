// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! model-ota: over-the-air model provisioning for edge inference devices.
//!
//! Receives release manifests, downloads the matching artifacts into local
//! storage, remembers which model is selected across restarts and loads the
//! selected model file into memory for the inference engine.
//!
//! # Data flow
//!
//! - Manifest listener (async task): filters components onto a bounded queue.
//! - Download worker (main loop): drains the queue, writes artifacts, updates
//!   the persisted selection.
//! - [`Runtime::step`]: one main loop iteration. Polls the worker and loads
//!   the newly selected model into the single live slot.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod ota;
pub mod telemetry;

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use models::{LoadError, LoaderConfig, ModelContext, ModelLoader, SelectionStore, WriteMode};
use ota::{
    download_queue, DownloadQueueConfig, DownloadWorker, ListenerConfig, ManifestListener,
    ModelSelection, OtaClient, PollReport, WorkerConfig,
};

/// Exit code requesting a supervisor restart after a model swap.
pub const RESTART_EXIT_CODE: i32 = 75;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub worker: WorkerConfig,
    pub listener: ListenerConfig,
    pub queue: DownloadQueueConfig,
    pub loader: LoaderConfig,
    pub selection_file: PathBuf,
    pub selection_write: WriteMode,
    /// Request a process restart instead of replacing a loaded model.
    pub restart_on_swap: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        let selection_file = worker.mount_point.join(config::SELECTION_FILE_NAME);
        Self {
            worker,
            listener: ListenerConfig::default(),
            queue: DownloadQueueConfig::default(),
            loader: LoaderConfig::default(),
            selection_file,
            selection_write: WriteMode::default(),
            restart_on_swap: true,
        }
    }
}

impl RuntimeConfig {
    /// Defaults rooted at `mount_point`.
    pub fn with_mount_point(mount_point: impl Into<PathBuf>) -> Self {
        let mount_point = mount_point.into();
        Self {
            selection_file: mount_point.join(config::SELECTION_FILE_NAME),
            worker: WorkerConfig { mount_point, ..Default::default() },
            ..Default::default()
        }
    }
}

/// What a main loop iteration did with the model slot.
#[derive(Debug)]
pub enum StepOutcome {
    /// No new selection.
    Idle,
    /// The selected model is now live.
    ModelLoaded(PathBuf),
    /// The selected model could not be loaded. The slot is empty.
    LoadFailed(LoadError),
    /// A different model was selected while one is live.
    RestartRequired(String),
}

/// Result of [`Runtime::step`].
#[derive(Debug)]
pub struct StepReport {
    pub poll: PollReport,
    pub outcome: StepOutcome,
}

/// Provisioning runtime: download worker plus the live model slot.
#[derive(Debug)]
pub struct Runtime {
    listener: ManifestListener,
    worker: DownloadWorker,
    loader: ModelLoader,
    model: Option<ModelContext>,
    restart_on_swap: bool,
}

impl Runtime {
    /// Create the queue, listener and worker. The selection is restored from disk.
    pub fn new(config: RuntimeConfig) -> Self {
        let (producer, consumer) = download_queue(config.queue);
        let listener = ManifestListener::new(producer, config.listener);
        let store = SelectionStore::new(config.selection_file).with_mode(config.selection_write);
        let worker = DownloadWorker::new(consumer, config.worker, ModelSelection::open(store));

        Self {
            listener,
            worker,
            loader: ModelLoader::new(config.loader),
            model: None,
            restart_on_swap: config.restart_on_swap,
        }
    }

    /// Handle for the manifest notification context.
    pub fn listener(&self) -> &ManifestListener {
        &self.listener
    }

    pub fn worker(&self) -> &DownloadWorker {
        &self.worker
    }

    pub fn worker_mut(&mut self) -> &mut DownloadWorker {
        &mut self.worker
    }

    /// The live model, if any.
    pub fn model(&self) -> Option<&ModelContext> {
        self.model.as_ref()
    }

    /// Load the persisted selection, if there is one.
    pub fn bootstrap(&mut self) -> StepOutcome {
        match self.worker.selection().current().map(str::to_owned) {
            Some(path) => self.load_into_slot(&path),
            None => {
                info!("No model selected yet");
                StepOutcome::Idle
            }
        }
    }

    /// One main loop iteration.
    pub fn step<C: OtaClient + ?Sized>(&mut self, client: &C) -> StepReport {
        let poll = self.worker.poll(client);

        let outcome = match self.worker.selection_mut().take_new_model() {
            None => StepOutcome::Idle,
            Some(selected) if self.model.is_some() && self.restart_on_swap => {
                warn!(selected = %selected, "New model selected while one is loaded, restart required");
                StepOutcome::RestartRequired(selected)
            }
            Some(selected) => {
                // Old buffers go before the new ones are allocated.
                self.model = None;
                self.load_into_slot(&selected)
            }
        };

        StepReport { poll, outcome }
    }

    fn load_into_slot(&mut self, selected: &str) -> StepOutcome {
        let path = Path::new(selected);
        match self.loader.load(path) {
            Ok(context) => {
                info!(
                    path = %path.display(),
                    labels = context.label_count(),
                    bytes = context.len(),
                    "Model loaded"
                );
                self.model = Some(context);
                StepOutcome::ModelLoaded(path.to_path_buf())
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, class = %e.class(), "Failed to load model");
                self.model = None;
                StepOutcome::LoadFailed(e)
            }
        }
    }
}
