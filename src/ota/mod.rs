// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! OTA download pipeline.
//!
//! Manifest listener (notification context) -> bounded download queue ->
//! download worker (main loop) -> model selection.

pub mod client;
pub mod local;

mod listener;
mod queue;
mod worker;

pub use client::{Block, BlockError, BlockSink, ClientError, OtaClient};
pub use listener::{
    ListenerConfig, ListenerReport, ListenerStatsSnapshot, ManifestListener,
    DEFAULT_MAX_PACKAGE_NAME_LEN, MODEL_PACKAGE_NAME,
};
pub use local::{LocalOtaClient, ManifestWatcher, DEFAULT_BLOCK_SIZE, MANIFEST_FILE_NAME};
pub use queue::{
    download_queue, DescriptorBox, DownloadQueueConfig, QueueConsumer, QueueError, QueueProducer,
    DEFAULT_QUEUE_CAPACITY,
};
pub use worker::{
    ComponentOutcome, DownloadWorker, ModelSelection, PollReport, SelectionUpdate, WorkerConfig,
    WorkerError, DEFAULT_MOUNT_POINT,
};
