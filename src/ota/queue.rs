// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded handoff queue between the manifest listener and the download worker.
//!
//! The producer side runs in the OTA client's notification context, the
//! consumer side on the main loop. Neither side ever blocks: a full queue
//! rejects the descriptor and an empty queue reports `Empty`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::error::ErrorClass;
use crate::models::ComponentDescriptor;

/// Ownership handle moved through the queue.
pub type DescriptorBox = Box<ComponentDescriptor>;

pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue full: {capacity} descriptors pending")]
    Full { capacity: usize },

    #[error("Queue empty")]
    Empty,

    #[error("Queue closed")]
    Closed,
}

impl QueueError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Full { .. } => ErrorClass::Capacity,
            Self::Empty | Self::Closed => ErrorClass::NotFound,
        }
    }
}

/// Configuration for the download queue.
#[derive(Debug, Clone)]
pub struct DownloadQueueConfig {
    /// Maximum number of pending descriptors. Normally the maximum number of
    /// components one manifest can describe.
    pub capacity: usize,
}

impl Default for DownloadQueueConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

/// Create a bounded queue and return its two ends.
///
/// A capacity of zero is raised to one.
pub fn download_queue(config: DownloadQueueConfig) -> (QueueProducer, QueueConsumer) {
    let capacity = config.capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let depth = Arc::new(AtomicUsize::new(0));
    (
        QueueProducer { tx, depth: depth.clone(), capacity },
        QueueConsumer { rx, depth, capacity },
    )
}

/// Sending end. Cheap to clone; every clone feeds the same queue.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<DescriptorBox>,
    depth: Arc<AtomicUsize>,
    capacity: usize,
}

impl QueueProducer {
    /// Push a descriptor without waiting.
    ///
    /// On failure the descriptor is dropped here; callers never get it back.
    pub fn try_enqueue(&self, descriptor: DescriptorBox) -> Result<(), QueueError> {
        // Count before sending so the consumer never decrements below zero.
        self.depth.fetch_add(1, Ordering::AcqRel);
        let err = match self.tx.try_send(descriptor) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(_)) => QueueError::Full { capacity: self.capacity },
            Err(TrySendError::Closed(_)) => QueueError::Closed,
        };
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Err(err)
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Receiving end. Exactly one exists per queue.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<DescriptorBox>,
    depth: Arc<AtomicUsize>,
    capacity: usize,
}

impl QueueConsumer {
    /// Take the oldest descriptor without waiting.
    pub fn try_dequeue(&mut self) -> Result<DescriptorBox, QueueError> {
        match self.rx.try_recv() {
            Ok(descriptor) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                Ok(descriptor)
            }
            Err(TryRecvError::Empty) => Err(QueueError::Empty),
            Err(TryRecvError::Disconnected) => Err(QueueError::Closed),
        }
    }

    /// Iterate until the queue is empty.
    pub fn drain(&mut self) -> impl Iterator<Item = DescriptorBox> + '_ {
        std::iter::from_fn(move || self.try_dequeue().ok())
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
