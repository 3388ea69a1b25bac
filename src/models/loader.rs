// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Model artifact loading.
//!
//! A model artifact is a short text header followed by the raw model bytes:
//!
//! ```text
//! GLTHBEGIN;label1;label2;...;GLTHEND\n<payload>
//! ```
//!
//! The header is bounded by [`LoaderConfig::max_header_len`] (newline
//! included) and carries at most [`LoaderConfig::max_labels`] labels. Any
//! failure yields an error and no partially built context.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ErrorClass;

/// First token of every model header.
pub const HEADER_START: &str = "GLTHBEGIN";
/// Token that terminates the label list.
pub const HEADER_END: &str = "GLTHEND";
const HEADER_DELIMITER: char = ';';

pub const DEFAULT_MAX_HEADER_LEN: usize = 128;
pub const DEFAULT_MAX_LABELS: usize = 8;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid model format: {0}")]
    InvalidFormat(String),

    #[error("Short read: copied {read} bytes but expected {expected}")]
    ShortRead { read: usize, expected: usize },

    #[error("Unable to allocate {size} bytes for model payload")]
    Allocation { size: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::InvalidFormat(_) | Self::ShortRead { .. } => ErrorClass::Format,
            Self::Allocation { .. } => ErrorClass::Allocation,
            Self::Io(_) => ErrorClass::Io,
        }
    }
}

/// Returned when a label is offered to a full [`LabelSet`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Max labels reached ({max}), dropping '{label}'")]
pub struct LabelOverflow {
    pub label: String,
    pub max: usize,
}

/// Loader limits.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub max_header_len: usize,
    pub max_labels: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            max_labels: DEFAULT_MAX_LABELS,
        }
    }
}

/// Ordered label list with a fixed upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
    max: usize,
}

impl LabelSet {
    pub fn with_max(max: usize) -> Self {
        Self { labels: Vec::with_capacity(max), max }
    }

    /// Append a label. A full set rejects the label and is left untouched.
    pub fn push(&mut self, label: &str) -> Result<(), LabelOverflow> {
        if self.labels.len() == self.max {
            return Err(LabelOverflow { label: label.to_string(), max: self.max });
        }
        self.labels.push(label.to_string());
        Ok(())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// Header scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    /// Waiting for the start sentinel.
    Searching,
    /// Collecting labels until the end sentinel.
    Reading,
}

/// Result of a successful header parse.
#[derive(Debug, Clone)]
pub struct ParsedHeader {
    pub labels: LabelSet,
    /// Header length in bytes, trailing newline included. The payload
    /// starts at this offset.
    pub len: usize,
}

/// Parse the header at the start of `bytes`.
///
/// Only the first `max_header_len` bytes are inspected; `bytes` may hold the
/// whole file or just its head.
pub fn parse_header(bytes: &[u8], config: &LoaderConfig) -> Result<ParsedHeader, LoadError> {
    let window = &bytes[..bytes.len().min(config.max_header_len)];
    let newline = match window.iter().position(|&b| b == b'\n') {
        Some(pos) => pos,
        None if bytes.len() < config.max_header_len => {
            return Err(LoadError::InvalidFormat(
                "reached end of file but no header found".into(),
            ));
        }
        None => {
            return Err(LoadError::InvalidFormat(format!(
                "no header terminator within {} bytes",
                config.max_header_len
            )));
        }
    };

    let len = newline + 1;
    debug!(header_len = len, "Found header terminator");

    if len < HEADER_START.len() + HEADER_END.len() {
        return Err(LoadError::InvalidFormat(format!("header too small to be valid: {}", len)));
    }

    let text = std::str::from_utf8(&bytes[..newline])
        .map_err(|e| LoadError::InvalidFormat(format!("header is not UTF-8: {}", e)))?;

    let mut labels = LabelSet::with_max(config.max_labels);
    let mut state = HeaderState::Searching;

    for token in text.split(HEADER_DELIMITER).filter(|t| !t.is_empty()) {
        match state {
            HeaderState::Searching => {
                if token != HEADER_START {
                    return Err(LoadError::InvalidFormat("header start not found".into()));
                }
                debug!("Found header start");
                state = HeaderState::Reading;
            }
            HeaderState::Reading if token == HEADER_END => {
                debug!(labels = labels.len(), "Found header end");
                return Ok(ParsedHeader { labels, len });
            }
            HeaderState::Reading => match labels.push(token) {
                Ok(()) => debug!(index = labels.len() - 1, label = token, "Label found"),
                Err(overflow) => warn!(%overflow, "Label rejected"),
            },
        }
    }

    Err(LoadError::InvalidFormat("header end not found".into()))
}

/// A loaded model: labels plus the raw payload handed to the inference engine.
///
/// Dropping the context releases every label and the payload buffer.
#[derive(Debug)]
pub struct ModelContext {
    labels: LabelSet,
    payload: Vec<u8>,
    source: Option<PathBuf>,
}

impl ModelContext {
    /// Parse a complete artifact held in memory.
    pub fn from_bytes(bytes: &[u8], config: &LoaderConfig) -> Result<Self, LoadError> {
        let header = parse_header(bytes, config)?;
        let payload = copy_payload(&bytes[header.len..])?;
        Ok(Self { labels: header.labels, payload, source: None })
    }

    pub fn labels(&self) -> &[String] {
        self.labels.as_slice()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// File the context was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn reserve_payload(size: usize) -> Result<Vec<u8>, LoadError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| LoadError::Allocation { size })?;
    Ok(buf)
}

fn copy_payload(bytes: &[u8]) -> Result<Vec<u8>, LoadError> {
    let mut buf = reserve_payload(bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(buf)
}

/// Loads model artifacts from storage.
#[derive(Debug, Clone, Default)]
pub struct ModelLoader {
    config: LoaderConfig,
}

impl ModelLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load and frame the artifact at `path`.
    pub fn load(&self, path: &Path) -> Result<ModelContext, LoadError> {
        let file_size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut file = File::open(path)?;

        let mut head = Vec::with_capacity(self.config.max_header_len);
        (&mut file)
            .take(self.config.max_header_len as u64)
            .read_to_end(&mut head)?;
        let header = parse_header(&head, &self.config)?;

        let expected = usize::try_from(file_size.saturating_sub(header.len as u64))
            .map_err(|_| LoadError::Allocation { size: usize::MAX })?;
        debug!(offset = header.len, size = expected, "Model payload located");

        file.seek(SeekFrom::Start(header.len as u64))?;
        let mut payload = reserve_payload(expected)?;
        (&mut file).take(expected as u64).read_to_end(&mut payload)?;
        if payload.len() != expected {
            return Err(LoadError::ShortRead { read: payload.len(), expected });
        }

        info!(
            path = %path.display(),
            labels = ?header.labels.as_slice(),
            size = payload.len(),
            "Loaded model"
        );

        Ok(ModelContext {
            labels: header.labels,
            payload,
            source: Some(path.to_path_buf()),
        })
    }
}
