// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Persisted model selection.
//!
//! A single record file holds the storage path of the selected model as
//! literal printable-ASCII text, with no delimiter or length prefix.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorClass;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Selection path cannot be empty")]
    InvalidArgument,

    #[error("Failed to read selection record {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write selection record {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

impl SelectionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument => ErrorClass::Format,
            Self::Read { .. } | Self::Write { .. } => ErrorClass::Io,
        }
    }
}

/// How [`SelectionStore::store`] replaces an existing record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Remove the old record, then write the new one. A failure after the
    /// removal leaves no record at all.
    #[default]
    Replace,
    /// Write a sibling temp file and rename it over the record.
    Atomic,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "atomic" => Ok(Self::Atomic),
            other => Err(format!("unknown selection write mode: {}", other)),
        }
    }
}

/// Truncate `bytes` at the first byte outside printable ASCII.
fn scrub(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .position(|b| !(0x20..=0x7e).contains(b))
        .unwrap_or(bytes.len());
    &bytes[..end]
}

/// Reads and writes the selection record.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    path: PathBuf,
    mode: WriteMode,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), mode: WriteMode::default() }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Read the persisted selection.
    ///
    /// A missing record, or one that scrubs down to nothing, is `Ok(None)`.
    pub fn load(&self) -> Result<Option<String>, SelectionError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No selection record");
                return Ok(None);
            }
            Err(source) => return Err(SelectionError::Read { path: self.path.clone(), source }),
        };

        let clean = scrub(&raw);
        if clean.len() != raw.len() {
            warn!(
                path = %self.path.display(),
                kept = clean.len(),
                dropped = raw.len() - clean.len(),
                "Selection record contained non-printable bytes"
            );
        }
        if clean.is_empty() {
            return Ok(None);
        }

        // Printable ASCII is always valid UTF-8.
        Ok(Some(String::from_utf8_lossy(clean).into_owned()))
    }

    /// Persist `selected` as the new selection.
    pub fn store(&self, selected: &str) -> Result<(), SelectionError> {
        self.store_with(selected, |path| File::create(path).map(DurableFile))
    }

    /// Persist `selected`, opening the file it is written to with `create`.
    ///
    /// In [`WriteMode::Replace`] the old record is already gone when `create`
    /// runs; in [`WriteMode::Atomic`] `create` receives the temp path.
    pub fn store_with<W, F>(&self, selected: &str, create: F) -> Result<(), SelectionError>
    where
        W: Write,
        F: FnOnce(&Path) -> io::Result<W>,
    {
        if selected.is_empty() {
            return Err(SelectionError::InvalidArgument);
        }

        match self.mode {
            WriteMode::Replace => self.store_replace(selected, create),
            WriteMode::Atomic => self.store_atomic(selected, create),
        }?;

        debug!(path = %self.path.display(), selected, "Selection stored");
        Ok(())
    }

    fn write_error(&self, source: io::Error) -> SelectionError {
        SelectionError::Write { path: self.path.clone(), source }
    }

    fn store_replace<W, F>(&self, selected: &str, create: F) -> Result<(), SelectionError>
    where
        W: Write,
        F: FnOnce(&Path) -> io::Result<W>,
    {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.write_error(e)),
        }

        create(&self.path)
            .and_then(|mut file| write_record(&mut file, selected))
            .map_err(|e| self.write_error(e))
    }

    fn store_atomic<W, F>(&self, selected: &str, create: F) -> Result<(), SelectionError>
    where
        W: Write,
        F: FnOnce(&Path) -> io::Result<W>,
    {
        let temp_path = self.path.with_extension(format!("{}.tmp", std::process::id()));

        let result = create(&temp_path)
            .and_then(|mut file| write_record(&mut file, selected))
            .and_then(|()| fs::rename(&temp_path, &self.path));

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(self.write_error(e));
        }
        Ok(())
    }
}

/// Record file whose flush reaches the disk.
struct DurableFile(File);

impl Write for DurableFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.sync_all()
    }
}

fn write_record<W: Write>(out: &mut W, selected: &str) -> io::Result<()> {
    out.write_all(selected.as_bytes())?;
    out.flush()
}
