// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error classification shared by every pipeline stage.
//!
//! Each module owns its own `thiserror` enum. Those enums map onto a small
//! taxonomy so the main loop can decide how loudly to log a failure. All
//! failures are local to the component or file being processed: nothing here
//! is retried and nothing propagates far enough to stop the process.

use std::fmt;

/// Broad category of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Memory could not be reserved for a buffer.
    Allocation,
    /// Malformed manifest, header, or short read.
    Format,
    /// File open, read, or write failure.
    Io,
    /// A bounded resource was exhausted (name length, labels, queue slots).
    Capacity,
    /// An expected record is absent. Usually a normal empty state.
    NotFound,
}

impl ErrorClass {
    /// Returns true if failures of this class are expected during normal
    /// operation and should be logged as warnings rather than errors.
    pub fn is_warning(self) -> bool {
        matches!(self, Self::Capacity | Self::NotFound)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Allocation => "allocation",
            Self::Format => "format",
            Self::Io => "io",
            Self::Capacity => "capacity",
            Self::NotFound => "not_found",
        };
        f.write_str(name)
    }
}
