// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Structured logging for the provisioning runtime.
//!
//! Output goes to stderr or a local file. Nothing is shipped off-device.

mod logging;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
