// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Offline CLI subcommands.
//!
//! These read the environment configuration and local storage directly; none
//! of them needs a running `model-ota run` process.
//!
//! ## Usage
//!
//! ```bash
//! model-ota inspect /sdcard/model_1.2   # Parse a model file header
//! model-ota selection --json            # Show the persisted selection
//! model-ota config validate             # Check MODEL_OTA_* settings
//! ```

pub mod config_cmd;
pub mod models_cmd;

pub use models_cmd::{run_inspect, run_selection, ModelSummary, SelectionSummary};

/// True if `flag` appears anywhere in `args`.
pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
