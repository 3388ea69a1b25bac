// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Model CLI subcommands: inspect, selection.

use serde::Serialize;
use std::path::Path;

use crate::config;
use crate::models::{LoadError, LoaderConfig, ModelContext, ModelLoader, SelectionStore};

/// Parsed view of a model file.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub path: String,
    pub labels: Vec<String>,
    pub payload_bytes: usize,
}

impl ModelSummary {
    pub fn from_context(path: &Path, context: &ModelContext) -> Self {
        Self {
            path: path.display().to_string(),
            labels: context.labels().to_vec(),
            payload_bytes: context.len(),
        }
    }
}

/// Persisted selection as seen from disk.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionSummary {
    pub selection_file: String,
    pub selected: Option<String>,
    /// Whether the selected artifact exists in storage.
    pub present: bool,
}

/// Parse a model file with the configured limits.
pub fn inspect(path: &Path, config: &LoaderConfig) -> Result<ModelSummary, LoadError> {
    let context = ModelLoader::new(config.clone()).load(path)?;
    Ok(ModelSummary::from_context(path, &context))
}

/// Run `inspect <file>`.
///
/// Returns exit code: 0 on success, 1 if the file is not a valid model,
/// 2 if it does not exist.
pub fn run_inspect(path: &Path, json_output: bool) -> i32 {
    let env = config::load();
    match inspect(path, &env.loader) {
        Ok(summary) if json_output => print_json(&summary),
        Ok(summary) => {
            println!("Model:   {}", summary.path);
            println!("Labels:  {} [{}]", summary.labels.len(), summary.labels.join(", "));
            println!("Payload: {} bytes", summary.payload_bytes);
            0
        }
        Err(e @ LoadError::NotFound(_)) => {
            eprintln!("Error: {}", e);
            2
        }
        Err(e) => {
            eprintln!("Error: {} ({})", e, e.class());
            1
        }
    }
}

/// Read the selection record from `store`.
pub fn selection_summary(store: &SelectionStore) -> Result<SelectionSummary, crate::models::SelectionError> {
    let selected = store.load()?;
    let present = selected.as_deref().map(|p| Path::new(p).is_file()).unwrap_or(false);
    Ok(SelectionSummary {
        selection_file: store.path().display().to_string(),
        selected,
        present,
    })
}

/// Run `selection [--json]`.
///
/// Returns exit code: 0 on success, 1 if the record cannot be read.
pub fn run_selection(json_output: bool) -> i32 {
    let env = config::load();
    let store = SelectionStore::new(&env.selection_file);
    match selection_summary(&store) {
        Ok(summary) if json_output => print_json(&summary),
        Ok(summary) => {
            match &summary.selected {
                Some(selected) if summary.present => println!("Selected model: {}", selected),
                Some(selected) => println!("Selected model: {} (missing from storage)", selected),
                None => println!("No model selected."),
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            1
        }
    }
}
