// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Model management: artifact framing, manifest types, and the persisted
//! selection record.

pub mod manifest;

mod loader;
mod selection;

pub use loader::{
    parse_header, LabelOverflow, LabelSet, LoadError, LoaderConfig, ModelContext, ModelLoader,
    ParsedHeader, DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_LABELS, HEADER_END, HEADER_START,
};
pub use manifest::{ComponentDescriptor, Manifest, ManifestComponent, ManifestError, PackageName};
pub use selection::{SelectionError, SelectionStore, WriteMode};
