// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! OTA manifest parsing and component descriptors.
//!
//! A manifest is the server-delivered list of components available for
//! download. Components that pass the listener's filter become
//! [`ComponentDescriptor`]s, which travel through the download queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::ErrorClass;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Invalid manifest payload: {0}")]
    InvalidPayload(String),

    #[error("Package name length limited to {max} but got {len}")]
    NameTooLong { len: usize, max: usize },

    #[error("Package name cannot be empty")]
    EmptyName,

    #[error("Component field is not a valid file name: {0:?}")]
    UnsafeName(String),
}

impl ManifestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidPayload(_) | Self::EmptyName | Self::UnsafeName(_) => ErrorClass::Format,
            Self::NameTooLong { .. } => ErrorClass::Capacity,
        }
    }
}

/// Decoded OTA manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Monotonic release sequence assigned by the server. Logged only.
    #[serde(default)]
    pub sequence_number: u64,
    /// Hash of the whole release, if the server provides one.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub components: Vec<ManifestComponent>,
}

/// One component entry as delivered by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestComponent {
    pub package: String,
    pub version: String,
    /// Artifact size in bytes. Opaque to this crate; forwarded to the client.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

/// Package and version are joined into a file name under the mount point,
/// so neither may name a directory.
fn check_file_name_part(part: &str) -> Result<(), ManifestError> {
    if part.is_empty() || part == ".." || part.contains(['/', '\\', '\0']) {
        return Err(ManifestError::UnsafeName(part.to_string()));
    }
    Ok(())
}

impl Manifest {
    /// Parse a manifest from the raw JSON payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, ManifestError> {
        serde_json::from_slice(payload).map_err(|e| ManifestError::InvalidPayload(e.to_string()))
    }
}

/// Package identifier bounded by the configured maximum length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(name: &str, max_len: usize) -> Result<Self, ManifestError> {
        if name.is_empty() {
            return Err(ManifestError::EmptyName);
        }
        if name.len() > max_len {
            return Err(ManifestError::NameTooLong { len: name.len(), max: max_len });
        }
        check_file_name_part(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// A component accepted for download.
///
/// Owned by exactly one stage at a time: created by the listener, moved
/// through the queue as a `Box`, and dropped by the worker once handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub package: PackageName,
    pub version: String,
    pub size: u64,
    pub hash: Option<String>,
    pub uri: Option<String>,
}

impl ComponentDescriptor {
    /// Copy a manifest entry into a descriptor, enforcing the name bound.
    pub fn from_component(
        component: &ManifestComponent,
        max_package_len: usize,
    ) -> Result<Self, ManifestError> {
        check_file_name_part(&component.version)?;
        Ok(Self {
            package: PackageName::new(&component.package, max_package_len)?,
            version: component.version.clone(),
            size: component.size,
            hash: component.hash.clone(),
            uri: component.uri.clone(),
        })
    }

    /// Storage file name: `{package}_{version}`, no extension.
    pub fn artifact_name(&self) -> String {
        format!("{}_{}", self.package, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_payload() {
        let json = br#"{
            "sequenceNumber": 1718000000,
            "hash": "abc",
            "components": [
                {"package": "model", "version": "1.0", "size": 1024, "uri": "/ota/model@1.0"}
            ]
        }"#;
        let manifest = Manifest::from_json(json).unwrap();
        assert_eq!(manifest.sequence_number, 1718000000);
        assert_eq!(manifest.components.len(), 1);
        assert_eq!(manifest.components[0].package, "model");
        assert_eq!(manifest.components[0].size, 1024);
        assert_eq!(manifest.components[0].hash, None);
    }

    #[test]
    fn missing_components_is_empty_manifest() {
        let manifest = Manifest::from_json(b"{}").unwrap();
        assert!(manifest.components.is_empty());
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let err = Manifest::from_json(b"\x00\x01not json").unwrap_err();
        assert!(matches!(err, ManifestError::InvalidPayload(_)));
        assert_eq!(err.class(), ErrorClass::Format);
    }

    #[test]
    fn package_name_at_limit_is_accepted() {
        assert!(PackageName::new("abcd", 4).is_ok());
        let err = PackageName::new("abcde", 4).unwrap_err();
        assert!(matches!(err, ManifestError::NameTooLong { len: 5, max: 4 }));
        assert_eq!(err.class(), ErrorClass::Capacity);
    }

    #[test]
    fn path_separators_are_rejected() {
        let component = ManifestComponent {
            package: "model".into(),
            version: "../../etc/passwd".into(),
            ..Default::default()
        };
        let err = ComponentDescriptor::from_component(&component, 63).unwrap_err();
        assert!(matches!(err, ManifestError::UnsafeName(_)));
        assert!(PackageName::new("a/b", 63).is_err());
        assert!(PackageName::new("..", 63).is_err());
    }

    #[test]
    fn artifact_name_joins_package_and_version() {
        let component = ManifestComponent {
            package: "model".into(),
            version: "1.2.3".into(),
            ..Default::default()
        };
        let descriptor = ComponentDescriptor::from_component(&component, 63).unwrap();
        assert_eq!(descriptor.artifact_name(), "model_1.2.3");
        assert!(descriptor.package == *"model");
    }
}
