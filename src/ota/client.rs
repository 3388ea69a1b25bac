// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! Contract with the external OTA client.
//!
//! The client owns the transfer protocol: block sizing, retries, and
//! integrity. This crate only hands it a sink that receives each block in
//! order.

use thiserror::Error;

use crate::error::ErrorClass;
use crate::models::ComponentDescriptor;

/// One received artifact block.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub index: u32,
    pub data: &'a [u8],
    pub is_last: bool,
}

/// Failure reported by a block sink. Aborts the transfer.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Failed to write block {index}: {source}")]
    Write { index: u32, source: std::io::Error },
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Artifact not available: {0}")]
    Unavailable(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Block sink rejected transfer: {0}")]
    Sink(#[from] BlockError),
}

impl ClientError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unavailable(_) => ErrorClass::NotFound,
            Self::Transfer(_) | Self::Sink(_) => ErrorClass::Io,
        }
    }
}

/// Sink invoked once per received block, in order.
pub type BlockSink<'s> = dyn FnMut(Block<'_>) -> Result<(), BlockError> + 's;

/// Block-wise artifact download, provided by the OTA transport.
///
/// Implementations block the calling thread until the transfer completes or
/// fails. A sink error must stop the transfer and be returned as
/// [`ClientError::Sink`].
pub trait OtaClient {
    fn download_component(
        &self,
        component: &ComponentDescriptor,
        sink: &mut BlockSink<'_>,
    ) -> Result<(), ClientError>;
}

impl<C: OtaClient + ?Sized> OtaClient for &C {
    fn download_component(
        &self,
        component: &ComponentDescriptor,
        sink: &mut BlockSink<'_>,
    ) -> Result<(), ClientError> {
        (**self).download_component(component, sink)
    }
}
