//! Fuzz target for model file framing.
//!
//! Arbitrary artifact bytes must never panic the loader, and a successful
//! parse must respect the label bound and the payload offset.

#![no_main]

use libfuzzer_sys::fuzz_target;
use model_ota::models::{parse_header, LoaderConfig, ModelContext};

fuzz_target!(|data: &[u8]| {
    let config = LoaderConfig::default();
    if let Ok(header) = parse_header(data, &config) {
        assert!(header.labels.len() <= config.max_labels);
        assert!(header.len <= data.len());
        assert!(header.len <= config.max_header_len);
    }
    if let Ok(context) = ModelContext::from_bytes(data, &config) {
        assert!(context.len() < data.len());
    }
});
