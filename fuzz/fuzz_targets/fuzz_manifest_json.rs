//! Fuzz target for manifest delivery.
//!
//! Arbitrary payloads go through the listener; the queue never holds more
//! than its capacity and nothing panics.

#![no_main]

use libfuzzer_sys::fuzz_target;
use model_ota::ota::{download_queue, DownloadQueueConfig, ListenerConfig, ManifestListener};

fuzz_target!(|data: &[u8]| {
    let (producer, consumer) = download_queue(DownloadQueueConfig { capacity: 4 });
    let listener = ManifestListener::new(producer, ListenerConfig::default());
    let report = listener.on_payload(data);
    assert!(report.enqueued <= 4);
    assert_eq!(consumer.len(), report.enqueued);
});
