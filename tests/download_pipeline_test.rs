//! Tests for the listener -> queue -> worker -> selection pipeline.

use model_ota::models::{ComponentDescriptor, Manifest, ManifestComponent, SelectionStore};
use model_ota::ota::{
    download_queue, Block, BlockSink, ClientError, DownloadQueueConfig, DownloadWorker,
    ListenerConfig, ManifestListener, ModelSelection, OtaClient, SelectionUpdate, WorkerConfig,
};
use model_ota::{Runtime, RuntimeConfig, StepOutcome};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

/// In-memory release server that records every download request.
#[derive(Default)]
struct MockClient {
    artifacts: HashMap<String, Vec<u8>>,
    block_size: usize,
    /// Artifacts whose transfer fails after the first block.
    broken: Vec<String>,
    requests: Mutex<Vec<String>>,
}

impl MockClient {
    fn new(block_size: usize) -> Self {
        Self { block_size, ..Default::default() }
    }

    fn with(mut self, name: &str, bytes: &[u8]) -> Self {
        self.artifacts.insert(name.to_string(), bytes.to_vec());
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl OtaClient for MockClient {
    fn download_component(
        &self,
        component: &ComponentDescriptor,
        sink: &mut BlockSink<'_>,
    ) -> Result<(), ClientError> {
        let name = component.artifact_name();
        self.requests.lock().unwrap().push(name.clone());

        let data = self
            .artifacts
            .get(&name)
            .ok_or_else(|| ClientError::Unavailable(name.clone()))?;
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![&data[..]]
        } else {
            data.chunks(self.block_size).collect()
        };

        for (i, chunk) in chunks.iter().copied().enumerate() {
            if i == 1 && self.broken.contains(&name) {
                return Err(ClientError::Transfer("connection reset".into()));
            }
            sink(Block { index: i as u32, data: chunk, is_last: i + 1 == chunks.len() })?;
        }
        Ok(())
    }
}

fn component(package: &str, version: &str) -> ManifestComponent {
    ManifestComponent {
        package: package.into(),
        version: version.into(),
        ..Default::default()
    }
}

fn manifest(components: Vec<ManifestComponent>) -> Manifest {
    Manifest { sequence_number: 7, hash: None, components }
}

struct Pipeline {
    dir: TempDir,
    listener: ManifestListener,
    worker: DownloadWorker,
}

fn pipeline(capacity: usize, extra_packages: Vec<String>) -> Pipeline {
    let dir = TempDir::new().unwrap();
    let (producer, consumer) = download_queue(DownloadQueueConfig { capacity });
    let listener = ManifestListener::new(
        producer,
        ListenerConfig { extra_packages, ..Default::default() },
    );
    let selection = ModelSelection::open(SelectionStore::new(dir.path().join("selected_model")));
    let worker = DownloadWorker::new(
        consumer,
        WorkerConfig { mount_point: dir.path().to_path_buf(), ..Default::default() },
        selection,
    );
    Pipeline { dir, listener, worker }
}

fn path_string(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

#[test]
fn test_enqueues_min_of_matches_and_capacity() {
    for (matches, capacity) in [(0, 4), (2, 4), (4, 4), (6, 4), (3, 1)] {
        let p = pipeline(capacity, Vec::new());
        let components = (0..matches).map(|i| component("model", &format!("1.{}", i))).collect();

        let report = p.listener.on_manifest(Ok(manifest(components)));
        assert_eq!(report.enqueued, matches.min(capacity), "N={} C={}", matches, capacity);
        assert_eq!(report.dropped, matches.saturating_sub(capacity));
    }
}

#[test]
fn test_model_and_audio_scenario() {
    let mut p = pipeline(4, Vec::new());
    let client = MockClient::new(4).with("model_1.0", b"GLTHBEGIN;a;GLTHEND\nxx");

    let report = p.listener.on_manifest(Ok(manifest(vec![
        component("model", "1.0"),
        component("audio", "2.0"),
    ])));
    assert_eq!(report.enqueued, 1);
    assert_eq!(report.skipped, 1);

    let poll = p.worker.poll(&client);
    assert_eq!(poll.downloaded, 1);
    assert_eq!(client.requests(), ["model_1.0"]);

    let expected = path_string(p.dir.path(), "model_1.0");
    assert_eq!(poll.selection, SelectionUpdate::Updated(expected.clone()));
    assert_eq!(p.worker.selection().current(), Some(expected.as_str()));
    assert!(p.worker.selection().new_model_available());
    assert!(!p.dir.path().join("audio_2.0").exists());

    let written = std::fs::read(p.dir.path().join("model_1.0")).unwrap();
    assert_eq!(written, b"GLTHBEGIN;a;GLTHEND\nxx");
}

#[test]
fn test_extra_packages_download_but_do_not_select() {
    let mut p = pipeline(4, vec!["labels".into()]);
    let client = MockClient::new(16).with("labels_3.1", b"yes\nno\n");

    p.listener.on_manifest(Ok(manifest(vec![component("labels", "3.1")])));
    let poll = p.worker.poll(&client);

    assert_eq!(poll.downloaded, 1);
    assert_eq!(poll.candidate, None);
    assert_eq!(poll.selection, SelectionUpdate::NoCandidate);
    assert!(p.dir.path().join("labels_3.1").exists());
}

#[test]
fn test_redelivery_writes_nothing_and_keeps_selection() {
    let mut p = pipeline(4, Vec::new());
    let client = MockClient::new(4).with("model_1.0", b"first contents");

    p.listener.on_manifest(Ok(manifest(vec![component("model", "1.0")])));
    p.worker.poll(&client);
    assert!(p.worker.selection_mut().take_new_model().is_some());

    // Same release again, with different bytes on the server.
    let client = MockClient::new(4).with("model_1.0", b"second contents");
    p.listener.on_manifest(Ok(manifest(vec![component("model", "1.0")])));
    let poll = p.worker.poll(&client);

    assert_eq!(poll.already_present, 1);
    assert_eq!(poll.bytes_written, 0);
    assert!(client.requests().is_empty());
    assert_eq!(poll.selection, SelectionUpdate::Unchanged);
    assert!(!p.worker.selection().new_model_available());
    assert_eq!(std::fs::read(p.dir.path().join("model_1.0")).unwrap(), b"first contents");
}

#[test]
fn test_last_model_in_drain_wins() {
    let mut p = pipeline(4, Vec::new());
    let client = MockClient::new(8)
        .with("model_1.0", b"one")
        .with("model_1.1", b"two")
        .with("model_1.2", b"three");

    p.listener.on_manifest(Ok(manifest(vec![
        component("model", "1.0"),
        component("model", "1.1"),
        component("model", "1.2"),
    ])));
    let poll = p.worker.poll(&client);

    assert_eq!(poll.downloaded, 3);
    assert_eq!(client.requests(), ["model_1.0", "model_1.1", "model_1.2"]);
    assert_eq!(p.worker.selection().current(), Some(path_string(p.dir.path(), "model_1.2").as_str()));

    let persisted = p.worker.selection().store().load().unwrap();
    assert_eq!(persisted, Some(path_string(p.dir.path(), "model_1.2")));
}

#[test]
fn test_failed_download_still_selects_and_leaves_partial_file() {
    let mut p = pipeline(4, Vec::new());
    let mut client = MockClient::new(4).with("model_2.0", b"0123456789");
    client.broken.push("model_2.0".into());

    p.listener.on_manifest(Ok(manifest(vec![component("model", "2.0")])));
    let poll = p.worker.poll(&client);

    let expected = path_string(p.dir.path(), "model_2.0");
    assert_eq!(poll.failed, 1);
    assert_eq!(poll.candidate, Some(expected.clone()));
    assert_eq!(poll.selection, SelectionUpdate::Updated(expected.clone()));
    assert_eq!(p.worker.selection().current(), Some(expected.as_str()));
    assert!(p.worker.selection().new_model_available());

    // The partial artifact stays behind and is never fetched again.
    let partial = p.dir.path().join("model_2.0");
    assert_eq!(std::fs::read(&partial).unwrap(), b"0123");

    let retry = MockClient::new(4).with("model_2.0", b"0123456789");
    p.listener.on_manifest(Ok(manifest(vec![component("model", "2.0")])));
    let poll = p.worker.poll(&retry);
    assert_eq!(poll.already_present, 1);
    assert!(retry.requests().is_empty());
    assert_eq!(poll.selection, SelectionUpdate::Unchanged);
}

#[test]
fn test_failed_open_is_skipped_and_queue_keeps_draining() {
    let dir = TempDir::new().unwrap();
    let client = MockClient::new(4).with("model_1.0", b"a").with("model_1.1", b"b");
    let (producer, consumer) = download_queue(DownloadQueueConfig { capacity: 4 });
    let listener = ManifestListener::new(producer, ListenerConfig::default());
    // The mount point does not exist, so every open fails.
    let mut worker = DownloadWorker::new(
        consumer,
        WorkerConfig { mount_point: dir.path().join("missing"), ..Default::default() },
        ModelSelection::open(SelectionStore::new(dir.path().join("selected_model"))),
    );

    listener.on_manifest(Ok(manifest(vec![component("model", "1.0"), component("model", "1.1")])));
    let poll = worker.poll(&client);

    assert_eq!(poll.processed, 2);
    assert_eq!(poll.failed, 2);
    assert!(client.requests().is_empty());
    // Selection bookkeeping runs even though nothing was written.
    let expected = dir.path().join("missing").join("model_1.1").to_string_lossy().into_owned();
    assert_eq!(worker.selection().current(), Some(expected.as_str()));
}

#[test]
fn test_unavailable_artifact_is_reported_per_item() {
    let mut p = pipeline(4, Vec::new());
    let client = MockClient::new(4).with("model_1.1", b"GLTHBEGIN;GLTHEND\n");

    p.listener.on_manifest(Ok(manifest(vec![component("model", "1.0"), component("model", "1.1")])));
    let poll = p.worker.poll(&client);

    assert_eq!(poll.failed, 1);
    assert_eq!(poll.downloaded, 1);
    assert_eq!(poll.candidate, Some(path_string(p.dir.path(), "model_1.1")));
}

#[test]
fn test_empty_artifact_downloads_as_empty_file() {
    let mut p = pipeline(4, Vec::new());
    let client = MockClient::new(4).with("model_0.1", b"");

    p.listener.on_manifest(Ok(manifest(vec![component("model", "0.1")])));
    let poll = p.worker.poll(&client);

    assert_eq!(poll.downloaded, 1);
    assert_eq!(std::fs::metadata(p.dir.path().join("model_0.1")).unwrap().len(), 0);
}

#[test]
fn test_runtime_restarts_on_swap_by_default() {
    let dir = TempDir::new().unwrap();
    let client = MockClient::new(64)
        .with("model_1.0", b"GLTHBEGIN;a;GLTHEND\none")
        .with("model_2.0", b"GLTHBEGIN;b;GLTHEND\ntwo");
    let mut runtime = Runtime::new(RuntimeConfig::with_mount_point(dir.path()));

    runtime.listener().on_manifest(Ok(manifest(vec![component("model", "1.0")])));
    assert!(matches!(runtime.step(&client).outcome, StepOutcome::ModelLoaded(_)));

    runtime.listener().on_manifest(Ok(manifest(vec![component("model", "2.0")])));
    assert!(matches!(runtime.step(&client).outcome, StepOutcome::RestartRequired(_)));

    // After the restart the persisted selection is what gets loaded.
    drop(runtime);
    let mut restarted = Runtime::new(RuntimeConfig::with_mount_point(dir.path()));
    assert!(matches!(restarted.bootstrap(), StepOutcome::ModelLoaded(_)));
    assert_eq!(restarted.model().unwrap().labels(), ["b"]);
}

#[test]
fn test_runtime_swaps_in_place_when_configured() {
    let dir = TempDir::new().unwrap();
    let client = MockClient::new(64)
        .with("model_1.0", b"GLTHBEGIN;a;GLTHEND\none")
        .with("model_2.0", b"GLTHBEGIN;b;GLTHEND\ntwo");
    let config = RuntimeConfig { restart_on_swap: false, ..RuntimeConfig::with_mount_point(dir.path()) };
    let mut runtime = Runtime::new(config);

    runtime.listener().on_manifest(Ok(manifest(vec![component("model", "1.0")])));
    runtime.step(&client);
    runtime.listener().on_manifest(Ok(manifest(vec![component("model", "2.0")])));
    let report = runtime.step(&client);

    assert!(matches!(report.outcome, StepOutcome::ModelLoaded(_)));
    assert_eq!(runtime.model().unwrap().payload(), &b"two"[..]);
}

#[test]
fn test_runtime_idle_step_does_nothing() {
    let dir = TempDir::new().unwrap();
    let mut runtime = Runtime::new(RuntimeConfig::with_mount_point(dir.path()));
    let report = runtime.step(&MockClient::new(4));
    assert_eq!(report.poll.processed, 0);
    assert!(matches!(report.outcome, StepOutcome::Idle));
}
