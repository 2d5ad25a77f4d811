//! End-to-end pipeline tests against a mock gallery server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use tokio_util::sync::CancellationToken;

use gallery_client::{GalleryClient, GalleryConfig, UploadTarget};
use import_session::{CoordinatorState, ImportCoordinator, ImportSession};
use transfer_progress::{
    FailureKind, FileTransferUpdate, ImportOutcome, ImportStatus, NoOpProgressObserver, UploadProgressObserver,
};

#[derive(Debug, Default)]
struct RecordingObserver {
    updates: Mutex<Vec<FileTransferUpdate>>,
}

#[async_trait]
impl UploadProgressObserver for RecordingObserver {
    async fn upload_progress(&self, update: FileTransferUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

fn test_client(server: &MockServer, chunk_size: usize) -> Arc<GalleryClient> {
    let mut config = GalleryConfig::for_host(&server.base_url());
    config.chunk_size = chunk_size;
    config.poll_interval = Duration::from_millis(5);
    Arc::new(GalleryClient::new(config, &None).unwrap())
}

/// Root file plus two resources, sized so the root needs two chunks at the
/// 512 byte test chunk size.
fn write_asset_files(dir: &tempfile::TempDir) -> (UploadTarget, Vec<UploadTarget>) {
    let root_path = dir.path().join("model.obj");
    std::fs::write(&root_path, vec![b'o'; 700]).unwrap();
    let mtl_path = dir.path().join("model.mtl");
    std::fs::write(&mtl_path, vec![b'm'; 300]).unwrap();
    let tex_path = dir.path().join("tex.png");
    std::fs::write(&tex_path, vec![b't'; 450]).unwrap();

    (
        UploadTarget::from_path(root_path),
        vec![UploadTarget::from_path(mtl_path), UploadTarget::from_path(tex_path)],
    )
}

fn state_label(state: &CoordinatorState) -> &'static str {
    match state {
        CoordinatorState::UploadingRoot => "root",
        CoordinatorState::UploadingResource(0) => "res0",
        CoordinatorState::UploadingResource(1) => "res1",
        CoordinatorState::UploadingResource(_) => "resN",
        CoordinatorState::AwaitingImportSubmit => "submit",
        CoordinatorState::PollingOperation => "poll",
        CoordinatorState::Finished(_) => "finished",
        CoordinatorState::Cancelled => "cancelled",
    }
}

#[tokio::test]
async fn pipeline_visits_states_in_order_and_completes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;
    let submit = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport").json_body(serde_json::json!({
                "importFormat": {
                    "root": "el-1",
                    "resources": ["el-1", "el-1"],
                    "formatType": "OBJ"
                }
            }));
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-1", "done": false}));
        })
        .await;
    let poll = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/operations/op-1");
            then.status(200).json_body(serde_json::json!({
                "name": "operations/op-1",
                "done": true,
                "response": {"assetId": "a1", "publishUrl": "http://x"}
            }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (root, resources) = write_asset_files(&dir);
    let observer = Arc::new(RecordingObserver::default());
    let mut coordinator = ImportCoordinator::new(
        test_client(&server, 512),
        root,
        resources,
        observer.clone(),
        CancellationToken::new(),
    );

    assert_eq!(coordinator.state(), &CoordinatorState::UploadingRoot);

    let mut visited = Vec::new();
    let final_status = loop {
        let status = coordinator.step().await;
        if visited.last() != Some(&state_label(coordinator.state())) {
            visited.push(state_label(coordinator.state()));
        }
        if status.is_terminal() {
            break status;
        }
    };

    assert_eq!(visited, vec!["root", "res0", "res1", "submit", "poll", "finished"]);

    let ImportStatus::Finished(ImportOutcome::Completed { result: Some(result) }) = final_status else {
        panic!("unexpected terminal status: {final_status:?}");
    };
    assert_eq!(result.asset_id.as_deref(), Some("a1"));
    assert_eq!(result.publish_url.as_deref(), Some("http://x"));

    submit.assert_async().await;
    poll.assert_async().await;

    // Per-chunk updates arrive in upload order with monotone byte counts.
    let updates = observer.updates.lock().unwrap();
    let names: Vec<&str> = updates.iter().map(|u| u.file_name.as_ref()).collect();
    let first_mtl = names.iter().position(|n| *n == "model.mtl").unwrap();
    let first_tex = names.iter().position(|n| *n == "tex.png").unwrap();
    assert!(names[..first_mtl].iter().all(|n| *n == "model.obj"));
    assert!(first_mtl < first_tex);

    for (file_name, total) in [("model.obj", 700u64), ("model.mtl", 300u64), ("tex.png", 450u64)] {
        let file_updates: Vec<_> = updates.iter().filter(|u| u.file_name.as_ref() == file_name).collect();
        assert!(!file_updates.is_empty());
        assert!(file_updates.windows(2).all(|w| w[0].bytes_sent <= w[1].bytes_sent));
        let last = file_updates.last().unwrap();
        assert_eq!(last.bytes_sent, total);
        assert_eq!(last.total_bytes, total);
        assert_eq!(last.total_files, 3);
    }
}

#[tokio::test]
async fn root_only_import_skips_resource_states() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-root"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport").json_body(serde_json::json!({
                "importFormat": {"root": "el-root", "resources": [], "formatType": "OBJ"}
            }));
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-2", "done": true}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root_path = dir.path().join("solo.obj");
    std::fs::write(&root_path, b"just a root file").unwrap();

    let mut coordinator = ImportCoordinator::new(
        test_client(&server, 512),
        UploadTarget::from_path(root_path),
        vec![],
        NoOpProgressObserver::new(),
        CancellationToken::new(),
    );

    let mut saw_resource_state = false;
    let final_status = loop {
        let status = coordinator.step().await;
        saw_resource_state |= matches!(coordinator.state(), CoordinatorState::UploadingResource(_));
        if status.is_terminal() {
            break status;
        }
    };

    assert!(!saw_resource_state);
    // done=true straight from the submit response; no poll needed.
    assert!(matches!(
        final_status,
        ImportStatus::Finished(ImportOutcome::Completed { result: None })
    ));
}

#[tokio::test]
async fn cancellation_mid_resource_never_reaches_submit() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;
    let submit = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport");
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-3", "done": true}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (root, resources) = write_asset_files(&dir);
    let cancel = CancellationToken::new();
    let mut coordinator = ImportCoordinator::new(
        test_client(&server, 512),
        root,
        resources,
        NoOpProgressObserver::new(),
        cancel.clone(),
    );

    // Drive until the second resource upload is underway, then cancel.
    while coordinator.state() != &CoordinatorState::UploadingResource(1) {
        let status = coordinator.step().await;
        assert!(!status.is_terminal(), "pipeline ended before resource 1");
    }
    cancel.cancel();

    let status = coordinator.step().await;
    assert!(matches!(status, ImportStatus::Cancelled));
    assert_eq!(coordinator.state(), &CoordinatorState::Cancelled);
    assert_eq!(submit.hits_async().await, 0);

    // Terminal: further steps change nothing and do no I/O.
    let status = coordinator.step().await;
    assert!(matches!(status, ImportStatus::Cancelled));
    assert_eq!(submit.hits_async().await, 0);
}

#[tokio::test]
async fn submit_failure_is_terminal_without_polling() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport");
            then.status(500);
        })
        .await;
    let poll = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/v1/operations");
            then.status(200);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root_path = dir.path().join("model.obj");
    std::fs::write(&root_path, b"obj data").unwrap();

    let mut coordinator = ImportCoordinator::new(
        test_client(&server, 512),
        UploadTarget::from_path(root_path),
        vec![],
        NoOpProgressObserver::new(),
        CancellationToken::new(),
    );

    let final_status = loop {
        let status = coordinator.step().await;
        if status.is_terminal() {
            break status;
        }
    };

    let ImportStatus::Finished(ImportOutcome::Failed(failure)) = final_status else {
        panic!("expected a failed import, got {final_status:?}");
    };
    assert_eq!(failure.kind, FailureKind::Submit);
    assert!(failure.message.contains("500"));
    assert_eq!(poll.hits_async().await, 0);
}

#[tokio::test]
async fn upload_rejection_aborts_the_whole_sequence() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(403);
        })
        .await;
    let submit = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport");
            then.status(200);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (root, resources) = write_asset_files(&dir);
    let mut coordinator = ImportCoordinator::new(
        test_client(&server, 512),
        root,
        resources,
        NoOpProgressObserver::new(),
        CancellationToken::new(),
    );

    let final_status = loop {
        let status = coordinator.step().await;
        if status.is_terminal() {
            break status;
        }
    };

    let ImportStatus::Finished(ImportOutcome::Failed(failure)) = final_status else {
        panic!("expected a failed import, got {final_status:?}");
    };
    assert_eq!(failure.kind, FailureKind::Upload);
    assert_eq!(submit.hits_async().await, 0);
}

#[tokio::test]
async fn missing_local_file_fails_before_any_network_call() {
    let server = MockServer::start_async().await;
    let uploads = server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200);
        })
        .await;

    let mut coordinator = ImportCoordinator::new(
        test_client(&server, 512),
        UploadTarget::from_path("/no/such/model.obj"),
        vec![],
        NoOpProgressObserver::new(),
        CancellationToken::new(),
    );

    let status = coordinator.step().await;
    let ImportStatus::Finished(ImportOutcome::Failed(failure)) = status else {
        panic!("expected a failed import, got {status:?}");
    };
    assert_eq!(failure.kind, FailureKind::LocalIo);
    assert_eq!(uploads.hits_async().await, 0);
}

#[tokio::test]
async fn oversized_file_is_rejected_before_any_bytes_are_sent() {
    let server = MockServer::start_async().await;
    let uploads = server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root_path = dir.path().join("model.obj");
    std::fs::write(&root_path, vec![b'o'; 2000]).unwrap();

    let client = {
        let mut config = GalleryConfig::for_host(&server.base_url());
        config.max_upload_bytes = Some(1000);
        Arc::new(GalleryClient::new(config, &None).unwrap())
    };
    let mut coordinator = ImportCoordinator::new(
        client,
        UploadTarget::from_path(root_path),
        vec![],
        NoOpProgressObserver::new(),
        CancellationToken::new(),
    );

    let status = coordinator.step().await;
    let ImportStatus::Finished(ImportOutcome::Failed(failure)) = status else {
        panic!("expected a failed import, got {status:?}");
    };
    assert_eq!(failure.kind, FailureKind::LocalIo);
    assert_eq!(uploads.hits_async().await, 0);
}

#[tokio::test]
async fn fatal_diagnostic_in_submit_response_fails_without_polling() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport");
            then.status(200).json_body(serde_json::json!({
                "name": "operations/op-4",
                "done": true,
                "response": {"assetImportMessages": [{"code": "FATAL_ERROR", "detail": "degenerate mesh"}]}
            }));
        })
        .await;
    let poll = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/v1/operations");
            then.status(200);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root_path = dir.path().join("model.obj");
    std::fs::write(&root_path, b"obj data").unwrap();

    let mut coordinator = ImportCoordinator::new(
        test_client(&server, 512),
        UploadTarget::from_path(root_path),
        vec![],
        NoOpProgressObserver::new(),
        CancellationToken::new(),
    );

    let final_status = loop {
        let status = coordinator.step().await;
        if status.is_terminal() {
            break status;
        }
    };

    let ImportStatus::Finished(ImportOutcome::Failed(failure)) = final_status else {
        panic!("expected a failed import, got {final_status:?}");
    };
    assert_eq!(failure.kind, FailureKind::ResultFatal);
    assert!(failure.message.contains("degenerate mesh"));
    assert_eq!(poll.hits_async().await, 0);
}

#[tokio::test]
async fn operation_error_from_poll_is_surfaced_verbatim() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport");
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-5", "done": false}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/operations/op-5");
            then.status(200).json_body(serde_json::json!({
                "name": "operations/op-5",
                "error": {"message": "mesh exploded"}
            }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root_path = dir.path().join("model.obj");
    std::fs::write(&root_path, b"obj data").unwrap();

    let mut coordinator = ImportCoordinator::new(
        test_client(&server, 512),
        UploadTarget::from_path(root_path),
        vec![],
        NoOpProgressObserver::new(),
        CancellationToken::new(),
    );

    let final_status = loop {
        let status = coordinator.step().await;
        if status.is_terminal() {
            break status;
        }
    };

    let ImportStatus::Finished(ImportOutcome::Failed(failure)) = final_status else {
        panic!("expected a failed import, got {final_status:?}");
    };
    assert_eq!(failure.kind, FailureKind::Operation);
    assert_eq!(failure.message, "Error: mesh exploded");
}

#[tokio::test]
async fn poll_budget_exhaustion_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport");
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-6", "done": false}));
        })
        .await;
    let poll = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/operations/op-6");
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-6", "done": false}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root_path = dir.path().join("model.obj");
    std::fs::write(&root_path, b"obj data").unwrap();

    let server_client = {
        let mut config = GalleryConfig::for_host(&server.base_url());
        config.chunk_size = 512;
        config.poll_interval = Duration::from_millis(1);
        config.max_poll_attempts = Some(2);
        Arc::new(GalleryClient::new(config, &None).unwrap())
    };
    let mut coordinator = ImportCoordinator::new(
        server_client,
        UploadTarget::from_path(root_path),
        vec![],
        NoOpProgressObserver::new(),
        CancellationToken::new(),
    );

    let final_status = loop {
        let status = coordinator.step().await;
        if status.is_terminal() {
            break status;
        }
    };

    let ImportStatus::Finished(ImportOutcome::Failed(failure)) = final_status else {
        panic!("expected a failed import, got {final_status:?}");
    };
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(poll.hits_async().await, 2);
}

#[tokio::test]
async fn session_runs_in_background_and_publishes_snapshots() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport");
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-7", "done": false}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/operations/op-7");
            then.status(200).json_body(serde_json::json!({
                "name": "operations/op-7",
                "done": true,
                "response": {"assetId": "a7", "publishUrl": "http://gallery/a7"}
            }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (root, resources) = write_asset_files(&dir);
    let observer = Arc::new(RecordingObserver::default());

    let mut session = ImportSession::start(test_client(&server, 512), root, resources, observer.clone());
    let final_status = session.wait().await.unwrap();

    let ImportStatus::Finished(ImportOutcome::Completed { result: Some(result) }) = final_status else {
        panic!("unexpected terminal status: {final_status:?}");
    };
    assert_eq!(result.asset_id.as_deref(), Some("a7"));
    assert!(session.is_terminal());
    assert!(!observer.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn session_cancel_goes_terminal_without_finishing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(200).json_body(serde_json::json!({"elementId": "el-1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/assets:startImport");
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-8", "done": false}));
        })
        .await;
    // The operation never finishes, so cancellation is always what ends it.
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/operations/op-8");
            then.status(200)
                .json_body(serde_json::json!({"name": "operations/op-8", "done": false}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (root, resources) = write_asset_files(&dir);

    let mut session = ImportSession::start(test_client(&server, 512), root, resources, NoOpProgressObserver::new());

    tokio::time::sleep(Duration::from_millis(20)).await;
    session.cancel();
    let final_status = session.wait().await.unwrap();

    assert!(matches!(final_status, ImportStatus::Cancelled));
    assert!(matches!(session.status(), ImportStatus::Cancelled));
}
