use std::sync::Arc;
use std::time::Duration;

use s3_multipart_core::{
    DownloadOptions, EngineError, EngineEvent, EventHandler, FileKvStore, InMemoryEngine,
    InMemoryKvStore, KvStore, Platform, SetupBasicOptions, Task, TaskView, TransferClient,
    TransferKind, UploadOptions,
};
use tokio::sync::mpsc;

type Captured = (Option<EngineError>, TaskView);

fn capture_handler() -> (EventHandler, mpsc::UnboundedReceiver<Captured>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: EventHandler = Arc::new(move |error, view| {
        let _ = tx.send((error.cloned(), view.clone()));
    });
    (handler, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Captured>) -> Captured {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for dispatch")
        .expect("dispatch channel closed")
}

fn progress_event(id: &str, state: Option<&str>, bytes: Option<u64>, total: Option<u64>) -> EngineEvent {
    EngineEvent {
        task: Some(Task {
            id: id.to_string(),
            state: state.map(str::to_string),
            bytes,
            total_bytes: total,
        }),
        error: None,
    }
}

#[tokio::test]
async fn ios_upload_event_reconciliation() {
    let engine = Arc::new(InMemoryEngine::with_initial_state("running"));
    let client = TransferClient::new(
        Some(engine.clone()),
        Arc::new(InMemoryKvStore::new()),
        Platform::Ios,
    )
    .unwrap();
    assert!(
        client
            .setup_with_basic(SetupBasicOptions::new("AK", "SK"))
            .await
            .unwrap()
    );

    let seeded = client
        .upload(
            UploadOptions::new("media", "clips/a.mov", "file:///tmp/a.mov"),
            serde_json::json!({"album": "trip"}),
        )
        .await
        .unwrap();
    assert_eq!(seeded.bucket.as_deref(), Some("media"));
    assert_eq!(seeded.key.as_deref(), Some("clips/a.mov"));
    assert_eq!(seeded.others, Some(serde_json::json!({"album": "trip"})));
    // iOS seeds the native task's initial state into the metadata.
    assert_eq!(seeded.state.as_deref(), Some("running"));

    let (handler, mut rx) = capture_handler();
    assert!(client.subscribe(&seeded.id, handler).await);

    engine.emit(progress_event(&seeded.id, Some("running"), Some(500), Some(1000)));
    let (error, view) = recv(&mut rx).await;
    assert!(error.is_none());
    assert_eq!(view.bytes, Some(500));
    assert_eq!(view.total_bytes, Some(1000));
    assert_eq!(view.bucket.as_deref(), Some("media"));

    // A byte-less state transition only moves the state forward.
    engine.emit(progress_event(&seeded.id, Some("stopped"), None, None));
    let (_, view) = recv(&mut rx).await;
    assert_eq!(view.state.as_deref(), Some("stopped"));
    assert_eq!(view.bytes, Some(500));
    assert_eq!(view.total_bytes, Some(1000));

    client.shutdown().await;
}

#[tokio::test]
async fn engine_errors_pass_through_to_subscribers() {
    let engine = Arc::new(InMemoryEngine::new());
    let client = TransferClient::new(
        Some(engine.clone()),
        Arc::new(InMemoryKvStore::new()),
        Platform::Android,
    )
    .unwrap();

    let seeded = client
        .upload(
            UploadOptions::new("media", "clips/a.mov", "/tmp/a.mov"),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    let (handler, mut rx) = capture_handler();
    assert!(client.subscribe(&seeded.id, handler).await);

    engine.emit(EngineEvent {
        task: Some(Task {
            id: seeded.id.clone(),
            state: None,
            bytes: Some(10),
            total_bytes: None,
        }),
        error: Some(EngineError {
            code: "network".to_string(),
            message: "connection reset".to_string(),
        }),
    });

    let (error, view) = recv(&mut rx).await;
    let error = error.unwrap();
    assert_eq!(error.code, "network");
    assert_eq!(view.bytes, Some(10));

    client.shutdown().await;
}

#[tokio::test]
async fn android_ignores_byteless_events_in_storage() {
    let engine = Arc::new(InMemoryEngine::new());
    let client = TransferClient::new(
        Some(engine.clone()),
        Arc::new(InMemoryKvStore::new()),
        Platform::Android,
    )
    .unwrap();

    let seeded = client
        .upload(
            UploadOptions::new("media", "clips/a.mov", "/tmp/a.mov"),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    let (handler, mut rx) = capture_handler();
    assert!(client.subscribe(&seeded.id, handler).await);

    engine.emit(progress_event(&seeded.id, None, Some(100), None));
    let (_, view) = recv(&mut rx).await;
    assert_eq!(view.bytes, Some(100));

    // Byte-less noise still dispatches but leaves the stored record alone.
    engine.emit(progress_event(&seeded.id, Some("noise"), None, None));
    let (_, _) = recv(&mut rx).await;

    let task = client.get_task(&seeded.id).await.unwrap().unwrap();
    assert_eq!(task.bytes, Some(100));
    assert_eq!(task.bucket.as_deref(), Some("media"));

    client.shutdown().await;
}

#[tokio::test]
async fn metadata_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<dyn KvStore> = Arc::new(FileKvStore::new(dir.path().join("store")));

    let engine = Arc::new(InMemoryEngine::new());
    let client = TransferClient::new(Some(engine), kv.clone(), Platform::Android).unwrap();
    let seeded = client
        .upload(
            UploadOptions::new("media", "clips/a.mov", "/tmp/a.mov"),
            serde_json::json!({"retry": 1}),
        )
        .await
        .unwrap();
    let task_id = seeded.id.clone();
    client.shutdown().await;

    // New process: fresh engine and client over the same persistent store.
    let engine = Arc::new(InMemoryEngine::new());
    let client = TransferClient::new(Some(engine.clone()), kv, Platform::Android).unwrap();

    // The persisted metadata is back, so the subscription gate admits the id.
    let (handler, mut rx) = capture_handler();
    assert!(client.subscribe(&task_id, handler).await);

    engine.emit(progress_event(&task_id, None, Some(42), None));
    let (_, view) = recv(&mut rx).await;
    assert_eq!(view.bucket.as_deref(), Some("media"));
    assert_eq!(view.others, Some(serde_json::json!({"retry": 1})));
    assert_eq!(view.bytes, Some(42));

    client.shutdown().await;
}

#[tokio::test]
async fn duplicate_subscription_fires_once_and_unsubscribe_all_silences() {
    let engine = Arc::new(InMemoryEngine::new());
    let client = TransferClient::new(
        Some(engine.clone()),
        Arc::new(InMemoryKvStore::new()),
        Platform::Android,
    )
    .unwrap();

    let first = client
        .upload(
            UploadOptions::new("media", "a".to_string(), "/tmp/a"),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    let second = client
        .upload(
            UploadOptions::new("media", "b".to_string(), "/tmp/b"),
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let (handler, mut rx_first) = capture_handler();
    assert!(client.subscribe(&first.id, handler.clone()).await);
    assert!(client.subscribe(&first.id, handler).await);

    engine.emit(progress_event(&first.id, None, Some(1), None));
    recv(&mut rx_first).await;

    client.unsubscribe(&first.id, None);

    let (other, mut rx_second) = capture_handler();
    assert!(client.subscribe(&second.id, other).await);

    // Dispatch is globally serialized: once the second id's event arrives,
    // the earlier event for the first id has already been processed.
    engine.emit(progress_event(&first.id, None, Some(2), None));
    engine.emit(progress_event(&second.id, None, Some(3), None));
    recv(&mut rx_second).await;

    assert!(rx_first.try_recv().is_err());

    client.shutdown().await;
}

#[tokio::test]
async fn list_queries_overlay_metadata() {
    let engine = Arc::new(InMemoryEngine::new());
    let client = TransferClient::new(
        Some(engine),
        Arc::new(InMemoryKvStore::new()),
        Platform::Android,
    )
    .unwrap();

    let up_a = client
        .upload(
            UploadOptions::new("media", "a", "/tmp/a"),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    let up_b = client
        .upload(
            UploadOptions::new("media", "b", "/tmp/b"),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    client
        .download(
            DownloadOptions::new("media", "c", "/tmp/c"),
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let uploads = client.get_tasks(TransferKind::Upload).await.unwrap();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|v| v.bucket.as_deref() == Some("media")));

    let by_id = client.get_tasks_by_id(TransferKind::Upload).await.unwrap();
    assert_eq!(by_id.len(), 2);
    assert_eq!(by_id[&up_a.id].key.as_deref(), Some("a"));
    assert_eq!(by_id[&up_b.id].key.as_deref(), Some("b"));

    let downloads = client.get_tasks(TransferKind::Download).await.unwrap();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].key.as_deref(), Some("c"));

    client.shutdown().await;
}

#[tokio::test]
async fn delete_record_drops_engine_task_but_keeps_metadata() {
    let engine = Arc::new(InMemoryEngine::new());
    let client = TransferClient::new(
        Some(engine),
        Arc::new(InMemoryKvStore::new()),
        Platform::Android,
    )
    .unwrap();

    let seeded = client
        .upload(
            UploadOptions::new("media", "clips/a.mov", "/tmp/a.mov"),
            serde_json::json!({}),
        )
        .await
        .unwrap();

    client.delete_record(&seeded.id).await.unwrap();
    assert!(client.get_task(&seeded.id).await.unwrap().is_none());

    // Metadata is retained; the subscription gate still admits the id.
    let (handler, _rx) = capture_handler();
    assert!(client.subscribe(&seeded.id, handler).await);

    client.shutdown().await;
}
