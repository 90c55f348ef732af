use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{EngineEvent, TransferEngine};
use crate::extra_store::TaskExtraStore;
use crate::kv::KvStore;
use crate::options::{DownloadOptions, SetupBasicOptions, SetupCognitoOptions, UploadOptions};
use crate::platform::Platform;
use crate::registry::{EventHandler, SubscriberRegistry};
use crate::task::{Task, TaskExtra, TaskView, TransferKind};
use crate::{Error, Result};

/// Reconciliation layer between the native transfer engine and application
/// code: enriches native task descriptors with persisted metadata and fans
/// merged views out to per-task subscribers.
///
/// Construct once per process with an injected engine handle and persistent
/// store, and share by reference.
pub struct TransferClient {
    engine: Arc<dyn TransferEngine>,
    store: Arc<TaskExtraStore>,
    subscribers: Arc<SubscriberRegistry>,
    platform: Platform,
    bridge_cancel: CancellationToken,
    bridge: Option<JoinHandle<()>>,
}

impl TransferClient {
    /// Fails fast when no engine handle could be acquired, instead of
    /// deferring a linking error to first use. Must be called inside a Tokio
    /// runtime; the event bridge is spawned here.
    pub fn new(
        engine: Option<Arc<dyn TransferEngine>>,
        kv: Arc<dyn KvStore>,
        platform: Platform,
    ) -> Result<Self> {
        let engine = engine.ok_or_else(|| Error::EngineUnavailable {
            message: "no native transfer engine handle; check that the platform module is \
                      linked and the app was rebuilt after installing it"
                .to_string(),
        })?;
        let events = engine.take_events().ok_or_else(|| Error::EngineUnavailable {
            message: "engine event stream already taken; only one client may bridge it"
                .to_string(),
        })?;

        let store = Arc::new(TaskExtraStore::new(kv, platform.merge_policy()));
        let subscribers = Arc::new(SubscriberRegistry::new());
        let bridge_cancel = CancellationToken::new();
        let bridge = tokio::spawn(run_event_bridge(
            events,
            store.clone(),
            subscribers.clone(),
            platform,
            bridge_cancel.clone(),
        ));

        Ok(Self {
            engine,
            store,
            subscribers,
            platform,
            bridge_cancel,
            bridge: Some(bridge),
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub async fn setup_with_native(&self) -> Result<bool> {
        let ok = self.engine.setup_with_native().await?;
        if ok {
            self.finish_setup().await?;
        }
        Ok(ok)
    }

    /// Returns `Ok(false)` without touching the engine when the key pair is
    /// incomplete.
    pub async fn setup_with_basic(&self, options: SetupBasicOptions) -> Result<bool> {
        if options.access_key.is_empty() || options.secret_key.is_empty() {
            return Ok(false);
        }
        let ok = self.engine.setup_with_basic(options).await?;
        if ok {
            self.finish_setup().await?;
        }
        Ok(ok)
    }

    pub async fn setup_with_cognito(&self, options: SetupCognitoOptions) -> Result<bool> {
        if options.identity_pool_id.is_empty() {
            return Ok(false);
        }
        let ok = self.engine.setup_with_cognito(options).await?;
        if ok {
            self.finish_setup().await?;
        }
        Ok(ok)
    }

    async fn finish_setup(&self) -> Result<()> {
        self.store.ensure_loaded().await;
        self.engine.initialize().await
    }

    pub fn enable_progress_events(&self, enabled: bool) {
        self.engine.enable_progress_events(enabled);
    }

    /// Starts an upload and seeds the task's metadata with the caller-supplied
    /// bucket, key, and opaque payload.
    pub async fn upload(
        &self,
        options: UploadOptions,
        others: serde_json::Value,
    ) -> Result<TaskView> {
        let options = options.normalized();
        let bucket = options.bucket.clone();
        let key = options.key.clone();
        let task = self.engine.upload(options).await?;
        Ok(self.seed_extra(task, bucket, key, others).await)
    }

    pub async fn download(
        &self,
        options: DownloadOptions,
        others: serde_json::Value,
    ) -> Result<TaskView> {
        let options = options.normalized();
        let bucket = options.bucket.clone();
        let key = options.key.clone();
        let task = self.engine.download(options).await?;
        Ok(self.seed_extra(task, bucket, key, others).await)
    }

    async fn seed_extra(
        &self,
        task: Task,
        bucket: String,
        key: String,
        others: serde_json::Value,
    ) -> TaskView {
        let extra = TaskExtra {
            bucket: Some(bucket),
            key: Some(key),
            others: Some(others),
            state: if self.platform.seeds_state() {
                task.state.clone()
            } else {
                None
            },
            ..TaskExtra::default()
        };
        self.store.set_and_persist(&task, extra, true).await
    }

    pub fn pause(&self, id: &str) {
        self.engine.pause(id);
    }

    pub fn resume(&self, id: &str) {
        self.engine.resume(id);
    }

    pub fn cancel(&self, id: &str) {
        self.engine.cancel(id);
    }

    pub fn cancel_all_uploads(&self) {
        self.engine.cancel_all_uploads();
    }

    /// Drops the engine's record of a finished transfer. Android only; iOS
    /// engines keep no deletable record. The stored metadata is retained
    /// either way so late read-path queries stay enriched.
    pub async fn delete_record(&self, id: &str) -> Result<()> {
        if self.platform != Platform::Android {
            return Err(Error::Unsupported {
                operation: "delete_record",
                platform: self.platform,
            });
        }
        self.engine.delete_record(id).await
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<TaskView>> {
        match self.engine.get_task(id).await? {
            Some(task) => Ok(Some(self.store.overlay(&task).await)),
            None => Ok(None),
        }
    }

    pub async fn get_tasks(&self, kind: TransferKind) -> Result<Vec<TaskView>> {
        let tasks = self.engine.get_tasks(kind).await?;
        let mut views = Vec::with_capacity(tasks.len());
        for task in &tasks {
            views.push(self.store.overlay(task).await);
        }
        Ok(views)
    }

    pub async fn get_tasks_by_id(&self, kind: TransferKind) -> Result<HashMap<String, TaskView>> {
        let views = self.get_tasks(kind).await?;
        Ok(views
            .into_iter()
            .map(|view| (view.id.clone(), view))
            .collect())
    }

    /// Registers `handler` for merged events on `id`. Returns `false` when no
    /// metadata exists for the id yet: a transfer that has not been initiated
    /// or observed cannot be subscribed to.
    pub async fn subscribe(&self, id: &str, handler: EventHandler) -> bool {
        if !self.store.contains(id).await {
            return false;
        }
        self.subscribers.subscribe(id, handler);
        true
    }

    pub fn unsubscribe(&self, id: &str, handler: Option<&EventHandler>) {
        self.subscribers.unsubscribe(id, handler);
    }

    /// Stops the event bridge and waits for any in-flight dispatch to finish.
    pub async fn shutdown(mut self) {
        self.bridge_cancel.cancel();
        if let Some(bridge) = self.bridge.take() {
            let _ = bridge.await;
        }
    }
}

impl Drop for TransferClient {
    fn drop(&mut self) {
        self.bridge_cancel.cancel();
    }
}

/// Single subscription to the engine's event channel. Each event is merged
/// into the store and dispatched before the next one is taken, so handler
/// invocation is globally serialized.
async fn run_event_bridge(
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    store: Arc<TaskExtraStore>,
    subscribers: Arc<SubscriberRegistry>,
    platform: Platform,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        store.ensure_loaded().await;

        let Some(task) = event.task else {
            // No task id to route by; see the registry contract.
            if let Some(error) = &event.error {
                warn!(code = %error.code, message = %error.message, "dropping task-less engine event");
            }
            continue;
        };

        let incoming = platform.event_fields(&task);
        let view = store.set_and_persist(&task, incoming, false).await;
        subscribers.dispatch(&task.id, event.error.as_ref(), &view);
    }
    debug!("event bridge stopped");
}
