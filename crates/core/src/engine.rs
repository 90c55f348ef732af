use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::options::{DownloadOptions, SetupBasicOptions, SetupCognitoOptions, UploadOptions};
use crate::task::{Task, TransferKind};
use crate::{Error, Result};

/// Error payload carried inside a native event; passed through to subscribers
/// unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineError {
    pub code: String,
    pub message: String,
}

/// One item on the native event stream.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub task: Option<Task>,
    pub error: Option<EngineError>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Contract this layer requires from the platform transfer engine. The engine
/// owns the multipart protocol, retries, credentials, and task lifecycle;
/// this layer only marshals calls and reconciles the event stream.
pub trait TransferEngine: Send + Sync {
    fn setup_with_native<'a>(&'a self) -> BoxFuture<'a, Result<bool>>;

    fn setup_with_basic<'a>(&'a self, options: SetupBasicOptions) -> BoxFuture<'a, Result<bool>>;

    fn setup_with_cognito<'a>(
        &'a self,
        options: SetupCognitoOptions,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Post-setup initialization; the engine starts emitting events after
    /// this returns.
    fn initialize<'a>(&'a self) -> BoxFuture<'a, Result<()>>;

    fn enable_progress_events(&self, enabled: bool);

    fn upload<'a>(&'a self, options: UploadOptions) -> BoxFuture<'a, Result<Task>>;

    fn download<'a>(&'a self, options: DownloadOptions) -> BoxFuture<'a, Result<Task>>;

    fn pause(&self, id: &str);

    fn resume(&self, id: &str);

    fn cancel(&self, id: &str);

    fn cancel_all_uploads(&self);

    fn delete_record<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;

    fn get_task<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Task>>>;

    fn get_tasks<'a>(&'a self, kind: TransferKind) -> BoxFuture<'a, Result<Vec<Task>>>;

    /// Hands out the event stream. Single subscription: `None` after the
    /// first call.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>>;
}

/// Scriptable engine for tests and host-less development: records delegated
/// calls and lets the caller inject events.
pub struct InMemoryEngine {
    initial_state: Option<String>,
    tasks: Mutex<Vec<(TransferKind, Task)>>,
    calls: Mutex<Vec<String>>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            initial_state: None,
            tasks: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Engines on state-reporting platforms include an initial state on the
    /// descriptor returned from upload/download.
    pub fn with_initial_state(state: impl Into<String>) -> Self {
        let mut engine = Self::new();
        engine.initial_state = Some(state.into());
        engine
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("engine calls poisoned").clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .expect("engine calls poisoned")
            .push(call.into());
    }

    fn mint_task(&self, kind: TransferKind) -> Task {
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            state: self.initial_state.clone(),
            bytes: None,
            total_bytes: None,
        };
        self.tasks
            .lock()
            .expect("engine tasks poisoned")
            .push((kind, task.clone()));
        task
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferEngine for InMemoryEngine {
    fn setup_with_native<'a>(&'a self) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.record("setup_with_native");
            Ok(true)
        })
    }

    fn setup_with_basic<'a>(&'a self, options: SetupBasicOptions) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.record(format!("setup_with_basic:{}", options.region));
            Ok(true)
        })
    }

    fn setup_with_cognito<'a>(
        &'a self,
        options: SetupCognitoOptions,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.record(format!("setup_with_cognito:{}", options.identity_pool_id));
            Ok(true)
        })
    }

    fn initialize<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record("initialize");
            Ok(())
        })
    }

    fn enable_progress_events(&self, enabled: bool) {
        self.record(format!("enable_progress_events:{enabled}"));
    }

    fn upload<'a>(&'a self, options: UploadOptions) -> BoxFuture<'a, Result<Task>> {
        Box::pin(async move {
            self.record(format!("upload:{}/{}", options.bucket, options.key));
            Ok(self.mint_task(TransferKind::Upload))
        })
    }

    fn download<'a>(&'a self, options: DownloadOptions) -> BoxFuture<'a, Result<Task>> {
        Box::pin(async move {
            self.record(format!("download:{}/{}", options.bucket, options.key));
            Ok(self.mint_task(TransferKind::Download))
        })
    }

    fn pause(&self, id: &str) {
        self.record(format!("pause:{id}"));
    }

    fn resume(&self, id: &str) {
        self.record(format!("resume:{id}"));
    }

    fn cancel(&self, id: &str) {
        self.record(format!("cancel:{id}"));
    }

    fn cancel_all_uploads(&self) {
        self.record("cancel_all_uploads");
    }

    fn delete_record<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(format!("delete_record:{id}"));
            let mut tasks = self.tasks.lock().expect("engine tasks poisoned");
            let before = tasks.len();
            tasks.retain(|(_, task)| task.id != id);
            if tasks.len() == before {
                return Err(Error::Engine {
                    message: format!("no transfer record for id {id}"),
                });
            }
            Ok(())
        })
    }

    fn get_task<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Task>>> {
        Box::pin(async move {
            let tasks = self.tasks.lock().expect("engine tasks poisoned");
            Ok(tasks
                .iter()
                .find(|(_, task)| task.id == id)
                .map(|(_, task)| task.clone()))
        })
    }

    fn get_tasks<'a>(&'a self, kind: TransferKind) -> BoxFuture<'a, Result<Vec<Task>>> {
        Box::pin(async move {
            let tasks = self.tasks.lock().expect("engine tasks poisoned");
            Ok(tasks
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, task)| task.clone())
                .collect())
        })
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.events_rx
            .lock()
            .expect("engine events poisoned")
            .take()
    }
}
