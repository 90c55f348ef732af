mod client;
mod engine;
mod error;
mod extra_store;
mod kv;
mod logging;
mod options;
mod platform;
mod registry;
mod task;

pub use client::TransferClient;
pub use engine::{EngineError, EngineEvent, InMemoryEngine, TransferEngine};
pub use error::{Error, Result};
pub use extra_store::{STORE_KEY, TaskExtraStore};
pub use kv::{FileKvStore, InMemoryKvStore, KvStore};
pub use logging::init_logging;
pub use options::{
    DEFAULT_REGION, DownloadOptions, SetupBasicOptions, SetupCognitoOptions, UploadOptions,
    normalize_file_path,
};
pub use platform::{MergePolicy, Platform};
pub use registry::{EventHandler, SubscriberRegistry};
pub use task::{Task, TaskExtra, TaskView, TransferKind};
