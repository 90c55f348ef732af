use serde::{Deserialize, Serialize};

/// Transfer directions the native engine can enumerate tasks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Upload,
    Download,
}

impl TransferKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

/// Native task descriptor, owned by the engine and read-only to this layer.
/// Which progress fields are populated depends on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub total_bytes: Option<u64>,
}

/// Supplemental per-task metadata this layer keeps and persists. A partially
/// populated value doubles as the merge input for one event or one initiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub others: Option<serde_json::Value>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

impl TaskExtra {
    /// Shallow merge: fields present on `incoming` win, everything else is
    /// carried over unchanged.
    pub fn merged_with(&self, incoming: &TaskExtra) -> TaskExtra {
        TaskExtra {
            bucket: incoming.bucket.clone().or_else(|| self.bucket.clone()),
            key: incoming.key.clone().or_else(|| self.key.clone()),
            others: incoming.others.clone().or_else(|| self.others.clone()),
            state: incoming.state.clone().or_else(|| self.state.clone()),
            bytes: incoming.bytes.or(self.bytes),
            total_bytes: incoming.total_bytes.or(self.total_bytes),
        }
    }
}

/// A native task overlaid with its stored metadata; what application callers
/// see. Transient and never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: String,
    pub state: Option<String>,
    pub bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub others: Option<serde_json::Value>,
}

impl TaskView {
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            state: task.state.clone(),
            bytes: task.bytes,
            total_bytes: task.total_bytes,
            bucket: None,
            key: None,
            others: None,
        }
    }

    /// Overlay stored metadata onto a native descriptor; stored fields win
    /// where present.
    pub fn overlay(task: &Task, extra: &TaskExtra) -> Self {
        Self {
            id: task.id.clone(),
            state: extra.state.clone().or_else(|| task.state.clone()),
            bytes: extra.bytes.or(task.bytes),
            total_bytes: extra.total_bytes.or(task.total_bytes),
            bucket: extra.bucket.clone(),
            key: extra.key.clone(),
            others: extra.others.clone(),
        }
    }
}
