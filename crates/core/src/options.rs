use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_REGION: &str = "eu-west-1";

/// Strips a `file://` scheme prefix; the engine wants plain filesystem paths.
pub fn normalize_file_path(path: &str) -> &str {
    path.strip_prefix("file://").unwrap_or(path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupBasicOptions {
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_true")]
    pub remember_last_instance: bool,
}

impl SetupBasicOptions {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            region: default_region(),
            remember_last_instance: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupCognitoOptions {
    pub identity_pool_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_region")]
    pub cognito_region: String,
    #[serde(default = "default_true")]
    pub remember_last_instance: bool,
}

impl SetupCognitoOptions {
    pub fn new(identity_pool_id: impl Into<String>) -> Self {
        Self {
            identity_pool_id: identity_pool_id.into(),
            region: default_region(),
            cognito_region: default_region(),
            remember_last_instance: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOptions {
    pub bucket: String,
    pub key: String,
    pub file: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl UploadOptions {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            file: file.into(),
            meta: BTreeMap::new(),
        }
    }

    /// Marshals the options into the shape the engine expects: a bare
    /// `contentType` meta entry moves under the `Content-Type` header key, and
    /// the local path loses any `file://` scheme.
    pub fn normalized(mut self) -> Self {
        if let Some(content_type) = self.meta.remove("contentType") {
            self.meta
                .insert("Content-Type".to_string(), content_type);
        }
        self.file = normalize_file_path(&self.file).to_string();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOptions {
    pub bucket: String,
    pub key: String,
    pub file: String,
}

impl DownloadOptions {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            file: file.into(),
        }
    }

    pub fn normalized(mut self) -> Self {
        self.file = normalize_file_path(&self.file).to_string();
        self
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_true() -> bool {
    true
}
