use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

fn build_env_filter_from(s3multipart_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    let default = || EnvFilter::new("info");

    if let Some(v) = s3multipart_log {
        return EnvFilter::try_new(v).unwrap_or_else(|_| default());
    }
    if let Some(v) = rust_log {
        return EnvFilter::try_new(v).unwrap_or_else(|_| default());
    }
    default()
}

/// Installs a global fmt subscriber filtered by `S3MULTIPART_LOG`, falling
/// back to `RUST_LOG`. Later calls are no-ops, and an already-installed global
/// subscriber wins.
pub fn init_logging() {
    LOGGING_INIT.get_or_init(|| {
        let filter = build_env_filter_from(
            std::env::var("S3MULTIPART_LOG").ok().as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
        );
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
