use crate::platform::Platform;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("native transfer engine unavailable: {message}")]
    EngineUnavailable { message: String },

    #[error("{operation} is not supported on {platform}")]
    Unsupported {
        operation: &'static str,
        platform: Platform,
    },

    #[error("engine error: {message}")]
    Engine { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
