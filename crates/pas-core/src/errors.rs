use crate::domain::LoginFailure;

/// Core error type for PTT Auto Sign.
///
/// Adapter crates map their specific errors into this type so the entry point
/// can decide between a config failure (exit early) and a runtime failure
/// (notify, then exit).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("login error: {0}")]
    Login(#[from] LoginFailure),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Short variant name, used as the "error type" line of error notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Login(_) => "LoginError",
            Error::External(_) => "ExternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
