use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to initialize logging: {0}")]
    LoggingInit(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("failed to read replay log at {path}: {source}")]
    ReplayRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse replay log at {path}, line {line}: {source}")]
    ReplayParse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("replay line {line} is not an object with an @type")]
    ReplayEntry { line: usize },
    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
