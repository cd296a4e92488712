use std::path::Path;

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::EnvFilter;

use crate::infra::{config::LogConfig, error::AppError};

/// Installs the global subscriber. With `config.file` set, events go through
/// a non-blocking file writer whose guard must outlive the program's logging.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let Some(path) = config.file.as_deref() else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(AppError::LoggingInit)?;
        return Ok(None);
    };

    let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(AppError::LoggingInit)?;

    tracing::info!(path = %path.display(), "file logging initialized");
    Ok(Some(guard))
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, AppError> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().ok_or_else(|| {
        AppError::LoggingInit(format!("log path {} has no file name", path.display()).into())
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .map_err(|error| AppError::LoggingInit(Box::new(error)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_without_file_name_is_rejected() {
        let error = file_appender(Path::new("/")).expect_err("root has no file name");

        assert!(error.to_string().contains("no file name"));
    }
}
