use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;

use crate::infra::{
    self,
    config::{AppConfig, FileConfigAdapter},
    contracts::ConfigAdapter,
};

/// Loaded configuration plus whatever must stay alive while the program logs.
#[derive(Debug)]
pub struct AppContext {
    pub config: AppConfig,
    _log_guard: Option<WorkerGuard>,
}

pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext> {
    let config = load_config(config_path)?;
    let log_guard = infra::logging::init(&config.logging)?;

    Ok(AppContext {
        config,
        _log_guard: log_guard,
    })
}

fn load_config(config_path: Option<&Path>) -> Result<AppConfig> {
    FileConfigAdapter::new(config_path).load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config_when_file_is_missing() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");

        let config = load_config(Some(&dir.path().join("missing.toml")))
            .expect("config should load from defaults");

        assert_eq!(config, AppConfig::default());
    }
}
