use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{AppConfig, CacheConfig, LogConfig, ReplayConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub cache: Option<FileCacheConfig>,
    pub replay: Option<FileReplayConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(cache) = self.cache {
            cache.merge_into(&mut config.cache);
        }

        if let Some(replay) = self.replay {
            replay.merge_into(&mut config.replay);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(file) = self.file {
            config.file = Some(file);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileCacheConfig {
    pub message_page_size: Option<i32>,
    pub chat_page_size: Option<i32>,
    pub resort_debounce_ms: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
}

impl FileCacheConfig {
    fn merge_into(self, config: &mut CacheConfig) {
        if let Some(size) = self.message_page_size {
            config.message_page_size = size;
        }

        if let Some(size) = self.chat_page_size {
            config.chat_page_size = size;
        }

        if let Some(debounce_ms) = self.resort_debounce_ms {
            config.resort_debounce_ms = debounce_ms;
        }

        if let Some(timeout_ms) = self.receive_timeout_ms {
            config.receive_timeout_ms = timeout_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileReplayConfig {
    pub idle_exit_ms: Option<u64>,
}

impl FileReplayConfig {
    fn merge_into(self, config: &mut ReplayConfig) {
        if let Some(idle_exit_ms) = self.idle_exit_ms {
            config.idle_exit_ms = idle_exit_ms;
        }
    }
}
