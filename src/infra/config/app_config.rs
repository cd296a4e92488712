use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub cache: CacheConfig,
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    /// Log file; stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    pub message_page_size: i32,
    pub chat_page_size: i32,
    pub resort_debounce_ms: u64,
    pub receive_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            message_page_size: 50,
            chat_page_size: 20,
            resort_debounce_ms: 1_000,
            receive_timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Quiet period after which a replay run is considered settled.
    pub idle_exit_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            idle_exit_ms: 1_500,
        }
    }
}
