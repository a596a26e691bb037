//! Wardboard core library
//!
//! Admissions, outcomes, census statistics and assistant features for
//! neonatal and paediatric wards.

use std::sync::Arc;

pub mod api;
pub mod audit;
pub mod core;
pub mod db;
pub mod models;

use crate::config::Config;
use crate::core::ai::Assistant;
use crate::db::PatientStore;

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn PatientStore>,
    /// Absent when no Gemini API key is configured.
    pub assistant: Option<Arc<Assistant>>,
}

/// Application configuration
pub mod config {
    use chrono::{FixedOffset, Offset, Utc};
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(default)]
    pub struct Config {
        pub server: ServerConfig,
        pub database: DatabaseConfig,
        pub ai: AiConfig,
        pub ward: WardConfig,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct ServerConfig {
        pub host: String,
        pub port: u16,
    }

    impl Default for ServerConfig {
        fn default() -> Self {
            Self {
                host: "127.0.0.1".to_string(),
                port: 8080,
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct DatabaseConfig {
        pub url: String,
        pub max_connections: u32,
    }

    impl Default for DatabaseConfig {
        fn default() -> Self {
            Self {
                url: "sqlite://wardboard.db".to_string(),
                max_connections: 5,
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct AiConfig {
        pub base_url: String,
        pub model: String,
        pub api_key: Option<String>,
        pub timeout_secs: u64,
        /// Pause between requests of a batch risk run.
        pub batch_delay_ms: u64,
    }

    impl Default for AiConfig {
        fn default() -> Self {
            Self {
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-1.5-flash".to_string(),
                api_key: None,
                timeout_secs: 30,
                batch_delay_ms: 1000,
            }
        }
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(default)]
    pub struct WardConfig {
        /// Offset of the ward's local time from UTC; periods are resolved in it.
        pub utc_offset_minutes: i32,
    }

    impl WardConfig {
        pub fn offset(&self) -> FixedOffset {
            self.utc_offset_minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .unwrap_or_else(|| Utc.fix())
        }
    }

    /// Load configuration from files and the environment
    pub fn load_config() -> Result<Config, config::ConfigError> {
        let env = std::env::var("WARDBOARD_ENV").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            // Start with default settings
            .add_source(config::File::with_name("config/default").required(false))
            // Override with environment-specific settings
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables, e.g. WARDBOARD__SERVER__PORT
            .add_source(
                config::Environment::with_prefix("WARDBOARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

}
