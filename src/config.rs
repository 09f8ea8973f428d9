// src/config.rs

pub mod credentials;
mod file;

use self::file::load_or_create_external_config;
use crate::{cli::Cli, constants, error::AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_min_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    #[serde(default = "default_start_new_attempts")]
    pub start_new_attempts: bool,
}

fn default_start_new_attempts() -> bool {
    true
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            start_new_attempts: default_start_new_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExternalConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub quiz: QuizConfig,
}

impl ExternalConfig {
    pub(crate) fn default_app_config() -> Self {
        // 为 NetworkConfig 提供一组稳健的默认值
        let network = NetworkConfig {
            connect_timeout_secs: Some(10),
            timeout_secs: Some(60),
            max_retries: Some(2),
            retry_min_delay_ms: Some(500),
            retry_max_delay_ms: Some(4000),
            user_agent: None,
        };
        Self {
            network,
            quiz: QuizConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_min_delay: Duration,
    pub retry_max_delay: Duration,
    pub start_new_attempts: bool,
}

impl AppConfig {
    pub fn new(args: &Cli) -> AppResult<Self> {
        let external = load_or_create_external_config()?;
        Ok(Self::from_external(external, args.command.no_new_attempts()))
    }

    pub fn from_external(external: ExternalConfig, no_new_attempts: bool) -> Self {
        let network = external.network;
        Self {
            user_agent: network
                .user_agent
                .unwrap_or_else(|| constants::USER_AGENT.into()),
            connect_timeout: Duration::from_secs(network.connect_timeout_secs.unwrap_or(10)),
            timeout: Duration::from_secs(network.timeout_secs.unwrap_or(60)),
            max_retries: network.max_retries.unwrap_or(2),
            retry_min_delay: Duration::from_millis(network.retry_min_delay_ms.unwrap_or(500)),
            retry_max_delay: Duration::from_millis(network.retry_max_delay_ms.unwrap_or(4000)),
            start_new_attempts: external.quiz.start_new_attempts && !no_new_attempts,
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: "test-agent/1.0".to_string(),
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_min_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(50),
            start_new_attempts: true,
        }
    }
}
