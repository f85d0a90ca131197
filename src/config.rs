use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// 默认每批翻页次数
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 每批最多翻页次数（同时也是每轮的工作量上限）
    pub batch_size: usize,
    /// 两次翻页之间的等待（毫秒）
    pub next_page_delay_ms: u64,
    /// 两条消息撤回之间的等待（毫秒）
    pub message_queue_delay_ms: u64,
    /// 撤回失败检查的周期（毫秒）
    pub unsuccessful_workflow_alert_interval_ms: u64,
    /// 单个 UI 步骤的超时（毫秒）
    pub step_timeout_ms: u64,
    /// 等待下一页消息加载的超时（毫秒）
    pub page_load_timeout_ms: u64,
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 目标URL
    pub target_url: String,
    /// 优先复用标题包含该字符串的页面
    pub target_title: Option<String>,
    /// 消息列表容器的选择器
    pub messages_wrapper_selector: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            next_page_delay_ms: 1000,
            message_queue_delay_ms: 1000,
            unsuccessful_workflow_alert_interval_ms: 5000,
            step_timeout_ms: 200,
            page_load_timeout_ms: 3000,
            browser_debug_port: 9222,
            target_url: "https://www.instagram.com/direct/inbox/".to_string(),
            target_title: None,
            messages_wrapper_selector: "div[role=grid]".to_string(),
            verbose_logging: false,
        }
    }
}

/// 批量撤回策略使用的三个固定节奏
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyTimings {
    pub next_page_delay: Duration,
    pub message_queue_delay: Duration,
    pub unsuccessful_workflow_alert_interval: Duration,
}

impl Default for StrategyTimings {
    fn default() -> Self {
        Config::default().timings()
    }
}

impl Config {
    /// 有 `IDMU_CONFIG_FILE` 时读取 TOML 文件，否则读取环境变量
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("IDMU_CONFIG_FILE") {
            Ok(path) => Self::from_toml_file(path),
            Err(_) => Ok(Self::from_env()),
        }
    }

    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            batch_size: env_parse("IDMU_BATCH_SIZE").unwrap_or(default.batch_size),
            next_page_delay_ms: env_parse("IDMU_NEXT_PAGE_DELAY_MS").unwrap_or(default.next_page_delay_ms),
            message_queue_delay_ms: env_parse("IDMU_MESSAGE_QUEUE_DELAY_MS").unwrap_or(default.message_queue_delay_ms),
            unsuccessful_workflow_alert_interval_ms: env_parse("IDMU_UNSUCCESSFUL_WORKFLOW_ALERT_INTERVAL_MS")
                .unwrap_or(default.unsuccessful_workflow_alert_interval_ms),
            step_timeout_ms: env_parse("IDMU_STEP_TIMEOUT_MS").unwrap_or(default.step_timeout_ms),
            page_load_timeout_ms: env_parse("IDMU_PAGE_LOAD_TIMEOUT_MS").unwrap_or(default.page_load_timeout_ms),
            browser_debug_port: env_parse("IDMU_BROWSER_DEBUG_PORT").unwrap_or(default.browser_debug_port),
            target_url: std::env::var("IDMU_TARGET_URL").unwrap_or(default.target_url),
            target_title: std::env::var("IDMU_TARGET_TITLE").ok().or(default.target_title),
            messages_wrapper_selector: std::env::var("IDMU_MESSAGES_WRAPPER_SELECTOR")
                .unwrap_or(default.messages_wrapper_selector),
            verbose_logging: env_parse("IDMU_VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    /// 从 TOML 文件加载，缺省字段取默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: String::new(),
            source,
        })
    }

    /// 每批翻页次数，0 视为配置错误并回退到默认值
    pub fn batch_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size).unwrap_or_else(|| {
            warn!("batch_size 不能为 0，使用默认值 {}", DEFAULT_BATCH_SIZE);
            NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN)
        })
    }

    pub fn timings(&self) -> StrategyTimings {
        StrategyTimings {
            next_page_delay: Duration::from_millis(self.next_page_delay_ms),
            message_queue_delay: Duration::from_millis(self.message_queue_delay_ms),
            unsuccessful_workflow_alert_interval: Duration::from_millis(
                self.unsuccessful_workflow_alert_interval_ms,
            ),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
