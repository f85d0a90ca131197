use std::time::Duration;

use thiserror::Error;

/// 单条消息撤回流程中的错误
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// 某个 UI 步骤没有在限定时间内完成
    #[error("步骤 {step} 超时 ({after:?})")]
    Timeout { step: &'static str, after: Duration },

    /// 页面上找不到所需元素
    #[error("步骤 {step} 找不到元素")]
    ElementNotFound { step: &'static str },

    /// 执行脚本失败
    #[error("执行脚本失败: {0}")]
    Script(#[from] chromiumoxide::error::CdpError),

    /// 脚本返回值无法解析
    #[error("脚本返回值解析失败: {0}")]
    Decode(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 ({path}): {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置文件失败 ({path}): {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
