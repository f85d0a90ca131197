//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"和"等待页面状态"的能力

use std::time::Duration;

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::WorkflowError;

/// 两次轮询之间的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() / wait_for() 能力
/// - 不认识消息，也不处理撤回流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, WorkflowError> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> Result<T, WorkflowError> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 反复执行 `predicate` 直到返回真值，超过 `limit` 则返回超时错误
    ///
    /// # 参数
    /// - `step`: 步骤名（用于日志和错误信息）
    /// - `predicate`: 返回值为 null / false / undefined 时视为"尚未满足"
    /// - `limit`: 本步骤允许的最长时间
    pub async fn wait_for(
        &self,
        step: &'static str,
        predicate: &str,
        limit: Duration,
    ) -> Result<JsonValue, WorkflowError> {
        let polling = async {
            loop {
                let value = self.eval(predicate).await?;
                if is_truthy(&value) {
                    return Ok::<_, WorkflowError>(value);
                }
                sleep(POLL_INTERVAL).await;
            }
        };

        match timeout(limit, polling).await {
            Ok(result) => result,
            Err(_) => {
                debug!("步骤 {} 等待超时 ({:?})", step, limit);
                Err(WorkflowError::Timeout { step, after: limit })
            }
        }
    }
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        _ => true,
    }
}
