//! 会话线程：翻页并产出可撤回的消息

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::infrastructure::JsExecutor;
use crate::logger::truncate_text;
use crate::workflow::ui_message::{js_string, MESSAGE_ATTRIBUTE};
use crate::workflow::{MessageSource, UiMessage};

const IGNORE_ATTRIBUTE: &str = "data-idmu-ignore";

/// 新标记的一行消息
#[derive(Debug, Deserialize)]
struct TaggedRow {
    id: String,
    text: String,
}

/// 当前打开的会话线程
pub struct ThreadSource {
    executor: Arc<JsExecutor>,
    wrapper_selector: String,
    step_timeout: Duration,
    page_load_timeout: Duration,
}

impl ThreadSource {
    pub fn new(executor: Arc<JsExecutor>, config: &Config) -> Self {
        Self {
            executor,
            wrapper_selector: config.messages_wrapper_selector.clone(),
            step_timeout: config.step_timeout(),
            page_load_timeout: config.page_load_timeout(),
        }
    }

    fn wrapper_literal(&self) -> String {
        js_string(&self.wrapper_selector)
    }

    /// 给尚未见过的行打上编号，返回新编号及文本
    async fn tag_new_rows(&self) -> Result<Vec<TaggedRow>> {
        let rows: Option<Vec<TaggedRow>> = self
            .executor
            .eval_as(format!(
                r#"
                (() => {{
                    const wrapper = document.querySelector({wrapper});
                    if (!wrapper) return null;
                    const rows = [...wrapper.querySelectorAll("div[role=row]")]
                        .filter(row => !row.hasAttribute("{MESSAGE_ATTRIBUTE}") && !row.hasAttribute("{IGNORE_ATTRIBUTE}"));
                    return rows.map(row => {{
                        window.__idmuNextId = (window.__idmuNextId || 0) + 1;
                        const id = String(window.__idmuNextId);
                        row.setAttribute("{MESSAGE_ATTRIBUTE}", id);
                        return {{ id, text: row.textContent.trim() }};
                    }});
                }})()
                "#,
                wrapper = self.wrapper_literal()
            ))
            .await?;

        match rows {
            Some(rows) => Ok(rows),
            None => bail!("找不到消息列表容器: {}", self.wrapper_selector),
        }
    }

    async fn ignore_row(&self, id: &str) -> Result<()> {
        let selector = js_string(&format!("[{}=\"{}\"]", MESSAGE_ATTRIBUTE, id));
        self.executor
            .eval(format!(
                r#"
                (() => {{
                    const row = document.querySelector({selector});
                    if (!row) return false;
                    row.removeAttribute("{MESSAGE_ATTRIBUTE}");
                    row.setAttribute("{IGNORE_ATTRIBUTE}", "");
                    return true;
                }})()
                "#
            ))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageSource for ThreadSource {
    type Workflow = UiMessage;

    async fn fetch_and_render_next_page(&self) -> Result<bool> {
        let wrapper = self.wrapper_literal();
        let height: Option<f64> = self
            .executor
            .eval_as(format!(
                r#"
                (() => {{
                    const wrapper = document.querySelector({wrapper});
                    if (!wrapper) return null;
                    const height = wrapper.scrollHeight;
                    wrapper.scrollTop = 0;
                    return height;
                }})()
                "#
            ))
            .await?;

        let Some(height) = height else {
            bail!("找不到消息列表容器: {}", self.wrapper_selector);
        };
        debug!("滚动到顶部，当前高度 {}", height);

        // 加载指示消失且高度变化才算加载了新的一页
        let loaded = self
            .executor
            .wait_for(
                "fetchAndRenderThreadNextMessagePage",
                &format!(
                    r#"
                    (() => {{
                        const wrapper = document.querySelector({wrapper});
                        if (!wrapper) return false;
                        return document.querySelector("[role=progressbar]") === null && wrapper.scrollHeight !== {height};
                    }})()
                    "#
                ),
                self.page_load_timeout,
            )
            .await;

        match loaded {
            Ok(_) => Ok(false),
            Err(crate::error::WorkflowError::Timeout { .. }) => {
                info!("📭 没有更多消息可以加载");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_ui_messages(&self) -> Result<Vec<UiMessage>> {
        let rows = self.tag_new_rows().await?;
        debug!("找到 {} 条新消息", rows.len());

        let mut messages = Vec::new();
        for row in rows {
            let message = UiMessage::new(self.executor.clone(), row.id.clone(), self.step_timeout);
            if message.is_my_own_message().await {
                debug!("[消息 {}] 可撤回: {}", row.id, truncate_text(&row.text, 40));
                messages.push(message);
            } else {
                self.ignore_row(&row.id).await?;
            }
        }

        info!("✓ 本轮共 {} 条可撤回的消息", messages.len());
        Ok(messages)
    }
}
