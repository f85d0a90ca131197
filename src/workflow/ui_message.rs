//! 单条消息的撤回流程
//!
//! 流程顺序：
//! 1. 悬停消息 → 等待 "More" 按钮出现
//! 2. 点击 "More" → 等待 "Unsend" 菜单项出现
//! 3. 点击 "Unsend" → 等待确认对话框
//! 4. 点击确认 → 等待对话框消失
//!
//! 每一步都与 `step_timeout` 赛跑，超时即视为本条消息失败。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::WorkflowError;
use crate::infrastructure::JsExecutor;
use crate::workflow::UnsendWorkflow;

/// 标记消息根节点的属性
pub const MESSAGE_ATTRIBUTE: &str = "data-idmu-message";
const ACTION_BUTTON_ATTRIBUTE: &str = "data-idmu-action";
const UNSEND_ITEM_ATTRIBUTE: &str = "data-idmu-unsend";

/// 页面上的一条消息
pub struct UiMessage {
    executor: Arc<JsExecutor>,
    id: String,
    step_timeout: Duration,
}

impl UiMessage {
    pub fn new(executor: Arc<JsExecutor>, id: impl Into<String>, step_timeout: Duration) -> Self {
        Self {
            executor,
            id: id.into(),
            step_timeout,
        }
    }

    /// 判断是否是自己发送的消息：能打开菜单且菜单中有 "Unsend"
    ///
    /// 探测结束后会关闭菜单，不会触发撤回
    pub async fn is_my_own_message(&self) -> bool {
        // 上一次流程可能留下打开的菜单
        let _ = self.executor.eval(self.reset_script()).await;

        if let Err(e) = self.show_actions_menu_button().await {
            debug!("[消息 {}] 没有找到操作按钮: {}", self.id, e);
            return false;
        }
        if let Err(e) = self.open_actions_menu().await {
            debug!("[消息 {}] 菜单中没有 Unsend: {}", self.id, e);
            self.close_actions_menu().await;
            return false;
        }
        self.close_actions_menu().await;
        true
    }

    async fn show_actions_menu_button(&self) -> Result<(), WorkflowError> {
        debug!("[消息 {}] 步骤 1: 显示操作按钮", self.id);
        let root = self.root_selector();
        let found = self
            .executor
            .eval_as::<bool>(format!(
                r#"
                (() => {{
                    const root = document.querySelector({root});
                    if (!root) return false;
                    for (const type of ["mousemove", "mouseover", "mouseenter"]) {{
                        root.dispatchEvent(new MouseEvent(type, {{ bubbles: true }}));
                    }}
                    return true;
                }})()
                "#
            ))
            .await?;
        if !found {
            return Err(WorkflowError::ElementNotFound {
                step: "showActionsMenuButton",
            });
        }

        self.executor
            .wait_for(
                "showActionsMenuButton",
                &format!(
                    r#"
                    (() => {{
                        const button = document.querySelector({root})?.querySelector("[aria-label=More]")?.parentNode;
                        if (!button) return false;
                        button.setAttribute("{ACTION_BUTTON_ATTRIBUTE}", {id});
                        return true;
                    }})()
                    "#,
                    id = self.id_literal()
                ),
                self.step_timeout,
            )
            .await?;
        Ok(())
    }

    async fn open_actions_menu(&self) -> Result<(), WorkflowError> {
        debug!("[消息 {}] 步骤 2: 点击操作按钮，等待 Unsend 菜单项", self.id);
        self.click(&self.action_button_selector(), "openActionsMenu")
            .await?;
        self.executor
            .wait_for(
                "openActionsMenu",
                &format!(
                    r#"
                    (() => {{
                        const item = [...document.body.querySelectorAll("span,div")].find(node =>
                            node.textContent.trim().toLocaleLowerCase() === "unsend" && node.firstChild?.nodeType === 3);
                        if (!item) return false;
                        item.setAttribute("{UNSEND_ITEM_ATTRIBUTE}", {id});
                        return true;
                    }})()
                    "#,
                    id = self.id_literal()
                ),
                self.step_timeout,
            )
            .await?;
        Ok(())
    }

    /// 尽力关闭菜单，失败只记录
    async fn close_actions_menu(&self) {
        let menu_gone = format!(
            "document.querySelector({}) === null",
            self.unsend_item_selector()
        );
        if self
            .click(&self.action_button_selector(), "closeActionsMenu")
            .await
            .is_ok()
        {
            let _ = self
                .executor
                .wait_for("closeActionsMenu", &menu_gone, self.step_timeout)
                .await;
        }
        let _ = self.executor.eval(self.reset_script()).await;
    }

    async fn open_confirm_unsend_modal(&self) -> Result<(), WorkflowError> {
        debug!("[消息 {}] 步骤 3: 点击 Unsend，等待确认对话框", self.id);
        self.click(&self.unsend_item_selector(), "openConfirmUnsendModal")
            .await?;
        self.executor
            .wait_for(
                "openConfirmUnsendModal",
                r#"document.querySelector("[role=dialog] button") !== null"#,
                self.step_timeout,
            )
            .await?;
        Ok(())
    }

    async fn confirm_unsend(&self) -> Result<(), WorkflowError> {
        debug!("[消息 {}] 最后一步: 确认撤回", self.id);
        self.click(r#""[role=dialog] button""#, "confirmUnsend")
            .await?;
        self.executor
            .wait_for(
                "confirmUnsend",
                r#"document.querySelector("[role=dialog] button") === null"#,
                self.step_timeout,
            )
            .await?;
        Ok(())
    }

    /// 点击 `selector_literal`（已转义的 JS 字符串）对应的元素
    async fn click(&self, selector_literal: &str, step: &'static str) -> Result<(), WorkflowError> {
        let clicked = self
            .executor
            .eval_as::<bool>(format!(
                r#"
                (() => {{
                    const element = document.querySelector({selector_literal});
                    if (!element) return false;
                    element.click();
                    return true;
                }})()
                "#
            ))
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(WorkflowError::ElementNotFound { step })
        }
    }

    fn reset_script(&self) -> String {
        format!(
            r#"
            (() => {{
                const root = document.querySelector({root});
                if (!root) return false;
                document.querySelector('[aria-label="Close details and actions"]')?.click();
                root.dispatchEvent(new MouseEvent("mouseout", {{ bubbles: true }}));
                root.dispatchEvent(new MouseEvent("mouseleave", {{ bubbles: true }}));
                return true;
            }})()
            "#,
            root = self.root_selector()
        )
    }

    fn id_literal(&self) -> String {
        js_string(&self.id)
    }

    fn root_selector(&self) -> String {
        js_string(&format!("[{}=\"{}\"]", MESSAGE_ATTRIBUTE, self.id))
    }

    fn action_button_selector(&self) -> String {
        js_string(&format!("[{}=\"{}\"]", ACTION_BUTTON_ATTRIBUTE, self.id))
    }

    fn unsend_item_selector(&self) -> String {
        js_string(&format!("[{}=\"{}\"]", UNSEND_ITEM_ATTRIBUTE, self.id))
    }
}

#[async_trait]
impl UnsendWorkflow for UiMessage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn unsend(&self) -> Result<()> {
        self.show_actions_menu_button().await?;

        let result = async {
            self.open_actions_menu().await?;
            self.open_confirm_unsend_modal().await?;
            self.confirm_unsend().await
        }
        .await;

        if let Err(e) = result {
            warn!("[消息 {}] 撤回流程中断: {}", self.id, e);
            self.close_actions_menu().await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn is_still_present(&self) -> bool {
        let script = format!("document.querySelector({}) !== null", self.root_selector());
        match self.executor.eval_as::<bool>(script).await {
            Ok(present) => present,
            Err(e) => {
                warn!("[消息 {}] 无法检查消息是否仍在页面上: {}", self.id, e);
                false
            }
        }
    }
}

/// 转成 JS 字符串字面量
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
