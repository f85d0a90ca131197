//! 流程层：协作方契约与基于浏览器的实现
//!
//! - `MessageSource`：翻页并产出当前可处理的消息
//! - `UnsendWorkflow`：单条消息的撤回流程
//!
//! 编排层（`strategy`）只依赖这两个 trait。

pub mod thread_source;
pub mod ui_message;

use anyhow::Result;
use async_trait::async_trait;

pub use thread_source::ThreadSource;
pub use ui_message::UiMessage;

/// 单条消息的撤回流程
#[async_trait]
pub trait UnsendWorkflow: Send + Sync + 'static {
    /// 用于日志和上报的标识
    fn id(&self) -> &str;

    /// 执行完整的撤回流程，任何步骤超时都返回错误
    async fn unsend(&self) -> Result<()>;

    /// 消息是否仍然显示在页面上
    async fn is_still_present(&self) -> bool;
}

/// 消息来源（一个会话线程）
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    type Workflow: UnsendWorkflow;

    /// 加载并渲染下一页消息，返回 `true` 表示没有更多页
    async fn fetch_and_render_next_page(&self) -> Result<bool>;

    /// 按页面顺序构建当前可处理的撤回流程列表
    async fn create_ui_messages(&self) -> Result<Vec<Self::Workflow>>;
}
