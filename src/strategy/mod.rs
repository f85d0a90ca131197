//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 分页遍历会话线程，逐条执行撤回流程，并在后台检查"看似完成、实际没有生效"的撤回。
//!
//! ## 模块划分
//!
//! - `UnsendStrategy`：调用方看到的策略接口（启动 / 停止 / 是否运行中）
//! - `batch`：批量撤回策略（翻页 → 构建工作列表 → 逐条撤回 → 决定是否继续）
//! - `monitor`：撤回失败检查（周期性地核对已完成的消息是否真的从页面消失）
//! - `state`：主循环与检查任务共享的状态
//!
//! ## 层次关系
//!
//! ```text
//! strategy::BatchUnsendStrategy
//!     ↓
//! workflow::MessageSource (翻页 / 构建工作列表)
//!     ↓
//! workflow::UnsendWorkflow (单条消息)
//!     ↓
//! infrastructure::JsExecutor
//! ```

pub mod batch;
pub mod monitor;
pub mod state;

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::workflow::MessageSource;

pub use batch::{BatchUnsendStrategy, UnsuccessfulWorkflowsHandler};
pub use state::RunStats;

/// 一次 `run` 的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 没有更多页，全部处理完成
    Done,
    /// 在检查点观察到了停止请求
    Stopped,
}

/// 撤回策略接口
///
/// 同一时刻只允许一个 `run` 在执行。
pub trait UnsendStrategy {
    type Source: MessageSource;

    /// 已调用 `run` 且既未完成也未被停止
    fn is_running(&self) -> bool;

    /// 请求停止，在下一个检查点生效，不打断正在进行的等待或撤回
    fn stop(&self);

    /// 开始批量处理
    ///
    /// 运行标志在调用时立即设置（早于返回的 future 第一次被 poll），
    /// 返回的 future 总是正常结束，不会返回错误。
    fn run(&self, batch_size: NonZeroUsize) -> BoxFuture<'_, RunOutcome>;

    /// 绑定的消息来源
    fn source(&self) -> &Arc<Self::Source>;
}
