//! # IDMU Unsend
//!
//! 批量撤回会话中自己发送的消息
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() / wait_for() 能力
//!
//! ### ② 流程层（Workflow）
//! - `workflow/` - 协作方契约与浏览器实现
//! - `MessageSource` / `ThreadSource` - 翻页、构建工作列表
//! - `UnsendWorkflow` / `UiMessage` - 单条消息的撤回流程（每步都有超时）
//!
//! ### ③ 编排层（Strategy）
//! - `strategy/` - 批量撤回策略与撤回失败检查
//! - `UnsendStrategy` - run / stop / is_running
//! - `BatchUnsendStrategy` - 翻页 → 逐条撤回 → 继续或结束
//!
//! ### ④ 应用层
//! - `app` - 连接浏览器并运行策略

pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod strategy;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use browser::connect_to_browser_and_page;
pub use config::{Config, StrategyTimings, DEFAULT_BATCH_SIZE};
pub use error::{ConfigError, WorkflowError};
pub use infrastructure::JsExecutor;
pub use strategy::{BatchUnsendStrategy, RunOutcome, RunStats, UnsendStrategy};
pub use workflow::{MessageSource, ThreadSource, UiMessage, UnsendWorkflow};
