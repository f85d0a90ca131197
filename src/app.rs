//! 应用入口 - 编排层之上
//!
//! 连接浏览器 → 创建 JsExecutor → 构建会话线程与批量撤回策略 → 运行，Ctrl-C 请求停止

use std::sync::Arc;

use anyhow::Result;
use chromiumoxide::Browser;
use tracing::{info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::JsExecutor;
use crate::strategy::{BatchUnsendStrategy, RunOutcome, RunStats, UnsendStrategy};
use crate::workflow::{ThreadSource, UiMessage, UnsendWorkflow};

/// 应用主结构
pub struct App {
    config: Config,
    _browser: Browser,
    strategy: BatchUnsendStrategy<ThreadSource>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let (browser, page) = browser::connect_to_browser_and_page(
            config.browser_debug_port,
            Some(&config.target_url),
            config.target_title.as_deref(),
        )
        .await?;

        let executor = Arc::new(JsExecutor::new(page));
        let source = Arc::new(ThreadSource::new(executor, &config));
        let strategy = BatchUnsendStrategy::new(source, config.timings())
            .with_unsuccessful_workflow_handler(report_unsuccessful_workflows);

        Ok(Self {
            config,
            _browser: browser,
            strategy,
        })
    }

    /// 运行直到没有更多消息，或收到 Ctrl-C
    pub async fn run(&self) -> Result<RunOutcome> {
        let mut run = self.strategy.run(self.config.batch_size());

        let outcome = tokio::select! {
            outcome = &mut run => outcome,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("无法监听 Ctrl-C: {}", e);
                }
                warn!("⏹️ 收到停止请求，当前步骤完成后停止...");
                self.strategy.stop();
                run.await
            }
        };

        print_final_stats(outcome, &self.strategy.stats());
        Ok(outcome)
    }
}

fn report_unsuccessful_workflows(workflows: Vec<Arc<UiMessage>>) {
    for workflow in &workflows {
        warn!("⚠️ 消息 {} 仍在页面上，撤回可能没有生效", workflow.id());
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量撤回模式");
    info!(
        "启动时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("📊 每批翻页数: {}", config.batch_size);
    info!(
        "⏱️ 翻页间隔 {}ms / 撤回间隔 {}ms / 检查周期 {}ms",
        config.next_page_delay_ms,
        config.message_queue_delay_ms,
        config.unsuccessful_workflow_alert_interval_ms
    );
    info!("{}", "=".repeat(60));
}

fn print_final_stats(outcome: RunOutcome, stats: &RunStats) {
    info!("\n{}", "=".repeat(60));
    match outcome {
        RunOutcome::Done => info!("📊 全部处理完成统计"),
        RunOutcome::Stopped => info!("📊 已停止，当前统计"),
    }
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📦 批次: {}", stats.batches);
    info!("✅ 撤回: {}", stats.unsent);
    info!("❌ 失败: {}", stats.failed);
    info!("⚠️ 未生效: {}", stats.unsuccessful);
    info!("{}", "=".repeat(60));
}
