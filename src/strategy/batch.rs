//! 批量撤回策略
//!
//! ## 一次 `run` 的流程
//!
//! 1. **翻页**：最多翻 `batch_size` 页，每页之间等待 `next_page_delay`，没有更多页时提前结束
//! 2. **撤回**：构建当前工作列表，逐条撤回，每条成功后等待 `message_queue_delay`
//! 3. **继续**：没有更多页则结束（Done）；观察到停止请求则结束（Stopped）
//! 4. **检查**：继续下一批前，若已有完成的消息且配置了回调，启动撤回失败检查，然后回到 1
//!
//! 撤回必须串行：菜单和对话框是页面全局的，两个流程不能交错。
//! 单条消息失败只记录日志，不会中断本批，也不会让 `run` 失败。

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::StrategyTimings;
use crate::strategy::monitor::{self, MonitorSlot};
use crate::strategy::state::{RunStats, SharedState};
use crate::strategy::{RunOutcome, UnsendStrategy};
use crate::workflow::{MessageSource, UnsendWorkflow};

/// 撤回未生效时的回调，每次检查最多调用一次，参数是本次发现的全部消息
pub type UnsuccessfulWorkflowsHandler<W> = Arc<dyn Fn(Vec<Arc<W>>) + Send + Sync>;

/// 翻页阶段的结果
#[derive(Debug, Default)]
struct Pagination {
    /// 来源报告没有更多页
    exhausted: bool,
    /// 本阶段实际请求的页数
    fetched: usize,
    /// 在检查点观察到了停止请求
    interrupted: bool,
}

/// 批量撤回策略
pub struct BatchUnsendStrategy<S: MessageSource> {
    source: Arc<S>,
    timings: StrategyTimings,
    state: Arc<SharedState<S::Workflow>>,
    on_unsuccessful_workflows: Option<UnsuccessfulWorkflowsHandler<S::Workflow>>,
    monitor: MonitorSlot,
}

impl<S: MessageSource> BatchUnsendStrategy<S> {
    pub fn new(source: Arc<S>, timings: StrategyTimings) -> Self {
        Self {
            source,
            timings,
            state: Arc::new(SharedState::new()),
            on_unsuccessful_workflows: None,
            monitor: MonitorSlot::default(),
        }
    }

    /// 设置撤回未生效时的回调；未设置时不会启动撤回失败检查
    pub fn with_unsuccessful_workflow_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Vec<Arc<S::Workflow>>) + Send + Sync + 'static,
    {
        self.on_unsuccessful_workflows = Some(Arc::new(handler));
        self
    }

    pub fn stats(&self) -> RunStats {
        self.state.stats()
    }

    /// 尚未核对的已完成消息数
    pub fn finished_workflow_count(&self) -> usize {
        self.state.finished_count()
    }

    /// 后台撤回失败检查是否在运行
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_active()
    }

    /// 立即核对一次已完成的消息，返回上报的数量；未配置回调时什么也不做
    pub async fn check_unsuccessful_workflows(&self) -> usize {
        match &self.on_unsuccessful_workflows {
            Some(handler) => monitor::check_unsuccessful_workflows(&self.state, handler).await,
            None => 0,
        }
    }

    async fn process_batches(&self, batch_size: NonZeroUsize) -> RunOutcome {
        let outcome = loop {
            let batch_num = self.state.record_batch();
            debug!("📦 开始第 {} 批", batch_num);

            let pagination = self.paginate(batch_size).await;
            if pagination.interrupted && pagination.fetched == 0 {
                debug!("第 {} 批开始前已请求停止", batch_num);
            } else {
                self.process_worklist(batch_num).await;
            }

            if pagination.exhausted {
                break RunOutcome::Done;
            }
            if self.state.is_stopped() {
                break RunOutcome::Stopped;
            }

            self.ensure_monitor();
        };

        self.finish(outcome).await;
        outcome
    }

    /// 翻页阶段：最多 `batch_size` 次
    async fn paginate(&self, batch_size: NonZeroUsize) -> Pagination {
        let mut pagination = Pagination::default();

        for _ in 0..batch_size.get() {
            if self.state.is_stopped() {
                pagination.interrupted = true;
                break;
            }

            pagination.fetched += 1;
            match self.source.fetch_and_render_next_page().await {
                Ok(true) => {
                    debug!("没有更多页");
                    pagination.exhausted = true;
                    break;
                }
                Ok(false) => {
                    debug!("等待 {:?} 后加载下一页", self.timings.next_page_delay);
                    sleep(self.timings.next_page_delay).await;
                }
                Err(e) => {
                    error!("加载下一页失败: {:#}", e);
                    sleep(self.timings.next_page_delay).await;
                    break;
                }
            }
        }

        pagination
    }

    /// 撤回阶段：逐条处理当前工作列表
    async fn process_worklist(&self, batch_num: usize) {
        let workflows = match self.source.create_ui_messages().await {
            Ok(workflows) => workflows,
            Err(e) => {
                error!("[第 {} 批] 构建工作列表失败: {:#}", batch_num, e);
                return;
            }
        };
        let total = workflows.len();
        info!("[第 {} 批] 📋 {} 条消息待撤回", batch_num, total);

        let mut unsent = 0;
        for (index, workflow) in workflows.into_iter().enumerate() {
            if self.state.is_stopped() {
                info!("[第 {} 批] ⏹️ 已请求停止，剩余 {} 条不再处理", batch_num, total - index);
                break;
            }

            match workflow.unsend().await {
                Ok(()) => {
                    debug!("[第 {} 批] ✓ 消息 {} 已撤回", batch_num, workflow.id());
                    self.state.record_finished(Arc::new(workflow));
                    unsent += 1;
                    sleep(self.timings.message_queue_delay).await;
                }
                Err(e) => {
                    error!("[第 {} 批] ❌ 消息 {} 撤回失败: {:#}", batch_num, workflow.id(), e);
                    self.state.record_failed();
                }
            }
        }

        info!("[第 {} 批] ✓ 完成: 成功 {}/{}", batch_num, unsent, total);
    }

    fn ensure_monitor(&self) {
        let Some(handler) = &self.on_unsuccessful_workflows else {
            return;
        };
        if self.monitor.is_active() || self.state.finished_count() == 0 {
            return;
        }
        self.monitor.start(
            self.state.clone(),
            handler.clone(),
            self.timings.unsuccessful_workflow_alert_interval,
        );
    }

    /// Done 与 Stopped 都会清除运行标志并停止后台检查，然后补做一次核对
    async fn finish(&self, outcome: RunOutcome) {
        self.state.finish();
        self.monitor.cancel();
        self.check_unsuccessful_workflows().await;

        let stats = self.state.stats();
        info!(
            "🏁 批量撤回结束 ({:?}): 成功 {}, 失败 {}, 未生效 {}",
            outcome, stats.unsent, stats.failed, stats.unsuccessful
        );
    }
}

impl<S: MessageSource> UnsendStrategy for BatchUnsendStrategy<S> {
    type Source = S;

    fn is_running(&self) -> bool {
        self.state.is_running() && !self.state.is_stopped()
    }

    fn stop(&self) {
        debug!("BatchUnsendStrategy stop");
        self.state.request_stop();
    }

    fn run(&self, batch_size: NonZeroUsize) -> BoxFuture<'_, RunOutcome> {
        info!("🚀 BatchUnsendStrategy.run(), batch_size = {}", batch_size);
        self.state.start();
        Box::pin(self.process_batches(batch_size))
    }

    fn source(&self) -> &Arc<S> {
        &self.source
    }
}
