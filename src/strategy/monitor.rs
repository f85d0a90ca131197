//! 撤回失败检查
//!
//! 撤回流程"成功"只代表确认按钮被点击了；真正的效果是消息从页面上消失。
//! 这里周期性地核对已完成的消息，仍然在页面上的会被上报一次。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::strategy::batch::UnsuccessfulWorkflowsHandler;
use crate::strategy::state::SharedState;
use crate::workflow::UnsendWorkflow;

/// 核对一次已完成的消息，返回本次上报的数量
///
/// 每条被检查过的记录都会移出跟踪列表：仍在页面上的上报（整批一次回调），已消失的直接遗忘。
/// 检查期间新完成的记录保留到下一次。
pub(crate) async fn check_unsuccessful_workflows<W: UnsendWorkflow>(
    state: &SharedState<W>,
    handler: &UnsuccessfulWorkflowsHandler<W>,
) -> usize {
    let _guard = state.lock_reconciliation().await;
    let checked = state.finished_snapshot();
    if checked.is_empty() {
        return 0;
    }
    debug!("核对 {} 条已完成的消息", checked.len());

    let mut unsuccessful = Vec::new();
    for workflow in &checked {
        if workflow.is_still_present().await {
            unsuccessful.push(workflow.clone());
        }
    }

    state.forget(&checked);

    let count = unsuccessful.len();
    if count > 0 {
        let ids: Vec<&str> = unsuccessful.iter().map(|w| w.id()).collect();
        warn!("⚠️ {} 条消息撤回未生效: {:?}", count, ids);
        state.record_unsuccessful(count);
        handler(unsuccessful);
    }
    count
}

/// 后台检查任务的句柄
///
/// 最多存在一个任务；`cancel` 或 drop 时终止任务。
#[derive(Default)]
pub(crate) struct MonitorSlot {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorSlot {
    pub(crate) fn is_active(&self) -> bool {
        self.slot().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// 尚无任务时启动周期检查
    pub(crate) fn start<W: UnsendWorkflow>(
        &self,
        state: Arc<SharedState<W>>,
        handler: UnsuccessfulWorkflowsHandler<W>,
        period: Duration,
    ) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        debug!("启动撤回失败检查，周期 {:?}", period);

        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !state.is_running() {
                    debug!("策略已不在运行，撤回失败检查退出");
                    break;
                }
                check_unsuccessful_workflows(&state, &handler).await;
            }
        }));
    }

    pub(crate) fn cancel(&self) {
        if let Some(task) = self.slot().take() {
            debug!("停止撤回失败检查");
            task.abort();
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MonitorSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
