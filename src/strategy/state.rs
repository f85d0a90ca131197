//! 主循环与撤回失败检查共享的状态
//!
//! 所有修改都在一次加锁内完成，不会跨越 `.await`。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 运行统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// 撤回流程成功结束的消息数
    pub unsent: usize,
    /// 撤回流程报错的消息数
    pub failed: usize,
    /// 被判定为撤回未生效并已上报的消息数
    pub unsuccessful: usize,
    /// 已执行的批次数
    pub batches: usize,
}

pub(crate) struct SharedState<W> {
    running: AtomicBool,
    stopped: AtomicBool,
    finished_workflows: Mutex<Vec<Arc<W>>>,
    unsent: AtomicUsize,
    failed: AtomicUsize,
    unsuccessful: AtomicUsize,
    batches: AtomicUsize,
    reconciling: tokio::sync::Mutex<()>,
}

impl<W> SharedState<W> {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            finished_workflows: Mutex::new(Vec::new()),
            unsent: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            unsuccessful: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            reconciling: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
    }

    pub(crate) fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub(crate) fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn record_finished(&self, workflow: Arc<W>) {
        self.finished().push(workflow);
        self.unsent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_unsuccessful(&self, count: usize) {
        self.unsuccessful.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn record_batch(&self) -> usize {
        self.batches.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 同一时刻只允许一次核对
    pub(crate) async fn lock_reconciliation(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.reconciling.lock().await
    }

    pub(crate) fn finished_snapshot(&self) -> Vec<Arc<W>> {
        self.finished().clone()
    }

    pub(crate) fn finished_count(&self) -> usize {
        self.finished().len()
    }

    /// 从跟踪列表中移除 `checked` 里的记录（按指针比较），其余保持原有顺序
    pub(crate) fn forget(&self, checked: &[Arc<W>]) {
        self.finished()
            .retain(|tracked| !checked.iter().any(|c| Arc::ptr_eq(c, tracked)));
    }

    pub(crate) fn stats(&self) -> RunStats {
        RunStats {
            unsent: self.unsent.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            unsuccessful: self.unsuccessful.load(Ordering::SeqCst),
            batches: self.batches.load(Ordering::SeqCst),
        }
    }

    fn finished(&self) -> MutexGuard<'_, Vec<Arc<W>>> {
        self.finished_workflows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
