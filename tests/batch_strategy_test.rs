use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use idmu_unsend::{
    BatchUnsendStrategy, MessageSource, RunOutcome, StrategyTimings, UnsendStrategy,
    UnsendWorkflow,
};
use tokio_test::{assert_pending, task};

/// 一条假消息：可以设置撤回失败、撤回后仍在页面上
struct FakeMessage {
    id: String,
    fail: bool,
    still_present: AtomicBool,
    unsend_log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl UnsendWorkflow for FakeMessage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn unsend(&self) -> Result<()> {
        self.unsend_log.lock().unwrap().push(self.id.clone());
        if self.fail {
            Err(anyhow!("Timeout openActionsMenu"))
        } else {
            Ok(())
        }
    }

    async fn is_still_present(&self) -> bool {
        self.still_present.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
struct MessageSpec {
    fail: bool,
    still_present: bool,
}

const OK: MessageSpec = MessageSpec {
    fail: false,
    still_present: false,
};
const FAILS: MessageSpec = MessageSpec {
    fail: true,
    still_present: false,
};
const STUCK: MessageSpec = MessageSpec {
    fail: false,
    still_present: true,
};

/// 假会话线程
///
/// `fetch_and_render_next_page` 依次返回 `fetch_results`（用完后一直返回 `after_results`）；
/// 每次返回 `false` 时渲染下一页消息，`create_ui_messages` 返回已渲染但尚未交出的消息。
struct FakeThread {
    fetch_results: Mutex<VecDeque<bool>>,
    after_results: bool,
    pages: Mutex<VecDeque<Vec<MessageSpec>>>,
    page_template: Option<Vec<MessageSpec>>,
    visible: Mutex<Vec<MessageSpec>>,
    fail_worklist_once: AtomicBool,
    next_id: AtomicUsize,
    fetch_calls: AtomicUsize,
    worklist_calls: AtomicUsize,
    unsend_log: Arc<Mutex<Vec<String>>>,
}

impl FakeThread {
    fn new(fetch_results: Vec<bool>, pages: Vec<Vec<MessageSpec>>) -> Self {
        Self {
            fetch_results: Mutex::new(fetch_results.into()),
            after_results: true,
            pages: Mutex::new(pages.into()),
            page_template: None,
            visible: Mutex::new(Vec::new()),
            fail_worklist_once: AtomicBool::new(false),
            next_id: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            worklist_calls: AtomicUsize::new(0),
            unsend_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 永远有下一页，每页内容相同
    fn endless(page: Vec<MessageSpec>) -> Self {
        Self {
            after_results: false,
            page_template: Some(page),
            ..Self::new(Vec::new(), Vec::new())
        }
    }

    fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn worklist_calls(&self) -> usize {
        self.worklist_calls.load(Ordering::SeqCst)
    }

    fn unsent(&self) -> Vec<String> {
        self.unsend_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSource for FakeThread {
    type Workflow = FakeMessage;

    async fn fetch_and_render_next_page(&self) -> Result<bool> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let exhausted = self
            .fetch_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.after_results);
        if !exhausted {
            let page = match &self.page_template {
                Some(template) => Some(template.clone()),
                None => self.pages.lock().unwrap().pop_front(),
            };
            if let Some(page) = page {
                self.visible.lock().unwrap().extend(page);
            }
        }
        Ok(exhausted)
    }

    async fn create_ui_messages(&self) -> Result<Vec<FakeMessage>> {
        self.worklist_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_worklist_once.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("找不到消息列表容器"));
        }
        let specs: Vec<MessageSpec> = self.visible.lock().unwrap().drain(..).collect();
        Ok(specs
            .into_iter()
            .map(|spec| FakeMessage {
                id: format!("m{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
                fail: spec.fail,
                still_present: AtomicBool::new(spec.still_present),
                unsend_log: self.unsend_log.clone(),
            })
            .collect())
    }
}

type Reports = Arc<Mutex<Vec<Vec<String>>>>;

fn strategy(source: FakeThread) -> BatchUnsendStrategy<FakeThread> {
    BatchUnsendStrategy::new(Arc::new(source), StrategyTimings::default())
}

fn reporting_strategy(source: FakeThread) -> (BatchUnsendStrategy<FakeThread>, Reports) {
    let reports: Reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let strategy = strategy(source).with_unsuccessful_workflow_handler(
        move |workflows: Vec<Arc<FakeMessage>>| {
            let ids: Vec<String> = workflows.iter().map(|w| w.id().to_string()).collect();
            sink.lock().unwrap().push(ids);
        },
    );
    (strategy, reports)
}

fn batch(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_is_running_lifecycle() {
    let strategy = strategy(FakeThread::new(vec![false], vec![vec![OK]]));
    assert!(!strategy.is_running());

    let run = strategy.run(batch(1));
    // 调用 run 后立即处于运行状态，无需等待
    assert!(strategy.is_running());

    assert_eq!(run.await, RunOutcome::Done);
    assert!(!strategy.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_run_suspends_on_page_delay() {
    let strategy = strategy(FakeThread::endless(vec![OK]));

    let mut run = task::spawn(strategy.run(batch(3)));
    // 第一页请求后停在翻页间隔上
    assert_pending!(run.poll());
    assert!(strategy.is_running());
    assert_eq!(strategy.source().fetch_calls(), 1);

    strategy.stop();
    assert!(!strategy.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_delay_then_halts() {
    let strategy = strategy(FakeThread::endless(vec![OK]));

    let run = strategy.run(batch(3));
    let controller = async {
        // 处于第一页之后的翻页间隔中
        tokio::time::sleep(Duration::from_millis(500)).await;
        strategy.stop();
    };
    let (outcome, ()) = tokio::join!(run, controller);

    assert_eq!(outcome, RunOutcome::Stopped);
    // 正在进行的等待没有被打断，之后的检查点不再翻页，也不再撤回
    assert_eq!(strategy.source().fetch_calls(), 1);
    assert_eq!(strategy.source().worklist_calls(), 1);
    assert!(strategy.source().unsent().is_empty());
    assert!(!strategy.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_checkpoint_starts_no_work() {
    let strategy = strategy(FakeThread::endless(vec![OK]));

    let run = strategy.run(batch(2));
    strategy.stop();

    assert_eq!(run.await, RunOutcome::Stopped);
    assert_eq!(strategy.source().fetch_calls(), 0);
    assert_eq!(strategy.source().worklist_calls(), 0);
    assert_eq!(strategy.stats().batches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_item_unsent_once_in_page_order() {
    // 3 页 × 2 条，翻页结果: 有, 有, 有, 没有
    let pages = vec![vec![OK, OK], vec![OK, OK], vec![OK, OK]];
    let strategy = strategy(FakeThread::new(vec![false, false, false, true], pages));

    assert_eq!(strategy.run(batch(2)).await, RunOutcome::Done);

    assert_eq!(
        strategy.source().unsent(),
        vec!["m1", "m2", "m3", "m4", "m5", "m6"]
    );
    let stats = strategy.stats();
    assert_eq!(stats.unsent, 6);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.batches, 2);
    assert!(!strategy.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_failed_item_does_not_abort_batch() {
    let strategy = strategy(FakeThread::new(vec![false, true], vec![vec![OK, FAILS, OK]]));

    assert_eq!(strategy.run(batch(5)).await, RunOutcome::Done);

    assert_eq!(strategy.source().unsent(), vec!["m1", "m2", "m3"]);
    let stats = strategy.stats();
    assert_eq!(stats.unsent, 2);
    assert_eq!(stats.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_worklist_failure_is_absorbed() {
    let source = FakeThread::new(vec![false, true], vec![vec![OK]]);
    source.fail_worklist_once.store(true, Ordering::SeqCst);
    let strategy = strategy(source);

    // 第一批构建失败，第二批仍能处理已渲染的消息
    assert_eq!(strategy.run(batch(1)).await, RunOutcome::Done);
    assert_eq!(strategy.source().worklist_calls(), 2);
    assert_eq!(strategy.source().unsent(), vec!["m1"]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_immediately_never_monitors() {
    let (strategy, reports) = reporting_strategy(FakeThread::new(vec![true], Vec::new()));

    assert_eq!(strategy.run(batch(1)).await, RunOutcome::Done);

    assert_eq!(strategy.finished_workflow_count(), 0);
    assert!(!strategy.is_monitoring());
    assert!(reports.lock().unwrap().is_empty());
    assert_eq!(strategy.source().fetch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_two_pages_one_item_each() {
    let (strategy, reports) =
        reporting_strategy(FakeThread::new(vec![false, false, true], vec![vec![OK], vec![OK]]));

    assert_eq!(strategy.run(batch(2)).await, RunOutcome::Done);

    assert_eq!(strategy.source().unsent(), vec!["m1", "m2"]);
    assert_eq!(strategy.stats().unsent, 2);
    assert!(!strategy.is_running());
    assert!(!strategy.is_monitoring());
    assert!(reports.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_still_present_item_reported_exactly_once() {
    let (strategy, reports) = reporting_strategy(FakeThread::new(
        vec![false, true],
        vec![vec![OK, STUCK, OK]],
    ));

    assert_eq!(strategy.run(batch(1)).await, RunOutcome::Done);

    // 结束时补做的核对已经上报
    assert_eq!(*reports.lock().unwrap(), vec![vec!["m2".to_string()]]);
    assert_eq!(strategy.finished_workflow_count(), 0);

    // 再次核对不会重复上报
    assert_eq!(strategy.check_unsuccessful_workflows().await, 0);
    assert_eq!(reports.lock().unwrap().len(), 1);
    assert_eq!(strategy.stats().unsuccessful, 1);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_reports_while_running() {
    let (strategy, reports) = reporting_strategy(FakeThread::endless(vec![STUCK]));

    let run = strategy.run(batch(1));
    let controller = async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let reported_while_running = reports.lock().unwrap().len();
        let monitoring = strategy.is_monitoring();
        strategy.stop();
        (reported_while_running, monitoring)
    };

    let (outcome, (reported_while_running, monitoring)) = tokio::join!(run, controller);

    assert_eq!(outcome, RunOutcome::Stopped);
    assert!(monitoring);
    assert!(reported_while_running >= 1);
    assert!(!strategy.is_monitoring());

    // 每条撤回过的消息恰好上报一次
    let mut reported: Vec<String> = reports.lock().unwrap().concat();
    reported.sort();
    let mut unsent = strategy.source().unsent();
    unsent.sort();
    assert_eq!(reported, unsent);
    assert_eq!(strategy.finished_workflow_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_again_after_stop() {
    let strategy = strategy(FakeThread::new(
        vec![false, false, true],
        vec![vec![OK], vec![OK]],
    ));

    let run = strategy.run(batch(1));
    strategy.stop();
    assert_eq!(run.await, RunOutcome::Stopped);
    assert!(!strategy.is_running());

    assert_eq!(strategy.run(batch(1)).await, RunOutcome::Done);
    assert_eq!(strategy.source().unsent(), vec!["m1", "m2"]);
}
