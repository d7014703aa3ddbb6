//! 任务队列
//!
//! 无界队列 + 受限并发的工作池：
//! - push 永不阻塞调用方（mpsc::unbounded）
//! - 调度循环用 Semaphore 限制同时运行的任务数
//! - 每个任务按 max_retry 从头重跑，预算耗尽后记录日志并丢弃，不影响其它任务
//! - 待完成计数在 push 时加一、任务最终结束时减一；1 -> 0 的那一刻触发 on_finish
//!
//! 子任务总是在父任务的 run 内被 push，所以父任务减一之前子任务已经计入，
//! 不会出现「父任务刚结束、子任务还没入队」时误报完成。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{PipelineError, Task};

type OnFinish = Arc<dyn Fn() + Send + Sync>;

/// 队列计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

#[derive(Debug, Default)]
struct QueueCounters {
    pushed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

/// 任务队列：所有任务共享同一个取消令牌
pub struct TaskQueue {
    pending_tx: mpsc::UnboundedSender<Box<dyn Task>>,
    /// start() 时被调度循环取走
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<Box<dyn Task>>>>,
    /// 已入队但尚未最终结束的任务数（含正在运行的）
    outstanding: AtomicUsize,
    on_finish: RwLock<Option<OnFinish>>,
    cancel_token: CancellationToken,
    max_concurrent: usize,
    counters: QueueCounters,
}

impl TaskQueue {
    pub fn new(max_concurrent: usize, cancel_token: CancellationToken) -> Arc<Self> {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            pending_tx,
            pending_rx: Mutex::new(Some(pending_rx)),
            outstanding: AtomicUsize::new(0),
            on_finish: RwLock::new(None),
            cancel_token,
            max_concurrent: max_concurrent.max(1),
            counters: QueueCounters::default(),
        })
    }

    /// 启动调度循环；重复调用返回 None。循环在取消令牌触发时退出。
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut pending_rx = self
            .pending_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()?;
        let queue = Arc::clone(self);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        Some(tokio::spawn(async move {
            loop {
                let task = tokio::select! {
                    _ = queue.cancel_token.cancelled() => break,
                    next = pending_rx.recv() => match next {
                        Some(task) => task,
                        None => break,
                    },
                };

                let permit = tokio::select! {
                    _ = queue.cancel_token.cancelled() => break,
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = AssertUnwindSafe(queue.execute(task.as_ref()))
                        .catch_unwind()
                        .await;
                    if let Err(payload) = outcome {
                        queue.on_panic(task.as_ref(), payload).await;
                    }
                    queue.finish_one();
                });
            }
            tracing::debug!("Task queue dispatcher stopped");
        }))
    }

    /// 入队，不阻塞
    pub fn push(&self, task: impl Task + 'static) {
        self.push_boxed(Box::new(task));
    }

    pub fn push_boxed(&self, task: Box<dyn Task>) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.counters.pushed.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.pending_tx.send(task) {
            tracing::warn!(
                "Task queue is closed, dropping task {}",
                err.0.properties().id
            );
            self.finish_one();
        }
    }

    /// 注册「队列清空」回调；每次计数从 1 降到 0 时调用一次
    pub fn set_on_finish(&self, callback: impl Fn() + Send + Sync + 'static) {
        let mut slot = self
            .on_finish
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(callback));
    }

    /// 没有已入队但尚未结束的任务
    pub fn is_idle(&self) -> bool {
        self.outstanding.load(Ordering::Acquire) == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
        }
    }

    /// 带重试地执行单个任务；返回时任务已处于终态
    async fn execute(&self, task: &dyn Task) {
        let props = task.properties();
        let mut attempt: u32 = 0;

        loop {
            if self.cancel_token.is_cancelled() {
                tracing::warn!("Task {} not started: queue cancelled", props.id);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                task.on_exhausted(&PipelineError::Cancelled).await;
                return;
            }

            tracing::debug!(
                "Running task {} ({}), attempt {}",
                props.id,
                props.description,
                attempt + 1
            );

            let err = match task.run(self.cancel_token.clone()).await {
                Ok(()) => {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Task {} finished", props.id);
                    return;
                }
                Err(err) => err,
            };

            let retry = attempt < props.max_retry
                && err.is_retryable()
                && !self.cancel_token.is_cancelled();
            if retry {
                attempt += 1;
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Task {} failed: {}, retrying ({}/{})",
                    props.id,
                    err,
                    attempt,
                    props.max_retry
                );
                continue;
            }

            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                "Task {} failed after {} attempt(s): {}",
                props.id,
                attempt + 1,
                err
            );
            task.on_exhausted(&err).await;
            return;
        }
    }

    /// 任务 panic：按失败处理，同样交给 on_exhausted 收尾
    async fn on_panic(&self, task: &dyn Task, payload: Box<dyn Any + Send>) {
        let message = panic_message(payload.as_ref());
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        tracing::error!("Task {} panicked: {}", task.properties().id, message);

        let err = PipelineError::Panicked(message);
        if AssertUnwindSafe(task.on_exhausted(&err))
            .catch_unwind()
            .await
            .is_err()
        {
            tracing::error!("Task {} panicked again in on_exhausted", task.properties().id);
        }
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        if self.cancel_token.is_cancelled() {
            return;
        }
        let callback = self
            .on_finish
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
