//! 流水线引擎
//!
//! 持有存储、闸门、任务队列与事件发送端；start 推入发现任务，
//! 之后每个资源按 发现 -> 指标 -> 优化 链式推进。re_evaluate 从优化阶段重新进入。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cloud::{MetricSource, ResourceLister, SubResourceLookup};
use crate::config::AppConfig;
use crate::core::{PipelineError, QueueStats, TaskQueue};
use crate::pipeline::discovery::DiscoveryTask;
use crate::pipeline::events::{EventPublisher, PipelineEvent};
use crate::pipeline::export::export_rows;
use crate::pipeline::optimize::OptimizeTask;
use crate::pipeline::preferences::{self, PreferenceItem};
use crate::pipeline::summary::{aggregate, ResultSummary};
use crate::pipeline::view::ResourceItem;
use crate::pipeline::{LazyLoadGate, ResourceSnapshot, ResourceStore};
use crate::recommendation::RecommendationService;

/// 运行参数（从 AppConfig 的 [pipeline] / [recommendation] 段得到）
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub max_concurrent_tasks: usize,
    pub lazy_load_threshold: u32,
    pub telemetry_window_hours: u32,
    pub alignment: Duration,
    pub telemetry_max_retry: u32,
    pub optimize_max_retry: u32,
    pub request_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_concurrent_tasks: cfg.pipeline.max_concurrent_tasks,
            lazy_load_threshold: cfg.pipeline.lazy_load_threshold,
            telemetry_window_hours: cfg.pipeline.telemetry_window_hours,
            alignment: Duration::from_secs(cfg.pipeline.alignment_secs.max(1)),
            telemetry_max_retry: cfg.pipeline.telemetry_max_retry,
            optimize_max_retry: cfg.pipeline.optimize_max_retry,
            request_timeout: cfg.recommendation.timeout(),
        }
    }
}

/// 外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub lister: Arc<dyn ResourceLister>,
    pub disks: Arc<dyn SubResourceLookup>,
    pub metrics: Arc<dyn MetricSource>,
    pub recommender: Arc<dyn RecommendationService>,
}

/// 各阶段任务共享的上下文
pub struct PipelineContext {
    pub project_id: String,
    pub collaborators: Collaborators,
    pub settings: PipelineSettings,
    pub store: ResourceStore,
    pub gate: LazyLoadGate,
    pub queue: Arc<TaskQueue>,
    pub events: EventPublisher,
}

impl PipelineContext {
    /// 发布一个快照的展示项
    pub fn publish(&self, snapshot: &ResourceSnapshot) {
        self.events
            .publish(PipelineEvent::Item(ResourceItem::from(snapshot)));
    }

    /// 重算汇总并发布
    pub async fn update_summary(&self) -> ResultSummary {
        let summary = aggregate(&self.store).await;
        tracing::debug!("{}", summary.message);
        self.events.publish(PipelineEvent::Summary(summary.clone()));
        summary
    }
}

pub struct Pipeline {
    ctx: Arc<PipelineContext>,
}

impl Pipeline {
    pub fn new(
        project_id: impl Into<String>,
        collaborators: Collaborators,
        settings: PipelineSettings,
        cancel_token: CancellationToken,
        events_tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        let queue = TaskQueue::new(settings.max_concurrent_tasks, cancel_token);
        let ctx = PipelineContext {
            project_id: project_id.into(),
            collaborators,
            gate: LazyLoadGate::new(settings.lazy_load_threshold),
            settings,
            store: ResourceStore::new(),
            queue,
            events: EventPublisher::new(events_tx),
        };
        Self { ctx: Arc::new(ctx) }
    }

    /// 启动：发布 Ready(false)，注册清空回调，启动队列并推入发现任务。
    /// 重复调用返回 None。
    pub fn start(&self) -> Option<JoinHandle<()>> {
        let handle = self.ctx.queue.start()?;

        tracing::info!(
            "Starting rightsizing pipeline for project {}",
            self.ctx.project_id
        );
        self.ctx.events.publish(PipelineEvent::Ready(false));

        let events = self.ctx.events.clone();
        self.ctx.queue.set_on_finish(move || {
            tracing::info!("All pipeline tasks finished");
            events.publish(PipelineEvent::Ready(true));
        });

        self.ctx.queue.push(DiscoveryTask::new(Arc::clone(&self.ctx)));
        Some(handle)
    }

    /// 用新的偏好重新计算某个资源：校验偏好、解除懒加载、标记 loading，
    /// 必要时推入优化任务
    ///
    /// 发现阶段的指标任务还没结束、或已有优化任务在排队时只改快照，
    /// 由它们带着新偏好完成这一次优化，保证每次释放只调用一次推荐服务。
    pub async fn re_evaluate(
        &self,
        id: &str,
        preferences: Vec<PreferenceItem>,
    ) -> Result<(), PipelineError> {
        preferences::validate(&preferences)?;

        let (snapshot, schedule) = self
            .ctx
            .store
            .update(id, |s| {
                s.preferences = preferences;
                s.loading = true;
                s.lazy_load_enabled = false;
                s.failure = None;
                let schedule = !s.telemetry_pending && !s.optimize_queued;
                if schedule {
                    s.optimize_queued = true;
                }
                schedule
            })
            .await
            .ok_or_else(|| PipelineError::ResourceNotFound(id.to_string()))?;
        self.ctx.publish(&snapshot);

        if schedule {
            tracing::info!("Re-evaluating compute instance {}", id);
            self.ctx
                .queue
                .push(OptimizeTask::new(Arc::clone(&self.ctx), id));
        } else {
            tracing::info!(
                "Compute instance {} released, optimization already scheduled",
                id
            );
        }
        Ok(())
    }

    /// 导出全部资源（按 ID 排序），第一行为表头
    pub async fn export_all(&self) -> Vec<Vec<String>> {
        let snapshots = self.ctx.store.snapshots().await;
        export_rows(snapshots.iter().map(|s| s.as_ref()))
    }

    pub async fn summary(&self) -> ResultSummary {
        aggregate(&self.ctx.store).await
    }

    pub fn store(&self) -> &ResourceStore {
        &self.ctx.store
    }

    /// 队列里没有排队或运行中的任务
    pub fn is_idle(&self) -> bool {
        self.ctx.queue.is_idle()
    }

    pub fn stats(&self) -> QueueStats {
        self.ctx.queue.stats()
    }
}
