//! 指标任务：并发拉取实例与各磁盘的利用率时间序列，整体替换快照里的指标
//!
//! 两种模式：
//! - Chained：发现之后的正常一环，成功后推入优化任务
//! - Refresh：优化任务因懒加载延后时推入，只刷新指标并把 loading 置回 false，不再推优化任务

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use tokio_util::sync::CancellationToken;

use crate::cloud::{DataPoint, MetricFilter, TimeWindow};
use crate::core::{PipelineError, Task, TaskProperties};
use crate::pipeline::optimize::{mark_failed, OptimizeTask};
use crate::pipeline::PipelineContext;
use crate::recommendation::MetricMap;

/// 实例指标：请求里的名字 -> 云监控指标类型
pub const INSTANCE_METRICS: [(&str, &str); 2] = [
    ("cpuUtilization", "compute.googleapis.com/instance/cpu/utilization"),
    ("memoryUtilization", "compute.googleapis.com/instance/memory/balloon/ram_used"),
];

/// 磁盘指标，按设备名过滤
pub const DISK_METRICS: [(&str, &str); 4] = [
    ("DiskReadIOPS", "compute.googleapis.com/instance/disk/read_ops_count"),
    ("DiskWriteIOPS", "compute.googleapis.com/instance/disk/write_ops_count"),
    ("DiskReadThroughput", "compute.googleapis.com/instance/disk/read_bytes_count"),
    ("DiskWriteThroughput", "compute.googleapis.com/instance/disk/write_bytes_count"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    Chained,
    Refresh,
}

pub struct TelemetryTask {
    ctx: Arc<PipelineContext>,
    resource_id: String,
    mode: TelemetryMode,
}

/// 一条待拉取的序列：所属磁盘（实例指标为 None）、指标名、过滤条件
struct SeriesQuery {
    disk_id: Option<String>,
    name: &'static str,
    filter: MetricFilter,
}

impl TelemetryTask {
    pub fn chained(ctx: Arc<PipelineContext>, resource_id: impl Into<String>) -> Self {
        Self {
            ctx,
            resource_id: resource_id.into(),
            mode: TelemetryMode::Chained,
        }
    }

    pub fn refresh(ctx: Arc<PipelineContext>, resource_id: impl Into<String>) -> Self {
        Self {
            ctx,
            resource_id: resource_id.into(),
            mode: TelemetryMode::Refresh,
        }
    }
}

#[async_trait]
impl Task for TelemetryTask {
    fn properties(&self) -> TaskProperties {
        TaskProperties::new(
            format!("get_compute_instance_metrics_{}", self.resource_id),
            format!("Getting metrics of compute instance {}", self.resource_id),
            self.ctx.settings.telemetry_max_retry,
        )
    }

    async fn run(&self, token: CancellationToken) -> Result<(), PipelineError> {
        let ctx = &self.ctx;
        let id = self.resource_id.as_str();
        let snapshot = ctx
            .store
            .get(id)
            .await
            .ok_or_else(|| PipelineError::ResourceNotFound(id.to_string()))?;

        let mut queries: Vec<SeriesQuery> = INSTANCE_METRICS
            .iter()
            .map(|&(name, metric_type)| SeriesQuery {
                disk_id: None,
                name,
                filter: MetricFilter::instance(metric_type, id),
            })
            .collect();
        for disk in &snapshot.disks {
            let disk_id = disk.id.to_string();
            queries.extend(DISK_METRICS.iter().map(|&(name, metric_type)| SeriesQuery {
                disk_id: Some(disk_id.clone()),
                name,
                filter: MetricFilter::device(metric_type, id, &disk.name),
            }));
        }

        let window = TimeWindow::trailing_hours(ctx.settings.telemetry_window_hours);
        let alignment = ctx.settings.alignment;
        let metrics_source = &ctx.collaborators.metrics;
        let fetches = queries.iter().map(|q| async move {
            let points = metrics_source.get_series(&q.filter, &window, alignment).await?;
            Ok::<(&SeriesQuery, Vec<DataPoint>), PipelineError>((q, points))
        });

        let results = tokio::select! {
            _ = token.cancelled() => return Err(PipelineError::Cancelled),
            results = try_join_all(fetches) => results?,
        };

        let mut metrics = MetricMap::new();
        let mut disks_metrics: BTreeMap<String, MetricMap> = snapshot
            .disks
            .iter()
            .map(|d| (d.id.to_string(), MetricMap::new()))
            .collect();
        for (query, points) in results {
            match &query.disk_id {
                None => {
                    metrics.insert(query.name.to_string(), points);
                }
                Some(disk_id) => {
                    disks_metrics
                        .entry(disk_id.clone())
                        .or_default()
                        .insert(query.name.to_string(), points);
                }
            }
        }

        // 拉取期间快照可能已被 re_evaluate 改写，只在写锁内替换指标相关字段
        let mode = self.mode;
        let (snapshot, ()) = ctx
            .store
            .update(id, |s| {
                s.metrics = metrics;
                s.disks_metrics = disks_metrics;
                s.skipped = false;
                s.skip_reason = None;
                match mode {
                    TelemetryMode::Chained => {
                        s.telemetry_pending = false;
                        s.optimize_queued = true;
                        s.loading = true;
                    }
                    // 已被 re_evaluate 释放的资源正在重新优化，保留其 loading
                    TelemetryMode::Refresh => s.loading = s.loading && !s.lazy_load_enabled,
                }
            })
            .await
            .ok_or_else(|| PipelineError::ResourceNotFound(id.to_string()))?;
        ctx.publish(&snapshot);
        ctx.update_summary().await;

        if mode == TelemetryMode::Chained {
            ctx.queue.push(OptimizeTask::new(Arc::clone(ctx), id));
        }
        Ok(())
    }

    async fn on_exhausted(&self, err: &PipelineError) {
        mark_failed(&self.ctx, &self.resource_id, err).await;
    }
}
