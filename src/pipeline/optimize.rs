//! 优化任务：把指标与偏好发给推荐服务，保存推荐结果并更新汇总
//!
//! 资源处于懒加载状态时不调用服务，只推入一个 Refresh 指标任务后返回，
//! 等待 re_evaluate 显式释放。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::cloud::{last_segment, region_from_zone};
use crate::core::{PipelineError, Task, TaskProperties};
use crate::pipeline::preferences;
use crate::pipeline::telemetry::TelemetryTask;
use crate::pipeline::{PipelineContext, ResourceSnapshot};
use crate::recommendation::{DiskRequest, InstanceRequest, OptimizationRequest};

pub struct OptimizeTask {
    ctx: Arc<PipelineContext>,
    resource_id: String,
}

impl OptimizeTask {
    pub fn new(ctx: Arc<PipelineContext>, resource_id: impl Into<String>) -> Self {
        Self {
            ctx,
            resource_id: resource_id.into(),
        }
    }
}

/// 实例 ID 的 SHA-256 十六进制摘要，原始 ID 不离开本机
pub fn hash_id(id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

/// 由快照组装推荐请求
pub fn build_request(project_id: &str, snapshot: &ResourceSnapshot) -> OptimizationRequest {
    let disks = snapshot
        .disks
        .iter()
        .map(|d| {
            let zone = last_segment(&d.zone).to_string();
            DiskRequest {
                id: d.id.to_string(),
                disk_size: d.size_gb,
                disk_type: last_segment(&d.disk_type).to_string(),
                region: region_from_zone(&zone),
                zone,
                provisioned_iops: d.provisioned_iops,
            }
        })
        .collect();

    let mut identification = BTreeMap::new();
    identification.insert("project_id".to_string(), project_id.to_string());

    OptimizationRequest {
        request_id: uuid::Uuid::new_v4().to_string(),
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        identification,
        instance: InstanceRequest {
            id: hash_id(&snapshot.id),
            zone: snapshot.zone.clone(),
            machine_type: snapshot.machine_type.clone(),
            preemptible: snapshot.preemptible,
            instance_os_license: snapshot.os_license.clone(),
        },
        disks,
        preferences: preferences::export(&snapshot.preferences),
        metrics: snapshot.metrics.clone(),
        disks_metrics: snapshot.disks_metrics.clone(),
        region: snapshot.region.clone(),
        loading: false,
    }
}

/// 重试预算耗尽：结束 loading 并记录失败原因，让调用方看到明确的失败状态
pub(crate) async fn mark_failed(ctx: &PipelineContext, id: &str, err: &PipelineError) {
    if matches!(err, PipelineError::Cancelled) {
        return;
    }
    let failure = err.to_string();
    let updated = ctx
        .store
        .update(id, |s| {
            s.loading = false;
            s.telemetry_pending = false;
            s.failure = Some(failure);
        })
        .await;
    if let Some((snapshot, ())) = updated {
        ctx.publish(&snapshot);
    }
}

#[async_trait]
impl Task for OptimizeTask {
    fn properties(&self) -> TaskProperties {
        TaskProperties::new(
            format!("optimize_compute_instance_{}", self.resource_id),
            format!("Optimizing compute instance {}", self.resource_id),
            self.ctx.settings.optimize_max_retry,
        )
    }

    async fn run(&self, token: CancellationToken) -> Result<(), PipelineError> {
        let ctx = &self.ctx;
        let id = self.resource_id.as_str();
        let (snapshot, ()) = ctx
            .store
            .update(id, |s| s.optimize_queued = false)
            .await
            .ok_or_else(|| PipelineError::ResourceNotFound(id.to_string()))?;

        if snapshot.lazy_load_enabled {
            tracing::debug!("Compute instance {} is lazy-loaded, deferring optimization", id);
            ctx.queue.push(TelemetryTask::refresh(Arc::clone(ctx), id));
            return Ok(());
        }

        let request = build_request(&ctx.project_id, &snapshot);
        let timeout = ctx.settings.request_timeout;
        let recommender = &ctx.collaborators.recommender;
        let response = tokio::select! {
            _ = token.cancelled() => return Err(PipelineError::Cancelled),
            result = tokio::time::timeout(timeout, recommender.optimize(request)) => {
                result.map_err(|_| PipelineError::Timeout(timeout))??
            }
        };

        let (snapshot, ()) = ctx
            .store
            .update(id, |s| {
                s.loading = false;
                s.skipped = false;
                s.skip_reason = None;
                s.lazy_load_enabled = false;
                s.failure = None;
                s.recommendation = Some(response);
            })
            .await
            .ok_or_else(|| PipelineError::ResourceNotFound(id.to_string()))?;
        ctx.publish(&snapshot);
        ctx.update_summary().await;

        tracing::info!("Compute instance {} optimized: {}", id, snapshot.status_label());
        Ok(())
    }

    async fn on_exhausted(&self, err: &PipelineError) {
        mark_failed(&self.ctx, &self.resource_id, err).await;
    }
}
