//! 发现任务：列举项目下的计算实例，逐个建快照、登记、发布并推入指标任务

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cloud::last_segment;
use crate::core::{PipelineError, Task, TaskProperties};
use crate::pipeline::snapshot::TERMINATED_STATUS;
use crate::pipeline::telemetry::TelemetryTask;
use crate::pipeline::{PipelineContext, ResourceSnapshot};

pub const DISCOVERY_TASK_ID: &str = "list_compute_instances";

pub struct DiscoveryTask {
    ctx: Arc<PipelineContext>,
}

impl DiscoveryTask {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Task for DiscoveryTask {
    fn properties(&self) -> TaskProperties {
        TaskProperties::new(DISCOVERY_TASK_ID, "Listing all available compute instances", 0)
    }

    async fn run(&self, token: CancellationToken) -> Result<(), PipelineError> {
        let ctx = &self.ctx;
        let instances = ctx.collaborators.lister.list_all(&ctx.project_id).await?;
        tracing::info!(
            "Discovered {} compute instances in project {}",
            instances.len(),
            ctx.project_id
        );

        for instance in instances {
            if token.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            // 任何一块磁盘查不到都中止本轮发现，不登记半成品
            let zone = last_segment(&instance.zone);
            let mut disks = Vec::with_capacity(instance.disks.len());
            for attached in &instance.disks {
                let disk = ctx
                    .collaborators
                    .disks
                    .get_disk(zone, last_segment(&attached.source))
                    .await?;
                disks.push(disk);
            }

            let mut snapshot = ResourceSnapshot::discovered(&instance, &ctx.project_id, disks);

            if instance.status == TERMINATED_STATUS {
                snapshot.skip("instance is not running");
                tracing::info!("Skipping compute instance {}: not running", snapshot.id);
                ctx.store.set(snapshot.id.clone(), snapshot.clone()).await;
                ctx.publish(&snapshot);
                continue;
            }

            snapshot.lazy_load_enabled = ctx.gate.admit();
            snapshot.telemetry_pending = true;
            let id = snapshot.id.clone();
            ctx.store.set(id.clone(), snapshot.clone()).await;
            ctx.publish(&snapshot);
            ctx.queue.push(TelemetryTask::chained(Arc::clone(ctx), id));
        }

        let admitted = ctx.gate.admitted();
        tracing::info!(
            "{} compute instances queued for metrics, {} optimized eagerly",
            admitted,
            admitted.min(ctx.settings.lazy_load_threshold)
        );
        Ok(())
    }
}
