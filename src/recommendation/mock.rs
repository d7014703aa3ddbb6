//! Mock 推荐服务（未配置 endpoint 时使用，无需网络）
//!
//! 原样回显当前规格：成本为 0、没有推荐规格，便于本地跑通整条流水线。

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::recommendation::{
    DiskRightsizing, DiskSpec, InstanceRightsizing, MachineSpec, OptimizationRequest,
    RecommendationResponse, RecommendationService,
};

#[derive(Debug, Default)]
pub struct MockRecommender;

#[async_trait]
impl RecommendationService for MockRecommender {
    async fn optimize(
        &self,
        request: OptimizationRequest,
    ) -> Result<RecommendationResponse, PipelineError> {
        let volumes_rightsizing = request
            .disks
            .iter()
            .map(|d| {
                let current = DiskSpec {
                    disk_type: d.disk_type.clone(),
                    region: d.region.clone(),
                    disk_size: d.disk_size,
                    ..DiskSpec::default()
                };
                let rightsizing = DiskRightsizing {
                    current,
                    recommended: None,
                    read_iops: Default::default(),
                    write_iops: Default::default(),
                    read_throughput: Default::default(),
                    write_throughput: Default::default(),
                };
                (d.id.clone(), rightsizing)
            })
            .collect();

        Ok(RecommendationResponse {
            rightsizing: InstanceRightsizing {
                current: MachineSpec {
                    machine_type: request.instance.machine_type.clone(),
                    region: request.region.clone(),
                    ..MachineSpec::default()
                },
                recommended: None,
                cpu: Default::default(),
                memory: Default::default(),
                description: "Mock recommender: no recommendation service configured".to_string(),
            },
            volumes_rightsizing,
        })
    }
}
