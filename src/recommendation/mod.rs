//! 推荐服务层：客户端抽象与实现（HTTP / Mock）

pub mod http;
pub mod mock;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::core::PipelineError;

pub use http::HttpRecommendationClient;
pub use mock::MockRecommender;
pub use types::{
    DiskRequest, DiskRightsizing, DiskSpec, InstanceRequest, InstanceRightsizing, MachineSpec,
    MetricMap, OptimizationRequest, RecommendationResponse, Usage,
};

/// 远端规格推荐服务：输入实例 / 磁盘描述、偏好与指标，返回当前与推荐规格及成本
#[async_trait]
pub trait RecommendationService: Send + Sync {
    async fn optimize(
        &self,
        request: OptimizationRequest,
    ) -> Result<RecommendationResponse, PipelineError>;
}

/// 根据配置选择推荐服务：配置了 endpoint 走 HTTP，否则用 Mock
pub fn create_recommender_from_config(cfg: &AppConfig) -> Arc<dyn RecommendationService> {
    match cfg.recommendation.endpoint.as_deref() {
        Some(endpoint) if !endpoint.is_empty() => {
            tracing::info!("Using recommendation service at {}", endpoint);
            Arc::new(HttpRecommendationClient::new(
                endpoint,
                cfg.recommendation.token.clone(),
            ))
        }
        _ => {
            tracing::warn!("No recommendation endpoint configured, using Mock recommender");
            Arc::new(MockRecommender)
        }
    }
}
