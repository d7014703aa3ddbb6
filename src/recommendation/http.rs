//! 推荐服务 HTTP 客户端
//!
//! POST JSON 到配置的 endpoint，带 Bearer token；401 映射为 SessionExpired，
//! 其它非 2xx 带上响应体返回 Recommendation 错误。超时由 OptimizeTask 统一施加。

use async_trait::async_trait;
use reqwest::Client;

use crate::core::PipelineError;
use crate::recommendation::{OptimizationRequest, RecommendationResponse, RecommendationService};

pub struct HttpRecommendationClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpRecommendationClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// 按 HTTP 状态码分类响应
pub(crate) fn check_status(status: u16, body: &str) -> Result<(), PipelineError> {
    match status {
        401 => Err(PipelineError::SessionExpired),
        200..=299 => Ok(()),
        _ => Err(PipelineError::Recommendation(format!(
            "server returned status code {}: {}",
            status, body
        ))),
    }
}

#[async_trait]
impl RecommendationService for HttpRecommendationClient {
    async fn optimize(
        &self,
        request: OptimizationRequest,
    ) -> Result<RecommendationResponse, PipelineError> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PipelineError::Recommendation(format!("[gcp-compute]: {}", e)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Recommendation(format!("[gcp-compute]: {}", e)))?;

        check_status(status, &body)?;

        serde_json::from_str(&body)
            .map_err(|e| PipelineError::Recommendation(format!("invalid response: {}", e)))
    }
}
