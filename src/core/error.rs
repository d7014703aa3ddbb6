//! 流水线错误类型
//!
//! 与 TaskQueue 的重试策略配合：is_retryable 决定失败后是否还值得按预算重跑。

use std::time::Duration;

use thiserror::Error;

/// 流水线运行过程中可能出现的错误（云 API、指标、推荐服务、会话、偏好校验等）
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Cloud API error: {0}")]
    Cloud(String),

    #[error("Metric query failed: {0}")]
    Metrics(String),

    #[error("Recommendation request failed: {0}")]
    Recommendation(String),

    #[error("Recommendation request timed out after {0:?}")]
    Timeout(Duration),

    /// 推荐服务返回 401：需要重新登录，而不是简单重试
    #[error("your session is expired, please login")]
    SessionExpired,

    #[error("Invalid preference: {0}")]
    InvalidPreference(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    /// 是否值得在重试预算内重跑（会话过期、取消、资源缺失、偏好错误与 panic 重跑也不会成功）
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::SessionExpired
                | PipelineError::Cancelled
                | PipelineError::ResourceNotFound(_)
                | PipelineError::InvalidPreference(_)
                | PipelineError::ConfigError(_)
                | PipelineError::Panicked(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_failures_are_retryable() {
        assert!(PipelineError::Recommendation("503".into()).is_retryable());
        assert!(PipelineError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(PipelineError::Metrics("quota".into()).is_retryable());
    }

    #[test]
    fn test_session_and_cancel_not_retryable() {
        assert!(!PipelineError::SessionExpired.is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
        assert!(!PipelineError::ResourceNotFound("1".into()).is_retryable());
        assert!(!PipelineError::Panicked("boom".into()).is_retryable());
    }

    #[test]
    fn test_session_expired_message() {
        assert_eq!(
            PipelineError::SessionExpired.to_string(),
            "your session is expired, please login"
        );
    }
}
