//! 任务抽象
//!
//! 所有流水线阶段（发现 / 指标 / 优化）实现 Task：properties 给出 ID、描述与重试预算，
//! run 在共享的取消令牌下执行一次；预算耗尽后 TaskQueue 调用 on_exhausted。

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::PipelineError;

/// 任务属性：ID 仅用于日志诊断，不做去重
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProperties {
    pub id: String,
    pub description: String,
    /// 失败后最多重跑次数，0 表示不重试
    pub max_retry: u32,
}

impl TaskProperties {
    pub fn new(id: impl Into<String>, description: impl Into<String>, max_retry: u32) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            max_retry,
        }
    }
}

/// 任务 trait：每次重试都从头调用 run（不是断点续跑）
#[async_trait]
pub trait Task: Send + Sync {
    fn properties(&self) -> TaskProperties;

    async fn run(&self, ctx: CancellationToken) -> Result<(), PipelineError>;

    /// 重试预算耗尽（或被取消）后的终态回调，默认什么也不做
    async fn on_exhausted(&self, _err: &PipelineError) {}
}
