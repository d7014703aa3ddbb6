//! 流水线事件：快照变更、汇总更新、就绪状态
//!
//! 通过无界 mpsc 发出，接收方决定如何投递（stdout JSON、UI 等）。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::pipeline::summary::ResultSummary;
use crate::pipeline::view::ResourceItem;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// 某个资源的快照发生了变化
    Item(ResourceItem),
    Summary(ResultSummary),
    /// false：开始处理；true：队列已清空
    Ready(bool),
}

/// 事件发送端；接收方已关闭时静默丢弃
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl EventPublisher {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }

    pub fn publish(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event receiver dropped, discarding event");
        }
    }
}
