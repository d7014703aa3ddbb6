//! Rightsizer - 云主机规格优化流水线
//!
//! 模块划分：
//! - **cloud**: 云厂商协作方 trait（实例列举、磁盘查询、指标时间序列）与离线清单实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、任务抽象、任务队列、优雅关闭
//! - **observability**: 日志初始化
//! - **pipeline**: 发现 / 指标 / 优化三阶段、状态存储、懒加载闸门、汇总与导出
//! - **recommendation**: 推荐服务抽象与实现（HTTP / Mock）

pub mod cloud;
pub mod config;
pub mod core;
pub mod observability;
pub mod pipeline;
pub mod recommendation;

pub use pipeline::{Pipeline, PipelineEvent};
