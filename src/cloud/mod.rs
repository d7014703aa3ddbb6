//! 云厂商协作方：资源列举、磁盘查询、指标时间序列
//!
//! 流水线只依赖这里的三个 trait；具体实现可以是真实的云 API 客户端，
//! 也可以是 InventoryCloud（从 JSON 清单文件离线读取）。

pub mod inventory;
pub mod naming;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::PipelineError;

pub use inventory::{Inventory, InventoryCloud};
pub use naming::{last_segment, region_from_zone};

/// 云厂商返回的计算实例（字段保持厂商原始格式，如 zone / machine_type 为完整 URL）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub id: u64,
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    #[serde(default)]
    pub cpu_platform: String,
    /// RUNNING / TERMINATED 等
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub preemptible: bool,
    #[serde(default)]
    pub os_license: Option<String>,
    #[serde(default)]
    pub disks: Vec<AttachedDisk>,
}

/// 实例上挂载的磁盘引用，source 为磁盘完整 URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedDisk {
    pub source: String,
}

/// 磁盘详情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskDescriptor {
    pub id: u64,
    pub name: String,
    pub zone: String,
    /// 磁盘类型 URL，如 .../diskTypes/pd-balanced
    pub disk_type: String,
    pub size_gb: i64,
    #[serde(default)]
    pub provisioned_iops: Option<i64>,
}

/// 单个采样点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub value: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// 查询时间窗口 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// 以当前时间为终点、向前 hours 小时
    pub fn trailing_hours(hours: u32) -> Self {
        let end = Utc::now();
        Self {
            start: end - chrono::Duration::hours(i64::from(hours)),
            end,
        }
    }

    /// 按对齐周期切分后的采样点数
    pub fn expected_samples(&self, alignment: Duration) -> usize {
        let span = (self.end - self.start).num_seconds().max(0) as u64;
        let step = alignment.as_secs().max(1);
        (span / step) as usize
    }
}

/// 时间序列过滤条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFilter {
    /// 指标全名，如 compute.googleapis.com/instance/cpu/utilization
    pub metric_type: String,
    pub instance_id: String,
    /// 磁盘指标按设备名过滤
    pub device_name: Option<String>,
}

impl MetricFilter {
    pub fn instance(metric_type: &str, instance_id: &str) -> Self {
        Self {
            metric_type: metric_type.to_string(),
            instance_id: instance_id.to_string(),
            device_name: None,
        }
    }

    pub fn device(metric_type: &str, instance_id: &str, device_name: &str) -> Self {
        Self {
            device_name: Some(device_name.to_string()),
            ..Self::instance(metric_type, instance_id)
        }
    }
}

/// 渲染为 Cloud Monitoring 的过滤表达式
impl fmt::Display for MetricFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"metric.type="{}" AND resource.labels.instance_id="{}""#,
            self.metric_type, self.instance_id
        )?;
        if let Some(device) = &self.device_name {
            write!(f, r#" AND metric.labels.device_name="{}""#, device)?;
        }
        Ok(())
    }
}

/// 列举项目下的全部计算实例
#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn list_all(&self, project_id: &str) -> Result<Vec<InstanceDescriptor>, PipelineError>;
}

/// 按 zone + 名称查询磁盘详情
#[async_trait]
pub trait SubResourceLookup: Send + Sync {
    async fn get_disk(&self, zone: &str, name: &str) -> Result<DiskDescriptor, PipelineError>;
}

/// 拉取一条按 alignment 对齐的时间序列
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn get_series(
        &self,
        filter: &MetricFilter,
        window: &TimeWindow,
        alignment: Duration,
    ) -> Result<Vec<DataPoint>, PipelineError>;
}
