//! 推荐服务请求 / 响应结构（JSON）

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cloud::DataPoint;

/// 指标名 -> 采样序列
pub type MetricMap = BTreeMap<String, Vec<DataPoint>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub request_id: String,
    pub cli_version: String,
    /// 调用方身份（如 project_id）
    pub identification: BTreeMap<String, String>,
    pub instance: InstanceRequest,
    pub disks: Vec<DiskRequest>,
    /// 偏好导出：None 表示「保持当前值」
    pub preferences: BTreeMap<String, Option<String>>,
    pub metrics: MetricMap,
    /// 磁盘 ID -> 指标
    pub disks_metrics: BTreeMap<String, MetricMap>,
    pub region: String,
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRequest {
    pub id: String,
    pub zone: String,
    pub machine_type: String,
    pub preemptible: bool,
    pub instance_os_license: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRequest {
    pub id: String,
    pub disk_size: i64,
    pub disk_type: String,
    pub region: String,
    pub zone: String,
    pub provisioned_iops: Option<i64>,
}

/// 推荐结果：实例与各磁盘的当前 / 推荐规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub rightsizing: InstanceRightsizing,
    /// 磁盘 ID -> 推荐
    #[serde(default)]
    pub volumes_rightsizing: BTreeMap<String, DiskRightsizing>,
}

impl RecommendationResponse {
    /// 当前月成本（实例 + 全部磁盘）
    pub fn current_cost(&self) -> f64 {
        self.rightsizing.current.cost
            + self
                .volumes_rightsizing
                .values()
                .map(|d| d.current.cost)
                .sum::<f64>()
    }

    /// 可节省金额；没有推荐规格的部分按 0 计
    pub fn savings(&self) -> f64 {
        self.rightsizing.savings()
            + self
                .volumes_rightsizing
                .values()
                .map(DiskRightsizing::savings)
                .sum::<f64>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRightsizing {
    pub current: MachineSpec,
    #[serde(default)]
    pub recommended: Option<MachineSpec>,
    #[serde(default)]
    pub cpu: Usage,
    #[serde(default)]
    pub memory: Usage,
    #[serde(default)]
    pub description: String,
}

impl InstanceRightsizing {
    pub fn savings(&self) -> f64 {
        self.recommended
            .as_ref()
            .map(|r| self.current.cost - r.cost)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub machine_type: String,
    pub region: String,
    #[serde(default)]
    pub machine_family: String,
    pub cpu: i64,
    pub memory_mb: i64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRightsizing {
    pub current: DiskSpec,
    #[serde(default)]
    pub recommended: Option<DiskSpec>,
    #[serde(default)]
    pub read_iops: Usage,
    #[serde(default)]
    pub write_iops: Usage,
    #[serde(default)]
    pub read_throughput: Usage,
    #[serde(default)]
    pub write_throughput: Usage,
}

impl DiskRightsizing {
    pub fn savings(&self) -> f64 {
        self.recommended
            .as_ref()
            .map(|r| self.current.cost - r.cost)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub disk_type: String,
    pub region: String,
    pub disk_size: i64,
    #[serde(default)]
    pub read_iops_limit: i64,
    #[serde(default)]
    pub write_iops_limit: i64,
    #[serde(default)]
    pub read_throughput_limit: f64,
    #[serde(default)]
    pub write_throughput_limit: f64,
    pub cost: f64,
}

/// 利用率统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub avg: Option<f64>,
    pub max: Option<f64>,
}
