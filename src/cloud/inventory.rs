//! 清单文件云：从 JSON 清单读取实例与磁盘，按固定利用率生成指标
//!
//! 用于离线运行与测试；指标按 alignment 切分整个窗口，每个点取清单里该指标的固定值（缺省 0）。

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cloud::{
    last_segment, DataPoint, DiskDescriptor, InstanceDescriptor, MetricFilter, MetricSource,
    ResourceLister, SubResourceLookup, TimeWindow,
};
use crate::core::PipelineError;

/// 清单文件内容
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub project_id: String,
    #[serde(default)]
    pub instances: Vec<InstanceDescriptor>,
    #[serde(default)]
    pub disks: Vec<DiskDescriptor>,
    /// 指标全名 -> 固定采样值
    #[serde(default)]
    pub utilization: HashMap<String, f64>,
}

/// 基于清单的云实现（同时实现列举、磁盘查询与指标三个 trait）
#[derive(Debug, Clone)]
pub struct InventoryCloud {
    inventory: Inventory,
}

impl InventoryCloud {
    pub fn from_inventory(inventory: Inventory) -> Self {
        Self { inventory }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read inventory {}: {}", path.display(), e))
        })?;
        let inventory: Inventory = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::ConfigError(format!("invalid inventory {}: {}", path.display(), e))
        })?;
        tracing::info!(
            "Loaded inventory for project {} ({} instances, {} disks)",
            inventory.project_id,
            inventory.instances.len(),
            inventory.disks.len()
        );
        Ok(Self { inventory })
    }

    pub fn project_id(&self) -> &str {
        &self.inventory.project_id
    }
}

#[async_trait]
impl ResourceLister for InventoryCloud {
    async fn list_all(&self, project_id: &str) -> Result<Vec<InstanceDescriptor>, PipelineError> {
        if project_id != self.inventory.project_id {
            return Err(PipelineError::Cloud(format!(
                "project {} is not in this inventory",
                project_id
            )));
        }
        Ok(self.inventory.instances.clone())
    }
}

#[async_trait]
impl SubResourceLookup for InventoryCloud {
    async fn get_disk(&self, zone: &str, name: &str) -> Result<DiskDescriptor, PipelineError> {
        self.inventory
            .disks
            .iter()
            .find(|d| d.name == name && last_segment(&d.zone) == zone)
            .cloned()
            .ok_or_else(|| {
                PipelineError::Cloud(format!("disk {} not found in zone {}", name, zone))
            })
    }
}

#[async_trait]
impl MetricSource for InventoryCloud {
    async fn get_series(
        &self,
        filter: &MetricFilter,
        window: &TimeWindow,
        alignment: Duration,
    ) -> Result<Vec<DataPoint>, PipelineError> {
        let known = self
            .inventory
            .instances
            .iter()
            .any(|i| i.id.to_string() == filter.instance_id);
        if !known {
            return Err(PipelineError::Metrics(format!(
                "no time series for instance {}",
                filter.instance_id
            )));
        }

        let value = self
            .inventory
            .utilization
            .get(&filter.metric_type)
            .copied()
            .unwrap_or(0.0);
        let step = chrono::Duration::seconds(alignment.as_secs().max(1) as i64);
        let points = (0..window.expected_samples(alignment))
            .map(|i| {
                let start_time = window.start + step * i as i32;
                DataPoint {
                    value,
                    start_time,
                    end_time: start_time + step,
                }
            })
            .collect();
        Ok(points)
    }
}
