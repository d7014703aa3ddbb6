//! 资源快照：每个计算实例一份，发现时创建，之后由各阶段整体替换

use std::collections::BTreeMap;

use crate::cloud::{last_segment, region_from_zone, DiskDescriptor, InstanceDescriptor};
use crate::pipeline::preferences::{default_preferences, PreferenceItem};
use crate::recommendation::{MetricMap, RecommendationResponse};

/// 实例状态为 TERMINATED 时跳过
pub const TERMINATED_STATUS: &str = "TERMINATED";

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    /// 实例数字 ID 的十进制字符串
    pub id: String,
    pub name: String,
    pub project_id: String,
    /// zone URL 的最后一段
    pub zone: String,
    pub region: String,
    /// machine type URL 的最后一段
    pub machine_type: String,
    pub platform: String,
    pub preemptible: bool,
    pub os_license: Option<String>,
    pub disks: Vec<DiskDescriptor>,

    pub metrics: MetricMap,
    /// 磁盘 ID -> 指标
    pub disks_metrics: BTreeMap<String, MetricMap>,

    pub preferences: Vec<PreferenceItem>,
    pub recommendation: Option<RecommendationResponse>,

    pub loading: bool,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub lazy_load_enabled: bool,
    /// 本轮重试预算耗尽时的错误信息，新一轮开始时清空
    pub failure: Option<String>,

    /// 发现阶段推入的指标任务尚未结束；结束时由它推入优化任务
    pub telemetry_pending: bool,
    /// 已推入、尚未开始读取快照的优化任务
    pub optimize_queued: bool,
}

impl ResourceSnapshot {
    /// 发现阶段创建：loading=true、默认偏好、无指标无推荐
    pub fn discovered(
        instance: &InstanceDescriptor,
        project_id: &str,
        disks: Vec<DiskDescriptor>,
    ) -> Self {
        let zone = last_segment(&instance.zone).to_string();
        Self {
            id: instance.id.to_string(),
            name: instance.name.clone(),
            project_id: project_id.to_string(),
            region: region_from_zone(&zone),
            zone,
            machine_type: last_segment(&instance.machine_type).to_string(),
            platform: instance.cpu_platform.clone(),
            preemptible: instance.preemptible,
            os_license: instance.os_license.clone(),
            disks,
            metrics: MetricMap::new(),
            disks_metrics: BTreeMap::new(),
            preferences: default_preferences(),
            recommendation: None,
            loading: true,
            skipped: false,
            skip_reason: None,
            lazy_load_enabled: false,
            failure: None,
            telemetry_pending: false,
            optimize_queued: false,
        }
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skipped = true;
        self.skip_reason = Some(reason.into());
        self.loading = false;
    }

    /// 列表里展示的状态文字
    pub fn status_label(&self) -> String {
        if self.skipped {
            return format!("skipped - {}", self.skip_reason.as_deref().unwrap_or("N/A"));
        }
        if let Some(failure) = &self.failure {
            return format!("failed - {}", failure);
        }
        if self.lazy_load_enabled && !self.loading {
            return "press enter to load".to_string();
        }
        if self.loading {
            return "loading".to_string();
        }
        match &self.recommendation {
            Some(rec) => {
                let savings = rec.savings();
                let current = rec.current_cost();
                let pct = if current > 0.0 { savings / current * 100.0 } else { 0.0 };
                format!("{} ({:.2}%)", format_price(savings), pct)
            }
            None => String::new(),
        }
    }
}

/// 价格格式：$12.34
pub fn format_price(value: f64) -> String {
    format!("${:.2}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::AttachedDisk;
    use crate::recommendation::{InstanceRightsizing, MachineSpec};

    const PROJECT_URL: &str = "https://www.googleapis.com/compute/v1/projects/p";

    fn instance() -> InstanceDescriptor {
        InstanceDescriptor {
            id: 1234567890123,
            name: "api-1".into(),
            zone: format!("{}/zones/europe-west4-a", PROJECT_URL),
            machine_type: format!(
                "{}/zones/europe-west4-a/machineTypes/n2-standard-4",
                PROJECT_URL
            ),
            cpu_platform: "Intel Cascade Lake".into(),
            status: "RUNNING".into(),
            preemptible: true,
            os_license: None,
            disks: vec![AttachedDisk {
                source: "projects/p/zones/europe-west4-a/disks/api-1".into(),
            }],
        }
    }

    #[test]
    fn test_discovered_fields() {
        let s = ResourceSnapshot::discovered(&instance(), "p", Vec::new());
        assert_eq!(s.id, "1234567890123");
        assert_eq!(s.zone, "europe-west4-a");
        assert_eq!(s.region, "europe-west4");
        assert_eq!(s.machine_type, "n2-standard-4");
        assert!(s.loading && !s.lazy_load_enabled && s.recommendation.is_none());
        assert!(!s.telemetry_pending && !s.optimize_queued);
        assert_eq!(s.status_label(), "loading");
    }

    #[test]
    fn test_status_labels() {
        let mut s = ResourceSnapshot::discovered(&instance(), "p", Vec::new());
        s.lazy_load_enabled = true;
        s.loading = false;
        assert_eq!(s.status_label(), "press enter to load");

        s.failure = Some("timeout".into());
        assert_eq!(s.status_label(), "failed - timeout");

        s.skip("instance is not running");
        assert_eq!(s.status_label(), "skipped - instance is not running");

        let mut s = ResourceSnapshot::discovered(&instance(), "p", Vec::new());
        s.loading = false;
        s.recommendation = Some(RecommendationResponse {
            rightsizing: InstanceRightsizing {
                current: MachineSpec { cost: 200.0, ..MachineSpec::default() },
                recommended: Some(MachineSpec { cost: 150.0, ..MachineSpec::default() }),
                cpu: Default::default(),
                memory: Default::default(),
                description: String::new(),
            },
            volumes_rightsizing: Default::default(),
        });
        assert_eq!(s.status_label(), "$50.00 (25.00%)");
    }
}
