//! 展示项：每次快照变更后发给调用方的 ResourceItem
//!
//! 一行概览 + 设备行（实例 + 每块磁盘），每个设备带当前 / 推荐属性与成本。

use serde::Serialize;

use crate::pipeline::preferences::{PreferenceItem, PreferenceKey, PreferenceService};
use crate::pipeline::snapshot::format_price;
use crate::pipeline::ResourceSnapshot;
use crate::recommendation::{DiskRightsizing, Usage};

pub const INSTANCE_RESOURCE_TYPE: &str = "Compute Instance";
pub const DISK_RESOURCE_TYPE: &str = "Compute Disk";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceItem {
    pub id: String,
    pub name: String,
    pub machine_type: String,
    pub region: String,
    pub platform: String,
    pub status: String,
    pub loading: bool,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub lazy_load_enabled: bool,
    pub failure: Option<String>,
    pub preferences: Vec<PreferenceView>,
    pub description: String,
    pub devices: Vec<DeviceRow>,
}

/// 偏好编辑行：键、展示名、单位与当前值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceView {
    pub key: PreferenceKey,
    /// 有别名时用别名，否则用键名
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    pub service: PreferenceService,
    pub value: Option<String>,
    pub pinned: bool,
    pub pinnable: bool,
}

impl From<&PreferenceItem> for PreferenceView {
    fn from(item: &PreferenceItem) -> Self {
        let key = item.key;
        Self {
            key,
            label: key.alias().unwrap_or_else(|| key.as_str()),
            unit: key.unit(),
            service: key.service(),
            value: item.value.clone(),
            pinned: item.pinned,
            pinnable: key.pinnable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRow {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    pub project_id: String,
    pub current_cost: String,
    pub right_sized_cost: Option<String>,
    pub savings: Option<String>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub key: String,
    pub current: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

impl Property {
    fn new(key: &str, current: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            current: current.into(),
            recommended: None,
            average: None,
            max: None,
        }
    }

    /// 分组标题行
    fn heading(key: &str) -> Self {
        Self::new(key, "")
    }

    fn usage(mut self, usage: &Usage, fmt: fn(f64) -> String) -> Self {
        self.average = usage.avg.map(fmt);
        self.max = usage.max.map(fmt);
        self
    }
}

fn percentage(v: f64) -> String {
    format!("{:.2}%", v)
}

fn plain(v: f64) -> String {
    format!("{:.2}", v)
}

fn megabits(v: f64) -> String {
    format!("{:.2} Mb", v)
}

impl From<&ResourceSnapshot> for ResourceItem {
    fn from(s: &ResourceSnapshot) -> Self {
        let mut devices = vec![instance_device(s)];
        devices.extend(disk_devices(s));
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            machine_type: s.machine_type.clone(),
            region: s.region.clone(),
            platform: s.platform.clone(),
            status: s.status_label(),
            loading: s.loading,
            skipped: s.skipped,
            skip_reason: s.skip_reason.clone(),
            lazy_load_enabled: s.lazy_load_enabled,
            failure: s.failure.clone(),
            preferences: s.preferences.iter().map(PreferenceView::from).collect(),
            description: s
                .recommendation
                .as_ref()
                .map(|r| r.rightsizing.description.clone())
                .unwrap_or_default(),
            devices,
        }
    }
}

fn instance_device(s: &ResourceSnapshot) -> DeviceRow {
    let Some(rec) = &s.recommendation else {
        return DeviceRow {
            id: s.id.clone(),
            name: s.name.clone(),
            resource_type: INSTANCE_RESOURCE_TYPE.to_string(),
            project_id: s.project_id.clone(),
            current_cost: format_price(0.0),
            right_sized_cost: None,
            savings: None,
            properties: vec![
                Property::new("Region", s.region.clone()),
                Property::new("Machine Type", s.machine_type.clone()),
            ],
        };
    };

    let r = &rec.rightsizing;
    let mut region = Property::new("Region", r.current.region.clone());
    let mut machine_type = Property::new("Machine Type", r.current.machine_type.clone());
    let family = Property::new("Machine Family", r.current.machine_family.clone());
    let mut cpu = Property::new("  CPU", r.current.cpu.to_string()).usage(&r.cpu, percentage);
    let mut memory = Property::new("  MemoryMB", format!("{} MB", r.current.memory_mb))
        .usage(&r.memory, percentage);

    let (mut right_sized_cost, mut savings) = (None, None);
    if let Some(recommended) = &r.recommended {
        right_sized_cost = Some(format_price(recommended.cost));
        savings = Some(format_price(r.current.cost - recommended.cost));
        region.recommended = Some(recommended.region.clone());
        machine_type.recommended = Some(recommended.machine_type.clone());
        cpu.recommended = Some(recommended.cpu.to_string());
        memory.recommended = Some(format!("{} MB", recommended.memory_mb));
    }

    DeviceRow {
        id: s.id.clone(),
        name: s.name.clone(),
        resource_type: INSTANCE_RESOURCE_TYPE.to_string(),
        project_id: s.project_id.clone(),
        current_cost: format_price(r.current.cost),
        right_sized_cost,
        savings,
        properties: vec![
            region,
            machine_type,
            family,
            Property::heading("Compute"),
            cpu,
            memory,
        ],
    }
}

fn disk_devices(s: &ResourceSnapshot) -> Vec<DeviceRow> {
    s.disks
        .iter()
        .map(|disk| {
            let id = disk.id.to_string();
            let rightsizing = s
                .recommendation
                .as_ref()
                .and_then(|r| r.volumes_rightsizing.get(&id));
            match rightsizing {
                Some(d) => disk_row(s, &id, &disk.name, d),
                None => DeviceRow {
                    id,
                    name: disk.name.clone(),
                    resource_type: DISK_RESOURCE_TYPE.to_string(),
                    project_id: s.project_id.clone(),
                    current_cost: format_price(0.0),
                    right_sized_cost: None,
                    savings: None,
                    properties: vec![
                        Property::new("Disk Type", crate::cloud::last_segment(&disk.disk_type)),
                        Property::new("Disk Size", format!("{} GB", disk.size_gb)),
                    ],
                },
            }
        })
        .collect()
}

fn disk_row(s: &ResourceSnapshot, id: &str, name: &str, d: &DiskRightsizing) -> DeviceRow {
    let mut region = Property::new("Region", d.current.region.clone());
    let mut disk_type = Property::new("Disk Type", d.current.disk_type.clone());
    let mut disk_size = Property::new("Disk Size", format!("{} GB", d.current.disk_size));
    let mut read_iops =
        Property::new("  Read IOPS Expectation", d.current.read_iops_limit.to_string())
            .usage(&d.read_iops, plain);
    let mut write_iops =
        Property::new("  Write IOPS Expectation", d.current.write_iops_limit.to_string())
            .usage(&d.write_iops, plain);
    let mut read_throughput = Property::new(
        "  Read Throughput Expectation",
        megabits(d.current.read_throughput_limit),
    )
    .usage(&d.read_throughput, megabits);
    let mut write_throughput = Property::new(
        "  Write Throughput Expectation",
        megabits(d.current.write_throughput_limit),
    )
    .usage(&d.write_throughput, megabits);

    let (mut right_sized_cost, mut savings) = (None, None);
    if let Some(rec) = &d.recommended {
        right_sized_cost = Some(format_price(rec.cost));
        savings = Some(format_price(d.current.cost - rec.cost));
        region.recommended = Some(rec.region.clone());
        disk_type.recommended = Some(rec.disk_type.clone());
        disk_size.recommended = Some(format!("{} GB", rec.disk_size));
        read_iops.recommended = Some(rec.read_iops_limit.to_string());
        write_iops.recommended = Some(rec.write_iops_limit.to_string());
        read_throughput.recommended = Some(megabits(rec.read_throughput_limit));
        write_throughput.recommended = Some(megabits(rec.write_throughput_limit));
    }

    DeviceRow {
        id: id.to_string(),
        name: name.to_string(),
        resource_type: DISK_RESOURCE_TYPE.to_string(),
        project_id: s.project_id.clone(),
        current_cost: format_price(d.current.cost),
        right_sized_cost,
        savings,
        properties: vec![
            region,
            disk_type,
            disk_size,
            Property::heading("IOPS"),
            read_iops,
            write_iops,
            Property::heading("Throughput"),
            read_throughput,
            write_throughput,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{DiskDescriptor, InstanceDescriptor};
    use crate::recommendation::{
        DiskSpec, InstanceRightsizing, MachineSpec, RecommendationResponse,
    };

    fn snapshot() -> ResourceSnapshot {
        let instance = InstanceDescriptor {
            id: 9,
            name: "db-1".into(),
            zone: "zones/us-west1-b".into(),
            machine_type: "machineTypes/n2-highmem-8".into(),
            cpu_platform: "AMD Milan".into(),
            status: "RUNNING".into(),
            preemptible: false,
            os_license: None,
            disks: Vec::new(),
        };
        let disk = DiskDescriptor {
            id: 90,
            name: "db-1-data".into(),
            zone: "zones/us-west1-b".into(),
            disk_type: "diskTypes/pd-ssd".into(),
            size_gb: 500,
            provisioned_iops: None,
        };
        ResourceSnapshot::discovered(&instance, "p", vec![disk])
    }

    #[test]
    fn test_item_without_recommendation() {
        let item = ResourceItem::from(&snapshot());
        assert_eq!(item.status, "loading");
        assert_eq!(item.devices.len(), 2);
        assert_eq!(item.devices[0].resource_type, INSTANCE_RESOURCE_TYPE);
        assert_eq!(item.devices[1].properties[0].current, "pd-ssd");
        assert!(item.devices.iter().all(|d| d.savings.is_none()));
    }

    #[test]
    fn test_item_with_recommendation() {
        let mut s = snapshot();
        s.loading = false;
        let mut volumes = std::collections::BTreeMap::new();
        volumes.insert(
            "90".to_string(),
            DiskRightsizing {
                current: DiskSpec {
                    disk_type: "pd-ssd".into(),
                    disk_size: 500,
                    cost: 85.0,
                    ..DiskSpec::default()
                },
                recommended: Some(DiskSpec {
                    disk_type: "pd-balanced".into(),
                    disk_size: 500,
                    cost: 50.0,
                    ..DiskSpec::default()
                }),
                read_iops: Usage {
                    avg: Some(120.0),
                    max: Some(900.0),
                },
                write_iops: Usage::default(),
                read_throughput: Usage::default(),
                write_throughput: Usage::default(),
            },
        );
        s.recommendation = Some(RecommendationResponse {
            rightsizing: InstanceRightsizing {
                current: MachineSpec {
                    machine_type: "n2-highmem-8".into(),
                    cpu: 8,
                    memory_mb: 65536,
                    cost: 300.0,
                    ..MachineSpec::default()
                },
                recommended: Some(MachineSpec {
                    machine_type: "n2-highmem-4".into(),
                    cpu: 4,
                    memory_mb: 32768,
                    cost: 150.0,
                    ..MachineSpec::default()
                }),
                cpu: Usage {
                    avg: Some(12.5),
                    max: Some(40.0),
                },
                memory: Usage::default(),
                description: "over-provisioned".into(),
            },
            volumes_rightsizing: volumes,
        });

        let item = ResourceItem::from(&s);
        assert_eq!(item.description, "over-provisioned");
        assert_eq!(item.devices[0].savings.as_deref(), Some("$150.00"));
        let cpu = &item.devices[0].properties[4];
        assert_eq!(cpu.average.as_deref(), Some("12.50%"));
        assert_eq!(cpu.recommended.as_deref(), Some("4"));
        assert_eq!(item.devices[1].right_sized_cost.as_deref(), Some("$50.00"));
        assert_eq!(item.devices[1].properties[4].max.as_deref(), Some("900.00"));
    }

    #[test]
    fn test_item_preferences_carry_unit_and_alias() {
        let item = ResourceItem::from(&snapshot());
        assert_eq!(item.preferences.len(), PreferenceKey::ALL.len());

        let find = |key| item.preferences.iter().find(|p| p.key == key).unwrap();
        let memory = find(PreferenceKey::MemoryGb);
        assert_eq!(memory.label, "Memory");
        assert_eq!(memory.unit, Some("GiB"));

        let breathing = find(PreferenceKey::CpuBreathingRoom);
        assert_eq!(breathing.label, "CPUBreathingRoom");
        assert_eq!(breathing.unit, Some("%"));
        assert_eq!(breathing.value.as_deref(), Some("10"));
        assert!(!breathing.pinnable);

        let region = find(PreferenceKey::Region);
        assert!(region.pinned && region.pinnable);
        assert_eq!(region.unit, None);
        assert_eq!(find(PreferenceKey::DiskType).service, PreferenceService::ComputeDisk);

        let json = serde_json::to_value(memory).unwrap();
        assert_eq!(json["key"], "MemoryGB");
        assert_eq!(json["unit"], "GiB");
        assert!(serde_json::to_value(region).unwrap().get("unit").is_none());
    }
}
