//! 表格导出：表头一行，之后每个实例一行、每块磁盘一行

use crate::cloud::last_segment;
use crate::pipeline::snapshot::format_price;
use crate::pipeline::view::{DISK_RESOURCE_TYPE, INSTANCE_RESOURCE_TYPE};
use crate::pipeline::ResourceSnapshot;

pub const EXPORT_HEADERS: [&str; 15] = [
    "Project ID",
    "Region",
    "Resource Type",
    "Resource ID",
    "Resource Name",
    "Platform",
    "Device Runtime (Hrs)",
    "Current Cost",
    "Recommendation Cost",
    "Net Savings",
    "Current Spec",
    "Suggested Spec",
    "Parent Device",
    "Justification",
    "Additional Details",
];

/// 按月计费的设备运行时长
const DEVICE_RUNTIME: &str = "730 Hrs";

pub fn export_rows<'a>(
    snapshots: impl IntoIterator<Item = &'a ResourceSnapshot>,
) -> Vec<Vec<String>> {
    let mut rows = vec![EXPORT_HEADERS.iter().map(|h| h.to_string()).collect()];
    for s in snapshots {
        rows.push(instance_row(s));
        rows.extend(disk_rows(s));
    }
    rows
}

fn instance_row(s: &ResourceSnapshot) -> Vec<String> {
    let rightsizing = s.recommendation.as_ref().map(|r| &r.rightsizing);
    let current_cost = rightsizing.map(|r| r.current.cost).unwrap_or(0.0);
    let current_spec = rightsizing
        .map(|r| r.current.machine_type.clone())
        .unwrap_or_else(|| s.machine_type.clone());
    let description = rightsizing.map(|r| r.description.clone()).unwrap_or_default();

    let mut details = Vec::new();
    let (mut rec_cost, mut saving, mut rec_spec) = (String::new(), String::new(), String::new());
    if let Some((r, rec)) = rightsizing.and_then(|r| r.recommended.as_ref().map(|rec| (r, rec))) {
        rec_cost = format_price(rec.cost);
        saving = format_price(r.current.cost - rec.cost);
        rec_spec = rec.machine_type.clone();
        details.push(format!(
            "Machine Type:: Current: {} - Recommended: {}",
            r.current.machine_type, rec.machine_type
        ));
        details.push(format!(
            "Region:: Current: {} - Recommended: {}",
            r.current.region, rec.region
        ));
        details.push(format!("CPU:: Current: {} - Recommended: {}", r.current.cpu, rec.cpu));
        details.push(format!(
            "Memory:: Current: {} - Recommended: {}",
            r.current.memory_mb, rec.memory_mb
        ));
    }

    vec![
        s.project_id.clone(),
        s.region.clone(),
        INSTANCE_RESOURCE_TYPE.to_string(),
        s.id.clone(),
        s.name.clone(),
        s.platform.clone(),
        DEVICE_RUNTIME.to_string(),
        format_price(current_cost),
        rec_cost,
        saving,
        current_spec,
        rec_spec,
        "None".to_string(),
        description,
        details.join("---"),
    ]
}

fn disk_rows(s: &ResourceSnapshot) -> Vec<Vec<String>> {
    let description = s
        .recommendation
        .as_ref()
        .map(|r| r.rightsizing.description.clone())
        .unwrap_or_default();

    s.disks
        .iter()
        .map(|disk| {
            let id = disk.id.to_string();
            let rightsizing = s
                .recommendation
                .as_ref()
                .and_then(|r| r.volumes_rightsizing.get(&id));

            let (current_cost, current_spec) = match rightsizing {
                Some(d) => (
                    d.current.cost,
                    format!("{} / {} GB", d.current.disk_type, d.current.disk_size),
                ),
                None => (
                    0.0,
                    format!("{} / {} GB", last_segment(&disk.disk_type), disk.size_gb),
                ),
            };

            let mut details = Vec::new();
            let (mut rec_cost, mut saving, mut rec_spec) =
                (String::new(), String::new(), String::new());
            let recommended =
                rightsizing.and_then(|d| d.recommended.as_ref().map(|rec| (d, rec)));
            if let Some((d, rec)) = recommended {
                rec_cost = format_price(rec.cost);
                saving = format_price(d.current.cost - rec.cost);
                rec_spec = format!("{} / {} GB", rec.disk_type, rec.disk_size);
                details.push(format!(
                    "Region:: Current: {} - Recommended: {}",
                    d.current.region, rec.region
                ));
                details.push(format!(
                    "ReadIopsExpectation:: Current: {} - Recommended: {}",
                    d.current.read_iops_limit, rec.read_iops_limit
                ));
                details.push(format!(
                    "WriteIopsExpectation:: Current: {} - Recommended: {}",
                    d.current.write_iops_limit, rec.write_iops_limit
                ));
                details.push(format!(
                    "ReadThroughputExpectation:: Current: {:.2} - Recommended: {:.2}",
                    d.current.read_throughput_limit, rec.read_throughput_limit
                ));
                details.push(format!(
                    "WriteThroughputExpectation:: Current: {:.2} - Recommended: {:.2}",
                    d.current.write_throughput_limit, rec.write_throughput_limit
                ));
            }

            vec![
                s.project_id.clone(),
                s.region.clone(),
                DISK_RESOURCE_TYPE.to_string(),
                id,
                disk.name.clone(),
                "N/A".to_string(),
                DEVICE_RUNTIME.to_string(),
                format_price(current_cost),
                rec_cost,
                saving,
                current_spec,
                rec_spec,
                "None".to_string(),
                description.clone(),
                details.join("---"),
            ]
        })
        .collect()
}
