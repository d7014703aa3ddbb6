//! 用户偏好：类型化的键、默认值、校验与导出
//!
//! 偏好随请求一起发给推荐服务。导出规则：pinned 的键导出为 None（保持当前值），
//! 设置了值的导出为 Some(value)，既没 pin 也没值的不导出。

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::PipelineError;

/// 偏好所属服务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferenceService {
    ComputeInstance,
    ComputeDisk,
}

/// 偏好值的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Choice(&'static [&'static str]),
    Text,
}

const YES_NO: &[&str] = &["No", "Yes"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PreferenceKey {
    #[serde(rename = "vCPU")]
    VCpu,
    Region,
    ExcludeCustomInstances,
    MachineFamily,
    #[serde(rename = "MemoryGB")]
    MemoryGb,
    #[serde(rename = "CPUBreathingRoom")]
    CpuBreathingRoom,
    MemoryBreathingRoom,
    ExcludeUpsizingFeature,
    DiskType,
    DiskSizeGb,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 10] = [
        PreferenceKey::VCpu,
        PreferenceKey::Region,
        PreferenceKey::ExcludeCustomInstances,
        PreferenceKey::MachineFamily,
        PreferenceKey::MemoryGb,
        PreferenceKey::CpuBreathingRoom,
        PreferenceKey::MemoryBreathingRoom,
        PreferenceKey::ExcludeUpsizingFeature,
        PreferenceKey::DiskType,
        PreferenceKey::DiskSizeGb,
    ];

    /// 发给推荐服务时使用的名字
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceKey::VCpu => "vCPU",
            PreferenceKey::Region => "Region",
            PreferenceKey::ExcludeCustomInstances => "ExcludeCustomInstances",
            PreferenceKey::MachineFamily => "MachineFamily",
            PreferenceKey::MemoryGb => "MemoryGB",
            PreferenceKey::CpuBreathingRoom => "CPUBreathingRoom",
            PreferenceKey::MemoryBreathingRoom => "MemoryBreathingRoom",
            PreferenceKey::ExcludeUpsizingFeature => "ExcludeUpsizingFeature",
            PreferenceKey::DiskType => "DiskType",
            PreferenceKey::DiskSizeGb => "DiskSizeGb",
        }
    }

    pub fn service(&self) -> PreferenceService {
        match self {
            PreferenceKey::DiskType | PreferenceKey::DiskSizeGb => PreferenceService::ComputeDisk,
            _ => PreferenceService::ComputeInstance,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            PreferenceKey::VCpu
            | PreferenceKey::MemoryGb
            | PreferenceKey::CpuBreathingRoom
            | PreferenceKey::MemoryBreathingRoom
            | PreferenceKey::DiskSizeGb => ValueKind::Number,
            PreferenceKey::ExcludeCustomInstances | PreferenceKey::ExcludeUpsizingFeature => {
                ValueKind::Choice(YES_NO)
            }
            PreferenceKey::Region | PreferenceKey::MachineFamily | PreferenceKey::DiskType => {
                ValueKind::Text
            }
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            PreferenceKey::MemoryGb | PreferenceKey::DiskSizeGb => Some("GiB"),
            PreferenceKey::CpuBreathingRoom | PreferenceKey::MemoryBreathingRoom => Some("%"),
            _ => None,
        }
    }

    pub fn alias(&self) -> Option<&'static str> {
        match self {
            PreferenceKey::MemoryGb => Some("Memory"),
            _ => None,
        }
    }

    /// 是否允许 pin（保持当前值）
    pub fn pinnable(&self) -> bool {
        !matches!(
            self,
            PreferenceKey::ExcludeCustomInstances
                | PreferenceKey::CpuBreathingRoom
                | PreferenceKey::MemoryBreathingRoom
                | PreferenceKey::ExcludeUpsizingFeature
        )
    }

    fn is_percentage(&self) -> bool {
        matches!(
            self,
            PreferenceKey::CpuBreathingRoom | PreferenceKey::MemoryBreathingRoom
        )
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条偏好
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceItem {
    pub key: PreferenceKey,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub pinned: bool,
}

impl PreferenceItem {
    pub fn unset(key: PreferenceKey) -> Self {
        Self {
            key,
            value: None,
            pinned: false,
        }
    }

    pub fn with_value(key: PreferenceKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: Some(value.into()),
            pinned: false,
        }
    }

    pub fn pinned(key: PreferenceKey) -> Self {
        Self {
            key,
            value: None,
            pinned: true,
        }
    }

    /// 空字符串视同未设置
    fn effective_value(&self) -> Option<&str> {
        self.value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

/// 新发现资源的默认偏好
pub fn default_preferences() -> Vec<PreferenceItem> {
    vec![
        PreferenceItem::unset(PreferenceKey::VCpu),
        PreferenceItem::pinned(PreferenceKey::Region),
        PreferenceItem::with_value(PreferenceKey::ExcludeCustomInstances, "No"),
        PreferenceItem::unset(PreferenceKey::MachineFamily),
        PreferenceItem::unset(PreferenceKey::MemoryGb),
        PreferenceItem::with_value(PreferenceKey::CpuBreathingRoom, "10"),
        PreferenceItem::with_value(PreferenceKey::MemoryBreathingRoom, "10"),
        PreferenceItem::with_value(PreferenceKey::ExcludeUpsizingFeature, "Yes"),
        PreferenceItem::unset(PreferenceKey::DiskType),
        PreferenceItem::unset(PreferenceKey::DiskSizeGb),
    ]
}

/// 校验外部传入的偏好列表
pub fn validate(items: &[PreferenceItem]) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for item in items {
        let key = item.key;
        if !seen.insert(key) {
            return Err(PipelineError::InvalidPreference(format!(
                "{} is given more than once",
                key
            )));
        }
        if item.pinned && !key.pinnable() {
            return Err(PipelineError::InvalidPreference(format!(
                "{} cannot be pinned",
                key
            )));
        }
        let Some(value) = item.effective_value() else {
            continue;
        };
        match key.kind() {
            ValueKind::Number => {
                let number: f64 = value.parse().map_err(|_| {
                    PipelineError::InvalidPreference(format!(
                        "{} must be a number, got {}",
                        key, value
                    ))
                })?;
                if !number.is_finite() || number < 0.0 {
                    return Err(PipelineError::InvalidPreference(format!(
                        "{} must be a non-negative number, got {}",
                        key, value
                    )));
                }
                if key.is_percentage() && number > 100.0 {
                    return Err(PipelineError::InvalidPreference(format!(
                        "{} must be at most 100%, got {}",
                        key, value
                    )));
                }
            }
            ValueKind::Choice(choices) => {
                if !choices.contains(&value) {
                    return Err(PipelineError::InvalidPreference(format!(
                        "{} must be one of {}, got {}",
                        key,
                        choices.join("/"),
                        value
                    )));
                }
            }
            ValueKind::Text => {}
        }
    }
    Ok(())
}

/// 导出为推荐请求里的 key -> 可选值
pub fn export(items: &[PreferenceItem]) -> BTreeMap<String, Option<String>> {
    let mut out = BTreeMap::new();
    for item in items {
        if item.pinned {
            out.insert(item.key.as_str().to_string(), None);
        } else if let Some(value) = item.effective_value() {
            out.insert(item.key.as_str().to_string(), Some(value.to_string()));
        }
    }
    out
}
