//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RIGHTSIZER__*` 覆盖（双下划线表示嵌套，如 `RIGHTSIZER__PIPELINE__LAZY_LOAD_THRESHOLD=3`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub recommendation: RecommendationSection,
}

/// [app] 段：项目与清单文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 目标项目；未设置时使用清单文件里的 project_id
    pub project_id: Option<String>,
    /// 离线清单文件（JSON）
    pub inventory_path: Option<PathBuf>,
}

/// [pipeline] 段：并发、懒加载阈值、指标窗口与各阶段重试预算
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// 超过该数量的资源默认延迟优化，等待用户显式触发
    #[serde(default = "default_lazy_load_threshold")]
    pub lazy_load_threshold: u32,
    #[serde(default = "default_telemetry_window_hours")]
    pub telemetry_window_hours: u32,
    #[serde(default = "default_alignment_secs")]
    pub alignment_secs: u64,
    #[serde(default)]
    pub telemetry_max_retry: u32,
    #[serde(default = "default_optimize_max_retry")]
    pub optimize_max_retry: u32,
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_lazy_load_threshold() -> u32 {
    1
}

fn default_telemetry_window_hours() -> u32 {
    24
}

fn default_alignment_secs() -> u64 {
    60
}

fn default_optimize_max_retry() -> u32 {
    3
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            lazy_load_threshold: default_lazy_load_threshold(),
            telemetry_window_hours: default_telemetry_window_hours(),
            alignment_secs: default_alignment_secs(),
            telemetry_max_retry: 0,
            optimize_max_retry: default_optimize_max_retry(),
        }
    }
}

/// [recommendation] 段：推荐服务地址、token 与单次请求超时
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationSection {
    /// 未设置时使用 Mock 推荐服务
    pub endpoint: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for RecommendationSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RecommendationSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// 从 config 目录加载配置，环境变量 RIGHTSIZER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RIGHTSIZER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RIGHTSIZER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.pipeline.lazy_load_threshold, 1);
        assert_eq!(cfg.pipeline.telemetry_window_hours, 24);
        assert_eq!(cfg.pipeline.alignment_secs, 60);
        assert_eq!(cfg.pipeline.telemetry_max_retry, 0);
        assert_eq!(cfg.pipeline.optimize_max_retry, 3);
        assert_eq!(cfg.recommendation.timeout(), Duration::from_secs(60));
        assert!(cfg.recommendation.endpoint.is_none());
    }

    #[test]
    fn test_load_from_file_keeps_unset_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rightsizer.toml");
        std::fs::write(
            &path,
            r#"
[app]
project_id = "billing-prod"

[pipeline]
max_concurrent_tasks = 8
optimize_max_retry = 5

[recommendation]
endpoint = "http://localhost:8080/optimize"
timeout_secs = 5
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.app.project_id.as_deref(), Some("billing-prod"));
        assert_eq!(cfg.pipeline.max_concurrent_tasks, 8);
        assert_eq!(cfg.pipeline.optimize_max_retry, 5);
        assert_eq!(cfg.pipeline.lazy_load_threshold, 1);
        assert_eq!(cfg.recommendation.timeout(), Duration::from_secs(5));
    }
}
