//! 规格优化流水线：发现 -> 指标 -> 优化，外加状态存储、懒加载闸门、汇总与导出

pub mod discovery;
pub mod engine;
pub mod events;
pub mod export;
pub mod gate;
pub mod optimize;
pub mod preferences;
pub mod snapshot;
pub mod store;
pub mod summary;
pub mod telemetry;
pub mod view;

pub use discovery::DiscoveryTask;
pub use engine::{Collaborators, Pipeline, PipelineContext, PipelineSettings};
pub use events::{EventPublisher, PipelineEvent};
pub use export::EXPORT_HEADERS;
pub use gate::LazyLoadGate;
pub use optimize::OptimizeTask;
pub use preferences::{PreferenceItem, PreferenceKey};
pub use snapshot::ResourceSnapshot;
pub use store::ResourceStore;
pub use summary::ResultSummary;
pub use telemetry::{TelemetryMode, TelemetryTask};
pub use view::{DeviceRow, PreferenceView, Property, ResourceItem};
