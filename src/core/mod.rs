//! 核心调度层：错误、任务抽象、任务队列、优雅关闭

pub mod error;
pub mod shutdown;
pub mod task;
pub mod task_queue;

pub use error::PipelineError;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use task::{Task, TaskProperties};
pub use task_queue::{QueueStats, TaskQueue};
