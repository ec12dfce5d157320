//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量动作处理器
//! - 权限检查、数量上限
//! - 选择同步执行或入队后台
//! - 逐个文档调用 ActionFlow，收集失败列表、推送进度
//!
//! ### `bulk_update` - 按条件批量更新
//! - 校验条件、按条件选出文档名，再交给 batch_processor
//!
//! ### `dispatch` - 派发策略
//!
//! ### `worker` - 后台 worker
//! - 顺序执行队列中的批量任务和单文档提交
//!
//! ### `app` - 应用生命周期（初始化、运行、统计）
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! bulk_update / worker
//!     ↓
//! batch_processor (处理 Vec<docname>)
//!     ↓
//! workflow::ActionFlow (处理单个文档)
//!     ↓
//! services (能力层：formula / safe_eval / progress)
//!     ↓
//! infrastructure (基础设施：Site / JobQueue)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，ActionFlow 管单个文档
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不做具体的状态判断

pub mod app;
pub mod batch_processor;
pub mod bulk_update;
pub mod dispatch;
pub mod worker;

// 重新导出主要类型
pub use app::App;
pub use batch_processor::{BulkActionRunner, ENQUEUED_MESSAGE};
pub use bulk_update::{validate_condition, BULK_UPDATE_DOCTYPE};
pub use dispatch::DispatchStrategy;
pub use worker::{spawn_worker, WorkerStats};
