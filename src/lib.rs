//! # Bulk Edit Formula
//!
//! 对一批文档执行 submit / cancel / update，update 支持 "=+1" 这类公式值
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 宿主框架接口（文档存储、权限、事务、实时推送、任务队列）
//! - `MemorySite` / `ChannelJobQueue` - 进程内实现，用于演示和测试
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不认识批次
//! - `safe_eval` - 受限表达式求值
//! - `formula` - 公式值解析与宽松数值转换
//! - `progress` - 进度事件
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文档"的完整处理流程
//! - `ActionCtx` - 上下文封装（doctype + docname + 序号）
//! - `ActionFlow` - 流程编排（读取 → 执行动作 → 提交 / 回滚）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量动作处理器，权限、上限、派发、进度
//! - `orchestrator/bulk_update` - 按条件批量更新
//! - `orchestrator/worker` - 后台 worker
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ChannelJobQueue, JobQueue, MemorySite, Site, SiteError};
pub use models::{BulkAction, BulkActionRequest, BulkOutcome, BulkUpdateRequest, Document};
pub use orchestrator::{spawn_worker, App, BulkActionRunner};
pub use services::{apply_formula, safe_eval};
pub use workflow::{ActionCtx, ActionFlow};
