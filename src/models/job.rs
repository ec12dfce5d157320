//! 后台任务、进度事件与批量结果

use crate::models::request::{BulkAction, UpdatePayload};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 一次后台批量任务（整批顺序处理）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkJob {
    pub doctype: String,
    pub docnames: Vec<String>,
    pub action: BulkAction,
    #[serde(default)]
    pub payload: UpdatePayload,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// 入队参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub queue: String,
    pub timeout: Duration,
}

/// 推送给前端进度条的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 0..=100
    pub percent: f64,
    /// 刚执行完的动作描述
    pub title: String,
    /// 本次处理的文档名
    pub description: String,
    pub task_id: Option<String>,
}

/// `run_bulk_action` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    /// 同步执行完毕，附带失败的文档名（保持输入顺序）
    Completed {
        action: BulkAction,
        failed: Vec<String>,
    },
    /// 已交给后台队列，只能通过进度事件观察结果
    Enqueued { total: usize },
}

impl BulkOutcome {
    pub fn failed(&self) -> &[String] {
        match self {
            BulkOutcome::Completed { failed, .. } => failed,
            BulkOutcome::Enqueued { .. } => &[],
        }
    }

    pub fn is_enqueued(&self) -> bool {
        matches!(self, BulkOutcome::Enqueued { .. })
    }

    /// 列表页对话框展示的失败提示，例如 "Cannot submit T1, T2."
    pub fn failure_summary(&self) -> Option<String> {
        match self {
            BulkOutcome::Completed { action, failed } if !failed.is_empty() => {
                Some(format!("Cannot {} {}.", action, failed.join(", ")))
            }
            _ => None,
        }
    }
}
