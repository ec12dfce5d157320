//! 进度推送服务 - 业务能力层
//!
//! 只负责把"处理到第几个"转成进度事件推出去，推送失败不影响流程。

use tracing::debug;

use crate::infrastructure::Realtime;
use crate::models::ProgressEvent;

/// 单个批次的进度推送
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total: usize,
    task_id: Option<String>,
}

impl ProgressReporter {
    pub fn new(total: usize, task_id: Option<String>) -> Self {
        Self { total, task_id }
    }

    /// 构建第 `processed` 个（从 1 开始）文档的进度事件
    pub fn event(&self, processed: usize, title: &str, docname: &str) -> ProgressEvent {
        let percent = if self.total == 0 {
            100.0
        } else {
            processed as f64 / self.total as f64 * 100.0
        };
        ProgressEvent {
            percent,
            title: title.to_string(),
            description: docname.to_string(),
            task_id: self.task_id.clone(),
        }
    }

    pub async fn report<R: Realtime + ?Sized>(
        &self,
        realtime: &R,
        processed: usize,
        title: &str,
        docname: &str,
    ) {
        let event = self.event(processed, title, docname);
        debug!(
            "进度 {:.1}% [{}] {} ({:?})",
            event.percent, event.title, event.description, event.task_id
        );
        realtime.publish_progress(event).await;
    }
}
