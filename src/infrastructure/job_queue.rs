//! 后台任务队列 - 基础设施层
//!
//! 只负责"把活交出去"，真正执行在 `orchestrator::worker`。

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::infrastructure::site::SiteError;
use crate::models::{BulkJob, Document, EnqueueOptions};

/// 宿主框架的任务队列
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队一整批文档
    async fn enqueue(&self, job: BulkJob, options: EnqueueOptions) -> Result<(), SiteError>;

    /// 把单个文档放进提交队列（文档类型配置了 queue_in_background 时使用）
    async fn queue_submission(&self, doc: &Document) -> Result<(), SiteError>;

    /// 调度器未运行时不能走提交队列
    fn is_scheduler_inactive(&self) -> bool;
}

/// 队列中的一项工作
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    Bulk {
        job: BulkJob,
        options: EnqueueOptions,
    },
    Submission {
        doctype: String,
        name: String,
    },
    /// 之前入队的工作全部处理完后停止 worker
    Shutdown,
}

/// 基于 tokio mpsc 的任务队列
pub struct ChannelJobQueue {
    sender: mpsc::UnboundedSender<WorkItem>,
    scheduler_active: AtomicBool,
}

/// worker 端持有的接收器
pub type WorkReceiver = mpsc::UnboundedReceiver<WorkItem>;

impl ChannelJobQueue {
    /// 创建队列，调度器默认处于运行状态
    pub fn new() -> (Self, WorkReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            sender,
            scheduler_active: AtomicBool::new(true),
        };
        (queue, receiver)
    }

    pub fn set_scheduler_active(&self, active: bool) {
        self.scheduler_active.store(active, Ordering::SeqCst);
    }

    /// 通知 worker 在处理完已入队的工作后退出
    pub fn close(&self) {
        if self.sender.send(WorkItem::Shutdown).is_err() {
            debug!("worker 已经退出");
        }
    }

    fn send(&self, item: WorkItem) -> Result<(), SiteError> {
        self.sender
            .send(item)
            .map_err(|_| SiteError::Other("job queue worker is not running".to_string()))
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job: BulkJob, options: EnqueueOptions) -> Result<(), SiteError> {
        debug!(
            "入队批量任务: {} x{} -> 队列 {} (超时 {:?})",
            job.doctype,
            job.docnames.len(),
            options.queue,
            options.timeout
        );
        self.send(WorkItem::Bulk { job, options })
    }

    async fn queue_submission(&self, doc: &Document) -> Result<(), SiteError> {
        debug!("入队提交: {} {}", doc.doctype, doc.name);
        self.send(WorkItem::Submission {
            doctype: doc.doctype.clone(),
            name: doc.name.clone(),
        })
    }

    fn is_scheduler_inactive(&self) -> bool {
        !self.scheduler_active.load(Ordering::SeqCst)
    }
}
