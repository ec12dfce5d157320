//! 后台 worker - 编排层
//!
//! 从队列中逐个取出工作顺序执行，批次内部不并发。
//! 批量任务受入队时给定的超时约束，超时后放弃剩余文档；除此之外没有取消机制。

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::infrastructure::{WorkItem, WorkReceiver};
use crate::orchestrator::batch_processor::BulkActionRunner;

/// worker 退出时的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    /// 跑完的批量任务数
    pub jobs: usize,
    /// 超时放弃的批量任务数
    pub timed_out: usize,
    /// 批量任务中失败的文档数
    pub failed_documents: usize,
    /// 成功的后台提交数
    pub submissions: usize,
    /// 失败的后台提交数
    pub failed_submissions: usize,
}

/// 启动后台 worker
///
/// 收到 [`WorkItem::Shutdown`] 后继续处理队列里剩下的工作（包括批量任务
/// 运行期间新入队的单文档提交），队列清空后退出并返回统计信息。
pub fn spawn_worker(runner: Arc<BulkActionRunner>, mut receiver: WorkReceiver) -> JoinHandle<WorkerStats> {
    tokio::spawn(async move {
        let mut stats = WorkerStats::default();
        let mut draining = false;

        loop {
            let item = if draining {
                match receiver.try_recv() {
                    Ok(item) => item,
                    Err(_) => break,
                }
            } else {
                match receiver.recv().await {
                    Some(item) => item,
                    None => break,
                }
            };

            match item {
                WorkItem::Bulk { job, options } => {
                    info!(
                        "🚀 [{}] 开始后台批量 {} {} x{}",
                        options.queue,
                        job.action,
                        job.doctype,
                        job.docnames.len()
                    );
                    match timeout(options.timeout, runner.run_job(&job)).await {
                        Ok(failed) => {
                            stats.jobs += 1;
                            stats.failed_documents += failed.len();
                        }
                        Err(_) => {
                            error!(
                                "❌ [{}] 后台批量 {} {} 超时 ({:?})",
                                options.queue, job.action, job.doctype, options.timeout
                            );
                            // 被中断的文档可能留有未提交的修改
                            for docname in &job.docnames {
                                runner.site().rollback(&job.doctype, docname).await;
                            }
                            stats.timed_out += 1;
                        }
                    }
                }
                WorkItem::Submission { doctype, name } => {
                    if runner.run_queued_submission(&doctype, &name).await {
                        stats.submissions += 1;
                    } else {
                        stats.failed_submissions += 1;
                    }
                }
                WorkItem::Shutdown => {
                    debug!("收到停止信号，处理剩余工作");
                    draining = true;
                }
            }
        }

        info!("worker 退出: {:?}", stats);
        stats
    })
}
