//! 批量动作处理器 - 编排层
//!
//! ## 职责
//!
//! 把一批文档名分发给 [`ActionFlow`]，收集失败列表并推送进度。
//!
//! ## 核心功能
//!
//! 1. **权限检查**：对目标文档类型没有写权限时直接拒绝
//! 2. **数量上限**：超过上限的批次整批拒绝，不做任何处理
//! 3. **派发选择**：小批次同步执行，大批次入队后台（见 [`DispatchStrategy`]）
//! 4. **进度推送**：每处理完一个文档推送一次进度
//! 5. **失败隔离**：单个文档失败只进入失败列表，批次继续

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{JobQueue, Site};
use crate::models::{BulkAction, BulkActionRequest, BulkJob, BulkOutcome, UpdatePayload};
use crate::orchestrator::dispatch::{enqueue_options, DispatchStrategy};
use crate::services::ProgressReporter;
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::{ActionCtx, ActionFlow};

/// 后台入队时给用户的提示
pub const ENQUEUED_MESSAGE: &str = "Bulk operation is enqueued in background.";

/// 批量动作处理器
pub struct BulkActionRunner {
    site: Arc<dyn Site>,
    queue: Arc<dyn JobQueue>,
    flow: ActionFlow,
    config: Config,
}

impl BulkActionRunner {
    pub fn new(site: Arc<dyn Site>, queue: Arc<dyn JobQueue>, config: Config) -> Self {
        let flow = ActionFlow::new(site.clone(), queue.clone(), config.verbose_logging);
        Self {
            site,
            queue,
            flow,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn site(&self) -> &Arc<dyn Site> {
        &self.site
    }

    /// 运行批量动作
    ///
    /// # 参数
    /// - `doctype`: 文档类型
    /// - `docnames`: 目标文档名
    /// - `action`: 动作
    /// - `payload`: update 的字段载荷
    /// - `task_id`: 前端进度条的关联 id
    ///
    /// # 返回
    /// 同步执行时返回失败列表；入队后台时返回 `Enqueued`
    pub async fn run_bulk_action(
        &self,
        doctype: &str,
        docnames: Vec<String>,
        action: BulkAction,
        payload: Option<UpdatePayload>,
        task_id: Option<String>,
    ) -> AppResult<BulkOutcome> {
        if !self.site.has_write_permission(doctype).await {
            warn!("⚠️ 没有 {} 的写权限，拒绝批量 {}", doctype, action);
            return Err(AppError::permission_denied(doctype));
        }

        let total = docnames.len();
        if total > self.config.max_documents {
            warn!("⚠️ 批量 {} 数量 {} 超过上限 {}", action, total, self.config.max_documents);
            return Err(AppError::TooManyDocuments {
                count: total,
                max: self.config.max_documents,
            });
        }

        let job = BulkJob {
            doctype: doctype.to_string(),
            docnames,
            action,
            payload: payload.unwrap_or_default(),
            task_id,
        };

        match DispatchStrategy::select(total, &self.config) {
            DispatchStrategy::Inline => {
                let failed = self.run_job(&job).await;
                Ok(BulkOutcome::Completed { action, failed })
            }
            DispatchStrategy::Background => {
                self.queue
                    .enqueue(job, enqueue_options(&self.config))
                    .await
                    .map_err(|e| AppError::Queue(e.to_string()))?;
                self.site.msgprint(ENQUEUED_MESSAGE).await;
                info!("📦 {} 个 {} 已入队后台执行 {}", total, doctype, action);
                Ok(BulkOutcome::Enqueued { total })
            }
        }
    }

    /// 网络入口：请求体已经解开 JSON 字符串
    pub async fn handle_request(&self, request: BulkActionRequest) -> AppResult<BulkOutcome> {
        self.run_bulk_action(
            &request.doctype,
            request.docnames,
            request.action,
            request.data,
            request.task_id,
        )
        .await
    }

    /// 网络入口：原始请求体
    ///
    /// 请求体无法解析时返回 `InvalidRequest`，不处理任何文档。
    pub async fn handle_json(&self, body: &str) -> AppResult<BulkOutcome> {
        let request: BulkActionRequest = serde_json::from_str(body)?;
        self.handle_request(request).await
    }

    /// 逐个处理一批文档，返回失败的文档名（保持输入顺序）
    ///
    /// 同步路径和后台 worker 共用这一个循环。
    pub async fn run_job(&self, job: &BulkJob) -> Vec<String> {
        let total = job.docnames.len();
        let reporter = ProgressReporter::new(total, job.task_id.clone());
        let mut failed = Vec::new();

        log_batch_start(&job.doctype, job.action.as_str(), total);

        for (index, docname) in job.docnames.iter().enumerate() {
            let ctx = ActionCtx::new(&job.doctype, docname, index + 1, total);
            let result = self.flow.process(&ctx, job.action, &job.payload).await;

            if !result.succeeded {
                failed.push(result.docname.clone());
            }

            reporter
                .report(self.site.as_ref(), ctx.index, &result.message, docname)
                .await;
        }

        log_batch_complete(&job.doctype, total - failed.len(), total);
        failed
    }

    /// 执行提交队列中的一个文档
    pub async fn run_queued_submission(&self, doctype: &str, name: &str) -> bool {
        let attempt = async {
            let mut doc = self.site.get_doc(doctype, name).await?;
            self.site.submit(&mut doc).await?;
            self.site.commit(doctype, name).await
        }
        .await;

        match attempt {
            Ok(()) => {
                info!("✓ 后台提交完成: {} {}", doctype, name);
                true
            }
            Err(e) => {
                error!("❌ 后台提交失败: {} {}: {}", doctype, name, e);
                self.site.rollback(doctype, name).await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{ChannelJobQueue, MemorySite, WorkItem};
    use crate::models::{DocStatus, Document};
    use serde_json::json;

    fn tasks(count: usize) -> MemorySite {
        (1..=count).fold(MemorySite::new(), |site, i| {
            site.with_document(Document::new("Task", format!("T{}", i)).with_field("qty", json!(i)))
        })
    }

    fn names(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("T{}", i)).collect()
    }

    fn runner(site: Arc<MemorySite>) -> (BulkActionRunner, crate::infrastructure::WorkReceiver) {
        let (queue, receiver) = ChannelJobQueue::new();
        let runner = BulkActionRunner::new(site, Arc::new(queue), Config::default());
        (runner, receiver)
    }

    fn qty_payload(value: &str) -> Option<UpdatePayload> {
        let mut payload = UpdatePayload::new();
        payload.insert("qty".to_string(), json!(value));
        Some(payload)
    }

    #[tokio::test]
    async fn test_too_many_documents_rejected_without_work() {
        let site = Arc::new(tasks(3));
        let (runner, mut receiver) = runner(site.clone());

        let result = runner
            .run_bulk_action("Task", names(501), BulkAction::Update, qty_payload("=+1"), None)
            .await;

        assert!(matches!(
            result,
            Err(AppError::TooManyDocuments { count: 501, max: 500 })
        ));
        assert_eq!(site.commit_count().await, 0);
        assert!(site.progress_events().await.is_empty());
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_permission_checked_first() {
        let site = Arc::new(tasks(2).deny_write("Task"));
        let (runner, _receiver) = runner(site.clone());

        let result = runner
            .run_bulk_action("Task", names(2), BulkAction::Update, qty_payload("=+1"), None)
            .await;

        assert!(matches!(result, Err(AppError::PermissionDenied { .. })));
        assert_eq!(
            site.committed_doc("Task", "T1").await.unwrap().get("qty"),
            Some(&json!(1))
        );
    }

    #[tokio::test]
    async fn test_inline_batch_reports_failures_and_progress() {
        // 19 个文档：T3 已提交（cancel 合法），其余草稿（cancel 非法）
        let site = tasks(19);
        let site = site.with_document(
            Document::new("Task", "T3").with_status(DocStatus::Submitted),
        );
        let site = Arc::new(site);
        let (runner, _receiver) = runner(site.clone());

        let outcome = runner
            .run_bulk_action("Task", names(19), BulkAction::Cancel, None, Some("t-1".to_string()))
            .await
            .unwrap();

        let failed = outcome.failed();
        assert_eq!(failed.len(), 18);
        assert!(!failed.contains(&"T3".to_string()));
        assert_eq!(failed[0], "T1");

        let events = site.progress_events().await;
        assert_eq!(events.len(), 19);
        assert_eq!(events[2].title, "Cancelling Task");
        assert_eq!(events[2].description, "T3");
        assert_eq!(events[18].percent, 100.0);
        assert!(events.iter().all(|e| e.task_id.as_deref() == Some("t-1")));
    }

    #[tokio::test]
    async fn test_large_batch_is_enqueued() {
        let site = Arc::new(tasks(25));
        let (runner, mut receiver) = runner(site.clone());

        let outcome = runner
            .run_bulk_action("Task", names(25), BulkAction::Update, qty_payload("=*2"), None)
            .await
            .unwrap();

        assert_eq!(outcome, BulkOutcome::Enqueued { total: 25 });
        assert_eq!(site.alerts().await, vec![ENQUEUED_MESSAGE.to_string()]);
        // 入队之后请求内不处理任何文档
        assert!(site.progress_events().await.is_empty());

        match receiver.try_recv() {
            Ok(WorkItem::Bulk { job, options }) => {
                assert_eq!(job.docnames.len(), 25);
                assert_eq!(options.queue, "short");
            }
            other => panic!("unexpected work item: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_without_payload_runs_per_document() {
        let site = Arc::new(tasks(2).with_document(
            Document::new("Task", "T2").with_status(DocStatus::Cancelled),
        ));
        let (runner, _receiver) = runner(site.clone());

        let outcome = runner
            .run_bulk_action("Task", names(2), BulkAction::Update, None, None)
            .await
            .unwrap();

        // 空载荷不是整批错误，作废的 T2 仍然逐个失败
        assert_eq!(outcome.failed(), ["T2".to_string()]);
        assert_eq!(site.progress_events().await.len(), 2);
        assert_eq!(
            site.committed_doc("Task", "T1").await.unwrap().get("qty"),
            Some(&json!(1))
        );
    }

    #[tokio::test]
    async fn test_handle_json_rejects_malformed_body() {
        let site = Arc::new(tasks(1));
        let (runner, _receiver) = runner(site.clone());

        let result = runner.handle_json("{\"doctype\": \"Task\", \"docnames\": ").await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert_eq!(site.commit_count().await, 0);

        let outcome = runner
            .handle_json(r#"{"doctype": "Task", "docnames": "[\"T1\"]", "action": "submit"}"#)
            .await
            .unwrap();
        assert!(outcome.failed().is_empty());
    }

    #[tokio::test]
    async fn test_handle_request_accepts_stringified_json() {
        let site = Arc::new(tasks(2));
        let (runner, _receiver) = runner(site.clone());

        let request: BulkActionRequest = serde_json::from_value(json!({
            "doctype": "Task",
            "docnames": "[\"T1\", \"T2\"]",
            "action": "update",
            "data": "{\"qty\": \"=*10\"}"
        }))
        .unwrap();

        let outcome = runner.handle_request(request).await.unwrap();
        assert!(outcome.failed().is_empty());
        assert_eq!(
            site.committed_doc("Task", "T2").await.unwrap().get("qty"),
            Some(&json!(20.0))
        );
    }

    #[tokio::test]
    async fn test_queued_submission() {
        let site = Arc::new(tasks(1));
        let (runner, _receiver) = runner(site.clone());

        assert!(runner.run_queued_submission("Task", "T1").await);
        assert!(!runner.run_queued_submission("Task", "T1").await);
        assert!(site
            .committed_doc("Task", "T1")
            .await
            .unwrap()
            .docstatus
            .is_submitted());
    }
}
