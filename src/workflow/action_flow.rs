//! 文档动作流程 - 流程层
//!
//! 核心职责：定义"一个文档"的完整处理流程
//!
//! 流程顺序：
//! 1. 读取文档
//! 2. 检查动作在当前状态下是否合法
//! 3. submit / cancel / update（update 先逐字段求公式）
//! 4. 成功则提交事务，失败则回滚
//!
//! 单个文档的任何失败（包括 panic）都在这里被截住，不会打断整批。

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::infrastructure::{JobQueue, Site, SiteError};
use crate::models::{BulkAction, DocStatus, Document, UpdatePayload};
use crate::services::formula::apply_formula;
use crate::workflow::action_ctx::ActionCtx;

/// 成功执行的动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// 已放入提交队列
    QueuedSubmission,
    Submitted,
    Cancelled,
    Updated,
}

/// 单个文档动作的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    /// 推送到进度条的状态描述
    pub message: String,
}

/// 单个文档动作失败的原因
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("cannot {action} a document in status {status}")]
    IllegalTransition { action: BulkAction, status: DocStatus },

    #[error(transparent)]
    Site(#[from] SiteError),

    #[error("document action panicked")]
    Panicked,
}

/// 批处理循环看到的单个文档结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentResult {
    pub docname: String,
    pub succeeded: bool,
    pub message: String,
}

/// 文档动作流程
///
/// - 只处理单个文档
/// - 不关心批次大小和派发方式
/// - 失败只体现在返回值里
pub struct ActionFlow {
    site: Arc<dyn Site>,
    queue: Arc<dyn JobQueue>,
    verbose_logging: bool,
}

impl ActionFlow {
    pub fn new(site: Arc<dyn Site>, queue: Arc<dyn JobQueue>, verbose_logging: bool) -> Self {
        Self {
            site,
            queue,
            verbose_logging,
        }
    }

    /// 处理一个文档：读取、执行动作、提交或回滚
    ///
    /// 永远不返回错误，失败记录在 [`DocumentResult::succeeded`] 中。
    pub async fn process(
        &self,
        ctx: &ActionCtx,
        action: BulkAction,
        payload: &UpdatePayload,
    ) -> DocumentResult {
        let attempt = AssertUnwindSafe(self.load_and_apply(ctx, action, payload))
            .catch_unwind()
            .await
            .unwrap_or(Err(ActionError::Panicked));

        let attempt = match attempt {
            Ok(outcome) => self
                .site
                .commit(&ctx.doctype, &ctx.docname)
                .await
                .map(|_| outcome)
                .map_err(ActionError::from),
            Err(e) => Err(e),
        };

        match attempt {
            Ok(outcome) => {
                debug!("{} ✓ {}", ctx, outcome.message);
                DocumentResult {
                    docname: ctx.docname.clone(),
                    succeeded: true,
                    message: outcome.message,
                }
            }
            Err(e) => {
                warn!("{} ❌ {} 失败: {}", ctx, action, e);
                self.site.rollback(&ctx.doctype, &ctx.docname).await;
                DocumentResult {
                    docname: ctx.docname.clone(),
                    succeeded: false,
                    message: format!("Failed to {} {}", action, ctx.doctype),
                }
            }
        }
    }

    async fn load_and_apply(
        &self,
        ctx: &ActionCtx,
        action: BulkAction,
        payload: &UpdatePayload,
    ) -> Result<ActionOutcome, ActionError> {
        let mut doc = self.site.get_doc(&ctx.doctype, &ctx.docname).await?;
        self.apply_action(&mut doc, action, payload).await
    }

    /// 对单个文档执行动作
    ///
    /// # 参数
    /// - `doc`: 目标文档（update 时原地修改字段）
    /// - `action`: 动作
    /// - `payload`: update 的字段 → 原始更新值
    pub async fn apply_action(
        &self,
        doc: &mut Document,
        action: BulkAction,
        payload: &UpdatePayload,
    ) -> Result<ActionOutcome, ActionError> {
        match action {
            BulkAction::Submit => self.submit(doc).await,
            BulkAction::Cancel => self.cancel(doc).await,
            BulkAction::Update => self.update(doc, payload).await,
        }
    }

    async fn submit(&self, doc: &mut Document) -> Result<ActionOutcome, ActionError> {
        if !doc.docstatus.is_draft() {
            return Err(illegal(BulkAction::Submit, doc));
        }

        let meta = self.site.doctype_meta(&doc.doctype).await?;
        if meta.queue_in_background && !self.queue.is_scheduler_inactive() {
            self.queue.queue_submission(doc).await?;
            return Ok(ActionOutcome {
                kind: ActionKind::QueuedSubmission,
                message: format!("Queuing {} for Submission", doc.doctype),
            });
        }

        self.site.submit(doc).await?;
        Ok(ActionOutcome {
            kind: ActionKind::Submitted,
            message: format!("Submitting {}", doc.doctype),
        })
    }

    async fn cancel(&self, doc: &mut Document) -> Result<ActionOutcome, ActionError> {
        if !doc.docstatus.is_submitted() {
            return Err(illegal(BulkAction::Cancel, doc));
        }

        self.site.cancel(doc).await?;
        Ok(ActionOutcome {
            kind: ActionKind::Cancelled,
            message: format!("Cancelling {}", doc.doctype),
        })
    }

    async fn update(
        &self,
        doc: &mut Document,
        payload: &UpdatePayload,
    ) -> Result<ActionOutcome, ActionError> {
        if doc.docstatus.is_cancelled() {
            return Err(illegal(BulkAction::Update, doc));
        }

        for (field, raw) in payload {
            let new_value = apply_formula(doc.get(field), raw);
            if self.verbose_logging {
                info!(
                    "{} {}.{}: {:?} → {}",
                    doc.doctype,
                    doc.name,
                    field,
                    doc.get(field),
                    new_value
                );
            }
            doc.set(field.clone(), new_value);
        }

        self.site.save(doc).await?;
        Ok(ActionOutcome {
            kind: ActionKind::Updated,
            message: format!("Updating {}", doc.doctype),
        })
    }
}

fn illegal(action: BulkAction, doc: &Document) -> ActionError {
    ActionError::IllegalTransition {
        action,
        status: doc.docstatus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{ChannelJobQueue, DocumentStore, MemorySite, Transactions, WorkItem};
    use crate::models::DocTypeMeta;
    use serde_json::json;

    fn payload(field: &str, value: serde_json::Value) -> UpdatePayload {
        let mut payload = UpdatePayload::new();
        payload.insert(field.to_string(), value);
        payload
    }

    fn flow(site: Arc<MemorySite>, queue: Arc<ChannelJobQueue>) -> ActionFlow {
        ActionFlow::new(site, queue, false)
    }

    #[tokio::test]
    async fn test_update_applies_formula_and_commits() {
        let site = Arc::new(
            MemorySite::new().with_document(Document::new("Task", "T1").with_field("priority", json!(2))),
        );
        let (queue, _rx) = ChannelJobQueue::new();
        let flow = flow(site.clone(), Arc::new(queue));

        let ctx = ActionCtx::new("Task", "T1", 1, 1);
        let result = flow
            .process(&ctx, BulkAction::Update, &payload("priority", json!("=+1")))
            .await;

        assert!(result.succeeded);
        assert_eq!(result.message, "Updating Task");
        let stored = site.committed_doc("Task", "T1").await.unwrap();
        assert_eq!(stored.get("priority"), Some(&json!(3.0)));
    }

    #[tokio::test]
    async fn test_illegal_transitions_are_rejected() {
        let site = Arc::new(MemorySite::new());
        let (queue, _rx) = ChannelJobQueue::new();
        let flow = flow(site, Arc::new(queue));
        let empty = UpdatePayload::new();

        let mut draft = Document::new("Task", "T1");
        assert_eq!(
            flow.apply_action(&mut draft, BulkAction::Cancel, &empty).await,
            Err(ActionError::IllegalTransition {
                action: BulkAction::Cancel,
                status: DocStatus::Draft
            })
        );

        let mut submitted = Document::new("Task", "T2").with_status(DocStatus::Submitted);
        assert!(matches!(
            flow.apply_action(&mut submitted, BulkAction::Submit, &empty).await,
            Err(ActionError::IllegalTransition { .. })
        ));

        let mut cancelled = Document::new("Task", "T3").with_status(DocStatus::Cancelled);
        assert!(matches!(
            flow.apply_action(&mut cancelled, BulkAction::Update, &payload("x", json!(1))).await,
            Err(ActionError::IllegalTransition { .. })
        ));
        // 非法动作不应修改字段
        assert_eq!(cancelled.get("x"), None);
    }

    #[tokio::test]
    async fn test_submit_goes_through_queue_when_configured() {
        let site = Arc::new(
            MemorySite::new()
                .with_doctype(
                    "Invoice",
                    DocTypeMeta {
                        queue_in_background: true,
                        is_submittable: true,
                    },
                )
                .with_document(Document::new("Invoice", "INV-1")),
        );
        let (queue, mut rx) = ChannelJobQueue::new();
        let flow = flow(site.clone(), Arc::new(queue));

        let ctx = ActionCtx::new("Invoice", "INV-1", 1, 1);
        let result = flow.process(&ctx, BulkAction::Submit, &UpdatePayload::new()).await;

        assert!(result.succeeded);
        assert_eq!(result.message, "Queuing Invoice for Submission");
        assert_eq!(
            rx.try_recv().ok(),
            Some(WorkItem::Submission {
                doctype: "Invoice".to_string(),
                name: "INV-1".to_string()
            })
        );
        // 仍然是草稿，等待后台提交
        assert!(site
            .committed_doc("Invoice", "INV-1")
            .await
            .unwrap()
            .docstatus
            .is_draft());
    }

    #[tokio::test]
    async fn test_submit_is_synchronous_when_scheduler_inactive() {
        let site = Arc::new(
            MemorySite::new()
                .with_doctype(
                    "Invoice",
                    DocTypeMeta {
                        queue_in_background: true,
                        is_submittable: true,
                    },
                )
                .with_document(Document::new("Invoice", "INV-1")),
        );
        let (queue, mut rx) = ChannelJobQueue::new();
        queue.set_scheduler_active(false);
        let flow = flow(site.clone(), Arc::new(queue));

        let ctx = ActionCtx::new("Invoice", "INV-1", 1, 1);
        let result = flow.process(&ctx, BulkAction::Submit, &UpdatePayload::new()).await;

        assert_eq!(result.message, "Submitting Invoice");
        assert!(rx.try_recv().is_err());
        assert!(site
            .committed_doc("Invoice", "INV-1")
            .await
            .unwrap()
            .docstatus
            .is_submitted());
    }

    #[tokio::test]
    async fn test_site_failure_rolls_back() {
        let site = Arc::new(
            MemorySite::new()
                .with_document(Document::new("Task", "T1").with_field("priority", json!(2)))
                .reject_writes_for("T1", "mandatory field missing"),
        );
        let (queue, _rx) = ChannelJobQueue::new();
        let flow = flow(site.clone(), Arc::new(queue));

        let ctx = ActionCtx::new("Task", "T1", 1, 1);
        let result = flow
            .process(&ctx, BulkAction::Update, &payload("priority", json!("=*10")))
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.message, "Failed to update Task");
        assert_eq!(site.rollback_count().await, 1);
        assert_eq!(site.commit_count().await, 0);
        let stored = site.committed_doc("Task", "T1").await.unwrap();
        assert_eq!(stored.get("priority"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_panic_is_isolated_to_the_document() {
        let site = Arc::new(
            MemorySite::new()
                .with_document(Document::new("Task", "T1").with_field("priority", json!(2)))
                .panic_on_write_for("T1"),
        );
        let (queue, _rx) = ChannelJobQueue::new();
        let flow = flow(site.clone(), Arc::new(queue));

        let ctx = ActionCtx::new("Task", "T1", 1, 1);
        let result = flow
            .process(&ctx, BulkAction::Update, &payload("priority", json!("=+1")))
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.message, "Failed to update Task");
        assert_eq!(site.rollback_count().await, 1);
        assert_eq!(
            site.committed_doc("Task", "T1").await.unwrap().get("priority"),
            Some(&json!(2))
        );
    }

    #[tokio::test]
    async fn test_commit_failure_is_a_document_failure() {
        let site = Arc::new(
            MemorySite::new()
                .with_document(Document::new("Task", "T1"))
                .fail_commits("lock wait timeout exceeded"),
        );
        let (queue, _rx) = ChannelJobQueue::new();
        let flow = flow(site.clone(), Arc::new(queue));

        let ctx = ActionCtx::new("Task", "T1", 1, 1);
        let result = flow.process(&ctx, BulkAction::Submit, &UpdatePayload::new()).await;

        assert!(!result.succeeded);
        assert_eq!(result.message, "Failed to submit Task");
        assert_eq!(site.rollback_count().await, 1);
        assert!(site
            .committed_doc("Task", "T1")
            .await
            .unwrap()
            .docstatus
            .is_draft());
    }

    #[tokio::test]
    async fn test_update_with_empty_payload_saves_unchanged() {
        let site = Arc::new(
            MemorySite::new().with_document(Document::new("Task", "T1").with_field("priority", json!(2))),
        );
        let (queue, _rx) = ChannelJobQueue::new();
        let flow = flow(site.clone(), Arc::new(queue));

        let ctx = ActionCtx::new("Task", "T1", 1, 1);
        let result = flow.process(&ctx, BulkAction::Update, &UpdatePayload::new()).await;

        assert!(result.succeeded);
        assert_eq!(site.commit_count().await, 1);
        assert_eq!(
            site.committed_doc("Task", "T1").await.unwrap().get("priority"),
            Some(&json!(2))
        );
    }

    #[tokio::test]
    async fn test_failed_document_keeps_other_staged_writes() {
        let site = Arc::new(
            MemorySite::new()
                .with_document(Document::new("Task", "A1").with_field("qty", json!(1)))
                .with_document(Document::new("Task", "B1").with_field("qty", json!(1)))
                .reject_writes_for("B1", "qty must be positive"),
        );
        let (queue, _rx) = ChannelJobQueue::new();
        let flow = flow(site.clone(), Arc::new(queue));

        // 另一个调用方暂存了 A1 的修改，还没提交
        let mut a1 = site.get_doc("Task", "A1").await.unwrap();
        a1.set("qty", json!(99));
        site.save(&mut a1).await.unwrap();

        let ctx = ActionCtx::new("Task", "B1", 1, 1);
        let result = flow
            .process(&ctx, BulkAction::Update, &payload("qty", json!("=-5")))
            .await;
        assert!(!result.succeeded);

        site.commit("Task", "A1").await.unwrap();
        assert_eq!(
            site.committed_doc("Task", "A1").await.unwrap().get("qty"),
            Some(&json!(99))
        );
    }

    #[tokio::test]
    async fn test_missing_document_is_a_failure_not_an_error() {
        let site = Arc::new(MemorySite::new());
        let (queue, _rx) = ChannelJobQueue::new();
        let flow = flow(site, Arc::new(queue));

        let ctx = ActionCtx::new("Task", "ghost", 1, 1);
        let result = flow.process(&ctx, BulkAction::Cancel, &UpdatePayload::new()).await;
        assert!(!result.succeeded);
        assert_eq!(result.docname, "ghost");
    }
}
