//! 按条件批量更新 - 编排层
//!
//! "Bulk Update" 表单的入口：先按条件选出文档名，再交给批量动作处理器。

use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{BulkAction, BulkOutcome, BulkUpdateRequest};
use crate::orchestrator::batch_processor::BulkActionRunner;
use crate::utils::logging::truncate_text;

/// 批量更新表单自身的文档类型，调用方需要对它有写权限
pub const BULK_UPDATE_DOCTYPE: &str = "Bulk Update";

/// 拒绝包含语句分隔符的条件，空白条件视为无条件
pub fn validate_condition(condition: Option<&str>) -> AppResult<Option<&str>> {
    match condition {
        Some(raw) if raw.contains(';') => Err(AppError::unsafe_condition(raw)),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}

impl BulkActionRunner {
    /// 按条件批量更新一个字段
    pub async fn bulk_update(&self, request: &BulkUpdateRequest) -> AppResult<BulkOutcome> {
        if !self.site().has_write_permission(BULK_UPDATE_DOCTYPE).await {
            return Err(AppError::permission_denied(BULK_UPDATE_DOCTYPE));
        }

        let condition = validate_condition(request.condition.as_deref()).map_err(|e| {
            warn!(
                "⚠️ 拒绝不安全的条件: {}",
                truncate_text(request.condition.as_deref().unwrap_or_default(), 80)
            );
            e
        })?;

        let limit = request.effective_limit(self.config().max_documents);
        let docnames = self
            .site()
            .select_names(&request.document_type, condition, limit)
            .await?;

        info!(
            "🔍 {} 条件 {:?} 命中 {} 个文档（上限 {}）",
            request.document_type,
            condition,
            docnames.len(),
            limit
        );

        self.run_bulk_action(
            &request.document_type,
            docnames,
            BulkAction::Update,
            Some(request.payload()),
            None,
        )
        .await
    }
}
