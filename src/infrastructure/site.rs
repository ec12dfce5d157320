//! 宿主框架接口 - 基础设施层
//!
//! 文档持久化、权限、事务和实时推送都由宿主框架提供，
//! 本 crate 只通过这里的窄接口消费它们。

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DocTypeMeta, Document, ProgressEvent};

/// 宿主框架在单个操作上抛出的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiteError {
    #[error("{doctype} {name} not found")]
    NotFound { doctype: String, name: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient permission: {0}")]
    Permission(String),

    #[error("Document {name} has been modified after you have opened it")]
    TimestampMismatch { name: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{0}")]
    Other(String),
}

/// 文档读写
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_doc(&self, doctype: &str, name: &str) -> Result<Document, SiteError>;

    async fn save(&self, doc: &mut Document) -> Result<(), SiteError>;

    async fn submit(&self, doc: &mut Document) -> Result<(), SiteError>;

    async fn cancel(&self, doc: &mut Document) -> Result<(), SiteError>;

    async fn doctype_meta(&self, doctype: &str) -> Result<DocTypeMeta, SiteError>;

    /// 按布尔条件从文档类型的表中选出文档名（offset 0，最多 `limit` 条）
    ///
    /// 条件字符串原样交给宿主框架，调用方负责事先拒绝多语句注入。
    async fn select_names(
        &self,
        doctype: &str,
        condition: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, SiteError>;
}

/// 权限检查
#[async_trait]
pub trait Permissions: Send + Sync {
    async fn has_write_permission(&self, doctype: &str) -> bool;
}

/// 事务控制，作用域为单个文档
///
/// 只提交 / 丢弃 `(doctype, name)` 这一个文档暂存的写入，
/// 不影响其他调用方尚未提交的文档。
#[async_trait]
pub trait Transactions: Send + Sync {
    async fn commit(&self, doctype: &str, name: &str) -> Result<(), SiteError>;

    async fn rollback(&self, doctype: &str, name: &str);
}

/// 实时推送（fire-and-forget，无确认）
#[async_trait]
pub trait Realtime: Send + Sync {
    async fn publish_progress(&self, event: ProgressEvent);

    /// 前端提示条
    async fn msgprint(&self, message: &str);
}

/// 批量引擎需要的全部站点能力
pub trait Site: DocumentStore + Permissions + Transactions + Realtime {}

impl<T> Site for T where T: DocumentStore + Permissions + Transactions + Realtime + ?Sized {}
