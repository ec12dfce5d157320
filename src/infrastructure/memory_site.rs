//! 内存版站点 - 基础设施层
//!
//! 单进程内模拟宿主框架：写操作按文档暂存，`commit` 时落盘，`rollback` 时丢弃。
//! 测试和演示程序都用它代替真实框架。

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::infrastructure::site::{
    DocumentStore, Permissions, Realtime, SiteError, Transactions,
};
use crate::models::{DocStatus, DocTypeMeta, Document, ProgressEvent, SiteFixture};

type DocKey = (String, String);

#[derive(Default)]
struct SiteState {
    meta: HashMap<String, DocTypeMeta>,
    committed: BTreeMap<DocKey, Document>,
    staged: HashMap<DocKey, Document>,
    denied_write: HashSet<String>,
    rejected: HashMap<String, String>,
    progress: Vec<ProgressEvent>,
    alerts: Vec<String>,
    commits: usize,
    rollbacks: usize,
    queries: usize,
}

/// 内存站点
#[derive(Default)]
pub struct MemorySite {
    state: Mutex<SiteState>,
    /// 写这些文档时直接 panic
    panic_on_write: HashSet<String>,
    /// 设置后所有 commit 都失败
    commit_error: Option<String>,
    /// 每次读取文档前的延迟
    latency: Duration,
}

impl MemorySite {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用 TOML 演示数据构建站点
    pub fn from_fixture(fixture: SiteFixture) -> Self {
        let mut site = Self::new();
        for (doctype, meta) in fixture.doctypes {
            site = site.with_doctype(doctype, meta);
        }
        for doc in fixture.documents {
            site = site.with_document(doc);
        }
        site
    }

    pub fn with_doctype(mut self, doctype: impl Into<String>, meta: DocTypeMeta) -> Self {
        self.state.get_mut().meta.insert(doctype.into(), meta);
        self
    }

    pub fn with_document(mut self, doc: Document) -> Self {
        let key = (doc.doctype.clone(), doc.name.clone());
        self.state.get_mut().committed.insert(key, doc);
        self
    }

    /// 当前用户对该文档类型没有写权限
    pub fn deny_write(mut self, doctype: impl Into<String>) -> Self {
        self.state.get_mut().denied_write.insert(doctype.into());
        self
    }

    /// 模拟校验失败：该文档的任何写操作都会报错
    pub fn reject_writes_for(mut self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.state
            .get_mut()
            .rejected
            .insert(name.into(), reason.into());
        self
    }

    /// 模拟宿主框架内部崩溃：该文档的写操作会 panic
    pub fn panic_on_write_for(mut self, name: impl Into<String>) -> Self {
        self.panic_on_write.insert(name.into());
        self
    }

    /// 模拟数据库提交失败
    pub fn fail_commits(mut self, reason: impl Into<String>) -> Self {
        self.commit_error = Some(reason.into());
        self
    }

    /// 模拟慢速存储
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn guard_write(&self, doc: &Document) {
        if self.panic_on_write.contains(&doc.name) {
            panic!("storage engine crashed while writing {}", doc.name);
        }
    }

    // ========== 检查用 ==========

    /// 已提交（落盘）的文档
    pub async fn committed_doc(&self, doctype: &str, name: &str) -> Option<Document> {
        let state = self.state.lock().await;
        state
            .committed
            .get(&(doctype.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn committed_docs(&self) -> Vec<Document> {
        self.state.lock().await.committed.values().cloned().collect()
    }

    pub async fn progress_events(&self) -> Vec<ProgressEvent> {
        self.state.lock().await.progress.clone()
    }

    pub async fn alerts(&self) -> Vec<String> {
        self.state.lock().await.alerts.clone()
    }

    pub async fn commit_count(&self) -> usize {
        self.state.lock().await.commits
    }

    pub async fn rollback_count(&self) -> usize {
        self.state.lock().await.rollbacks
    }

    /// `select_names` 被调用的次数
    pub async fn query_count(&self) -> usize {
        self.state.lock().await.queries
    }
}

impl SiteState {
    fn current(&self, key: &DocKey) -> Option<&Document> {
        self.staged.get(key).or_else(|| self.committed.get(key))
    }

    fn check_writable(&self, doc: &Document) -> Result<(), SiteError> {
        if let Some(reason) = self.rejected.get(&doc.name) {
            return Err(SiteError::Validation(reason.clone()));
        }
        let key = (doc.doctype.clone(), doc.name.clone());
        match self.current(&key) {
            Some(stored) if stored.docstatus != doc.docstatus => Err(SiteError::TimestampMismatch {
                name: doc.name.clone(),
            }),
            Some(_) => Ok(()),
            None => Err(SiteError::NotFound {
                doctype: doc.doctype.clone(),
                name: doc.name.clone(),
            }),
        }
    }

    fn stage(&mut self, doc: &Document) {
        let key = (doc.doctype.clone(), doc.name.clone());
        self.staged.insert(key, doc.clone());
    }
}

#[async_trait]
impl DocumentStore for MemorySite {
    async fn get_doc(&self, doctype: &str, name: &str) -> Result<Document, SiteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let state = self.state.lock().await;
        state
            .current(&(doctype.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SiteError::NotFound {
                doctype: doctype.to_string(),
                name: name.to_string(),
            })
    }

    async fn save(&self, doc: &mut Document) -> Result<(), SiteError> {
        self.guard_write(doc);
        let mut state = self.state.lock().await;
        state.check_writable(doc)?;
        if doc.docstatus.is_cancelled() {
            return Err(SiteError::Validation(format!(
                "Cannot edit cancelled document {}",
                doc.name
            )));
        }
        state.stage(doc);
        Ok(())
    }

    async fn submit(&self, doc: &mut Document) -> Result<(), SiteError> {
        self.guard_write(doc);
        let mut state = self.state.lock().await;
        state.check_writable(doc)?;
        if !doc.docstatus.is_draft() {
            return Err(SiteError::Validation(format!(
                "Cannot submit {} in status {}",
                doc.name, doc.docstatus
            )));
        }
        doc.docstatus = DocStatus::Submitted;
        state.stage(doc);
        Ok(())
    }

    async fn cancel(&self, doc: &mut Document) -> Result<(), SiteError> {
        self.guard_write(doc);
        let mut state = self.state.lock().await;
        state.check_writable(doc)?;
        if !doc.docstatus.is_submitted() {
            return Err(SiteError::Validation(format!(
                "Cannot cancel {} in status {}",
                doc.name, doc.docstatus
            )));
        }
        doc.docstatus = DocStatus::Cancelled;
        state.stage(doc);
        Ok(())
    }

    async fn doctype_meta(&self, doctype: &str) -> Result<DocTypeMeta, SiteError> {
        let state = self.state.lock().await;
        Ok(state.meta.get(doctype).cloned().unwrap_or_default())
    }

    async fn select_names(
        &self,
        doctype: &str,
        condition: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, SiteError> {
        let filter = match condition {
            Some(raw) if !raw.trim().is_empty() => Some(Condition::parse(raw)?),
            _ => None,
        };

        let mut state = self.state.lock().await;
        state.queries += 1;

        let names = state
            .committed
            .values()
            .filter(|doc| doc.doctype == doctype)
            .filter(|doc| filter.as_ref().map_or(true, |f| f.matches(doc)))
            .take(limit)
            .map(|doc| doc.name.clone())
            .collect();

        Ok(names)
    }
}

#[async_trait]
impl Permissions for MemorySite {
    async fn has_write_permission(&self, doctype: &str) -> bool {
        !self.state.lock().await.denied_write.contains(doctype)
    }
}

#[async_trait]
impl Transactions for MemorySite {
    async fn commit(&self, doctype: &str, name: &str) -> Result<(), SiteError> {
        if let Some(reason) = &self.commit_error {
            return Err(SiteError::Other(reason.clone()));
        }
        let mut state = self.state.lock().await;
        let key = (doctype.to_string(), name.to_string());
        if let Some(doc) = state.staged.remove(&key) {
            state.committed.insert(key, doc);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&self, doctype: &str, name: &str) {
        let mut state = self.state.lock().await;
        if state
            .staged
            .remove(&(doctype.to_string(), name.to_string()))
            .is_some()
        {
            debug!("回滚未提交的文档 {} {}", doctype, name);
        }
        state.rollbacks += 1;
    }
}

#[async_trait]
impl Realtime for MemorySite {
    async fn publish_progress(&self, event: ProgressEvent) {
        self.state.lock().await.progress.push(event);
    }

    async fn msgprint(&self, message: &str) {
        self.state.lock().await.alerts.push(message.to_string());
    }
}

// ========== 条件过滤 ==========

/// `field op literal [and field op literal ...]`
#[derive(Debug)]
struct Condition {
    clauses: Vec<Clause>,
}

#[derive(Debug)]
struct Clause {
    field: String,
    op: CompareOp,
    literal: JsonValue,
}

#[derive(Debug, Clone, Copy)]
enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Condition {
    fn parse(raw: &str) -> Result<Self, SiteError> {
        let splitter =
            Regex::new(r"(?i)\s+and\s+").map_err(|e| SiteError::InvalidQuery(e.to_string()))?;
        let clause_re = Regex::new(
            r#"^\s*`?(\w+)`?\s*(!=|<>|>=|<=|=|>|<)\s*('(?:[^']*)'|"(?:[^"]*)"|-?\d+(?:\.\d+)?)\s*$"#,
        )
        .map_err(|e| SiteError::InvalidQuery(e.to_string()))?;

        let mut clauses = Vec::new();
        for part in splitter.split(raw.trim()) {
            let caps = clause_re
                .captures(part)
                .ok_or_else(|| SiteError::InvalidQuery(format!("unsupported condition: {}", part)))?;

            let op = match &caps[2] {
                "=" => CompareOp::Eq,
                "!=" | "<>" => CompareOp::Ne,
                ">" => CompareOp::Gt,
                ">=" => CompareOp::Ge,
                "<" => CompareOp::Lt,
                _ => CompareOp::Le,
            };

            let token = &caps[3];
            let literal = if token.starts_with('\'') || token.starts_with('"') {
                JsonValue::String(token[1..token.len() - 1].to_string())
            } else {
                token
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(JsonValue::Number)
                    .ok_or_else(|| SiteError::InvalidQuery(format!("bad number: {}", token)))?
            };

            clauses.push(Clause {
                field: caps[1].to_string(),
                op,
                literal,
            });
        }

        Ok(Self { clauses })
    }

    fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }
}

impl Clause {
    fn matches(&self, doc: &Document) -> bool {
        let value = match self.field.as_str() {
            "name" => JsonValue::String(doc.name.clone()),
            "docstatus" => JsonValue::from(u8::from(doc.docstatus)),
            field => match doc.get(field) {
                Some(v) if !v.is_null() => v.clone(),
                // SQL NULL 不满足任何比较
                _ => return false,
            },
        };

        let ordering = match (value.as_f64(), self.literal.as_f64()) {
            (Some(left), Some(right)) => left.partial_cmp(&right),
            _ => Some(display(&value).cmp(&display(&self.literal))),
        };

        match (self.op, ordering) {
            (_, None) => false,
            (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
            (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        }
    }
}

fn display(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
