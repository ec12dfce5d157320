//! 文档模型
//!
//! 文档由宿主框架持有和持久化，这里只描述读写字段和状态所需的最小形状。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// 文档生命周期状态（docstatus）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DocStatus {
    /// 草稿（0）
    #[default]
    Draft,
    /// 已提交（1）
    Submitted,
    /// 已取消（2）
    Cancelled,
}

impl DocStatus {
    pub fn is_draft(self) -> bool {
        self == DocStatus::Draft
    }

    pub fn is_submitted(self) -> bool {
        self == DocStatus::Submitted
    }

    pub fn is_cancelled(self) -> bool {
        self == DocStatus::Cancelled
    }
}

impl TryFrom<u8> for DocStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DocStatus::Draft),
            1 => Ok(DocStatus::Submitted),
            2 => Ok(DocStatus::Cancelled),
            other => Err(format!("无效的 docstatus: {}", other)),
        }
    }
}

impl From<DocStatus> for u8 {
    fn from(status: DocStatus) -> Self {
        match status {
            DocStatus::Draft => 0,
            DocStatus::Submitted => 1,
            DocStatus::Cancelled => 2,
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocStatus::Draft => "Draft",
            DocStatus::Submitted => "Submitted",
            DocStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

/// 单条文档记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doctype: String,
    pub name: String,
    #[serde(default)]
    pub docstatus: DocStatus,
    #[serde(default)]
    pub fields: Map<String, JsonValue>,
}

impl Document {
    /// 创建一个草稿文档
    pub fn new(doctype: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            name: name.into(),
            docstatus: DocStatus::Draft,
            fields: Map::new(),
        }
    }

    /// 链式设置字段（主要用于构造测试数据）
    pub fn with_field(mut self, field: impl Into<String>, value: JsonValue) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn with_status(mut self, docstatus: DocStatus) -> Self {
        self.docstatus = docstatus;
        self
    }

    /// 读取字段当前值，字段不存在时返回 None
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: JsonValue) {
        self.fields.insert(field.into(), value);
    }
}

/// 文档类型的元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocTypeMeta {
    /// 提交操作是否走后台提交队列
    #[serde(default)]
    pub queue_in_background: bool,
    #[serde(default)]
    pub is_submittable: bool,
}
