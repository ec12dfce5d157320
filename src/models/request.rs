//! 批量操作请求模型
//!
//! 网络调用方有时把 `docnames` / `data` 作为 JSON 字符串传入，
//! 这里统一在反序列化阶段解开。

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// 单字段批量编辑的载荷：字段名 → 原始更新值
pub type UpdatePayload = Map<String, JsonValue>;

/// 批量动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    #[default]
    Submit,
    Cancel,
    Update,
}

impl BulkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BulkAction::Submit => "submit",
            BulkAction::Cancel => "cancel",
            BulkAction::Update => "update",
        }
    }
}

impl FromStr for BulkAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "submit" => Ok(BulkAction::Submit),
            "cancel" => Ok(BulkAction::Cancel),
            "update" => Ok(BulkAction::Update),
            other => Err(format!("不支持的批量动作: {}", other)),
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "运行批量动作" 入口的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkActionRequest {
    pub doctype: String,
    #[serde(deserialize_with = "json_or_string")]
    pub docnames: Vec<String>,
    #[serde(default)]
    pub action: BulkAction,
    #[serde(default, deserialize_with = "optional_json_or_string")]
    pub data: Option<UpdatePayload>,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// "按条件批量更新" 入口的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdateRequest {
    pub document_type: String,
    #[serde(default)]
    pub condition: Option<String>,
    pub field: String,
    pub update_value: JsonValue,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl BulkUpdateRequest {
    /// 实际生效的条数上限：未设置、非正数或不小于上限时取 `cap`
    pub fn effective_limit(&self, cap: usize) -> usize {
        match self.limit {
            Some(limit) if limit > 0 && (limit as u64) < cap as u64 => limit as usize,
            _ => cap,
        }
    }

    /// 组装成单字段的更新载荷
    pub fn payload(&self) -> UpdatePayload {
        let mut payload = UpdatePayload::new();
        payload.insert(self.field.clone(), self.update_value.clone());
        payload
    }
}

fn json_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = JsonValue::deserialize(deserializer)?;
    decode_json_value(value).map_err(de::Error::custom)
}

fn optional_json_or_string<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(value) => decode_json_value(value).map(Some).map_err(de::Error::custom),
    }
}

fn decode_json_value<T: DeserializeOwned>(value: JsonValue) -> Result<T, serde_json::Error> {
    match value {
        JsonValue::String(raw) => serde_json::from_str(&raw),
        other => serde_json::from_value(other),
    }
}
