use crate::models::document::{DocTypeMeta, Document};
use crate::models::request::BulkUpdateRequest;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// 演示 / 联调用的站点数据
///
/// ```toml
/// [doctypes.Task]
/// is_submittable = true
///
/// [[documents]]
/// doctype = "Task"
/// name = "T1"
/// fields = { priority = 2 }
///
/// [request]
/// document_type = "Task"
/// field = "priority"
/// update_value = "=+1"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteFixture {
    #[serde(default)]
    pub doctypes: HashMap<String, DocTypeMeta>,
    #[serde(default)]
    pub documents: Vec<Document>,
    /// 加载后要执行的批量更新（可选）
    #[serde(default)]
    pub request: Option<BulkUpdateRequest>,
}

/// 从 TOML 文件加载站点数据
pub async fn load_fixture(toml_file_path: &Path) -> Result<SiteFixture> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let fixture: SiteFixture = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "成功加载 {} 个文档类型, {} 个文档",
        fixture.doctypes.len(),
        fixture.documents.len()
    );

    Ok(fixture)
}
