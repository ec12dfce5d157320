use crate::infrastructure::SiteError;
use std::fmt;

/// 应用程序错误类型
///
/// 只有"整批"级别的错误会走到这里；单个文档的失败在批处理循环里被吞掉，
/// 记录到失败列表。面向最终用户的文案保持宿主框架的英文原文。
#[derive(Debug)]
pub enum AppError {
    /// 当前用户对文档类型没有写权限
    PermissionDenied { doctype: String },
    /// 批量数量超过上限，整批拒绝
    TooManyDocuments { count: usize, max: usize },
    /// 过滤条件包含语句分隔符
    UnsafeCondition { condition: String },
    /// 请求参数不合法
    InvalidRequest(String),
    /// 宿主框架返回的错误
    Site(SiteError),
    /// 后台队列不可用
    Queue(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::PermissionDenied { doctype } => {
                write!(f, "No permission to write {}", doctype)
            }
            AppError::TooManyDocuments { max, .. } => write!(
                f,
                "Bulk operations only support up to {} documents.",
                max
            ),
            AppError::UnsafeCondition { .. } => write!(f, "; not allowed in condition"),
            AppError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            AppError::Site(e) => write!(f, "{}", e),
            AppError::Queue(msg) => write!(f, "Failed to enqueue bulk operation: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Site(e) => Some(e),
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 数值不在允许范围
    OutOfRange { var_name: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::OutOfRange { var_name, reason } => {
                write!(f, "环境变量 {} 取值不合法: {}", var_name, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========

impl From<SiteError> for AppError {
    fn from(err: SiteError) -> Self {
        AppError::Site(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRequest(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    pub fn permission_denied(doctype: impl Into<String>) -> Self {
        AppError::PermissionDenied {
            doctype: doctype.into(),
        }
    }

    pub fn unsafe_condition(condition: impl Into<String>) -> Self {
        AppError::UnsafeCondition {
            condition: condition.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
