//! 文档处理上下文
//!
//! 封装"我正在处理哪个文档类型的第几个文档"这一信息

use std::fmt::Display;

/// 文档处理上下文
#[derive(Debug, Clone)]
pub struct ActionCtx {
    /// 文档类型
    pub doctype: String,

    /// 文档名
    pub docname: String,

    /// 在批次中的序号（从1开始）
    pub index: usize,

    /// 批次总数
    pub total: usize,
}

impl ActionCtx {
    /// 创建新的文档上下文
    pub fn new(doctype: impl Into<String>, docname: impl Into<String>, index: usize, total: usize) -> Self {
        Self {
            doctype: doctype.into(),
            docname: docname.into(),
            index,
            total,
        }
    }
}

impl Display for ActionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {} #{}/{}]",
            self.doctype, self.docname, self.index, self.total
        )
    }
}
