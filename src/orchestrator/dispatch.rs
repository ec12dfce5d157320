//! 批次派发策略
//!
//! 小批次在请求内同步跑完，大批次交给后台队列。上限检查在选择策略之前完成。

use crate::config::Config;
use crate::models::EnqueueOptions;

/// 派发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// 同步执行，直接返回失败列表
    Inline,
    /// 入队后台，立即返回
    Background,
}

impl DispatchStrategy {
    /// 按文档数量选择派发方式
    pub fn select(count: usize, config: &Config) -> Self {
        if count < config.sync_threshold {
            DispatchStrategy::Inline
        } else {
            DispatchStrategy::Background
        }
    }
}

/// 后台入队参数
pub fn enqueue_options(config: &Config) -> EnqueueOptions {
    EnqueueOptions {
        queue: config.queue_name.clone(),
        timeout: config.job_timeout,
    }
}
