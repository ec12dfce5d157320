//! 应用入口 - 编排层
//!
//! 负责资源的创建与生命周期：加载演示站点、启动后台 worker、
//! 执行演示数据里的批量更新请求，最后等待队列清空并输出统计。

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{ChannelJobQueue, MemorySite};
use crate::models::{load_fixture, BulkAction, BulkOutcome, BulkUpdateRequest};
use crate::orchestrator::batch_processor::BulkActionRunner;
use crate::orchestrator::worker::{spawn_worker, WorkerStats};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    site: Arc<MemorySite>,
    queue: Arc<ChannelJobQueue>,
    runner: Arc<BulkActionRunner>,
    worker: JoinHandle<WorkerStats>,
    request: Option<BulkUpdateRequest>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config);

        info!("\n📁 正在加载站点数据: {}", config.fixture_file);
        let fixture = load_fixture(Path::new(&config.fixture_file)).await?;
        let request = fixture.request.clone();

        let site = Arc::new(MemorySite::from_fixture(fixture));
        let (queue, receiver) = ChannelJobQueue::new();
        let queue = Arc::new(queue);
        let runner = Arc::new(BulkActionRunner::new(
            site.clone(),
            queue.clone(),
            config.clone(),
        ));
        let worker = spawn_worker(runner.clone(), receiver);

        Ok(Self {
            config,
            site,
            queue,
            runner,
            worker,
            request,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(self) -> Result<()> {
        let outcome = match &self.request {
            Some(request) => {
                info!(
                    "📝 批量更新 {}.{} = {}",
                    request.document_type, request.field, request.update_value
                );
                self.runner.bulk_update(request).await
            }
            None => {
                warn!("⚠️ 站点数据中没有批量更新请求，程序结束");
                Ok(BulkOutcome::Completed {
                    action: BulkAction::Update,
                    failed: Vec::new(),
                })
            }
        };

        // 无论请求是否成功，都要让 worker 处理完已入队的工作
        self.queue.close();
        let stats = self.worker.await.context("后台 worker 异常退出")?;

        let outcome = outcome.map_err(|e| {
            error!("❌ 批量更新被拒绝: {}", e);
            e
        })?;

        if let Some(summary) = outcome.failure_summary() {
            warn!("⚠️ {}", summary);
        }

        let total = self.site.progress_events().await.len();
        let failed = outcome.failed().len() + stats.failed_documents + stats.failed_submissions;
        print_final_stats(
            total.saturating_sub(failed),
            failed,
            total,
            &self.config.output_log_file,
        );

        Ok(())
    }
}
