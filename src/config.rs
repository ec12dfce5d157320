use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 少于该数量的批次同步执行
    pub sync_threshold: usize,
    /// 单批允许的最大文档数
    pub max_documents: usize,
    /// 后台队列名称
    pub queue_name: String,
    /// 后台任务超时
    pub job_timeout: Duration,
    /// 演示数据文件
    pub fixture_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_threshold: 20,
            max_documents: 500,
            queue_name: "short".to_string(),
            job_timeout: Duration::from_secs(1000),
            fixture_file: "fixtures/site.toml".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量读取配置
    ///
    /// 变量缺失时使用默认值；变量存在但无法解析时报错，不静默回退。
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        let config = Self {
            sync_threshold: parse_env("BULK_SYNC_THRESHOLD", "usize")?.unwrap_or(default.sync_threshold),
            max_documents: parse_env("BULK_MAX_DOCUMENTS", "usize")?.unwrap_or(default.max_documents),
            queue_name: std::env::var("BULK_QUEUE_NAME").unwrap_or(default.queue_name),
            job_timeout: parse_env("BULK_JOB_TIMEOUT_SECS", "u64")?.map(Duration::from_secs).unwrap_or(default.job_timeout),
            fixture_file: std::env::var("FIXTURE_FILE").unwrap_or(default.fixture_file),
            verbose_logging: parse_env("VERBOSE_LOGGING", "bool")?.unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        };
        config.validate()?;
        Ok(config)
    }

    /// 同步阈值必须不大于批量上限
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_documents == 0 {
            return Err(ConfigError::OutOfRange {
                var_name: "BULK_MAX_DOCUMENTS".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.sync_threshold > self.max_documents {
            return Err(ConfigError::OutOfRange {
                var_name: "BULK_SYNC_THRESHOLD".to_string(),
                reason: format!("不能大于批量上限 {}", self.max_documents),
            });
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(var_name: &str, expected_type: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
