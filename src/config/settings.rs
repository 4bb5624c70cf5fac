// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 覆盖数据库、任务队列、抓取器、LLM、OCR、解析器与提醒等全部配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 运维端口配置
    pub server: ServerSettings,
    /// 任务队列配置
    pub broker: BrokerSettings,
    /// 抓取器配置
    pub fetcher: FetcherSettings,
    /// LLM 配置
    pub llm: LlmSettings,
    /// OCR 配置
    pub ocr: OcrSettings,
    /// 文档解析配置
    pub parsers: ParserSettings,
    /// 提醒配置
    pub reminder: ReminderSettings,
    /// 搜索索引配置
    pub search: SearchSettings,
    /// 外部数据源凭据
    #[serde(default)]
    pub sources: SourceSettings,
    /// 定时任务配置
    pub schedule: ScheduleSettings,
    /// 日志配置
    pub log: LogSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 队列权重
#[derive(Debug, Clone, Deserialize)]
pub struct QueueWeights {
    pub critical: u32,
    pub default: u32,
    pub low: u32,
}

/// 任务队列配置
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    /// Redis 地址；为空时使用进程内后端
    pub redis_addr: Option<String>,
    /// Redis 键前缀
    pub key_prefix: String,
    /// 工作协程数量
    pub concurrency: usize,
    /// 默认最大重试次数
    pub retry_max: u32,
    /// 重试退避基数（秒）
    pub retry_base_secs: u64,
    pub queue_weights: QueueWeights,
    /// 唯一键窗口（秒）
    pub unique_ttl_secs: u64,
    /// 空队列轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 默认单任务超时（秒）
    pub task_timeout_secs: u64,
    /// 队列积压阈值，超过后定时监控跳过入队
    pub backpressure_threshold: u64,
    /// 运行中任务租约（秒），超时视为卡死
    pub lease_secs: u64,
    /// 维护周期（秒）
    pub maintenance_interval_secs: u64,
}

impl BrokerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 抓取器配置
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherSettings {
    /// 每个主机每秒请求数
    pub rps_per_host: u32,
    /// 令牌桶容量
    pub burst: u32,
    /// 每个主机同时在途请求上限
    pub max_in_flight_per_host: usize,
    /// HTML 响应体上限（字节）
    pub max_bytes: usize,
    /// 文档响应体上限（字节）
    pub max_document_bytes: usize,
    /// 请求超时（秒）
    pub timeout: u64,
    /// 可重试错误的最大尝试次数
    pub retry_attempts: u32,
    /// UA 池
    pub user_agents: Vec<String>,
}

/// LLM 配置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// openai / deepseek / anthropic / gemini / ollama / custom
    pub provider: String,
    pub model: String,
    pub api_url: String,
    pub api_key: Option<String>,
    pub max_input_tokens: usize,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// 低于该置信度的结果被丢弃
    pub confidence_threshold: i32,
    /// 调用超时（秒）
    pub timeout: u64,
    /// 清洗阶段输入的最大字符数
    pub max_clean_chars: usize,
    /// 配置池中 API Key 的加密口令
    pub encryption_key: Option<String>,
    /// 列表页判定缓存容量
    pub discovery_cache_size: usize,
}

/// OCR 配置
#[derive(Debug, Clone, Deserialize)]
pub struct OcrSettings {
    /// tesseract / api
    pub engine: String,
    pub language: String,
    pub tesseract_cmd: String,
    pub pdftoppm_cmd: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// 超时（秒）
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlParserSettings {
    /// 表头关键词，命中 3 个以上视为职位表
    pub keywords: Vec<String>,
}

/// 文档解析配置
#[derive(Debug, Clone, Deserialize)]
pub struct ParserSettings {
    pub html: HtmlParserSettings,
    /// 单个文档解析超时（秒）
    pub document_timeout: u64,
    /// 单个公告最多解析的附件数
    pub max_attachments: usize,
    /// 列表页默认最大翻页数
    pub default_max_pages: u32,
}

/// 提醒配置
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderSettings {
    /// 免打扰开始（本地小时）
    pub quiet_hours_start: u32,
    /// 免打扰结束（本地小时）
    pub quiet_hours_end: u32,
    /// 本地时区相对 UTC 的小时偏移
    pub utc_offset_hours: i32,
    /// 单用户单日通知上限
    pub daily_cap: usize,
    pub calendar_lookahead_hours: i64,
    pub deadline_lookahead_hours: i64,
    /// 日历事件未指定提醒时间时使用的提前量（分钟）
    pub default_offsets_minutes: Vec<i64>,
    pub email_gateway: Option<String>,
    pub sms_gateway: Option<String>,
}

/// 搜索索引配置
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    pub url: Option<String>,
    pub index: String,
}

/// 外部数据源凭据
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSettings {
    /// 粉笔导出的 Cookie 串
    pub fenbi_cookies: Option<String>,
    pub wechat_token: Option<String>,
    pub wechat_cookies: Option<String>,
}

/// 定时任务配置（6 段 cron，含秒）
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub hourly_monitor: String,
    pub daily_monitor: String,
    pub weekly_monitor: String,
    pub daily_check: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// pretty / json
    pub format: String,
    pub level: Option<String>,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 加载顺序：内置默认值 → `config/default` → `config/{APP_ENVIRONMENT}` → `GWYCRAWL__*` 环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("GWYCRAWL")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("fetcher.user_agents")
                    .with_list_parse_key("parsers.html.keywords")
                    .with_list_parse_key("reminder.default_offsets_minutes"),
            );

        builder.build()?.try_deserialize()
    }

    /// 内置默认值
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database.url", "postgres://localhost/gwycrawl")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9000)?
            // Broker
            .set_default("broker.key_prefix", "gwycrawl")?
            .set_default("broker.concurrency", 8)?
            .set_default("broker.retry_max", 3)?
            .set_default("broker.retry_base_secs", 30)?
            .set_default("broker.queue_weights.critical", 6)?
            .set_default("broker.queue_weights.default", 3)?
            .set_default("broker.queue_weights.low", 1)?
            .set_default("broker.unique_ttl_secs", 86400)?
            .set_default("broker.poll_interval_ms", 1000)?
            .set_default("broker.task_timeout_secs", 30)?
            .set_default("broker.backpressure_threshold", 1000)?
            .set_default("broker.lease_secs", 600)?
            .set_default("broker.maintenance_interval_secs", 60)?
            // Fetcher
            .set_default("fetcher.rps_per_host", 2)?
            .set_default("fetcher.burst", 4)?
            .set_default("fetcher.max_in_flight_per_host", 2)?
            .set_default("fetcher.max_bytes", 8 * 1024 * 1024)?
            .set_default("fetcher.max_document_bytes", 32 * 1024 * 1024)?
            .set_default("fetcher.timeout", 30)?
            .set_default("fetcher.retry_attempts", 3)?
            .set_default(
                "fetcher.user_agents",
                vec![
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
                    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36 Edg/124.0",
                ],
            )?
            // LLM
            .set_default("llm.provider", "openai")?
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.api_url", "https://api.openai.com/v1")?
            .set_default("llm.max_input_tokens", 8000)?
            .set_default("llm.max_output_tokens", 4000)?
            .set_default("llm.temperature", 0.1)?
            .set_default("llm.confidence_threshold", 85)?
            .set_default("llm.timeout", 60)?
            .set_default("llm.max_clean_chars", 32000)?
            .set_default("llm.discovery_cache_size", 256)?
            // OCR
            .set_default("ocr.engine", "tesseract")?
            .set_default("ocr.language", "chi_sim+eng")?
            .set_default("ocr.tesseract_cmd", "tesseract")?
            .set_default("ocr.pdftoppm_cmd", "pdftoppm")?
            .set_default("ocr.timeout", 60)?
            // Parsers
            .set_default(
                "parsers.html.keywords",
                vec!["职位", "岗位", "部门", "学历", "专业", "人数"],
            )?
            .set_default("parsers.document_timeout", 120)?
            .set_default("parsers.max_attachments", 5)?
            .set_default("parsers.default_max_pages", 3)?
            // Reminder
            .set_default("reminder.quiet_hours_start", 22)?
            .set_default("reminder.quiet_hours_end", 8)?
            .set_default("reminder.utc_offset_hours", 8)?
            .set_default("reminder.daily_cap", 20)?
            .set_default("reminder.calendar_lookahead_hours", 48)?
            .set_default("reminder.deadline_lookahead_hours", 72)?
            .set_default("reminder.default_offsets_minutes", vec![1440, 60])?
            // Search
            .set_default("search.index", "positions")?
            // Schedule
            .set_default("schedule.enabled", true)?
            .set_default("schedule.hourly_monitor", "0 0 * * * *")?
            .set_default("schedule.daily_monitor", "0 30 6 * * *")?
            .set_default("schedule.weekly_monitor", "0 0 7 * * Mon")?
            .set_default("schedule.daily_check", "0 0 8 * * *")?
            // Log
            .set_default("log.format", "pretty")
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
