// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::FixedOffset;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::settings::Settings;
use crate::domain::models::crawl_log::CrawlLog;
use crate::domain::models::task::TaskKind;
use crate::domain::repositories::announcement_repository::AnnouncementRepository;
use crate::domain::repositories::article_repository::ArticleRepository;
use crate::domain::repositories::crawl_log_repository::CrawlLogRepository;
use crate::domain::repositories::list_page_repository::ListPageRepository;
use crate::domain::services::content_cleaner::ContentCleaner;
use crate::domain::services::list_discovery::{ListDiscoveryService, ListPageAdvisor};
use crate::domain::services::position_extractor::PositionExtractor;
use crate::domain::services::reconciler::Reconciler;
use crate::domain::services::reminder_service::ReminderService;
use crate::engines::traits::Fetcher;
use crate::infrastructure::sources::SourceRegistry;
use crate::parsers::DocumentParser;
use crate::queue::{Broker, BrokerError, EnqueueOptions};
use crate::utils::errors::PipelineError;

/// 公告发布日期所在时区（北京时间）
pub fn publish_offset() -> Option<FixedOffset> {
    FixedOffset::east_opt(8 * 3600)
}

/// 抓取相关的大小与时间上限
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub timeout: Duration,
    /// 页面响应体上限
    pub max_bytes: usize,
    /// 附件与文档响应体上限
    pub max_document_bytes: usize,
    /// 每篇公告最多解析的附件数
    pub max_attachments: usize,
}

impl FetchLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.fetcher.timeout),
            max_bytes: settings.fetcher.max_bytes,
            max_document_bytes: settings.fetcher.max_document_bytes,
            max_attachments: settings.parsers.max_attachments,
        }
    }
}

/// 抓取类处理器共享的依赖
///
/// 启动时构造一次，显式传给每个处理器。
pub struct CrawlerDeps {
    pub broker: Arc<Broker>,
    pub fetcher: Arc<dyn Fetcher>,
    pub sources: SourceRegistry,
    pub list_pages: Arc<dyn ListPageRepository>,
    pub articles: Arc<dyn ArticleRepository>,
    pub announcements: Arc<dyn AnnouncementRepository>,
    pub logs: Arc<dyn CrawlLogRepository>,
    pub cleaner: Arc<ContentCleaner>,
    pub extractor: Arc<PositionExtractor>,
    pub parser: Arc<DocumentParser>,
    pub reconciler: Arc<Reconciler>,
    /// 未配置 LLM 时为空
    pub advisor: Option<Arc<ListPageAdvisor>>,
    pub discovery: Arc<ListDiscoveryService>,
    pub limits: FetchLimits,
    /// 任一队列积压超过该值时定时监控跳过本轮
    pub backpressure_threshold: u64,
}

impl CrawlerDeps {
    /// 写入任务日志；失败只记录告警
    pub async fn log_warn(&self, task_id: Uuid, message: impl Into<String>) {
        if let Err(e) = self.logs.append(&CrawlLog::warn(Some(task_id), message)).await {
            warn!(task_id = %task_id, "写入任务日志失败: {}", e);
        }
    }
}

/// 提醒类处理器共享的依赖
pub struct ReminderDeps {
    pub broker: Arc<Broker>,
    pub service: Arc<ReminderService>,
}

/// 带唯一键入队；唯一键仍在窗口期内视为成功的空操作
///
/// # 返回值
///
/// * `Ok(true)` - 新任务已入队
/// * `Ok(false)` - 同一唯一键的任务已存在
pub async fn enqueue_unique<P: Serialize>(
    broker: &Broker,
    kind: TaskKind,
    payload: &P,
    opts: EnqueueOptions,
) -> Result<bool, PipelineError> {
    match broker.enqueue_payload(kind, payload, opts).await {
        Ok(_) => Ok(true),
        Err(BrokerError::AlreadyQueued(key)) => {
            debug!(kind = %kind, key = %key, "任务已存在，跳过入队");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
