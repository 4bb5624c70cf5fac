// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 单元测试共用的夹具：内存 SQLite、仓库集合、抓取器与种子数据

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;

use crate::config::settings::Settings;
use crate::domain::models::announcement::Announcement;
use crate::domain::models::notification::Contact;
use crate::domain::models::reminder::SubscribeType;
use crate::domain::repositories::announcement_repository::AnnouncementRepository;
use crate::domain::repositories::article_repository::ArticleRepository;
use crate::domain::repositories::crawl_log_repository::CrawlLogRepository;
use crate::domain::repositories::list_page_repository::ListPageRepository;
use crate::domain::repositories::llm_config_repository::LlmConfigRepository;
use crate::domain::repositories::notification_repository::NotificationRepository;
use crate::domain::repositories::position_repository::PositionRepository;
use crate::domain::repositories::reminder_repository::ReminderSourceRepository;
use crate::domain::repositories::task_repository::CrawlTaskRepository;
use crate::domain::search::index::{IndexError, PositionDocument, SearchIndex};
use crate::domain::services::content_cleaner::ContentCleaner;
use crate::domain::services::list_discovery::ListDiscoveryService;
use crate::domain::services::position_extractor::PositionExtractor;
use crate::domain::services::reconciler::Reconciler;
use crate::domain::services::reminder_service::{NotificationChannel, ReminderService};
use crate::engines::traits::Fetcher;
use crate::engines::PoliteFetcher;
use crate::infrastructure::repositories::*;
use crate::infrastructure::sources::SourceRegistry;
use crate::parsers::DocumentParser;
use crate::queue::memory_backend::MemoryBackend;
use crate::queue::{Broker, BrokerConfig};
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::{CrawlerDeps, FetchLimits, ReminderDeps};

/// 内置默认值，放宽抓取限速以适配本地模拟服务
pub fn settings() -> Settings {
    Settings::defaults()
        .and_then(|b| b.set_override("fetcher.rps_per_host", 1000))
        .and_then(|b| b.set_override("fetcher.burst", 1000))
        .and_then(|b| b.set_override("fetcher.max_in_flight_per_host", 16))
        .and_then(|b| b.set_override("fetcher.timeout", 5))
        .and_then(|b| b.build())
        .and_then(|c| c.try_deserialize())
        .unwrap()
}

/// 已迁移的内存 SQLite；只保留一个连接，否则每个连接各是一个库
pub async fn memory_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

/// 全部仓库，共享同一个连接
#[derive(Clone)]
pub struct Repositories {
    pub list_pages: Arc<dyn ListPageRepository>,
    pub articles: Arc<dyn ArticleRepository>,
    pub announcements: Arc<dyn AnnouncementRepository>,
    pub positions: Arc<dyn PositionRepository>,
    pub tasks: Arc<dyn CrawlTaskRepository>,
    pub logs: Arc<dyn CrawlLogRepository>,
    pub llm_configs: Arc<dyn LlmConfigRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub reminders: Arc<dyn ReminderSourceRepository>,
}

pub fn repositories(db: &DatabaseConnection) -> Repositories {
    let db = Arc::new(db.clone());
    Repositories {
        list_pages: Arc::new(ListPageRepositoryImpl::new(db.clone())),
        articles: Arc::new(ArticleRepositoryImpl::new(db.clone())),
        announcements: Arc::new(AnnouncementRepositoryImpl::new(db.clone())),
        positions: Arc::new(PositionRepositoryImpl::new(db.clone())),
        tasks: Arc::new(CrawlTaskRepositoryImpl::new(db.clone())),
        logs: Arc::new(CrawlLogRepositoryImpl::new(db.clone())),
        llm_configs: Arc::new(LlmConfigRepositoryImpl::new(db.clone())),
        notifications: Arc::new(NotificationRepositoryImpl::new(db.clone())),
        reminders: Arc::new(ReminderSourceRepositoryImpl::new(db)),
    }
}

/// 真实抓取器，重试退避压到毫秒级
pub fn fetcher() -> Arc<dyn Fetcher> {
    let fetcher = PoliteFetcher::new(&settings().fetcher)
        .unwrap()
        .with_retry_policy(RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            ..RetryPolicy::fast(2)
        });
    Arc::new(fetcher)
}

/// 记录写入文档的搜索索引
#[derive(Default)]
pub struct RecordingIndex {
    documents: Mutex<Vec<PositionDocument>>,
}

impl RecordingIndex {
    pub fn documents(&self) -> Vec<PositionDocument> {
        self.documents.lock().clone()
    }
}

#[async_trait]
impl SearchIndex for RecordingIndex {
    async fn upsert(&self, document: &PositionDocument) -> Result<(), IndexError> {
        self.documents.lock().push(document.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// 进程内队列，重试不退避
pub fn broker(repos: &Repositories) -> Arc<Broker> {
    let config = BrokerConfig {
        retry_base: Duration::from_millis(0),
        poll_interval: Duration::from_millis(20),
        ..BrokerConfig::default()
    };
    Arc::new(Broker::new(
        Arc::new(MemoryBackend::new()),
        repos.tasks.clone(),
        repos.logs.clone(),
        config,
    ))
}

pub fn fetch_limits() -> FetchLimits {
    FetchLimits::from_settings(&settings())
}

/// 不带 LLM 与 OCR 的抓取依赖，归并结果写入 `index`
pub fn crawler_deps(
    repos: &Repositories,
    broker: Arc<Broker>,
    limits: FetchLimits,
    index: Arc<dyn SearchIndex>,
) -> CrawlerDeps {
    let settings = settings();
    let fetcher = fetcher();
    CrawlerDeps {
        broker,
        fetcher: fetcher.clone(),
        sources: SourceRegistry::new(),
        list_pages: repos.list_pages.clone(),
        articles: repos.articles.clone(),
        announcements: repos.announcements.clone(),
        logs: repos.logs.clone(),
        cleaner: Arc::new(ContentCleaner::new(None, settings.llm.max_clean_chars)),
        extractor: Arc::new(PositionExtractor::new(None)),
        parser: Arc::new(DocumentParser::new(&settings.parsers, None)),
        reconciler: Arc::new(Reconciler::new(repos.positions.clone(), repos.logs.clone(), index)),
        advisor: None,
        discovery: Arc::new(ListDiscoveryService::new(
            fetcher,
            repos.list_pages.clone(),
            limits.timeout,
            limits.max_bytes,
        )),
        limits,
        backpressure_threshold: settings.broker.backpressure_threshold,
    }
}

pub fn reminder_deps(
    repos: &Repositories,
    broker: Arc<Broker>,
    channels: Vec<Arc<dyn NotificationChannel>>,
) -> ReminderDeps {
    let service = ReminderService::new(
        repos.notifications.clone(),
        repos.reminders.clone(),
        repos.positions.clone(),
        repos.announcements.clone(),
        channels,
        &settings().reminder,
    );
    ReminderDeps {
        broker,
        service: Arc::new(service),
    }
}

fn reminder_repo(db: &DatabaseConnection) -> ReminderSourceRepositoryImpl {
    ReminderSourceRepositoryImpl::new(Arc::new(db.clone()))
}

/// 写入一条公告，返回 id
pub async fn seed_announcement(repos: &Repositories, url: &str) -> i64 {
    let mut announcement = Announcement::new(url, "2025年度公务员招录公告");
    announcement.content = "报名时间为11月1日至11月10日".to_string();
    repos.announcements.create(&announcement).await.unwrap().id
}

pub async fn seed_favorite(db: &DatabaseConnection, user_id: i64, position_id: &str) {
    reminder_repo(db).add_favorite(user_id, position_id).await.unwrap();
}

pub async fn seed_subscription(
    db: &DatabaseConnection,
    user_id: i64,
    subscribe_type: SubscribeType,
    value: &str,
) -> i64 {
    reminder_repo(db)
        .add_subscription(user_id, subscribe_type, value, value)
        .await
        .unwrap()
        .id
}

pub async fn seed_contact(db: &DatabaseConnection, contact: &Contact) {
    reminder_repo(db).upsert_contact(contact).await.unwrap();
}

pub async fn seed_calendar_event(
    db: &DatabaseConnection,
    user_id: i64,
    title: &str,
    event_time: DateTime<Utc>,
    offsets_minutes: Vec<i64>,
) -> i64 {
    reminder_repo(db)
        .add_event(user_id, title, event_time, &offsets_minutes)
        .await
        .unwrap()
        .id
}
