// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use gwycrawl::config::settings::Settings;
use gwycrawl::domain::models::task::QueueName;
use gwycrawl::domain::repositories::announcement_repository::AnnouncementRepository;
use gwycrawl::domain::repositories::list_page_repository::ListPageRepository;
use gwycrawl::domain::repositories::notification_repository::NotificationRepository;
use gwycrawl::domain::repositories::position_repository::PositionRepository;
use gwycrawl::domain::repositories::task_repository::CrawlTaskRepository;
use gwycrawl::domain::search::index::{IndexError, PositionDocument, SearchIndex};
use gwycrawl::domain::services::content_cleaner::ContentCleaner;
use gwycrawl::domain::services::list_discovery::ListDiscoveryService;
use gwycrawl::domain::services::position_extractor::PositionExtractor;
use gwycrawl::domain::services::reconciler::Reconciler;
use gwycrawl::domain::services::reminder_service::ReminderService;
use gwycrawl::engines::PoliteFetcher;
use gwycrawl::infrastructure::repositories::*;
use gwycrawl::infrastructure::sources::SourceRegistry;
use gwycrawl::parsers::DocumentParser;
use gwycrawl::queue::memory_backend::MemoryBackend;
use gwycrawl::queue::{Broker, BrokerConfig};
use gwycrawl::utils::retry_policy::RetryPolicy;
use gwycrawl::workers::{self, CrawlerDeps, FetchLimits, ReminderDeps, WorkerManager};
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// 本地模拟服务用的配置：放开限速，关闭免打扰
pub fn test_settings() -> Settings {
    Settings::defaults()
        .and_then(|b| b.set_override("fetcher.rps_per_host", 1000))
        .and_then(|b| b.set_override("fetcher.burst", 1000))
        .and_then(|b| b.set_override("fetcher.max_in_flight_per_host", 16))
        .and_then(|b| b.set_override("fetcher.timeout", 5))
        .and_then(|b| b.set_override("reminder.quiet_hours_start", 0))
        .and_then(|b| b.set_override("reminder.quiet_hours_end", 0))
        .and_then(|b| b.build())
        .and_then(|c| c.try_deserialize())
        .expect("测试配置无效")
}

#[derive(Default)]
pub struct RecordingIndex {
    documents: Mutex<Vec<PositionDocument>>,
}

impl RecordingIndex {
    pub fn len(&self) -> usize {
        self.documents.lock().len()
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

#[allow(dead_code)]
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub broker: Arc<Broker>,
    pub list_pages: Arc<ListPageRepositoryImpl>,
    pub announcements: Arc<AnnouncementRepositoryImpl>,
    pub positions: Arc<PositionRepositoryImpl>,
    pub tasks: Arc<CrawlTaskRepositoryImpl>,
    pub notifications: Arc<NotificationRepositoryImpl>,
    pub reminders: Arc<ReminderSourceRepositoryImpl>,
    pub index: Arc<RecordingIndex>,
    manager: Option<WorkerManager>,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_options(true).await
}

pub async fn create_test_app_no_worker() -> TestApp {
    create_test_app_with_options(false).await
}

async fn create_test_app_with_options(start_worker: bool) -> TestApp {
    let settings = test_settings();

    // 内存库只能有一个连接，否则每个连接各是一个库
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("连接测试数据库失败");
    Migrator::up(&db, None).await.expect("迁移失败");
    let db = Arc::new(db);

    let list_pages = Arc::new(ListPageRepositoryImpl::new(db.clone()));
    let articles = Arc::new(ArticleRepositoryImpl::new(db.clone()));
    let announcements = Arc::new(AnnouncementRepositoryImpl::new(db.clone()));
    let positions = Arc::new(PositionRepositoryImpl::new(db.clone()));
    let tasks = Arc::new(CrawlTaskRepositoryImpl::new(db.clone()));
    let logs = Arc::new(CrawlLogRepositoryImpl::new(db.clone()));
    let notifications = Arc::new(NotificationRepositoryImpl::new(db.clone()));
    let reminders = Arc::new(ReminderSourceRepositoryImpl::new(db.clone()));

    let broker = Arc::new(Broker::new(
        Arc::new(MemoryBackend::new()),
        tasks.clone(),
        logs.clone(),
        BrokerConfig {
            retry_base: Duration::from_millis(0),
            poll_interval: Duration::from_millis(20),
            ..BrokerConfig::from(&settings.broker)
        },
    ));

    // 重试交给队列，抓取器本身不重试
    let fetcher = Arc::new(
        PoliteFetcher::new(&settings.fetcher)
            .expect("抓取器初始化失败")
            .with_retry_policy(RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::fast(0)
            }),
    );
    let limits = FetchLimits::from_settings(&settings);
    let index = Arc::new(RecordingIndex::default());

    let crawler = Arc::new(CrawlerDeps {
        broker: broker.clone(),
        fetcher: fetcher.clone(),
        sources: SourceRegistry::new(),
        list_pages: list_pages.clone(),
        articles,
        announcements: announcements.clone(),
        logs: logs.clone(),
        cleaner: Arc::new(ContentCleaner::new(None, settings.llm.max_clean_chars)),
        extractor: Arc::new(PositionExtractor::new(None)),
        parser: Arc::new(DocumentParser::new(&settings.parsers, None)),
        reconciler: Arc::new(Reconciler::new(positions.clone(), logs, index.clone())),
        advisor: None,
        discovery: Arc::new(ListDiscoveryService::new(
            fetcher,
            list_pages.clone(),
            limits.timeout,
            limits.max_bytes,
        )),
        limits,
        backpressure_threshold: settings.broker.backpressure_threshold,
    });
    let reminder_deps = Arc::new(ReminderDeps {
        broker: broker.clone(),
        service: Arc::new(ReminderService::new(
            notifications.clone(),
            reminders.clone(),
            positions.clone(),
            announcements.clone(),
            Vec::new(),
            &settings.reminder,
        )),
    });

    let manager = if start_worker {
        let mut manager = WorkerManager::new(
            broker.clone(),
            workers::handler_table(crawler, reminder_deps),
            CancellationToken::new(),
        );
        manager.start_workers(2);
        Some(manager)
    } else {
        None
    };

    TestApp {
        db,
        broker,
        list_pages,
        announcements,
        positions,
        tasks,
        notifications,
        reminders,
        index,
        manager,
    }
}

impl TestApp {
    /// 等待所有队列排空且没有在途任务
    pub async fn wait_idle(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut quiet_rounds = 0;
        while quiet_rounds < 3 {
            assert!(Instant::now() < deadline, "队列未在 {:?} 内排空", timeout);
            let mut busy = 0;
            for queue in QueueName::ALL {
                let stats = self.broker.inspect(queue).await.expect("读取队列状态失败");
                busy += stats.depth + stats.in_flight;
            }
            quiet_rounds = if busy == 0 { quiet_rounds + 1 } else { 0 };
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(manager) = self.manager.take() {
            manager.shutdown(Duration::from_secs(5)).await;
        }
    }
}

/// 列表页 HTML，`li.item a` 链接到 `/art/{n}.html`
pub fn list_html(count: usize) -> String {
    let items: String = (1..=count)
        .map(|n| {
            format!(
                r#"<li class="item"><a href="/art/{n}.html">第{n}批公务员招录公告</a><span>2025-03-0{d}</span></li>"#,
                n = n,
                d = n.min(9)
            )
        })
        .collect();
    format!(r#"<html><body><ul class="news">{}</ul></body></html>"#, items)
}

pub fn article_html(n: usize) -> String {
    format!(
        r#"<html><head><title>第{n}批公务员招录公告</title></head><body>
        <h1>第{n}批公务员招录公告</h1>
        <div class="content">
          <p>发布时间：2025-03-01</p>
          <p>根据公务员法有关规定，现将第{n}批公务员招录有关事项公告如下，报名时间为3月10日至3月20日。</p>
        </div></body></html>"#,
        n = n
    )
}

/// 返回已挂载的 NewListPage 所需的绝对地址
#[allow(dead_code)]
pub fn url(server: &wiremock::MockServer, path: &str) -> String {
    format!("{}{}", server.uri(), path)
}

#[allow(dead_code)]
pub async fn count_notifications(app: &TestApp, user_id: i64) -> u64 {
    app.notifications
        .count_for_user_since(user_id, chrono::Utc::now() - chrono::Duration::days(1))
        .await
        .expect("统计通知失败")
}

#[allow(dead_code)]
pub async fn announcement_exists(app: &TestApp, url: &str) -> bool {
    app.announcements
        .find_by_url(url)
        .await
        .expect("查询公告失败")
        .is_some()
}

#[allow(dead_code)]
pub async fn list_page_article_count(app: &TestApp, id: i64) -> i32 {
    app.list_pages
        .find_by_id(id)
        .await
        .expect("查询列表页失败")
        .expect("列表页不存在")
        .last_article_count
}

#[allow(dead_code)]
pub async fn task_attempts(app: &TestApp, task_id: uuid::Uuid) -> (i32, String) {
    let task = app
        .tasks
        .find_by_id(task_id)
        .await
        .expect("查询任务失败")
        .expect("任务不存在");
    (task.attempt_count, task.status.to_string())
}

#[allow(dead_code)]
pub async fn positions_for(app: &TestApp, announcement_id: i64) -> usize {
    app.positions
        .find_by_announcement(announcement_id)
        .await
        .expect("查询职位失败")
        .len()
}
