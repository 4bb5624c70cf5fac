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

use gwycrawl::config::settings::Settings;
use gwycrawl::domain::repositories::llm_config_repository::LlmConfigRepository;
use gwycrawl::domain::services::content_cleaner::ContentCleaner;
use gwycrawl::domain::services::list_discovery::{ListDiscoveryService, ListPageAdvisor};
use gwycrawl::domain::services::llm_config_service::LlmConfigService;
use gwycrawl::domain::services::llm_service::{HttpLlmClient, LlmService};
use gwycrawl::domain::services::position_extractor::PositionExtractor;
use gwycrawl::domain::services::reconciler::Reconciler;
use gwycrawl::domain::services::reminder_service::ReminderService;
use gwycrawl::engines::traits::Fetcher;
use gwycrawl::engines::PoliteFetcher;
use gwycrawl::infrastructure::database::connection;
use gwycrawl::infrastructure::repositories::*;
use gwycrawl::infrastructure::sources::{FenbiSource, SourceRegistry, WechatMpSource};
use gwycrawl::infrastructure::{metrics, notifications, search};
use gwycrawl::parsers::ocr::build_ocr_engine;
use gwycrawl::parsers::DocumentParser;
use gwycrawl::presentation::routes;
use gwycrawl::queue::cron::CronScheduler;
use gwycrawl::queue::memory_backend::MemoryBackend;
use gwycrawl::queue::redis_backend::RedisBackend;
use gwycrawl::queue::scheduler::TaskScheduler;
use gwycrawl::queue::{Broker, BrokerBackend, BrokerConfig};
use gwycrawl::utils::telemetry;
use gwycrawl::workers::{self, CrawlerDeps, FetchLimits, ReminderDeps, WorkerManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 工作进程收到停止信号后的等待上限
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration and initialize logging
    let settings = Arc::new(Settings::new()?);
    telemetry::init_telemetry(&settings.log);
    info!("Starting gwycrawl...");

    let metrics_handle = metrics::init_metrics()?;

    // 2. Connect to database and apply migrations
    let db = Arc::new(connection::connect_and_migrate(&settings.database).await?);
    info!("Database connection established");

    let list_pages = Arc::new(ListPageRepositoryImpl::new(db.clone()));
    let articles = Arc::new(ArticleRepositoryImpl::new(db.clone()));
    let announcements = Arc::new(AnnouncementRepositoryImpl::new(db.clone()));
    let positions = Arc::new(PositionRepositoryImpl::new(db.clone()));
    let tasks = Arc::new(CrawlTaskRepositoryImpl::new(db.clone()));
    let logs = Arc::new(CrawlLogRepositoryImpl::new(db.clone()));
    let llm_configs = Arc::new(LlmConfigRepositoryImpl::new(db.clone()));
    let notification_repo = Arc::new(NotificationRepositoryImpl::new(db.clone()));
    let reminder_sources = Arc::new(ReminderSourceRepositoryImpl::new(db.clone()));

    // 3. Broker
    let backend: Arc<dyn BrokerBackend> = match settings.broker.redis_addr.as_deref() {
        Some(addr) if !addr.is_empty() => {
            let redis = RedisBackend::new(addr, &settings.broker.key_prefix)?;
            redis.ping().await?;
            info!("Redis broker backend connected");
            Arc::new(redis)
        }
        _ => {
            warn!("broker.redis_addr 未配置，使用进程内队列");
            Arc::new(MemoryBackend::new())
        }
    };
    let broker = Arc::new(Broker::new(
        backend,
        tasks.clone(),
        logs.clone(),
        BrokerConfig::from(&settings.broker),
    ));

    // 4. Fetcher, LLM and parsers
    let fetcher: Arc<dyn Fetcher> = Arc::new(PoliteFetcher::new(&settings.fetcher)?);
    let limits = FetchLimits::from_settings(&settings);

    let llm_pool = Arc::new(LlmConfigService::new(llm_configs.clone(), &settings.llm));
    let llm_available = llm_configs.find_default_enabled().await?.is_some()
        || HttpLlmClient::from_settings(&settings.llm).is_ok();
    let llm = if llm_available {
        Some(Arc::new(LlmService::new(llm_pool, &settings.llm)))
    } else {
        warn!("未配置可用的 LLM，清洗与提取退化为规则实现");
        None
    };

    let ocr = build_ocr_engine(&settings.ocr)?;
    let parser = Arc::new(DocumentParser::new(&settings.parsers, ocr));
    let cleaner = Arc::new(ContentCleaner::new(llm.clone(), settings.llm.max_clean_chars));
    let extractor = Arc::new(PositionExtractor::new(llm.clone()));
    let advisor = llm
        .clone()
        .map(|llm| Arc::new(ListPageAdvisor::new(llm, settings.llm.discovery_cache_size)));
    let discovery = Arc::new(ListDiscoveryService::new(
        fetcher.clone(),
        list_pages.clone(),
        limits.timeout,
        limits.max_bytes,
    ));

    let index = search::create_index(&settings.search, limits.timeout);
    info!(index = index.name(), "Search index ready");
    let reconciler = Arc::new(Reconciler::new(positions.clone(), logs.clone(), index));

    let mut sources = SourceRegistry::new();
    sources
        .register(Arc::new(FenbiSource::new(
            fetcher.clone(),
            settings.sources.fenbi_cookies.clone(),
            limits.timeout,
        )))
        .register(Arc::new(WechatMpSource::new(
            fetcher.clone(),
            settings.sources.wechat_token.clone(),
            settings.sources.wechat_cookies.clone(),
            limits.timeout,
        )));

    // 5. Reminder service
    let channels = notifications::create_channels(&settings.reminder, limits.timeout);
    let reminder_service = Arc::new(ReminderService::new(
        notification_repo,
        reminder_sources,
        positions,
        announcements.clone(),
        channels,
        &settings.reminder,
    ));

    // 6. Start workers
    let crawler = Arc::new(CrawlerDeps {
        broker: broker.clone(),
        fetcher,
        sources,
        list_pages,
        articles,
        announcements,
        logs,
        cleaner,
        extractor,
        parser,
        reconciler,
        advisor,
        discovery,
        limits,
        backpressure_threshold: settings.broker.backpressure_threshold,
    });
    let reminders = Arc::new(ReminderDeps {
        broker: broker.clone(),
        service: reminder_service,
    });

    let shutdown = CancellationToken::new();
    let mut worker_manager = WorkerManager::new(
        broker.clone(),
        workers::handler_table(crawler, reminders),
        shutdown.child_token(),
    );
    worker_manager.start_workers(settings.broker.concurrency);

    // 7. Maintenance and cron
    let maintenance = TaskScheduler::new(
        broker.clone(),
        Duration::from_secs(settings.broker.maintenance_interval_secs.max(1)),
    )
    .start(shutdown.clone());

    let cron = if settings.schedule.enabled {
        let cron = Arc::new(CronScheduler::new(broker.clone(), Duration::from_secs(1)));
        cron.register_defaults(&settings.schedule)?;
        Some(cron.start(shutdown.clone()))
    } else {
        info!("schedule.enabled = false，不注册周期任务");
        None
    };

    // 8. Start HTTP server
    let app = routes::routes(broker.clone(), metrics_handle);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
            }
            server_shutdown.cancel();
        })
        .await?;

    worker_manager.shutdown(SHUTDOWN_GRACE).await;
    let _ = maintenance.await;
    if let Some(cron) = cron {
        let _ = cron.await;
    }
    info!("gwycrawl stopped");

    Ok(())
}
