// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供各任务类型的处理器、任务工作器循环与工作器生命周期管理
pub mod article_fetch;
pub mod context;
pub mod list_discovery;
pub mod list_monitor;
pub mod manager;
pub mod position_extract;
pub mod reminder_handlers;
pub mod scheduled_monitor;
pub mod task_worker;
pub mod worker;

use std::sync::Arc;

use crate::domain::models::task::TaskKind;
use crate::queue::HandlerTable;

pub use context::{CrawlerDeps, FetchLimits, ReminderDeps};
pub use manager::WorkerManager;
pub use task_worker::TaskWorker;
pub use worker::Worker;

/// 注册全部任务类型的处理器
pub fn handler_table(crawler: Arc<CrawlerDeps>, reminders: Arc<ReminderDeps>) -> HandlerTable {
    use article_fetch::ArticleFetchHandler;
    use list_discovery::ListDiscoveryHandler;
    use list_monitor::ListMonitorHandler;
    use position_extract::PositionExtractHandler;
    use reminder_handlers::*;
    use scheduled_monitor::ScheduledMonitorHandler;

    let mut table = HandlerTable::new();
    table
        .register(TaskKind::ListMonitor, Arc::new(ListMonitorHandler::new(crawler.clone())))
        .register(TaskKind::ListDiscovery, Arc::new(ListDiscoveryHandler::new(crawler.clone())))
        .register(TaskKind::ArticleFetch, Arc::new(ArticleFetchHandler::new(crawler.clone())))
        .register(TaskKind::PositionExtract, Arc::new(PositionExtractHandler::new(crawler.clone())))
        .register(TaskKind::ScheduledMonitor, Arc::new(ScheduledMonitorHandler::new(crawler)))
        .register(TaskKind::CalendarReminder, Arc::new(CalendarReminderHandler::new(reminders.clone())))
        .register(
            TaskKind::RegistrationReminder,
            Arc::new(RegistrationReminderHandler::new(reminders.clone())),
        )
        .register(TaskKind::AnnouncementPush, Arc::new(AnnouncementPushHandler::new(reminders.clone())))
        .register(TaskKind::SubscriptionPush, Arc::new(SubscriptionPushHandler::new(reminders.clone())))
        .register(TaskKind::DailyCheck, Arc::new(DailyCheckHandler::new(reminders)));
    table
}
