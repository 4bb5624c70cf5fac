// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::context::{enqueue_unique, ReminderDeps};
use crate::domain::models::reminder::{
    AnnouncementPushPayload, CalendarReminderPayload, DailyCheckPayload,
    RegistrationReminderPayload, SubscriptionPushPayload,
};
use crate::domain::models::task::TaskKind;
use crate::queue::handler::decode_payload;
use crate::queue::{EnqueueOptions, HandlerOutcome, TaskContext, TaskHandler};
use crate::utils::errors::PipelineError;

fn notified(ctx: &TaskContext, id: Option<i64>) {
    match id {
        Some(id) => ctx.set_result(json!({ "notification_id": id })),
        None => ctx.set_result(json!({ "skipped": true })),
    }
}

/// 日历提醒（`reminder:calendar`）
pub struct CalendarReminderHandler {
    deps: Arc<ReminderDeps>,
}

impl CalendarReminderHandler {
    pub fn new(deps: Arc<ReminderDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: CalendarReminderPayload = decode_payload(payload)?;
        let sent = self.deps.service.calendar_reminder(&payload, Utc::now()).await?;
        notified(ctx, sent.map(|n| n.id));
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for CalendarReminderHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}

/// 报名截止提醒（`reminder:registration`）
pub struct RegistrationReminderHandler {
    deps: Arc<ReminderDeps>,
}

impl RegistrationReminderHandler {
    pub fn new(deps: Arc<ReminderDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: RegistrationReminderPayload = decode_payload(payload)?;
        let sent = self
            .deps
            .service
            .registration_reminder(&payload, Utc::now())
            .await?;
        notified(ctx, sent.map(|n| n.id));
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for RegistrationReminderHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}

/// 新公告推送（`reminder:announcement_push`）
pub struct AnnouncementPushHandler {
    deps: Arc<ReminderDeps>,
}

impl AnnouncementPushHandler {
    pub fn new(deps: Arc<ReminderDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: AnnouncementPushPayload = decode_payload(payload)?;
        let sent = self.deps.service.announcement_push(&payload, Utc::now()).await?;
        ctx.set_result(json!({ "sent": sent }));
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for AnnouncementPushHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}

/// 订阅汇总推送（`reminder:subscription_push`）
pub struct SubscriptionPushHandler {
    deps: Arc<ReminderDeps>,
}

impl SubscriptionPushHandler {
    pub fn new(deps: Arc<ReminderDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: SubscriptionPushPayload = decode_payload(payload)?;
        let sent = self.deps.service.subscription_push(&payload, Utc::now()).await?;
        notified(ctx, sent.map(|n| n.id));
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for SubscriptionPushHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}

/// 每日提醒检查（`reminder:daily_check`）
///
/// 生成当天计划后逐条入队。唯一键含日期，同一天重复执行不会重复提醒。
pub struct DailyCheckHandler {
    deps: Arc<ReminderDeps>,
}

impl DailyCheckHandler {
    pub fn new(deps: Arc<ReminderDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: DailyCheckPayload = decode_payload(payload)?;
        let service = &self.deps.service;
        let broker = &self.deps.broker;
        let now = Utc::now();
        let date = payload
            .check_date
            .unwrap_or_else(|| service.policy().local_date(now));

        let plan = service.plan_daily(date, now).await?;
        let mut enqueued = 0usize;

        for (reminder, fire_at) in &plan.calendar {
            ctx.checkpoint()?;
            let key = format!(
                "calendar:{}:{}:{}:{}",
                reminder.event_id, reminder.user_id, reminder.offset_minutes, date
            );
            let opts = EnqueueOptions::default()
                .unique(key)
                .process_at(*fire_at)
                .deadline(reminder.event_time);
            if enqueue_unique(broker, TaskKind::CalendarReminder, reminder, opts).await? {
                enqueued += 1;
            }
        }

        for reminder in &plan.registration {
            ctx.checkpoint()?;
            let key = format!("registration:{}:{}:{}", reminder.position_id, reminder.user_id, date);
            let opts = EnqueueOptions::default()
                .unique(key)
                .process_at(service.policy().shift_out_of_quiet(now));
            if enqueue_unique(broker, TaskKind::RegistrationReminder, reminder, opts).await? {
                enqueued += 1;
            }
        }

        for push in &plan.subscriptions {
            ctx.checkpoint()?;
            let key = format!("subscription:{}:{}", push.subscription_id, date);
            let opts = EnqueueOptions::default().unique(key);
            if enqueue_unique(broker, TaskKind::SubscriptionPush, push, opts).await? {
                enqueued += 1;
            }
        }

        if plan.is_empty() {
            debug!(%date, "今日无提醒");
        }
        info!(%date, planned = plan.len(), enqueued, "每日提醒检查完成");
        ctx.set_result(json!({
            "date": date.to_string(),
            "calendar": plan.calendar.len(),
            "registration": plan.registration.len(),
            "subscriptions": plan.subscriptions.len(),
            "enqueued": enqueued,
        }));
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for DailyCheckHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}
