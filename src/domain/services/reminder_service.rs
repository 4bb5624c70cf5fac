// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Timelike, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::settings::ReminderSettings;
use crate::domain::models::notification::{
    ChannelType, Contact, Notification, NotificationDelivery, NotificationKind,
};
use crate::domain::models::reminder::{
    AnnouncementPushPayload, CalendarReminderPayload, RegistrationReminderPayload,
    SubscriptionPushPayload,
};
use crate::domain::repositories::announcement_repository::AnnouncementRepository;
use crate::domain::repositories::notification_repository::NotificationRepository;
use crate::domain::repositories::position_repository::PositionRepository;
use crate::domain::repositories::reminder_repository::ReminderSourceRepository;
use crate::utils::errors::PipelineError;

/// 渠道错误
#[derive(Debug, Error)]
pub enum ChannelError {
    /// 用户没有该渠道的联系方式
    #[error("缺少联系方式")]
    NoAddress,
    #[error("网关错误: {0}")]
    Gateway(String),
    #[error("网络错误: {0}")]
    Network(String),
}

/// 通知渠道
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    async fn send(&self, notification: &Notification, contact: &Contact) -> Result<(), ChannelError>;
}

/// 每日检查生成的待入队提醒
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DailyPlan {
    /// 日历提醒与触发时间
    pub calendar: Vec<(CalendarReminderPayload, DateTime<Utc>)>,
    pub registration: Vec<RegistrationReminderPayload>,
    pub subscriptions: Vec<SubscriptionPushPayload>,
}

impl DailyPlan {
    pub fn len(&self) -> usize {
        self.calendar.len() + self.registration.len() + self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 免打扰与每日上限
#[derive(Debug, Clone)]
pub struct ReminderPolicy {
    quiet_start: u32,
    quiet_end: u32,
    offset: FixedOffset,
    daily_cap: usize,
}

impl ReminderPolicy {
    pub fn from_settings(settings: &ReminderSettings) -> Self {
        let offset = FixedOffset::east_opt(settings.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        Self {
            quiet_start: settings.quiet_hours_start % 24,
            quiet_end: settings.quiet_hours_end % 24,
            offset,
            daily_cap: settings.daily_cap,
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 本地时间是否处于免打扰时段；时段可以跨越午夜
    pub fn is_quiet(&self, at: DateTime<Utc>) -> bool {
        let hour = at.with_timezone(&self.offset).hour();
        if self.quiet_start == self.quiet_end {
            false
        } else if self.quiet_start < self.quiet_end {
            hour >= self.quiet_start && hour < self.quiet_end
        } else {
            hour >= self.quiet_start || hour < self.quiet_end
        }
    }

    /// 落在免打扰时段内的触发时间提前到时段开始
    pub fn shift_out_of_quiet(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        if !self.is_quiet(at) {
            return at;
        }
        let local = at.with_timezone(&self.offset);
        let mut day = local.date_naive();
        if self.quiet_start > self.quiet_end && local.hour() < self.quiet_end {
            day = day.pred_opt().unwrap_or(day);
        }
        day.and_hms_opt(self.quiet_start, 0, 0)
            .and_then(|naive| self.offset.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(at)
    }

    /// 本地日期的零点（UTC）
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_hms_opt(0, 0, 0)
            .and_then(|naive| self.offset.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}

/// 提醒调度
///
/// 所有通知都经由这里写入，免打扰与每日上限只在此处生效。
/// 先持久化通知，再逐个渠道投递；渠道失败只记录，不影响任务结果。
pub struct ReminderService {
    notifications: Arc<dyn NotificationRepository>,
    sources: Arc<dyn ReminderSourceRepository>,
    positions: Arc<dyn PositionRepository>,
    announcements: Arc<dyn AnnouncementRepository>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    policy: ReminderPolicy,
    settings: ReminderSettings,
}

impl ReminderService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        sources: Arc<dyn ReminderSourceRepository>,
        positions: Arc<dyn PositionRepository>,
        announcements: Arc<dyn AnnouncementRepository>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        settings: &ReminderSettings,
    ) -> Self {
        Self {
            notifications,
            sources,
            positions,
            announcements,
            channels,
            policy: ReminderPolicy::from_settings(settings),
            settings: settings.clone(),
        }
    }

    pub fn policy(&self) -> &ReminderPolicy {
        &self.policy
    }

    /// 写入并投递一条通知
    ///
    /// 超过每日上限或今天已就同一来源通知过时返回 `None`。
    pub async fn notify(
        &self,
        notification: Notification,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, PipelineError> {
        let since = self.policy.day_start(self.policy.local_date(now));
        let user_id = notification.user_id;

        if !notification.source_type.is_empty()
            && self
                .notifications
                .exists_for_source(user_id, &notification.source_type, &notification.source_id, since)
                .await?
        {
            debug!(user_id, source = %notification.source_id, "今日已通知，跳过");
            return Ok(None);
        }

        let sent_today = self.notifications.count_for_user_since(user_id, since).await?;
        if sent_today >= self.policy.daily_cap as u64 {
            info!(user_id, sent_today, "已达每日通知上限");
            metrics::counter!("gwycrawl_notifications_capped_total").increment(1);
            return Ok(None);
        }

        let saved = self.notifications.create(&notification).await?;
        self.record(saved.id, ChannelType::InApp, Ok(())).await;

        if self.policy.is_quiet(now) {
            debug!(notification_id = saved.id, "免打扰时段，仅站内通知");
        } else {
            self.dispatch(&saved).await?;
        }
        metrics::counter!("gwycrawl_notifications_total", "kind" => saved.kind.as_str()).increment(1);
        Ok(Some(saved))
    }

    async fn dispatch(&self, notification: &Notification) -> Result<(), PipelineError> {
        if self.channels.is_empty() {
            return Ok(());
        }
        let Some(contact) = self.sources.contact_for(notification.user_id).await? else {
            return Ok(());
        };
        for channel in &self.channels {
            match channel.send(notification, &contact).await {
                Err(ChannelError::NoAddress) => continue,
                result => {
                    if let Err(e) = &result {
                        warn!(
                            notification_id = notification.id,
                            channel = channel.channel_type().as_str(),
                            "通知投递失败: {}",
                            e
                        );
                    }
                    self.record(notification.id, channel.channel_type(), result).await;
                }
            }
        }
        Ok(())
    }

    async fn record(&self, notification_id: i64, channel: ChannelType, result: Result<(), ChannelError>) {
        let delivery = NotificationDelivery {
            notification_id,
            channel,
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            delivered_at: Utc::now(),
        };
        if let Err(e) = self.notifications.record_delivery(&delivery).await {
            warn!(notification_id, "写入投递记录失败: {}", e);
        }
    }

    /// 日历事件提醒
    pub async fn calendar_reminder(
        &self,
        payload: &CalendarReminderPayload,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, PipelineError> {
        let Some(event) = self.sources.find_event(payload.event_id).await? else {
            info!(event_id = payload.event_id, "日历事件已删除，跳过提醒");
            return Ok(None);
        };
        let local = event.event_time.with_timezone(&self.policy.offset());
        let notification = Notification::new(
            payload.user_id,
            NotificationKind::CalendarReminder,
            format!("日程提醒：{}", event.title),
            format!("{} 将于 {} 开始", event.title, local.format("%m月%d日 %H:%M")),
            format!("/calendar?event={}", event.id),
        )
        .with_source("calendar_event", format!("{}:{}", event.id, payload.offset_minutes));
        self.notify(notification, now).await
    }

    /// 报名截止提醒
    pub async fn registration_reminder(
        &self,
        payload: &RegistrationReminderPayload,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, PipelineError> {
        let Some(position) = self.positions.find_by_key(&payload.position_id).await? else {
            return Ok(None);
        };
        let Some(deadline) = position.registration_end else {
            return Ok(None);
        };
        let notification = Notification::new(
            payload.user_id,
            NotificationKind::RegistrationReminder,
            format!("报名即将截止：{}", position.position_name),
            format!(
                "您收藏的 {} {} 将于 {} 截止报名，请尽快完成报名",
                position.department_name,
                position.position_name,
                deadline.format("%Y年%m月%d日")
            ),
            format!("/positions/{}", position.id),
        )
        .with_source("position", &position.position_id);
        self.notify(notification, now).await
    }

    /// 新公告按订阅推送；同一用户只通知一次
    pub async fn announcement_push(
        &self,
        payload: &AnnouncementPushPayload,
        now: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        let Some(announcement) = self.announcements.find_by_id(payload.announcement_id).await? else {
            return Ok(0);
        };
        let subscriptions = self.sources.active_subscriptions().await?;
        let mut notified_users = HashSet::new();
        let mut sent = 0;

        for sub in subscriptions {
            if notified_users.contains(&sub.user_id)
                || !sub.matches_announcement(
                    &announcement.title,
                    announcement.exam_type.as_deref(),
                    announcement.province.as_deref(),
                )
            {
                continue;
            }
            notified_users.insert(sub.user_id);
            let notification = Notification::new(
                sub.user_id,
                NotificationKind::AnnouncementPush,
                format!("新公告：{}", announcement.title),
                format!("您订阅的「{}」有新公告发布", sub.subscribe_name),
                format!("/announcements/{}", announcement.id),
            )
            .with_source("announcement", announcement.id);
            if self.notify(notification, now).await?.is_some() {
                sent += 1;
            }
        }
        info!(announcement_id = announcement.id, sent, "公告推送完成");
        Ok(sent)
    }

    /// 汇总订阅游标之后新增的匹配职位
    pub async fn subscription_push(
        &self,
        payload: &SubscriptionPushPayload,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, PipelineError> {
        let Some(sub) = self.sources.find_subscription(payload.subscription_id).await? else {
            return Ok(None);
        };
        if !sub.is_active {
            return Ok(None);
        }
        let since = payload
            .since
            .or(sub.last_notified_at)
            .unwrap_or_else(|| now - Duration::hours(24));

        let matched: Vec<_> = self
            .positions
            .find_created_since(since)
            .await?
            .into_iter()
            .filter(|p| sub.matches_position(p))
            .collect();
        if matched.is_empty() {
            self.sources.advance_subscription_cursor(sub.id, now).await?;
            return Ok(None);
        }

        let names: Vec<String> = matched
            .iter()
            .take(5)
            .map(|p| format!("{}-{}", p.department_name, p.position_name))
            .collect();
        let mut content = format!("新增职位：{}", names.join("、"));
        if matched.len() > names.len() {
            content.push_str(&format!(" 等 {} 个", matched.len()));
        }
        let notification = Notification::new(
            sub.user_id,
            NotificationKind::SubscriptionPush,
            format!("订阅「{}」有 {} 个新职位", sub.subscribe_name, matched.len()),
            content,
            format!("/subscriptions/{}", sub.id),
        )
        .with_source("subscription", format!("{}:{}", sub.id, since.timestamp()));

        let saved = self.notify(notification, now).await?;
        if saved.is_some() {
            self.sources.advance_subscription_cursor(sub.id, now).await?;
        }
        Ok(saved)
    }

    /// 生成某个本地日期的提醒计划
    pub async fn plan_daily(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DailyPlan, PipelineError> {
        let mut plan = DailyPlan::default();
        let day_start = self.policy.day_start(date);
        let day_end = day_start + Duration::hours(24);

        let events = self
            .sources
            .events_between(day_start, day_start + Duration::hours(self.settings.calendar_lookahead_hours))
            .await?;
        for event in events {
            let offsets = if event.reminder_offsets_minutes.is_empty() {
                &self.settings.default_offsets_minutes
            } else {
                &event.reminder_offsets_minutes
            };
            for &offset in offsets {
                let fire_at = event.event_time - Duration::minutes(offset);
                if fire_at < day_start || fire_at >= day_end || event.event_time <= now {
                    continue;
                }
                let fire_at = self.policy.shift_out_of_quiet(fire_at).max(now);
                plan.calendar.push((
                    CalendarReminderPayload {
                        event_id: event.id,
                        user_id: event.user_id,
                        event_title: event.title.clone(),
                        event_time: event.event_time,
                        offset_minutes: offset,
                    },
                    fire_at,
                ));
            }
        }

        let lookahead_days = (self.settings.deadline_lookahead_hours + 23) / 24;
        let positions = self
            .positions
            .find_registration_ending(date, date + Duration::days(lookahead_days))
            .await?;
        for position in positions {
            for favorite in self.sources.favorites_for_position(&position.position_id).await? {
                plan.registration.push(RegistrationReminderPayload {
                    position_id: position.position_id.clone(),
                    user_id: favorite.user_id,
                });
            }
        }

        plan.subscriptions = self
            .sources
            .active_subscriptions()
            .await?
            .into_iter()
            .map(|sub| SubscriptionPushPayload {
                subscription_id: sub.id,
                since: None,
            })
            .collect();

        info!(
            %date,
            calendar = plan.calendar.len(),
            registration = plan.registration.len(),
            subscriptions = plan.subscriptions.len(),
            "每日提醒计划"
        );
        Ok(plan)
    }
}

#[cfg(test)]
#[path = "reminder_service_test.rs"]
mod tests;
