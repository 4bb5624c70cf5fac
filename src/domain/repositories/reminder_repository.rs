// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::notification::Contact;
use crate::domain::models::reminder::{CalendarEvent, Favorite, Subscription};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 提醒来源仓库
///
/// 只读访问用户侧的日历、收藏与订阅，唯一的写操作是推进订阅游标。
#[async_trait]
pub trait ReminderSourceRepository: Send + Sync {
    async fn find_event(&self, event_id: i64) -> Result<Option<CalendarEvent>, RepositoryError>;
    /// 事件时间落在 `[start, end)` 内的日历事件
    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, RepositoryError>;
    async fn favorites_for_position(
        &self,
        position_id: &str,
    ) -> Result<Vec<Favorite>, RepositoryError>;
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError>;
    async fn find_subscription(&self, id: i64) -> Result<Option<Subscription>, RepositoryError>;
    async fn advance_subscription_cursor(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn contact_for(&self, user_id: i64) -> Result<Option<Contact>, RepositoryError>;
}
