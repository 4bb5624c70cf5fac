// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::task::DomainError;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CalendarReminder,
    RegistrationReminder,
    AnnouncementPush,
    SubscriptionPush,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CalendarReminder => "calendar_reminder",
            NotificationKind::RegistrationReminder => "registration_reminder",
            NotificationKind::AnnouncementPush => "announcement_push",
            NotificationKind::SubscriptionPush => "subscription_push",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar_reminder" => Ok(NotificationKind::CalendarReminder),
            "registration_reminder" => Ok(NotificationKind::RegistrationReminder),
            "announcement_push" => Ok(NotificationKind::AnnouncementPush),
            "subscription_push" => Ok(NotificationKind::SubscriptionPush),
            _ => Err(DomainError::ValidationError(format!("未知通知类型: {}", s))),
        }
    }
}

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    InApp,
    Push,
    Email,
    Sms,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::InApp => "in_app",
            ChannelType::Push => "push",
            ChannelType::Email => "email",
            ChannelType::Sms => "sms",
        }
    }

    /// 免打扰时段内仍然允许的渠道
    pub fn allowed_in_quiet_hours(&self) -> bool {
        matches!(self, ChannelType::InApp)
    }
}

/// 站内通知
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub link: String,
    /// 触发来源，如 `position`、`calendar_event`
    pub source_type: String,
    pub source_id: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: i64,
        kind: NotificationKind,
        title: impl Into<String>,
        content: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            kind,
            title: title.into(),
            content: content.into(),
            link: link.into(),
            source_type: String::new(),
            source_id: String::new(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source_type: &str, source_id: impl ToString) -> Self {
        self.source_type = source_type.to_string();
        self.source_id = source_id.to_string();
        self
    }
}

/// 渠道投递记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationDelivery {
    pub notification_id: i64,
    pub channel: ChannelType,
    pub success: bool,
    pub error: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

/// 用户联系方式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Contact {
    pub user_id: i64,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub device_token: Option<String>,
}
