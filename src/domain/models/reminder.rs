// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::position::Position;
use super::task::DomainError;

/// 用户日历事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub event_time: DateTime<Utc>,
    /// 提前提醒的分钟数；为空时使用全局默认
    pub reminder_offsets_minutes: Vec<i64>,
}

/// 职位收藏
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Favorite {
    pub user_id: i64,
    /// 职位自然键
    pub position_id: String,
}

/// 订阅维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeType {
    ExamType,
    Province,
    City,
    Keyword,
    Department,
    Education,
    Major,
}

impl SubscribeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscribeType::ExamType => "exam_type",
            SubscribeType::Province => "province",
            SubscribeType::City => "city",
            SubscribeType::Keyword => "keyword",
            SubscribeType::Department => "department",
            SubscribeType::Education => "education",
            SubscribeType::Major => "major",
        }
    }
}

impl FromStr for SubscribeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exam_type" => Ok(SubscribeType::ExamType),
            "province" => Ok(SubscribeType::Province),
            "city" => Ok(SubscribeType::City),
            "keyword" => Ok(SubscribeType::Keyword),
            "department" => Ok(SubscribeType::Department),
            "education" => Ok(SubscribeType::Education),
            "major" => Ok(SubscribeType::Major),
            _ => Err(DomainError::ValidationError(format!("未知订阅类型: {}", s))),
        }
    }
}

/// 用户订阅
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub subscribe_type: SubscribeType,
    pub subscribe_value: String,
    pub subscribe_name: String,
    pub is_active: bool,
    /// 上次推送游标
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// 新公告是否命中订阅（只看考试类型与省份，关键词匹配标题）
    pub fn matches_announcement(
        &self,
        title: &str,
        exam_type: Option<&str>,
        province: Option<&str>,
    ) -> bool {
        let value = self.subscribe_value.trim();
        match self.subscribe_type {
            SubscribeType::ExamType => exam_type == Some(value),
            SubscribeType::Province => province == Some(value),
            SubscribeType::Keyword => !value.is_empty() && title.contains(value),
            _ => false,
        }
    }

    /// 职位是否命中订阅
    pub fn matches_position(&self, position: &Position) -> bool {
        let value = self.subscribe_value.trim();
        if value.is_empty() {
            return false;
        }
        match self.subscribe_type {
            SubscribeType::ExamType => position.exam_type.as_deref() == Some(value),
            SubscribeType::Province => {
                position.work_location_province.as_deref() == Some(value)
            }
            SubscribeType::City => position.work_location_city.as_deref() == Some(value),
            SubscribeType::Keyword => {
                position.position_name.contains(value) || position.department_name.contains(value)
            }
            SubscribeType::Department => position.department_name.contains(value),
            SubscribeType::Education => position.education_min.as_deref() == Some(value),
            SubscribeType::Major => {
                position.major_unlimited || position.major_specific.iter().any(|m| m.contains(value))
            }
        }
    }
}

/// 日历提醒参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarReminderPayload {
    pub event_id: i64,
    pub user_id: i64,
    pub event_title: String,
    pub event_time: DateTime<Utc>,
    pub offset_minutes: i64,
}

/// 报名截止提醒参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrationReminderPayload {
    /// 职位自然键
    pub position_id: String,
    pub user_id: i64,
}

/// 公告推送参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnouncementPushPayload {
    pub announcement_id: i64,
}

/// 订阅推送参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionPushPayload {
    pub subscription_id: i64,
    /// 覆盖订阅自身游标
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

/// 每日提醒检查参数；缺省为执行当天
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DailyCheckPayload {
    #[serde(default)]
    pub check_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(kind: SubscribeType, value: &str) -> Subscription {
        Subscription {
            id: 1,
            user_id: 7,
            subscribe_type: kind,
            subscribe_value: value.into(),
            subscribe_name: "我的订阅".into(),
            is_active: true,
            last_notified_at: None,
        }
    }

    #[test]
    fn test_announcement_matching() {
        assert!(sub(SubscribeType::ExamType, "国考").matches_announcement("x", Some("国考"), None));
        assert!(sub(SubscribeType::Province, "江苏").matches_announcement("x", None, Some("江苏")));
        assert!(!sub(SubscribeType::Province, "江苏").matches_announcement("x", None, Some("浙江")));
        assert!(sub(SubscribeType::Keyword, "税务").matches_announcement("税务局招录公告", None, None));
        assert!(!sub(SubscribeType::Major, "法学").matches_announcement("x", None, None));
    }

    #[test]
    fn test_position_matching() {
        let position = Position {
            position_name: "科员".into(),
            department_name: "南京市税务局".into(),
            work_location_province: Some("江苏".into()),
            major_specific: vec!["法学".into(), "会计学".into()],
            recruit_count: 1,
            ..Default::default()
        };
        assert!(sub(SubscribeType::Province, "江苏").matches_position(&position));
        assert!(sub(SubscribeType::Department, "税务").matches_position(&position));
        assert!(sub(SubscribeType::Major, "会计").matches_position(&position));
        assert!(!sub(SubscribeType::City, "苏州").matches_position(&position));
    }
}
