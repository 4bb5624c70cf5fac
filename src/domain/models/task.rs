// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 任务类型
///
/// 字符串标识与外部 API 层约定一致，不可更改。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "crawler:list_monitor")]
    ListMonitor,
    #[serde(rename = "crawler:list_discovery")]
    ListDiscovery,
    #[serde(rename = "crawler:announcement")]
    ArticleFetch,
    #[serde(rename = "crawler:positions")]
    PositionExtract,
    #[serde(rename = "crawler:scheduled_monitor")]
    ScheduledMonitor,
    #[serde(rename = "reminder:calendar")]
    CalendarReminder,
    #[serde(rename = "reminder:registration")]
    RegistrationReminder,
    #[serde(rename = "reminder:announcement_push")]
    AnnouncementPush,
    #[serde(rename = "reminder:subscription_push")]
    SubscriptionPush,
    #[serde(rename = "reminder:daily_check")]
    DailyCheck,
}

impl TaskKind {
    pub const ALL: [TaskKind; 10] = [
        TaskKind::ListMonitor,
        TaskKind::ListDiscovery,
        TaskKind::ArticleFetch,
        TaskKind::PositionExtract,
        TaskKind::ScheduledMonitor,
        TaskKind::CalendarReminder,
        TaskKind::RegistrationReminder,
        TaskKind::AnnouncementPush,
        TaskKind::SubscriptionPush,
        TaskKind::DailyCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ListMonitor => "crawler:list_monitor",
            TaskKind::ListDiscovery => "crawler:list_discovery",
            TaskKind::ArticleFetch => "crawler:announcement",
            TaskKind::PositionExtract => "crawler:positions",
            TaskKind::ScheduledMonitor => "crawler:scheduled_monitor",
            TaskKind::CalendarReminder => "reminder:calendar",
            TaskKind::RegistrationReminder => "reminder:registration",
            TaskKind::AnnouncementPush => "reminder:announcement_push",
            TaskKind::SubscriptionPush => "reminder:subscription_push",
            TaskKind::DailyCheck => "reminder:daily_check",
        }
    }

    /// 人类可读的任务名，写入 `crawl_tasks.task_name`
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskKind::ListMonitor => "列表页监控",
            TaskKind::ListDiscovery => "列表页发现",
            TaskKind::ArticleFetch => "公告抓取",
            TaskKind::PositionExtract => "职位提取",
            TaskKind::ScheduledMonitor => "定时监控",
            TaskKind::CalendarReminder => "日历提醒",
            TaskKind::RegistrationReminder => "报名截止提醒",
            TaskKind::AnnouncementPush => "公告推送",
            TaskKind::SubscriptionPush => "订阅推送",
            TaskKind::DailyCheck => "每日提醒检查",
        }
    }

    pub fn default_queue(&self) -> QueueName {
        match self {
            TaskKind::CalendarReminder | TaskKind::RegistrationReminder => QueueName::Critical,
            TaskKind::ListDiscovery | TaskKind::ScheduledMonitor => QueueName::Low,
            _ => QueueName::Default,
        }
    }

    /// 默认单次执行超时；文档解析可能较慢，职位提取放宽到 120 秒
    pub fn default_timeout(&self, base: Duration) -> Duration {
        match self {
            TaskKind::PositionExtract => base.max(Duration::from_secs(120)),
            TaskKind::ListMonitor | TaskKind::ListDiscovery => base.max(Duration::from_secs(300)),
            _ => base,
        }
    }

    pub fn is_crawler(&self) -> bool {
        self.as_str().starts_with("crawler:")
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::ValidationError(format!("未知任务类型: {}", s)))
    }
}

/// 队列名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Critical,
    #[default]
    Default,
    Low,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Critical, QueueName::Default, QueueName::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Critical => "critical",
            QueueName::Default => "default",
            QueueName::Low => "low",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(QueueName::Critical),
            "default" => Ok(QueueName::Default),
            "low" => Ok(QueueName::Low),
            _ => Err(DomainError::ValidationError(format!("未知队列: {}", s))),
        }
    }
}

/// 任务状态枚举
///
/// pending → running → (completed | failed | cancelled)；
/// running → pending 仅在处理器要求重试时发生；pending → cancelled 允许。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(DomainError::ValidationError(format!("未知任务状态: {}", s))),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    /// 状态转换不符合生命周期规则
    #[error("非法状态转换: {from} -> {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// 输入数据不符合领域规则
    #[error("校验错误: {0}")]
    ValidationError(String),
}

/// 抓取任务实体
///
/// `crawl_tasks` 表中的一行，记录一次调度单元的完整生命周期。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    pub task_id: Uuid,
    pub task_type: TaskKind,
    pub task_name: String,
    /// 原样保存的任务参数
    pub params: serde_json::Value,
    pub status: TaskStatus,
    /// 进度 [0,1]
    pub progress: f64,
    pub queue: QueueName,
    pub uniqueness_key: Option<String>,
    /// 已执行次数（含当前）
    pub attempt_count: i32,
    pub max_retries: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlTask {
    /// 创建一个新的待执行任务
    ///
    /// # 参数
    ///
    /// * `task_type` - 任务类型
    /// * `params` - 任务参数
    /// * `queue` - 所属队列
    /// * `max_retries` - 最大重试次数
    pub fn new(
        task_type: TaskKind,
        params: serde_json::Value,
        queue: QueueName,
        max_retries: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            task_type,
            task_name: task_type.display_name().to_string(),
            params,
            status: TaskStatus::Pending,
            progress: 0.0,
            queue,
            uniqueness_key: None,
            attempt_count: 0,
            max_retries,
            scheduled_at: None,
            deadline: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, to: TaskStatus) -> Result<(), DomainError> {
        let allowed = matches!(
            (self.status, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Pending)
        );
        if !allowed {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 开始执行，累加执行次数
    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::Running)?;
        self.attempt_count += 1;
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    pub fn complete(&mut self, result: Option<serde_json::Value>) -> Result<(), DomainError> {
        self.transition(TaskStatus::Completed)?;
        self.progress = 1.0;
        self.completed_at = Some(self.updated_at);
        if result.is_some() {
            self.result = result;
        }
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.transition(TaskStatus::Failed)?;
        self.completed_at = Some(self.updated_at);
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::Cancelled)?;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// 处理器要求重试：回到 pending 并记录下一次执行时间
    pub fn requeue(
        &mut self,
        at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Result<(), DomainError> {
        self.transition(TaskStatus::Pending)?;
        self.scheduled_at = Some(at);
        self.error_message = Some(message.into());
        Ok(())
    }

    /// 是否还有重试额度
    pub fn can_retry(&self) -> bool {
        self.attempt_count <= self.max_retries
    }

    pub fn set_progress(&mut self, progress: f64) {
        self.progress = progress.clamp(0.0, 1.0);
        self.updated_at = Utc::now();
    }
}

/// 列表页监控参数；`list_page_ids` 为空表示所有活跃列表页
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListMonitorPayload {
    #[serde(default)]
    pub list_page_ids: Vec<i64>,
}

/// 列表页发现参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListDiscoveryPayload {
    pub aggregator_urls: Vec<String>,
    /// 每个聚合页最多抽样验证的文章数
    #[serde(default)]
    pub sample_articles: Option<usize>,
}

/// 公告抓取参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleFetchPayload {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub source_list_id: i64,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub category: String,
}

/// 职位提取参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionExtractPayload {
    pub announcement_id: i64,
}

/// 定时监控参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledMonitorPayload {
    pub frequency: super::list_page::CrawlFrequency,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_kind_identifiers_round_trip() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
            let encoded = serde_json::to_string(&kind).unwrap();
            assert_eq!(encoded, format!("\"{}\"", kind.as_str()));
        }
        assert!("crawler:unknown".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_retry_cycle_and_completion() {
        let mut task = CrawlTask::new(TaskKind::ArticleFetch, json!({}), QueueName::Default, 3);

        task.start().unwrap();
        task.requeue(Utc::now(), "503").unwrap();
        task.start().unwrap();
        task.complete(None).unwrap();

        assert_eq!(task.attempt_count, 2);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 1.0);
    }

    #[test]
    fn test_completed_never_returns_to_pending() {
        let mut task = CrawlTask::new(TaskKind::ListMonitor, json!({}), QueueName::Default, 3);
        task.start().unwrap();
        task.complete(None).unwrap();

        assert!(task.requeue(Utc::now(), "again").is_err());
        assert!(task.cancel().is_err());
    }

    #[test]
    fn test_pending_can_be_cancelled() {
        let mut task = CrawlTask::new(TaskKind::DailyCheck, json!({}), QueueName::Low, 0);
        task.cancel().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.start().is_err());
    }

    #[test]
    fn test_can_retry_counts_attempts() {
        let mut task = CrawlTask::new(TaskKind::ArticleFetch, json!({}), QueueName::Default, 1);
        task.start().unwrap();
        assert!(task.can_retry());
        task.requeue(Utc::now(), "x").unwrap();
        task.start().unwrap();
        assert!(!task.can_retry());
    }
}
