// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::task::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(DomainError::ValidationError(format!("未知日志级别: {}", s))),
        }
    }
}

/// 任务日志
///
/// 每次执行尝试写入一条带 `attempt` 的记录；其余为处理过程中的告警。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlLog {
    pub id: i64,
    pub task_id: Option<Uuid>,
    pub attempt: Option<i32>,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CrawlLog {
    pub fn new(task_id: Option<Uuid>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            task_id,
            attempt: None,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn warn(task_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self::new(task_id, LogLevel::Warn, message)
    }

    /// 执行尝试记录
    pub fn attempt(task_id: Uuid, attempt: i32, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            attempt: Some(attempt),
            ..Self::new(Some(task_id), level, message)
        }
    }
}
