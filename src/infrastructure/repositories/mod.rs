// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 基于 SeaORM 的领域仓库实现，PostgreSQL 与 SQLite 共用同一套代码。
pub mod announcement_repo_impl;
pub mod article_repo_impl;
pub mod crawl_log_repo_impl;
pub mod list_page_repo_impl;
pub mod llm_config_repo_impl;
pub mod notification_repo_impl;
pub mod position_repo_impl;
pub mod reminder_repo_impl;
pub mod task_repo_impl;

use sea_orm::{DbErr, SqlErr};
use serde::de::DeserializeOwned;
use std::str::FromStr;

use crate::domain::models::task::DomainError;
use crate::utils::errors::RepositoryError;

pub use announcement_repo_impl::AnnouncementRepositoryImpl;
pub use article_repo_impl::ArticleRepositoryImpl;
pub use crawl_log_repo_impl::CrawlLogRepositoryImpl;
pub use list_page_repo_impl::ListPageRepositoryImpl;
pub use llm_config_repo_impl::LlmConfigRepositoryImpl;
pub use notification_repo_impl::NotificationRepositoryImpl;
pub use position_repo_impl::PositionRepositoryImpl;
pub use reminder_repo_impl::ReminderSourceRepositoryImpl;
pub use task_repo_impl::CrawlTaskRepositoryImpl;

/// 唯一约束冲突映射为 `AlreadyExists`，其余保持数据库错误
pub(crate) fn map_unique(err: DbErr) -> RepositoryError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => RepositoryError::AlreadyExists,
        _ => RepositoryError::Database(err),
    }
}

/// 解析以字符串存储的枚举列
pub(crate) fn parse_column<T>(value: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = DomainError>,
{
    value
        .parse()
        .map_err(|e: DomainError| RepositoryError::InvalidParameter(e.to_string()))
}

/// JSON 列表列，格式不符时视为空
pub(crate) fn json_list<T: DeserializeOwned>(value: serde_json::Value) -> Vec<T> {
    serde_json::from_value(value).unwrap_or_default()
}
