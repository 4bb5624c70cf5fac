// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::notification::{Notification, NotificationDelivery};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 通知仓库
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<Notification, RepositoryError>;
    /// 用户自 `since` 起收到的通知数，用于每日上限
    async fn count_for_user_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
    /// 同一来源是否已通知过该用户
    async fn exists_for_source(
        &self,
        user_id: i64,
        source_type: &str,
        source_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    async fn record_delivery(&self, delivery: &NotificationDelivery)
        -> Result<(), RepositoryError>;
}
