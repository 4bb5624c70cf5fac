// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::parse_column;
use crate::domain::models::notification::{Notification, NotificationDelivery};
use crate::domain::repositories::notification_repository::NotificationRepository;
use crate::infrastructure::database::entities::{notification, notification_delivery};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, Set,
};
use std::sync::Arc;

/// 站内通知仓库实现
#[derive(Clone)]
pub struct NotificationRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<notification::Model> for Notification {
    type Error = RepositoryError;

    fn try_from(model: notification::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            kind: parse_column(&model.kind)?,
            title: model.title,
            content: model.content,
            link: model.link,
            source_type: model.source_type,
            source_id: model.source_id,
            is_read: model.is_read,
            created_at: model.created_at,
        })
    }
}

#[async_trait]
impl NotificationRepository for NotificationRepositoryImpl {
    async fn create(&self, notification: &Notification) -> Result<Notification, RepositoryError> {
        let model = notification::ActiveModel {
            id: NotSet,
            user_id: Set(notification.user_id),
            kind: Set(notification.kind.as_str().to_string()),
            title: Set(notification.title.clone()),
            content: Set(notification.content.clone()),
            link: Set(notification.link.clone()),
            source_type: Set(notification.source_type.clone()),
            source_id: Set(notification.source_id.clone()),
            is_read: Set(notification.is_read),
            created_at: Set(notification.created_at),
        };
        model.insert(self.db.as_ref()).await?.try_into()
    }

    async fn count_for_user_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let count = notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::CreatedAt.gte(since))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn exists_for_source(
        &self,
        user_id: i64,
        source_type: &str,
        source_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let count = notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::SourceType.eq(source_type))
            .filter(notification::Column::SourceId.eq(source_id))
            .filter(notification::Column::CreatedAt.gte(since))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    async fn record_delivery(
        &self,
        delivery: &NotificationDelivery,
    ) -> Result<(), RepositoryError> {
        notification_delivery::ActiveModel {
            id: NotSet,
            notification_id: Set(delivery.notification_id),
            channel: Set(delivery.channel.as_str().to_string()),
            success: Set(delivery.success),
            error: Set(delivery.error.clone()),
            delivered_at: Set(delivery.delivered_at),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(())
    }
}
