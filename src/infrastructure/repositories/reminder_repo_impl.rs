// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::{json_list, parse_column};
use crate::domain::models::notification::Contact;
use crate::domain::models::reminder::{CalendarEvent, Favorite, SubscribeType, Subscription};
use crate::domain::repositories::reminder_repository::ReminderSourceRepository;
use crate::infrastructure::database::entities::{
    calendar_event, position_favorite, subscription, user_contact,
};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};
use serde_json::json;
use std::sync::Arc;

/// 提醒来源仓库实现
///
/// 日历事件、收藏、订阅与联系方式由用户侧服务写入，这里以读取为主；
/// 写入方法供运维导入与测试夹具使用。
#[derive(Clone)]
pub struct ReminderSourceRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl ReminderSourceRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 新增日历事件
    pub async fn add_event(
        &self,
        user_id: i64,
        title: &str,
        event_time: DateTime<Utc>,
        offsets_minutes: &[i64],
    ) -> Result<CalendarEvent, RepositoryError> {
        let model = calendar_event::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            title: Set(title.to_string()),
            event_time: Set(event_time),
            reminder_offsets_minutes: Set(json!(offsets_minutes)),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(self.db.as_ref()).await?.into())
    }

    /// 收藏职位，重复收藏忽略
    pub async fn add_favorite(&self, user_id: i64, position_id: &str) -> Result<(), RepositoryError> {
        let model = position_favorite::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            position_id: Set(position_id.to_string()),
            created_at: Set(Utc::now()),
        };
        position_favorite::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    position_favorite::Column::UserId,
                    position_favorite::Column::PositionId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// 新增订阅
    pub async fn add_subscription(
        &self,
        user_id: i64,
        subscribe_type: SubscribeType,
        value: &str,
        name: &str,
    ) -> Result<Subscription, RepositoryError> {
        let model = subscription::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            subscribe_type: Set(subscribe_type.as_str().to_string()),
            subscribe_value: Set(value.to_string()),
            subscribe_name: Set(name.to_string()),
            is_active: Set(true),
            last_notified_at: Set(None),
            created_at: Set(Utc::now()),
        };
        model.insert(self.db.as_ref()).await?.try_into()
    }

    /// 写入或覆盖联系方式
    pub async fn upsert_contact(&self, contact: &Contact) -> Result<(), RepositoryError> {
        let model = user_contact::ActiveModel {
            user_id: Set(contact.user_id),
            email: Set(contact.email.clone()),
            phone: Set(contact.phone.clone()),
            device_token: Set(contact.device_token.clone()),
        };
        user_contact::Entity::insert(model)
            .on_conflict(
                OnConflict::column(user_contact::Column::UserId)
                    .update_columns([
                        user_contact::Column::Email,
                        user_contact::Column::Phone,
                        user_contact::Column::DeviceToken,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }
}

impl From<calendar_event::Model> for CalendarEvent {
    fn from(model: calendar_event::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            event_time: model.event_time,
            reminder_offsets_minutes: json_list(model.reminder_offsets_minutes),
        }
    }
}

impl TryFrom<subscription::Model> for Subscription {
    type Error = RepositoryError;

    fn try_from(model: subscription::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            subscribe_type: parse_column(&model.subscribe_type)?,
            subscribe_value: model.subscribe_value,
            subscribe_name: model.subscribe_name,
            is_active: model.is_active,
            last_notified_at: model.last_notified_at,
        })
    }
}

#[async_trait]
impl ReminderSourceRepository for ReminderSourceRepositoryImpl {
    async fn find_event(&self, event_id: i64) -> Result<Option<CalendarEvent>, RepositoryError> {
        let model = calendar_event::Entity::find_by_id(event_id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, RepositoryError> {
        let models = calendar_event::Entity::find()
            .filter(calendar_event::Column::EventTime.gte(start))
            .filter(calendar_event::Column::EventTime.lt(end))
            .order_by_asc(calendar_event::Column::EventTime)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn favorites_for_position(
        &self,
        position_id: &str,
    ) -> Result<Vec<Favorite>, RepositoryError> {
        let models = position_favorite::Entity::find()
            .filter(position_favorite::Column::PositionId.eq(position_id))
            .order_by_asc(position_favorite::Column::UserId)
            .all(self.db.as_ref())
            .await?;
        Ok(models
            .into_iter()
            .map(|m| Favorite {
                user_id: m.user_id,
                position_id: m.position_id,
            })
            .collect())
    }

    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError> {
        let models = subscription::Entity::find()
            .filter(subscription::Column::IsActive.eq(true))
            .order_by_asc(subscription::Column::Id)
            .all(self.db.as_ref())
            .await?;
        models.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_subscription(&self, id: i64) -> Result<Option<Subscription>, RepositoryError> {
        let model = subscription::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        model.map(TryInto::try_into).transpose()
    }

    async fn advance_subscription_cursor(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = subscription::Entity::update_many()
            .col_expr(subscription::Column::LastNotifiedAt, Expr::value(at))
            .filter(subscription::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn contact_for(&self, user_id: i64) -> Result<Option<Contact>, RepositoryError> {
        let model = user_contact::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(|m| Contact {
            user_id: m.user_id,
            email: m.email,
            phone: m.phone,
            device_token: m.device_token,
        }))
    }
}
