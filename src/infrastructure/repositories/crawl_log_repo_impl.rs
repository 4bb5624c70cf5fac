// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::parse_column;
use crate::domain::models::crawl_log::CrawlLog;
use crate::domain::repositories::crawl_log_repository::CrawlLogRepository;
use crate::infrastructure::database::entities::crawl_log;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 任务日志仓库实现
#[derive(Clone)]
pub struct CrawlLogRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl CrawlLogRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<crawl_log::Model> for CrawlLog {
    type Error = RepositoryError;

    fn try_from(model: crawl_log::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            task_id: model.task_id,
            attempt: model.attempt,
            level: parse_column(&model.level)?,
            message: model.message,
            timestamp: model.timestamp,
        })
    }
}

#[async_trait]
impl CrawlLogRepository for CrawlLogRepositoryImpl {
    async fn append(&self, log: &CrawlLog) -> Result<CrawlLog, RepositoryError> {
        let model = crawl_log::ActiveModel {
            id: NotSet,
            task_id: Set(log.task_id),
            attempt: Set(log.attempt),
            level: Set(log.level.as_str().to_string()),
            message: Set(log.message.clone()),
            timestamp: Set(log.timestamp),
        };
        model.insert(self.db.as_ref()).await?.try_into()
    }

    async fn find_by_task(
        &self,
        task_id: Uuid,
        limit: u64,
    ) -> Result<Vec<CrawlLog>, RepositoryError> {
        let models = crawl_log::Entity::find()
            .filter(crawl_log::Column::TaskId.eq(task_id))
            .order_by_asc(crawl_log::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        models.into_iter().map(TryInto::try_into).collect()
    }
}
