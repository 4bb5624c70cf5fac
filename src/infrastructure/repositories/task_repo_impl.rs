// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::parse_column;
use crate::domain::models::task::{CrawlTask, QueueName, TaskStatus};
use crate::domain::repositories::task_repository::CrawlTaskRepository;
use crate::infrastructure::database::entities::crawl_task as task_entity;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 任务仓库实现
///
/// 基于SeaORM实现的 `crawl_tasks` 数据访问层
#[derive(Clone)]
pub struct CrawlTaskRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl CrawlTaskRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<task_entity::Model> for CrawlTask {
    type Error = RepositoryError;

    fn try_from(model: task_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            task_id: model.task_id,
            task_type: parse_column(&model.task_type)?,
            task_name: model.task_name,
            params: model.params,
            status: parse_column(&model.status)?,
            progress: model.progress,
            queue: model.queue.parse().unwrap_or_default(),
            uniqueness_key: model.uniqueness_key,
            attempt_count: model.attempt_count,
            max_retries: model.max_retries,
            scheduled_at: model.scheduled_at,
            deadline: model.deadline,
            started_at: model.started_at,
            completed_at: model.completed_at,
            error_message: model.error_message,
            result: model.result,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl From<&CrawlTask> for task_entity::ActiveModel {
    fn from(task: &CrawlTask) -> Self {
        Self {
            task_id: Set(task.task_id),
            task_type: Set(task.task_type.as_str().to_string()),
            task_name: Set(task.task_name.clone()),
            params: Set(task.params.clone()),
            status: Set(task.status.as_str().to_string()),
            progress: Set(task.progress),
            queue: Set(task.queue.as_str().to_string()),
            uniqueness_key: Set(task.uniqueness_key.clone()),
            attempt_count: Set(task.attempt_count),
            max_retries: Set(task.max_retries),
            scheduled_at: Set(task.scheduled_at),
            deadline: Set(task.deadline),
            started_at: Set(task.started_at),
            completed_at: Set(task.completed_at),
            error_message: Set(task.error_message.clone()),
            result: Set(task.result.clone()),
            created_at: Set(task.created_at),
            updated_at: Set(task.updated_at),
        }
    }
}

#[async_trait]
impl CrawlTaskRepository for CrawlTaskRepositoryImpl {
    async fn create(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError> {
        let model: task_entity::ActiveModel = task.into();
        model.insert(self.db.as_ref()).await?.try_into()
    }

    async fn find_by_id(&self, task_id: Uuid) -> Result<Option<CrawlTask>, RepositoryError> {
        let model = task_entity::Entity::find_by_id(task_id)
            .one(self.db.as_ref())
            .await?;

        model.map(TryInto::try_into).transpose()
    }

    async fn update(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError> {
        let mut model: task_entity::ActiveModel = task.into();
        model.updated_at = Set(Utc::now());

        let updated_model = model.update(self.db.as_ref()).await?;
        updated_model.try_into()
    }

    async fn update_progress(&self, task_id: Uuid, progress: f64) -> Result<(), RepositoryError> {
        let result = task_entity::Entity::update_many()
            .col_expr(task_entity::Column::Progress, Expr::value(progress.clamp(0.0, 1.0)))
            .col_expr(task_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task_entity::Column::TaskId.eq(task_id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_stuck(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<CrawlTask>, RepositoryError> {
        let models = task_entity::Entity::find()
            .filter(task_entity::Column::Status.eq(TaskStatus::Running.as_str()))
            .filter(task_entity::Column::StartedAt.lt(started_before))
            .order_by_asc(task_entity::Column::StartedAt)
            .all(self.db.as_ref())
            .await?;

        models.into_iter().map(TryInto::try_into).collect()
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::Status,
                Expr::value(TaskStatus::Failed.as_str()),
            )
            .col_expr(
                task_entity::Column::ErrorMessage,
                Expr::value("截止时间已过，任务未执行"),
            )
            .col_expr(task_entity::Column::CompletedAt, Expr::value(now))
            .col_expr(task_entity::Column::UpdatedAt, Expr::value(now))
            .filter(task_entity::Column::Status.eq(TaskStatus::Pending.as_str()))
            .filter(task_entity::Column::Deadline.lt(now))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn count_by_status(
        &self,
        queue: QueueName,
        status: TaskStatus,
    ) -> Result<u64, RepositoryError> {
        let count = task_entity::Entity::find()
            .filter(task_entity::Column::Queue.eq(queue.as_str()))
            .filter(task_entity::Column::Status.eq(status.as_str()))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn failed_tail(
        &self,
        queue: QueueName,
        limit: u64,
    ) -> Result<Vec<CrawlTask>, RepositoryError> {
        let models = task_entity::Entity::find()
            .filter(task_entity::Column::Queue.eq(queue.as_str()))
            .filter(task_entity::Column::Status.eq(TaskStatus::Failed.as_str()))
            .order_by_desc(task_entity::Column::UpdatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        models.into_iter().map(TryInto::try_into).collect()
    }
}
