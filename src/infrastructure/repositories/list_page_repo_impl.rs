// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::{json_list, map_unique};
use crate::domain::models::list_page::{CrawlFrequency, ListPage, ListPageStatus, NewListPage};
use crate::domain::repositories::list_page_repository::ListPageRepository;
use crate::infrastructure::database::entities::list_page;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet,
    QueryFilter, QueryOrder, Set,
};
use serde_json::json;
use std::sync::Arc;

/// 列表页仓库实现
#[derive(Clone)]
pub struct ListPageRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl ListPageRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn touch(
        &self,
        id: i64,
        column: list_page::Column,
        value: sea_orm::Value,
    ) -> Result<(), RepositoryError> {
        let result = list_page::Entity::update_many()
            .col_expr(column, Expr::value(value))
            .col_expr(list_page::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(list_page::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

impl From<list_page::Model> for ListPage {
    fn from(model: list_page::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            source_name: model.source_name,
            category: model.category,
            crawl_frequency: model.crawl_frequency.parse().unwrap_or_default(),
            article_selector: model.article_selector,
            pagination_pattern: model.pagination_pattern,
            max_pages: model.max_pages.max(1) as u32,
            allowed_hosts: json_list(model.allowed_hosts),
            status: model.status.parse().unwrap_or_default(),
            last_crawled_at: model.last_crawled_at,
            last_article_count: model.last_article_count,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[async_trait]
impl ListPageRepository for ListPageRepositoryImpl {
    async fn create(&self, page: &NewListPage) -> Result<ListPage, RepositoryError> {
        let now = Utc::now();
        let model = list_page::ActiveModel {
            id: NotSet,
            url: Set(page.url.clone()),
            source_name: Set(page.source_name.clone()),
            category: Set(page.category.clone()),
            crawl_frequency: Set(page.crawl_frequency.as_str().to_string()),
            article_selector: Set(page.article_selector.clone()),
            pagination_pattern: Set(page.pagination_pattern.clone()),
            max_pages: Set(page.max_pages as i32),
            allowed_hosts: Set(json!(page.allowed_hosts)),
            status: Set(page.status.as_str().to_string()),
            last_crawled_at: Set(None),
            last_article_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = model.insert(self.db.as_ref()).await.map_err(map_unique)?;
        Ok(inserted.into())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ListPage>, RepositoryError> {
        let model = list_page::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<ListPage>, RepositoryError> {
        let model = list_page::Entity::find()
            .filter(list_page::Column::Url.eq(url))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_active(&self) -> Result<Vec<ListPage>, RepositoryError> {
        let models = list_page::Entity::find()
            .filter(list_page::Column::Status.eq(ListPageStatus::Active.as_str()))
            .order_by_asc(list_page::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_by_frequency(
        &self,
        frequency: CrawlFrequency,
    ) -> Result<Vec<ListPage>, RepositoryError> {
        let models = list_page::Entity::find()
            .filter(list_page::Column::Status.eq(ListPageStatus::Active.as_str()))
            .filter(list_page::Column::CrawlFrequency.eq(frequency.as_str()))
            .order_by_asc(list_page::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn update_crawl_result(
        &self,
        id: i64,
        crawled_at: DateTime<Utc>,
        article_count: i32,
    ) -> Result<(), RepositoryError> {
        let result = list_page::Entity::update_many()
            .col_expr(list_page::Column::LastCrawledAt, Expr::value(crawled_at))
            .col_expr(list_page::Column::LastArticleCount, Expr::value(article_count))
            .col_expr(list_page::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(list_page::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_selector(&self, id: i64, selector: &str) -> Result<(), RepositoryError> {
        self.touch(id, list_page::Column::ArticleSelector, selector.into())
            .await
    }

    async fn update_status(&self, id: i64, status: ListPageStatus) -> Result<(), RepositoryError> {
        self.touch(id, list_page::Column::Status, status.as_str().into())
            .await
    }
}
