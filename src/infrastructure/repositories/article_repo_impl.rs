// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::article::Article;
use crate::domain::repositories::article_repository::ArticleRepository;
use crate::infrastructure::database::entities::article;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QuerySelect, Set,
};
use std::collections::HashSet;
use std::sync::Arc;

/// 候选文章仓库实现
#[derive(Clone)]
pub struct ArticleRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl ArticleRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ArticleRepository for ArticleRepositoryImpl {
    async fn existing_urls(
        &self,
        source_list_id: i64,
        urls: &[String],
    ) -> Result<HashSet<String>, RepositoryError> {
        if urls.is_empty() {
            return Ok(HashSet::new());
        }
        let found: Vec<String> = article::Entity::find()
            .select_only()
            .column(article::Column::Url)
            .filter(article::Column::SourceListId.eq(source_list_id))
            .filter(article::Column::Url.is_in(urls.iter().cloned()))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        Ok(found.into_iter().collect())
    }

    async fn insert_many(&self, articles: &[Article]) -> Result<u64, RepositoryError> {
        if articles.is_empty() {
            return Ok(0);
        }
        let models = articles.iter().map(|a| article::ActiveModel {
            id: NotSet,
            source_list_id: Set(a.source_list_id),
            url: Set(a.url.clone()),
            title: Set(a.title.clone()),
            category: Set(a.category.clone()),
            discovered_at: Set(a.discovered_at),
        });

        let inserted = article::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([article::Column::SourceListId, article::Column::Url])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use chrono::Utc;

    fn article(list: i64, url: &str) -> Article {
        Article {
            id: 0,
            source_list_id: list,
            url: url.to_string(),
            title: "关于2025年度公开招录公务员的公告".into(),
            category: "公务员".into(),
            discovered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_many_ignores_duplicates() {
        let repo = ArticleRepositoryImpl::new(Arc::new(memory_db().await));
        let first = repo
            .insert_many(&[article(1, "https://a.gov/1"), article(1, "https://a.gov/2")])
            .await
            .unwrap();
        assert_eq!(first, 2);

        let second = repo
            .insert_many(&[article(1, "https://a.gov/2"), article(2, "https://a.gov/2")])
            .await
            .unwrap();
        assert_eq!(second, 1);

        let urls = vec!["https://a.gov/1".to_string(), "https://a.gov/3".to_string()];
        let existing = repo.existing_urls(1, &urls).await.unwrap();
        assert!(existing.contains("https://a.gov/1"));
        assert!(!existing.contains("https://a.gov/3"));
        assert!(repo.existing_urls(2, &urls).await.unwrap().is_empty());
    }
}
