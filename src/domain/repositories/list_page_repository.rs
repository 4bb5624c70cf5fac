// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::list_page::{CrawlFrequency, ListPage, ListPageStatus, NewListPage};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 列表页仓库
#[async_trait]
pub trait ListPageRepository: Send + Sync {
    /// 创建列表页；URL 已存在时返回 `AlreadyExists`
    async fn create(&self, page: &NewListPage) -> Result<ListPage, RepositoryError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<ListPage>, RepositoryError>;
    async fn find_by_url(&self, url: &str) -> Result<Option<ListPage>, RepositoryError>;
    /// 全部活跃列表页，按 ID 升序
    async fn find_active(&self) -> Result<Vec<ListPage>, RepositoryError>;
    /// 指定频率的活跃列表页
    async fn find_by_frequency(
        &self,
        frequency: CrawlFrequency,
    ) -> Result<Vec<ListPage>, RepositoryError>;
    /// 完整翻页结束后记录抓取结果
    async fn update_crawl_result(
        &self,
        id: i64,
        crawled_at: DateTime<Utc>,
        article_count: i32,
    ) -> Result<(), RepositoryError>;
    /// 写回 LLM 推荐的文章选择器
    async fn update_selector(&self, id: i64, selector: &str) -> Result<(), RepositoryError>;
    async fn update_status(&self, id: i64, status: ListPageStatus) -> Result<(), RepositoryError>;
}
