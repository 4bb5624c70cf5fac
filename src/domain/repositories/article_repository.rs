// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashSet;

use crate::domain::models::article::Article;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;

/// 文章仓库
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// 返回给定 URL 中已存在于该列表页下的那部分
    async fn existing_urls(
        &self,
        source_list_id: i64,
        urls: &[String],
    ) -> Result<HashSet<String>, RepositoryError>;
    /// 批量写入，忽略 (source_list_id, url) 冲突；返回实际写入条数
    async fn insert_many(&self, articles: &[Article]) -> Result<u64, RepositoryError>;
}
