// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 搜索索引实现模块
///
/// `search.url` 配置时推送到 HTTP 索引服务，否则使用空实现。
pub mod http_index;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::settings::SearchSettings;
use crate::domain::search::index::{IndexError, PositionDocument, SearchIndex};

pub use http_index::HttpSearchIndex;

/// 未配置索引服务时的空实现
#[derive(Debug, Default, Clone)]
pub struct NoopSearchIndex;

#[async_trait]
impl SearchIndex for NoopSearchIndex {
    async fn upsert(&self, _document: &PositionDocument) -> Result<(), IndexError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// 根据配置创建索引实现
pub fn create_index(settings: &SearchSettings, timeout: Duration) -> Arc<dyn SearchIndex> {
    match settings.url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => Arc::new(HttpSearchIndex::new(url, &settings.index, timeout)),
        None => Arc::new(NoopSearchIndex),
    }
}
