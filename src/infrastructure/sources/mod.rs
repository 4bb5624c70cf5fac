// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 外部数据源
///
/// 列表页 URL 的协议名决定由哪个数据源列出文章，
/// 结果与 HTML 列表页一样进入列表页监控的去重与入队流程。
pub mod fenbi;
pub mod wechat_mp;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::models::article::ArticleCandidate;
use crate::domain::models::list_page::ListPage;
use crate::engines::traits::FetchError;
use crate::utils::errors::PipelineError;

pub use fenbi::FenbiSource;
pub use wechat_mp::WechatMpSource;

/// 数据源错误
#[derive(Error, Debug)]
pub enum SourceError {
    /// 缺少凭据或会话已失效，需要人工重新导入
    #[error("数据源配置错误: {0}")]
    Config(String),

    #[error("数据源地址无效: {0}")]
    InvalidUrl(String),

    #[error("数据源返回错误 {code}: {message}")]
    Api { code: i64, message: String },

    #[error("数据源响应无法解析: {0}")]
    Decode(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl From<SourceError> for PipelineError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Fetch(e) => e.into(),
            SourceError::Api { .. } => PipelineError::Transient(err.to_string()),
            SourceError::Config(_) | SourceError::InvalidUrl(_) => {
                PipelineError::Permanent(err.to_string())
            }
            SourceError::Decode(_) => PipelineError::Validation(err.to_string()),
        }
    }
}

/// 外部数据源
#[async_trait]
pub trait ExternalSource: Send + Sync {
    /// 处理的 URL 协议名
    fn scheme(&self) -> &'static str;

    /// 列出列表页下的文章，最多翻 `page.max_pages` 页
    async fn list(
        &self,
        page: &ListPage,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArticleCandidate>, SourceError>;
}

/// 按协议名查找数据源
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<&'static str, Arc<dyn ExternalSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn ExternalSource>) -> &mut Self {
        self.sources.insert(source.scheme(), source);
        self
    }

    /// 普通 HTTP 列表页返回 `Ok(None)`；未注册的协议是配置错误
    pub fn for_page(&self, page: &ListPage) -> Result<Option<Arc<dyn ExternalSource>>, SourceError> {
        let Some(scheme) = page.source_scheme() else {
            return Ok(None);
        };
        self.sources
            .get(scheme)
            .cloned()
            .map(Some)
            .ok_or_else(|| SourceError::Config(format!("未配置数据源: {}", scheme)))
    }
}

/// 解析 `k1=v1; k2=v2` 形式的 Cookie 串
pub fn parse_cookie_string(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// 重新拼成请求头使用的 Cookie 串
pub fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::list_page::{CrawlFrequency, ListPageStatus};
    use chrono::Utc;

    fn page(url: &str) -> ListPage {
        let now = Utc::now();
        ListPage {
            id: 1,
            url: url.to_string(),
            source_name: "test".to_string(),
            category: String::new(),
            crawl_frequency: CrawlFrequency::Daily,
            article_selector: None,
            pagination_pattern: None,
            max_pages: 1,
            allowed_hosts: Vec::new(),
            status: ListPageStatus::Active,
            last_crawled_at: None,
            last_article_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_cookie_string_round_trip() {
        let cookies = parse_cookie_string(" userid=42; sess=abc==; ;bad");
        assert_eq!(
            cookies,
            vec![
                ("userid".to_string(), "42".to_string()),
                ("sess".to_string(), "abc==".to_string()),
            ]
        );
        assert_eq!(cookie_header(&cookies), "userid=42; sess=abc==");
    }

    #[test]
    fn test_registry_dispatch_by_scheme() {
        let registry = SourceRegistry::new();
        assert!(registry.for_page(&page("https://a.gov/list.html")).unwrap().is_none());
        assert!(matches!(
            registry.for_page(&page("fenbi://exam?year=2025")),
            Err(SourceError::Config(_))
        ));
    }
}
