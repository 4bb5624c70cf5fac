// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::{cookie_header, parse_cookie_string, ExternalSource, SourceError};
use crate::domain::models::article::ArticleCandidate;
use crate::domain::models::list_page::ListPage;
use crate::engines::traits::{FetchRequest, Fetcher};

const API_BASE: &str = "https://market-api.fenbi.com";
const QUERY_PATH: &str = "/toolkit/api/v1/pc/exam/queryByCondition?app=web&av=100&hav=100&kav=100";
const DETAIL_URL: &str = "https://www.fenbi.com/page/exam-information-detail";
const PAGE_SIZE: u32 = 15;
const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024;
const REQUIRED_COOKIES: [&str; 2] = ["userid", "sess"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    district_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exam_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<String>,
    start: u32,
    len: u32,
    need_total: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    stick_top_articles: Vec<ExamArticle>,
    #[serde(default)]
    articles: Vec<ExamArticle>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExamArticle {
    id: i64,
    title: String,
    #[serde(default)]
    issue_time: i64,
}

/// `fenbi://exam?year=&district_id=&exam_type=` 的查询条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FenbiQuery {
    pub year: Option<String>,
    pub district_id: Option<String>,
    pub exam_type: Option<String>,
}

impl FenbiQuery {
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        let url = Url::parse(raw).map_err(|e| SourceError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if url.scheme() != "fenbi" {
            return Err(SourceError::InvalidUrl(raw.to_string()));
        }
        let mut query = FenbiQuery::default();
        for (key, value) in url.query_pairs() {
            let value = value.trim();
            if value.is_empty() || value == "all" {
                continue;
            }
            match key.as_ref() {
                "year" => query.year = Some(value.to_string()),
                "district_id" => query.district_id = Some(value.to_string()),
                "exam_type" => query.exam_type = Some(value.to_string()),
                _ => {}
            }
        }
        Ok(query)
    }
}

/// 粉笔考试资讯
///
/// 使用导入的会话 Cookie 调用资讯查询接口；不做登录。
pub struct FenbiSource {
    fetcher: Arc<dyn Fetcher>,
    cookies: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl FenbiSource {
    pub fn new(fetcher: Arc<dyn Fetcher>, cookies: Option<String>, timeout: Duration) -> Self {
        Self {
            fetcher,
            cookies,
            base_url: API_BASE.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn cookie(&self) -> Result<String, SourceError> {
        let raw = self
            .cookies
            .as_deref()
            .ok_or_else(|| SourceError::Config("未导入粉笔 Cookie".to_string()))?;
        let cookies = parse_cookie_string(raw);
        for required in REQUIRED_COOKIES {
            if !cookies.iter().any(|(k, v)| k == required && !v.is_empty()) {
                return Err(SourceError::Config(format!("粉笔 Cookie 缺少 {}", required)));
            }
        }
        Ok(cookie_header(&cookies))
    }

    async fn query_page(
        &self,
        query: &FenbiQuery,
        page: u32,
        cookie: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryData, SourceError> {
        let body = QueryRequest {
            district_id: query.district_id.clone(),
            exam_type: query.exam_type.clone(),
            year: query.year.clone(),
            start: (page - 1) * PAGE_SIZE,
            len: PAGE_SIZE,
            need_total: true,
        };
        let body = serde_json::to_vec(&body).map_err(|e| SourceError::Decode(e.to_string()))?;

        let mut request = FetchRequest::get(
            format!("{}{}", self.base_url, QUERY_PATH),
            self.timeout,
            MAX_RESPONSE_BYTES,
        )
        .header("content-type", "application/json")
        .header("referer", "https://www.fenbi.com/")
        .header("origin", "https://www.fenbi.com")
        .header("cookie", cookie);
        request.method = reqwest::Method::POST;
        request.body = Some(Bytes::from(body));

        let response = self.fetcher.fetch(&request, cancel).await?;
        if response.status == 401 || response.status == 403 {
            return Err(SourceError::Config("粉笔会话已失效，请重新导入 Cookie".to_string()));
        }
        if !response.is_success() {
            return Err(SourceError::Api {
                code: response.status as i64,
                message: "HTTP 状态异常".to_string(),
            });
        }

        let parsed: QueryResponse =
            serde_json::from_slice(&response.body).map_err(|e| SourceError::Decode(e.to_string()))?;
        if parsed.code != 1 {
            return Err(SourceError::Api {
                code: parsed.code,
                message: parsed.msg,
            });
        }
        Ok(parsed.data.unwrap_or_default())
    }
}

fn candidate(article: ExamArticle) -> ArticleCandidate {
    let mut candidate = ArticleCandidate::new(
        format!("{}/{}", DETAIL_URL, article.id),
        article.title.trim(),
    );
    if article.issue_time > 0 {
        candidate.published_hint = Utc
            .timestamp_millis_opt(article.issue_time)
            .single()
            .map(|t| t.format("%Y-%m-%d").to_string());
    }
    candidate
}

#[async_trait]
impl ExternalSource for FenbiSource {
    fn scheme(&self) -> &'static str {
        "fenbi"
    }

    async fn list(
        &self,
        page: &ListPage,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArticleCandidate>, SourceError> {
        let query = FenbiQuery::parse(&page.url)?;
        let cookie = self.cookie()?;
        let mut candidates: Vec<ArticleCandidate> = Vec::new();

        for page_no in 1..=page.max_pages.max(1) {
            let data = self.query_page(&query, page_no, &cookie, cancel).await?;
            let fetched = data.articles.len();
            let articles = if page_no == 1 {
                data.stick_top_articles.into_iter().chain(data.articles).collect::<Vec<_>>()
            } else {
                data.articles
            };
            for article in articles {
                let candidate = candidate(article);
                if !candidates.iter().any(|c| c.url == candidate.url) {
                    candidates.push(candidate);
                }
            }
            debug!(page = page_no, fetched, total = data.total, "粉笔资讯分页");
            if fetched == 0 || page_no * PAGE_SIZE >= data.total {
                break;
            }
        }

        info!(list_page_id = page.id, count = candidates.len(), "粉笔资讯列表完成");
        Ok(candidates)
    }
}
