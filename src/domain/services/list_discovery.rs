// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 列表页发现
//!
//! 从聚合页中找出公告链接，按 URL 形态推断其所属列表页，
//! 必要时抽样文章页用面包屑确认，最后以 `paused` 状态登记待审核。

use lru::LruCache;
use parking_lot::Mutex;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::list_parser::page_skeleton;
use super::llm_service::{LlmError, LlmService};
use super::prompts::PromptKind;
use crate::domain::models::article::ArticleCandidate;
use crate::domain::models::list_page::{CrawlFrequency, ListPageStatus, NewListPage};
use crate::domain::models::task::ListDiscoveryPayload;
use crate::domain::repositories::list_page_repository::ListPageRepository;
use crate::engines::traits::{FetchRequest, Fetcher};
use crate::utils::errors::{PipelineError, RepositoryError};
use crate::utils::text_encoding::decode_html;
use crate::utils::url_utils::{normalize_url, resolve_url};

const TEXT_KEYWORDS: &[&str] = &[
    "公告", "招录", "招考", "招聘", "报名", "考试", "公务员", "事业单位", "选调", "遴选",
];
const URL_KEYWORDS: &[&str] = &[
    "notice", "news", "article", "info", "detail", "gonggao", "xinxi", "zhaokao", "zhaopin",
];
const BACK_LINK_TEXTS: &[&str] = &["返回列表", "更多", "返回"];

/// 单次发现最多抽样的文章页
const MAX_SAMPLES: usize = 10;
const SKELETON_CHARS: usize = 6000;

static_selector!(LINK, "a[href]");
static_selector!(
    BREADCRUMB_LINKS,
    ".breadcrumb a, .crumb a, .crumbs a, .position a, .location a, .dqwz a, .bread a, .nav-path a"
);
static_regex!(DATED_LEAF, r"^t\d{8}_\d+\.s?html?$");
static_regex!(NUMERIC_LEAF, r"^\d+\.s?html?$");
static_regex!(DATE_SEGMENT, r"^(?:\d{4}|\d{6}|\d{8}|\d{4}-\d{2}(?:-\d{2})?)$");

/// 聚合页中像公告的链接
pub fn find_announcement_links(html: &str, page_url: &str) -> Vec<ArticleCandidate> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Some(link) = LINK.as_ref() else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(link) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = anchor.text().collect::<String>();
        let text = text.split_whitespace().collect::<String>();
        let Some(url) = resolve_url(&base, href.trim())
            .ok()
            .and_then(|u| normalize_url(u.as_str()))
        else {
            continue;
        };
        let lower = Url::parse(&url)
            .map(|u| format!("{}?{}", u.path(), u.query().unwrap_or_default()).to_ascii_lowercase())
            .unwrap_or_default();
        let by_text = text.chars().count() >= 6 && TEXT_KEYWORDS.iter().any(|k| text.contains(k));
        let by_url = URL_KEYWORDS.iter().any(|k| lower.contains(k));
        if (by_text || by_url) && seen.insert(url.clone()) {
            links.push(ArticleCandidate::new(url, text));
        }
    }
    links
}

/// 按 URL 形态推断文章所属的列表页
///
/// - `t20250301_123.shtml` 与纯数字文件名：取所在目录
/// - 日期目录（`/2025/03/`、`/202503/`）：截到日期目录之前
/// - `detail?id=`：去掉查询串后取所在目录
/// - 其他：取上一级路径
pub fn infer_list_url(article_url: &str) -> Option<String> {
    let mut url = Url::parse(article_url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(String::from).collect())
        .unwrap_or_default();
    if segments.is_empty() {
        return None;
    }

    let is_date = |s: &str| DATE_SEGMENT.as_ref().map(|re| re.is_match(s)).unwrap_or(false);
    let directory: Vec<String> = match segments.iter().position(|s| is_date(s)) {
        Some(idx) => segments[..idx].to_vec(),
        None => segments[..segments.len() - 1].to_vec(),
    };

    let leaf = segments.last().map(String::as_str).unwrap_or_default();
    let shaped = DATED_LEAF.as_ref().map(|re| re.is_match(leaf)).unwrap_or(false)
        || NUMERIC_LEAF.as_ref().map(|re| re.is_match(leaf)).unwrap_or(false)
        || url.query_pairs().any(|(k, _)| k.eq_ignore_ascii_case("id"));
    debug!(article_url, shaped, "推断列表页");

    url.set_query(None);
    url.set_fragment(None);
    let path = if directory.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", directory.join("/"))
    };
    url.set_path(&path);
    Some(url.to_string())
}

/// 文章页中的面包屑或返回列表链接
pub fn breadcrumb_list_url(html: &str, article_url: &str) -> Option<String> {
    let base = Url::parse(article_url).ok()?;
    let document = Html::parse_document(html);
    let resolve = |a: ElementRef<'_>| -> Option<String> {
        let href = a.value().attr("href")?.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        let url = resolve_url(&base, href).ok()?;
        let url = normalize_url(url.as_str())?;
        (url != article_url && url.trim_end_matches('/') != base.origin().ascii_serialization())
            .then_some(url)
    };

    if let Some(selector) = BREADCRUMB_LINKS.as_ref() {
        let crumbs: Vec<ElementRef<'_>> = document.select(selector).collect();
        if let Some(url) = crumbs.into_iter().rev().find_map(&resolve) {
            return Some(url);
        }
    }
    let link = LINK.as_ref()?;
    document
        .select(link)
        .filter(|a| {
            let text = a.text().collect::<String>();
            let text = text.trim();
            BACK_LINK_TEXTS.iter().any(|t| text == *t)
        })
        .find_map(&resolve)
}

/// LLM 对一个页面是否为列表页的判断
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListPageVerdict {
    pub is_list_page: bool,
    #[serde(default)]
    pub article_selector: Option<String>,
    pub confidence: i32,
}

/// 列表页判定，结果按浅层 DOM 指纹缓存
pub struct ListPageAdvisor {
    llm: Arc<LlmService>,
    cache: Mutex<LruCache<String, ListPageVerdict>>,
}

impl ListPageAdvisor {
    pub fn new(llm: Arc<LlmService>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            llm,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// 询问页面是否为列表页及文章选择器
    ///
    /// 同一指纹只调用一次 LLM；低于置信度阈值的判断同样缓存，避免重复询问。
    pub async fn advise(
        &self,
        html: &str,
        fingerprint: &str,
        cancel: &CancellationToken,
    ) -> Result<ListPageVerdict, LlmError> {
        if let Some(hit) = self.cache.lock().get(fingerprint).cloned() {
            return Ok(hit);
        }

        let skeleton = page_skeleton(html, SKELETON_CHARS);
        let verdict: ListPageVerdict = self
            .llm
            .call_json(PromptKind::ListPage, &skeleton, cancel)
            .await?;
        let verdict = ListPageVerdict {
            article_selector: verdict
                .article_selector
                .filter(|s| scraper::Selector::parse(s.trim()).is_ok()),
            ..verdict
        };
        self.cache.lock().put(fingerprint.to_string(), verdict.clone());
        Ok(verdict)
    }

    /// 可直接采用的选择器
    pub fn accepted_selector(&self, verdict: &ListPageVerdict) -> Option<String> {
        if verdict.is_list_page && self.llm.gate(verdict.confidence).is_ok() {
            verdict.article_selector.clone()
        } else {
            None
        }
    }
}

/// 一次发现的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub links: usize,
    pub created: Vec<String>,
    pub existing: usize,
}

/// 列表页发现服务
pub struct ListDiscoveryService {
    fetcher: Arc<dyn Fetcher>,
    list_pages: Arc<dyn ListPageRepository>,
    timeout: Duration,
    max_bytes: usize,
}

impl ListDiscoveryService {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        list_pages: Arc<dyn ListPageRepository>,
        timeout: Duration,
        max_bytes: usize,
    ) -> Self {
        Self {
            fetcher,
            list_pages,
            timeout,
            max_bytes,
        }
    }

    async fn fetch_html(&self, url: &str, cancel: &CancellationToken) -> Result<(String, String), PipelineError> {
        let request = FetchRequest::get(url, self.timeout, self.max_bytes);
        let response = self.fetcher.fetch(&request, cancel).await?;
        if let Some(err) = response.status_error() {
            return Err(err);
        }
        let html = decode_html(&response.body, response.content_type());
        Ok((html, response.final_url))
    }

    /// 处理一组聚合页
    pub async fn discover(
        &self,
        payload: &ListDiscoveryPayload,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryReport, PipelineError> {
        let mut report = DiscoveryReport::default();
        let samples = payload.sample_articles.unwrap_or(0).min(MAX_SAMPLES);

        for aggregator in &payload.aggregator_urls {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let (html, final_url) = self.fetch_html(aggregator, cancel).await?;
            let links = find_announcement_links(&html, &final_url);
            report.links += links.len();

            // 列表页 URL → 链接文字
            let mut inferred: BTreeMap<String, String> = BTreeMap::new();
            for (idx, link) in links.iter().enumerate() {
                let mut list_url = infer_list_url(&link.url);
                if idx < samples {
                    match self.fetch_html(&link.url, cancel).await {
                        Ok((article_html, article_url)) => {
                            if let Some(confirmed) = breadcrumb_list_url(&article_html, &article_url) {
                                list_url = Some(confirmed);
                            }
                        }
                        Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                        Err(e) => warn!(url = %link.url, "抽样文章抓取失败: {}", e),
                    }
                }
                if let Some(list_url) = list_url {
                    inferred.entry(list_url).or_insert_with(|| link.title.clone());
                }
            }

            for (list_url, hint) in inferred {
                self.register(&list_url, aggregator, &hint, &mut report).await?;
            }
        }

        info!(
            links = report.links,
            created = report.created.len(),
            existing = report.existing,
            "列表页发现完成"
        );
        Ok(report)
    }

    async fn register(
        &self,
        list_url: &str,
        aggregator: &str,
        hint: &str,
        report: &mut DiscoveryReport,
    ) -> Result<(), PipelineError> {
        if self.list_pages.find_by_url(list_url).await?.is_some() {
            report.existing += 1;
            return Ok(());
        }
        let mut page = NewListPage::new(list_url, source_name(list_url, aggregator));
        page.category = hint.chars().take(50).collect();
        page.crawl_frequency = CrawlFrequency::Daily;
        page.status = ListPageStatus::Paused;

        match self.list_pages.create(&page).await {
            Ok(created) => {
                info!(id = created.id, url = %created.url, "发现新列表页，待审核");
                report.created.push(created.url);
            }
            Err(RepositoryError::AlreadyExists) => report.existing += 1,
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

fn source_name(list_url: &str, aggregator: &str) -> String {
    Url::parse(list_url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| aggregator.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert!(LINK.is_some() && BREADCRUMB_LINKS.is_some());
        assert!(DATED_LEAF.is_some() && NUMERIC_LEAF.is_some() && DATE_SEGMENT.is_some());
    }

    #[test]
    fn test_infer_list_url_rules() {
        let cases = [
            (
                "https://rst.example.gov.cn/col/col123/t20250301_456.shtml",
                "https://rst.example.gov.cn/col/col123/",
            ),
            (
                "https://a.example.gov.cn/tzgg/2025/03/01/abc.html",
                "https://a.example.gov.cn/tzgg/",
            ),
            (
                "https://a.example.gov.cn/news/202503/abc.html",
                "https://a.example.gov.cn/news/",
            ),
            (
                "https://a.example.gov.cn/zwgk/notice/12345.html",
                "https://a.example.gov.cn/zwgk/notice/",
            ),
            (
                "https://a.example.gov.cn/info/detail.jsp?id=9",
                "https://a.example.gov.cn/info/",
            ),
        ];
        for (article, expected) in cases {
            assert_eq!(infer_list_url(article).as_deref(), Some(expected), "{}", article);
        }
        assert_eq!(infer_list_url("https://a.example.gov.cn/"), None);
        assert_eq!(infer_list_url("fenbi://exam"), None);
    }

    #[test]
    fn test_find_announcement_links() {
        let html = r#"<html><body>
            <a href="https://rst.a.gov.cn/t20250301_1.shtml">2025年某省考试录用公务员公告</a>
            <a href="/zhaopin/2.html">查看</a>
            <a href="/about.html">关于我们</a>
            <a href="/zhaopin/2.html">重复</a>
        </body></html>"#;
        let links = find_announcement_links(html, "https://hub.example.com/");
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://rst.a.gov.cn/t20250301_1.shtml", "https://hub.example.com/zhaopin/2.html"]
        );
    }

    #[test]
    fn test_breadcrumb_prefers_last_crumb() {
        let html = r#"<html><body>
            <div class="breadcrumb"><a href="/">首页</a> &gt; <a href="/tzgg/">通知公告</a></div>
            <a href="/list/">返回列表</a></body></html>"#;
        assert_eq!(
            breadcrumb_list_url(html, "https://a.example.gov.cn/tzgg/1.html").as_deref(),
            Some("https://a.example.gov.cn/tzgg/")
        );

        let html = r#"<html><body><a href="/list/">返回列表</a></body></html>"#;
        assert_eq!(
            breadcrumb_list_url(html, "https://a.example.gov.cn/x/1.html").as_deref(),
            Some("https://a.example.gov.cn/list/")
        );
    }
}
