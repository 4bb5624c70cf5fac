// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::context::{enqueue_unique, CrawlerDeps};
use crate::domain::models::article::{Article, ArticleCandidate};
use crate::domain::models::list_page::ListPage;
use crate::domain::models::task::{ArticleFetchPayload, ListMonitorPayload, TaskKind};
use crate::domain::services::list_parser::{parse_list, ExtractionMethod, ListParseOutput, ListParseRequest};
use crate::domain::services::llm_service::LlmError;
use crate::engines::traits::FetchRequest;
use crate::queue::handler::decode_payload;
use crate::queue::{EnqueueOptions, HandlerOutcome, TaskContext, TaskHandler};
use crate::utils::errors::PipelineError;
use crate::utils::text_encoding::decode_html;
use crate::utils::url_utils::{normalize_url, sha256_hex};

/// 启发式结果少于该数目时询问 LLM
const MIN_HEURISTIC_ARTICLES: usize = 5;

/// 单个列表页的处理结果
#[derive(Debug, Default)]
struct PageStats {
    candidates: usize,
    enqueued: usize,
    duplicates: usize,
}

/// 列表页监控处理器（`crawler:list_monitor`）
///
/// 列表页逐个顺序处理；单页失败记录日志后继续。全部失败时返回首个错误；
/// 部分失败且其中有暂时性错误时整体交给 Broker 重试，已处理的页面在重试中按文章去重。
pub struct ListMonitorHandler {
    deps: Arc<CrawlerDeps>,
}

impl ListMonitorHandler {
    pub fn new(deps: Arc<CrawlerDeps>) -> Self {
        Self { deps }
    }

    async fn resolve(&self, payload: &ListMonitorPayload) -> Result<Vec<ListPage>, PipelineError> {
        if payload.list_page_ids.is_empty() {
            return Ok(self.deps.list_pages.find_active().await?);
        }
        let mut pages = Vec::with_capacity(payload.list_page_ids.len());
        for id in &payload.list_page_ids {
            match self.deps.list_pages.find_by_id(*id).await? {
                Some(page) if page.is_active() => pages.push(page),
                Some(page) => debug!(list_page_id = id, status = page.status.as_str(), "列表页未启用，跳过"),
                None => warn!(list_page_id = id, "列表页不存在"),
            }
        }
        Ok(pages)
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: ListMonitorPayload = decode_payload(payload)?;
        let pages = self.resolve(&payload).await?;
        let total = pages.len();

        let mut stats = PageStats::default();
        let mut failed = 0usize;
        let mut first_error = None;
        let mut first_transient = None;

        for (idx, page) in pages.iter().enumerate() {
            ctx.checkpoint()?;
            match self.monitor_page(ctx, page).await {
                Ok(page_stats) => {
                    stats.candidates += page_stats.candidates;
                    stats.enqueued += page_stats.enqueued;
                    stats.duplicates += page_stats.duplicates;
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    warn!(list_page_id = page.id, url = %page.url, "列表页监控失败: {}", e);
                    self.deps
                        .log_warn(ctx.task_id, format!("列表页 {} 监控失败: {}", page.url, e))
                        .await;
                    failed += 1;
                    if e.is_retryable() && first_transient.is_none() {
                        first_transient = Some(e.clone());
                    }
                    first_error.get_or_insert(e);
                }
            }
            ctx.set_progress((idx + 1) as f64 / total as f64).await;
        }

        if let Some(err) = first_error {
            if failed == total {
                return Err(err);
            }
        }
        if let Some(err) = first_transient {
            info!(pages = total, failed, enqueued = stats.enqueued, "部分列表页暂时失败，整体重试");
            return Err(err);
        }

        info!(
            pages = total,
            failed,
            candidates = stats.candidates,
            enqueued = stats.enqueued,
            "列表页监控完成"
        );
        ctx.set_result(json!({
            "pages": total,
            "failed_pages": failed,
            "candidates": stats.candidates,
            "enqueued": stats.enqueued,
            "duplicates": stats.duplicates,
        }));
        Ok(())
    }

    #[instrument(skip(self, ctx, page), fields(list_page_id = page.id, url = %page.url))]
    async fn monitor_page(&self, ctx: &TaskContext, page: &ListPage) -> Result<PageStats, PipelineError> {
        let candidates = match self.deps.sources.for_page(page)? {
            Some(source) => {
                ctx.run(async {
                    source
                        .list(page, ctx.cancellation())
                        .await
                        .map_err(PipelineError::from)
                })
                .await?
            }
            None => self.crawl_html(ctx, page).await?,
        };

        let mut stats = self.dispatch(ctx, page, candidates).await?;
        self.deps
            .list_pages
            .update_crawl_result(page.id, Utc::now(), stats.candidates as i32)
            .await?;
        stats.duplicates = stats.candidates - stats.enqueued;
        Ok(stats)
    }

    /// 抓取并解析 HTML 列表页，最多翻 `max_pages` 页
    ///
    /// 任一页失败整体返回错误，`last_crawled_at` 只在完整翻页后推进。
    async fn crawl_html(&self, ctx: &TaskContext, page: &ListPage) -> Result<Vec<ArticleCandidate>, PipelineError> {
        let limits = self.deps.limits;
        let mut url = page.url.clone();
        let mut selector = page.article_selector.clone();
        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for page_no in 1..=page.max_pages.max(1) {
            if !visited.insert(url.clone()) {
                break;
            }
            let request = FetchRequest::get(&url, limits.timeout, limits.max_bytes);
            let response = ctx
                .run(async {
                    self.deps
                        .fetcher
                        .fetch(&request, ctx.cancellation())
                        .await
                        .map_err(PipelineError::from)
                })
                .await?;
            if let Some(err) = response.status_error() {
                return Err(err);
            }
            let html = decode_html(&response.body, response.content_type());
            let parse = |selector: Option<&str>| {
                parse_list(ListParseRequest {
                    html: &html,
                    page_url: &response.final_url,
                    selector,
                    pagination_pattern: page.pagination_pattern.as_deref(),
                    current_page: page_no,
                    allowed_hosts: &page.allowed_hosts,
                })
            };

            let mut output = parse(selector.as_deref());
            if selector.is_none() && output.articles.len() < MIN_HEURISTIC_ARTICLES {
                if let Some(learned) = self.advise(ctx, page, &html, &output).await? {
                    let retried = parse(Some(&learned));
                    if retried.articles.len() > output.articles.len() {
                        info!(list_page_id = page.id, selector = %learned, "采用 LLM 推荐的文章选择器");
                        self.deps.list_pages.update_selector(page.id, &learned).await?;
                        selector = Some(learned);
                        output = retried;
                    }
                }
            }
            debug!(page = page_no, method = ?output.method, count = output.articles.len(), "列表页解析");

            for article in output.articles {
                if seen.insert(article.url.clone()) {
                    candidates.push(article);
                }
            }
            match output.next_page {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(candidates)
    }

    async fn advise(
        &self,
        ctx: &TaskContext,
        page: &ListPage,
        html: &str,
        output: &ListParseOutput,
    ) -> Result<Option<String>, PipelineError> {
        let Some(advisor) = &self.deps.advisor else {
            return Ok(None);
        };
        match advisor.advise(html, &output.fingerprint, ctx.cancellation()).await {
            Ok(verdict) => {
                if !verdict.is_list_page && output.method == ExtractionMethod::None {
                    warn!(list_page_id = page.id, "LLM 判断该页面不是列表页");
                }
                Ok(advisor.accepted_selector(&verdict))
            }
            Err(LlmError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(list_page_id = page.id, "列表页判定失败: {}", e);
                Ok(None)
            }
        }
    }

    /// 与文章表去重后逐个入队，再写入文章表
    ///
    /// 先入队后写表：写表前崩溃时重试会再次入队，由唯一键去重。
    async fn dispatch(
        &self,
        ctx: &TaskContext,
        page: &ListPage,
        candidates: Vec<ArticleCandidate>,
    ) -> Result<PageStats, PipelineError> {
        let mut seen = HashSet::new();
        let candidates: Vec<ArticleCandidate> = candidates
            .into_iter()
            .filter_map(|c| {
                let url = normalize_url(&c.url)?;
                seen.insert(url.clone()).then_some(ArticleCandidate { url, ..c })
            })
            .collect();

        let urls: Vec<String> = candidates.iter().map(|c| c.url.clone()).collect();
        let existing = self.deps.articles.existing_urls(page.id, &urls).await?;
        let fresh: Vec<&ArticleCandidate> = candidates
            .iter()
            .filter(|c| !existing.contains(&c.url))
            .collect();

        let mut stats = PageStats {
            candidates: candidates.len(),
            ..Default::default()
        };
        for candidate in &fresh {
            ctx.checkpoint()?;
            let payload = ArticleFetchPayload {
                url: candidate.url.clone(),
                title: candidate.title.clone(),
                source_list_id: page.id,
                source_name: page.source_name.clone(),
                category: page.category.clone(),
            };
            let opts = EnqueueOptions::default().unique(sha256_hex(&candidate.url));
            if enqueue_unique(&self.deps.broker, TaskKind::ArticleFetch, &payload, opts).await? {
                stats.enqueued += 1;
            }
        }

        let now = Utc::now();
        let rows: Vec<Article> = fresh
            .iter()
            .map(|c| Article {
                id: 0,
                source_list_id: page.id,
                url: c.url.clone(),
                title: c.title.clone(),
                category: page.category.clone(),
                discovered_at: now,
            })
            .collect();
        if !rows.is_empty() {
            self.deps.articles.insert_many(&rows).await?;
        }

        debug!(
            list_page_id = page.id,
            candidates = stats.candidates,
            fresh = fresh.len(),
            enqueued = stats.enqueued,
            "文章入队完成"
        );
        Ok(stats)
    }
}

#[async_trait]
impl TaskHandler for ListMonitorHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::list_page::NewListPage;
    use crate::test_support::{self, memory_db, repositories, RecordingIndex};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LIST_HTML: &str = r#"<html><body>
        <ul class="list">
          <li><a href="/art/2025/1.html">2025年度考试录用公务员公告</a><span>2025-03-01</span></li>
          <li><a href="/art/2025/2.html">2025年度公开遴选公务员公告</a><span>2025-03-02</span></li>
          <li><a href="/art/2025/3.html">2025年度考试录用公务员报名情况</a><span>2025-03-03</span></li>
        </ul></body></html>"#;

    async fn mount_list(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path("/channel/list.html"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_raw(LIST_HTML, "text/html; charset=utf-8"),
            )
            .mount(server)
            .await;
    }

    fn context() -> TaskContext {
        TaskContext::detached(TaskKind::ListMonitor, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_new_articles_enqueued_once() {
        // Given: 一个含三篇文章的列表页
        let server = MockServer::start().await;
        mount_list(&server, 200).await;
        let db = memory_db().await;
        let repos = repositories(&db);
        let broker = test_support::broker(&repos);
        let deps = test_support::crawler_deps(
            &repos,
            broker.clone(),
            test_support::fetch_limits(),
            Arc::new(RecordingIndex::default()),
        );
        let mut new_page = NewListPage::new(format!("{}/channel/list.html", server.uri()), "某省人社厅");
        new_page.article_selector = Some("ul.list li a".into());
        let page = repos.list_pages.create(&new_page).await.unwrap();
        let handler = ListMonitorHandler::new(Arc::new(deps));
        let payload = json!({ "list_page_ids": [page.id] });

        // When: 连续监控两次
        let first_ctx = context();
        let first = handler.handle(&first_ctx, &payload).await;
        let second_ctx = context();
        let second = handler.handle(&second_ctx, &payload).await;

        // Then: 第一次入队三篇，第二次全部是重复
        assert_eq!(first, HandlerOutcome::Done);
        assert_eq!(second, HandlerOutcome::Done);
        let first_result = first_ctx.take_result().unwrap();
        assert_eq!(first_result["enqueued"], 3);
        let second_result = second_ctx.take_result().unwrap();
        assert_eq!(second_result["enqueued"], 0);
        assert_eq!(second_result["duplicates"], 3);
        assert_eq!(broker.total_depth().await.unwrap(), 3);

        let page = repos.list_pages.find_by_id(page.id).await.unwrap().unwrap();
        assert!(page.last_crawled_at.is_some());
        assert_eq!(page.last_article_count, 3);
    }

    #[tokio::test]
    async fn test_partial_transient_failure_retries_task() {
        // Given: 两个列表页，一个正常，一个返回 503
        let server = MockServer::start().await;
        mount_list(&server, 200).await;
        Mock::given(method("GET"))
            .and(path("/channel/down.html"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let db = memory_db().await;
        let repos = repositories(&db);
        let broker = test_support::broker(&repos);
        let deps = test_support::crawler_deps(
            &repos,
            broker.clone(),
            test_support::fetch_limits(),
            Arc::new(RecordingIndex::default()),
        );
        let mut healthy = NewListPage::new(format!("{}/channel/list.html", server.uri()), "某省人社厅");
        healthy.article_selector = Some("ul.list li a".into());
        let healthy = repos.list_pages.create(&healthy).await.unwrap();
        let mut down = NewListPage::new(format!("{}/channel/down.html", server.uri()), "某市");
        down.article_selector = Some("ul.list li a".into());
        let down = repos.list_pages.create(&down).await.unwrap();
        let handler = ListMonitorHandler::new(Arc::new(deps));
        let payload = json!({ "list_page_ids": [healthy.id, down.id] });

        // When: 运行两次，模拟 Broker 重试
        let first = handler.handle(&context(), &payload).await;
        let second = handler.handle(&context(), &payload).await;

        // Then: 整体重试，正常页的文章只入队一次
        assert!(matches!(first, HandlerOutcome::Retry(PipelineError::Transient(_))));
        assert!(matches!(second, HandlerOutcome::Retry(_)));
        assert_eq!(broker.total_depth().await.unwrap(), 3);
        let healthy = repos.list_pages.find_by_id(healthy.id).await.unwrap().unwrap();
        assert_eq!(healthy.last_article_count, 3);
        let down = repos.list_pages.find_by_id(down.id).await.unwrap().unwrap();
        assert!(down.last_crawled_at.is_none());
    }

    #[tokio::test]
    async fn test_failing_page_is_retried_and_logged() {
        // Given: 列表页持续返回 503
        let server = MockServer::start().await;
        mount_list(&server, 503).await;
        let db = memory_db().await;
        let repos = repositories(&db);
        let broker = test_support::broker(&repos);
        let deps = test_support::crawler_deps(
            &repos,
            broker.clone(),
            test_support::fetch_limits(),
            Arc::new(RecordingIndex::default()),
        );
        let page = repos
            .list_pages
            .create(&NewListPage::new(format!("{}/channel/list.html", server.uri()), "某市"))
            .await
            .unwrap();
        let handler = ListMonitorHandler::new(Arc::new(deps));

        // When
        let ctx = context();
        let outcome = handler.handle(&ctx, &json!({ "list_page_ids": [page.id] })).await;

        // Then: 暂时性错误交给 Broker 重试，游标不推进
        assert!(matches!(outcome, HandlerOutcome::Retry(_)));
        let logs = repos.logs.find_by_task(ctx.task_id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        let page = repos.list_pages.find_by_id(page.id).await.unwrap().unwrap();
        assert!(page.last_crawled_at.is_none());
        assert_eq!(broker.total_depth().await.unwrap(), 0);
    }
}
