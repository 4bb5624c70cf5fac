// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::context::{enqueue_unique, publish_offset, CrawlerDeps};
use crate::domain::models::announcement::{Announcement, AnnouncementStatus, Attachment, AttachmentKind};
use crate::domain::models::task::{ArticleFetchPayload, PositionExtractPayload, TaskKind};
use crate::domain::services::position_normalizer::canonical_province;
use crate::engines::traits::{FetchError, FetchRequest, FetchResponse};
use crate::parsers::DocumentKind;
use crate::queue::handler::decode_payload;
use crate::queue::{EnqueueOptions, HandlerOutcome, TaskContext, TaskHandler};
use crate::utils::errors::{PipelineError, RepositoryError};
use crate::utils::text_encoding::decode_html;
use crate::utils::url_utils::normalize_url;

/// 公告抓取处理器（`crawler:announcement`）
///
/// 同一 URL 只创建一条公告；已存在且仍待提取时只补入职位提取任务。
pub struct ArticleFetchHandler {
    deps: Arc<CrawlerDeps>,
}

/// 发布日期按北京时间零点记录
fn publish_time(date: NaiveDate) -> Option<chrono::DateTime<Utc>> {
    let local = date.and_hms_opt(0, 0, 0)?;
    let offset = publish_offset()?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

impl ArticleFetchHandler {
    pub fn new(deps: Arc<CrawlerDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: ArticleFetchPayload = decode_payload(payload)?;
        let url = normalize_url(&payload.url)
            .ok_or_else(|| PipelineError::validation(format!("无效的公告 URL: {}", payload.url)))?;

        if let Some(existing) = self.deps.announcements.find_by_url(&url).await? {
            debug!(url = %url, announcement_id = existing.id, "公告已存在");
            // 上次保存后入队失败时在这里补上；唯一键保证不会重复提取
            let requeued = if existing.status == AnnouncementStatus::Pending && !existing.truncated {
                self.enqueue_extraction(existing.id).await?
            } else {
                false
            };
            ctx.set_result(json!({
                "announcement_id": existing.id,
                "existing": true,
                "requeued": requeued,
            }));
            return Ok(());
        }

        let response = self.fetch(ctx, &payload, &url).await?;
        if let Some(err) = response.status_error() {
            return Err(err);
        }

        let kind = DocumentKind::detect(&response.body, &response.final_url, response.content_type());
        let announcement = match kind {
            DocumentKind::Html | DocumentKind::Unknown => self.from_html(ctx, &payload, &url, &response).await?,
            _ => attachment_only(&payload, &url, &response, kind),
        };

        let Some(saved) = self.persist(&announcement).await? else {
            ctx.set_result(json!({ "existing": true }));
            return Ok(());
        };

        self.enqueue_extraction(saved.id).await?;

        info!(
            announcement_id = saved.id,
            announcement_type = %saved.announcement_type,
            confidence = saved.confidence,
            partial = saved.partial,
            attachments = saved.attachments.len(),
            "公告已保存"
        );
        ctx.set_result(json!({
            "announcement_id": saved.id,
            "announcement_type": saved.announcement_type.as_str(),
            "partial": saved.partial,
        }));
        Ok(())
    }

    async fn enqueue_extraction(&self, announcement_id: i64) -> Result<bool, PipelineError> {
        enqueue_unique(
            &self.deps.broker,
            TaskKind::PositionExtract,
            &PositionExtractPayload { announcement_id },
            EnqueueOptions::default().unique(format!("positions:{}", announcement_id)),
        )
        .await
    }

    /// 响应体超限时记录待人工处理的公告，然后终止任务
    #[instrument(skip(self, ctx, payload), fields(url = %url))]
    async fn fetch(
        &self,
        ctx: &TaskContext,
        payload: &ArticleFetchPayload,
        url: &str,
    ) -> Result<FetchResponse, PipelineError> {
        let limits = self.deps.limits;
        let max_bytes = match AttachmentKind::from_name(url) {
            AttachmentKind::Other => limits.max_bytes,
            _ => limits.max_document_bytes,
        };
        let request = FetchRequest::get(url, limits.timeout, max_bytes);
        let result = ctx
            .run(async { Ok(self.deps.fetcher.fetch(&request, ctx.cancellation()).await) })
            .await?;

        match result {
            Ok(response) => Ok(response),
            Err(FetchError::PayloadTooLarge { limit }) => {
                warn!(url, limit, "公告响应体超限");
                let mut placeholder = Announcement::new(url, payload.title.trim());
                placeholder.content = format!("响应体超过 {} 字节上限，待人工处理", limit);
                placeholder.truncated = true;
                placeholder.status = AnnouncementStatus::Pending;
                placeholder.source_list_id = Some(payload.source_list_id);
                placeholder.source_name = payload.source_name.clone();
                placeholder.category = payload.category.clone();
                self.persist(&placeholder).await?;
                self.deps
                    .log_warn(ctx.task_id, format!("{} 响应体超过 {} 字节", url, limit))
                    .await;
                Err(PipelineError::permanent(format!("响应体超过 {} 字节上限", limit)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn from_html(
        &self,
        ctx: &TaskContext,
        payload: &ArticleFetchPayload,
        url: &str,
        response: &FetchResponse,
    ) -> Result<Announcement, PipelineError> {
        let html = decode_html(&response.body, response.content_type());
        let cleaned = ctx
            .run(self.deps.cleaner.clean(&html, &response.final_url, ctx.cancellation()))
            .await?;

        let title = [cleaned.title.trim(), payload.title.trim()]
            .into_iter()
            .find(|t| !t.is_empty())
            .unwrap_or(url)
            .to_string();
        let classification = ctx
            .run(async {
                self.deps
                    .extractor
                    .classify(&title, &cleaned.content, ctx.cancellation())
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;

        let mut announcement = Announcement::new(url, title);
        announcement.published_at = cleaned.publish_date.and_then(publish_time);
        announcement.announcement_type = classification.announcement_type;
        announcement.exam_type = classification.exam_type;
        announcement.province = canonical_province(&announcement.title);
        announcement.content = cleaned.content;
        announcement.raw_html = Some(html);
        announcement.attachments = cleaned.attachments;
        announcement.confidence = cleaned.confidence;
        announcement.partial = cleaned.partial;
        announcement.truncated = cleaned.truncated;
        announcement.template_version = cleaned.template_version;
        announcement.source_list_id = Some(payload.source_list_id);
        announcement.source_name = match cleaned.source {
            Some(source) if payload.source_name.is_empty() => source,
            _ => payload.source_name.clone(),
        };
        announcement.category = payload.category.clone();
        announcement.etag = response.header("etag").map(str::to_string);
        announcement.last_modified = response.header("last-modified").map(str::to_string);
        Ok(announcement)
    }

    /// 写入公告；URL 冲突视为成功的空操作，返回 `None`
    async fn persist(&self, announcement: &Announcement) -> Result<Option<Announcement>, PipelineError> {
        announcement
            .validate()
            .map_err(|e| PipelineError::validation(e.to_string()))?;
        match self.deps.announcements.create(announcement).await {
            Ok(saved) => Ok(Some(saved)),
            Err(RepositoryError::AlreadyExists) => {
                debug!(url = %announcement.url, "公告已被并发创建");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// 响应本身是文档：只保存一个附件，解析放到职位提取阶段
fn attachment_only(
    payload: &ArticleFetchPayload,
    url: &str,
    response: &FetchResponse,
    kind: DocumentKind,
) -> Announcement {
    let file_name = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(|name| urlencoding::decode(name).map(|n| n.into_owned()).unwrap_or_else(|_| name.to_string()))
        .unwrap_or_else(|| kind.as_str().to_string());
    let title = match payload.title.trim() {
        "" => file_name.clone(),
        t => t.to_string(),
    };

    let mut attachment = Attachment::new(file_name, response.final_url.clone());
    if let Some(ct) = response.content_type() {
        attachment.content_type = ct.to_string();
    }

    let mut announcement = Announcement::new(url, title);
    announcement.announcement_type = crate::domain::services::position_extractor::classify_by_keywords(
        &announcement.title,
    );
    announcement.province = canonical_province(&announcement.title);
    announcement.attachments.push(attachment);
    announcement.partial = true;
    announcement.source_list_id = Some(payload.source_list_id);
    announcement.source_name = payload.source_name.clone();
    announcement.category = payload.category.clone();
    announcement.etag = response.header("etag").map(str::to_string);
    announcement.last_modified = response.header("last-modified").map(str::to_string);
    announcement
}

#[async_trait]
impl TaskHandler for ArticleFetchHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}
