// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Datelike;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::context::{enqueue_unique, publish_offset, CrawlerDeps};
use crate::domain::models::announcement::{Announcement, AnnouncementStatus, AnnouncementType, Attachment};
use crate::domain::models::position::ParsedPosition;
use crate::domain::models::reminder::AnnouncementPushPayload;
use crate::domain::models::task::{PositionExtractPayload, TaskKind};
use crate::domain::services::llm_service::LlmError;
use crate::domain::services::position_normalizer::{canonical_province, normalize, ExamInfo, NormalizeContext};
use crate::engines::traits::FetchRequest;
use crate::queue::handler::decode_payload;
use crate::queue::{EnqueueOptions, HandlerOutcome, TaskContext, TaskHandler};
use crate::utils::errors::PipelineError;
use crate::utils::url_utils::sha256_hex;

static_regex!(TITLE_YEAR, r"(20\d{2})\s*年");

/// 同一输入连续结构错误达到该次数后终止
const SCHEMA_VIOLATION_LIMIT: u32 = 2;

/// 提取阶段收集到的原始职位
#[derive(Debug, Default)]
struct Harvest {
    positions: Vec<ParsedPosition>,
    exam_info: ExamInfo,
    /// 来源置信度的最大值
    confidence: i32,
    partial: bool,
    attachments_parsed: usize,
}

impl Harvest {
    fn absorb(&mut self, positions: Vec<ParsedPosition>, confidence: i32) {
        if positions.is_empty() {
            return;
        }
        self.confidence = self.confidence.max(confidence);
        self.positions.extend(positions);
    }
}

/// 职位提取处理器（`crawler:positions`）
///
/// 顺序：正文表格、附件文档、LLM。附件解析也在这里完成。
pub struct PositionExtractHandler {
    deps: Arc<CrawlerDeps>,
}

/// 考试年份：标题中的年份优先，其次按北京时间取发布年份
///
/// 年度考试公告常在上一年年底发布，标题里的年份才是考试年度。
fn exam_year(announcement: &Announcement) -> Option<i32> {
    let from_title = TITLE_YEAR
        .as_ref()
        .and_then(|re| re.captures(&announcement.title))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    from_title.or_else(|| {
        let offset = publish_offset()?;
        announcement
            .published_at
            .map(|t| t.with_timezone(&offset).year())
    })
}

impl PositionExtractHandler {
    pub fn new(deps: Arc<CrawlerDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: PositionExtractPayload = decode_payload(payload)?;
        let mut announcement = self
            .deps
            .announcements
            .find_by_id(payload.announcement_id)
            .await?
            .ok_or_else(|| PipelineError::permanent(format!("公告 {} 不存在", payload.announcement_id)))?;

        let result = match announcement.announcement_type {
            AnnouncementType::RegistrationStats => self.registration_stats(ctx, &mut announcement).await?,
            AnnouncementType::ScoreRelease => self.score_lines(ctx, &mut announcement).await?,
            kind if kind.carries_positions() => self.positions(ctx, &mut announcement).await?,
            kind => {
                debug!(announcement_id = announcement.id, announcement_type = %kind, "公告类型不含职位");
                json!({ "positions": 0 })
            }
        };

        announcement.status = AnnouncementStatus::Published;
        let saved = self.deps.announcements.update(&announcement).await?;

        let push = AnnouncementPushPayload {
            announcement_id: saved.id,
        };
        enqueue_unique(
            &self.deps.broker,
            TaskKind::AnnouncementPush,
            &push,
            EnqueueOptions::default().unique(format!("announcement_push:{}", saved.id)),
        )
        .await?;

        ctx.set_result(result);
        Ok(())
    }

    #[instrument(skip(self, ctx, announcement), fields(announcement_id = announcement.id))]
    async fn positions(
        &self,
        ctx: &TaskContext,
        announcement: &mut Announcement,
    ) -> Result<Value, PipelineError> {
        let mut harvest = Harvest::default();

        if let Some(html) = announcement.raw_html.as_deref() {
            let output = self.deps.parser.html_tables().parse(html);
            debug!(positions = output.positions.len(), "正文表格解析");
            harvest.absorb(output.positions, output.confidence);
        }
        ctx.set_progress(0.2).await;

        self.parse_attachments(ctx, announcement, &mut harvest).await?;
        ctx.set_progress(0.5).await;

        if harvest.positions.is_empty() && !announcement.content.trim().is_empty() {
            self.llm_positions(ctx, announcement, &mut harvest).await?;
        }
        ctx.set_progress(0.7).await;

        let norm = NormalizeContext {
            exam: ExamInfo {
                exam_type: harvest
                    .exam_info
                    .exam_type
                    .clone()
                    .or_else(|| announcement.exam_type.clone()),
                province: harvest
                    .exam_info
                    .province
                    .clone()
                    .or_else(|| announcement.province.clone()),
                ..harvest.exam_info.clone()
            },
            exam_year: exam_year(announcement),
        };
        let positions = harvest
            .positions
            .iter()
            .filter(|p| p.has_data())
            .map(|p| normalize(p, &norm))
            .collect::<Vec<_>>();

        let report = self
            .deps
            .reconciler
            .reconcile(announcement.id, positions, Some(ctx.task_id), ctx.cancellation())
            .await?;
        ctx.set_progress(0.9).await;

        if harvest.confidence > 0 {
            announcement.confidence = harvest.confidence;
        }
        announcement.partial |= harvest.partial;
        if announcement.exam_type.is_none() {
            announcement.exam_type = norm.exam.exam_type.clone();
        }
        if announcement.province.is_none() {
            announcement.province = norm.exam.province.as_deref().and_then(canonical_province);
        }
        if announcement.city.is_none() {
            announcement.city = norm.exam.city.clone();
        }

        info!(
            raw = harvest.positions.len(),
            written = report.written(),
            rejected = report.rejected,
            attachments = harvest.attachments_parsed,
            "职位提取完成"
        );
        Ok(json!({
            "positions": report.position_ids.len(),
            "inserted": report.inserted,
            "updated": report.updated,
            "unchanged": report.unchanged,
            "rejected": report.rejected,
            "attachments": harvest.attachments_parsed,
        }))
    }

    /// 逐个下载并解析附件；单个附件失败只记录日志
    async fn parse_attachments(
        &self,
        ctx: &TaskContext,
        announcement: &Announcement,
        harvest: &mut Harvest,
    ) -> Result<(), PipelineError> {
        let attachments = announcement
            .attachments
            .iter()
            .filter(|a| a.kind().is_parseable())
            .take(self.deps.limits.max_attachments);

        for attachment in attachments {
            ctx.checkpoint()?;
            match self.parse_attachment(ctx, attachment).await {
                Ok(positions) => {
                    harvest.attachments_parsed += 1;
                    let confidence = positions.iter().map(|p| p.confidence).max().unwrap_or(0);
                    harvest.absorb(positions, confidence);
                }
                Err(e) if e.is_retryable() || matches!(e, PipelineError::Cancelled) => return Err(e),
                Err(e) => {
                    warn!(attachment = %attachment.name, "附件解析失败: {}", e);
                    harvest.partial = true;
                    self.deps
                        .log_warn(ctx.task_id, format!("附件 {} 解析失败: {}", attachment.name, e))
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn parse_attachment(
        &self,
        ctx: &TaskContext,
        attachment: &Attachment,
    ) -> Result<Vec<ParsedPosition>, PipelineError> {
        let limits = self.deps.limits;
        let request = FetchRequest::get(&attachment.url, limits.timeout, limits.max_document_bytes);
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

        let content_type = response
            .content_type()
            .or_else(|| Some(attachment.content_type.as_str()).filter(|c| !c.is_empty()));
        let output = self
            .deps
            .parser
            .parse(&response.body, &attachment.name, content_type, ctx.cancellation())
            .await?;

        if attachment.id > 0 {
            self.deps
                .announcements
                .mark_attachment_fetched(attachment.id, None)
                .await?;
        }
        let mut positions = output.positions;
        for position in positions.iter_mut().filter(|p| p.confidence == 0) {
            position.confidence = output.confidence;
        }
        Ok(positions)
    }

    /// LLM 兜底提取
    ///
    /// 同一正文连续两次结构错误时终止并标记 partial；其余失败降级为空结果。
    async fn llm_positions(
        &self,
        ctx: &TaskContext,
        announcement: &mut Announcement,
        harvest: &mut Harvest,
    ) -> Result<(), PipelineError> {
        if !self.deps.extractor.has_llm() {
            debug!("未配置 LLM，跳过职位提取");
            return Ok(());
        }
        let result = ctx
            .run(async {
                Ok(self
                    .deps
                    .extractor
                    .extract_positions(&announcement.content, ctx.cancellation())
                    .await)
            })
            .await?;

        match result {
            Ok(extraction) => {
                for warning in &extraction.warnings {
                    debug!("LLM 提取提示: {}", warning);
                }
                let mut positions = extraction.positions;
                for position in positions.iter_mut() {
                    position.confidence = extraction.confidence;
                }
                harvest.absorb(positions, extraction.confidence);
                harvest.exam_info = extraction.exam_info;
                harvest.partial |= extraction.truncated;
                Ok(())
            }
            Err(LlmError::SchemaViolation(msg)) => {
                let fingerprint = sha256_hex(&announcement.content);
                let streak = ctx.failure_streak(&fingerprint).await;
                warn!(streak, "LLM 输出结构错误: {}", msg);
                if streak >= SCHEMA_VIOLATION_LIMIT {
                    announcement.partial = true;
                    announcement.confidence = 0;
                    self.deps.announcements.update(announcement).await?;
                    self.deps
                        .log_warn(ctx.task_id, format!("同一正文连续 {} 次结构错误: {}", streak, msg))
                        .await;
                    return Err(PipelineError::validation(msg));
                }
                Err(PipelineError::transient(format!("LLM 输出结构错误: {}", msg)))
            }
            Err(e) => {
                let err = PipelineError::from(e);
                if err.is_retryable() || matches!(err, PipelineError::Cancelled) {
                    return Err(err);
                }
                warn!("LLM 职位提取失败，降级为空结果: {}", err);
                self.deps
                    .log_warn(ctx.task_id, format!("LLM 职位提取失败: {}", err))
                    .await;
                harvest.partial = true;
                announcement.confidence = 0;
                Ok(())
            }
        }
    }

    async fn registration_stats(
        &self,
        ctx: &TaskContext,
        announcement: &mut Announcement,
    ) -> Result<Value, PipelineError> {
        let stats = match self
            .deps
            .extractor
            .extract_registration_stats(&announcement.content, ctx.cancellation())
            .await
        {
            Ok(stats) => stats,
            Err(e) => return self.degrade(ctx, announcement, "报名统计", e).await,
        };
        let applied = self
            .deps
            .reconciler
            .apply_registration_stats(
                &stats,
                exam_year(announcement),
                announcement.exam_type.as_deref(),
                ctx.cancellation(),
            )
            .await?;
        info!(announcement_id = announcement.id, rows = stats.len(), applied, "报名人数已更新");
        Ok(json!({ "stats": stats.len(), "applied": applied }))
    }

    async fn score_lines(
        &self,
        ctx: &TaskContext,
        announcement: &mut Announcement,
    ) -> Result<Value, PipelineError> {
        let lines = match self
            .deps
            .extractor
            .extract_score_lines(&announcement.content, ctx.cancellation())
            .await
        {
            Ok(lines) => lines,
            Err(e) => return self.degrade(ctx, announcement, "分数线", e).await,
        };
        let mut extra = match announcement.extra.take() {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let value = serde_json::to_value(&lines).map_err(|e| PipelineError::validation(e.to_string()))?;
        extra.insert("score_lines".to_string(), value);
        announcement.extra = Some(Value::Object(extra));
        info!(announcement_id = announcement.id, lines = lines.len(), "分数线已保存");
        Ok(json!({ "score_lines": lines.len() }))
    }

    /// 专项提取失败：可重试错误交给 Broker，其余标记 partial 后继续
    async fn degrade(
        &self,
        ctx: &TaskContext,
        announcement: &mut Announcement,
        what: &str,
        err: LlmError,
    ) -> Result<Value, PipelineError> {
        let err = PipelineError::from(err);
        if err.is_retryable() || matches!(err, PipelineError::Cancelled) {
            return Err(err);
        }
        warn!(announcement_id = announcement.id, "{}提取失败: {}", what, err);
        self.deps
            .log_warn(ctx.task_id, format!("{}提取失败: {}", what, err))
            .await;
        announcement.partial = true;
        announcement.confidence = 0;
        Ok(json!({ "degraded": true }))
    }
}

#[async_trait]
impl TaskHandler for PositionExtractHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}
