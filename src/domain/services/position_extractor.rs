// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::llm_service::{truncate_chars, LlmError, LlmService};
use super::position_normalizer::ExamInfo;
use super::prompts::PromptKind;
use crate::domain::models::announcement::AnnouncementType;
use crate::domain::models::position::{ParsedPosition, RegistrationStat, ScoreLine};

/// 职位提取的 LLM 输出
#[derive(Debug, Clone, Deserialize)]
pub struct PositionExtraction {
    pub positions: Vec<ParsedPosition>,
    #[serde(default)]
    pub exam_info: ExamInfo,
    pub confidence: i32,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// 输入超过上限被截断
    #[serde(skip)]
    pub truncated: bool,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    announcement_type: String,
    #[serde(default)]
    exam_type: Option<String>,
    confidence: i32,
}

#[derive(Debug, Deserialize)]
struct ScoreLines {
    score_lines: Vec<ScoreLine>,
    confidence: i32,
}

#[derive(Debug, Deserialize)]
struct RegistrationStats {
    stats: Vec<RegistrationStat>,
    confidence: i32,
}

/// 公告分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub announcement_type: AnnouncementType,
    pub exam_type: Option<String>,
    /// 是否来自关键词规则
    pub by_keywords: bool,
}

/// 标题关键词 → 公告类型，按顺序匹配
const TYPE_KEYWORDS: &[(AnnouncementType, &[&str])] = &[
    (AnnouncementType::RegistrationStats, &["报名人数", "报名情况", "报考人数", "报名统计"]),
    (AnnouncementType::ScoreRelease, &["成绩", "分数线", "进面", "入围面试"]),
    (AnnouncementType::QualificationReview, &["资格复审", "资格审查", "资格复核"]),
    (AnnouncementType::PhysicalExam, &["体检"]),
    (AnnouncementType::PoliticalReview, &["考察", "政审"]),
    (AnnouncementType::Publicity, &["拟录用", "拟聘用", "公示"]),
    (AnnouncementType::Interview, &["面试"]),
    (AnnouncementType::WrittenExam, &["笔试", "准考证"]),
    (AnnouncementType::Supplement, &["补充", "更正", "调剂", "补录"]),
    (AnnouncementType::Recruitment, &["招录", "招聘", "招考", "录用", "选调", "遴选", "简章"]),
];

const EXAM_TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    ("国考", &["国考", "中央机关", "国家公务员"]),
    ("选调生", &["选调生", "选调"]),
    ("遴选", &["遴选"]),
    ("事业单位", &["事业单位", "事业编"]),
    ("教师招聘", &["教师"]),
    ("军队文职", &["军队文职"]),
    ("省考", &["公务员", "参照公务员法管理"]),
];

/// 按关键词分类，LLM 不可用时使用
pub fn classify_by_keywords(title: &str) -> AnnouncementType {
    TYPE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| title.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(AnnouncementType::Other)
}

pub fn exam_type_by_keywords(text: &str) -> Option<String> {
    EXAM_TYPE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(name, _)| name.to_string())
}

/// LLM 提取器
///
/// 输出只是建议值，字段校验由归并器负责。
pub struct PositionExtractor {
    llm: Option<Arc<LlmService>>,
}

impl PositionExtractor {
    pub fn new(llm: Option<Arc<LlmService>>) -> Self {
        Self { llm }
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    fn llm(&self) -> Result<&LlmService, LlmError> {
        self.llm
            .as_deref()
            .ok_or_else(|| LlmError::Config("未配置 LLM".to_string()))
    }

    fn input<'a>(&self, llm: &LlmService, content: &'a str) -> (&'a str, bool) {
        let input = truncate_chars(content, llm.max_input_chars());
        (input, input.len() < content.len())
    }

    /// 提取全部职位与考试信息；低于置信度阈值的结果整体丢弃
    pub async fn extract_positions(
        &self,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<PositionExtraction, LlmError> {
        let llm = self.llm()?;
        let (input, truncated) = self.input(llm, content);
        let mut extraction: PositionExtraction = llm
            .call_json(PromptKind::PositionExtract, input, cancel)
            .await?;

        let confidence = extraction.confidence.clamp(0, 100);
        llm.gate(confidence)?;
        extraction.confidence = confidence;
        extraction.truncated = truncated;
        extraction.positions.retain(ParsedPosition::has_data);
        for position in &mut extraction.positions {
            position.confidence = confidence;
        }
        for warning in &extraction.warnings {
            debug!(warning = %warning, "LLM 提取警告");
        }
        Ok(extraction)
    }

    /// 公告分类；LLM 失败或低置信度时退回关键词规则
    pub async fn classify(
        &self,
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Classification, LlmError> {
        let fallback = || Classification {
            announcement_type: classify_by_keywords(title),
            exam_type: exam_type_by_keywords(title).or_else(|| exam_type_by_keywords(content)),
            by_keywords: true,
        };
        let Some(llm) = self.llm.as_deref() else {
            return Ok(fallback());
        };

        let head: String = content.chars().take(2000).collect();
        let input = format!("标题：{}\n\n{}", title, head);
        match llm
            .call_json::<RawClassification>(PromptKind::AnnouncementType, &input, cancel)
            .await
        {
            Ok(raw) if llm.gate(raw.confidence).is_ok() => {
                let Ok(announcement_type) = raw.announcement_type.trim().parse::<AnnouncementType>() else {
                    warn!(value = %raw.announcement_type, "LLM 返回未知公告类型，使用关键词规则");
                    return Ok(fallback());
                };
                Ok(Classification {
                    announcement_type,
                    exam_type: raw
                        .exam_type
                        .filter(|t| !t.trim().is_empty())
                        .or_else(|| fallback().exam_type),
                    by_keywords: false,
                })
            }
            Ok(_) => Ok(fallback()),
            Err(LlmError::Cancelled) => Err(LlmError::Cancelled),
            Err(e) => {
                warn!("公告分类失败，使用关键词规则: {}", e);
                Ok(fallback())
            }
        }
    }

    /// 历年分数线
    pub async fn extract_score_lines(
        &self,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoreLine>, LlmError> {
        let llm = self.llm()?;
        let (input, _) = self.input(llm, content);
        let result: ScoreLines = llm.call_json(PromptKind::ScoreLine, input, cancel).await?;
        llm.gate(result.confidence)?;
        Ok(result
            .score_lines
            .into_iter()
            .filter(|s| s.min_score.is_some() || s.max_score.is_some())
            .collect())
    }

    /// 报名人数统计
    pub async fn extract_registration_stats(
        &self,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RegistrationStat>, LlmError> {
        let llm = self.llm()?;
        let (input, _) = self.input(llm, content);
        let result: RegistrationStats = llm
            .call_json(PromptKind::RegistrationStats, input, cancel)
            .await?;
        llm.gate(result.confidence)?;
        Ok(result
            .stats
            .into_iter()
            .map(|mut stat| {
                if stat.competition_ratio.is_none() {
                    if let (Some(applicants), Some(recruit)) = (stat.applicant_count, stat.recruit_count) {
                        if recruit > 0 {
                            stat.competition_ratio = Some(applicants as f64 / recruit as f64);
                        }
                    }
                }
                stat
            })
            .collect())
    }
}
