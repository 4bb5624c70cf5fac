// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::task::DomainError;

/// 公告类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementType {
    Recruitment,
    RegistrationStats,
    WrittenExam,
    ScoreRelease,
    QualificationReview,
    Interview,
    PhysicalExam,
    PoliticalReview,
    Publicity,
    Supplement,
    #[default]
    Other,
}

impl AnnouncementType {
    pub const ALL: [AnnouncementType; 11] = [
        AnnouncementType::Recruitment,
        AnnouncementType::RegistrationStats,
        AnnouncementType::WrittenExam,
        AnnouncementType::ScoreRelease,
        AnnouncementType::QualificationReview,
        AnnouncementType::Interview,
        AnnouncementType::PhysicalExam,
        AnnouncementType::PoliticalReview,
        AnnouncementType::Publicity,
        AnnouncementType::Supplement,
        AnnouncementType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnnouncementType::Recruitment => "recruitment",
            AnnouncementType::RegistrationStats => "registration_stats",
            AnnouncementType::WrittenExam => "written_exam",
            AnnouncementType::ScoreRelease => "score_release",
            AnnouncementType::QualificationReview => "qualification_review",
            AnnouncementType::Interview => "interview",
            AnnouncementType::PhysicalExam => "physical_exam",
            AnnouncementType::PoliticalReview => "political_review",
            AnnouncementType::Publicity => "publicity",
            AnnouncementType::Supplement => "supplement",
            AnnouncementType::Other => "other",
        }
    }

    /// 是否可能包含职位表
    pub fn carries_positions(&self) -> bool {
        matches!(
            self,
            AnnouncementType::Recruitment | AnnouncementType::Supplement | AnnouncementType::Other
        )
    }
}

impl fmt::Display for AnnouncementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnouncementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnnouncementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::ValidationError(format!("未知公告类型: {}", s)))
    }
}

/// 公告状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementStatus {
    #[default]
    Pending,
    Published,
    Offline,
}

impl AnnouncementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnouncementStatus::Pending => "pending",
            AnnouncementStatus::Published => "published",
            AnnouncementStatus::Offline => "offline",
        }
    }
}

impl FromStr for AnnouncementStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnnouncementStatus::Pending),
            "published" => Ok(AnnouncementStatus::Published),
            "offline" => Ok(AnnouncementStatus::Offline),
            _ => Err(DomainError::ValidationError(format!("未知公告状态: {}", s))),
        }
    }
}

/// 附件种类，由扩展名或 Content-Type 推断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Pdf,
    Word,
    Excel,
    Image,
    Archive,
    Other,
}

impl AttachmentKind {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or_default();
        match path.rsplit('.').next().unwrap_or_default() {
            "pdf" => AttachmentKind::Pdf,
            "doc" | "docx" | "wps" => AttachmentKind::Word,
            "xls" | "xlsx" | "et" => AttachmentKind::Excel,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" => AttachmentKind::Image,
            "zip" | "rar" | "7z" => AttachmentKind::Archive,
            _ => AttachmentKind::Other,
        }
    }

    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("pdf") {
            AttachmentKind::Pdf
        } else if ct.contains("msword") || ct.contains("wordprocessingml") {
            AttachmentKind::Word
        } else if ct.contains("ms-excel") || ct.contains("spreadsheetml") {
            AttachmentKind::Excel
        } else if ct.starts_with("image/") {
            AttachmentKind::Image
        } else if ct.contains("zip") || ct.contains("rar") {
            AttachmentKind::Archive
        } else {
            AttachmentKind::Other
        }
    }

    /// 是否能交给文档解析器
    pub fn is_parseable(&self) -> bool {
        matches!(
            self,
            AttachmentKind::Pdf | AttachmentKind::Word | AttachmentKind::Excel | AttachmentKind::Image
        )
    }
}

/// 公告附件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub fetched: bool,
    pub content_type: String,
    pub local_ref: Option<String>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        let url = url.into();
        let kind = match AttachmentKind::from_name(&url) {
            AttachmentKind::Other => AttachmentKind::from_name(&name),
            kind => kind,
        };
        Self {
            id: 0,
            name,
            url,
            fetched: false,
            content_type: kind_mime(kind).to_string(),
            local_ref: None,
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        match AttachmentKind::from_content_type(&self.content_type) {
            AttachmentKind::Other => AttachmentKind::from_name(&self.url),
            kind => kind,
        }
    }
}

fn kind_mime(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Pdf => "application/pdf",
        AttachmentKind::Word => "application/msword",
        AttachmentKind::Excel => "application/vnd.ms-excel",
        AttachmentKind::Image => "image/*",
        AttachmentKind::Archive => "application/zip",
        AttachmentKind::Other => "application/octet-stream",
    }
}

/// 公告实体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Announcement {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub announcement_type: AnnouncementType,
    pub exam_type: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    /// 清洗后的正文
    pub content: String,
    pub raw_html: Option<String>,
    pub attachments: Vec<Attachment>,
    /// 0-100
    pub confidence: i32,
    pub status: AnnouncementStatus,
    /// LLM 失败降级或多次校验失败时置位
    pub partial: bool,
    /// 响应体超限被截断
    pub truncated: bool,
    pub template_version: Option<String>,
    pub source_list_id: Option<i64>,
    pub source_name: String,
    pub category: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// 分数线等附加提取结果
    pub extra: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Announcement {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            url: url.into(),
            title: title.into(),
            published_at: None,
            announcement_type: AnnouncementType::Other,
            exam_type: None,
            province: None,
            city: None,
            content: String::new(),
            raw_html: None,
            attachments: Vec::new(),
            confidence: 0,
            status: AnnouncementStatus::Pending,
            partial: false,
            truncated: false,
            template_version: None,
            source_list_id: None,
            source_name: String::new(),
            category: String::new(),
            etag: None,
            last_modified: None,
            extra: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 正文与附件至少有一个非空
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.url.trim().is_empty() {
            return Err(DomainError::ValidationError("公告 URL 为空".into()));
        }
        if self.content.trim().is_empty() && self.attachments.is_empty() {
            return Err(DomainError::ValidationError("公告正文与附件均为空".into()));
        }
        if !(0..=100).contains(&self.confidence) {
            return Err(DomainError::ValidationError(format!(
                "置信度越界: {}",
                self.confidence
            )));
        }
        Ok(())
    }
}
