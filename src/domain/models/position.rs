// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use super::task::DomainError;
use crate::utils::url_utils::sha256_hex;

/// 职位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    #[default]
    Open,
    Closed,
    Removed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
            PositionStatus::Removed => "removed",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PositionStatus::Open),
            "closed" => Ok(PositionStatus::Closed),
            "removed" => Ok(PositionStatus::Removed),
            _ => Err(DomainError::ValidationError(format!("未知职位状态: {}", s))),
        }
    }
}

/// 规范化后的职位
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub id: i64,
    /// 自然键，跨多次提取保持稳定
    pub position_id: String,
    pub position_name: String,
    pub position_code: Option<String>,
    pub department_name: String,
    pub department_code: Option<String>,
    pub department_level: Option<String>,
    pub work_location_province: Option<String>,
    pub work_location_city: Option<String>,
    pub work_location_district: Option<String>,
    pub recruit_count: i32,
    pub education_min: Option<String>,
    pub major_specific: Vec<String>,
    pub major_unlimited: bool,
    pub political_status: Option<String>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub work_exp_years_min: Option<i32>,
    pub grassroots_exp_years: Option<i32>,
    pub hukou_required: bool,
    pub hukou_provinces: Vec<String>,
    pub gender_required: Option<String>,
    pub fresh_graduate_only: Option<bool>,
    pub exam_type: Option<String>,
    pub exam_year: Option<i32>,
    pub registration_start: Option<NaiveDate>,
    pub registration_end: Option<NaiveDate>,
    pub exam_date: Option<NaiveDate>,
    pub interview_date: Option<NaiveDate>,
    pub status: PositionStatus,
    pub competition_ratio: Option<f64>,
    pub applicant_count: Option<i32>,
    pub notes: Option<String>,
    /// 本次写入值的来源置信度
    pub confidence: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Position {
    /// 计算自然键
    ///
    /// 有职位代码时为 `部门代码:职位代码:年份`（缺项以 `-` 占位）；
    /// 否则为 `h:` 加 (部门名, 职位名, 年份, 考试类型) 的 SHA-256 前 32 位。
    /// 不含公告 ID，同一年度的补充公告会落到同一职位上。
    pub fn natural_key(&self) -> String {
        let year = self
            .exam_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string());

        if let Some(code) = self.position_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let dept = self
                .department_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or("-");
            return format!("{}:{}:{}", dept, code.trim(), year);
        }

        let material = format!(
            "{}|{}|{}|{}",
            squash(&self.department_name),
            squash(&self.position_name),
            year,
            self.exam_type.as_deref().map(squash).unwrap_or_default()
        );
        let digest = sha256_hex(material);
        format!("h:{}", &digest[..32])
    }

    /// 校验不变量
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.position_name.trim().is_empty() {
            return Err(DomainError::ValidationError("职位名称为空".into()));
        }
        if self.recruit_count < 1 {
            return Err(DomainError::ValidationError(format!(
                "招录人数必须 ≥ 1: {}",
                self.recruit_count
            )));
        }
        if let (Some(min), Some(max)) = (self.age_min, self.age_max) {
            if min > max {
                return Err(DomainError::ValidationError(format!(
                    "年龄下限 {} 大于上限 {}",
                    min, max
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.registration_start, self.registration_end) {
            if start > end {
                return Err(DomainError::ValidationError(
                    "报名开始晚于报名截止".into(),
                ));
            }
        }
        if !(0..=100).contains(&self.confidence) {
            return Err(DomainError::ValidationError("置信度越界".into()));
        }
        Ok(())
    }

    /// 比较业务字段，忽略 id 与时间戳
    pub fn same_content(&self, other: &Position) -> bool {
        let strip = |p: &Position| Position {
            id: 0,
            created_at: None,
            updated_at: None,
            ..p.clone()
        };
        strip(self) == strip(other)
    }
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// 解析器或 LLM 给出的原始职位记录
///
/// 字段保持源文本，由职位规范化器统一解析。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ParsedPosition {
    pub position_name: Option<String>,
    pub position_code: Option<String>,
    pub department_name: Option<String>,
    pub department_code: Option<String>,
    pub department_level: Option<String>,
    pub work_location: Option<String>,
    #[serde(deserialize_with = "de_loose_count")]
    pub recruit_count: Option<i32>,
    pub education: Option<String>,
    pub degree: Option<String>,
    pub major: Option<String>,
    pub political_status: Option<String>,
    pub age: Option<String>,
    pub work_experience: Option<String>,
    pub grassroots_experience: Option<String>,
    pub hukou: Option<String>,
    pub gender: Option<String>,
    pub fresh_graduate: Option<String>,
    pub exam_type: Option<String>,
    pub registration_start: Option<String>,
    pub registration_end: Option<String>,
    pub exam_date: Option<String>,
    pub interview_date: Option<String>,
    pub other_requirements: Option<String>,
    pub notes: Option<String>,
    #[serde(skip)]
    pub confidence: i32,
}

impl ParsedPosition {
    /// 是否至少有一个识别出的字段
    pub fn has_data(&self) -> bool {
        self.position_name.is_some()
            || self.department_name.is_some()
            || self.position_code.is_some()
            || self.recruit_count.is_some()
    }
}

/// 接受数字或 "3人" 这样的字符串
fn de_loose_count<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().map(|v| v as i32),
        Some(serde_json::Value::String(s)) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    })
}

/// 报名统计中的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RegistrationStat {
    pub position_code: Option<String>,
    pub position_name: Option<String>,
    pub department_name: Option<String>,
    #[serde(deserialize_with = "de_loose_count")]
    pub recruit_count: Option<i32>,
    #[serde(deserialize_with = "de_loose_count")]
    pub applicant_count: Option<i32>,
    pub competition_ratio: Option<f64>,
}

/// 历年分数线
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ScoreLine {
    pub position_code: Option<String>,
    pub position_name: Option<String>,
    pub department_name: Option<String>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub year: Option<i32>,
}
