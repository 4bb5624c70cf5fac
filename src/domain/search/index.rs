// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::domain::models::position::Position;

#[derive(Debug, Error, Clone)]
pub enum IndexError {
    #[error("索引服务错误: {0}")]
    Engine(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("超时")]
    Timeout,
}

/// 推送到搜索索引的职位文档
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PositionDocument {
    pub position_id: String,
    pub position_name: String,
    pub department_name: String,
    pub department_level: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub recruit_count: i32,
    pub education_min: Option<String>,
    pub majors: Vec<String>,
    pub major_unlimited: bool,
    pub political_status: Option<String>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub fresh_graduate_only: Option<bool>,
    pub exam_type: Option<String>,
    pub exam_year: Option<i32>,
    pub registration_end: Option<NaiveDate>,
    pub status: &'static str,
    pub competition_ratio: Option<f64>,
}

impl From<&Position> for PositionDocument {
    fn from(p: &Position) -> Self {
        Self {
            position_id: p.position_id.clone(),
            position_name: p.position_name.clone(),
            department_name: p.department_name.clone(),
            department_level: p.department_level.clone(),
            province: p.work_location_province.clone(),
            city: p.work_location_city.clone(),
            district: p.work_location_district.clone(),
            recruit_count: p.recruit_count,
            education_min: p.education_min.clone(),
            majors: p.major_specific.clone(),
            major_unlimited: p.major_unlimited,
            political_status: p.political_status.clone(),
            age_min: p.age_min,
            age_max: p.age_max,
            fresh_graduate_only: p.fresh_graduate_only,
            exam_type: p.exam_type.clone(),
            exam_year: p.exam_year,
            registration_end: p.registration_end,
            status: p.status.as_str(),
            competition_ratio: p.competition_ratio,
        }
    }
}

/// 搜索索引
///
/// 推送失败只记录告警，不回滚数据库写入。
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(&self, document: &PositionDocument) -> Result<(), IndexError>;

    fn name(&self) -> &'static str;
}
