// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "positions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
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
    pub major_specific: Json,
    pub major_unlimited: bool,
    pub political_status: Option<String>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub work_exp_years_min: Option<i32>,
    pub grassroots_exp_years: Option<i32>,
    pub hukou_required: bool,
    pub hukou_provinces: Json,
    pub gender_required: Option<String>,
    pub fresh_graduate_only: Option<bool>,
    pub exam_type: Option<String>,
    pub exam_year: Option<i32>,
    pub registration_start: Option<Date>,
    pub registration_end: Option<Date>,
    pub exam_date: Option<Date>,
    pub interview_date: Option<Date>,
    pub status: String,
    #[sea_orm(column_type = "Double", nullable)]
    pub competition_ratio: Option<f64>,
    pub applicant_count: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub confidence: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
