// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "llm_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub provider: String,
    pub model: String,
    pub api_url: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub api_key_encrypted: Option<String>,
    pub max_tokens: i32,
    #[sea_orm(column_type = "Float")]
    pub temperature: f32,
    pub timeout_secs: i64,
    pub is_default: bool,
    pub is_enabled: bool,
    pub last_test_status: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_test_message: Option<String>,
    pub last_tested_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
