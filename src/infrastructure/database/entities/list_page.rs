// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "list_pages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub url: String,
    pub source_name: String,
    pub category: String,
    pub crawl_frequency: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub article_selector: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub pagination_pattern: Option<String>,
    pub max_pages: i32,
    pub allowed_hosts: Json,
    pub status: String,
    pub last_crawled_at: Option<DateTimeUtc>,
    pub last_article_count: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
