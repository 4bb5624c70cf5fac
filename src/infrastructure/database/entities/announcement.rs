// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "announcements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub url: String,
    #[sea_orm(column_type = "Text")]
    pub title: String,
    pub published_at: Option<DateTimeUtc>,
    pub announcement_type: String,
    pub exam_type: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_html: Option<String>,
    pub confidence: i32,
    pub status: String,
    pub partial: bool,
    pub truncated: bool,
    pub template_version: Option<String>,
    pub source_list_id: Option<i64>,
    pub source_name: String,
    pub category: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub extra: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::announcement_attachment::Entity")]
    Attachments,
}

impl Related<super::announcement_attachment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attachments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
