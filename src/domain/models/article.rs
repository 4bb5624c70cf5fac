// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 列表页中发现的候选公告
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: i64,
    pub source_list_id: i64,
    /// 规范化后的 URL
    pub url: String,
    pub title: String,
    pub category: String,
    pub discovered_at: DateTime<Utc>,
}

/// 列表解析器的输出项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub url: String,
    pub title: String,
    /// 列表项上附带的发布日期文本
    pub published_hint: Option<String>,
}

impl ArticleCandidate {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            published_hint: None,
        }
    }
}
