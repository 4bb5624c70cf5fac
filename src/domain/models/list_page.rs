// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use super::task::DomainError;

/// 抓取频率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrawlFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl CrawlFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlFrequency::Hourly => "hourly",
            CrawlFrequency::Daily => "daily",
            CrawlFrequency::Weekly => "weekly",
        }
    }

    /// 一个调度周期的秒数，用作定时监控的唯一键窗口
    pub fn period_secs(&self) -> u64 {
        match self {
            CrawlFrequency::Hourly => 3600,
            CrawlFrequency::Daily => 86_400,
            CrawlFrequency::Weekly => 7 * 86_400,
        }
    }
}

impl fmt::Display for CrawlFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlFrequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(CrawlFrequency::Hourly),
            "daily" => Ok(CrawlFrequency::Daily),
            "weekly" => Ok(CrawlFrequency::Weekly),
            _ => Err(DomainError::ValidationError(format!("未知抓取频率: {}", s))),
        }
    }
}

/// 列表页状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListPageStatus {
    #[default]
    Active,
    Paused,
    Broken,
}

impl ListPageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListPageStatus::Active => "active",
            ListPageStatus::Paused => "paused",
            ListPageStatus::Broken => "broken",
        }
    }
}

impl FromStr for ListPageStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ListPageStatus::Active),
            "paused" => Ok(ListPageStatus::Paused),
            "broken" => Ok(ListPageStatus::Broken),
            _ => Err(DomainError::ValidationError(format!("未知列表页状态: {}", s))),
        }
    }
}

/// 列表页（频道页）
///
/// 枚举公告的目录 URL。`url` 也可以是外部数据源的伪协议地址，
/// 例如 `fenbi://exam?year=2025` 或 `wechat-mp://{fakeid}`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListPage {
    pub id: i64,
    pub url: String,
    pub source_name: String,
    pub category: String,
    pub crawl_frequency: CrawlFrequency,
    /// 文章链接的 CSS 选择器
    pub article_selector: Option<String>,
    /// `{page}` 模板、下一页选择器或 `auto`
    pub pagination_pattern: Option<String>,
    /// 最多翻页数
    pub max_pages: u32,
    /// 允许跨域的文章主机
    pub allowed_hosts: Vec<String>,
    pub status: ListPageStatus,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub last_article_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListPage {
    pub fn is_active(&self) -> bool {
        self.status == ListPageStatus::Active
    }

    /// 外部数据源协议名（`fenbi`、`wechat-mp`），普通 HTTP 列表页返回 `None`
    pub fn source_scheme(&self) -> Option<&str> {
        let (scheme, _) = self.url.split_once("://")?;
        match scheme {
            "http" | "https" => None,
            other => Some(other),
        }
    }
}

/// 新建列表页的输入
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewListPage {
    #[validate(length(min = 8, max = 2048))]
    pub url: String,
    #[validate(length(max = 200))]
    pub source_name: String,
    pub category: String,
    pub crawl_frequency: CrawlFrequency,
    pub article_selector: Option<String>,
    pub pagination_pattern: Option<String>,
    #[validate(range(min = 1, max = 50))]
    pub max_pages: u32,
    pub allowed_hosts: Vec<String>,
    pub status: ListPageStatus,
}

impl NewListPage {
    pub fn new(url: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_name: source_name.into(),
            category: String::new(),
            crawl_frequency: CrawlFrequency::Daily,
            article_selector: None,
            pagination_pattern: None,
            max_pages: 1,
            allowed_hosts: Vec::new(),
            status: ListPageStatus::Active,
        }
    }
}
