// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::position::Position;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// 职位仓库
///
/// 写操作只允许职位归并器调用。
#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn find_by_key(&self, position_id: &str) -> Result<Option<Position>, RepositoryError>;
    /// 按职位代码查找，`exam_year` 为空时不限年份
    async fn find_by_code(
        &self,
        position_code: &str,
        exam_year: Option<i32>,
    ) -> Result<Vec<Position>, RepositoryError>;
    /// 单事务内插入或更新职位，并写入公告-职位关联
    async fn upsert_with_link(
        &self,
        position: &Position,
        announcement_id: i64,
    ) -> Result<Position, RepositoryError>;
    /// 内容未变化时仅刷新 `updated_at` 并确保关联存在
    async fn touch_with_link(
        &self,
        position_id: &str,
        announcement_id: i64,
    ) -> Result<(), RepositoryError>;
    async fn find_by_announcement(
        &self,
        announcement_id: i64,
    ) -> Result<Vec<Position>, RepositoryError>;
    /// 报名截止日期落在 `[start, end)` 内的职位
    async fn find_registration_ending(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Position>, RepositoryError>;
    /// `since` 之后新建的职位
    async fn find_created_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>, RepositoryError>;
    /// 写入报名人数与竞争比
    async fn update_registration_stats(
        &self,
        position_id: &str,
        applicant_count: Option<i32>,
        competition_ratio: Option<f64>,
    ) -> Result<bool, RepositoryError>;
}
