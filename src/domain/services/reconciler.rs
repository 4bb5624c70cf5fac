// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::crawl_log::CrawlLog;
use crate::domain::models::position::{Position, RegistrationStat};
use crate::domain::repositories::crawl_log_repository::CrawlLogRepository;
use crate::domain::repositories::position_repository::PositionRepository;
use crate::domain::search::index::{PositionDocument, SearchIndex};
use crate::utils::errors::PipelineError;

/// 归并结果统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
    /// 本次涉及的职位自然键，按输入顺序
    pub position_ids: Vec<String>,
}

impl ReconcileReport {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

enum Outcome {
    Inserted,
    Updated,
    Unchanged,
}

/// 职位归并器
///
/// 唯一写入职位表的组件。同一自然键的合并、写库与索引推送在同一把键锁内完成，
/// 因此索引推送按职位有序。
pub struct Reconciler {
    positions: Arc<dyn PositionRepository>,
    logs: Arc<dyn CrawlLogRepository>,
    index: Arc<dyn SearchIndex>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Reconciler {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        logs: Arc<dyn CrawlLogRepository>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            positions,
            logs,
            index,
            locks: DashMap::new(),
        }
    }

    /// 归并一组候选职位并关联到公告
    ///
    /// 单个职位校验失败只记录告警，其余职位照常提交。
    pub async fn reconcile(
        &self,
        announcement_id: i64,
        candidates: Vec<Position>,
        task_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, PipelineError> {
        let mut report = ReconcileReport::default();

        for mut candidate in candidates {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            candidate.position_id = candidate.natural_key();
            if let Err(e) = candidate.validate() {
                self.reject(task_id, &candidate, &e.to_string()).await;
                report.rejected += 1;
                continue;
            }

            let key = candidate.position_id.clone();
            match self.reconcile_one(announcement_id, candidate, task_id).await? {
                Some(Outcome::Inserted) => report.inserted += 1,
                Some(Outcome::Updated) => report.updated += 1,
                Some(Outcome::Unchanged) => report.unchanged += 1,
                None => {
                    report.rejected += 1;
                    continue;
                }
            }
            if !report.position_ids.contains(&key) {
                report.position_ids.push(key);
            }
        }

        info!(
            announcement_id,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            rejected = report.rejected,
            "职位归并完成"
        );
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        announcement_id: i64,
        candidate: Position,
        task_id: Option<Uuid>,
    ) -> Result<Option<Outcome>, PipelineError> {
        let key = candidate.position_id.clone();
        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.merge_and_write(announcement_id, candidate, task_id).await
        };
        drop(lock);
        self.release_lock(&key);
        result
    }

    async fn merge_and_write(
        &self,
        announcement_id: i64,
        candidate: Position,
        task_id: Option<Uuid>,
    ) -> Result<Option<Outcome>, PipelineError> {
        let existing = self.positions.find_by_key(&candidate.position_id).await?;

        let (merged, outcome) = match existing {
            None => (candidate, Outcome::Inserted),
            Some(stored) => {
                let merged = merge(&stored, &candidate);
                if let Err(e) = merged.validate() {
                    self.reject(task_id, &merged, &e.to_string()).await;
                    return Ok(None);
                }
                if merged.same_content(&stored) {
                    self.positions
                        .touch_with_link(&stored.position_id, announcement_id)
                        .await?;
                    debug!(position_id = %stored.position_id, "职位内容未变化");
                    return Ok(Some(Outcome::Unchanged));
                }
                (merged, Outcome::Updated)
            }
        };

        let saved = self.positions.upsert_with_link(&merged, announcement_id).await?;
        self.push(&saved).await;
        Ok(Some(outcome))
    }

    /// 写入报名人数与竞争比
    ///
    /// 有职位代码时按代码匹配，否则按 (部门, 职位, 年份, 考试类型) 的自然键匹配。
    pub async fn apply_registration_stats(
        &self,
        stats: &[RegistrationStat],
        exam_year: Option<i32>,
        exam_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<usize, PipelineError> {
        let mut applied = 0;
        for stat in stats {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if stat.applicant_count.is_none() && stat.competition_ratio.is_none() {
                continue;
            }
            for key in self.stat_keys(stat, exam_year, exam_type).await? {
                let lock = self.key_lock(&key);
                let updated = {
                    let _guard = lock.lock().await;
                    let updated = self
                        .positions
                        .update_registration_stats(&key, stat.applicant_count, stat.competition_ratio)
                        .await?;
                    if updated {
                        if let Some(position) = self.positions.find_by_key(&key).await? {
                            self.push(&position).await;
                        }
                    }
                    updated
                };
                drop(lock);
                self.release_lock(&key);
                if updated {
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    async fn stat_keys(
        &self,
        stat: &RegistrationStat,
        exam_year: Option<i32>,
        exam_type: Option<&str>,
    ) -> Result<Vec<String>, PipelineError> {
        if let Some(code) = stat.position_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            let found = self.positions.find_by_code(code, exam_year).await?;
            return Ok(found.into_iter().map(|p| p.position_id).collect());
        }
        match (&stat.department_name, &stat.position_name) {
            (Some(department), Some(name)) => {
                let lookup = Position {
                    position_name: name.clone(),
                    department_name: department.clone(),
                    exam_year,
                    exam_type: exam_type.map(str::to_string),
                    ..Default::default()
                };
                Ok(vec![lookup.natural_key()])
            }
            _ => Ok(Vec::new()),
        }
    }

    /// 索引推送在键锁内执行
    async fn push(&self, position: &Position) {
        let document = PositionDocument::from(position);
        if let Err(e) = self.index.upsert(&document).await {
            warn!(
                position_id = %position.position_id,
                index = self.index.name(),
                "索引推送失败: {}",
                e
            );
        }
    }

    async fn reject(&self, task_id: Option<Uuid>, position: &Position, reason: &str) {
        warn!(position_id = %position.position_id, "职位校验失败: {}", reason);
        let message = format!(
            "职位 {}（{}）被拒绝: {}",
            position.position_name, position.position_id, reason
        );
        if let Err(e) = self.logs.append(&CrawlLog::warn(task_id, message)).await {
            warn!("写入任务日志失败: {}", e);
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_lock(&self, key: &str) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// 字段级合并
///
/// 候选置信度更高时以候选为主，否则保留已存值；主记录缺失的字段由另一方补齐。
/// id、创建时间与状态始终取已存值。
pub fn merge(stored: &Position, candidate: &Position) -> Position {
    let newer_wins = candidate.confidence > stored.confidence;
    let (primary, secondary) = if newer_wins {
        (candidate, stored)
    } else {
        (stored, candidate)
    };
    let mut merged = primary.clone();

    macro_rules! fill {
        ($($field:ident),* $(,)?) => {
            $(
                if merged.$field.is_none() {
                    merged.$field = secondary.$field.clone();
                }
            )*
        };
    }
    fill!(
        position_code,
        department_code,
        department_level,
        work_location_province,
        work_location_city,
        work_location_district,
        education_min,
        political_status,
        age_min,
        age_max,
        work_exp_years_min,
        grassroots_exp_years,
        gender_required,
        fresh_graduate_only,
        exam_type,
        exam_year,
        registration_start,
        registration_end,
        exam_date,
        interview_date,
        competition_ratio,
        applicant_count,
        notes,
    );

    if merged.position_name.trim().is_empty() {
        merged.position_name = secondary.position_name.clone();
    }
    if merged.department_name.trim().is_empty() {
        merged.department_name = secondary.department_name.clone();
    }
    if merged.major_specific.is_empty() && !merged.major_unlimited {
        merged.major_specific = secondary.major_specific.clone();
        merged.major_unlimited = secondary.major_unlimited;
    }
    if merged.hukou_provinces.is_empty() && !merged.hukou_required {
        merged.hukou_provinces = secondary.hukou_provinces.clone();
        merged.hukou_required = secondary.hukou_required;
    }

    merged.id = stored.id;
    merged.position_id = stored.position_id.clone();
    merged.status = stored.status;
    merged.created_at = stored.created_at;
    merged.updated_at = stored.updated_at;
    merged
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
