// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::{json_list, map_unique};
use crate::domain::models::position::Position;
use crate::domain::repositories::position_repository::PositionRepository;
use crate::infrastructure::database::entities::{announcement_position, position};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, NotSet,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::json;
use std::sync::Arc;

/// 职位仓库实现
///
/// 职位与公告-职位关联在同一事务内写入。
#[derive(Clone)]
pub struct PositionRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl PositionRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn link<C: ConnectionTrait>(
        conn: &C,
        announcement_id: i64,
        position_id: &str,
    ) -> Result<(), RepositoryError> {
        let model = announcement_position::ActiveModel {
            id: NotSet,
            announcement_id: Set(announcement_id),
            position_id: Set(position_id.to_string()),
            created_at: Set(Utc::now()),
        };
        announcement_position::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    announcement_position::Column::AnnouncementId,
                    announcement_position::Column::PositionId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }
}

impl From<position::Model> for Position {
    fn from(model: position::Model) -> Self {
        Self {
            id: model.id,
            position_id: model.position_id,
            position_name: model.position_name,
            position_code: model.position_code,
            department_name: model.department_name,
            department_code: model.department_code,
            department_level: model.department_level,
            work_location_province: model.work_location_province,
            work_location_city: model.work_location_city,
            work_location_district: model.work_location_district,
            recruit_count: model.recruit_count,
            education_min: model.education_min,
            major_specific: json_list(model.major_specific),
            major_unlimited: model.major_unlimited,
            political_status: model.political_status,
            age_min: model.age_min,
            age_max: model.age_max,
            work_exp_years_min: model.work_exp_years_min,
            grassroots_exp_years: model.grassroots_exp_years,
            hukou_required: model.hukou_required,
            hukou_provinces: json_list(model.hukou_provinces),
            gender_required: model.gender_required,
            fresh_graduate_only: model.fresh_graduate_only,
            exam_type: model.exam_type,
            exam_year: model.exam_year,
            registration_start: model.registration_start,
            registration_end: model.registration_end,
            exam_date: model.exam_date,
            interview_date: model.interview_date,
            status: model.status.parse().unwrap_or_default(),
            competition_ratio: model.competition_ratio,
            applicant_count: model.applicant_count,
            notes: model.notes,
            confidence: model.confidence,
            created_at: Some(model.created_at),
            updated_at: Some(model.updated_at),
        }
    }
}

impl From<&Position> for position::ActiveModel {
    fn from(p: &Position) -> Self {
        let now = Utc::now();
        Self {
            id: NotSet,
            position_id: Set(p.position_id.clone()),
            position_name: Set(p.position_name.clone()),
            position_code: Set(p.position_code.clone()),
            department_name: Set(p.department_name.clone()),
            department_code: Set(p.department_code.clone()),
            department_level: Set(p.department_level.clone()),
            work_location_province: Set(p.work_location_province.clone()),
            work_location_city: Set(p.work_location_city.clone()),
            work_location_district: Set(p.work_location_district.clone()),
            recruit_count: Set(p.recruit_count),
            education_min: Set(p.education_min.clone()),
            major_specific: Set(json!(p.major_specific)),
            major_unlimited: Set(p.major_unlimited),
            political_status: Set(p.political_status.clone()),
            age_min: Set(p.age_min),
            age_max: Set(p.age_max),
            work_exp_years_min: Set(p.work_exp_years_min),
            grassroots_exp_years: Set(p.grassroots_exp_years),
            hukou_required: Set(p.hukou_required),
            hukou_provinces: Set(json!(p.hukou_provinces)),
            gender_required: Set(p.gender_required.clone()),
            fresh_graduate_only: Set(p.fresh_graduate_only),
            exam_type: Set(p.exam_type.clone()),
            exam_year: Set(p.exam_year),
            registration_start: Set(p.registration_start),
            registration_end: Set(p.registration_end),
            exam_date: Set(p.exam_date),
            interview_date: Set(p.interview_date),
            status: Set(p.status.as_str().to_string()),
            competition_ratio: Set(p.competition_ratio),
            applicant_count: Set(p.applicant_count),
            notes: Set(p.notes.clone()),
            confidence: Set(p.confidence),
            created_at: Set(p.created_at.unwrap_or(now)),
            updated_at: Set(now),
        }
    }
}

#[async_trait]
impl PositionRepository for PositionRepositoryImpl {
    async fn find_by_key(&self, position_id: &str) -> Result<Option<Position>, RepositoryError> {
        let model = position::Entity::find()
            .filter(position::Column::PositionId.eq(position_id))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_code(
        &self,
        position_code: &str,
        exam_year: Option<i32>,
    ) -> Result<Vec<Position>, RepositoryError> {
        let mut query = position::Entity::find()
            .filter(position::Column::PositionCode.eq(position_code.trim()));
        if let Some(year) = exam_year {
            query = query.filter(position::Column::ExamYear.eq(year));
        }
        let models = query
            .order_by_asc(position::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn upsert_with_link(
        &self,
        position: &Position,
        announcement_id: i64,
    ) -> Result<Position, RepositoryError> {
        if position.position_id.is_empty() {
            return Err(RepositoryError::InvalidParameter("职位自然键为空".into()));
        }
        let txn = self.db.begin().await?;

        let existing = position::Entity::find()
            .filter(position::Column::PositionId.eq(position.position_id.as_str()))
            .one(&txn)
            .await?;

        let mut model: position::ActiveModel = position.into();
        let saved = match existing {
            Some(current) => {
                model.id = Set(current.id);
                model.created_at = Set(current.created_at);
                model.update(&txn).await?
            }
            None => model.insert(&txn).await.map_err(map_unique)?,
        };
        Self::link(&txn, announcement_id, &saved.position_id).await?;

        txn.commit().await?;
        Ok(saved.into())
    }

    async fn touch_with_link(
        &self,
        position_id: &str,
        announcement_id: i64,
    ) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;

        let result = position::Entity::update_many()
            .col_expr(position::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(position::Column::PositionId.eq(position_id))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Self::link(&txn, announcement_id, position_id).await?;

        txn.commit().await?;
        Ok(())
    }

    async fn find_by_announcement(
        &self,
        announcement_id: i64,
    ) -> Result<Vec<Position>, RepositoryError> {
        let keys: Vec<String> = announcement_position::Entity::find()
            .select_only()
            .column(announcement_position::Column::PositionId)
            .filter(announcement_position::Column::AnnouncementId.eq(announcement_id))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let models = position::Entity::find()
            .filter(position::Column::PositionId.is_in(keys))
            .order_by_asc(position::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_registration_ending(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Position>, RepositoryError> {
        let models = position::Entity::find()
            .filter(position::Column::RegistrationEnd.gte(start))
            .filter(position::Column::RegistrationEnd.lt(end))
            .order_by_asc(position::Column::RegistrationEnd)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_created_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>, RepositoryError> {
        let models = position::Entity::find()
            .filter(position::Column::CreatedAt.gte(since))
            .order_by_asc(position::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn update_registration_stats(
        &self,
        position_id: &str,
        applicant_count: Option<i32>,
        competition_ratio: Option<f64>,
    ) -> Result<bool, RepositoryError> {
        let result = position::Entity::update_many()
            .col_expr(position::Column::ApplicantCount, Expr::value(applicant_count))
            .col_expr(position::Column::CompetitionRatio, Expr::value(competition_ratio))
            .col_expr(position::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(position::Column::PositionId.eq(position_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    fn sample(code: &str) -> Position {
        let mut p = Position {
            position_name: "综合管理岗".into(),
            position_code: Some(code.into()),
            department_name: "某市税务局".into(),
            department_code: Some("130".into()),
            recruit_count: 2,
            major_specific: vec!["法学".into(), "会计学".into()],
            exam_year: Some(2025),
            registration_end: NaiveDate::from_ymd_opt(2025, 11, 10),
            confidence: 80,
            ..Position::default()
        };
        p.position_id = p.natural_key();
        p
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates_in_place() {
        let repo = PositionRepositoryImpl::new(Arc::new(memory_db().await));
        let first = repo.upsert_with_link(&sample("3001"), 1).await.unwrap();
        assert!(first.id > 0);
        assert_eq!(first.major_specific, vec!["法学".to_string(), "会计学".to_string()]);

        let mut changed = sample("3001");
        changed.recruit_count = 3;
        let second = repo.upsert_with_link(&changed, 2).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.recruit_count, 3);
        assert_eq!(repo.find_by_code("3001", Some(2025)).await.unwrap().len(), 1);
        assert_eq!(repo.find_by_announcement(1).await.unwrap().len(), 1);
        assert_eq!(repo.find_by_announcement(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_touch_with_link_is_idempotent() {
        let repo = PositionRepositoryImpl::new(Arc::new(memory_db().await));
        let saved = repo.upsert_with_link(&sample("3002"), 7).await.unwrap();

        repo.touch_with_link(&saved.position_id, 7).await.unwrap();
        repo.touch_with_link(&saved.position_id, 7).await.unwrap();

        assert_eq!(repo.find_by_announcement(7).await.unwrap().len(), 1);
        assert!(matches!(
            repo.touch_with_link("missing", 7).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_registration_window_and_stats() {
        let repo = PositionRepositoryImpl::new(Arc::new(memory_db().await));
        let saved = repo.upsert_with_link(&sample("3003"), 1).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        let next = NaiveDate::from_ymd_opt(2025, 11, 11).unwrap();
        assert_eq!(repo.find_registration_ending(day, next).await.unwrap().len(), 1);
        assert!(repo
            .find_registration_ending(next, next.succ_opt().unwrap())
            .await
            .unwrap()
            .is_empty());

        assert!(repo
            .update_registration_stats(&saved.position_id, Some(120), Some(60.0))
            .await
            .unwrap());
        assert!(!repo
            .update_registration_stats("unknown", Some(1), None)
            .await
            .unwrap());
        let found = repo.find_by_key(&saved.position_id).await.unwrap().unwrap();
        assert_eq!(found.applicant_count, Some(120));
        assert_eq!(found.competition_ratio, Some(60.0));
    }
}
