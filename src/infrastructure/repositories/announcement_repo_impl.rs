// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::map_unique;
use crate::domain::models::announcement::{Announcement, Attachment};
use crate::domain::repositories::announcement_repository::AnnouncementRepository;
use crate::infrastructure::database::entities::{announcement, announcement_attachment};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, NotSet, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;

/// 公告仓库实现
///
/// 公告与附件在同一事务内写入。
#[derive(Clone)]
pub struct AnnouncementRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl AnnouncementRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn attachments_of<C: ConnectionTrait>(
        conn: &C,
        announcement_id: i64,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        let models = announcement_attachment::Entity::find()
            .filter(announcement_attachment::Column::AnnouncementId.eq(announcement_id))
            .order_by_asc(announcement_attachment::Column::Id)
            .all(conn)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn insert_attachment<C: ConnectionTrait>(
        conn: &C,
        announcement_id: i64,
        attachment: &Attachment,
    ) -> Result<(), RepositoryError> {
        announcement_attachment::ActiveModel {
            id: NotSet,
            announcement_id: Set(announcement_id),
            name: Set(attachment.name.clone()),
            url: Set(attachment.url.clone()),
            fetched: Set(attachment.fetched),
            content_type: Set(attachment.content_type.clone()),
            local_ref: Set(attachment.local_ref.clone()),
        }
        .insert(conn)
        .await?;
        Ok(())
    }

    async fn hydrate<C: ConnectionTrait>(
        conn: &C,
        model: announcement::Model,
    ) -> Result<Announcement, RepositoryError> {
        let attachments = Self::attachments_of(conn, model.id).await?;
        let mut announcement: Announcement = model.into();
        announcement.attachments = attachments;
        Ok(announcement)
    }
}

impl From<announcement_attachment::Model> for Attachment {
    fn from(model: announcement_attachment::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            url: model.url,
            fetched: model.fetched,
            content_type: model.content_type,
            local_ref: model.local_ref,
        }
    }
}

impl From<announcement::Model> for Announcement {
    fn from(model: announcement::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            title: model.title,
            published_at: model.published_at,
            announcement_type: model.announcement_type.parse().unwrap_or_default(),
            exam_type: model.exam_type,
            province: model.province,
            city: model.city,
            content: model.content,
            raw_html: model.raw_html,
            attachments: Vec::new(),
            confidence: model.confidence,
            status: model.status.parse().unwrap_or_default(),
            partial: model.partial,
            truncated: model.truncated,
            template_version: model.template_version,
            source_list_id: model.source_list_id,
            source_name: model.source_name,
            category: model.category,
            etag: model.etag,
            last_modified: model.last_modified,
            extra: model.extra,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<&Announcement> for announcement::ActiveModel {
    fn from(a: &Announcement) -> Self {
        Self {
            id: if a.id > 0 { Set(a.id) } else { NotSet },
            url: Set(a.url.clone()),
            title: Set(a.title.clone()),
            published_at: Set(a.published_at),
            announcement_type: Set(a.announcement_type.as_str().to_string()),
            exam_type: Set(a.exam_type.clone()),
            province: Set(a.province.clone()),
            city: Set(a.city.clone()),
            content: Set(a.content.clone()),
            raw_html: Set(a.raw_html.clone()),
            confidence: Set(a.confidence),
            status: Set(a.status.as_str().to_string()),
            partial: Set(a.partial),
            truncated: Set(a.truncated),
            template_version: Set(a.template_version.clone()),
            source_list_id: Set(a.source_list_id),
            source_name: Set(a.source_name.clone()),
            category: Set(a.category.clone()),
            etag: Set(a.etag.clone()),
            last_modified: Set(a.last_modified.clone()),
            extra: Set(a.extra.clone()),
            created_at: Set(a.created_at),
            updated_at: Set(a.updated_at),
        }
    }
}

#[async_trait]
impl AnnouncementRepository for AnnouncementRepositoryImpl {
    async fn create(&self, announcement: &Announcement) -> Result<Announcement, RepositoryError> {
        let txn = self.db.begin().await?;

        let mut model: announcement::ActiveModel = announcement.into();
        model.id = NotSet;
        let inserted = model.insert(&txn).await.map_err(map_unique)?;
        for attachment in &announcement.attachments {
            Self::insert_attachment(&txn, inserted.id, attachment).await?;
        }
        let created = Self::hydrate(&txn, inserted).await?;

        txn.commit().await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Announcement>, RepositoryError> {
        match announcement::Entity::find_by_id(id).one(self.db.as_ref()).await? {
            Some(model) => Ok(Some(Self::hydrate(self.db.as_ref(), model).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Announcement>, RepositoryError> {
        let model = announcement::Entity::find()
            .filter(announcement::Column::Url.eq(url))
            .one(self.db.as_ref())
            .await?;
        match model {
            Some(model) => Ok(Some(Self::hydrate(self.db.as_ref(), model).await?)),
            None => Ok(None),
        }
    }

    async fn update(&self, announcement: &Announcement) -> Result<Announcement, RepositoryError> {
        if announcement.id <= 0 {
            return Err(RepositoryError::InvalidParameter("公告尚未持久化".into()));
        }
        let txn = self.db.begin().await?;

        let mut model: announcement::ActiveModel = announcement.into();
        model.created_at = NotSet;
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;

        // 已有附件只同步抓取状态，新附件追加
        for attachment in &announcement.attachments {
            if attachment.id > 0 {
                announcement_attachment::Entity::update_many()
                    .col_expr(
                        announcement_attachment::Column::Fetched,
                        Expr::value(attachment.fetched),
                    )
                    .col_expr(
                        announcement_attachment::Column::LocalRef,
                        Expr::value(attachment.local_ref.clone()),
                    )
                    .filter(announcement_attachment::Column::Id.eq(attachment.id))
                    .filter(announcement_attachment::Column::AnnouncementId.eq(updated.id))
                    .exec(&txn)
                    .await?;
            } else {
                Self::insert_attachment(&txn, updated.id, attachment).await?;
            }
        }
        let result = Self::hydrate(&txn, updated).await?;

        txn.commit().await?;
        Ok(result)
    }

    async fn mark_attachment_fetched(
        &self,
        attachment_id: i64,
        local_ref: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = announcement_attachment::Entity::update_many()
            .col_expr(announcement_attachment::Column::Fetched, Expr::value(true))
            .col_expr(
                announcement_attachment::Column::LocalRef,
                Expr::value(local_ref.map(str::to_string)),
            )
            .filter(announcement_attachment::Column::Id.eq(attachment_id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::announcement::{AnnouncementStatus, AnnouncementType};
    use crate::test_support::memory_db;

    fn sample(url: &str) -> Announcement {
        let mut a = Announcement::new(url, "2025年度考试录用公务员公告");
        a.content = "报名时间为11月1日至11月10日".into();
        a.announcement_type = AnnouncementType::Recruitment;
        a.attachments = vec![
            Attachment::new("职位表.xlsx", "https://example.gov/files/positions.xlsx"),
            Attachment::new("报名表.doc", "https://example.gov/files/form.doc"),
        ];
        a
    }

    #[tokio::test]
    async fn test_create_persists_attachments() {
        let repo = AnnouncementRepositoryImpl::new(Arc::new(memory_db().await));
        let created = repo.create(&sample("https://example.gov/a/1.html")).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.attachments.len(), 2);
        assert!(created.attachments.iter().all(|a| a.id > 0 && !a.fetched));

        let found = repo
            .find_by_url("https://example.gov/a/1.html")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.announcement_type, AnnouncementType::Recruitment);
        assert_eq!(found.attachments[0].name, "职位表.xlsx");
    }

    #[tokio::test]
    async fn test_duplicate_url_is_already_exists() {
        let repo = AnnouncementRepositoryImpl::new(Arc::new(memory_db().await));
        repo.create(&sample("https://example.gov/a/2.html")).await.unwrap();
        let err = repo
            .create(&sample("https://example.gov/a/2.html"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_update_and_mark_fetched() {
        let repo = AnnouncementRepositoryImpl::new(Arc::new(memory_db().await));
        let mut a = repo.create(&sample("https://example.gov/a/3.html")).await.unwrap();

        repo.mark_attachment_fetched(a.attachments[0].id, Some("tmp/positions.xlsx"))
            .await
            .unwrap();
        a = repo.find_by_id(a.id).await.unwrap().unwrap();
        assert!(a.attachments[0].fetched);

        a.status = AnnouncementStatus::Published;
        a.confidence = 85;
        a.attachments.push(Attachment::new("补充.pdf", "https://example.gov/files/more.pdf"));
        let updated = repo.update(&a).await.unwrap();

        assert_eq!(updated.status, AnnouncementStatus::Published);
        assert_eq!(updated.confidence, 85);
        assert_eq!(updated.attachments.len(), 3);
        assert!(updated.attachments[0].fetched);
        assert_eq!(
            updated.attachments[0].local_ref.as_deref(),
            Some("tmp/positions.xlsx")
        );
    }
}
