// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 采集流水线表：列表页、文章、公告、附件、职位、任务与日志
#[derive(DeriveMigrationName)]
pub struct Migration;

fn id_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn now_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    /// 应用数据库迁移
    ///
    /// # 参数
    ///
    /// * `manager` - 数据库模式管理器
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. list_pages
        manager
            .create_table(
                Table::create()
                    .table(ListPages::Table)
                    .if_not_exists()
                    .col(id_col(ListPages::Id))
                    .col(ColumnDef::new(ListPages::Url).string_len(2048).not_null().unique_key())
                    .col(ColumnDef::new(ListPages::SourceName).string().not_null().default(""))
                    .col(ColumnDef::new(ListPages::Category).string().not_null().default(""))
                    .col(
                        ColumnDef::new(ListPages::CrawlFrequency)
                            .string_len(16)
                            .not_null()
                            .default("daily"),
                    )
                    .col(ColumnDef::new(ListPages::ArticleSelector).text())
                    .col(ColumnDef::new(ListPages::PaginationPattern).text())
                    .col(ColumnDef::new(ListPages::MaxPages).integer().not_null().default(1))
                    .col(ColumnDef::new(ListPages::AllowedHosts).json().not_null())
                    .col(
                        ColumnDef::new(ListPages::Status)
                            .string_len(16)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(ListPages::LastCrawledAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ListPages::LastArticleCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(now_col(ListPages::CreatedAt))
                    .col(now_col(ListPages::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_list_pages_status_frequency")
                    .table(ListPages::Table)
                    .col(ListPages::Status)
                    .col(ListPages::CrawlFrequency)
                    .to_owned(),
            )
            .await?;

        // 2. articles：同一列表页下 URL 唯一
        manager
            .create_table(
                Table::create()
                    .table(Articles::Table)
                    .if_not_exists()
                    .col(id_col(Articles::Id))
                    .col(ColumnDef::new(Articles::SourceListId).big_integer().not_null())
                    .col(ColumnDef::new(Articles::Url).string_len(2048).not_null())
                    .col(ColumnDef::new(Articles::Title).text().not_null())
                    .col(ColumnDef::new(Articles::Category).string().not_null().default(""))
                    .col(now_col(Articles::DiscoveredAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_articles_list_url")
                    .table(Articles::Table)
                    .col(Articles::SourceListId)
                    .col(Articles::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 3. announcements
        manager
            .create_table(
                Table::create()
                    .table(Announcements::Table)
                    .if_not_exists()
                    .col(id_col(Announcements::Id))
                    .col(
                        ColumnDef::new(Announcements::Url)
                            .string_len(2048)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Announcements::Title).text().not_null())
                    .col(ColumnDef::new(Announcements::PublishedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Announcements::AnnouncementType)
                            .string_len(32)
                            .not_null()
                            .default("other"),
                    )
                    .col(ColumnDef::new(Announcements::ExamType).string_len(64))
                    .col(ColumnDef::new(Announcements::Province).string_len(32))
                    .col(ColumnDef::new(Announcements::City).string_len(64))
                    .col(ColumnDef::new(Announcements::Content).text().not_null())
                    .col(ColumnDef::new(Announcements::RawHtml).text())
                    .col(ColumnDef::new(Announcements::Confidence).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Announcements::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Announcements::Partial).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Announcements::Truncated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Announcements::TemplateVersion).string_len(64))
                    .col(ColumnDef::new(Announcements::SourceListId).big_integer())
                    .col(ColumnDef::new(Announcements::SourceName).string().not_null().default(""))
                    .col(ColumnDef::new(Announcements::Category).string().not_null().default(""))
                    .col(ColumnDef::new(Announcements::Etag).string())
                    .col(ColumnDef::new(Announcements::LastModified).string())
                    .col(ColumnDef::new(Announcements::Extra).json())
                    .col(now_col(Announcements::CreatedAt))
                    .col(now_col(Announcements::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_announcements_type_published")
                    .table(Announcements::Table)
                    .col(Announcements::AnnouncementType)
                    .col(Announcements::PublishedAt)
                    .to_owned(),
            )
            .await?;

        // 4. announcement_attachments
        manager
            .create_table(
                Table::create()
                    .table(AnnouncementAttachments::Table)
                    .if_not_exists()
                    .col(id_col(AnnouncementAttachments::Id))
                    .col(
                        ColumnDef::new(AnnouncementAttachments::AnnouncementId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AnnouncementAttachments::Name).text().not_null())
                    .col(
                        ColumnDef::new(AnnouncementAttachments::Url)
                            .string_len(2048)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AnnouncementAttachments::Fetched)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AnnouncementAttachments::ContentType)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AnnouncementAttachments::LocalRef).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attachments_announcement")
                            .from(
                                AnnouncementAttachments::Table,
                                AnnouncementAttachments::AnnouncementId,
                            )
                            .to(Announcements::Table, Announcements::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attachments_announcement")
                    .table(AnnouncementAttachments::Table)
                    .col(AnnouncementAttachments::AnnouncementId)
                    .to_owned(),
            )
            .await?;

        // 5. positions：position_id 为自然键
        manager
            .create_table(
                Table::create()
                    .table(Positions::Table)
                    .if_not_exists()
                    .col(id_col(Positions::Id))
                    .col(
                        ColumnDef::new(Positions::PositionId)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Positions::PositionName).string().not_null())
                    .col(ColumnDef::new(Positions::PositionCode).string_len(64))
                    .col(ColumnDef::new(Positions::DepartmentName).string().not_null().default(""))
                    .col(ColumnDef::new(Positions::DepartmentCode).string_len(64))
                    .col(ColumnDef::new(Positions::DepartmentLevel).string_len(32))
                    .col(ColumnDef::new(Positions::WorkLocationProvince).string_len(32))
                    .col(ColumnDef::new(Positions::WorkLocationCity).string_len(64))
                    .col(ColumnDef::new(Positions::WorkLocationDistrict).string_len(64))
                    .col(ColumnDef::new(Positions::RecruitCount).integer().not_null().default(1))
                    .col(ColumnDef::new(Positions::EducationMin).string_len(32))
                    .col(ColumnDef::new(Positions::MajorSpecific).json().not_null())
                    .col(
                        ColumnDef::new(Positions::MajorUnlimited)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Positions::PoliticalStatus).string_len(32))
                    .col(ColumnDef::new(Positions::AgeMin).integer())
                    .col(ColumnDef::new(Positions::AgeMax).integer())
                    .col(ColumnDef::new(Positions::WorkExpYearsMin).integer())
                    .col(ColumnDef::new(Positions::GrassrootsExpYears).integer())
                    .col(
                        ColumnDef::new(Positions::HukouRequired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Positions::HukouProvinces).json().not_null())
                    .col(ColumnDef::new(Positions::GenderRequired).string_len(8))
                    .col(ColumnDef::new(Positions::FreshGraduateOnly).boolean())
                    .col(ColumnDef::new(Positions::ExamType).string_len(64))
                    .col(ColumnDef::new(Positions::ExamYear).integer())
                    .col(ColumnDef::new(Positions::RegistrationStart).date())
                    .col(ColumnDef::new(Positions::RegistrationEnd).date())
                    .col(ColumnDef::new(Positions::ExamDate).date())
                    .col(ColumnDef::new(Positions::InterviewDate).date())
                    .col(
                        ColumnDef::new(Positions::Status)
                            .string_len(16)
                            .not_null()
                            .default("open"),
                    )
                    .col(ColumnDef::new(Positions::CompetitionRatio).double())
                    .col(ColumnDef::new(Positions::ApplicantCount).integer())
                    .col(ColumnDef::new(Positions::Notes).text())
                    .col(ColumnDef::new(Positions::Confidence).integer().not_null().default(0))
                    .col(now_col(Positions::CreatedAt))
                    .col(now_col(Positions::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_positions_code_year")
                    .table(Positions::Table)
                    .col(Positions::PositionCode)
                    .col(Positions::ExamYear)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_positions_registration_end")
                    .table(Positions::Table)
                    .col(Positions::RegistrationEnd)
                    .to_owned(),
            )
            .await?;

        // 6. announcement_positions
        manager
            .create_table(
                Table::create()
                    .table(AnnouncementPositions::Table)
                    .if_not_exists()
                    .col(id_col(AnnouncementPositions::Id))
                    .col(
                        ColumnDef::new(AnnouncementPositions::AnnouncementId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AnnouncementPositions::PositionId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(now_col(AnnouncementPositions::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_announcement_positions_pair")
                    .table(AnnouncementPositions::Table)
                    .col(AnnouncementPositions::AnnouncementId)
                    .col(AnnouncementPositions::PositionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 7. crawl_tasks
        manager
            .create_table(
                Table::create()
                    .table(CrawlTasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CrawlTasks::TaskId).uuid().not_null().primary_key())
                    .col(ColumnDef::new(CrawlTasks::TaskType).string_len(64).not_null())
                    .col(ColumnDef::new(CrawlTasks::TaskName).string().not_null())
                    .col(ColumnDef::new(CrawlTasks::Params).json().not_null())
                    .col(ColumnDef::new(CrawlTasks::Status).string_len(16).not_null())
                    .col(ColumnDef::new(CrawlTasks::Progress).double().not_null().default(0.0))
                    .col(ColumnDef::new(CrawlTasks::Queue).string_len(16).not_null())
                    .col(ColumnDef::new(CrawlTasks::UniquenessKey).string_len(256))
                    .col(ColumnDef::new(CrawlTasks::AttemptCount).integer().not_null().default(0))
                    .col(ColumnDef::new(CrawlTasks::MaxRetries).integer().not_null().default(3))
                    .col(ColumnDef::new(CrawlTasks::ScheduledAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(CrawlTasks::Deadline).timestamp_with_time_zone())
                    .col(ColumnDef::new(CrawlTasks::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(CrawlTasks::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(CrawlTasks::ErrorMessage).text())
                    .col(ColumnDef::new(CrawlTasks::Result).json())
                    .col(now_col(CrawlTasks::CreatedAt))
                    .col(now_col(CrawlTasks::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_crawl_tasks_queue_status")
                    .table(CrawlTasks::Table)
                    .col(CrawlTasks::Queue)
                    .col(CrawlTasks::Status)
                    .to_owned(),
            )
            .await?;

        // 8. crawl_logs
        manager
            .create_table(
                Table::create()
                    .table(CrawlLogs::Table)
                    .if_not_exists()
                    .col(id_col(CrawlLogs::Id))
                    .col(ColumnDef::new(CrawlLogs::TaskId).uuid())
                    .col(ColumnDef::new(CrawlLogs::Attempt).integer())
                    .col(ColumnDef::new(CrawlLogs::Level).string_len(8).not_null())
                    .col(ColumnDef::new(CrawlLogs::Message).text().not_null())
                    .col(now_col(CrawlLogs::Timestamp))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_crawl_logs_task")
                    .table(CrawlLogs::Table)
                    .col(CrawlLogs::TaskId)
                    .to_owned(),
            )
            .await?;

        // 9. llm_configs
        manager
            .create_table(
                Table::create()
                    .table(LlmConfigs::Table)
                    .if_not_exists()
                    .col(id_col(LlmConfigs::Id))
                    .col(ColumnDef::new(LlmConfigs::Name).string().not_null())
                    .col(ColumnDef::new(LlmConfigs::Provider).string_len(32).not_null())
                    .col(ColumnDef::new(LlmConfigs::Model).string().not_null())
                    .col(ColumnDef::new(LlmConfigs::ApiUrl).string().not_null().default(""))
                    .col(ColumnDef::new(LlmConfigs::ApiKeyEncrypted).text())
                    .col(ColumnDef::new(LlmConfigs::MaxTokens).integer().not_null().default(4096))
                    .col(ColumnDef::new(LlmConfigs::Temperature).float().not_null().default(0.1))
                    .col(
                        ColumnDef::new(LlmConfigs::TimeoutSecs)
                            .big_integer()
                            .not_null()
                            .default(60),
                    )
                    .col(ColumnDef::new(LlmConfigs::IsDefault).boolean().not_null().default(false))
                    .col(ColumnDef::new(LlmConfigs::IsEnabled).boolean().not_null().default(true))
                    .col(ColumnDef::new(LlmConfigs::LastTestStatus).string_len(16))
                    .col(ColumnDef::new(LlmConfigs::LastTestMessage).text())
                    .col(ColumnDef::new(LlmConfigs::LastTestedAt).timestamp_with_time_zone())
                    .col(now_col(LlmConfigs::CreatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LlmConfigs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CrawlLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CrawlTasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AnnouncementPositions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Positions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AnnouncementAttachments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Announcements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Articles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ListPages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ListPages {
    Table,
    Id,
    Url,
    SourceName,
    Category,
    CrawlFrequency,
    ArticleSelector,
    PaginationPattern,
    MaxPages,
    AllowedHosts,
    Status,
    LastCrawledAt,
    LastArticleCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Articles {
    Table,
    Id,
    SourceListId,
    Url,
    Title,
    Category,
    DiscoveredAt,
}

#[derive(DeriveIden)]
enum Announcements {
    Table,
    Id,
    Url,
    Title,
    PublishedAt,
    AnnouncementType,
    ExamType,
    Province,
    City,
    Content,
    RawHtml,
    Confidence,
    Status,
    Partial,
    Truncated,
    TemplateVersion,
    SourceListId,
    SourceName,
    Category,
    Etag,
    LastModified,
    Extra,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AnnouncementAttachments {
    Table,
    Id,
    AnnouncementId,
    Name,
    Url,
    Fetched,
    ContentType,
    LocalRef,
}

#[derive(DeriveIden)]
enum Positions {
    Table,
    Id,
    PositionId,
    PositionName,
    PositionCode,
    DepartmentName,
    DepartmentCode,
    DepartmentLevel,
    WorkLocationProvince,
    WorkLocationCity,
    WorkLocationDistrict,
    RecruitCount,
    EducationMin,
    MajorSpecific,
    MajorUnlimited,
    PoliticalStatus,
    AgeMin,
    AgeMax,
    WorkExpYearsMin,
    GrassrootsExpYears,
    HukouRequired,
    HukouProvinces,
    GenderRequired,
    FreshGraduateOnly,
    ExamType,
    ExamYear,
    RegistrationStart,
    RegistrationEnd,
    ExamDate,
    InterviewDate,
    Status,
    CompetitionRatio,
    ApplicantCount,
    Notes,
    Confidence,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AnnouncementPositions {
    Table,
    Id,
    AnnouncementId,
    PositionId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CrawlTasks {
    Table,
    TaskId,
    TaskType,
    TaskName,
    Params,
    Status,
    Progress,
    Queue,
    UniquenessKey,
    AttemptCount,
    MaxRetries,
    ScheduledAt,
    Deadline,
    StartedAt,
    CompletedAt,
    ErrorMessage,
    Result,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CrawlLogs {
    Table,
    Id,
    TaskId,
    Attempt,
    Level,
    Message,
    Timestamp,
}

#[derive(DeriveIden)]
enum LlmConfigs {
    Table,
    Id,
    Name,
    Provider,
    Model,
    ApiUrl,
    ApiKeyEncrypted,
    MaxTokens,
    Temperature,
    TimeoutSecs,
    IsDefault,
    IsEnabled,
    LastTestStatus,
    LastTestMessage,
    LastTestedAt,
    CreatedAt,
}
