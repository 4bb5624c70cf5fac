use sea_orm_migration::prelude::*;

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
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create notifications table
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(id_col(Notifications::Id))
                    .col(ColumnDef::new(Notifications::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Notifications::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(Notifications::Title).string().not_null())
                    .col(ColumnDef::new(Notifications::Content).text().not_null())
                    .col(ColumnDef::new(Notifications::Link).string().not_null().default(""))
                    .col(ColumnDef::new(Notifications::SourceType).string_len(32).not_null().default(""))
                    .col(ColumnDef::new(Notifications::SourceId).string_len(128).not_null().default(""))
                    .col(ColumnDef::new(Notifications::IsRead).boolean().not_null().default(false))
                    .col(now_col(Notifications::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_user_created")
                    .table(Notifications::Table)
                    .col(Notifications::UserId)
                    .col(Notifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_source")
                    .table(Notifications::Table)
                    .col(Notifications::UserId)
                    .col(Notifications::SourceType)
                    .col(Notifications::SourceId)
                    .to_owned(),
            )
            .await?;

        // Create notification_deliveries table
        manager
            .create_table(
                Table::create()
                    .table(NotificationDeliveries::Table)
                    .if_not_exists()
                    .col(id_col(NotificationDeliveries::Id))
                    .col(
                        ColumnDef::new(NotificationDeliveries::NotificationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(NotificationDeliveries::Channel).string_len(16).not_null())
                    .col(ColumnDef::new(NotificationDeliveries::Success).boolean().not_null())
                    .col(ColumnDef::new(NotificationDeliveries::Error).text())
                    .col(now_col(NotificationDeliveries::DeliveredAt))
                    .to_owned(),
            )
            .await?;

        // Create calendar_events table
        manager
            .create_table(
                Table::create()
                    .table(CalendarEvents::Table)
                    .if_not_exists()
                    .col(id_col(CalendarEvents::Id))
                    .col(ColumnDef::new(CalendarEvents::UserId).big_integer().not_null())
                    .col(ColumnDef::new(CalendarEvents::Title).string().not_null())
                    .col(
                        ColumnDef::new(CalendarEvents::EventTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CalendarEvents::ReminderOffsetsMinutes).json().not_null())
                    .col(now_col(CalendarEvents::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_calendar_events_time")
                    .table(CalendarEvents::Table)
                    .col(CalendarEvents::EventTime)
                    .to_owned(),
            )
            .await?;

        // Create position_favorites table
        manager
            .create_table(
                Table::create()
                    .table(PositionFavorites::Table)
                    .if_not_exists()
                    .col(id_col(PositionFavorites::Id))
                    .col(ColumnDef::new(PositionFavorites::UserId).big_integer().not_null())
                    .col(ColumnDef::new(PositionFavorites::PositionId).string_len(128).not_null())
                    .col(now_col(PositionFavorites::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_position_favorites_user_position")
                    .table(PositionFavorites::Table)
                    .col(PositionFavorites::UserId)
                    .col(PositionFavorites::PositionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create subscriptions table
        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(id_col(Subscriptions::Id))
                    .col(ColumnDef::new(Subscriptions::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Subscriptions::SubscribeType).string_len(32).not_null())
                    .col(ColumnDef::new(Subscriptions::SubscribeValue).string().not_null())
                    .col(ColumnDef::new(Subscriptions::SubscribeName).string().not_null().default(""))
                    .col(ColumnDef::new(Subscriptions::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Subscriptions::LastNotifiedAt).timestamp_with_time_zone())
                    .col(now_col(Subscriptions::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create user_contacts table
        manager
            .create_table(
                Table::create()
                    .table(UserContacts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserContacts::UserId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserContacts::Email).string())
                    .col(ColumnDef::new(UserContacts::Phone).string_len(32))
                    .col(ColumnDef::new(UserContacts::DeviceToken).string())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserContacts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PositionFavorites::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CalendarEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NotificationDeliveries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    UserId,
    Kind,
    Title,
    Content,
    Link,
    SourceType,
    SourceId,
    IsRead,
    CreatedAt,
}

#[derive(DeriveIden)]
enum NotificationDeliveries {
    Table,
    Id,
    NotificationId,
    Channel,
    Success,
    Error,
    DeliveredAt,
}

#[derive(DeriveIden)]
enum CalendarEvents {
    Table,
    Id,
    UserId,
    Title,
    EventTime,
    ReminderOffsetsMinutes,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PositionFavorites {
    Table,
    Id,
    UserId,
    PositionId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
    UserId,
    SubscribeType,
    SubscribeValue,
    SubscribeName,
    IsActive,
    LastNotifiedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum UserContacts {
    Table,
    UserId,
    Email,
    Phone,
    DeviceToken,
}
