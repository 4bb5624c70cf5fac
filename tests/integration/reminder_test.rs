// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::create_test_app;
use chrono::{Duration as ChronoDuration, FixedOffset, Utc};
use gwycrawl::domain::models::announcement::Announcement;
use gwycrawl::domain::models::position::Position;
use gwycrawl::domain::models::reminder::DailyCheckPayload;
use gwycrawl::domain::models::task::TaskKind;
use gwycrawl::domain::repositories::announcement_repository::AnnouncementRepository;
use gwycrawl::domain::repositories::position_repository::PositionRepository;
use gwycrawl::infrastructure::database::entities::notification;
use gwycrawl::queue::EnqueueOptions;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::time::Duration;

#[tokio::test]
async fn test_registration_deadline_fan_out() {
    // Given: 三个用户收藏了一个后天截止报名的职位
    let app = create_test_app().await;
    let beijing = FixedOffset::east_opt(8 * 3600).unwrap();
    let today = Utc::now().with_timezone(&beijing).date_naive();

    let mut announcement = Announcement::new("https://example.gov/a/2025.html", "2025年度公务员招录公告");
    announcement.content = "报名时间为即日起至后天".to_string();
    let announcement = app.announcements.create(&announcement).await.unwrap();

    let mut position = Position {
        position_name: "一级科员".to_string(),
        position_code: Some("300110001".to_string()),
        department_name: "某市税务局".to_string(),
        recruit_count: 1,
        exam_year: Some(2025),
        registration_end: Some(today + ChronoDuration::days(2)),
        confidence: 85,
        ..Default::default()
    };
    position.position_id = position.natural_key();
    let position = app
        .positions
        .upsert_with_link(&position, announcement.id)
        .await
        .unwrap();
    for user_id in [1, 2, 3] {
        app.reminders.add_favorite(user_id, &position.position_id).await.unwrap();
    }

    // When: 执行当天的每日检查
    app.broker
        .enqueue_payload(
            TaskKind::DailyCheck,
            &DailyCheckPayload {
                check_date: Some(today),
            },
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    app.wait_idle(Duration::from_secs(15)).await;

    // Then: 每人一条报名截止提醒
    let rows = notification::Entity::find()
        .filter(notification::Column::Kind.eq("registration_reminder"))
        .all(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    let mut users: Vec<i64> = rows.iter().map(|r| r.user_id).collect();
    users.sort_unstable();
    assert_eq!(users, vec![1, 2, 3]);
    let link = format!("/positions/{}", position.id);
    assert!(rows.iter().all(|r| r.link == link));

    app.shutdown().await;
}

#[tokio::test]
async fn test_daily_check_twice_notifies_once() {
    // Given: 一个收藏了明天截止职位的用户
    let app = create_test_app().await;
    let beijing = FixedOffset::east_opt(8 * 3600).unwrap();
    let today = Utc::now().with_timezone(&beijing).date_naive();

    let mut announcement = Announcement::new("https://example.gov/a/2026.html", "2026年度公务员招录公告");
    announcement.content = "报名时间为即日起至明天".to_string();
    let announcement = app.announcements.create(&announcement).await.unwrap();
    let mut position = Position {
        position_name: "综合管理岗".to_string(),
        department_name: "某县人社局".to_string(),
        recruit_count: 2,
        registration_end: Some(today + ChronoDuration::days(1)),
        ..Default::default()
    };
    position.position_id = position.natural_key();
    let position = app
        .positions
        .upsert_with_link(&position, announcement.id)
        .await
        .unwrap();
    app.reminders.add_favorite(9, &position.position_id).await.unwrap();

    // When: 同一天执行两次
    for _ in 0..2 {
        app.broker
            .enqueue(
                TaskKind::DailyCheck,
                serde_json::json!({ "check_date": today }),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        app.wait_idle(Duration::from_secs(15)).await;
    }

    // Then
    let rows = notification::Entity::find()
        .filter(notification::Column::UserId.eq(9))
        .all(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, "registration_reminder");

    app.shutdown().await;
}
