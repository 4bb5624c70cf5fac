// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::domain::models::position::Position;
use crate::domain::models::reminder::SubscribeType;
use crate::test_support::{self, Repositories};
use parking_lot::Mutex;
use sea_orm::DatabaseConnection;

/// 记录投递的渠道
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<i64>>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, notification: &Notification, contact: &Contact) -> Result<(), ChannelError> {
        if contact.email.is_none() {
            return Err(ChannelError::NoAddress);
        }
        self.sent.lock().push(notification.id);
        Ok(())
    }
}

struct Fixture {
    db: DatabaseConnection,
    repos: Repositories,
    channel: Arc<RecordingChannel>,
    service: ReminderService,
}

async fn fixture_with(settings: ReminderSettings) -> Fixture {
    let db = test_support::memory_db().await;
    let repos = test_support::repositories(&db);
    let channel = Arc::new(RecordingChannel::default());
    let service = ReminderService::new(
        repos.notifications.clone(),
        repos.reminders.clone(),
        repos.positions.clone(),
        repos.announcements.clone(),
        vec![channel.clone() as Arc<dyn NotificationChannel>],
        &settings,
    );
    Fixture {
        db,
        repos,
        channel,
        service,
    }
}

async fn fixture() -> Fixture {
    fixture_with(test_support::settings().reminder).await
}

/// 北京时间 2025-03-10 10:00
fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

async fn seed_position(f: &Fixture, code: &str, province: &str, registration_end: NaiveDate) -> Position {
    let announcement_id =
        test_support::seed_announcement(&f.repos, &format!("https://example.gov/a/{}.html", code)).await;
    let mut position = Position {
        position_name: "一级科员".to_string(),
        position_code: Some(code.to_string()),
        department_name: "某市税务局".to_string(),
        recruit_count: 1,
        exam_year: Some(2025),
        work_location_province: Some(province.to_string()),
        registration_end: Some(registration_end),
        confidence: 85,
        ..Default::default()
    };
    position.position_id = position.natural_key();
    f.repos
        .positions
        .upsert_with_link(&position, announcement_id)
        .await
        .unwrap()
}

#[test]
fn test_quiet_hours_wrap_midnight() {
    let policy = ReminderPolicy::from_settings(&test_support::settings().reminder);

    // 北京时间 23:00 与 03:00 在免打扰时段内，10:00 不在
    assert!(policy.is_quiet(Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap()));
    assert!(policy.is_quiet(Utc.with_ymd_and_hms(2025, 3, 10, 19, 0, 0).unwrap()));
    assert!(!policy.is_quiet(morning()));

    // 次日 03:00 的提醒提前到当晚 22:00
    let shifted = policy.shift_out_of_quiet(Utc.with_ymd_and_hms(2025, 3, 10, 19, 0, 0).unwrap());
    assert_eq!(shifted, Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap());

    assert_eq!(
        policy.day_start(today()),
        Utc.with_ymd_and_hms(2025, 3, 9, 16, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_registration_deadline_fan_out() {
    // Given: 三个用户收藏了两天后截止报名的职位
    let f = fixture().await;
    let position = seed_position(&f, "300110001", "广东", today() + Duration::days(2)).await;
    for user_id in [1, 2, 3] {
        test_support::seed_favorite(&f.db, user_id, &position.position_id).await;
    }

    // When: 生成当天计划并逐个发送
    let plan = f.service.plan_daily(today(), morning()).await.unwrap();
    assert_eq!(plan.registration.len(), 3);
    for payload in &plan.registration {
        f.service.registration_reminder(payload, morning()).await.unwrap();
    }

    // Then: 每个用户一条通知，重复执行不再写入
    for user_id in [1, 2, 3] {
        let count = f
            .repos
            .notifications
            .count_for_user_since(user_id, morning() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
    let again = f
        .service
        .registration_reminder(&plan.registration[0], morning())
        .await
        .unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn test_registration_reminder_content() {
    let f = fixture().await;
    let position = seed_position(&f, "300110002", "广东", today() + Duration::days(1)).await;

    let notification = f
        .service
        .registration_reminder(
            &RegistrationReminderPayload {
                position_id: position.position_id.clone(),
                user_id: 9,
            },
            morning(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(notification.kind, NotificationKind::RegistrationReminder);
    assert_eq!(notification.link, format!("/positions/{}", position.id));
    assert!(notification.content.contains("2025年03月11日"));
}

#[tokio::test]
async fn test_daily_cap() {
    let mut settings = test_support::settings().reminder;
    settings.daily_cap = 1;
    let f = fixture_with(settings).await;

    let first = Notification::new(5, NotificationKind::AnnouncementPush, "a", "a", "/announcements/1")
        .with_source("announcement", 1);
    let second = Notification::new(5, NotificationKind::AnnouncementPush, "b", "b", "/announcements/2")
        .with_source("announcement", 2);

    assert!(f.service.notify(first, morning()).await.unwrap().is_some());
    assert!(f.service.notify(second, morning()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_quiet_hours_deliver_in_app_only() {
    let f = fixture().await;
    test_support::seed_contact(
        &f.db,
        &Contact {
            user_id: 5,
            email: Some("user@example.com".to_string()),
            ..Default::default()
        },
    )
    .await;

    let night = Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap();
    let quiet = Notification::new(5, NotificationKind::AnnouncementPush, "a", "a", "/announcements/1")
        .with_source("announcement", 1);
    assert!(f.service.notify(quiet, night).await.unwrap().is_some());
    assert!(f.channel.sent.lock().is_empty());

    let day = Notification::new(5, NotificationKind::AnnouncementPush, "b", "b", "/announcements/2")
        .with_source("announcement", 2);
    let saved = f.service.notify(day, morning()).await.unwrap().unwrap();
    assert_eq!(*f.channel.sent.lock(), vec![saved.id]);
}

#[tokio::test]
async fn test_calendar_plan_respects_offsets_and_quiet_hours() {
    let f = fixture().await;
    // 北京时间 3 月 11 日 00:30 的考试，提前 60 分钟落在免打扰时段
    let event_time = Utc.with_ymd_and_hms(2025, 3, 10, 16, 30, 0).unwrap();
    let event_id = test_support::seed_calendar_event(&f.db, 7, "笔试", event_time, vec![60, 720]).await;

    let plan = f.service.plan_daily(today(), morning()).await.unwrap();

    let fire_times: Vec<_> = plan
        .calendar
        .iter()
        .filter(|(p, _)| p.event_id == event_id)
        .map(|(p, at)| (p.offset_minutes, *at))
        .collect();
    assert_eq!(
        fire_times,
        vec![
            // 23:30 提前到 22:00
            (60, Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap()),
            (720, Utc.with_ymd_and_hms(2025, 3, 10, 4, 30, 0).unwrap()),
        ]
    );

    let notification = f
        .service
        .calendar_reminder(&plan.calendar[0].0, morning())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notification.link, format!("/calendar?event={}", event_id));
}

#[tokio::test]
async fn test_subscription_push_advances_cursor() {
    let f = fixture().await;
    let sub_id = test_support::seed_subscription(&f.db, 3, SubscribeType::Province, "广东").await;
    seed_position(&f, "300110003", "广东", today() + Duration::days(10)).await;
    seed_position(&f, "300110004", "浙江", today() + Duration::days(10)).await;

    let payload = SubscriptionPushPayload {
        subscription_id: sub_id,
        since: None,
    };
    let now = Utc::now();
    let notification = f.service.subscription_push(&payload, now).await.unwrap().unwrap();
    assert!(notification.title.contains("1 个新职位"));
    assert_eq!(notification.link, format!("/subscriptions/{}", sub_id));

    let later = now + Duration::minutes(5);
    assert!(f.service.subscription_push(&payload, later).await.unwrap().is_none());
    let sub = f.repos.reminders.find_subscription(sub_id).await.unwrap().unwrap();
    assert!(sub.last_notified_at.is_some());
}

#[tokio::test]
async fn test_announcement_push_once_per_user() {
    let f = fixture().await;
    let announcement_id = test_support::seed_announcement(&f.repos, "https://example.gov/a/push.html").await;
    let mut announcement = f.repos.announcements.find_by_id(announcement_id).await.unwrap().unwrap();
    announcement.exam_type = Some("省考".to_string());
    announcement.province = Some("广东".to_string());
    f.repos.announcements.update(&announcement).await.unwrap();

    test_support::seed_subscription(&f.db, 1, SubscribeType::Province, "广东").await;
    test_support::seed_subscription(&f.db, 1, SubscribeType::ExamType, "省考").await;
    test_support::seed_subscription(&f.db, 2, SubscribeType::ExamType, "省考").await;
    test_support::seed_subscription(&f.db, 3, SubscribeType::Province, "江苏").await;

    let sent = f
        .service
        .announcement_push(&AnnouncementPushPayload { announcement_id }, morning())
        .await
        .unwrap();
    assert_eq!(sent, 2);
}
