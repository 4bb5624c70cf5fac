// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 通知渠道实现
///
/// 站内通知即通知记录本身；推送只留投递记录，由客户端拉取；
/// 邮件与短信经 HTTP 网关发送。
pub mod channels;

use std::sync::Arc;
use std::time::Duration;

use crate::config::settings::ReminderSettings;
use crate::domain::models::notification::ChannelType;
use crate::domain::services::reminder_service::NotificationChannel;

pub use channels::{PushChannel, WebhookChannel};

/// 根据配置组装渠道列表
pub fn create_channels(settings: &ReminderSettings, timeout: Duration) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(PushChannel)];
    if let Some(gateway) = settings.email_gateway.as_deref().filter(|g| !g.is_empty()) {
        channels.push(Arc::new(WebhookChannel::new(ChannelType::Email, gateway, timeout)));
    }
    if let Some(gateway) = settings.sms_gateway.as_deref().filter(|g| !g.is_empty()) {
        channels.push(Arc::new(WebhookChannel::new(ChannelType::Sms, gateway, timeout)));
    }
    channels
}
