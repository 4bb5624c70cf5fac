// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::models::notification::{ChannelType, Contact, Notification};
use crate::domain::services::reminder_service::{ChannelError, NotificationChannel};

/// 移动推送
///
/// 只要求用户登记过设备令牌，投递记录即为推送队列。
#[derive(Debug, Default, Clone)]
pub struct PushChannel;

#[async_trait]
impl NotificationChannel for PushChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Push
    }

    async fn send(&self, _notification: &Notification, contact: &Contact) -> Result<(), ChannelError> {
        match contact.device_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(()),
            _ => Err(ChannelError::NoAddress),
        }
    }
}

#[derive(Debug, Serialize)]
struct GatewayMessage<'a> {
    channel: &'static str,
    to: &'a str,
    title: &'a str,
    content: &'a str,
    link: &'a str,
}

/// 邮件 / 短信网关
pub struct WebhookChannel {
    channel: ChannelType,
    gateway: String,
    client: Client,
}

impl WebhookChannel {
    pub fn new(channel: ChannelType, gateway: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            channel,
            gateway: gateway.to_string(),
            client,
        }
    }

    fn address<'a>(&self, contact: &'a Contact) -> Option<&'a str> {
        let address = match self.channel {
            ChannelType::Email => contact.email.as_deref(),
            ChannelType::Sms => contact.phone.as_deref(),
            ChannelType::Push => contact.device_token.as_deref(),
            ChannelType::InApp => None,
        };
        address.filter(|a| !a.trim().is_empty())
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> ChannelType {
        self.channel
    }

    async fn send(&self, notification: &Notification, contact: &Contact) -> Result<(), ChannelError> {
        let to = self.address(contact).ok_or(ChannelError::NoAddress)?;
        let message = GatewayMessage {
            channel: self.channel.as_str(),
            to,
            title: &notification.title,
            content: &notification.content,
            link: &notification.link,
        };

        let response = self
            .client
            .post(&self.gateway)
            .json(&message)
            .send()
            .await
            .map_err(|e| ChannelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Gateway(format!("HTTP {}", status.as_u16())));
        }
        debug!(notification_id = notification.id, channel = self.channel.as_str(), "网关已受理");
        Ok(())
    }
}
