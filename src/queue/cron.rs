// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::RwLock;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::backend::BrokerError;
use super::broker::{Broker, EnqueueOptions};
use crate::config::settings::ScheduleSettings;
use crate::domain::models::list_page::CrawlFrequency;
use crate::domain::models::task::{ScheduledMonitorPayload, TaskKind};

/// 宕机后最多回溯的触发点数量
const MAX_CATCH_UP_TICKS: usize = 10_000;

/// 周期任务模板
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    pub options: EnqueueOptions,
}

impl TaskTemplate {
    pub fn new(kind: TaskKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            options: EnqueueOptions::default(),
        }
    }
}

struct CronEntry {
    id: Uuid,
    name: String,
    schedule: Schedule,
    template: TaskTemplate,
}

/// 周期任务注册表
///
/// 上次触发时间保存在 Broker 后端，重启后对错过的触发点只补跑一次。
pub struct CronScheduler {
    broker: Arc<Broker>,
    entries: RwLock<Vec<CronEntry>>,
    tick: Duration,
}

impl CronScheduler {
    pub fn new(broker: Arc<Broker>, tick: Duration) -> Self {
        Self {
            broker,
            entries: RwLock::new(Vec::new()),
            tick,
        }
    }

    /// 注册周期任务
    ///
    /// # 参数
    ///
    /// * `name` - 稳定名称，用作触发游标与唯一键
    /// * `expr` - 6 段 cron 表达式（含秒）
    /// * `template` - 触发时入队的任务
    pub fn register(
        &self,
        name: &str,
        expr: &str,
        template: TaskTemplate,
    ) -> Result<Uuid, BrokerError> {
        let schedule = Schedule::from_str(expr)
            .map_err(|e| BrokerError::InvalidCron(format!("{}: {}", expr, e)))?;
        let id = Uuid::new_v4();
        self.entries.write().push(CronEntry {
            id,
            name: name.to_string(),
            schedule,
            template,
        });
        info!(entry = name, expr, "注册周期任务");
        Ok(id)
    }

    /// 按配置注册默认的定时监控与每日检查
    pub fn register_defaults(&self, settings: &ScheduleSettings) -> Result<(), BrokerError> {
        let monitors = [
            (CrawlFrequency::Hourly, &settings.hourly_monitor),
            (CrawlFrequency::Daily, &settings.daily_monitor),
            (CrawlFrequency::Weekly, &settings.weekly_monitor),
        ];
        for (frequency, expr) in monitors {
            let payload = serde_json::to_value(ScheduledMonitorPayload { frequency })?;
            self.register(
                &format!("monitor_{}", frequency.as_str()),
                expr,
                TaskTemplate::new(TaskKind::ScheduledMonitor, payload),
            )?;
        }
        self.register(
            "daily_check",
            &settings.daily_check,
            TaskTemplate::new(TaskKind::DailyCheck, serde_json::json!({})),
        )?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn cursor_key(name: &str) -> String {
        format!("cron:last:{}", name)
    }

    /// 检查全部条目，触发到期的任务
    ///
    /// # 返回值
    ///
    /// 本轮入队的任务数
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize, BrokerError> {
        let due: Vec<(Uuid, String, TaskTemplate)> = self
            .entries
            .read()
            .iter()
            .map(|e| (e.id, e.name.clone(), e.template.clone()))
            .collect();

        let backend = self.broker.backend();
        let mut fired = 0;

        for (id, name, template) in due {
            let key = Self::cursor_key(&name);
            let last = backend
                .get_meta(&key)
                .await?
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|d| d.with_timezone(&Utc));

            let Some(last) = last else {
                backend.set_meta(&key, &now.to_rfc3339(), None).await?;
                continue;
            };

            let ticks: Vec<DateTime<Utc>> = {
                let entries = self.entries.read();
                match entries.iter().find(|e| e.id == id) {
                    Some(entry) => entry
                        .schedule
                        .after(&last)
                        .take(MAX_CATCH_UP_TICKS)
                        .take_while(|t| *t <= now)
                        .collect(),
                    None => continue,
                }
            };
            let Some(tick) = ticks.last().copied() else {
                continue;
            };
            if ticks.len() > 1 {
                info!(entry = %name, missed = ticks.len() - 1, "合并错过的触发点，仅补跑一次");
            }

            let options = template
                .options
                .clone()
                .unique(format!("cron:{}:{}", name, tick.timestamp()));
            match self
                .broker
                .enqueue(template.kind, template.payload.clone(), options)
                .await
            {
                Ok(info) => {
                    fired += 1;
                    info!(entry = %name, task_id = %info.task_id, "周期任务已触发");
                }
                Err(BrokerError::AlreadyQueued(_)) => {}
                Err(e) => {
                    error!(entry = %name, "周期任务入队失败: {}", e);
                    continue;
                }
            }
            backend.set_meta(&key, &tick.to_rfc3339(), None).await?;
        }
        Ok(fired)
    }

    /// 启动后台循环
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("周期任务调度器退出");
                        return;
                    }
                    _ = interval.tick() => {}
                }
                if let Err(e) = self.run_due(Utc::now()).await {
                    warn!("周期任务检查失败: {}", e);
                }
            }
        })
    }
}
