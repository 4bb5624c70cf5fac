// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::broker::Broker;
use crate::domain::models::task::QueueName;

/// 队列维护调度器
///
/// 周期性地回收租约过期的任务、使过期任务失败，并刷新队列深度指标。
pub struct TaskScheduler {
    broker: Arc<Broker>,
    period: Duration,
}

impl TaskScheduler {
    /// 创建新的维护调度器
    ///
    /// # 参数
    ///
    /// * `broker` - 任务 Broker
    /// * `period` - 维护周期
    pub fn new(broker: Arc<Broker>, period: Duration) -> Self {
        Self { broker, period }
    }

    /// 执行一轮维护
    pub async fn tick(&self) {
        match self.broker.requeue_stuck().await {
            Ok(count) if count > 0 => info!("Reset {} stuck tasks", count),
            Ok(_) => {}
            Err(e) => error!("Failed to reset stuck tasks: {}", e),
        }

        match self.broker.expire_overdue().await {
            Ok(count) if count > 0 => info!("Expired {} tasks", count),
            Ok(_) => {}
            Err(e) => error!("Failed to expire tasks: {}", e),
        }

        for queue in QueueName::ALL {
            if let Err(e) = self.broker.inspect(queue).await {
                error!(queue = %queue, "Failed to inspect queue: {}", e);
            }
        }

        debug!("Scheduler maintenance tick");
    }

    /// 启动调度器后台任务
    ///
    /// # 返回值
    ///
    /// 返回后台任务的句柄
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => self.tick().await,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::{TaskKind, TaskStatus};
    use crate::queue::broker::{BrokerConfig, EnqueueOptions};
    use crate::queue::memory_backend::MemoryBackend;
    use crate::test_support::{memory_db, repositories};

    #[tokio::test]
    async fn test_tick_requeues_expired_lease() {
        // Given: 租约为 0 的 Broker，一个已被领取但不在本进程运行表中的任务
        let repos = repositories(&memory_db().await);
        let config = BrokerConfig {
            lease: Duration::from_secs(0),
            ..BrokerConfig::default()
        };
        let owner = Arc::new(Broker::new(
            Arc::new(MemoryBackend::new()),
            repos.tasks.clone(),
            repos.logs.clone(),
            config.clone(),
        ));
        let info = owner
            .enqueue(TaskKind::ArticleFetch, serde_json::json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        owner.dequeue().await.unwrap().unwrap();

        // When: 另一个进程的维护调度器执行一轮
        let other = Arc::new(Broker::new(
            owner.backend(),
            repos.tasks.clone(),
            repos.logs.clone(),
            config,
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
        TaskScheduler::new(other.clone(), Duration::from_secs(60))
            .tick()
            .await;

        // Then: 任务回到待执行状态并可再次领取
        let task = repos.tasks.find_by_id(info.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        let again = other.dequeue().await.unwrap().unwrap();
        assert_eq!(again.envelope.attempt, 2);
    }
}
