// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

use super::backend::{BrokerBackend, BrokerError, TaskEnvelope};
use crate::domain::models::task::QueueName;

/// 取出分数不大于当前时间的第一个成员，并一并删除信封
static POP_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ids == 0 then
  return false
end
redis.call('ZREM', KEYS[1], ids[1])
local key = ARGV[2] .. ids[1]
local body = redis.call('GET', key)
redis.call('DEL', key)
return body
"#,
    )
});

/// 唯一键仍归属当前任务时才删除
static RELEASE_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#,
    )
});

/// Redis 队列后端
///
/// 键布局：
/// - `{prefix}:queue:{name}`：ZSET，成员为任务 ID，分数为就绪时间（毫秒）
/// - `{prefix}:task:{id}`：信封 JSON
/// - `{prefix}:unique:{key}`：唯一键，带 TTL
/// - `{prefix}:meta:{key}`：元数据
#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
    prefix: String,
}

impl RedisBackend {
    /// 创建 Redis 后端
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    /// * `prefix` - 键前缀
    pub fn new(redis_url: &str, prefix: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: prefix.trim_end_matches(':').to_string(),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, BrokerError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// 启动时检查连通性
    pub async fn ping(&self) -> Result<(), BrokerError> {
        let mut con = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut con).await?;
        Ok(())
    }

    fn queue_key(&self, queue: QueueName) -> String {
        format!("{}:queue:{}", self.prefix, queue.as_str())
    }

    fn task_prefix(&self) -> String {
        format!("{}:task:", self.prefix)
    }

    fn task_key(&self, task_id: Uuid) -> String {
        format!("{}{}", self.task_prefix(), task_id)
    }

    fn unique_key(&self, key: &str) -> String {
        format!("{}:unique:{}", self.prefix, key)
    }

    fn meta_key(&self, key: &str) -> String {
        format!("{}:meta:{}", self.prefix, key)
    }
}

#[async_trait]
impl BrokerBackend for RedisBackend {
    async fn push(
        &self,
        envelope: &TaskEnvelope,
        ready_at: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let body = serde_json::to_string(envelope)?;
        let mut con = self.connection().await?;
        redis::pipe()
            .atomic()
            .set(self.task_key(envelope.task_id), body)
            .ignore()
            .zadd(
                self.queue_key(envelope.queue),
                envelope.task_id.to_string(),
                ready_at.timestamp_millis(),
            )
            .ignore()
            .query_async::<()>(&mut con)
            .await?;
        Ok(())
    }

    async fn pop_ready(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskEnvelope>, BrokerError> {
        let mut con = self.connection().await?;
        let body: Option<String> = POP_SCRIPT
            .key(self.queue_key(queue))
            .arg(now.timestamp_millis())
            .arg(self.task_prefix())
            .invoke_async(&mut con)
            .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, queue: QueueName, task_id: Uuid) -> Result<bool, BrokerError> {
        let mut con = self.connection().await?;
        let removed: i64 = con
            .zrem(self.queue_key(queue), task_id.to_string())
            .await?;
        if removed > 0 {
            con.del::<_, ()>(self.task_key(task_id)).await?;
        }
        Ok(removed > 0)
    }

    async fn depth(&self, queue: QueueName) -> Result<u64, BrokerError> {
        let mut con = self.connection().await?;
        let depth: u64 = con.zcard(self.queue_key(queue)).await?;
        Ok(depth)
    }

    async fn claim_unique(
        &self,
        key: &str,
        task_id: Uuid,
        ttl: Duration,
    ) -> Result<bool, BrokerError> {
        let mut con = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.unique_key(key))
            .arg(task_id.to_string())
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut con)
            .await?;
        Ok(reply.is_some())
    }

    async fn release_unique(&self, key: &str, task_id: Uuid) -> Result<(), BrokerError> {
        let mut con = self.connection().await?;
        let _released: i64 = RELEASE_SCRIPT
            .key(self.unique_key(key))
            .arg(task_id.to_string())
            .invoke_async(&mut con)
            .await?;
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let mut con = self.connection().await?;
        let value: Option<String> = con.get(self.meta_key(key)).await?;
        Ok(value)
    }

    async fn set_meta(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), BrokerError> {
        let mut con = self.connection().await?;
        match ttl {
            Some(ttl) => {
                con.set_ex::<_, _, ()>(self.meta_key(key), value, ttl.as_secs().max(1))
                    .await?
            }
            None => con.set::<_, _, ()>(self.meta_key(key), value).await?,
        }
        Ok(())
    }
}
