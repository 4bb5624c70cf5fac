// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use uuid::Uuid;

use super::backend::{BrokerBackend, BrokerError, TaskEnvelope};
use crate::domain::models::task::QueueName;

type ReadyKey = (i64, u64);

#[derive(Default)]
struct QueueState {
    ready: BTreeMap<ReadyKey, Uuid>,
    index: HashMap<Uuid, ReadyKey>,
}

#[derive(Default)]
struct State {
    queues: HashMap<QueueName, QueueState>,
    envelopes: HashMap<Uuid, TaskEnvelope>,
    uniques: HashMap<String, (Uuid, DateTime<Utc>)>,
    meta: HashMap<String, (String, Option<DateTime<Utc>>)>,
    seq: u64,
}

/// 进程内队列后端
///
/// 语义与 Redis 后端一致，用于单进程部署和测试。
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::milliseconds(ttl.as_millis() as i64)
}

#[async_trait]
impl BrokerBackend for MemoryBackend {
    async fn push(
        &self,
        envelope: &TaskEnvelope,
        ready_at: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        state.seq += 1;
        let key = (ready_at.timestamp_millis(), state.seq);

        let queue = state.queues.entry(envelope.queue).or_default();
        if let Some(old) = queue.index.insert(envelope.task_id, key) {
            queue.ready.remove(&old);
        }
        queue.ready.insert(key, envelope.task_id);
        state.envelopes.insert(envelope.task_id, envelope.clone());
        Ok(())
    }

    async fn pop_ready(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskEnvelope>, BrokerError> {
        let mut state = self.state.lock();
        let Some(q) = state.queues.get_mut(&queue) else {
            return Ok(None);
        };

        let first = q.ready.iter().next().map(|(k, id)| (*k, *id));
        match first {
            Some((key, task_id)) if key.0 <= now.timestamp_millis() => {
                q.ready.remove(&key);
                q.index.remove(&task_id);
                Ok(state.envelopes.remove(&task_id))
            }
            _ => Ok(None),
        }
    }

    async fn remove(&self, queue: QueueName, task_id: Uuid) -> Result<bool, BrokerError> {
        let mut state = self.state.lock();
        let removed = match state.queues.get_mut(&queue) {
            Some(q) => match q.index.remove(&task_id) {
                Some(key) => {
                    q.ready.remove(&key);
                    true
                }
                None => false,
            },
            None => false,
        };
        if removed {
            state.envelopes.remove(&task_id);
        }
        Ok(removed)
    }

    async fn depth(&self, queue: QueueName) -> Result<u64, BrokerError> {
        let state = self.state.lock();
        Ok(state
            .queues
            .get(&queue)
            .map(|q| q.ready.len() as u64)
            .unwrap_or(0))
    }

    async fn claim_unique(
        &self,
        key: &str,
        task_id: Uuid,
        ttl: Duration,
    ) -> Result<bool, BrokerError> {
        let mut state = self.state.lock();
        let now = Utc::now();
        if let Some((_, expires_at)) = state.uniques.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        state
            .uniques
            .insert(key.to_string(), (task_id, expiry(ttl)));
        Ok(true)
    }

    async fn release_unique(&self, key: &str, task_id: Uuid) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if matches!(state.uniques.get(key), Some((owner, _)) if *owner == task_id) {
            state.uniques.remove(key);
        }
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let state = self.state.lock();
        Ok(state.meta.get(key).and_then(|(value, expires_at)| match expires_at {
            Some(at) if *at <= Utc::now() => None,
            _ => Some(value.clone()),
        }))
    }

    async fn set_meta(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), BrokerError> {
        self.state
            .lock()
            .meta
            .insert(key.to_string(), (value.to_string(), ttl.map(expiry)));
        Ok(())
    }
}
