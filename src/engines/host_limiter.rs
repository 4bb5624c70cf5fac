// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::traits::FetchError;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// 每主机令牌桶与并发信号量
#[derive(Clone)]
pub struct HostLimiter {
    limiter: Arc<KeyedLimiter>,
    /// 存储每个主机的信号量
    semaphores: Arc<DashMap<String, Arc<Semaphore>>>,
    permits: usize,
}

impl HostLimiter {
    /// 创建限流器
    ///
    /// # 参数
    ///
    /// * `rps` - 每个主机每秒请求数，0 视为 1
    /// * `burst` - 令牌桶容量，0 视为 1
    /// * `permits` - 每个主机同时在途请求上限
    pub fn new(rps: u32, burst: u32, permits: usize) -> Self {
        let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rps).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            semaphores: Arc::new(DashMap::new()),
            permits: permits.max(1),
        }
    }

    fn semaphore(&self, host: &str) -> Arc<Semaphore> {
        self.semaphores
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.permits)))
            .clone()
    }

    /// 获取主机的发送许可
    ///
    /// 先占用并发槽位，再等待令牌；总等待不超过 `wait`。
    ///
    /// # 返回值
    ///
    /// * `Ok(OwnedSemaphorePermit)` - 许可，释放时归还并发槽位
    /// * `Err(FetchError::RateLimitExceeded)` - 在 `wait` 内未能获得许可
    pub async fn acquire(
        &self,
        host: &str,
        wait: Duration,
    ) -> Result<OwnedSemaphorePermit, FetchError> {
        let key = host.to_string();
        let semaphore = self.semaphore(host);
        let limiter = self.limiter.clone();

        let acquire = async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| FetchError::RateLimitExceeded(key.clone()))?;
            limiter.until_key_ready(&key).await;
            Ok::<_, FetchError>(permit)
        };

        match tokio::time::timeout(wait, acquire).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("gwycrawl_rate_limited_total").increment(1);
                Err(FetchError::RateLimitExceeded(host.to_string()))
            }
        }
    }
}
