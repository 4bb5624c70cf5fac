// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// 退避增长方式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// `attempt × initial_backoff`
    Linear,
    /// `initial_backoff × multiplier^(attempt-1)`
    Exponential { multiplier: f64 },
}

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次执行）
    pub max_retries: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 增长方式
    pub strategy: BackoffStrategy,
    /// 抖动因子 (0.0-1.0)，为 0 时不加抖动
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 任务队列使用的线性退避，上限 1 小时
    pub fn linear(max_retries: u32, base: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff: base,
            max_backoff: Duration::from_secs(3600),
            strategy: BackoffStrategy::Linear,
            jitter_factor: 0.0,
        }
    }

    /// 抓取器内部的快速指数退避
    pub fn fast(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter_factor: 0.1,
        }
    }

    /// 计算第 `attempt` 次重试前的等待时间（attempt 从 1 开始）
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.initial_backoff.as_secs_f64();
        let raw = match self.strategy {
            BackoffStrategy::Linear => base * attempt as f64,
            BackoffStrategy::Exponential { multiplier } => {
                base * multiplier.powi(attempt as i32 - 1)
            }
        };

        let capped = raw.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.jitter_factor > 0.0 && capped > 0.0 {
            let jitter_range = capped * self.jitter_factor;
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped + jitter).clamp(0.0, self.max_backoff.as_secs_f64())
        } else {
            capped
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 计算下次重试时间
    pub fn next_retry_time(&self, attempt: u32, base_time: DateTime<Utc>) -> DateTime<Utc> {
        let backoff = self.calculate_backoff(attempt);
        base_time + chrono::Duration::milliseconds(backoff.as_millis() as i64)
    }

    /// 已执行 `attempts` 次后是否还能再试
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }
}
