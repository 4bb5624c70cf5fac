// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 任务 Broker：持久化的多队列、延迟与唯一任务、重试、取消与周期任务。
/// 后端可选 Redis 或进程内实现。
pub mod backend;
pub mod broker;
pub mod cron;
pub mod handler;
pub mod memory_backend;
pub mod redis_backend;
pub mod scheduler;

pub use backend::{BrokerBackend, BrokerError, TaskEnvelope};
pub use broker::{Broker, BrokerConfig, CancelOutcome, ClaimedTask, EnqueueOptions, TaskInfo};
pub use handler::{HandlerOutcome, HandlerTable, TaskContext, TaskHandler};
