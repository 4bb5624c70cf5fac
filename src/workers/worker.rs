// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// 由 [`WorkerManager`](super::WorkerManager) 托管的长期循环
///
/// `shutdown` 取消后，当前任务交还 Broker 或执行完毕再返回。
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError>;

    /// 日志中的标识
    fn name(&self) -> &str;
}
