// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{extract::Path, Extension, Json};
use std::sync::Arc;
use tracing::debug;

use crate::domain::models::task::QueueName;
use crate::presentation::errors::AppError;
use crate::queue::broker::QueueStats;
use crate::queue::Broker;

/// 单个队列的积压、运行中数量与最近失败的任务
pub async fn inspect_queue(
    Path(queue): Path<String>,
    Extension(broker): Extension<Arc<Broker>>,
) -> Result<Json<QueueStats>, AppError> {
    let queue: QueueName = queue.parse()?;
    let stats = broker.inspect(queue).await?;
    debug!(queue = queue.as_str(), depth = stats.depth, "queue inspected");
    Ok(Json(stats))
}
