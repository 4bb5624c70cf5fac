// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{routing::get, Extension, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::presentation::handlers::{metrics_handler, queue_handler};
use crate::queue::Broker;

/// 创建运维路由
///
/// # 参数
///
/// * `broker` - 供队列查询使用
/// * `metrics` - Prometheus 记录器句柄
pub fn routes(broker: Arc<Broker>, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler::metrics))
        .route("/internal/queues/{queue}", get(queue_handler::inspect_queue))
        .layer(Extension(broker))
        .layer(Extension(metrics))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
pub async fn health_check() -> &'static str {
    "OK"
}
