// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// 任务耗时直方图的桶边界（秒）
const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// 安装 Prometheus 记录器并注册指标说明
///
/// 返回的句柄交给运维路由渲染 `/metrics`，不单独监听端口。
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("gwycrawl_task_duration_seconds".into()),
            DURATION_BUCKETS,
        )?
        .install_recorder()?;

    describe_metrics();
    info!("Prometheus recorder installed");
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!("gwycrawl_tasks_total", "Tasks reaching a terminal or retry state");
    describe_counter!("gwycrawl_enqueued_total", "Tasks accepted by the broker");
    describe_counter!("gwycrawl_duplicates_total", "Enqueue attempts rejected by a uniqueness key");
    describe_gauge!("gwycrawl_queue_depth", "Pending tasks per queue");
    describe_histogram!(
        "gwycrawl_task_duration_seconds",
        Unit::Seconds,
        "Handler execution time"
    );
    describe_counter!("gwycrawl_fetch_total", "Upstream fetches by status class");
    describe_counter!("gwycrawl_rate_limited_total", "Fetches delayed by the per-host limiter");
    describe_counter!("gwycrawl_llm_calls_total", "LLM calls by kind and outcome");
    describe_counter!("gwycrawl_notifications_total", "Notifications created");
    describe_counter!(
        "gwycrawl_notifications_capped_total",
        "Notifications dropped by the per-user daily cap"
    );
}
