// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::settings::LogSettings;

/// 初始化日志订阅者
///
/// `RUST_LOG` 优先；否则使用 `info,gwycrawl=debug`。
/// 配置 `log.format = "json"` 时输出结构化 JSON 行。
pub fn init_telemetry(log: &LogSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(log).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn default_filter(log: &LogSettings) -> String {
    match log.level.as_deref() {
        Some(level) if !level.is_empty() => level.to_string(),
        _ => "info,gwycrawl=debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_falls_back() {
        let log = LogSettings {
            format: "pretty".into(),
            level: None,
        };
        assert_eq!(default_filter(&log), "info,gwycrawl=debug");

        let log = LogSettings {
            format: "json".into(),
            level: Some("warn".into()),
        };
        assert_eq!(default_filter(&log), "warn");
    }
}
