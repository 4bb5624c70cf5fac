// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;

fn load(overrides: &[(&str, &str)]) -> Settings {
    let mut builder = Settings::defaults().unwrap();
    for (key, value) in overrides {
        builder = builder.set_override(*key, *value).unwrap();
    }
    builder.build().unwrap().try_deserialize().unwrap()
}

#[test]
fn test_defaults_cover_configuration_surface() {
    let settings = load(&[]);

    assert!(settings.broker.redis_addr.is_none());
    assert_eq!(settings.broker.retry_max, 3);
    assert_eq!(settings.broker.queue_weights.critical, 6);
    assert_eq!(settings.fetcher.max_bytes, 8 * 1024 * 1024);
    assert_eq!(settings.fetcher.max_document_bytes, 32 * 1024 * 1024);
    assert_eq!(settings.llm.confidence_threshold, 85);
    assert!((settings.llm.temperature - 0.1).abs() < f32::EPSILON);
    assert_eq!(settings.ocr.engine, "tesseract");
    assert_eq!(settings.ocr.language, "chi_sim+eng");
    assert_eq!(settings.parsers.html.keywords.len(), 6);
    assert_eq!(settings.reminder.quiet_hours_start, 22);
    assert_eq!(settings.reminder.quiet_hours_end, 8);
    assert_eq!(settings.reminder.default_offsets_minutes, vec![1440, 60]);
}

#[test]
fn test_overrides_take_precedence() {
    let settings = load(&[
        ("broker.redis_addr", "redis://127.0.0.1:6379"),
        ("fetcher.rps_per_host", "7"),
        ("ocr.engine", "api"),
    ]);

    assert_eq!(
        settings.broker.redis_addr.as_deref(),
        Some("redis://127.0.0.1:6379")
    );
    assert_eq!(settings.fetcher.rps_per_host, 7);
    assert_eq!(settings.ocr.engine, "api");
}

#[test]
fn test_poll_interval_conversion() {
    let settings = load(&[("broker.poll_interval_ms", "250")]);
    assert_eq!(
        settings.broker.poll_interval(),
        Duration::from_millis(250)
    );
}
