// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use gwycrawl::domain::services::json_repair::{extract_json, parse_llm_json, repair};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Cleaned {
    title: String,
    content: String,
    attachments: Vec<serde_json::Value>,
    confidence: i32,
}

#[test]
fn test_fenced_reply_with_trailing_comma() {
    let raw = "```json\n{\"title\":\"x\",\"content\":\"c\",\"attachments\":[],\"confidence\":90,}\n```";

    let cleaned: Cleaned = parse_llm_json(raw).unwrap();

    assert_eq!(cleaned.title, "x");
    assert_eq!(cleaned.content, "c");
    assert!(cleaned.attachments.is_empty());
    assert_eq!(cleaned.confidence, 90);
}

#[test]
fn test_repair_is_idempotent() {
    let samples = [
        r#"{"a":1,}"#,
        r#"{"a":[1,2,],"b":{"c":"x,}",},}"#,
        r#"{"positions":[{"name":"科员" , } , ] }"#,
        r#"{"valid":true}"#,
        "[]",
        "",
    ];
    for sample in samples {
        let once = repair(sample);
        assert_eq!(repair(&once), once, "输入: {}", sample);
    }
}

#[test]
fn test_valid_json_left_unchanged() {
    let valid = r#"{"title":"某市公告","items":[1,2,3],"nested":{"text":"含有,}的字符串"}}"#;
    assert_eq!(repair(valid), valid);
    assert_eq!(extract_json(valid), valid);
}

#[test]
fn test_prose_around_object() {
    let raw = "好的，结果如下：{\"title\":\"y\",\"content\":\"正文\",\"attachments\":[],\"confidence\":60} 以上。";
    let cleaned: Cleaned = parse_llm_json(raw).unwrap();
    assert_eq!(cleaned.title, "y");
}
