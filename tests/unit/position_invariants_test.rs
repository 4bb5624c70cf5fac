// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use gwycrawl::domain::models::position::ParsedPosition;
use gwycrawl::domain::services::position_normalizer::{normalize, NormalizeContext};

fn parsed(age: &str, count: Option<i32>) -> ParsedPosition {
    ParsedPosition {
        position_name: Some("一级科员".into()),
        position_code: Some("300110001".into()),
        department_name: Some("某市税务局".into()),
        department_code: Some("130".into()),
        recruit_count: count,
        age: Some(age.into()),
        ..Default::default()
    }
}

fn context() -> NormalizeContext {
    NormalizeContext {
        exam_year: Some(2025),
        ..Default::default()
    }
}

#[test]
fn test_age_bounds_ordered() {
    let samples = [
        "",
        "不限",
        "18周岁以上、35周岁以下",
        "35周岁以下",
        "40周岁以上",
        "35岁至18岁",
        "1990年1月1日以后出生",
    ];
    for age in samples {
        let position = normalize(&parsed(age, Some(2)), &context());
        let (min, max) = (position.age_min.unwrap(), position.age_max.unwrap());
        assert!(min <= max, "年龄 {:?} 得到 {}-{}", age, min, max);
        assert!(position.validate().is_ok());
    }
}

#[test]
fn test_missing_count_defaults_to_one() {
    let position = normalize(&parsed("", None), &context());
    assert_eq!(position.recruit_count, 1);
}

#[test]
fn test_natural_key_stable_across_reextraction() {
    let first = normalize(&parsed("35周岁以下", Some(2)), &context());
    let again = normalize(&parsed("35周岁以下", Some(3)), &context());

    assert_eq!(first.natural_key(), "130:300110001:2025");
    assert_eq!(first.natural_key(), again.natural_key());
}

#[test]
fn test_hash_key_without_codes() {
    let mut a = parsed("", Some(1));
    a.position_code = None;
    a.department_code = None;
    let key = normalize(&a, &context()).natural_key();
    assert_eq!(key, normalize(&a, &context()).natural_key());
    assert!(key.starts_with("h:"));
}
