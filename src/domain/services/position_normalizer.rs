// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 职位字段规范化
//!
//! 将解析器或 LLM 给出的原文字段转换为结构化的 [`Position`]。

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::domain::models::position::{ParsedPosition, Position, PositionStatus};
use crate::parsers::field_mapping::{normalize_gender, split_majors};
use crate::utils::dates::parse_date;

/// 未注明年龄要求时的默认区间
pub const DEFAULT_AGE: (i32, i32) = (18, 35);
/// 年龄"不限"时的区间
pub const UNLIMITED_AGE: (i32, i32) = (18, 60);

/// 省级行政区简称，按长度降序避免"内蒙古"被截成"内蒙"
const PROVINCES: &[&str] = &[
    "黑龙江", "内蒙古", "北京", "天津", "上海", "重庆", "河北", "山西", "辽宁", "吉林", "江苏",
    "浙江", "安徽", "福建", "江西", "山东", "河南", "湖北", "湖南", "广东", "广西", "海南",
    "四川", "贵州", "云南", "西藏", "陕西", "甘肃", "青海", "宁夏", "新疆", "香港", "澳门",
    "台湾",
];
const MUNICIPALITIES: &[&str] = &["北京", "天津", "上海", "重庆"];
const PROVINCE_SUFFIXES: &[&str] = &[
    "维吾尔自治区",
    "壮族自治区",
    "回族自治区",
    "特别行政区",
    "自治区",
    "省",
    "市",
];

/// 学历由低到高
const EDUCATION_LEVELS: &[(&str, &[&str])] = &[
    ("高中", &["高中"]),
    ("中专", &["中专", "中职", "技校"]),
    ("大专", &["大专", "专科"]),
    ("本科", &["本科", "学士"]),
    ("硕士研究生", &["硕士"]),
    ("博士研究生", &["博士"]),
];

static_regex!(AGE_RANGE, r"(\d{2})\s*(?:周?岁)?\s*(?:-|－|—|~|～|至|到)\s*(\d{2})\s*周?岁");
static_regex!(AGE_BOUND, r"(\d{2})\s*周?岁\s*(?:\(含\)|（含）)?\s*(以上|以下|以内|及以上|及以下|上|下)?");
static_regex!(BIRTH_AFTER, r"(\d{4})\s*年.{0,10}?(?:以后|之后|后)出生");
static_regex!(YEARS, r"([0-9一二两三四五六七八九十]+)\s*年");

/// 按优先级尝试的地级与县级单位后缀
const CITY_SUFFIXES: &[&str] = &["市", "自治州", "地区", "盟", "州"];
const DISTRICT_SUFFIXES: &[&str] = &["新区", "区", "县", "旗", "市"];

/// LLM 提取的考试信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamInfo {
    pub exam_type: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub registration_start: Option<String>,
    pub registration_end: Option<String>,
    pub exam_date: Option<String>,
    pub interview_date: Option<String>,
}

/// 规范化所需的公告上下文
#[derive(Debug, Clone, Default)]
pub struct NormalizeContext {
    pub exam: ExamInfo,
    pub exam_year: Option<i32>,
}

/// 规范化单条职位
pub fn normalize(parsed: &ParsedPosition, ctx: &NormalizeContext) -> Position {
    let text = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);

    let registration_start = field_date(&parsed.registration_start, &ctx.exam.registration_start);
    let registration_end = field_date(&parsed.registration_end, &ctx.exam.registration_end);
    let exam_date = field_date(&parsed.exam_date, &ctx.exam.exam_date);
    let interview_date = field_date(&parsed.interview_date, &ctx.exam.interview_date);
    let exam_year = ctx
        .exam_year
        .or_else(|| exam_date.map(|d| d.year()))
        .or_else(|| registration_start.map(|d| d.year()));

    let (age_min, age_max) = parse_age(parsed.age.as_deref().unwrap_or_default(), exam_year);
    let (major_specific, major_unlimited) = split_majors(parsed.major.as_deref().unwrap_or_default());
    let location = parsed.work_location.as_deref().unwrap_or_default();
    let (province, city, district) = split_location(location);
    let province = province.or_else(|| ctx.exam.province.as_deref().and_then(canonical_province));
    let city = city.or_else(|| text(&ctx.exam.city));
    let (hukou_required, hukou_provinces) = parse_hukou(parsed.hukou.as_deref().unwrap_or_default());

    let notes = [&parsed.other_requirements, &parsed.notes]
        .into_iter()
        .filter_map(text)
        .collect::<Vec<_>>()
        .join("；");

    let mut position = Position {
        position_name: text(&parsed.position_name).unwrap_or_default(),
        position_code: text(&parsed.position_code),
        department_name: text(&parsed.department_name).unwrap_or_default(),
        department_code: text(&parsed.department_code),
        department_level: text(&parsed.department_level),
        work_location_province: province,
        work_location_city: city,
        work_location_district: district,
        recruit_count: parsed.recruit_count.unwrap_or(1),
        education_min: parsed.education.as_deref().and_then(canonical_education),
        major_specific,
        major_unlimited,
        political_status: parsed.political_status.as_deref().and_then(canonical_political_status),
        age_min,
        age_max,
        work_exp_years_min: parsed.work_experience.as_deref().and_then(parse_years),
        grassroots_exp_years: parsed.grassroots_experience.as_deref().and_then(parse_years),
        hukou_required,
        hukou_provinces,
        gender_required: parsed
            .gender
            .as_deref()
            .map(normalize_gender)
            .filter(|g| g != "不限"),
        fresh_graduate_only: parsed.fresh_graduate.as_deref().and_then(parse_fresh_graduate),
        exam_type: text(&parsed.exam_type).or_else(|| text(&ctx.exam.exam_type)),
        exam_year,
        registration_start,
        registration_end,
        exam_date,
        interview_date,
        status: PositionStatus::Open,
        notes: Some(notes).filter(|n| !n.is_empty()),
        confidence: parsed.confidence.clamp(0, 100),
        ..Default::default()
    };
    position.position_id = position.natural_key();
    position
}

fn field_date(own: &Option<String>, fallback: &Option<String>) -> Option<chrono::NaiveDate> {
    own.as_deref()
        .and_then(parse_date)
        .or_else(|| fallback.as_deref().and_then(parse_date))
}

/// 年龄要求 → (下限, 上限)
///
/// 未注明时取 18-35，"不限"取 18-60；只给出上限或下限时另一端取默认值。
pub fn parse_age(text: &str, exam_year: Option<i32>) -> (Option<i32>, Option<i32>) {
    let text = text.trim();
    if text.is_empty() {
        return (Some(DEFAULT_AGE.0), Some(DEFAULT_AGE.1));
    }
    if text.contains("不限") {
        return (Some(UNLIMITED_AGE.0), Some(UNLIMITED_AGE.1));
    }

    if let Some(caps) = AGE_RANGE.as_ref().and_then(|re| re.captures(text)) {
        let a: i32 = caps[1].parse().unwrap_or(DEFAULT_AGE.0);
        let b: i32 = caps[2].parse().unwrap_or(DEFAULT_AGE.1);
        return (Some(a.min(b)), Some(a.max(b)));
    }

    let mut min = None;
    let mut max = None;
    if let Some(re) = AGE_BOUND.as_ref() {
        for caps in re.captures_iter(text) {
            let Ok(value) = caps[1].parse::<i32>() else {
                continue;
            };
            match caps.get(2).map(|m| m.as_str()) {
                Some(bound) if bound.contains('上') => min = Some(value),
                _ => max = Some(value),
            }
        }
    }
    if max.is_none() {
        if let (Some(year), Some(caps)) = (exam_year, BIRTH_AFTER.as_ref().and_then(|re| re.captures(text))) {
            if let Ok(born) = caps[1].parse::<i32>() {
                max = Some(year - born);
            }
        }
    }
    if min.is_none() && max.is_none() {
        return (Some(DEFAULT_AGE.0), Some(DEFAULT_AGE.1));
    }

    let min = min.unwrap_or(DEFAULT_AGE.0);
    let max = max.unwrap_or(if min > DEFAULT_AGE.1 { UNLIMITED_AGE.1 } else { DEFAULT_AGE.1 });
    (Some(min), Some(max))
}

/// 中文数字（十以内及"十X"）或阿拉伯数字
fn parse_number(text: &str) -> Option<i32> {
    if let Ok(n) = text.parse::<i32>() {
        return Some(n);
    }
    let digit = |c: char| match c {
        '一' => Some(1),
        '二' | '两' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    };
    let chars: Vec<char> = text.chars().collect();
    match chars.as_slice() {
        [c] if *c == '十' => Some(10),
        [c] => digit(*c),
        ['十', c] => digit(*c).map(|d| 10 + d),
        [c, '十'] => digit(*c).map(|d| d * 10),
        [a, '十', b] => Some(digit(*a)? * 10 + digit(*b)?),
        _ => None,
    }
}

/// 工作经历年限；"不限"/"无"为 0
pub fn parse_years(text: &str) -> Option<i32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = YEARS.as_ref().and_then(|re| re.captures(text)) {
        return parse_number(&caps[1]);
    }
    if text.contains("不限") || text == "无" || text.contains("无要求") || text.contains("不要求") {
        return Some(0);
    }
    None
}

/// 学历要求取其中最低的规范名；"不限"返回 `None`
pub fn canonical_education(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || text.contains("不限") {
        return None;
    }
    EDUCATION_LEVELS
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|a| text.contains(a)))
        .map(|(name, _)| name.to_string())
        .or_else(|| text.contains("研究生").then(|| "硕士研究生".to_string()))
}

pub fn canonical_political_status(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || text.contains("不限") {
        return None;
    }
    let party = text.contains("党员");
    let league = text.contains("团员");
    let status = match (party, league) {
        (true, true) => "中共党员或共青团员",
        (true, false) => "中共党员",
        (false, true) => "共青团员",
        _ if text.contains("群众") => "群众",
        _ => return Some(text.to_string()),
    };
    Some(status.to_string())
}

/// 省份简称，例如 `广东省` → `广东`
pub fn canonical_province(text: &str) -> Option<String> {
    let text = text.trim();
    PROVINCES
        .iter()
        .find(|p| text.starts_with(*p))
        .map(|p| p.to_string())
}

/// 工作地点 → (省, 市, 区县)
pub fn split_location(text: &str) -> (Option<String>, Option<String>, Option<String>) {
    let text: String = text.split_whitespace().collect();
    if text.is_empty() {
        return (None, None, None);
    }

    let mut rest = text.as_str();
    let province = PROVINCES.iter().find(|p| rest.starts_with(*p)).copied();
    if let Some(p) = province {
        rest = &rest[p.len()..];
        if let Some(suffix) = PROVINCE_SUFFIXES.iter().find(|s| rest.starts_with(*s)) {
            rest = &rest[suffix.len()..];
        }
    }

    let city = if province.map(|p| MUNICIPALITIES.contains(&p)).unwrap_or(false) {
        province.map(|p| format!("{}市", p))
    } else {
        take_unit(&mut rest, CITY_SUFFIXES)
    };
    let district = take_unit(&mut rest, DISTRICT_SUFFIXES);

    (province.map(String::from), city, district)
}

/// 取出以某个后缀结尾、名称 1-8 字的前缀
fn take_unit(rest: &mut &str, suffixes: &[&str]) -> Option<String> {
    for suffix in suffixes {
        let Some(idx) = rest.find(suffix) else {
            continue;
        };
        if (1..=8).contains(&rest[..idx].chars().count()) {
            let end = idx + suffix.len();
            let value = rest[..end].to_string();
            *rest = &rest[end..];
            return Some(value);
        }
    }
    None
}

/// 户籍要求 → (是否限制, 限定省份)
pub fn parse_hukou(text: &str) -> (bool, Vec<String>) {
    let text = text.trim();
    if text.is_empty() || text.contains("不限") || text == "无" || text.contains("无要求") {
        return (false, Vec::new());
    }
    let provinces: Vec<String> = PROVINCES
        .iter()
        .filter(|p| text.contains(*p))
        .map(|p| p.to_string())
        .collect();
    let required = !provinces.is_empty()
        || ["户籍", "户口", "生源", "常住"].iter().any(|k| text.contains(k));
    (required, provinces)
}

/// 是否限应届毕业生
pub fn parse_fresh_graduate(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.contains("不限") || text.contains("非应届") || text.contains("社会人员") || text == "否" {
        return Some(false);
    }
    if text.contains("应届") || text == "是" {
        return Some(true);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_patterns_compile() {
        for re in [&AGE_RANGE, &AGE_BOUND, &BIRTH_AFTER, &YEARS] {
            assert!(re.is_some());
        }
    }

    #[test]
    fn test_parse_age() {
        assert_eq!(parse_age("", None), (Some(18), Some(35)));
        assert_eq!(parse_age("不限", None), (Some(18), Some(60)));
        assert_eq!(parse_age("18周岁以上、35周岁以下", None), (Some(18), Some(35)));
        assert_eq!(parse_age("40周岁以下", None), (Some(18), Some(40)));
        assert_eq!(parse_age("18-30周岁", None), (Some(18), Some(30)));
        assert_eq!(parse_age("40岁以上", None), (Some(40), Some(60)));
        assert_eq!(parse_age("1990年1月1日以后出生", Some(2025)), (Some(18), Some(35)));
        assert_eq!(parse_age("1995年1月1日以后出生", Some(2025)), (Some(18), Some(30)));
    }

    #[test]
    fn test_parse_years() {
        assert_eq!(parse_years("2年以上"), Some(2));
        assert_eq!(parse_years("具有两年以上基层工作经历"), Some(2));
        assert_eq!(parse_years("十二年"), Some(12));
        assert_eq!(parse_years("不限"), Some(0));
        assert_eq!(parse_years(""), None);
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_education("本科及以上").as_deref(), Some("本科"));
        assert_eq!(canonical_education("大专或本科").as_deref(), Some("大专"));
        assert_eq!(canonical_education("研究生（硕士）").as_deref(), Some("硕士研究生"));
        assert_eq!(canonical_education("博士研究生").as_deref(), Some("博士研究生"));
        assert_eq!(canonical_education("不限"), None);

        assert_eq!(canonical_political_status("中共党员").as_deref(), Some("中共党员"));
        assert_eq!(
            canonical_political_status("中共党员或共青团员").as_deref(),
            Some("中共党员或共青团员")
        );
        assert_eq!(canonical_political_status("不限"), None);
    }

    #[test]
    fn test_split_location() {
        assert_eq!(
            split_location("广东省广州市天河区"),
            (Some("广东".into()), Some("广州市".into()), Some("天河区".into()))
        );
        assert_eq!(
            split_location("北京市朝阳区"),
            (Some("北京".into()), Some("北京市".into()), Some("朝阳区".into()))
        );
        assert_eq!(
            split_location("内蒙古自治区呼和浩特市"),
            (Some("内蒙古".into()), Some("呼和浩特市".into()), None)
        );
        assert_eq!(split_location(""), (None, None, None));
    }

    #[test]
    fn test_hukou_and_fresh_graduate() {
        assert_eq!(parse_hukou("不限"), (false, vec![]));
        assert_eq!(parse_hukou("限广东户籍"), (true, vec!["广东".to_string()]));
        assert_eq!(parse_hukou("本市生源"), (true, vec![]));

        assert_eq!(parse_fresh_graduate("2025届应届毕业生"), Some(true));
        assert_eq!(parse_fresh_graduate("不限"), Some(false));
        assert_eq!(parse_fresh_graduate(""), None);
    }

    #[test]
    fn test_normalize_full_record() {
        // Given
        let parsed = ParsedPosition {
            position_name: Some(" 一级科员 ".into()),
            position_code: Some("300110001".into()),
            department_name: Some("某市税务局".into()),
            department_code: Some("130101".into()),
            work_location: Some("广东省广州市".into()),
            education: Some("本科及以上".into()),
            major: Some("法学、会计学".into()),
            age: Some("35周岁以下".into()),
            gender: Some("男".into()),
            other_requirements: Some("需值夜班".into()),
            confidence: 85,
            ..Default::default()
        };
        let ctx = NormalizeContext {
            exam: ExamInfo {
                exam_type: Some("省考".into()),
                registration_end: Some("2025年3月10日".into()),
                ..Default::default()
            },
            exam_year: Some(2025),
        };

        // When
        let position = normalize(&parsed, &ctx);

        // Then
        assert_eq!(position.position_name, "一级科员");
        assert_eq!(position.position_id, "130101:300110001:2025");
        assert_eq!(position.recruit_count, 1);
        assert_eq!(position.work_location_province.as_deref(), Some("广东"));
        assert_eq!(position.education_min.as_deref(), Some("本科"));
        assert_eq!(position.major_specific, vec!["法学", "会计学"]);
        assert_eq!((position.age_min, position.age_max), (Some(18), Some(35)));
        assert_eq!(position.gender_required.as_deref(), Some("男"));
        assert_eq!(position.exam_type.as_deref(), Some("省考"));
        assert_eq!(position.registration_end, NaiveDate::from_ymd_opt(2025, 3, 10));
        assert_eq!(position.notes.as_deref(), Some("需值夜班"));
        assert_eq!(position.confidence, 85);
        assert!(position.validate().is_ok());
    }
}
