// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::NaiveDate;

static_regex!(
    DATE,
    r"(\d{4})\s*[-/.年]\s*(\d{1,2})\s*[-/.月]\s*(\d{1,2})\s*日?"
);
static_regex!(COMPACT_DATE, r"^(\d{4})(\d{2})(\d{2})$");

/// 在文本中查找第一个合法日期
///
/// 支持 `2025-03-01`、`2025/3/1`、`2025.03.01`、`2025年3月1日`。
pub fn find_date(text: &str) -> Option<NaiveDate> {
    let re = DATE.as_ref()?;
    re.captures_iter(text).find_map(|caps| {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let day = caps.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// 解析一个日期字段，额外接受 `20250301`
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if let Some(caps) = COMPACT_DATE.as_ref().and_then(|re| re.captures(trimmed)) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    find_date(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_formats() {
        assert!(DATE.is_some() && COMPACT_DATE.is_some());
        assert_eq!(find_date("发布时间：2025-03-01 10:00"), Some(ymd(2025, 3, 1)));
        assert_eq!(find_date("2025/3/9"), Some(ymd(2025, 3, 9)));
        assert_eq!(find_date("2025.03.09"), Some(ymd(2025, 3, 9)));
        assert_eq!(find_date("于2025年11月3日发布"), Some(ymd(2025, 11, 3)));
        assert_eq!(parse_date("20251103"), Some(ymd(2025, 11, 3)));
    }

    #[test]
    fn test_invalid_dates_are_skipped() {
        assert_eq!(find_date("2025-13-40 之后 2025-02-28"), Some(ymd(2025, 2, 28)));
        assert_eq!(find_date("无日期"), None);
        assert_eq!(parse_date(""), None);
    }
}
