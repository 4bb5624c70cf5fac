// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::field_mapping::{normalize_gender, rows_to_positions};
use super::{ParseOutput, TEXT_FIELD_CONFIDENCE};
use crate::domain::models::position::ParsedPosition;

static_regex!(DEPT_LABELED, r"^(?:招录机关|部门名称|用人单位|招聘单位)\s*[：:]\s*(.+)$");
static_regex!(DEPT_SUFFIX, r"^.{2,30}(?:局|部|厅|委|办|院|署|中心)$");
static_regex!(POSITION_LABELED, r"^(?:职位名称|岗位名称)\s*[：:]\s*(.+)$");
static_regex!(POSITION_SUFFIX, r"^.{2,30}(?:岗|员|师|官)$");
static_regex!(RECRUIT_COUNT, r"(\d+)\s*人");
static_regex!(MAJOR, r"专业(?:要求)?\s*[：:]\s*(.+?)(?:[，,。；;]|$)");
static_regex!(AGE, r"(\d{2}\s*周?岁[^，,。；;]*)");
static_regex!(COLUMN_SPLIT, r"\t+|\s{2,}");

const EDUCATION_KEYWORDS: &[&str] = &["博士", "硕士", "研究生", "本科", "大专", "专科", "高中", "中专"];
const POLITICAL_KEYWORDS: &[(&str, &str)] = &[
    ("党员", "中共党员"),
    ("团员", "共青团员"),
    ("群众", "群众"),
];

/// 从纯文本中提取职位
///
/// 先把制表符或连续空格分隔的行当作表格尝试；
/// 找不到职位表时按段落规则逐行识别部门、职位与字段。
pub fn parse_text(text: &str, keywords: &[String]) -> ParseOutput {
    let rows = delimited_rows(text);
    let mut positions = rows_to_positions(&rows, keywords, TEXT_FIELD_CONFIDENCE);
    if positions.is_empty() {
        positions = paragraph_positions(text);
    }
    ParseOutput::from_positions(text.to_string(), positions, TEXT_FIELD_CONFIDENCE)
}

fn delimited_rows(text: &str) -> Vec<Vec<String>> {
    let Some(split) = COLUMN_SPLIT.as_ref() else {
        return Vec::new();
    };
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| split.split(line).map(|c| c.trim().to_string()).collect::<Vec<_>>())
        .filter(|cells| cells.len() >= 2)
        .collect()
}

fn capture(re: &Option<regex::Regex>, line: &str) -> Option<String> {
    re.as_ref()?
        .captures(line)?
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_match(re: &Option<regex::Regex>, line: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(line))
}

/// 段落规则：部门行开启新的部门上下文，职位行开启新的职位记录，
/// 其余行补充当前职位的字段
pub fn paragraph_positions(text: &str) -> Vec<ParsedPosition> {
    let mut positions = Vec::new();
    let mut department: Option<String> = None;
    let mut current: Option<ParsedPosition> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(dept) = capture(&DEPT_LABELED, line).or_else(|| {
            is_match(&DEPT_SUFFIX, line).then(|| line.to_string())
        }) {
            if let Some(done) = current.take().filter(named) {
                positions.push(done);
            }
            department = Some(dept);
            continue;
        }

        let position_name = capture(&POSITION_LABELED, line).or_else(|| {
            let political = POLITICAL_KEYWORDS.iter().any(|(k, _)| line.contains(k));
            (!political && is_match(&POSITION_SUFFIX, line)).then(|| line.to_string())
        });
        if let Some(name) = position_name {
            if let Some(done) = current.take().filter(named) {
                positions.push(done);
            }
            current = Some(ParsedPosition {
                position_name: Some(name),
                department_name: department.clone(),
                confidence: TEXT_FIELD_CONFIDENCE,
                ..Default::default()
            });
            continue;
        }

        if let Some(position) = current.as_mut() {
            fill_fields(position, line);
        }
    }

    if let Some(done) = current.filter(named) {
        positions.push(done);
    }
    positions
}

fn named(position: &ParsedPosition) -> bool {
    position
        .position_name
        .as_deref()
        .is_some_and(|n| !n.trim().is_empty())
}

fn fill_fields(position: &mut ParsedPosition, line: &str) {
    if position.education.is_none() {
        if let Some(edu) = EDUCATION_KEYWORDS.iter().find(|k| line.contains(*k)) {
            position.education = Some(edu.to_string());
        }
    }
    if position.recruit_count.is_none() {
        position.recruit_count = capture(&RECRUIT_COUNT, line).and_then(|n| n.parse().ok());
    }
    if position.major.is_none() {
        position.major = capture(&MAJOR, line);
    }
    if position.political_status.is_none() {
        position.political_status = POLITICAL_KEYWORDS
            .iter()
            .find(|(k, _)| line.contains(k))
            .map(|(_, canonical)| canonical.to_string());
    }
    if position.age.is_none() {
        position.age = capture(&AGE, line);
    }
    if position.gender.is_none() && (line.contains("限男") || line.contains("限女")) {
        position.gender = Some(normalize_gender(line));
    }
    if position.fresh_graduate.is_none() && line.contains("应届") {
        position.fresh_graduate = Some(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        ["职位", "岗位", "部门", "学历", "专业", "人数"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_all_patterns_compile() {
        for re in [
            &DEPT_LABELED,
            &DEPT_SUFFIX,
            &POSITION_LABELED,
            &POSITION_SUFFIX,
            &RECRUIT_COUNT,
            &MAJOR,
            &AGE,
            &COLUMN_SPLIT,
        ] {
            assert!(re.is_some());
        }
    }

    #[test]
    fn test_paragraph_positions() {
        let text = "\
招录机关：某市统计局
职位名称：统计员
招录 2 人，本科及以上学历
专业：统计学、应用统计学，限应届毕业生
中共党员，35周岁以下
职位名称：综合管理岗
招录1人
专业要求：不限。";

        let output = parse_text(text, &keywords());

        assert_eq!(output.positions.len(), 2);
        assert_eq!(output.confidence, 70);

        let first = &output.positions[0];
        assert_eq!(first.department_name.as_deref(), Some("某市统计局"));
        assert_eq!(first.position_name.as_deref(), Some("统计员"));
        assert_eq!(first.recruit_count, Some(2));
        assert_eq!(first.education.as_deref(), Some("本科"));
        assert_eq!(first.major.as_deref(), Some("统计学、应用统计学"));
        assert_eq!(first.political_status.as_deref(), Some("中共党员"));
        assert_eq!(first.age.as_deref(), Some("35周岁以下"));
        assert!(first.fresh_graduate.is_some());

        let second = &output.positions[1];
        assert_eq!(second.department_name.as_deref(), Some("某市统计局"));
        assert_eq!(second.major.as_deref(), Some("不限"));
    }

    #[test]
    fn test_delimited_lines_are_read_as_table() {
        let text = "职位名称\t招录机关\t招录人数\t学历\n科员\t某区财政局\t3\t本科\n";
        let output = parse_text(text, &keywords());

        assert_eq!(output.positions.len(), 1);
        assert_eq!(output.positions[0].recruit_count, Some(3));
        assert_eq!(output.positions[0].confidence, 70);
    }

    #[test]
    fn test_plain_prose_yields_nothing() {
        let output = parse_text("根据有关规定，现将面试安排公告如下。", &keywords());
        assert!(output.positions.is_empty());
        assert_eq!(output.confidence, 0);
    }
}
