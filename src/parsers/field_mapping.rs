// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::position::ParsedPosition;

static_regex!(FIRST_NUMBER, r"\d+");

/// 职位表的规范字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    DepartmentName,
    DepartmentCode,
    DepartmentLevel,
    PositionName,
    PositionCode,
    RecruitCount,
    Education,
    Degree,
    Major,
    PoliticalStatus,
    Age,
    WorkExperience,
    GrassrootsExperience,
    Hukou,
    Gender,
    WorkLocation,
    FreshGraduate,
    ExamType,
    OtherRequirements,
    Notes,
}

/// 表头同义词表
///
/// 精确匹配优先；包含匹配时取最长的同义词，避免"用人单位代码"落到"用人单位"上。
const SYNONYMS: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::DepartmentName,
        &["招录机关", "部门名称", "用人单位", "招录单位", "招考单位", "单位名称", "用人部门", "招聘单位"],
    ),
    (
        CanonicalField::DepartmentCode,
        &["部门代码", "单位代码", "机关代码", "招录机关代码", "用人单位代码"],
    ),
    (CanonicalField::DepartmentLevel, &["机构层级", "单位层级", "部门层级", "单位级别"]),
    (
        CanonicalField::PositionName,
        &["职位名称", "岗位名称", "招考职位", "招录职位", "职位", "岗位"],
    ),
    (CanonicalField::PositionCode, &["职位代码", "岗位代码", "职位编码", "岗位编码", "职位编号"]),
    (
        CanonicalField::RecruitCount,
        &["招录人数", "计划人数", "录用人数", "招考人数", "招聘人数", "人数"],
    ),
    (CanonicalField::Education, &["学历", "学历要求", "最低学历"]),
    (CanonicalField::Degree, &["学位", "学位要求"]),
    (CanonicalField::Major, &["专业", "专业要求", "所学专业", "专业名称"]),
    (CanonicalField::PoliticalStatus, &["政治面貌"]),
    (CanonicalField::Age, &["年龄", "年龄要求"]),
    (CanonicalField::WorkExperience, &["工作经历", "工作年限", "工作经验"]),
    (CanonicalField::GrassrootsExperience, &["基层工作最低年限", "基层工作经历", "服务基层项目工作经历"]),
    (CanonicalField::Hukou, &["户籍", "户籍要求", "生源地"]),
    (CanonicalField::Gender, &["性别", "性别要求"]),
    (CanonicalField::WorkLocation, &["工作地点", "落户地点", "工作地区"]),
    (CanonicalField::FreshGraduate, &["是否限应届", "应届毕业生", "应届"]),
    (CanonicalField::ExamType, &["考试类别", "考试类型"]),
    (CanonicalField::OtherRequirements, &["其他条件", "其他要求", "其它条件"]),
    (CanonicalField::Notes, &["备注"]),
];

const FUZZY_THRESHOLD: f64 = 0.75;

fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '*' | '＊' | ':' | '：'))
        .collect()
}

/// 将表头映射到规范字段
///
/// 依次尝试精确匹配、双向包含匹配、编辑距离相似度。
pub fn map_header(header: &str) -> Option<CanonicalField> {
    match_header(header).map(|(field, _)| field)
}

/// 返回匹配字段以及是否为精确匹配
fn match_header(header: &str) -> Option<(CanonicalField, bool)> {
    let header = normalize_header(header);
    if header.is_empty() {
        return None;
    }

    for (field, names) in SYNONYMS {
        if names.iter().any(|n| *n == header) {
            return Some((*field, true));
        }
    }

    let mut best: Option<(CanonicalField, usize)> = None;
    for (field, names) in SYNONYMS {
        for name in names.iter() {
            if header.contains(name) || name.contains(header.as_str()) {
                let len = name.chars().count();
                if best.map_or(true, |(_, l)| len > l) {
                    best = Some((*field, len));
                }
            }
        }
    }
    if let Some((field, _)) = best {
        return Some((field, false));
    }

    let mut fuzzy: Option<(CanonicalField, f64)> = None;
    for (field, names) in SYNONYMS {
        for name in names.iter() {
            let score = strsim::normalized_levenshtein(&header, name);
            if score >= FUZZY_THRESHOLD && fuzzy.map_or(true, |(_, s)| score > s) {
                fuzzy = Some((*field, score));
            }
        }
    }
    fuzzy.map(|(field, _)| (field, false))
}

/// 表头文本命中关键词数量是否达到 3 个
pub fn is_header_row(cells: &[String], keywords: &[String]) -> bool {
    let text = cells.join(" ");
    keywords.iter().filter(|k| text.contains(k.as_str())).count() >= 3
}

/// 取文本中的第一个整数
pub fn extract_number(text: &str) -> Option<i32> {
    FIRST_NUMBER
        .as_ref()?
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

/// 拆分专业列表
///
/// # 返回值
///
/// (专业列表, 是否不限专业)
pub fn split_majors(text: &str) -> (Vec<String>, bool) {
    let text = text.trim();
    if text.is_empty() || text.contains("不限") || text.contains("无限制") {
        return (Vec::new(), !text.is_empty());
    }
    let mut majors: Vec<String> = Vec::new();
    for part in text.split(['、', ',', ';', '/', '，', '；']) {
        let part = part.trim();
        if !part.is_empty() && !majors.iter().any(|m| m == part) {
            majors.push(part.to_string());
        }
    }
    (majors, false)
}

/// 规范化性别要求：仅男 / 仅女 / 不限
pub fn normalize_gender(text: &str) -> String {
    let male = text.contains('男');
    let female = text.contains('女');
    match (male, female) {
        (true, false) => "男".to_string(),
        (false, true) => "女".to_string(),
        _ => "不限".to_string(),
    }
}

/// 一张表的表头映射
#[derive(Debug, Clone)]
pub struct HeaderMap {
    columns: Vec<Option<CanonicalField>>,
}

impl HeaderMap {
    /// 同一字段出现在多列时保留精确匹配的列，否则保留最左的列
    pub fn new(headers: &[String]) -> Self {
        let matched: Vec<Option<(CanonicalField, bool)>> =
            headers.iter().map(|h| match_header(h)).collect();
        let columns = matched
            .iter()
            .enumerate()
            .map(|(idx, m)| {
                let (field, exact) = (*m)?;
                let shadowed = matched.iter().enumerate().any(|(other, o)| {
                    other != idx
                        && matches!(o, Some((f, e)) if *f == field
                            && (*e && !exact || *e == exact && other < idx))
                });
                (!shadowed).then_some(field)
            })
            .collect();
        Self { columns }
    }

    /// 识别出的列数
    pub fn mapped(&self) -> usize {
        self.columns.iter().filter(|c| c.is_some()).count()
    }

    /// 按表头映射把一行单元格转为原始职位记录
    ///
    /// 没有职位名称的行返回 `None`。
    pub fn row_to_position(&self, cells: &[String], confidence: i32) -> Option<ParsedPosition> {
        let mut position = ParsedPosition {
            confidence,
            ..Default::default()
        };
        for (field, cell) in self.columns.iter().zip(cells) {
            let Some(field) = field else { continue };
            let value = cell.trim();
            if value.is_empty() {
                continue;
            }
            assign(&mut position, *field, value);
        }

        let named = position
            .position_name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty());
        (position.has_data() && named).then_some(position)
    }
}

fn assign(position: &mut ParsedPosition, field: CanonicalField, value: &str) {
    let text = Some(value.to_string());
    match field {
        CanonicalField::DepartmentName => position.department_name = text,
        CanonicalField::DepartmentCode => position.department_code = text,
        CanonicalField::DepartmentLevel => position.department_level = text,
        CanonicalField::PositionName => position.position_name = text,
        CanonicalField::PositionCode => position.position_code = text,
        CanonicalField::RecruitCount => position.recruit_count = extract_number(value),
        CanonicalField::Education => position.education = text,
        CanonicalField::Degree => position.degree = text,
        CanonicalField::Major => position.major = text,
        CanonicalField::PoliticalStatus => position.political_status = text,
        CanonicalField::Age => position.age = text,
        CanonicalField::WorkExperience => position.work_experience = text,
        CanonicalField::GrassrootsExperience => position.grassroots_experience = text,
        CanonicalField::Hukou => position.hukou = text,
        CanonicalField::Gender => position.gender = Some(normalize_gender(value)),
        CanonicalField::WorkLocation => position.work_location = text,
        CanonicalField::FreshGraduate => position.fresh_graduate = text,
        CanonicalField::ExamType => position.exam_type = text,
        CanonicalField::OtherRequirements => position.other_requirements = text,
        CanonicalField::Notes => position.notes = text,
    }
}

/// 在一组行中定位表头并解析其后的数据行
///
/// 表头只在前 10 行内查找，表格标题行与合并说明行会被跳过。
pub fn rows_to_positions(
    rows: &[Vec<String>],
    keywords: &[String],
    confidence: i32,
) -> Vec<ParsedPosition> {
    let Some(header_idx) = rows
        .iter()
        .take(10)
        .position(|row| is_header_row(row, keywords))
    else {
        return Vec::new();
    };

    let headers = HeaderMap::new(&rows[header_idx]);
    rows[header_idx + 1..]
        .iter()
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .filter_map(|row| headers.row_to_position(row, confidence))
        .collect()
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

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_and_partial_header_mapping() {
        assert_eq!(map_header("职位名称"), Some(CanonicalField::PositionName));
        assert_eq!(map_header(" 招录机关 "), Some(CanonicalField::DepartmentName));
        assert_eq!(map_header("用人单位代码"), Some(CanonicalField::DepartmentCode));
        assert_eq!(map_header("招录\n人数"), Some(CanonicalField::RecruitCount));
        assert_eq!(map_header("学历（学位）"), Some(CanonicalField::Education));
        assert_eq!(map_header("*备注"), Some(CanonicalField::Notes));
        assert_eq!(map_header("序号"), None);
    }

    #[test]
    fn test_duplicate_columns_prefer_exact_match() {
        let headers = HeaderMap::new(&row(&["职位类别", "职位名称", "人数"]));
        let position = headers
            .row_to_position(&row(&["A类", "科员", "1"]), 85)
            .unwrap();
        assert_eq!(position.position_name.as_deref(), Some("科员"));
        assert_eq!(headers.mapped(), 2);
    }

    #[test]
    fn test_header_row_needs_three_keywords() {
        assert!(is_header_row(&row(&["职位名称", "招录机关", "人数", "学历"]), &keywords()));
        assert!(!is_header_row(&row(&["序号", "职位名称", "备注"]), &keywords()));
    }

    #[test]
    fn test_cell_normalizers() {
        assert_eq!(extract_number("共 3 人"), Some(3));
        assert_eq!(extract_number("若干"), None);

        let (majors, unlimited) = split_majors("法学、经济学,会计学；法学");
        assert_eq!(majors, vec!["法学", "经济学", "会计学"]);
        assert!(!unlimited);
        assert_eq!(split_majors("专业不限"), (vec![], true));

        assert_eq!(normalize_gender("限男性"), "男");
        assert_eq!(normalize_gender("女"), "女");
        assert_eq!(normalize_gender("男女不限"), "不限");
        assert_eq!(normalize_gender(""), "不限");
    }

    #[test]
    fn test_rows_to_positions_skips_title_and_unnamed_rows() {
        let rows = vec![
            row(&["2025年度考试录用公务员职位表"]),
            row(&["职位名称", "招录机关", "人数", "学历", "性别"]),
            row(&["科员", "某市税务局", "2", "本科", "限男性"]),
            row(&["", "某市税务局", "1", "本科", ""]),
            row(&["", "", "", "", ""]),
            row(&["办事员", "某县人社局", "1人", "大专", ""]),
        ];
        let positions = rows_to_positions(&rows, &keywords(), 85);

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].position_name.as_deref(), Some("科员"));
        assert_eq!(positions[0].recruit_count, Some(2));
        assert_eq!(positions[0].gender.as_deref(), Some("男"));
        assert_eq!(positions[0].confidence, 85);
        assert_eq!(positions[1].recruit_count, Some(1));
    }

    #[test]
    fn test_no_header_no_positions() {
        let rows = vec![row(&["a", "b"]), row(&["c", "d"])];
        assert!(rows_to_positions(&rows, &keywords(), 85).is_empty());
    }
}
