// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use calamine::{open_workbook_from_rs, Data, Reader, Xls, Xlsx};
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};

use super::field_mapping::rows_to_positions;
use super::html_table::HtmlTableParser;
use super::{looks_like_html, DocumentKind, ParseError, ParseOutput, TABLE_CONFIDENCE};
use crate::utils::text_encoding::decode_html;

#[derive(Debug, Clone, Copy)]
enum Flavor {
    Xlsx,
    Xls,
    Html,
}

/// 解析 Excel 工作簿
///
/// 逐个工作表定位表头并读取职位行。很多站点把 HTML 表格另存为 `.xls`，
/// 按扩展名给出的格式打不开时依次尝试另一种二进制格式与 HTML。
pub fn parse_workbook(
    bytes: &[u8],
    kind: DocumentKind,
    keywords: &[String],
) -> Result<ParseOutput, ParseError> {
    if looks_like_html(bytes) {
        debug!("Excel 附件实为 HTML 导出");
        return Ok(HtmlTableParser::new(keywords.to_vec()).parse(&decode_html(bytes, None)));
    }

    let order = match kind {
        DocumentKind::Xls => [Flavor::Xls, Flavor::Xlsx, Flavor::Html],
        _ => [Flavor::Xlsx, Flavor::Xls, Flavor::Html],
    };

    let mut last_error = String::new();
    for flavor in order {
        let sheets = match flavor {
            Flavor::Xlsx => open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(bytes))
                .map(read_sheets)
                .map_err(|e| e.to_string()),
            Flavor::Xls => open_workbook_from_rs::<Xls<_>, _>(Cursor::new(bytes))
                .map(read_sheets)
                .map_err(|e| e.to_string()),
            Flavor::Html => {
                let html = decode_html(bytes, None);
                if !html.to_ascii_lowercase().contains("<table") {
                    continue;
                }
                return Ok(HtmlTableParser::new(keywords.to_vec()).parse(&html));
            }
        };

        match sheets {
            Ok(sheets) => return Ok(sheets_to_output(&sheets, keywords)),
            Err(e) => {
                debug!(flavor = ?flavor, "工作簿打开失败: {}", e);
                last_error = e;
            }
        }
    }

    Err(ParseError::Malformed(format!("无法识别的 Excel 文件: {}", last_error)))
}

/// 工作表名与其单元格文本
type Sheet = (String, Vec<Vec<String>>);

fn read_sheets<RS, R>(mut workbook: R) -> Vec<Sheet>
where
    RS: Read + Seek,
    R: Reader<RS>,
{
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let rows = range
                    .rows()
                    .map(|row| row.iter().map(cell_to_string).collect())
                    .collect();
                sheets.push((name, rows));
            }
            Err(e) => warn!(sheet = %name, "读取工作表失败: {:?}", e),
        }
    }
    sheets
}

fn sheets_to_output(sheets: &[Sheet], keywords: &[String]) -> ParseOutput {
    let mut text = String::new();
    let mut positions = Vec::new();
    for (name, rows) in sheets {
        let found = rows_to_positions(rows, keywords, TABLE_CONFIDENCE);
        debug!(sheet = %name, rows = rows.len(), positions = found.len(), "工作表解析完成");
        positions.extend(found);
        for row in rows {
            let line = row
                .iter()
                .filter(|c| !c.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join("\t");
            if !line.is_empty() {
                text.push_str(&line);
                text.push('\n');
            }
        }
    }
    ParseOutput::from_positions(text, positions, TABLE_CONFIDENCE)
}

/// 单元格转文本；整数值的浮点数去掉小数部分，职位代码常以数字形式存储
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}
