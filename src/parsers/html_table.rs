// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{ElementRef, Html};
use tracing::debug;

use super::field_mapping::rows_to_positions;
use super::{ParseOutput, TABLE_CONFIDENCE};
use crate::domain::models::position::ParsedPosition;

static_selector!(TABLE, "table");
static_selector!(ROW, "tr");
static_selector!(CELL, "th, td");
static_selector!(BODY, "body");

/// HTML 职位表解析器
#[derive(Debug, Clone)]
pub struct HtmlTableParser {
    keywords: Vec<String>,
}

impl HtmlTableParser {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }

    /// 解析页面中所有职位表
    pub fn parse(&self, html: &str) -> ParseOutput {
        let document = Html::parse_document(html);
        let positions = self.positions_in(&document);
        let text = document_text(&document);
        debug!(positions = positions.len(), "HTML 表格解析完成");
        ParseOutput::from_positions(text, positions, TABLE_CONFIDENCE)
    }

    fn positions_in(&self, document: &Html) -> Vec<ParsedPosition> {
        let Some(table_sel) = TABLE.as_ref() else {
            return Vec::new();
        };
        document
            .select(table_sel)
            .flat_map(|table| rows_to_positions(&table_rows(table), &self.keywords, TABLE_CONFIDENCE))
            .collect()
    }
}

/// 把表格展开成二维文本网格，合并单元格按 rowspan/colspan 复制
pub fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    let (Some(row_sel), Some(cell_sel)) = (ROW.as_ref(), CELL.as_ref()) else {
        return Vec::new();
    };

    // 每列待向下延续的 (文本, 剩余行数)
    let mut carry: Vec<Option<(String, usize)>> = Vec::new();
    let mut rows = Vec::new();

    for tr in table.select(row_sel) {
        let mut row: Vec<String> = Vec::new();
        let mut col = 0;

        for cell in tr.select(cell_sel) {
            take_carry(&mut row, &mut col, &mut carry);
            let text = cell_text(cell);
            let rowspan = span_attr(cell, "rowspan");
            let colspan = span_attr(cell, "colspan");
            for _ in 0..colspan {
                if carry.len() <= col {
                    carry.resize(col + 1, None);
                }
                if rowspan > 1 {
                    carry[col] = Some((text.clone(), rowspan - 1));
                }
                row.push(text.clone());
                col += 1;
            }
        }
        take_carry(&mut row, &mut col, &mut carry);

        if !row.is_empty() {
            rows.push(row);
        }
    }
    rows
}

fn take_carry(row: &mut Vec<String>, col: &mut usize, carry: &mut [Option<(String, usize)>]) {
    while let Some(Some((text, remaining))) = carry.get_mut(*col) {
        row.push(text.clone());
        *remaining -= 1;
        if *remaining == 0 {
            carry[*col] = None;
        }
        *col += 1;
    }
}

fn span_attr(cell: ElementRef<'_>, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(1)
        .min(100)
}

/// 单元格文本，连续空白压缩为一个空格
pub fn cell_text(cell: ElementRef<'_>) -> String {
    collapse_whitespace(&cell.text().collect::<String>())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn document_text(document: &Html) -> String {
    let root = BODY
        .as_ref()
        .and_then(|sel| document.select(sel).next())
        .unwrap_or_else(|| document.root_element());
    root.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
