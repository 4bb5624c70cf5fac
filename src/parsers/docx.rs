// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::{Cursor, Read};
use tracing::{debug, warn};

use super::field_mapping::rows_to_positions;
use super::{text_fields, ParseError, ParseOutput, TABLE_CONFIDENCE};

const DOCUMENT_XML: &str = "word/document.xml";

static_regex!(W_TEXT, r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>");
static_regex!(W_PARAGRAPH_END, r"</w:p>");
static_regex!(W_TABLE, r"(?s)<w:tbl>(.*?)</w:tbl>");
static_regex!(W_ROW, r"(?s)<w:tr[ >].*?</w:tr>");
static_regex!(W_CELL, r"(?s)<w:tc[ >].*?</w:tc>");

/// Word 文档内容：段落文本与表格
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DocxContent {
    pub text: String,
    /// 表 → 行 → 单元格
    pub tables: Vec<Vec<Vec<String>>>,
}

/// 解析 .docx：表格优先，没有职位表时退回段落字段提取
pub fn parse_docx(bytes: &[u8], keywords: &[String]) -> Result<ParseOutput, ParseError> {
    let content = extract_docx(bytes)?;
    let positions: Vec<_> = content
        .tables
        .iter()
        .flat_map(|table| rows_to_positions(table, keywords, TABLE_CONFIDENCE))
        .collect();
    debug!(
        tables = content.tables.len(),
        positions = positions.len(),
        "Word 文档解析完成"
    );
    if positions.is_empty() {
        return Ok(text_fields::parse_text(&content.text, keywords));
    }
    Ok(ParseOutput::from_positions(content.text, positions, TABLE_CONFIDENCE))
}

/// 读取 zip 容器中的 `word/document.xml` 并抽取段落与表格
///
/// XML 结构损坏时退回正则收集 `<w:t>` 文本。
pub fn extract_docx(bytes: &[u8]) -> Result<DocxContent, ParseError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ParseError::Malformed(format!("无法打开 docx 容器: {}", e)))?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .map_err(|_| ParseError::Malformed("docx 中缺少 document.xml".to_string()))?
        .read_to_string(&mut xml)?;

    match walk_document_xml(&xml) {
        Ok(content) => Ok(content),
        Err(e) => {
            warn!("document.xml 解析失败，改用正则提取: {}", e);
            Ok(harvest_with_regex(&xml))
        }
    }
}

#[derive(Default)]
struct TableBuilder {
    rows: Vec<Vec<String>>,
    row: Option<Vec<String>>,
    cell: Option<String>,
}

fn walk_document_xml(xml: &str) -> Result<DocxContent, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut content = DocxContent::default();
    let mut paragraph = String::new();
    // 嵌套表格时只取最外层
    let mut tables: Vec<TableBuilder> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:tbl" => tables.push(TableBuilder::default()),
                b"w:tr" => {
                    if let Some(table) = tables.last_mut() {
                        table.row = Some(Vec::new());
                    }
                }
                b"w:tc" => {
                    if let Some(table) = tables.last_mut() {
                        table.cell = Some(String::new());
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => paragraph.push('\t'),
                b"w:br" | b"w:cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) => {
                if in_text {
                    let text = t.unescape()?;
                    paragraph.push_str(&text);
                    if let Some(cell) = tables.last_mut().and_then(|t| t.cell.as_mut()) {
                        cell.push_str(&text);
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let line = paragraph.trim();
                    if !line.is_empty() {
                        content.text.push_str(line);
                        content.text.push('\n');
                    }
                    if let Some(cell) = tables.last_mut().and_then(|t| t.cell.as_mut()) {
                        if !cell.is_empty() && !cell.ends_with(' ') {
                            cell.push(' ');
                        }
                    }
                    paragraph.clear();
                }
                b"w:tc" => {
                    if let Some(table) = tables.last_mut() {
                        let cell = table.cell.take().unwrap_or_default();
                        if let Some(row) = table.row.as_mut() {
                            row.push(cell.trim().to_string());
                        }
                    }
                }
                b"w:tr" => {
                    if let Some(table) = tables.last_mut() {
                        if let Some(row) = table.row.take() {
                            table.rows.push(row);
                        }
                    }
                }
                b"w:tbl" => {
                    if let Some(table) = tables.pop() {
                        if tables.is_empty() && !table.rows.is_empty() {
                            content.tables.push(table.rows);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(content)
}

/// 正则兜底：逐段收集 `<w:t>` 文本，并按 `<w:tbl>/<w:tr>/<w:tc>` 切出表格
fn harvest_with_regex(xml: &str) -> DocxContent {
    let mut content = DocxContent::default();
    let (Some(text_re), Some(para_re)) = (W_TEXT.as_ref(), W_PARAGRAPH_END.as_ref()) else {
        return content;
    };

    for paragraph in para_re.split(xml) {
        let line: String = text_re
            .captures_iter(paragraph)
            .filter_map(|c| c.get(1))
            .map(|m| html_escape::decode_html_entities(m.as_str()).into_owned())
            .collect();
        let line = line.trim();
        if !line.is_empty() {
            content.text.push_str(line);
            content.text.push('\n');
        }
    }

    if let (Some(table_re), Some(row_re), Some(cell_re)) =
        (W_TABLE.as_ref(), W_ROW.as_ref(), W_CELL.as_ref())
    {
        for table in table_re.captures_iter(xml).filter_map(|c| c.get(1)) {
            let rows: Vec<Vec<String>> = row_re
                .find_iter(table.as_str())
                .map(|row| {
                    cell_re
                        .find_iter(row.as_str())
                        .map(|cell| {
                            text_re
                                .captures_iter(cell.as_str())
                                .filter_map(|c| c.get(1))
                                .map(|m| html_escape::decode_html_entities(m.as_str()).into_owned())
                                .collect::<String>()
                                .trim()
                                .to_string()
                        })
                        .collect()
                })
                .filter(|row: &Vec<String>| !row.is_empty())
                .collect();
            if !rows.is_empty() {
                content.tables.push(rows);
            }
        }
    }
    content
}

/// 解析旧版 .doc
///
/// 不解析 OLE 复合文档结构，直接从字节流中收集 UTF-16LE 文本片段；
/// 单元格结束符 0x07 转为制表符，使表格行仍可按分隔文本识别。
pub fn parse_legacy_doc(bytes: &[u8], keywords: &[String]) -> Result<ParseOutput, ParseError> {
    let text = legacy_doc_text(bytes);
    if text.trim().is_empty() {
        return Err(ParseError::Malformed("未能从 .doc 中提取文本".to_string()));
    }
    Ok(text_fields::parse_text(&text, keywords))
}

const MIN_RUN_CHARS: usize = 4;

fn flush_run(run: &mut String, has_cjk: &mut bool, chars: &mut usize, out: &mut String) {
    if *has_cjk && *chars >= MIN_RUN_CHARS {
        out.push_str(run.trim_matches('\t'));
        out.push('\n');
    }
    run.clear();
    *has_cjk = false;
    *chars = 0;
}

pub fn legacy_doc_text(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut run = String::new();
    let mut run_has_cjk = false;
    let mut run_chars = 0usize;

    for pair in bytes.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        let ch = match unit {
            0x0007 => Some('\t'),
            0x000D => None,
            0x0020..=0x007E => char::from_u32(unit as u32),
            0x3000..=0x303F | 0x4E00..=0x9FFF | 0xFF00..=0xFFEF => {
                run_has_cjk |= (0x4E00..=0x9FFF).contains(&unit);
                char::from_u32(unit as u32)
            }
            _ => None,
        };
        match ch {
            Some(c) => {
                run.push(c);
                run_chars += 1;
            }
            None => flush_run(&mut run, &mut run_has_cjk, &mut run_chars, &mut out),
        }
    }
    flush_run(&mut run, &mut run_has_cjk, &mut run_chars, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_docx(document_xml: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file(DOCUMENT_XML, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    fn default_keywords() -> Vec<String> {
        ["职位", "岗位", "部门", "学历", "专业", "人数"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn cell(text: &str) -> String {
        format!("<w:tc><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:tc>", text)
    }

    fn table_xml() -> String {
        let header: String = ["职位名称", "用人单位", "招录人数", "学历", "专业"]
            .iter()
            .map(|t| cell(t))
            .collect();
        let row: String = ["科员", "某市财政局", "2", "本科", "会计学、财务管理"]
            .iter()
            .map(|t| cell(t))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>附件：职位表</w:t></w:r></w:p>
<w:tbl><w:tr>{}</w:tr><w:tr>{}</w:tr></w:tbl>
</w:body></w:document>"#,
            header, row
        )
    }

    #[test]
    fn test_docx_table_positions() {
        let bytes = build_docx(&table_xml());
        let output = parse_docx(&bytes, &default_keywords()).unwrap();

        assert_eq!(output.positions.len(), 1);
        assert_eq!(output.confidence, 85);
        let position = &output.positions[0];
        assert_eq!(position.department_name.as_deref(), Some("某市财政局"));
        assert_eq!(position.major.as_deref(), Some("会计学、财务管理"));
        assert!(output.text.contains("附件：职位表"));
    }

    #[test]
    fn test_malformed_xml_falls_back_to_regex() {
        // 结束标签不匹配
        let xml = table_xml().replace("</w:body>", "</w:bodyx>");
        let content = extract_docx(&build_docx(&xml)).unwrap();

        assert!(content.text.contains("附件：职位表"));
        assert_eq!(content.tables.len(), 1);
        assert_eq!(content.tables[0][1][0], "科员");
    }

    #[test]
    fn test_missing_document_xml() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("word/other.xml", SimpleFileOptions::default())
                .unwrap();
            writer.finish().unwrap();
        }
        let result = extract_docx(&buffer.into_inner());
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_legacy_doc_utf16_runs() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0x00, 0x00];
        for unit in "招录机关：某市统计局\r职位名称：统计员\r".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&[0x01, 0x02]);

        let text = legacy_doc_text(&bytes);
        assert!(text.contains("招录机关：某市统计局"));
        assert!(text.contains("职位名称：统计员"));
    }
}
