// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use lopdf::Document;
use tracing::{debug, warn};

use super::ParseError;

/// 文本层少于该字符数（不计空白）视为扫描件
const SCANNED_THRESHOLD: usize = 100;

/// 提取 PDF 文本层，单页失败只记录并跳过
pub fn extract_text(bytes: &[u8]) -> Result<String, ParseError> {
    let document =
        Document::load_mem(bytes).map_err(|e| ParseError::Malformed(format!("PDF 加载失败: {}", e)))?;

    if document.is_encrypted() {
        warn!("PDF 已加密，文本层可能不可读");
    }

    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    let mut text = String::new();
    for page in &pages {
        match document.extract_text(&[*page]) {
            Ok(page_text) => {
                text.push_str(page_text.trim_end());
                text.push('\n');
            }
            Err(e) => warn!(page = page, "PDF 页面文本提取失败: {}", e),
        }
    }

    debug!(pages = pages.len(), chars = text.chars().count(), "PDF 文本层提取完成");
    Ok(text)
}

/// 文本层是否过少，需要走 OCR
pub fn is_scanned(text: &str) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() < SCANNED_THRESHOLD
}
