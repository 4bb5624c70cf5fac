// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! LLM 输出的 JSON 定位与修复
//!
//! 流程：定位 JSON 块 → 修复常见问题 → 反序列化。
//! [`repair`] 幂等，合法 JSON 原样返回。

use serde::de::DeserializeOwned;

static_regex!(FENCED, r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```");

/// 定位回复中的 JSON 文本
///
/// 优先取围栏代码块中的内容；否则取第一个括号配平的 `{...}`；
/// 都找不到时返回去掉首尾空白的原文。
pub fn extract_json(raw: &str) -> &str {
    let raw = raw.trim_start_matches('\u{feff}').trim();

    if let Some(inner) = FENCED
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
    {
        let inner = inner.as_str().trim();
        if !inner.is_empty() {
            return balanced_object(inner).unwrap_or(inner);
        }
    }

    balanced_object(raw).unwrap_or(raw)
}

/// 第一个配平的 `{...}`，忽略字符串内的括号
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 修复常见问题：去掉 `}` 或 `]` 之前的多余逗号
pub fn repair(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in json.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => in_string = true,
            '}' | ']' => drop_trailing_commas(&mut out),
            _ => {}
        }
        out.push(ch);
    }
    out
}

/// 反复删除输出末尾（跳过空白）的逗号
fn drop_trailing_commas(out: &mut String) {
    loop {
        let trimmed = out.trim_end();
        if !trimmed.ends_with(',') {
            return;
        }
        let comma = trimmed.len() - 1;
        out.truncate(comma);
    }
}

/// 定位、修复并反序列化
pub fn parse_llm_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let candidate = extract_json(raw);
    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(&repair(candidate)),
    }
}
