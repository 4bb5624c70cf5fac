// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static META_CHARSET: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-zA-Z0-9_\-]+)"#).ok()
});

/// 将抓取到的 HTML 字节解码为 UTF-8 文本
///
/// 优先级：`Content-Type` 中的 charset → `<meta charset>` → chardetng 探测。
/// 政府站点大量使用 GBK/GB2312，不能假设 UTF-8。
pub fn decode_html(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type.and_then(charset_from_content_type) {
        return decode_with(body, encoding);
    }

    if let Some(encoding) = sniff_meta_charset(body) {
        return decode_with(body, encoding);
    }

    if let Ok(text) = std::str::from_utf8(body) {
        return text.to_string();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    debug!("探测到编码: {}", encoding.name());
    decode_with(body, encoding)
}

fn decode_with(body: &[u8], encoding: &'static Encoding) -> String {
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset="))
        .next()
        .and_then(|label| Encoding::for_label(label.trim_matches('"').as_bytes()))
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head_len = body.len().min(2048);
    let head = String::from_utf8_lossy(&body[..head_len]);
    let re = META_CHARSET.as_ref()?;
    re.captures(&head)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Encoding::for_label(m.as_str().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        let input = "<p>公务员招录公告</p>";
        assert_eq!(decode_html(input.as_bytes(), None), input);
    }

    #[test]
    fn test_gbk_from_content_type() {
        let (bytes, _, _) = encoding_rs::GBK.encode("招录公告");
        let text = decode_html(&bytes, Some("text/html; charset=GBK"));
        assert_eq!(text, "招录公告");
    }

    #[test]
    fn test_gbk_from_meta_tag() {
        let html = "<html><head><meta charset=\"gb2312\"></head><body>报名</body></html>";
        let (bytes, _, _) = encoding_rs::GBK.encode(html);
        let text = decode_html(&bytes, Some("text/html"));
        assert!(text.contains("报名"));
    }
}
