// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use gwycrawl::domain::services::list_parser::{parse_list, ExtractionMethod, ListParseRequest};

fn request<'a>(html: &'a str, selector: Option<&'a str>) -> ListParseRequest<'a> {
    ListParseRequest {
        html,
        page_url: "https://example.gov/channel/100/index.html",
        selector,
        pagination_pattern: None,
        current_page: 1,
        allowed_hosts: &[],
    }
}

#[test]
fn test_configured_selector_dedupes_by_normalized_url() {
    // Given: 同一篇文章以相对和绝对两种写法出现
    let html = r#"<html><body><ul>
        <li class="item"><a href="/art/1.html">公告一</a></li>
        <li class="item"><a href="https://example.gov/art/1.html#top">公告一</a></li>
        <li class="item"><a href="../../art/2.html">公告二</a></li>
        <li class="item"><a href="https://other.gov/art/3.html">外站链接</a></li>
      </ul></body></html>"#;

    // When
    let output = parse_list(request(html, Some("li.item a")));

    // Then: 去重并丢弃外站链接
    assert_eq!(output.method, ExtractionMethod::Configured);
    let urls: Vec<&str> = output.articles.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://example.gov/art/1.html", "https://example.gov/art/2.html"]
    );
}

#[test]
fn test_fingerprint_ignores_text_changes() {
    let page = |title: &str| {
        format!(
            r#"<html><body><div class="main"><ul class="list"><li><a href="/a.html">{}</a></li></ul></div></body></html>"#,
            title
        )
    };
    let first = parse_list(request(&page("公告甲"), None));
    let second = parse_list(request(&page("公告乙"), None));
    assert_eq!(first.fingerprint, second.fingerprint);
}

#[test]
fn test_empty_page_has_no_candidates() {
    let output = parse_list(request("<html><body><p>暂无内容</p></body></html>", None));
    assert!(output.articles.is_empty());
    assert_eq!(output.method, ExtractionMethod::None);
}
