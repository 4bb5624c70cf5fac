// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 列表页解析
//!
//! 纯函数：输入 HTML 与列表页配置，输出文章候选、下一页 URL 与 DOM 指纹。

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::domain::models::article::ArticleCandidate;
use crate::utils::dates::find_date;
use crate::utils::url_utils::{host_of, is_allowed_host, normalize_url, resolve_url, sha256_hex};

/// 常见频道的文章选择器，先于启发式尝试
pub const KNOWN_SELECTORS: &[&str] = &[".list-item a", ".news-list a", ".article-list a", "ul.list li a"];

/// `auto` 翻页时识别的下一页链接文字
const NEXT_TEXTS: &[&str] = &["下一页", "下页", "Next", "next", "»", "›"];

const MIN_TITLE_CHARS: usize = 8;
const MAX_TITLE_CHARS: usize = 80;

static_selector!(BODY, "body");
static_selector!(LINK, "a[href]");
static_selector!(ROWS, "li, tr");

/// 文章链接的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// 列表页配置的选择器
    Configured,
    Known,
    Heuristic,
    /// 没有找到任何候选
    None,
}

/// 一次解析的输入
#[derive(Debug, Clone, Copy)]
pub struct ListParseRequest<'a> {
    pub html: &'a str,
    /// 页面最终 URL，既是相对链接的基准也决定频道主机
    pub page_url: &'a str,
    pub selector: Option<&'a str>,
    pub pagination_pattern: Option<&'a str>,
    /// 当前页码，从 1 开始
    pub current_page: u32,
    pub allowed_hosts: &'a [String],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListParseOutput {
    /// 按页面顺序，已去重
    pub articles: Vec<ArticleCandidate>,
    pub next_page: Option<String>,
    pub fingerprint: String,
    pub method: ExtractionMethod,
}

/// 解析列表页
pub fn parse_list(request: ListParseRequest<'_>) -> ListParseOutput {
    let document = Html::parse_document(request.html);
    let fingerprint = dom_fingerprint(&document);

    let Ok(base) = Url::parse(request.page_url) else {
        return ListParseOutput {
            articles: Vec::new(),
            next_page: None,
            fingerprint,
            method: ExtractionMethod::None,
        };
    };
    let channel_host = base.host_str().unwrap_or_default().to_ascii_lowercase();
    let filter = LinkFilter {
        base: &base,
        channel_host: &channel_host,
        allowed_hosts: request.allowed_hosts,
    };

    let (anchors, method) = match request.selector.map(str::trim).filter(|s| !s.is_empty()) {
        Some(css) => (select_anchors(&document, css), ExtractionMethod::Configured),
        None => KNOWN_SELECTORS
            .iter()
            .map(|css| select_anchors(&document, css))
            .find(|anchors| !filter.collect(anchors).is_empty())
            .map(|anchors| (anchors, ExtractionMethod::Known))
            .unwrap_or_else(|| (heuristic_anchors(&document), ExtractionMethod::Heuristic)),
    };

    let articles = filter.collect(&anchors);
    let method = if articles.is_empty() {
        ExtractionMethod::None
    } else {
        method
    };
    let next_page = next_page_url(&document, &base, request.pagination_pattern, request.current_page);

    ListParseOutput {
        articles,
        next_page,
        fingerprint,
        method,
    }
}

struct LinkFilter<'a> {
    base: &'a Url,
    channel_host: &'a str,
    allowed_hosts: &'a [String],
}

impl LinkFilter<'_> {
    /// 解析 URL、过滤站外链接并按规范化 URL 去重
    fn collect(&self, anchors: &[ElementRef<'_>]) -> Vec<ArticleCandidate> {
        let mut seen = HashSet::new();
        let mut articles = Vec::new();
        for anchor in anchors {
            let Some(href) = anchor.value().attr("href").map(str::trim) else {
                continue;
            };
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }
            let Some(url) = resolve_url(self.base, href)
                .ok()
                .and_then(|u| normalize_url(u.as_str()))
            else {
                continue;
            };
            let Some(host) = host_of(&url) else {
                continue;
            };
            if !is_allowed_host(&host, self.channel_host, self.allowed_hosts) {
                continue;
            }
            if !seen.insert(url.clone()) {
                continue;
            }

            let title = anchor
                .value()
                .attr("title")
                .map(squash)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| squash(&anchor.text().collect::<String>()));
            let mut candidate = ArticleCandidate::new(url, title);
            candidate.published_hint = date_hint(*anchor);
            articles.push(candidate);
        }
        articles
    }
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 选择器命中的元素若不是链接，取其中第一个链接
fn select_anchors<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    let Ok(selector) = Selector::parse(css) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| {
            if el.value().name() == "a" {
                Some(el)
            } else {
                LINK.as_ref().and_then(|link| el.select(link).next())
            }
        })
        .collect()
}

/// 重复出现的 `<li>`/`<tr>` 中文字长度 8-80 的链接
fn heuristic_anchors(document: &Html) -> Vec<ElementRef<'_>> {
    let (Some(rows), Some(link)) = (ROWS.as_ref(), LINK.as_ref()) else {
        return Vec::new();
    };
    let mut anchors = Vec::new();
    for row in document.select(rows) {
        if !is_repeating(row) {
            continue;
        }
        for anchor in row.select(link) {
            let len = squash(&anchor.text().collect::<String>()).chars().count();
            if (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) {
                anchors.push(anchor);
            }
        }
    }
    anchors
}

/// 父元素下至少有两个同名兄弟
fn is_repeating(row: ElementRef<'_>) -> bool {
    let name = row.value().name();
    row.parent()
        .map(|parent| {
            parent
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|sibling| sibling.value().name() == name)
                .take(2)
                .count()
                >= 2
        })
        .unwrap_or(false)
}

/// 链接所在行中的日期，格式化为 `YYYY-MM-DD`
fn date_hint(anchor: ElementRef<'_>) -> Option<String> {
    let row = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(3)
        .find(|el| matches!(el.value().name(), "li" | "tr" | "dd" | "p"))
        .or_else(|| anchor.parent().and_then(ElementRef::wrap))?;
    find_date(&row.text().collect::<String>()).map(|d| d.format("%Y-%m-%d").to_string())
}

/// 下一页 URL
///
/// `pagination_pattern` 含 `{page}` 时按模板生成；为 `auto` 时按链接文字识别；
/// 其余视为下一页链接的 CSS 选择器。
fn next_page_url(
    document: &Html,
    base: &Url,
    pattern: Option<&str>,
    current_page: u32,
) -> Option<String> {
    let pattern = pattern.map(str::trim).filter(|p| !p.is_empty())?;

    let href = if pattern.contains("{page}") {
        pattern.replace("{page}", &(current_page.max(1) + 1).to_string())
    } else if pattern.eq_ignore_ascii_case("auto") {
        let link = LINK.as_ref()?;
        document
            .select(link)
            .find(|a| {
                let text = squash(&a.text().collect::<String>());
                NEXT_TEXTS.iter().any(|next| text == *next)
            })?
            .value()
            .attr("href")?
            .to_string()
    } else {
        let selector = Selector::parse(pattern).ok()?;
        let el = document.select(&selector).next()?;
        let anchor = if el.value().name() == "a" {
            el
        } else {
            el.select(LINK.as_ref()?).next()?
        };
        anchor.value().attr("href")?.to_string()
    };

    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let next = resolve_url(base, href).ok()?;
    (next != *base).then(|| next.to_string())
}

fn element_signature(element: ElementRef<'_>) -> String {
    let mut classes: Vec<&str> = element.value().classes().collect();
    classes.sort_unstable();
    let mut signature = element.value().name().to_string();
    for class in classes {
        signature.push('.');
        signature.push_str(class);
    }
    signature
}

/// 浅层 DOM 指纹：`<body>` 下前两层元素的标签与类名路径
pub fn dom_fingerprint(document: &Html) -> String {
    let mut parts = Vec::new();
    if let Some(body) = BODY.as_ref().and_then(|sel| document.select(sel).next()) {
        for child in body.children().filter_map(ElementRef::wrap) {
            let inner: Vec<String> = child
                .children()
                .filter_map(ElementRef::wrap)
                .map(element_signature)
                .collect();
            parts.push(format!("{}>{}", element_signature(child), inner.join(",")));
        }
    }
    sha256_hex(parts.join("|"))
}

/// 供 LLM 判断用的简化页面结构：标签、类名与少量文字
pub fn page_skeleton(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    if let Some(body) = BODY.as_ref().and_then(|sel| document.select(sel).next()) {
        write_skeleton(body, 0, &mut out, max_chars);
    }
    out
}

fn write_skeleton(element: ElementRef<'_>, depth: usize, out: &mut String, max_chars: usize) {
    if out.len() >= max_chars || depth > 12 {
        return;
    }
    let name = element.value().name();
    if matches!(name, "script" | "style" | "noscript" | "svg" | "iframe") {
        return;
    }
    let own_text: String = element
        .children()
        .filter_map(|c| c.value().as_text().map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let own_text: String = own_text.chars().take(40).collect();

    out.push_str(&"  ".repeat(depth));
    out.push('<');
    out.push_str(&element_signature(element));
    if let Some(href) = element.value().attr("href") {
        out.push_str(" href=");
        out.push_str(&href.chars().take(80).collect::<String>());
    }
    out.push('>');
    out.push_str(&own_text);
    out.push('\n');

    for child in element.children().filter_map(ElementRef::wrap) {
        write_skeleton(child, depth + 1, out, max_chars);
    }
}
