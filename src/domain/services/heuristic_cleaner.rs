// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 不依赖 LLM 的正文抽取
//!
//! 标题取 `h1` / `.title` / `<title>`；正文优先取常见正文容器，
//! 否则取文本最多的块；发布日期按正则识别；附件按扩展名与链接文字识别。

use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use url::Url;

use crate::domain::models::announcement::Attachment;
use crate::utils::dates::find_date;
use crate::utils::url_utils::resolve_url;

static_selector!(H1, "h1");
static_selector!(TITLE_CLASS, ".title, .article-title, .detail-title");
static_selector!(TITLE_TAG, "title");
static_selector!(BODY, "body");
static_selector!(BLOCKS, "div, article, section, td");
static_selector!(LINKS, "a[href]");
static_selector!(SOURCE_META, "meta[name='ContentSource'], meta[name='source']");

/// 已知的正文容器，按优先级
const CONTENT_CONTAINERS: &[&str] = &[
    ".article-content",
    ".TRS_Editor",
    "#zoom",
    ".content",
    "article",
    ".detail",
    "#content",
    ".news_content",
];

const ATTACHMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".xls", ".xlsx", ".zip", ".rar"];
const ATTACHMENT_TEXTS: &[&str] = &["附件", "下载", "职位表"];

static_regex!(PUBLISH_LABEL, r"(?:发布(?:时间|日期)|发文日期|时间)\s*[：:]\s*([^\s<]{6,20})");
static_regex!(SOURCE_LABEL, r"来源\s*[：:]\s*([^\s　|]{2,30})");

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "nav", "header", "footer"];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "section", "article",
];

/// 启发式抽取结果
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicContent {
    pub title: String,
    pub content: String,
    pub publish_date: Option<NaiveDate>,
    pub source: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// 从 HTML 中抽取公告
pub fn clean(html: &str, page_url: &str) -> HeuristicContent {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let title = extract_title(&document);
    let content = extract_content(&document);
    let page_text = document.root_element().text().collect::<String>();
    let publish_date = PUBLISH_LABEL
        .as_ref()
        .and_then(|re| re.captures(&page_text))
        .and_then(|caps| find_date(&caps[1]))
        .or_else(|| find_date(&content));
    let source = extract_source(&document, &page_text);
    let attachments = base
        .as_ref()
        .map(|b| find_attachments(&document, b))
        .unwrap_or_default();

    HeuristicContent {
        title,
        content,
        publish_date,
        source,
        attachments,
    }
}

fn first_text(document: &Html, selector: &Option<scraper::Selector>) -> Option<String> {
    let selector = selector.as_ref()?;
    document
        .select(selector)
        .map(|el| squash(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn extract_title(document: &Html) -> String {
    first_text(document, &H1)
        .or_else(|| first_text(document, &TITLE_CLASS))
        .or_else(|| {
            // 页面标题常带站点名后缀
            first_text(document, &TITLE_TAG).map(|t| {
                t.split(['_', '|'])
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            })
        })
        .unwrap_or_default()
}

fn extract_source(document: &Html, page_text: &str) -> Option<String> {
    if let Some(selector) = SOURCE_META.as_ref() {
        if let Some(content) = document
            .select(selector)
            .filter_map(|m| m.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty())
        {
            return Some(content.to_string());
        }
    }
    SOURCE_LABEL
        .as_ref()
        .and_then(|re| re.captures(page_text))
        .map(|caps| caps[1].trim().to_string())
}

fn extract_content(document: &Html) -> String {
    for css in CONTENT_CONTAINERS {
        let Ok(selector) = scraper::Selector::parse(css) else {
            continue;
        };
        if let Some(text) = document
            .select(&selector)
            .map(block_text)
            .find(|t| t.chars().count() >= 50)
        {
            return text;
        }
    }

    // 取直接文本最多的块
    let largest = BLOCKS.as_ref().and_then(|selector| {
        document
            .select(selector)
            .map(|el| (own_text_len(el), el))
            .filter(|(len, _)| *len > 0)
            .max_by_key(|(len, _)| *len)
            .map(|(_, el)| block_text(el))
    });
    largest
        .filter(|t| !t.is_empty())
        .or_else(|| {
            BODY.as_ref()
                .and_then(|sel| document.select(sel).next())
                .map(block_text)
        })
        .unwrap_or_default()
}

/// 元素的直接子孙文本长度，不计入嵌套块
fn own_text_len(element: ElementRef<'_>) -> usize {
    let mut len = 0;
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            len += text.trim().chars().count();
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if matches!(name, "p" | "span" | "font" | "strong" | "b" | "br" | "a") {
                len += own_text_len(child_el);
            }
        }
    }
    len
}

/// 保留段落换行的元素文本
pub fn block_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    raw.lines()
        .map(squash)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    let is_block = BLOCK_TAGS.contains(&name);
    if is_block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            collect_text(child_el, out);
            if matches!(child_el.value().name(), "td" | "th") {
                out.push(' ');
            }
        }
    }
    if is_block {
        out.push('\n');
    }
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 识别附件链接，按 URL 去重
pub fn find_attachments(document: &Html, base: &Url) -> Vec<Attachment> {
    let Some(selector) = LINKS.as_ref() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut attachments = Vec::new();

    for link in document.select(selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        let text = squash(&link.text().collect::<String>());
        if !is_attachment_link(href, &text) {
            continue;
        }
        let Ok(url) = resolve_url(base, href) else {
            continue;
        };
        let url = url.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }
        let name = if text.is_empty() {
            url.rsplit('/').next().unwrap_or_default().to_string()
        } else {
            text
        };
        attachments.push(Attachment::new(name, url));
    }
    attachments
}

/// 链接是否指向附件
pub fn is_attachment_link(href: &str, text: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    if ATTACHMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }
    let text_lower = text.to_ascii_lowercase();
    ATTACHMENT_TEXTS.iter().any(|k| text.contains(k))
        || ATTACHMENT_EXTENSIONS.iter().any(|ext| text_lower.ends_with(ext))
}
