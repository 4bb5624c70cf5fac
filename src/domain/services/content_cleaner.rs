// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::heuristic_cleaner::{self, HeuristicContent};
use super::llm_service::{truncate_chars, LlmError, LlmService};
use super::prompts::PromptKind;
use crate::domain::models::announcement::Attachment;
use crate::utils::dates::parse_date;
use crate::utils::errors::PipelineError;
use crate::utils::url_utils::resolve_url;

static_regex!(NOISE_BLOCKS, r"(?is)<(script|style|noscript|svg)\b.*?</(script|style|noscript|svg)>");
static_regex!(COMMENTS, r"(?s)<!--.*?-->");

#[derive(Debug, Deserialize)]
struct LlmAttachment {
    #[serde(default)]
    name: String,
    url: String,
}

/// 清洗提示词约定的输出
#[derive(Debug, Deserialize)]
struct LlmCleaned {
    title: String,
    content: String,
    #[serde(default)]
    publish_date: Option<String>,
    #[serde(default)]
    source: Option<String>,
    attachments: Vec<LlmAttachment>,
    confidence: i32,
}

/// 清洗后的公告内容
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedContent {
    pub title: String,
    pub content: String,
    pub publish_date: Option<NaiveDate>,
    pub source: Option<String>,
    pub attachments: Vec<Attachment>,
    pub confidence: i32,
    /// LLM 不可用或结果被丢弃，内容来自启发式抽取
    pub partial: bool,
    /// 输入超过清洗上限被截断
    pub truncated: bool,
    pub template_version: Option<String>,
}

impl CleanedContent {
    fn from_heuristic(heuristic: HeuristicContent, truncated: bool) -> Self {
        Self {
            title: heuristic.title,
            content: heuristic.content,
            publish_date: heuristic.publish_date,
            source: heuristic.source,
            attachments: heuristic.attachments,
            confidence: 0,
            partial: true,
            truncated,
            template_version: None,
        }
    }
}

/// 正文清洗
///
/// LLM 结果达到置信度阈值时采用，否则退回启发式抽取并标记 `partial`。
/// 附件取 LLM 与启发式两者的并集。
pub struct ContentCleaner {
    llm: Option<Arc<LlmService>>,
    max_chars: usize,
}

impl ContentCleaner {
    pub fn new(llm: Option<Arc<LlmService>>, max_chars: usize) -> Self {
        Self { llm, max_chars }
    }

    /// 清洗一篇公告页面
    ///
    /// # 参数
    ///
    /// * `html` - 已解码的页面 HTML
    /// * `page_url` - 页面最终 URL，用于解析相对链接
    ///
    /// # 返回值
    ///
    /// 只有取消与配置错误会返回 `Err`，其余 LLM 失败都降级为启发式结果。
    pub async fn clean(
        &self,
        html: &str,
        page_url: &str,
        cancel: &CancellationToken,
    ) -> Result<CleanedContent, PipelineError> {
        let heuristic = heuristic_cleaner::clean(html, page_url);

        let stripped = strip_noise(html);
        let truncated = stripped.chars().count() > self.max_chars;
        let input = truncate_chars(&stripped, self.max_chars);

        let Some(llm) = &self.llm else {
            return Ok(CleanedContent::from_heuristic(heuristic, truncated));
        };

        let cleaned = match llm
            .call_json::<LlmCleaned>(PromptKind::ContentClean, input, cancel)
            .await
        {
            Ok(cleaned) => cleaned,
            Err(LlmError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(err @ LlmError::Config(_)) => return Err(err.into()),
            Err(err) => {
                warn!(url = page_url, "LLM 清洗失败，使用启发式结果: {}", err);
                return Ok(CleanedContent::from_heuristic(heuristic, truncated));
            }
        };

        if let Err(err) = llm.gate(cleaned.confidence) {
            warn!(url = page_url, "{}，使用启发式结果", err);
            return Ok(CleanedContent::from_heuristic(heuristic, truncated));
        }

        debug!(url = page_url, confidence = cleaned.confidence, "LLM 清洗完成");
        Ok(merge(cleaned, heuristic, page_url, truncated))
    }
}

fn merge(
    cleaned: LlmCleaned,
    heuristic: HeuristicContent,
    page_url: &str,
    truncated: bool,
) -> CleanedContent {
    let base = Url::parse(page_url).ok();
    let mut seen = HashSet::new();
    let mut attachments = Vec::new();

    let from_llm = cleaned.attachments.into_iter().filter_map(|a| {
        let url = match &base {
            Some(base) => resolve_url(base, a.url.trim()).ok()?.to_string(),
            None => a.url.trim().to_string(),
        };
        let name = if a.name.trim().is_empty() {
            url.rsplit('/').next().unwrap_or_default().to_string()
        } else {
            a.name.trim().to_string()
        };
        Some(Attachment::new(name, url))
    });
    for attachment in from_llm.chain(heuristic.attachments) {
        if seen.insert(attachment.url.clone()) {
            attachments.push(attachment);
        }
    }

    let title = Some(cleaned.title.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or(heuristic.title);
    let content = Some(cleaned.content.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or(heuristic.content);

    CleanedContent {
        title,
        content,
        publish_date: cleaned
            .publish_date
            .as_deref()
            .and_then(parse_date)
            .or(heuristic.publish_date),
        source: cleaned
            .source
            .filter(|s| !s.trim().is_empty())
            .or(heuristic.source),
        attachments,
        confidence: cleaned.confidence.clamp(0, 100),
        partial: false,
        truncated,
        template_version: Some(PromptKind::ContentClean.template_version()),
    }
}

/// 去掉脚本、样式与注释，减少送入 LLM 的无关内容
fn strip_noise(html: &str) -> String {
    let without_blocks = match NOISE_BLOCKS.as_ref() {
        Some(re) => re.replace_all(html, ""),
        None => html.into(),
    };
    match COMMENTS.as_ref() {
        Some(re) => re.replace_all(&without_blocks, "").into_owned(),
        None => without_blocks.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::llm_service::{LlmClient, LlmRequest};
    use async_trait::async_trait;

    const PAGE: &str = r#"<html><head><title>招录公告_某局</title><script>var a = 1;</script></head>
        <body><div class="TRS_Editor"><p>某局2025年度考试录用公务员公告正文，详见附件职位表，报名时间为三月。</p></div>
        <a href="/f/zwb.xls">职位表</a></body></html>"#;

    struct Reply(Result<&'static str, LlmError>);

    #[async_trait]
    impl LlmClient for Reply {
        fn model(&self) -> &str {
            "reply"
        }

        async fn complete(
            &self,
            request: &LlmRequest,
            _cancel: &CancellationToken,
        ) -> Result<String, LlmError> {
            assert!(!request.prompt.contains("var a = 1"));
            self.0.clone().map(String::from)
        }
    }

    fn cleaner(reply: Result<&'static str, LlmError>) -> ContentCleaner {
        let settings = crate::test_support::settings();
        let llm = LlmService::with_client(Arc::new(Reply(reply)), &settings.llm);
        ContentCleaner::new(Some(Arc::new(llm)), settings.llm.max_clean_chars)
    }

    #[tokio::test]
    async fn test_llm_result_is_used_and_attachments_merged() {
        // Given: LLM 返回带多余逗号的围栏 JSON
        let reply = "```json\n{\"title\":\"某局2025年度考试录用公务员公告\",\"content\":\"正文\",\"publish_date\":\"2025年3月1日\",\"attachments\":[{\"name\":\"报名表\",\"url\":\"bmb.doc\"}],\"confidence\":90,}\n```";

        // When
        let cleaned = cleaner(Ok(reply))
            .clean(PAGE, "https://a.example.gov.cn/n/1.html", &CancellationToken::new())
            .await
            .unwrap();

        // Then
        assert!(!cleaned.partial);
        assert_eq!(cleaned.title, "某局2025年度考试录用公务员公告");
        assert_eq!(cleaned.confidence, 90);
        assert_eq!(cleaned.publish_date, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(cleaned.template_version.as_deref(), Some("content_clean@v3"));
        let urls: Vec<&str> = cleaned.attachments.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://a.example.gov.cn/n/bmb.doc", "https://a.example.gov.cn/f/zwb.xls"]
        );
    }

    #[tokio::test]
    async fn test_low_confidence_falls_back_to_heuristic() {
        let reply = r#"{"title":"x","content":"c","attachments":[],"confidence":40}"#;
        let cleaned = cleaner(Ok(reply))
            .clean(PAGE, "https://a.example.gov.cn/n/1.html", &CancellationToken::new())
            .await
            .unwrap();
        assert!(cleaned.partial);
        assert_eq!(cleaned.confidence, 0);
        assert!(cleaned.content.contains("考试录用公务员公告正文"));
    }

    #[tokio::test]
    async fn test_llm_error_degrades_but_cancel_propagates() {
        let cleaned = cleaner(Err(LlmError::Timeout))
            .clean(PAGE, "https://a.example.gov.cn/n/1.html", &CancellationToken::new())
            .await
            .unwrap();
        assert!(cleaned.partial);
        assert_eq!(cleaned.title, "招录公告");

        let result = cleaner(Err(LlmError::Cancelled))
            .clean(PAGE, "https://a.example.gov.cn/n/1.html", &CancellationToken::new())
            .await;
        assert_eq!(result, Err(PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn test_without_llm_marks_truncation() {
        let cleaner = ContentCleaner::new(None, 20);
        let cleaned = cleaner
            .clean(PAGE, "https://a.example.gov.cn/n/1.html", &CancellationToken::new())
            .await
            .unwrap();
        assert!(cleaned.partial);
        assert!(cleaned.truncated);
    }

    #[test]
    fn test_strip_noise() {
        assert!(NOISE_BLOCKS.is_some() && COMMENTS.is_some());
        let html = "<p>a</p><script type=\"x\">b</script><!-- c --><style>d</style><p>e</p>";
        assert_eq!(strip_noise(html), "<p>a</p><p>e</p>");
    }
}
