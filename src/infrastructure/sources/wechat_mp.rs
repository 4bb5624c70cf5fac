// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{cookie_header, parse_cookie_string, ExternalSource, SourceError};
use crate::domain::models::article::ArticleCandidate;
use crate::domain::models::list_page::ListPage;
use crate::engines::traits::{FetchRequest, Fetcher};

const MP_BASE: &str = "https://mp.weixin.qq.com";
const PAGE_SIZE: u32 = 5;
const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024;
/// 会话失效的返回码
const SESSION_EXPIRED: [i64; 2] = [-1, 200003];

#[derive(Debug, Deserialize)]
struct BaseResp {
    ret: i64,
    #[serde(default)]
    err_msg: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    base_resp: BaseResp,
    #[serde(default)]
    publish_page: String,
}

#[derive(Debug, Default, Deserialize)]
struct PublishPage {
    #[serde(default)]
    publish_list: Vec<PublishItem>,
}

#[derive(Debug, Deserialize)]
struct PublishItem {
    /// 对象或 JSON 字符串
    #[serde(default)]
    publish_info: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct PublishInfo {
    #[serde(default)]
    appmsg_info: Vec<AppMsg>,
}

#[derive(Debug, Deserialize)]
struct AppMsg {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content_url: String,
    #[serde(default)]
    create_time: i64,
}

/// 公众号已发布文章
///
/// 通过公众号后台接口按 fakeid 列出文章，需要导入后台 token 与 Cookie。
pub struct WechatMpSource {
    fetcher: Arc<dyn Fetcher>,
    token: Option<String>,
    cookies: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl WechatMpSource {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        token: Option<String>,
        cookies: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            token,
            cookies,
            base_url: MP_BASE.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn credentials(&self) -> Result<(&str, String), SourceError> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SourceError::Config("未配置公众号后台 token".to_string()))?;
        let cookies = self
            .cookies
            .as_deref()
            .map(parse_cookie_string)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SourceError::Config("未导入公众号后台 Cookie".to_string()))?;
        Ok((token, cookie_header(&cookies)))
    }

    async fn fetch_page(
        &self,
        fakeid: &str,
        begin: u32,
        token: &str,
        cookie: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AppMsg>, SourceError> {
        let url = format!(
            "{}/cgi-bin/appmsgpublish?sub=list&sub_action=list_ex&begin={}&count={}&fakeid={}&type=101&query=&token={}&lang=zh_CN&f=json&ajax=1",
            self.base_url,
            begin,
            PAGE_SIZE,
            urlencoding::encode(fakeid),
            urlencoding::encode(token)
        );
        let request = FetchRequest::get(url, self.timeout, MAX_RESPONSE_BYTES)
            .header("cookie", cookie)
            .header("x-requested-with", "XMLHttpRequest")
            .header(
                "referer",
                format!("{}/cgi-bin/appmsgpublish?t=appmsg/manage&token={}", self.base_url, token),
            );

        let response = self.fetcher.fetch(&request, cancel).await?;
        if !response.is_success() {
            return Err(SourceError::Api {
                code: response.status as i64,
                message: "HTTP 状态异常".to_string(),
            });
        }
        let parsed: PublishResponse =
            serde_json::from_slice(&response.body).map_err(|e| SourceError::Decode(e.to_string()))?;
        match parsed.base_resp.ret {
            0 => {}
            ret if SESSION_EXPIRED.contains(&ret) => {
                return Err(SourceError::Config("公众号后台会话已失效，请重新登录".to_string()));
            }
            ret => {
                return Err(SourceError::Api {
                    code: ret,
                    message: parsed.base_resp.err_msg,
                });
            }
        }

        Ok(parse_publish_page(&parsed.publish_page))
    }
}

fn parse_publish_page(raw: &str) -> Vec<AppMsg> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let page: PublishPage = match serde_json::from_str(raw) {
        Ok(page) => page,
        Err(e) => {
            warn!("publish_page 解析失败: {}", e);
            return Vec::new();
        }
    };
    page.publish_list
        .into_iter()
        .filter_map(|item| {
            let info = match item.publish_info {
                serde_json::Value::String(s) => serde_json::from_str::<PublishInfo>(&s).ok(),
                value => serde_json::from_value::<PublishInfo>(value).ok(),
            };
            info.map(|i| i.appmsg_info)
        })
        .flatten()
        .collect()
}

#[async_trait]
impl ExternalSource for WechatMpSource {
    fn scheme(&self) -> &'static str {
        "wechat-mp"
    }

    async fn list(
        &self,
        page: &ListPage,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArticleCandidate>, SourceError> {
        let fakeid = page
            .url
            .strip_prefix("wechat-mp://")
            .map(|rest| rest.trim_matches('/'))
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| SourceError::InvalidUrl(page.url.clone()))?;
        let (token, cookie) = self.credentials()?;

        let mut candidates: Vec<ArticleCandidate> = Vec::new();
        for page_no in 0..page.max_pages.max(1) {
            let messages = self
                .fetch_page(fakeid, page_no * PAGE_SIZE, token, &cookie, cancel)
                .await?;
            debug!(fakeid, page = page_no + 1, count = messages.len(), "公众号文章分页");
            if messages.is_empty() {
                break;
            }
            for msg in messages {
                let url = html_escape::decode_html_entities(&msg.content_url).to_string();
                if url.is_empty() || candidates.iter().any(|c| c.url == url) {
                    continue;
                }
                let mut candidate = ArticleCandidate::new(url, msg.title.trim());
                if msg.create_time > 0 {
                    candidate.published_hint = Utc
                        .timestamp_opt(msg.create_time, 0)
                        .single()
                        .map(|t| t.format("%Y-%m-%d").to_string());
                }
                candidates.push(candidate);
            }
        }

        info!(list_page_id = page.id, count = candidates.len(), "公众号文章列表完成");
        Ok(candidates)
    }
}
