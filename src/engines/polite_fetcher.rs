// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::host_limiter::HostLimiter;
use super::traits::{FetchError, FetchRequest, FetchResponse, Fetcher};
use crate::config::settings::FetcherSettings;
use crate::utils::retry_policy::RetryPolicy;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; gwycrawl/0.1)";
const MAX_REDIRECTS: usize = 10;

/// 上游繁忙时值得重试的状态码
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 502 | 503 | 504)
}

/// 礼貌抓取器
///
/// 基于reqwest实现：每主机令牌桶与并发上限、按主机固定的 UA、
/// 对连接错误与 502/503/504 的指数退避重试、响应体大小上限。
pub struct PoliteFetcher {
    client: reqwest::Client,
    limiter: HostLimiter,
    user_agents: Vec<String>,
    retry: RetryPolicy,
}

impl PoliteFetcher {
    /// 创建抓取器
    ///
    /// # 参数
    ///
    /// * `settings` - 抓取器配置
    ///
    /// # 返回值
    ///
    /// * `Ok(PoliteFetcher)` - 抓取器实例
    /// * `Err(FetchError)` - HTTP 客户端构建失败
    pub fn new(settings: &FetcherSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self {
            client,
            limiter: HostLimiter::new(
                settings.rps_per_host,
                settings.burst,
                settings.max_in_flight_per_host,
            ),
            user_agents: settings.user_agents.clone(),
            retry: RetryPolicy::fast(settings.retry_attempts.saturating_sub(1)),
        })
    }

    /// 替换重试策略，测试中用于缩短退避
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 按主机哈希选择 UA，同一主机始终使用同一个
    pub fn user_agent_for(&self, host: &str) -> &str {
        if self.user_agents.is_empty() {
            return DEFAULT_USER_AGENT;
        }
        let digest = Sha256::digest(host.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let index = (u64::from_be_bytes(prefix) % self.user_agents.len() as u64) as usize;
        &self.user_agents[index]
    }

    async fn send_once(
        &self,
        request: &FetchRequest,
        user_agent: &str,
    ) -> Result<FetchResponse, FetchError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &request.headers {
            if let (Ok(k), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(k, v);
            }
        }
        if let Some(etag) = request.if_none_match.as_deref() {
            if let Ok(v) = HeaderValue::from_str(etag) {
                headers.insert(reqwest::header::IF_NONE_MATCH, v);
            }
        }
        if let Some(modified) = request.if_modified_since.as_deref() {
            if let Ok(v) = HeaderValue::from_str(modified) {
                headers.insert(reqwest::header::IF_MODIFIED_SINCE, v);
            }
        }

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .headers(headers)
            .timeout(request.timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let mut response = builder.send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let mut response_headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                response_headers.insert(k.as_str().to_ascii_lowercase(), v_str.to_string());
            }
        }

        if let Some(length) = response.content_length() {
            if length as usize > request.max_bytes {
                return Err(FetchError::PayloadTooLarge {
                    limit: request.max_bytes,
                });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > request.max_bytes {
                return Err(FetchError::PayloadTooLarge {
                    limit: request.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            status,
            headers: response_headers,
            body: body.freeze(),
            final_url,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Fetcher for PoliteFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        let url = url::Url::parse(&request.url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", request.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(request.url.clone()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(request.url.clone()))?
            .to_ascii_lowercase();
        let user_agent = self.user_agent_for(&host).to_string();

        let max_attempts = self.retry.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                permit = self.limiter.acquire(&host, request.timeout) => permit?,
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.send_once(request, &user_agent) => result,
            };
            drop(permit);

            let retry_reason = match &result {
                Ok(resp) if is_retryable_status(resp.status) => Some(format!("HTTP {}", resp.status)),
                Err(e) if e.is_retryable() => Some(e.to_string()),
                _ => None,
            };

            match (retry_reason, attempt < max_attempts) {
                (Some(reason), true) => {
                    let backoff = self.retry.calculate_backoff(attempt);
                    warn!(
                        url = %request.url,
                        attempt,
                        "抓取失败，{} 毫秒后重试: {}",
                        backoff.as_millis(),
                        reason
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                _ => {
                    let label = match &result {
                        Ok(resp) => resp.status.to_string(),
                        Err(FetchError::PayloadTooLarge { .. }) => "too_large".to_string(),
                        Err(_) => "error".to_string(),
                    };
                    metrics::counter!("gwycrawl_fetch_total", "status" => label).increment(1);
                    if let Ok(resp) = &result {
                        debug!(url = %request.url, status = resp.status, bytes = resp.body.len(), "抓取完成");
                    }
                    return result;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "polite_fetcher_test.rs"]
mod tests;
