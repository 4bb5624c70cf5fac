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
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::utils::errors::PipelineError;

/// 抓取错误类型
#[derive(Error, Debug)]
pub enum FetchError {
    /// 等待主机令牌超时
    #[error("主机限流，等待令牌超时: {0}")]
    RateLimitExceeded(String),
    /// 响应体超过上限
    #[error("响应体超过上限 {limit} 字节")]
    PayloadTooLarge { limit: usize },
    #[error("请求已取消")]
    Cancelled,
    #[error("请求超时")]
    Timeout,
    /// 请求失败
    #[error("请求失败: {0}")]
    Request(#[from] reqwest::Error),
    #[error("无效的URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// 判断错误是否可在抓取器内部重试
    ///
    /// # 返回值
    ///
    /// 连接重置与超时返回 true；状态码重试由调用方按响应判断
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect(),
            FetchError::Timeout => true,
            _ => false,
        }
    }
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => PipelineError::Cancelled,
            FetchError::RateLimitExceeded(_) | FetchError::Timeout => {
                PipelineError::Transient(err.to_string())
            }
            FetchError::Request(ref e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                PipelineError::Transient(err.to_string())
            }
            FetchError::Request(_) | FetchError::PayloadTooLarge { .. } | FetchError::InvalidUrl(_) => {
                PipelineError::Permanent(err.to_string())
            }
        }
    }
}

/// 抓取请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    pub method: reqwest::Method,
    /// 请求头
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// 超时时间，同时约束等待限流令牌的时间
    pub timeout: Duration,
    /// 响应体上限
    pub max_bytes: usize,
    /// 条件请求：上次的 ETag
    pub if_none_match: Option<String>,
    /// 条件请求：上次的 Last-Modified
    pub if_modified_since: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            url: url.into(),
            method: reqwest::Method::GET,
            headers: HashMap::new(),
            body: None,
            timeout,
            max_bytes,
            if_none_match: None,
            if_modified_since: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }
}

/// 抓取响应
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status: u16,
    /// 响应头（小写键）
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// 跟随重定向后的最终地址
    pub final_url: String,
    /// 响应时间（毫秒）
    pub elapsed_ms: u64,
}

impl FetchResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    /// 非 2xx/304 响应对应的流水线错误；429 与 5xx 可重试
    pub fn status_error(&self) -> Option<PipelineError> {
        if self.is_success() || self.is_not_modified() {
            return None;
        }
        let message = format!("{} 返回状态 {}", self.final_url, self.status);
        Some(if self.status == 429 || self.status >= 500 {
            PipelineError::Transient(message)
        } else {
            PipelineError::Permanent(message)
        })
    }
}

/// 抓取器特质
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 执行抓取；非重试范围内的状态码原样返回
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError>;
}
