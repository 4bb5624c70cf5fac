// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::json_repair::parse_llm_json;
use super::prompts::{PromptKind, SYSTEM_PROMPT};
use crate::config::settings::LlmSettings;
use crate::domain::models::llm_config::LlmProvider;
use crate::utils::errors::PipelineError;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 缺少 Key、未知服务商等，任务不应启动
    #[error("LLM 配置错误: {0}")]
    Config(String),

    #[error("LLM 请求失败: {0}")]
    Request(String),

    #[error("LLM 返回状态 {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM 调用超时")]
    Timeout,

    #[error("LLM 调用已取消")]
    Cancelled,

    #[error("LLM 响应为空")]
    EmptyResponse,

    /// 输出无法解析为约定结构
    #[error("LLM 输出不符合结构: {0}")]
    SchemaViolation(String),

    #[error("LLM 置信度 {confidence} 低于阈值 {threshold}")]
    LowConfidence { confidence: i32, threshold: i32 },

    /// 读取配置池失败
    #[error("LLM 配置读取失败: {0}")]
    Storage(String),
}

impl LlmError {
    /// 指标标签
    pub fn outcome(&self) -> &'static str {
        match self {
            LlmError::Config(_) => "config",
            LlmError::Request(_) | LlmError::Status { .. } => "http_error",
            LlmError::Timeout => "timeout",
            LlmError::Cancelled => "cancelled",
            LlmError::EmptyResponse | LlmError::SchemaViolation(_) => "schema_violation",
            LlmError::LowConfidence { .. } => "low_confidence",
            LlmError::Storage(_) => "storage",
        }
    }
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Cancelled => PipelineError::Cancelled,
            LlmError::Config(_) => PipelineError::Permanent(err.to_string()),
            LlmError::Status { status, .. } if status == 429 || status >= 500 => {
                PipelineError::Transient(err.to_string())
            }
            LlmError::Status { .. } => PipelineError::Permanent(err.to_string()),
            LlmError::Request(_)
            | LlmError::Timeout
            | LlmError::EmptyResponse
            | LlmError::Storage(_) => {
                PipelineError::Transient(err.to_string())
            }
            LlmError::SchemaViolation(_) | LlmError::LowConfidence { .. } => {
                PipelineError::Validation(err.to_string())
            }
        }
    }
}

/// 一次补全请求
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub kind: PromptKind,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// LLM 客户端
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    /// 返回模型输出的原始文本
    async fn complete(
        &self,
        request: &LlmRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;
}

/// 按需解析出当前可用的客户端，配置池变更无需重启
#[async_trait]
pub trait LlmClientSource: Send + Sync {
    async fn client(&self) -> Result<Arc<dyn LlmClient>, LlmError>;
}

/// 固定客户端
pub struct FixedClient(pub Arc<dyn LlmClient>);

#[async_trait]
impl LlmClientSource for FixedClient {
    async fn client(&self) -> Result<Arc<dyn LlmClient>, LlmError> {
        Ok(self.0.clone())
    }
}

/// 连接一个 LLM 端点所需的全部参数
#[derive(Clone)]
pub struct LlmEndpoint {
    pub provider: LlmProvider,
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// 配置池中单条配置的覆盖值
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl std::fmt::Debug for LlmEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmEndpoint")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("has_key", &self.api_key.is_some())
            .finish()
    }
}

/// 基于 HTTP 的客户端，按服务商切换请求格式
///
/// - OpenAI 兼容（openai / deepseek / custom）：`POST {base}/chat/completions`
/// - Anthropic：`POST {base}/messages`
/// - Gemini：`POST {base}/models/{model}:generateContent`
/// - Ollama：`POST {base}/api/generate`
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: LlmEndpoint,
}

impl HttpLlmClient {
    pub fn new(endpoint: LlmEndpoint) -> Result<Self, LlmError> {
        if endpoint.provider.requires_key()
            && endpoint.api_key.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(LlmError::Config(format!(
                "服务商 {} 需要 API Key",
                endpoint.provider.as_str()
            )));
        }
        if endpoint.api_url.trim().is_empty() {
            return Err(LlmError::Config("LLM api_url 为空".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("HTTP 客户端创建失败: {}", e)))?;
        Ok(Self { client, endpoint })
    }

    /// 从静态配置构造
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let provider: LlmProvider = settings
            .provider
            .parse()
            .map_err(|e| LlmError::Config(format!("{}", e)))?;
        Self::new(LlmEndpoint {
            provider,
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout),
            max_tokens: None,
            temperature: None,
        })
    }

    fn base(&self) -> &str {
        self.endpoint.api_url.trim_end_matches('/')
    }

    fn build(&self, request: &LlmRequest) -> reqwest::RequestBuilder {
        let key = self.endpoint.api_key.clone().unwrap_or_default();
        let max_tokens = self.endpoint.max_tokens.unwrap_or(request.max_tokens);
        let temperature = self.endpoint.temperature.unwrap_or(request.temperature);
        match self.endpoint.provider {
            LlmProvider::Anthropic => self
                .client
                .post(format!("{}/messages", self.base()))
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": self.endpoint.model,
                    "system": request.system,
                    "messages": [{"role": "user", "content": request.prompt}],
                    "max_tokens": max_tokens,
                    "temperature": temperature,
                })),
            LlmProvider::Gemini => self
                .client
                .post(format!(
                    "{}/models/{}:generateContent",
                    self.base(),
                    self.endpoint.model
                ))
                .query(&[("key", key)])
                .json(&json!({
                    "systemInstruction": {"parts": [{"text": request.system}]},
                    "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
                    "generationConfig": {
                        "temperature": temperature,
                        "maxOutputTokens": max_tokens,
                    },
                })),
            LlmProvider::Ollama => self
                .client
                .post(format!("{}/api/generate", self.base()))
                .json(&json!({
                    "model": self.endpoint.model,
                    "system": request.system,
                    "prompt": request.prompt,
                    "stream": false,
                    "format": "json",
                    "options": {
                        "temperature": temperature,
                        "num_predict": max_tokens,
                    },
                })),
            LlmProvider::OpenAi | LlmProvider::DeepSeek | LlmProvider::Custom => self
                .client
                .post(format!("{}/chat/completions", self.base()))
                .bearer_auth(key)
                .json(&json!({
                    "model": self.endpoint.model,
                    "messages": [
                        {"role": "system", "content": request.system},
                        {"role": "user", "content": request.prompt},
                    ],
                    "temperature": temperature,
                    "max_tokens": max_tokens,
                })),
        }
    }

    /// 从各服务商的响应体中取出文本
    fn response_text(&self, body: &Value) -> Option<String> {
        let text = match self.endpoint.provider {
            LlmProvider::Anthropic => body["content"]
                .as_array()?
                .iter()
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
            LlmProvider::Gemini => body["candidates"][0]["content"]["parts"]
                .as_array()?
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
            LlmProvider::Ollama => body["response"].as_str()?.to_string(),
            LlmProvider::OpenAi | LlmProvider::DeepSeek | LlmProvider::Custom => {
                body["choices"][0]["message"]["content"].as_str()?.to_string()
            }
        };
        Some(text).filter(|t| !t.trim().is_empty())
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn model(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(
        &self,
        request: &LlmRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let send = self.build(request).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            response = send => response.map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Request(e.to_string())
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(500).collect();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            body = response.json() => body.map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::SchemaViolation(format!("响应体不是 JSON: {}", e))
                }
            })?,
        };

        self.response_text(&body).ok_or(LlmError::EmptyResponse)
    }
}

/// LLM 调用门面
///
/// 负责提示词渲染、输入截断、JSON 修复与置信度门槛；
/// 每次调用按 (提示词种类, 结果) 计数。
pub struct LlmService {
    source: Arc<dyn LlmClientSource>,
    temperature: f32,
    max_output_tokens: u32,
    max_input_chars: usize,
    max_clean_chars: usize,
    confidence_threshold: i32,
}

impl LlmService {
    pub fn new(source: Arc<dyn LlmClientSource>, settings: &LlmSettings) -> Self {
        Self {
            source,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            max_input_chars: settings.max_input_tokens.saturating_mul(2),
            max_clean_chars: settings.max_clean_chars,
            confidence_threshold: settings.confidence_threshold,
        }
    }

    pub fn with_client(client: Arc<dyn LlmClient>, settings: &LlmSettings) -> Self {
        Self::new(Arc::new(FixedClient(client)), settings)
    }

    pub fn confidence_threshold(&self) -> i32 {
        self.confidence_threshold
    }

    /// 提取阶段的输入上限（字符）
    pub fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// 清洗阶段的输入上限（字符）
    pub fn max_clean_chars(&self) -> usize {
        self.max_clean_chars
    }

    /// 置信度低于阈值时返回错误
    pub fn gate(&self, confidence: i32) -> Result<(), LlmError> {
        if confidence < self.confidence_threshold {
            return Err(LlmError::LowConfidence {
                confidence,
                threshold: self.confidence_threshold,
            });
        }
        Ok(())
    }

    /// 渲染提示词并返回原始输出
    pub async fn call(
        &self,
        kind: PromptKind,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let started = Instant::now();
        let result = self.call_inner(kind, input, cancel).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::counter!("gwycrawl_llm_calls_total", "kind" => kind.as_str(), "outcome" => outcome)
            .increment(1);
        debug!(
            kind = kind.as_str(),
            outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "LLM 调用结束"
        );
        result
    }

    async fn call_inner(
        &self,
        kind: PromptKind,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let client = self.source.client().await?;
        let request = LlmRequest {
            kind,
            system: SYSTEM_PROMPT.to_string(),
            prompt: kind.render(input),
            max_tokens: self.max_output_tokens,
            temperature: self.temperature,
        };
        client.complete(&request, cancel).await
    }

    /// 调用并按约定结构解析
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        kind: PromptKind,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<T, LlmError> {
        let raw = self.call(kind, input, cancel).await?;
        parse_llm_json(&raw).map_err(|e| {
            warn!(kind = kind.as_str(), "LLM 输出解析失败: {}", e);
            metrics::counter!("gwycrawl_llm_calls_total", "kind" => kind.as_str(), "outcome" => "schema_violation")
                .increment(1);
            LlmError::SchemaViolation(e.to_string())
        })
    }
}

/// 按字符截断
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
