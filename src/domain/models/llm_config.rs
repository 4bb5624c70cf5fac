// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::task::DomainError;

/// LLM 服务商，决定请求体格式与鉴权方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    DeepSeek,
    Anthropic,
    Gemini,
    Ollama,
    Custom,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::DeepSeek => "deepseek",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Gemini => "gemini",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Custom => "custom",
        }
    }

    /// 未填写 api_url 时的默认地址
    pub fn default_api_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::DeepSeek => "https://api.deepseek.com/v1",
            LlmProvider::Anthropic => "https://api.anthropic.com/v1",
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Custom => "",
        }
    }

    /// Ollama 本地部署不需要 Key
    pub fn requires_key(&self) -> bool {
        !matches!(self, LlmProvider::Ollama)
    }
}

impl FromStr for LlmProvider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "deepseek" => Ok(LlmProvider::DeepSeek),
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "gemini" => Ok(LlmProvider::Gemini),
            "ollama" => Ok(LlmProvider::Ollama),
            "custom" => Ok(LlmProvider::Custom),
            other => Err(DomainError::ValidationError(format!("未知 LLM 服务商: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Success,
    Failed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Success => "success",
            TestStatus::Failed => "failed",
        }
    }
}

/// LLM 配置池中的一项
///
/// `api_key_encrypted` 只在 LLM 组件内部解密。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    pub id: i64,
    pub name: String,
    pub provider: LlmProvider,
    pub model: String,
    pub api_url: String,
    pub api_key_encrypted: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub is_default: bool,
    pub is_enabled: bool,
    pub last_test_status: Option<TestStatus>,
    pub last_test_message: Option<String>,
    pub last_tested_at: Option<DateTime<Utc>>,
}

impl LlmConfig {
    pub fn effective_api_url(&self) -> &str {
        if self.api_url.trim().is_empty() {
            self.provider.default_api_url()
        } else {
            self.api_url.trim_end_matches('/')
        }
    }
}
