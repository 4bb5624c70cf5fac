// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use validator::Validate;

use super::llm_service::{HttpLlmClient, LlmClient, LlmClientSource, LlmEndpoint, LlmError, LlmRequest};
use super::prompts::{PromptKind, SYSTEM_PROMPT};
use crate::config::settings::LlmSettings;
use crate::domain::models::llm_config::{LlmConfig, LlmProvider, TestStatus};
use crate::domain::repositories::llm_config_repository::LlmConfigRepository;
use crate::utils::crypto::{mask_api_key, ApiKeyCipher};
use crate::utils::errors::RepositoryError;

impl From<RepositoryError> for LlmError {
    fn from(err: RepositoryError) -> Self {
        LlmError::Storage(err.to_string())
    }
}

/// 新建配置的输入
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewLlmConfig {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub provider: LlmProvider,
    #[validate(length(min = 1, max = 200))]
    pub model: String,
    /// 为空时使用服务商默认地址
    pub api_url: String,
    /// 明文，仅在写入前加密
    pub api_key: Option<String>,
    #[validate(range(min = 1, max = 200000))]
    pub max_tokens: u32,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
    pub is_default: bool,
}

/// LLM 配置池
///
/// 负责密钥加解密、客户端解析与连通性测试。明文 Key 只在本服务内出现。
pub struct LlmConfigService {
    repository: Arc<dyn LlmConfigRepository>,
    cipher: Option<ApiKeyCipher>,
    fallback: LlmSettings,
}

impl LlmConfigService {
    pub fn new(repository: Arc<dyn LlmConfigRepository>, settings: &LlmSettings) -> Self {
        let cipher = settings
            .encryption_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .and_then(|k| ApiKeyCipher::new(k).ok());
        if cipher.is_none() {
            warn!("llm.encryption_key 未配置，配置池中的 API Key 不可用");
        }
        Self {
            repository,
            cipher,
            fallback: settings.clone(),
        }
    }

    fn cipher(&self) -> Result<&ApiKeyCipher, LlmError> {
        self.cipher
            .as_ref()
            .ok_or_else(|| LlmError::Config("llm.encryption_key 未配置".to_string()))
    }

    /// 加密后写入配置池
    pub async fn create(&self, input: NewLlmConfig) -> Result<LlmConfig, LlmError> {
        input
            .validate()
            .map_err(|e| LlmError::Config(format!("配置校验失败: {}", e)))?;

        let api_key = input.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty());
        if input.provider.requires_key() && api_key.is_none() {
            return Err(LlmError::Config(format!(
                "服务商 {} 需要 API Key",
                input.provider.as_str()
            )));
        }
        let api_key_encrypted = match api_key {
            Some(key) => Some(
                self.cipher()?
                    .encrypt(key)
                    .map_err(|e| LlmError::Config(e.to_string()))?,
            ),
            None => None,
        };

        let config = LlmConfig {
            id: 0,
            name: input.name,
            provider: input.provider,
            model: input.model,
            api_url: input.api_url,
            api_key_encrypted,
            max_tokens: input.max_tokens,
            temperature: input.temperature,
            timeout_secs: input.timeout_secs,
            is_default: input.is_default,
            is_enabled: true,
            last_test_status: None,
            last_test_message: None,
            last_tested_at: None,
        };
        let created = self.repository.create(&config).await?;
        info!(id = created.id, name = %created.name, provider = created.provider.as_str(), "新增 LLM 配置");
        Ok(created)
    }

    /// 用于展示的脱敏 Key
    pub fn masked_key(&self, config: &LlmConfig) -> Result<Option<String>, LlmError> {
        self.decrypt_key(config)
            .map(|key| key.map(|k| mask_api_key(&k)))
    }

    fn decrypt_key(&self, config: &LlmConfig) -> Result<Option<String>, LlmError> {
        match config.api_key_encrypted.as_deref() {
            Some(encrypted) => self
                .cipher()?
                .decrypt(encrypted)
                .map(Some)
                .map_err(|e| LlmError::Config(format!("配置 {} 的 API Key 无法解密: {}", config.id, e))),
            None => Ok(None),
        }
    }

    fn endpoint_for(&self, config: &LlmConfig) -> Result<LlmEndpoint, LlmError> {
        Ok(LlmEndpoint {
            provider: config.provider,
            api_url: config.effective_api_url().to_string(),
            api_key: self.decrypt_key(config)?,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
        })
    }

    /// 解析当前客户端：配置池中的默认项优先，否则使用静态配置
    pub async fn resolve_client(&self) -> Result<Arc<dyn LlmClient>, LlmError> {
        match self.repository.find_default_enabled().await? {
            Some(config) => {
                let client = HttpLlmClient::new(self.endpoint_for(&config)?)?;
                Ok(Arc::new(client))
            }
            None => Ok(Arc::new(HttpLlmClient::from_settings(&self.fallback)?)),
        }
    }

    /// 用一次最小补全测试配置，并记录结果
    pub async fn test_config(&self, id: i64) -> Result<TestStatus, LlmError> {
        let config = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| LlmError::Config(format!("LLM 配置 {} 不存在", id)))?;

        let outcome = match self.endpoint_for(&config).and_then(HttpLlmClient::new) {
            Ok(client) => {
                let request = LlmRequest {
                    kind: PromptKind::Ping,
                    system: SYSTEM_PROMPT.to_string(),
                    prompt: PromptKind::Ping.render(""),
                    max_tokens: 16,
                    temperature: 0.0,
                };
                client.complete(&request, &CancellationToken::new()).await
            }
            Err(e) => Err(e),
        };

        let (status, message) = match outcome {
            Ok(_) => (TestStatus::Success, None),
            Err(e) => (TestStatus::Failed, Some(e.to_string())),
        };
        self.repository
            .record_test_result(id, status, message.as_deref(), Utc::now())
            .await?;

        match &message {
            Some(reason) => warn!(id, reason = %reason, "LLM 配置测试失败"),
            None => info!(id, "LLM 配置测试成功"),
        }
        Ok(status)
    }
}

#[async_trait]
impl LlmClientSource for LlmConfigService {
    async fn client(&self) -> Result<Arc<dyn LlmClient>, LlmError> {
        self.resolve_client().await
    }
}
