// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::llm_config::{LlmConfig, TestStatus};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// LLM 配置池仓库
#[async_trait]
pub trait LlmConfigRepository: Send + Sync {
    async fn create(&self, config: &LlmConfig) -> Result<LlmConfig, RepositoryError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<LlmConfig>, RepositoryError>;
    /// 默认且启用的配置；没有默认项时取第一个启用项
    async fn find_default_enabled(&self) -> Result<Option<LlmConfig>, RepositoryError>;
    async fn record_test_result(
        &self,
        id: i64,
        status: TestStatus,
        message: Option<&str>,
        tested_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}
