// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::llm_config::{LlmConfig, TestStatus};
use crate::domain::repositories::llm_config_repository::LlmConfigRepository;
use crate::infrastructure::database::entities::llm_config;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet,
    QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

/// LLM 配置仓库实现
#[derive(Clone)]
pub struct LlmConfigRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl LlmConfigRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn parse_test_status(value: &str) -> Option<TestStatus> {
    match value {
        "success" => Some(TestStatus::Success),
        "failed" => Some(TestStatus::Failed),
        _ => None,
    }
}

impl From<llm_config::Model> for LlmConfig {
    fn from(model: llm_config::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            provider: model.provider.parse().unwrap_or_default(),
            model: model.model,
            api_url: model.api_url,
            api_key_encrypted: model.api_key_encrypted,
            max_tokens: model.max_tokens.max(0) as u32,
            temperature: model.temperature,
            timeout_secs: model.timeout_secs.max(0) as u64,
            is_default: model.is_default,
            is_enabled: model.is_enabled,
            last_test_status: model.last_test_status.as_deref().and_then(parse_test_status),
            last_test_message: model.last_test_message,
            last_tested_at: model.last_tested_at,
        }
    }
}

#[async_trait]
impl LlmConfigRepository for LlmConfigRepositoryImpl {
    async fn create(&self, config: &LlmConfig) -> Result<LlmConfig, RepositoryError> {
        let model = llm_config::ActiveModel {
            id: NotSet,
            name: Set(config.name.clone()),
            provider: Set(config.provider.as_str().to_string()),
            model: Set(config.model.clone()),
            api_url: Set(config.api_url.clone()),
            api_key_encrypted: Set(config.api_key_encrypted.clone()),
            max_tokens: Set(config.max_tokens as i32),
            temperature: Set(config.temperature),
            timeout_secs: Set(config.timeout_secs as i64),
            is_default: Set(config.is_default),
            is_enabled: Set(config.is_enabled),
            last_test_status: Set(config.last_test_status.map(|s| s.as_str().to_string())),
            last_test_message: Set(config.last_test_message.clone()),
            last_tested_at: Set(config.last_tested_at),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(self.db.as_ref()).await?.into())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<LlmConfig>, RepositoryError> {
        let model = llm_config::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        Ok(model.map(Into::into))
    }

    async fn find_default_enabled(&self) -> Result<Option<LlmConfig>, RepositoryError> {
        let model = llm_config::Entity::find()
            .filter(llm_config::Column::IsEnabled.eq(true))
            .order_by_desc(llm_config::Column::IsDefault)
            .order_by_asc(llm_config::Column::Id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn record_test_result(
        &self,
        id: i64,
        status: TestStatus,
        message: Option<&str>,
        tested_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = llm_config::Entity::update_many()
            .col_expr(llm_config::Column::LastTestStatus, Expr::value(status.as_str()))
            .col_expr(
                llm_config::Column::LastTestMessage,
                Expr::value(message.map(str::to_string)),
            )
            .col_expr(llm_config::Column::LastTestedAt, Expr::value(tested_at))
            .filter(llm_config::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
