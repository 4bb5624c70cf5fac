// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::domain::search::index::{IndexError, PositionDocument, SearchIndex};

/// HTTP 搜索索引
///
/// 以 `PUT {base}/{index}/_doc/{position_id}` 写入职位文档，兼容 Elasticsearch/OpenSearch。
pub struct HttpSearchIndex {
    client: Client,
    base_url: String,
    index: String,
}

impl HttpSearchIndex {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        }
    }

    fn document_url(&self, position_id: &str) -> String {
        format!(
            "{}/{}/_doc/{}",
            self.base_url,
            self.index,
            urlencoding::encode(position_id)
        )
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn upsert(&self, document: &PositionDocument) -> Result<(), IndexError> {
        let url = self.document_url(&document.position_id);
        let response = self
            .client
            .put(&url)
            .json(document)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IndexError::Timeout
                } else {
                    IndexError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Engine(format!(
                "{}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        debug!(position_id = %document.position_id, "职位文档已写入索引");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::position::Position;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn document() -> PositionDocument {
        let position = Position {
            position_id: "130:3001:2025".into(),
            position_name: "一级科员".into(),
            department_name: "某市税务局".into(),
            recruit_count: 1,
            ..Position::default()
        };
        PositionDocument::from(&position)
    }

    #[tokio::test]
    async fn test_upsert_puts_document_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/positions/_doc/130%3A3001%3A2025"))
            .and(body_partial_json(serde_json::json!({ "position_name": "一级科员" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let index = HttpSearchIndex::new(&server.uri(), "positions", Duration::from_secs(5));
        index.upsert(&document()).await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let index = HttpSearchIndex::new(&server.uri(), "positions", Duration::from_secs(5));
        let err = index.upsert(&document()).await.unwrap_err();
        assert!(matches!(err, IndexError::Engine(msg) if msg.contains("503")));
    }
}
