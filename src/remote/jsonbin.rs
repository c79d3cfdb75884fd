use super::BlobStore;
use crate::config::RemoteConfig;
use crate::errors::RemoteError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-Master-Key";

#[derive(Debug, Deserialize)]
struct CreateResponse {
    metadata: CreateMetadata,
}

#[derive(Debug, Deserialize)]
struct CreateMetadata {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    record: Value,
}

/// Client for a JSON-blob service exposing `POST /b`, `GET /b/{id}/latest`,
/// `PUT /b/{id}` and `DELETE /b/{id}`.
pub struct JsonBinClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl JsonBinClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(RemoteError::from)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, id: Option<&str>) -> Result<Response, RemoteError> {
        let response = self.with_key(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(id.unwrap_or_default().to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Unauthorized),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(RemoteError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl BlobStore for JsonBinClient {
    fn backend_name(&self) -> &str {
        "jsonbin"
    }

    async fn create(&self, doc: &Value) -> Result<String, RemoteError> {
        let response = self
            .send(self.client.post(self.url("/b")).json(doc), None)
            .await?;
        let created: CreateResponse = response.json().await?;
        debug!("created remote document {}", created.metadata.id);
        Ok(created.metadata.id)
    }

    async fn read(&self, id: &str) -> Result<Value, RemoteError> {
        let response = self
            .send(self.client.get(self.url(&format!("/b/{id}/latest"))), Some(id))
            .await?;
        let body: ReadResponse = response.json().await?;
        Ok(body.record)
    }

    async fn update(&self, id: &str, doc: &Value) -> Result<(), RemoteError> {
        self.send(self.client.put(self.url(&format!("/b/{id}"))).json(doc), Some(id))
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.send(self.client.delete(self.url(&format!("/b/{id}"))), Some(id))
            .await?;
        Ok(())
    }
}
