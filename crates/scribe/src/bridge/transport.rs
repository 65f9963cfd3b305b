use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::BridgeError;
use crate::models::message::Message;

pub type ByteStream = BoxStream<'static, Result<Bytes, BridgeError>>;

/// Sends the full message list and returns the streamed response body
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, messages: &[Message]) -> Result<ByteStream, BridgeError>;
}

/// Posts `{ "messages": [...] }` plus any extra fields to a chat route
pub struct HttpTransport {
    client: Client,
    url: String,
    fields: Map<String, Value>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            fields: Map::new(),
        })
    }

    /// Extra body field sent with every request, e.g. `documentId`
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, messages: &[Message]) -> Result<ByteStream, BridgeError> {
        let mut body = self.fields.clone();
        body.insert("messages".to_string(), json!(messages));

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BridgeError::Transport(e.to_string())))
            .boxed())
    }
}
