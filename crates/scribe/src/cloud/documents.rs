use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::CloudError;

/// Result of a best effort document update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The document did not exist and was created
    Created,
    Failed,
}

/// REST client for documents stored in the collaboration service
#[derive(Debug, Clone)]
pub struct DocumentClient {
    client: Client,
    base_url: String,
    secret: String,
}

impl DocumentClient {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Result<Self, CloudError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(CloudError::MissingConfig(
                "document management API secret".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        })
    }

    /// The default collaboration host for an app id
    pub fn default_base_url(app_id: &str) -> String {
        format!("https://{}.collab.tiptap.cloud", app_id)
    }

    fn document_url(&self, document_id: &str) -> String {
        format!(
            "{}/api/documents/{}?format=json",
            self.base_url,
            urlencoding::encode(document_id)
        )
    }

    pub async fn get(&self, document_id: &str) -> Result<Value, CloudError> {
        let response = self
            .client
            .get(self.document_url(document_id))
            .header("Authorization", &self.secret)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(CloudError::NotFound(document_id.to_string())),
            status => Err(CloudError::Status {
                context: "Failed to retrieve document".to_string(),
                status: status.as_u16(),
            }),
        }
    }

    /// PATCH the document, creating it with a single POST when it does not exist.
    /// Failures are logged, never retried.
    pub async fn update(&self, document_id: &str, document: &Value) -> UpdateOutcome {
        let url = self.document_url(document_id);

        let response = match self
            .client
            .patch(&url)
            .header("Authorization", &self.secret)
            .json(document)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Error updating document {}: {}", document_id, e);
                return UpdateOutcome::Failed;
            }
        };

        match response.status() {
            status if status.is_success() => UpdateOutcome::Updated,
            StatusCode::NOT_FOUND => self.create(&url, document_id, document).await,
            status => {
                tracing::error!("Failed to update document {}: {}", document_id, status);
                UpdateOutcome::Failed
            }
        }
    }

    async fn create(&self, url: &str, document_id: &str, document: &Value) -> UpdateOutcome {
        match self
            .client
            .post(url)
            .header("Authorization", &self.secret)
            .json(document)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Created document {}", document_id);
                UpdateOutcome::Created
            }
            Ok(response) => {
                tracing::error!(
                    "Failed to create document {}: {}",
                    document_id,
                    response.status()
                );
                UpdateOutcome::Failed
            }
            Err(e) => {
                tracing::error!("Error creating document {}: {}", document_id, e);
                UpdateOutcome::Failed
            }
        }
    }
}
