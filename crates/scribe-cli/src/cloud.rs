use anyhow::{Context, Result};
use clap::Args;
use scribe::cloud::toolkit::{DEFAULT_API_URL, DEFAULT_ORIGIN};
use scribe::cloud::{AiTokenClaims, DocumentClient, ToolkitClient};

/// Credentials for the hosted editor services, shared with `scribed`
#[derive(Args, Debug, Clone, Default)]
pub struct CloudArgs {
    /// AI toolkit app id
    #[arg(long, env = "SCRIBE_CLOUD__AI_APP_ID")]
    pub ai_app_id: Option<String>,

    /// Secret used to sign AI toolkit tokens
    #[arg(long, env = "SCRIBE_CLOUD__AI_SECRET", hide_env_values = true)]
    pub ai_secret: Option<String>,

    #[arg(long, env = "SCRIBE_CLOUD__AI_API_URL", default_value = DEFAULT_API_URL)]
    pub ai_api_url: String,

    /// Origin sent to the AI toolkit, it must be allowed for the app
    #[arg(long, env = "SCRIBE_CLOUD__ORIGIN", default_value = DEFAULT_ORIGIN)]
    pub origin: String,

    /// Collaboration app id
    #[arg(long, env = "SCRIBE_CLOUD__APP_ID")]
    pub app_id: Option<String>,

    /// Document management API secret
    #[arg(long, env = "SCRIBE_CLOUD__DOCUMENT_SECRET", hide_env_values = true)]
    pub document_secret: Option<String>,

    /// Overrides the collaboration host derived from the app id
    #[arg(long, env = "SCRIBE_CLOUD__COLLAB_BASE_URL")]
    pub collab_base_url: Option<String>,
}

fn required<'a>(value: &'a Option<String>, flag: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("--{} is required", flag))
}

impl CloudArgs {
    /// Whether tools can be executed against a remote document
    pub fn has_toolkit(&self) -> bool {
        self.ai_app_id.is_some() && self.ai_secret.is_some() && self.document_secret.is_some()
    }

    pub fn document_claims(&self) -> Result<AiTokenClaims> {
        Ok(AiTokenClaims::for_documents(
            required(&self.app_id, "app-id")?,
            required(&self.document_secret, "document-secret")?,
        ))
    }

    pub fn toolkit(&self, claims: AiTokenClaims) -> Result<ToolkitClient> {
        let app_id = required(&self.ai_app_id, "ai-app-id")?;
        let secret = required(&self.ai_secret, "ai-secret")?;
        Ok(ToolkitClient::new(&self.ai_api_url, app_id, secret)?
            .with_origin(&self.origin)
            .with_claims(claims))
    }

    pub fn documents(&self) -> Result<DocumentClient> {
        let secret = required(&self.document_secret, "document-secret")?;
        let base_url = match &self.collab_base_url {
            Some(url) => url.clone(),
            None => DocumentClient::default_base_url(required(&self.app_id, "app-id")?),
        };
        Ok(DocumentClient::new(base_url, secret)?)
    }
}
