use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::CloudError;

/// Tokens are valid for one hour
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Claims for the AI toolkit token. Comment tools also need access to the document
/// service, which is granted through the two experimental claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiTokenClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental_document_app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental_document_secret: Option<String>,
}

impl AiTokenClaims {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_documents(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            experimental_document_app_id: Some(app_id.into()),
            experimental_document_secret: Some(secret.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SignedClaims {
    #[serde(flatten)]
    claims: AiTokenClaims,
    iat: i64,
    exp: i64,
}

/// Sign an HS256 token carrying `claims`, issued now and expiring in an hour
pub fn mint_token(secret: &str, claims: &AiTokenClaims) -> Result<String, CloudError> {
    if secret.is_empty() {
        return Err(CloudError::MissingConfig("AI secret".to_string()));
    }

    let iat = Utc::now().timestamp();
    let signed = SignedClaims {
        claims: claims.clone(),
        iat,
        exp: iat + TOKEN_TTL_SECS,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &signed,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    tracing::debug!(exp = signed.exp, "Minted AI toolkit token");
    Ok(token)
}
