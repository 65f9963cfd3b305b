//! Clients for the hosted editor services: the AI toolkit API, the document REST
//! API of the collaboration service, and the tokens both expect.

pub mod documents;
pub mod jwt;
pub mod toolkit;

use thiserror::Error;

use crate::errors::AgentError;

pub use documents::{DocumentClient, UpdateOutcome};
pub use jwt::{mint_token, AiTokenClaims};
pub use toolkit::{CommentsOptions, ExecuteToolRequest, ExecuteToolResponse, ToolSelection, ToolkitClient};

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Missing {0}")]
    MissingConfig(String),

    #[error("Document {0} not found")]
    NotFound(String),

    #[error("{context}: {status}")]
    Status { context: String, status: u16 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Failed to sign token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl From<CloudError> for AgentError {
    fn from(err: CloudError) -> Self {
        AgentError::ExecutionError(err.to_string())
    }
}
