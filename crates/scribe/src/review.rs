//! Human review of document-changing tool calls.
//!
//! While a review is open the conversation is frozen: no user message may be sent
//! until every change is accepted or rejected, and the originating tool call receives
//! exactly one result describing the outcome.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const REJECTED_OUTPUT: &str = "The changes were rejected";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewError {
    #[error("A review is already in progress for tool call {0}")]
    AlreadyReviewing(String),
    #[error("No review is in progress")]
    NotReviewing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Accepted,
    Rejected,
}

/// One accept/reject decision on an individual suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionFeedback {
    pub suggestion_id: String,
    pub action: FeedbackAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SuggestionFeedback {
    pub fn accepted<S: Into<String>>(suggestion_id: S) -> Self {
        Self {
            suggestion_id: suggestion_id.into(),
            action: FeedbackAction::Accepted,
            text: None,
        }
    }

    pub fn rejected<S: Into<String>>(suggestion_id: S) -> Self {
        Self {
            suggestion_id: suggestion_id.into(),
            action: FeedbackAction::Rejected,
            text: None,
        }
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingReview {
    pub tool_name: String,
    pub tool_call_id: String,
    pub output: Value,
    pub feedback: Vec<SuggestionFeedback>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ReviewState {
    #[default]
    Idle,
    Reviewing(PendingReview),
}

/// The single tool result produced when a review closes
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResolution {
    pub tool_name: String,
    pub tool_call_id: String,
    pub accepted: bool,
    pub output: Value,
}

#[derive(Debug, Default)]
pub struct ReviewGate {
    state: ReviewState,
}

impl ReviewGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ReviewState {
        &self.state
    }

    pub fn is_reviewing(&self) -> bool {
        matches!(self.state, ReviewState::Reviewing(_))
    }

    /// User messages are only allowed outside of a review
    pub fn can_send(&self) -> bool {
        !self.is_reviewing()
    }

    pub fn begin(
        &mut self,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        output: Value,
    ) -> Result<(), ReviewError> {
        if let ReviewState::Reviewing(pending) = &self.state {
            return Err(ReviewError::AlreadyReviewing(pending.tool_call_id.clone()));
        }
        self.state = ReviewState::Reviewing(PendingReview {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            output,
            feedback: Vec::new(),
        });
        Ok(())
    }

    pub fn record_feedback(&mut self, feedback: SuggestionFeedback) -> Result<(), ReviewError> {
        match &mut self.state {
            ReviewState::Reviewing(pending) => {
                pending.feedback.push(feedback);
                Ok(())
            }
            ReviewState::Idle => Err(ReviewError::NotReviewing),
        }
    }

    pub fn accept_all(&mut self) -> Result<ToolResolution, ReviewError> {
        self.resolve(true)
    }

    pub fn reject_all(&mut self) -> Result<ToolResolution, ReviewError> {
        self.resolve(false)
    }

    fn resolve(&mut self, accepted: bool) -> Result<ToolResolution, ReviewError> {
        let pending = match std::mem::take(&mut self.state) {
            ReviewState::Reviewing(pending) => pending,
            ReviewState::Idle => return Err(ReviewError::NotReviewing),
        };

        let base = if accepted {
            pending.output
        } else {
            json!(REJECTED_OUTPUT)
        };
        let output = if pending.feedback.is_empty() {
            base
        } else {
            json!({
                "output": base,
                "userFeedback": pending.feedback,
            })
        };

        Ok(ToolResolution {
            tool_name: pending.tool_name,
            tool_call_id: pending.tool_call_id,
            accepted,
            output,
        })
    }
}
