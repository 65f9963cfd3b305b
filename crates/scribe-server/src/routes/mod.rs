// Export route modules
pub mod chat;
pub mod health;
pub mod server_agent;
pub mod stream;
pub mod workflows;

use axum::{http::StatusCode, middleware, Router};
use std::fmt::Display;

use crate::rate_limit::limit_requests;
use crate::state::AppState;

pub type RouteError = (StatusCode, String);

/// Log a failure and report it to the client as a plain text 500
pub fn internal_error(context: &str, err: impl Display) -> RouteError {
    tracing::error!("{}: {}", context, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("{}: {}", context, err),
    )
}

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    let mut api = Router::new()
        .merge(chat::routes(state.clone()))
        .merge(server_agent::routes(state.clone()))
        .merge(workflows::routes(state.clone()));

    if let Some(limiter) = state.limiter.clone() {
        api = api.route_layer(middleware::from_fn_with_state(limiter, limit_requests));
    }

    Router::new().merge(health::routes()).merge(api)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, Response};
    use scribe::providers::configs::{OpenAiProviderConfig, ProviderConfig};
    use serde_json::{json, Value};
    use wiremock::MockServer;

    use crate::configuration::CloudSettings;
    use crate::state::AppState;

    pub fn provider_config(server: &MockServer) -> ProviderConfig {
        ProviderConfig::OpenAi(OpenAiProviderConfig {
            host: server.uri(),
            api_key: "test-key".to_string(),
            model: "gpt-5-mini".to_string(),
            temperature: None,
            max_tokens: None,
            reasoning_effort: None,
        })
    }

    pub fn test_state(server: &MockServer) -> AppState {
        AppState::new(provider_config(server), CloudSettings::default())
    }

    pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// A chat completion answering with plain text
    pub fn completion(text: &str) -> Value {
        json!({
            "choices": [{
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    /// Streamed chat completion chunks as an event stream body
    pub fn sse_body(chunks: &[Value]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str(&format!("data: {}\n\n", chunk));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }
}
