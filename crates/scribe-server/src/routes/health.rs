use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

async fn status() -> Json<Value> {
    Json(json!({
        "message": "Scribe Chat API",
        "status": "running"
    }))
}

pub fn routes() -> Router {
    Router::new().route("/", get(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::body_text;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_status() {
        let response = routes()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({"message": "Scribe Chat API", "status": "running"}));
    }
}
