//! Sliding window rate limiting keyed by client IP.

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::configuration::RateLimitSettings;

pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const DEFAULT_CLIENT_IP: &str = "127.0.0.1";
const KEY_PREFIX: &str = "@upstash/ratelimit";

/// Headers checked for the client address, most specific proxy header first
const CLIENT_IP_HEADERS: [&str; 5] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "cf-connecting-ip",
    "x-cluster-client-ip",
];

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record a request from `key`, false when it exceeds the limit
    async fn check(&self, key: &str) -> bool;
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Exact sliding log per key, kept in process memory
pub struct InMemoryRateLimiter {
    limit: usize,
    window_ms: u64,
    clock: Arc<dyn Clock>,
    requests: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl InMemoryRateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::with_clock(limit, window, Arc::new(SystemClock))
    }

    pub fn with_clock(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window_ms: window.as_millis() as u64,
            clock,
            requests: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let mut requests = self.requests.lock().await;
        let log = requests.entry(key.to_string()).or_default();

        while let Some(&oldest) = log.front() {
            if oldest + self.window_ms <= now {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() < self.limit {
            log.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Sliding log in a hosted key-value store, one sorted set per client
/// driven through the store's REST pipeline endpoint
pub struct UpstashRateLimiter {
    client: reqwest::Client,
    url: String,
    token: String,
    limit: usize,
    window_ms: u64,
    clock: Arc<dyn Clock>,
}

impl UpstashRateLimiter {
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        limit: usize,
        window: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            limit,
            window_ms: window.as_millis() as u64,
            clock: Arc::new(SystemClock),
        }
    }

    async fn pipeline(&self, commands: Value) -> anyhow::Result<Vec<Value>> {
        let response = self
            .client
            .post(format!("{}/pipeline", self.url))
            .bearer_auth(&self.token)
            .json(&commands)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("rate limit store returned {}", status);
        }

        let results: Vec<Value> = response.json().await?;
        results
            .into_iter()
            .map(|entry| match entry.get("error") {
                Some(error) => Err(anyhow::anyhow!("rate limit store error: {}", error)),
                None => Ok(entry.get("result").cloned().unwrap_or(Value::Null)),
            })
            .collect()
    }

    async fn try_check(&self, key: &str) -> anyhow::Result<bool> {
        let now = self.clock.now_millis();
        let set = format!("{}:{}", KEY_PREFIX, key);
        let window_start = now.saturating_sub(self.window_ms);

        let results = self
            .pipeline(json!([
                ["ZREMRANGEBYSCORE", set, "0", window_start.to_string()],
                ["ZCARD", set],
            ]))
            .await?;
        let count = results.get(1).and_then(Value::as_u64).unwrap_or(0) as usize;
        if count >= self.limit {
            return Ok(false);
        }

        let member = format!("{}:{}", now, uuid::Uuid::new_v4());
        self.pipeline(json!([
            ["ZADD", set, now.to_string(), member],
            ["PEXPIRE", set, self.window_ms.to_string()],
        ]))
        .await?;
        Ok(true)
    }
}

#[async_trait]
impl RateLimiter for UpstashRateLimiter {
    async fn check(&self, key: &str) -> bool {
        match self.try_check(key).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!("Rate limit check failed, allowing request: {}", e);
                true
            }
        }
    }
}

/// Build the limiter described by the settings, `None` when limiting is disabled
pub fn from_settings(settings: &RateLimitSettings) -> Option<Arc<dyn RateLimiter>> {
    if !settings.enabled {
        return None;
    }

    let window = Duration::from_secs(settings.window_secs);
    match (&settings.store_url, &settings.store_token) {
        (Some(url), Some(token)) => {
            tracing::info!("Rate limiting {} requests per {:?} via {}", settings.limit, window, url);
            Some(Arc::new(UpstashRateLimiter::new(url, token, settings.limit, window)))
        }
        _ => {
            tracing::info!("Rate limiting {} requests per {:?} in memory", settings.limit, window);
            Some(Arc::new(InMemoryRateLimiter::new(settings.limit, window)))
        }
    }
}

pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for name in CLIENT_IP_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = value {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| DEFAULT_CLIENT_IP.to_string())
}

pub fn rate_limited() -> Response {
    let mut response = (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain"),
    );
    response
}

/// Middleware rejecting requests over the limit with a plain text 429
pub async fn limit_requests(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer);

    if !limiter.check(&ip).await {
        tracing::warn!("Rate limit exceeded for {}", ip);
        return rate_limited();
    }
    next.run(request).await
}
