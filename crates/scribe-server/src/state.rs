use async_trait::async_trait;
use scribe::providers::base::Provider;
use scribe::providers::configs::ProviderConfig;
use scribe::providers::factory;
use scribe::tools::NodeRangeCache;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::configuration::CloudSettings;
use crate::rate_limit::RateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider_config: ProviderConfig,
    pub cloud: Arc<CloudSettings>,
    pub limiter: Option<Arc<dyn RateLimiter>>,
    pub cursors: CursorStore,
}

impl AppState {
    pub fn new(provider_config: ProviderConfig, cloud: CloudSettings) -> Self {
        Self {
            provider_config,
            cloud: Arc::new(cloud),
            limiter: None,
            cursors: CursorStore::default(),
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn provider(&self) -> anyhow::Result<Arc<dyn Provider>> {
        factory::get_provider(self.provider_config.clone())
    }

    /// The configured provider with the lowest reasoning effort, for quick rewrites
    pub fn fast_provider(&self) -> anyhow::Result<Arc<dyn Provider>> {
        let config = match &self.provider_config {
            ProviderConfig::OpenAi(config) => {
                let mut config = config.clone();
                config.reasoning_effort = Some("minimal".to_string());
                ProviderConfig::OpenAi(config)
            }
            other => other.clone(),
        };
        factory::get_provider(config)
    }
}

/// Active node ranges returned by the toolkit, one per conversation
#[derive(Clone, Default)]
pub struct CursorStore {
    ranges: Arc<RwLock<HashMap<String, Value>>>,
}

impl CursorStore {
    pub fn for_conversation(&self, conversation_id: impl Into<String>) -> Arc<ConversationCursor> {
        Arc::new(ConversationCursor {
            conversation_id: conversation_id.into(),
            ranges: self.ranges.clone(),
        })
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Value> {
        self.ranges.read().await.get(conversation_id).cloned()
    }
}

pub struct ConversationCursor {
    conversation_id: String,
    ranges: Arc<RwLock<HashMap<String, Value>>>,
}

#[async_trait]
impl NodeRangeCache for ConversationCursor {
    async fn get(&self) -> Option<Value> {
        self.ranges.read().await.get(&self.conversation_id).cloned()
    }

    async fn set(&self, range: Option<Value>) {
        let mut ranges = self.ranges.write().await;
        match range {
            Some(range) => {
                ranges.insert(self.conversation_id.clone(), range);
            }
            None => {
                ranges.remove(&self.conversation_id);
            }
        }
    }
}
