use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use scribe::cloud::toolkit::{DEFAULT_API_URL, DEFAULT_ORIGIN};
use scribe::cloud::{AiTokenClaims, CloudError, DocumentClient, ToolkitClient};
use scribe::providers::configs::{AnthropicProviderConfig, OpenAiProviderConfig, ProviderConfig};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
        #[serde(default)]
        reasoning_effort: Option<String>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                reasoning_effort,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                reasoning_effort,
            }),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rate_limit")]
    pub limit: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// REST endpoint of the hosted key-value store, in-memory limiting when unset
    #[serde(default)]
    pub store_url: Option<String>,
    #[serde(default)]
    pub store_token: Option<String>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: default_rate_limit(),
            window_secs: default_window_secs(),
            store_url: None,
            store_token: None,
        }
    }
}

/// Credentials for the hosted toolkit and the document service. Everything is
/// optional at startup, routes that need a value fail when it is missing.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudSettings {
    #[serde(default)]
    pub ai_app_id: Option<String>,
    #[serde(default)]
    pub ai_secret: Option<String>,
    #[serde(default = "default_ai_api_url")]
    pub ai_api_url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub document_secret: Option<String>,
    #[serde(default)]
    pub collab_base_url: Option<String>,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            ai_app_id: None,
            ai_secret: None,
            ai_api_url: default_ai_api_url(),
            origin: default_origin(),
            app_id: None,
            document_secret: None,
            collab_base_url: None,
        }
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, CloudError> {
    match value.as_deref() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(CloudError::MissingConfig(to_env_var(&format!("cloud.{}", field)))),
    }
}

impl CloudSettings {
    pub fn toolkit(&self, claims: AiTokenClaims) -> Result<ToolkitClient, CloudError> {
        let app_id = required(&self.ai_app_id, "ai_app_id")?;
        let secret = required(&self.ai_secret, "ai_secret")?;
        Ok(ToolkitClient::new(&self.ai_api_url, app_id, secret)?
            .with_origin(&self.origin)
            .with_claims(claims))
    }

    pub fn documents(&self) -> Result<DocumentClient, CloudError> {
        let secret = required(&self.document_secret, "document_secret")?;
        let base_url = match &self.collab_base_url {
            Some(url) => url.clone(),
            None => DocumentClient::default_base_url(required(&self.app_id, "app_id")?),
        };
        DocumentClient::new(base_url, secret)
    }

    /// Claims that let the comment tools write through the document service
    pub fn document_claims(&self) -> Result<AiTokenClaims, CloudError> {
        let app_id = required(&self.app_id, "app_id")?;
        let secret = required(&self.document_secret, "document_secret")?;
        Ok(AiTokenClaims::for_documents(app_id, secret))
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub cloud: CloudSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.type", "openai")?
            .set_default("rate_limit.enabled", false)?
            .set_default("rate_limit.limit", default_rate_limit() as i64)?
            .set_default("rate_limit.window_secs", default_window_secs())?
            .set_default("cloud.ai_api_url", default_ai_api_url())?
            .set_default("cloud.origin", default_origin())?
            .add_source(
                Environment::with_prefix("SCRIBE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&missing_field_path(&error_str)),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// "missing field `api_key` for key `provider`" becomes `provider.api_key`.
/// Only the provider section has required fields, so a bare field name belongs to it.
fn missing_field_path(message: &str) -> String {
    let quoted: Vec<&str> = message.split('`').skip(1).step_by(2).collect();
    match quoted.as_slice() {
        [field, key, ..] => format!("{}.{}", key, field),
        [field] => format!("provider.{}", field),
        [] => "provider".to_string(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_anthropic_host() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_rate_limit() -> usize {
    15
}

fn default_window_secs() -> u64 {
    60
}

fn default_ai_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("SCRIBE_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("SCRIBE_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8000);
        assert!(!settings.rate_limit.enabled);
        assert_eq!(settings.rate_limit.limit, 15);
        assert_eq!(settings.rate_limit.window_secs, 60);
        assert_eq!(settings.cloud.ai_api_url, DEFAULT_API_URL);
        assert_eq!(settings.cloud.origin, DEFAULT_ORIGIN);
        assert_eq!(settings.cloud.ai_app_id, None);

        if let ProviderSettings::OpenAi {
            host,
            api_key,
            model,
            temperature,
            reasoning_effort,
            ..
        } = settings.provider
        {
            assert_eq!(host, "https://api.openai.com");
            assert_eq!(api_key, "test-key");
            assert_eq!(model, "gpt-5-mini");
            assert_eq!(temperature, None);
            assert_eq!(reasoning_effort, None);
        } else {
            panic!("Expected OpenAI provider");
        }

        env::remove_var("SCRIBE_PROVIDER__API_KEY");
    }

    #[test]
    #[serial]
    fn test_anthropic_settings() {
        clean_env();
        env::set_var("SCRIBE_PROVIDER__TYPE", "anthropic");
        env::set_var("SCRIBE_PROVIDER__API_KEY", "test-key");
        env::set_var("SCRIBE_PROVIDER__MAX_TOKENS", "2000");

        let settings = Settings::new().unwrap();
        if let ProviderSettings::Anthropic {
            host,
            model,
            max_tokens,
            ..
        } = settings.provider
        {
            assert_eq!(host, "https://api.anthropic.com");
            assert_eq!(model, "claude-sonnet-4-5");
            assert_eq!(max_tokens, Some(2000));
        } else {
            panic!("Expected Anthropic provider");
        }

        env::remove_var("SCRIBE_PROVIDER__TYPE");
        env::remove_var("SCRIBE_PROVIDER__API_KEY");
        env::remove_var("SCRIBE_PROVIDER__MAX_TOKENS");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("SCRIBE_SERVER__PORT", "8080");
        env::set_var("SCRIBE_PROVIDER__API_KEY", "test-key");
        env::set_var("SCRIBE_PROVIDER__MODEL", "gpt-4o-mini");
        env::set_var("SCRIBE_PROVIDER__REASONING_EFFORT", "minimal");
        env::set_var("SCRIBE_RATE_LIMIT__ENABLED", "true");
        env::set_var("SCRIBE_RATE_LIMIT__LIMIT", "5");
        env::set_var("SCRIBE_CLOUD__AI_APP_ID", "app-1");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert!(settings.rate_limit.enabled);
        assert_eq!(settings.rate_limit.limit, 5);
        assert_eq!(settings.cloud.ai_app_id.as_deref(), Some("app-1"));

        if let ProviderSettings::OpenAi {
            model,
            reasoning_effort,
            ..
        } = settings.provider
        {
            assert_eq!(model, "gpt-4o-mini");
            assert_eq!(reasoning_effort.as_deref(), Some("minimal"));
        } else {
            panic!("Expected OpenAI provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();

        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "SCRIBE_PROVIDER__API_KEY")
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_field_path() {
        assert_eq!(
            missing_field_path("missing field `api_key` for key `provider`"),
            "provider.api_key"
        );
        assert_eq!(missing_field_path("missing field `api_key`"), "provider.api_key");
    }

    #[test]
    fn test_cloud_clients_require_credentials() {
        let cloud = CloudSettings::default();
        match cloud.toolkit(AiTokenClaims::empty()) {
            Err(CloudError::MissingConfig(name)) => assert_eq!(name, "SCRIBE_CLOUD__AI_APP_ID"),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }

        let cloud = CloudSettings {
            document_secret: Some("doc-secret".to_string()),
            app_id: Some("cloud-app".to_string()),
            ..CloudSettings::default()
        };
        assert!(cloud.documents().is_ok());
        assert!(cloud.document_claims().is_ok());
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
