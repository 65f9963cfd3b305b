use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a settings path like `provider.api_key` to its environment variable
pub fn to_env_var(field_path: &str) -> String {
    let path = field_path
        .split('.')
        .map(|segment| segment.to_uppercase())
        .collect::<Vec<_>>()
        .join("__");
    format!("SCRIBE_{}", path)
}
