mod cloud;
mod prompt;
mod session;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scribe::bridge::session::DEFAULT_MAX_ROUND_TRIPS;
use scribe::cloud::{mint_token, AiTokenClaims};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use cloud::CloudArgs;
use session::{Session, SessionOptions};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with a running scribed, executing requested tools against a document
    Chat {
        /// Base url of the scribed server
        #[arg(long, env = "SCRIBE_SERVER_URL", default_value = "http://127.0.0.1:8000")]
        server: String,

        #[arg(short, long, value_enum, default_value = "chat")]
        endpoint: Endpoint,

        /// Document the tools read and edit
        #[arg(short, long)]
        document_id: Option<String>,

        /// Keeps the active node range between requests on server agent routes
        #[arg(long)]
        conversation_id: Option<String>,

        /// JSON file describing the document schema
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Ask before keeping each document change
        #[arg(long)]
        review: bool,

        #[arg(long, default_value_t = DEFAULT_MAX_ROUND_TRIPS)]
        max_round_trips: usize,

        #[command(flatten)]
        cloud: CloudArgs,
    },

    /// Print a signed AI toolkit token
    Token {
        /// Grant access to the document service, as the comment tools need
        #[arg(long)]
        documents: bool,

        #[command(flatten)]
        cloud: CloudArgs,
    },

    /// Print a document as JSON
    Document {
        document_id: String,

        #[command(flatten)]
        cloud: CloudArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
    Chat,
    MultiDocument,
    SchemaAwareness,
    SelectionAwareness,
    Comments,
    ServerAgent,
    ServerComments,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::Chat => "/api/chat",
            Endpoint::MultiDocument => "/api/multi-document",
            Endpoint::SchemaAwareness => "/api/schema-awareness",
            Endpoint::SelectionAwareness => "/api/selection-awareness",
            Endpoint::Comments => "/api/comments",
            Endpoint::ServerAgent => "/api/server-agent",
            Endpoint::ServerComments => "/api/server-comments",
        }
    }
}

fn read_schema(path: Option<&PathBuf>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Null);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Chat {
            server,
            endpoint,
            document_id,
            conversation_id,
            schema,
            review,
            max_round_trips,
            cloud,
        } => {
            let options = SessionOptions {
                url: format!("{}{}", server.trim_end_matches('/'), endpoint.path()),
                document_id,
                conversation_id,
                schema_awareness_data: read_schema(schema.as_ref())?,
                review,
                max_round_trips,
            };
            let executor = session::executor(&cloud, &options)?;
            let bridge = session::bridge(executor, &options)?;
            Session::new(bridge).start().await?;
        }
        Command::Token { documents, cloud } => {
            let claims = if documents {
                cloud.document_claims()?
            } else {
                AiTokenClaims::empty()
            };
            let secret = cloud.ai_secret.as_deref().context("--ai-secret is required")?;
            println!("{}", mint_token(secret, &claims)?);
        }
        Command::Document { document_id, cloud } => {
            let document = cloud.documents()?.get(&document_id).await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_chat_command() {
        let cli = Cli::parse_from([
            "scribe",
            "chat",
            "--endpoint",
            "server-comments",
            "--document-id",
            "doc-1",
            "--review",
        ]);
        let Command::Chat {
            endpoint,
            document_id,
            review,
            max_round_trips,
            ..
        } = cli.command
        else {
            panic!("expected the chat command");
        };
        assert_eq!(endpoint.path(), "/api/server-comments");
        assert_eq!(document_id.as_deref(), Some("doc-1"));
        assert!(review);
        assert_eq!(max_round_trips, DEFAULT_MAX_ROUND_TRIPS);
    }

    #[test]
    fn test_schema_file() {
        assert_eq!(read_schema(None).unwrap(), Value::Null);
        assert!(read_schema(Some(&PathBuf::from("/nonexistent/schema.json"))).is_err());
    }
}
