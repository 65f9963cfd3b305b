use std::io::{self, Write};

use anyhow::Result;
use async_trait::async_trait;
use cliclack::{input, select};
use console::style;
use scribe::bridge::{BridgeObserver, ReviewDecision, Reviewer, ToolOutcome};
use scribe::models::tool::{ToolCall, ToolResult};
use serde_json::Value;

pub enum InputType {
    Message(String),
    AcceptAll,
    RejectAll,
    Exit,
}

pub fn print_help() {
    println!("Commands:");
    println!("/accept - Keep the change under review");
    println!("/reject - Discard the change under review");
    println!("/exit - Exit the session");
    println!("/? - Display this help message");
}

/// Read the next line, handling the slash commands
pub fn get_input() -> Result<InputType> {
    loop {
        let message_text: String = input("Scribe:").placeholder("").interact()?;
        let message_text = message_text.trim();

        if message_text.eq_ignore_ascii_case("/exit") || message_text.eq_ignore_ascii_case("exit") {
            return Ok(InputType::Exit);
        } else if message_text.eq_ignore_ascii_case("/accept") {
            return Ok(InputType::AcceptAll);
        } else if message_text.eq_ignore_ascii_case("/reject") {
            return Ok(InputType::RejectAll);
        } else if message_text.eq_ignore_ascii_case("/?") {
            print_help();
        } else if !message_text.is_empty() {
            return Ok(InputType::Message(message_text.to_string()));
        }
    }
}

fn pretty(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Prints bridge activity as it streams in
pub struct ConsoleObserver;

impl BridgeObserver for ConsoleObserver {
    fn on_text(&self, delta: &str) {
        print!("{}", delta);
        let _ = io::stdout().flush();
    }

    fn on_tool_call(&self, call: &ToolCall) {
        println!();
        println!(
            "{} {}",
            style("Tool Request:").cyan().bold(),
            style(&call.tool_name).cyan()
        );
        println!("{}", style(pretty(&call.input)).dim());
    }

    fn on_tool_result(&self, result: &ToolResult) {
        println!("{}", style("Tool Response:").green().bold());
        println!("{}", style(pretty(&result.output)).dim());
    }

    fn on_error(&self, error: &str) {
        eprintln!("{} {}", style("Error:").red().bold(), error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Accept,
    Reject,
    Later,
}

/// Asks in the terminal whether a document change is kept
pub struct CliclackReviewer;

#[async_trait]
impl Reviewer for CliclackReviewer {
    async fn review(&self, call: &ToolCall, outcome: &ToolOutcome) -> ReviewDecision {
        println!();
        println!(
            "{} {}",
            style("Proposed change from").yellow(),
            style(&call.tool_name).yellow().bold()
        );
        println!("{}", pretty(&outcome.output));

        let choice = tokio::task::spawn_blocking(|| {
            select("Keep this change?")
                .item(Choice::Accept, "Accept", "save the document")
                .item(Choice::Reject, "Reject", "discard the change")
                .item(Choice::Later, "Decide later", "/accept or /reject")
                .interact()
        })
        .await;

        match choice {
            Ok(Ok(Choice::Accept)) => ReviewDecision::Accept(Vec::new()),
            Ok(Ok(Choice::Reject)) => ReviewDecision::Reject(Vec::new()),
            Ok(Ok(Choice::Later)) => ReviewDecision::Defer,
            Ok(Err(e)) => {
                tracing::warn!("Review prompt failed, leaving the change open: {}", e);
                ReviewDecision::Defer
            }
            Err(e) => {
                tracing::warn!("Review prompt panicked, leaving the change open: {}", e);
                ReviewDecision::Defer
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pretty_prints_strings_raw() {
        assert_eq!(pretty(&json!("<p>Hi</p>")), "<p>Hi</p>");
        assert_eq!(pretty(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    }
}
