use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use scribe::agent::{Agent, AgentEvent};
use scribe::bridge::{encode_frame, Frame};
use scribe::models::message::Message;
use scribe::providers::base::{Provider, ProviderEvent};
use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

const HEARTBEAT: Duration = Duration::from_millis(500);

/// Response body fed from a spawned task through a channel
pub struct StreamResponse {
    rx: ReceiverStream<String>,
    content_type: &'static str,
}

impl StreamResponse {
    /// `data:` frames of the chat wire format
    pub fn event_stream(rx: ReceiverStream<String>) -> Self {
        Self {
            rx,
            content_type: "text/event-stream",
        }
    }

    pub fn text(rx: ReceiverStream<String>) -> Self {
        Self {
            rx,
            content_type: "text/plain; charset=utf-8",
        }
    }
}

impl Stream for StreamResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for StreamResponse {
    fn into_response(self) -> Response {
        let content_type = self.content_type;
        let mut response = Response::new(Body::from_stream(self));

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        response
    }
}

/// Frames sent to the client for one agent event
fn event_frames(event: AgentEvent) -> Vec<Frame> {
    match event {
        AgentEvent::TextDelta(text) => vec![Frame::text(text)],
        AgentEvent::ToolCall {
            call,
            client_side: true,
        } => vec![Frame::function_call(
            call.tool_name,
            call.tool_call_id,
            &call.input,
        )],
        AgentEvent::ToolCall { call, .. } => vec![Frame::executed_call(
            call.tool_name,
            call.tool_call_id,
            &call.input,
        )],
        AgentEvent::ToolResult(result) => vec![Frame::FunctionCallOutput {
            call_id: result.tool_call_id,
            output: result.output,
        }],
        AgentEvent::Finish { reason, .. } => vec![Frame::Finish {
            finish_reason: Some(reason),
        }],
    }
}

/// Run the agent in a spawned task and stream its events as frames. The task stops
/// as soon as the client goes away, which also abandons any running tool.
pub fn stream_reply(agent: Agent, messages: Vec<Message>) -> StreamResponse {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let mut stream = match agent.reply(&messages).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to start reply stream: {}", e);
                let _ = tx.send(encode_frame(&Frame::Error(e.to_string()))).await;
                let _ = tx.send(encode_frame(&Frame::Done)).await;
                return;
            }
        };

        loop {
            match timeout(HEARTBEAT, stream.next()).await {
                Ok(Some(Ok(event))) => {
                    for frame in event_frames(event) {
                        if tx.send(encode_frame(&frame)).await.is_err() {
                            tracing::debug!("Client disconnected");
                            return;
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Error processing reply: {}", e);
                    let _ = tx.send(encode_frame(&Frame::Error(e.to_string()))).await;
                    break;
                }
                Ok(None) => break,
                // Heartbeat, used to detect disconnected clients and then end running tools
                Err(_) => {
                    if tx.is_closed() {
                        return;
                    }
                }
            }
        }

        let _ = tx.send(encode_frame(&Frame::Done)).await;
    });

    StreamResponse::event_stream(ReceiverStream::new(rx))
}

/// Stream the plain text of a single completion without tools
pub fn stream_text(provider: Arc<dyn Provider>, system: String, messages: Vec<Message>) -> StreamResponse {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let mut stream = match provider.stream(&system, &messages, &[]).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to start text stream: {}", e);
                return;
            }
        };

        while let Some(event) = stream.next().await {
            match event {
                Ok(ProviderEvent::TextDelta(text)) => {
                    if tx.send(text).await.is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Error streaming text: {}", e);
                    return;
                }
            }
        }
    });

    StreamResponse::text(ReceiverStream::new(rx))
}
