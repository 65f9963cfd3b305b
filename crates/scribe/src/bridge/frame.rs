use serde_json::{json, Map, Value};

use crate::providers::utils;
use crate::sse::{self, SseDecoder, SseEvent, DONE_SENTINEL};

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

/// One decoded payload of the chat wire format
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Bare JSON string, appended to the open assistant message
    Text(String),
    FunctionCall {
        name: String,
        call_id: String,
        /// JSON-encoded string or an already parsed object
        arguments: Value,
        status: Option<String>,
    },
    /// Result of a tool the server executed itself
    FunctionCallOutput { call_id: String, output: Value },
    Error(String),
    Finish { finish_reason: Option<String> },
    /// Unrecognised object payload
    Other(Value),
    Done,
}

impl Frame {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Frame::Text(text.into())
    }

    pub fn function_call(
        name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: &Value,
    ) -> Self {
        Frame::FunctionCall {
            name: name.into(),
            call_id: call_id.into(),
            arguments: Value::String(arguments.to_string()),
            status: Some(STATUS_IN_PROGRESS.to_string()),
        }
    }

    /// A call the server already executed, its output follows in a
    /// `function_call_output` frame
    pub fn executed_call(
        name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: &Value,
    ) -> Self {
        Frame::FunctionCall {
            name: name.into(),
            call_id: call_id.into(),
            arguments: Value::String(arguments.to_string()),
            status: Some(STATUS_COMPLETED.to_string()),
        }
    }

    pub fn from_payload(payload: Value) -> Frame {
        let obj = match payload {
            Value::String(text) => return Frame::Text(text),
            Value::Object(obj) => obj,
            other => return Frame::Other(other),
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("function_call") => Frame::FunctionCall {
                name: str_field(&obj, "name"),
                call_id: str_field(&obj, "call_id"),
                arguments: obj.get("arguments").cloned().unwrap_or(Value::Null),
                status: obj.get("status").and_then(Value::as_str).map(String::from),
            },
            Some("function_call_output") => Frame::FunctionCallOutput {
                call_id: str_field(&obj, "call_id"),
                output: obj.get("output").cloned().unwrap_or(Value::Null),
            },
            Some("error") => Frame::Error(match obj.get("error") {
                Some(Value::String(message)) => message.clone(),
                Some(other) => other.to_string(),
                None => "Unknown error".to_string(),
            }),
            Some("finish") => Frame::Finish {
                finish_reason: obj
                    .get("finishReason")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            _ => Frame::Other(Value::Object(obj)),
        }
    }

    /// The JSON payload carried after `data: `, `None` for the done sentinel
    pub fn to_payload(&self) -> Option<Value> {
        let payload = match self {
            Frame::Text(text) => json!(text),
            Frame::FunctionCall {
                name,
                call_id,
                arguments,
                status,
            } => {
                let mut obj = Map::new();
                obj.insert("type".to_string(), json!("function_call"));
                obj.insert("name".to_string(), json!(name));
                obj.insert("call_id".to_string(), json!(call_id));
                obj.insert("arguments".to_string(), arguments.clone());
                if let Some(status) = status {
                    obj.insert("status".to_string(), json!(status));
                }
                Value::Object(obj)
            }
            Frame::FunctionCallOutput { call_id, output } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }),
            Frame::Error(error) => json!({"type": "error", "error": error}),
            Frame::Finish { finish_reason } => {
                json!({"type": "finish", "finishReason": finish_reason})
            }
            Frame::Other(value) => value.clone(),
            Frame::Done => return None,
        };
        Some(payload)
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn encode_frame(frame: &Frame) -> String {
    match frame.to_payload() {
        Some(payload) => sse::encode_data(&payload.to_string()),
        None => sse::encode_done(),
    }
}

/// Arguments arrive either JSON-encoded or already parsed
pub fn parse_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::String(raw) => utils::parse_arguments(raw),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

/// Turns raw response bytes into frames. Chunk boundaries never affect the result.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: SseDecoder,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.lines.push(chunk).into_iter().filter_map(decode).collect()
    }

    pub fn finish(&mut self) -> Vec<Frame> {
        self.lines.finish().into_iter().filter_map(decode).collect()
    }
}

fn decode(event: SseEvent) -> Option<Frame> {
    match event {
        SseEvent::Done => Some(Frame::Done),
        // Any line mentioning the sentinel is treated as one
        SseEvent::Data(data) if data.contains(DONE_SENTINEL) => Some(Frame::Done),
        SseEvent::Data(data) => match serde_json::from_str::<Value>(&data) {
            Ok(payload) => Some(Frame::from_payload(payload)),
            Err(e) => {
                tracing::warn!("Skipping malformed frame {:?}: {}", data, e);
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire() -> String {
        let frames = vec![
            Frame::text("Let me "),
            Frame::text("fix thät."),
            Frame::function_call(
                "applyDiff",
                "call_1",
                &json!({"delete": "teh", "insert": "the"}),
            ),
            Frame::Finish {
                finish_reason: Some("tool_calls".to_string()),
            },
            Frame::Done,
        ];
        frames.iter().map(encode_frame).collect()
    }

    fn decode_all(bytes: &[u8], chunk_size: usize) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            frames.extend(decoder.push(chunk));
        }
        frames.extend(decoder.finish());
        frames
    }

    #[test]
    fn test_any_chunking_yields_same_frames() {
        let bytes = wire().into_bytes();
        let expected = decode_all(&bytes, bytes.len());
        assert_eq!(expected.len(), 5);

        for size in 1..bytes.len() {
            assert_eq!(decode_all(&bytes, size), expected, "chunk size {}", size);
        }
    }

    #[test]
    fn test_decodes_each_payload_kind() {
        let body = concat!(
            "data: \"Hi\"\n\n",
            "data: {\"type\":\"function_call_output\",\"call_id\":\"c1\",\"output\":\"ok\"}\n\n",
            "data: {\"type\":\"error\",\"error\":\"boom\"}\n\n",
            "data: {\"type\":\"reasoning\"}\n\n",
            "data: [DONE]\n\n",
        );
        let frames = decode_all(body.as_bytes(), 7);
        assert_eq!(
            frames,
            vec![
                Frame::text("Hi"),
                Frame::FunctionCallOutput {
                    call_id: "c1".to_string(),
                    output: json!("ok")
                },
                Frame::Error("boom".to_string()),
                Frame::Other(json!({"type": "reasoning"})),
                Frame::Done,
            ]
        );
    }

    #[test]
    fn test_payload_mentioning_sentinel_is_skipped() {
        let frames = decode_all(b"data: \"say [DONE] at the end\"\n\ndata: \"ok\"\n\n", 4);
        assert_eq!(frames, vec![Frame::Done, Frame::text("ok")]);
    }

    #[test]
    fn test_malformed_payload_is_skipped() {
        let frames = decode_all(b"data: {not json\n\ndata: \"ok\"\n\n", 64);
        assert_eq!(frames, vec![Frame::text("ok")]);
    }

    #[test]
    fn test_arguments_round_trip() {
        let args = json!({"html": "<p>Hello <b>world</b></p>", "position": "documentEnd"});
        let frames = decode_all(
            encode_frame(&Frame::function_call("insertContent", "c1", &args)).as_bytes(),
            3,
        );

        match &frames[..] {
            [Frame::FunctionCall {
                name,
                arguments,
                status,
                ..
            }] => {
                assert_eq!(name, "insertContent");
                assert_eq!(status.as_deref(), Some(STATUS_IN_PROGRESS));
                assert_eq!(parse_arguments(arguments), args);
            }
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[test]
    fn test_parse_arguments_accepts_objects() {
        let args = json!({"documentName": "Notes"});
        assert_eq!(parse_arguments(&args), args);
        assert_eq!(parse_arguments(&json!("")), json!({}));
        assert_eq!(parse_arguments(&json!("{oops")), json!("{oops"));
    }
}
