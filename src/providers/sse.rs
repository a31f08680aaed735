//! Server-sent events support for streamed chat completions.
//!
//! The gateway streams `data: <chunk json>\n\n` events, ends a successful stream with
//! `data: [DONE]` and a failed one with an `{"error": ...}` payload followed by
//! `data: [ERROR]`. [`SseDecoder`] splits raw bytes into event payloads and
//! [`CompletionAccumulator`] folds the chunk deltas back into a single
//! chat-completion response, so the rest of the provider handles streamed and
//! non-streamed responses the same way.
use anyhow::{anyhow, Result};
use serde_json::{json, Value};

pub const DONE_MARKER: &str = "[DONE]";
pub const ERROR_MARKER: &str = "[ERROR]";

/// Incremental splitter from raw bytes to SSE `data:` payloads
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the payloads of every event completed by them.
    /// Only complete events are decoded, so a character split across pushes stays intact.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        // CR never occurs inside a multi-byte sequence
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(event_end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..event_end + 2).collect();
            if let Some(payload) = Self::event_payload(&String::from_utf8_lossy(&event)) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush whatever is left once the byte stream has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        Self::event_payload(&String::from_utf8_lossy(&rest))
    }

    fn event_payload(event: &str) -> Option<String> {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| {
                line.strip_prefix("data:")
                    .map(|data| data.strip_prefix(' ').unwrap_or(data))
            })
            .collect();

        if data.is_empty() {
            // Comments, keep-alives and other fields
            return None;
        }
        Some(data.join("\n"))
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds `chat.completion.chunk` payloads into one `chat.completion` response value
#[derive(Debug, Default)]
pub struct CompletionAccumulator {
    id: Option<String>,
    model: Option<String>,
    content: String,
    tool_calls: Vec<(u64, PendingToolCall)>,
    finish_reason: Option<String>,
    usage: Option<Value>,
    done: bool,
}

impl CompletionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Apply one SSE payload. Errors reported inside the stream fail the call.
    pub fn apply(&mut self, payload: &str) -> Result<()> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(());
        }
        if payload == DONE_MARKER {
            self.done = true;
            return Ok(());
        }
        if payload == ERROR_MARKER {
            self.done = true;
            return Err(anyhow!("Gateway reported an error in the completion stream"));
        }

        let chunk: Value = serde_json::from_str(payload)
            .map_err(|e| anyhow!("Failed to parse stream chunk: {} (data: {})", e, payload))?;

        if let Some(error) = chunk.get("error") {
            return Err(anyhow!("Gateway stream error: {}", error));
        }

        self.apply_chunk(&chunk);
        Ok(())
    }

    fn apply_chunk(&mut self, chunk: &Value) {
        if self.id.is_none() {
            self.id = chunk.get("id").and_then(Value::as_str).map(String::from);
        }
        if self.model.is_none() {
            self.model = chunk.get("model").and_then(Value::as_str).map(String::from);
        }
        if let Some(usage) = chunk.get("usage").filter(|usage| !usage.is_null()) {
            self.usage = Some(usage.clone());
        }

        let Some(choice) = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        else {
            return;
        };

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(reason.to_string());
        }

        let delta = &choice["delta"];
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            self.content.push_str(text);
        }

        if let Some(fragments) = delta.get("tool_calls").and_then(Value::as_array) {
            for fragment in fragments {
                self.apply_tool_call_fragment(fragment);
            }
        }
    }

    fn apply_tool_call_fragment(&mut self, fragment: &Value) {
        let index = fragment
            .get("index")
            .and_then(Value::as_u64)
            .unwrap_or(self.tool_calls.len() as u64);

        let position = match self.tool_calls.iter().position(|(i, _)| *i == index) {
            Some(position) => position,
            None => {
                self.tool_calls.push((index, PendingToolCall::default()));
                self.tool_calls.len() - 1
            }
        };
        let pending = &mut self.tool_calls[position].1;

        if let Some(id) = fragment.get("id").and_then(Value::as_str) {
            pending.id = id.to_string();
        }
        let function = &fragment["function"];
        if let Some(name) = function.get("name").and_then(Value::as_str) {
            pending.name.push_str(name);
        }
        if let Some(arguments) = function.get("arguments").and_then(Value::as_str) {
            pending.arguments.push_str(arguments);
        }
    }

    /// The accumulated response, shaped like a non-streamed chat completion
    pub fn into_response(mut self) -> Value {
        self.tool_calls.sort_by_key(|(index, _)| *index);

        let mut message = json!({ "role": "assistant" });
        message["content"] = if self.content.is_empty() {
            Value::Null
        } else {
            json!(self.content)
        };
        if !self.tool_calls.is_empty() {
            let tool_calls: Vec<Value> = self
                .tool_calls
                .into_iter()
                .map(|(_, call)| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments,
                        }
                    })
                })
                .collect();
            message["tool_calls"] = json!(tool_calls);
        }

        let mut response = json!({
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": self.finish_reason,
            }]
        });
        if let Some(id) = self.id {
            response["id"] = json!(id);
        }
        if let Some(model) = self.model {
            response["model"] = json!(model);
        }
        if let Some(usage) = self.usage {
            response["usage"] = usage;
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_splits_across_pushes() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let payloads = decoder.push(b"1}\n\ndata: [DONE]\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_keeps_characters_split_across_pushes() -> Result<()> {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"72°F ☀\"}}]}\n\n".as_bytes();
        let split = event.iter().position(|b| *b == 0xC2).expect("degree sign") + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&event[..split]).is_empty());
        let payloads = decoder.push(&event[split..]);
        assert_eq!(payloads.len(), 1);

        let mut acc = CompletionAccumulator::new();
        acc.apply(&payloads[0])?;
        assert_eq!(acc.into_response()["choices"][0]["message"]["content"], "72°F ☀");
        Ok(())
    }

    #[test]
    fn test_decoder_ignores_comments_and_handles_crlf() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b": keep-alive\r\n\r\nevent: message\r\ndata:{\"b\":2}\r\n\r\n");
        assert_eq!(payloads, vec!["{\"b\":2}".to_string()]);
    }

    #[test]
    fn test_decoder_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("[DONE]"));
    }

    #[test]
    fn test_accumulates_text_and_usage() -> Result<()> {
        let mut acc = CompletionAccumulator::new();
        acc.apply(r#"{"id":"c1","model":"m","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"}}]}"#)?;
        acc.apply(r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":"stop"}]}"#)?;
        acc.apply(r#"{"id":"c1","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#)?;
        acc.apply(DONE_MARKER)?;
        assert!(acc.is_done());

        let response = acc.into_response();
        assert_eq!(response["id"], "c1");
        assert_eq!(response["model"], "m");
        assert_eq!(response["choices"][0]["message"]["content"], "Hello");
        assert_eq!(response["choices"][0]["finish_reason"], "stop");
        assert_eq!(response["usage"]["total_tokens"], 5);
        Ok(())
    }

    #[test]
    fn test_accumulates_fragmented_tool_calls() -> Result<()> {
        let mut acc = CompletionAccumulator::new();
        acc.apply(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"get_weather","arguments":""}}]}}]}"#)?;
        acc.apply(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":"}}]}}]}"#)?;
        acc.apply(r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_2","function":{"name":"get_weather","arguments":"{\"city\":\"nyc\"}"}}]}}]}"#)?;
        acc.apply(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"sf\"}"}}]},"finish_reason":"tool_calls"}]}"#)?;

        let response = acc.into_response();
        let message = &response["choices"][0]["message"];
        assert!(message["content"].is_null());
        assert_eq!(message["tool_calls"][0]["id"], "call_1");
        assert_eq!(message["tool_calls"][0]["function"]["arguments"], r#"{"city":"sf"}"#);
        assert_eq!(message["tool_calls"][1]["id"], "call_2");
        assert_eq!(message["tool_calls"][1]["function"]["name"], "get_weather");
        Ok(())
    }

    #[test]
    fn test_stream_errors_fail() {
        let mut acc = CompletionAccumulator::new();
        let err = acc
            .apply(r#"{"error":{"message":"Invalid API key","code":"unauthorized"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));

        assert!(CompletionAccumulator::new().apply(ERROR_MARKER).is_err());
        assert!(CompletionAccumulator::new().apply("not json").is_err());
    }
}
