use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::GatewayConfig;
use super::routing::EXTENSION_KEY;
use super::sse::{CompletionAccumulator, SseDecoder};
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
    tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// Chat-completion provider backed by the VMX routing gateway
pub struct GatewayProvider {
    client: Client,
    config: GatewayConfig,
}

impl GatewayProvider {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let Some(usage) = data.get("usage").filter(|usage| !usage.is_null()) else {
            tracing::debug!("No usage data in response");
            return Usage::default();
        };

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn build_payload(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<Value> {
        let system_message = json!({
            "role": "system",
            "content": system
        });

        // Convert messages and tools to OpenAI format
        let messages_spec = messages_to_openai_spec(messages);
        let tools_spec = if !tools.is_empty() {
            tools_to_openai_spec(tools)?
        } else {
            vec![]
        };

        // create messages array with system message first
        let mut messages_array = Vec::with_capacity(messages_spec.len() + 1);
        if !system.is_empty() {
            messages_array.push(system_message);
        }
        messages_array.extend(messages_spec);

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array,
            "stream": true,
            "stream_options": { "include_usage": true }
        });

        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }
        if let Some(extension) = self.config.extension.as_ref().filter(|e| !e.is_empty()) {
            payload[EXTENSION_KEY] = serde_json::to_value(extension)?;
        }

        Ok(payload)
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let url = self.config.completions_url();
        tracing::debug!(%url, "sending completion request");

        let mut request = self.client.post(&url).json(payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }
        let response = request.send().await?;

        if let Some(request_id) = response.headers().get("x-request-id") {
            tracing::debug!(request_id = ?request_id, "gateway accepted request");
        }

        match response.status() {
            StatusCode::OK => Self::read_body(response).await,
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(error) = body.get("error") {
                    if let Some(err) = check_openai_context_length_error(error) {
                        return Err(err.into());
                    }
                    let message = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown error");
                    return Err(anyhow!("Request failed: {}: {}", status, message));
                }
                Err(anyhow!("Request failed: {}", status))
            }
        }
    }

    async fn read_body(response: Response) -> Result<Value> {
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));

        if !is_event_stream {
            return Ok(response.json().await?);
        }

        let mut decoder = SseDecoder::new();
        let mut accumulator = CompletionAccumulator::new();
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            for payload in decoder.push(&chunk?) {
                accumulator.apply(&payload)?;
            }
            if accumulator.is_done() {
                break;
            }
        }
        if let Some(payload) = decoder.finish() {
            accumulator.apply(&payload)?;
        }
        if !accumulator.is_done() {
            tracing::warn!("completion stream ended without a [DONE] marker");
        }

        Ok(accumulator.into_response())
    }
}

#[async_trait]
impl Provider for GatewayProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools)?;
        let response = self.post(&payload).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("Gateway API error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let usage = Self::get_usage(&response);
        tracing::debug!(?usage, "completion finished");

        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::routing::{ModelOverride, VmxExtension};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COMPLETIONS_PATH: &str = "/v1/completion/ws/env/openai/chat/completions";

    fn test_config(host: String) -> GatewayConfig {
        GatewayConfig::new(host, "ws", "env", "openai").with_api_key("test_api_key")
    }

    async fn setup_mock_server(response: ResponseTemplate) -> (MockServer, GatewayProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .and(header("Authorization", "Bearer test_api_key"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        let provider = GatewayProvider::new(test_config(mock_server.uri())).unwrap();
        (mock_server, provider)
    }

    fn sse_body(events: &[&str]) -> String {
        events
            .iter()
            .map(|event| format!("data: {}\n\n", event))
            .collect()
    }

    #[test]
    fn test_get_usage() {
        let usage = GatewayProvider::get_usage(&json!({
            "usage": {"prompt_tokens": 10, "completion_tokens": 20}
        }));
        assert_eq!(usage, Usage::new(Some(10), Some(20), Some(30)));
        assert_eq!(GatewayProvider::get_usage(&json!({})), Usage::default());
    }

    #[test]
    fn test_payload_carries_extension() -> Result<()> {
        let config = test_config("http://localhost:3000".to_string()).with_extension(
            VmxExtension::default().with_model_override(ModelOverride::new(
                "aws-bedrock",
                "claude",
                "conn-1",
            )),
        );
        let provider = GatewayProvider::new(config)?;

        let payload = provider.build_payload("Be helpful", &[Message::user("hi")], &[])?;

        assert_eq!(payload["model"], "router");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "hi");
        assert!(payload.get("tools").is_none());
        assert_eq!(
            payload["vmx"]["resourceConfigOverrides"]["model"]["connectionId"],
            "conn-1"
        );
        Ok(())
    }

    #[test]
    fn test_payload_without_extension() -> Result<()> {
        let provider = GatewayProvider::new(test_config("http://localhost:3000".to_string()))?;
        let payload = provider.build_payload("", &[Message::user("hi")], &[])?;

        assert!(payload.get("vmx").is_none());
        assert_eq!(payload["messages"].as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_streamed_text() -> Result<()> {
        let body = sse_body(&[
            r#"{"id":"c1","choices":[{"index":0,"delta":{"role":"assistant","content":"Hello! How can"}}]}"#,
            r#"{"id":"c1","choices":[{"index":0,"delta":{"content":" I help?"},"finish_reason":"stop"}]}"#,
            r#"{"id":"c1","choices":[],"usage":{"prompt_tokens":12,"completion_tokens":15,"total_tokens":27}}"#,
            "[DONE]",
        ]);
        let (_server, provider) = setup_mock_server(
            ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
        )
        .await;

        let (message, usage) = provider
            .complete("You are a helpful assistant.", &[Message::user("Hello?")], &[])
            .await?;

        assert_eq!(message, Message::assistant("Hello! How can I help?"));
        assert_eq!(usage, Usage::new(Some(12), Some(15), Some(27)));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_json_tool_request() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-tool",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "get_weather",
                            "arguments": "{\"city\":\"sf\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 15,
                "total_tokens": 35
            }
        });
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let tool = Tool::new(
            "get_weather",
            "Get weather for a given city.",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            |_| Ok(json!("sunny")),
        );

        let (message, usage) = provider
            .complete("You are a helpful assistant.", &[Message::user("weather?")], &[tool])
            .await?;

        let tool_calls = message.tool_calls();
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].name, "get_weather");
        assert_eq!(tool_calls[0].args, json!({"city": "sf"}));
        assert_eq!(tool_calls[0].id.as_deref(), Some("call_123"));
        assert_eq!(usage.total_tokens, Some(35));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_sends_extension() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .and(body_partial_json(json!({
                "vmx": {"resourceConfigOverrides": {"model": {"provider": "aws-bedrock"}}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "overridden"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = test_config(mock_server.uri()).with_extension(
            VmxExtension::default().with_model_override(ModelOverride::new(
                "aws-bedrock",
                "us.anthropic.claude-sonnet-4-5-20250929-v1:0",
                "f0fb0a42-6b31-424e-ae85-2ee6ffdeff65",
            )),
        );
        let provider = GatewayProvider::new(config)?;

        let (message, _) = provider.complete("", &[Message::user("hi")], &[]).await?;
        assert_eq!(message.text(), Some("overridden"));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_error_status() -> Result<()> {
        let (_server, provider) = setup_mock_server(ResponseTemplate::new(401).set_body_json(
            json!({"error": {"message": "Invalid API key", "code": "unauthorized"}}),
        ))
        .await;

        let err = provider
            .complete("", &[Message::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Invalid API key"));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_context_length_error() -> Result<()> {
        let (_server, provider) = setup_mock_server(ResponseTemplate::new(400).set_body_json(
            json!({"error": {"message": "too long", "code": "context_length_exceeded"}}),
        ))
        .await;

        let err = provider
            .complete("", &[Message::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Input message too long"));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_stream_error() -> Result<()> {
        let body = sse_body(&[
            r#"{"error":{"message":"upstream provider failed","code":"unknown_error"}}"#,
            "[ERROR]",
        ]);
        let (_server, provider) = setup_mock_server(
            ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
        )
        .await;

        let err = provider
            .complete("", &[Message::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("upstream provider failed"));
        Ok(())
    }
}
