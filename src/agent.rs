use anyhow::Result;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::chunk::StreamChunk;
use crate::models::message::{AssistantMessage, Message};
use crate::models::tool::{create_object_id, Tool, ToolCall};
use crate::providers::base::Provider;
use crate::providers::utils::sanitize_function_name;

/// Upper bound on model calls per reply
pub const DEFAULT_MAX_TURNS: usize = 25;

/// Agent pairs a chat-completion provider with the tools it is allowed to call
pub struct Agent {
    provider: Box<dyn Provider>,
    system_prompt: String,
    tools: Vec<Tool>,
    max_turns: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            provider,
            system_prompt: String::new(),
            tools: Vec::new(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_system_prompt<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Dispatch a single tool call to the matching tool
    fn dispatch_tool_call(&self, call: &ToolCall) -> AgentResult<Value> {
        let tool = self
            .tools
            .iter()
            .find(|tool| {
                tool.name == call.name || sanitize_function_name(&tool.name) == call.name
            })
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        tool.call(&call.args).map_err(|e| match e.downcast::<AgentError>() {
            Ok(agent_error) => agent_error,
            Err(e) => AgentError::ExecutionError(e.to_string()),
        })
    }

    /// Run each requested tool call in order and collect the result messages
    fn run_tool_calls(&self, tool_calls: &[ToolCall]) -> Vec<Message> {
        tool_calls
            .iter()
            .map(|call| {
                let id = call.id.clone().unwrap_or_default();
                let name = Some(call.name.clone());
                match self.dispatch_tool_call(call) {
                    Ok(output) => {
                        tracing::debug!(tool = %call.name, "tool call succeeded");
                        Message::tool_result(id, name, output)
                    }
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                        Message::tool_error(id, name, format!("Error: {}", e))
                    }
                }
            })
            .collect()
    }

    /// Create a stream that yields one chunk per agent step: a `model` chunk for each
    /// assistant response, followed by a `tools` chunk with the results whenever the
    /// assistant asked for tool calls. The stream ends once the assistant answers
    /// without requesting tools.
    pub fn stream(&self, messages: &[Message]) -> BoxStream<'_, Result<StreamChunk>> {
        let mut messages = messages.to_vec();

        Box::pin(async_stream::try_stream! {
            let mut turns = 0;
            loop {
                if turns >= self.max_turns {
                    Err(AgentError::TurnLimitExceeded(self.max_turns))?;
                }
                turns += 1;

                let (response, _) = self.provider.complete(
                    &self.system_prompt,
                    &messages,
                    &self.tools,
                ).await?;
                let response = assign_tool_call_ids(response);

                yield StreamChunk::model(vec![response.clone()]);

                let tool_calls = response.tool_calls().to_vec();
                messages.push(response);

                if tool_calls.is_empty() {
                    // No more tool calls, end the reply loop
                    break;
                }

                let results = self.run_tool_calls(&tool_calls);
                yield StreamChunk::tools(results.clone());
                messages.extend(results);
            }
        })
    }
}

/// Give every tool call an id so its result can be correlated
fn assign_tool_call_ids(message: Message) -> Message {
    match message {
        Message::Assistant(AssistantMessage {
            content,
            tool_calls,
        }) if tool_calls.iter().any(|call| call.id.is_none()) => {
            let tool_calls = tool_calls
                .into_iter()
                .map(|call| match call.id {
                    Some(_) => call,
                    None => call.with_id(create_object_id("call")),
                })
                .collect();
            Message::Assistant(AssistantMessage {
                content,
                tool_calls,
            })
        }
        other => other,
    }
}
