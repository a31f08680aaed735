use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::message::Message;

/// Step name for messages produced by a model call
pub const MODEL_STEP: &str = "model";
/// Step name for messages produced by tool dispatch
pub const TOOLS_STEP: &str = "tools";

/// The messages produced during one agent step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// One incremental unit of the agent's streamed response, keyed by step name,
/// e.g. `{"model": {"messages": [...]}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamChunk {
    steps: BTreeMap<String, StepUpdate>,
}

impl StreamChunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the update for a step
    pub fn with_step<S: Into<String>>(mut self, step: S, messages: Vec<Message>) -> Self {
        self.steps.insert(step.into(), StepUpdate { messages });
        self
    }

    pub fn model(messages: Vec<Message>) -> Self {
        Self::new().with_step(MODEL_STEP, messages)
    }

    pub fn tools(messages: Vec<Message>) -> Self {
        Self::new().with_step(TOOLS_STEP, messages)
    }

    pub fn step(&self, step: &str) -> Option<&StepUpdate> {
        self.steps.get(step)
    }

    /// Messages of the model step, if this chunk carries one
    pub fn model_messages(&self) -> Option<&[Message]> {
        self.step(MODEL_STEP).map(|update| update.messages.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_chunk_from_json() -> anyhow::Result<()> {
        let chunk: StreamChunk = serde_json::from_value(json!({
            "model": {"messages": [{"role": "user", "content": "what is the weather in sf"}]}
        }))?;

        let messages = chunk.model_messages().expect("model step");
        assert_eq!(messages, &[Message::user("what is the weather in sf")]);
        Ok(())
    }

    #[test]
    fn test_chunk_without_model_step() -> anyhow::Result<()> {
        let chunk: StreamChunk = serde_json::from_value(json!({
            "tools": {"messages": []}
        }))?;
        assert!(chunk.model_messages().is_none());
        assert!(chunk.step(TOOLS_STEP).is_some());

        assert!(StreamChunk::new().model_messages().is_none());
        Ok(())
    }

    #[test]
    fn test_chunk_serializes_as_mapping() -> anyhow::Result<()> {
        let chunk = StreamChunk::tools(vec![Message::tool_result("1", None, json!("ok"))]);
        assert_eq!(
            serde_json::to_value(&chunk)?,
            json!({"tools": {"messages": [
                {"role": "tool", "content": "ok", "tool_call_id": "1", "status": "success"}
            ]}})
        );
        Ok(())
    }
}
