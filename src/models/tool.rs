use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use uuid::Uuid;

/// Signature of the function that powers a tool
pub type ToolFn = dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync;

/// A tool that can be used by a model.
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// A json schema of the function signature
    pub parameters: Value,
    /// The function that powers the tool
    pub function: Box<ToolFn>,
}

impl Tool {
    pub fn new<N, D>(
        name: N,
        description: D,
        parameters: Value,
        function: impl Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
            function: Box::new(function),
        }
    }

    pub fn call(&self, args: &Value) -> anyhow::Result<Value> {
        (self.function)(args)
    }
}

impl Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("function", &"<function>")
            .finish()
    }
}

/// A request from the assistant to execute a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution
    #[serde(default, alias = "arguments")]
    pub args: Value,
    /// Correlates the call with its tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
            id: None,
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }
}

pub fn create_object_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}
