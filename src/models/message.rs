use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::tool::ToolCall;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(default, deserialize_with = "nullable_string")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, deserialize_with = "nullable_string")]
    pub content: String,
    #[serde(
        default,
        deserialize_with = "nullable_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    #[serde(default, deserialize_with = "nullable_string")]
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub content: Value,
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub status: ToolStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMessage {
    pub name: String,
    pub content: Value,
}

/// A message exchanged in the conversation.
///
/// Known shapes are tagged by `role` on the wire. Any value that does not match one of
/// them is kept verbatim as `Unknown`, so decoding a message never fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    System(SystemMessage),
    Tool(ToolMessage),
    Function(FunctionMessage),
    Unknown(Value),
}

impl Message {
    pub fn user<S: Into<String>>(text: S) -> Self {
        Message::User(UserMessage {
            content: text.into(),
        })
    }

    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Message::Assistant(AssistantMessage {
            content: text.into(),
            tool_calls: Vec::new(),
        })
    }

    pub fn system<S: Into<String>>(text: S) -> Self {
        Message::System(SystemMessage {
            content: text.into(),
        })
    }

    /// Create an assistant message requesting the given tool calls
    pub fn tool_request(tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant(AssistantMessage {
            content: String::new(),
            tool_calls,
        })
    }

    pub fn tool_result<S: Into<String>>(tool_call_id: S, name: Option<String>, content: Value) -> Self {
        Message::Tool(ToolMessage {
            content,
            tool_call_id: tool_call_id.into(),
            name,
            status: ToolStatus::Success,
        })
    }

    pub fn tool_error<S: Into<String>>(tool_call_id: S, name: Option<String>, error: String) -> Self {
        Message::Tool(ToolMessage {
            content: Value::String(error),
            tool_call_id: tool_call_id.into(),
            name,
            status: ToolStatus::Error,
        })
    }

    pub fn function<S: Into<String>>(name: S, content: Value) -> Self {
        Message::Function(FunctionMessage {
            name: name.into(),
            content,
        })
    }

    /// The tool calls requested by an assistant message, empty for every other kind
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant(message) => &message.tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// Text content for the plain text kinds
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::User(m) => Some(&m.content),
            Message::Assistant(m) => Some(&m.content),
            Message::System(m) => Some(&m.content),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum TaggedRef<'a> {
    User(&'a UserMessage),
    Assistant(&'a AssistantMessage),
    System(&'a SystemMessage),
    Tool(&'a ToolMessage),
    Function(&'a FunctionMessage),
}

#[derive(Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Tagged {
    #[serde(alias = "human")]
    User(UserMessage),
    #[serde(alias = "ai")]
    Assistant(AssistantMessage),
    System(SystemMessage),
    Tool(ToolMessage),
    Function(FunctionMessage),
}

impl From<Tagged> for Message {
    fn from(tagged: Tagged) -> Self {
        match tagged {
            Tagged::User(m) => Message::User(m),
            Tagged::Assistant(m) => Message::Assistant(m),
            Tagged::System(m) => Message::System(m),
            Tagged::Tool(m) => Message::Tool(m),
            Tagged::Function(m) => Message::Function(m),
        }
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Message::User(m) => TaggedRef::User(m).serialize(serializer),
            Message::Assistant(m) => TaggedRef::Assistant(m).serialize(serializer),
            Message::System(m) => TaggedRef::System(m).serialize(serializer),
            Message::Tool(m) => TaggedRef::Tool(m).serialize(serializer),
            Message::Function(m) => TaggedRef::Function(m).serialize(serializer),
            Message::Unknown(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match Tagged::deserialize(&raw) {
            Ok(tagged) => tagged.into(),
            Err(_) => Message::Unknown(raw),
        })
    }
}

fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
