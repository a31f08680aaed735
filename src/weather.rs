use serde_json::{json, Value};

use crate::errors::AgentError;
use crate::models::tool::Tool;

pub const WEATHER_TOOL_NAME: &str = "get_weather";

/// Get weather for a given city.
pub fn get_weather(city: &str) -> String {
    format!("It's always sunny in {}!", city)
}

/// The `get_weather` tool offered to the model
pub fn weather_tool() -> Tool {
    Tool::new(
        WEATHER_TOOL_NAME,
        "Get weather for a given city.",
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The city to get the weather for"
                }
            },
            "required": ["city"]
        }),
        |args: &Value| {
            let city = args
                .get("city")
                .and_then(Value::as_str)
                .ok_or_else(|| AgentError::InvalidParameters("city must be a string".into()))?;
            Ok(json!(get_weather(city)))
        },
    )
}
