//! Message parser - Turns raw delivery bodies into routable messages

use serde_json::{Map, Value};
use crate::application::errors::ParseError;

/// A decoded delivery body with its routing tag pulled out
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub tag: String,
    pub body: Value,
}

impl Inbound {
    pub fn chat_id(&self) -> Option<&str> {
        self.body.get("chat_id").and_then(Value::as_str)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.body.get("correlation_id").and_then(Value::as_str)
    }
}

/// Parses incoming delivery bodies
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageParser;

impl MessageParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a body into an object with a string `type`. The rest of the
    /// schema is left to the operation that handles the tag.
    pub fn parse(&self, body: &[u8]) -> Result<Inbound, ParseError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ParseError::NotJson(e.to_string()))?;

        let tag = match &value {
            Value::Object(map) => Self::tag_of(map)?,
            _ => return Err(ParseError::NotObject),
        };

        Ok(Inbound { tag, body: value })
    }

    fn tag_of(map: &Map<String, Value>) -> Result<String, ParseError> {
        map.get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ParseError::MissingType)
    }
}
