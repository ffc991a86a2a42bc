//! Command Routing
//!
//! Turns broker topics into typed commands. Recognized shapes:
//! - `command/damage/<entity_id>` with optional `{"damage": n}` payload
//! - `command/heal/<entity_id>` with optional `{"heal": n}` payload
//! - `command/reset` with optional `{"id": "<token>"}` payload
//!
//! Amounts fall back to [`DEFAULT_AMOUNT`] whenever the payload is empty,
//! not JSON, or lacks a usable field, so minimal hardware payloads such as
//! `"1"` or `""` still produce a command.

use std::fmt;

use serde_json::Value;


/// Amount used when a damage/heal payload carries no usable value
pub const DEFAULT_AMOUNT: u32 = 1;

/// Topic root for hardware commands
pub const COMMAND_ROOT: &str = "command";

/// Topic used for resets in both directions
pub const RESET_TOPIC: &str = "command/reset";

/// Subscription filters the bridge needs on the broker
pub const INBOUND_FILTERS: [&str; 3] = ["command/damage/+", "command/heal/+", RESET_TOPIC];

/// Identifier of a player or prop
pub type EntityId = i64;

/// A command derived from a broker message or a client action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Damage { entity_id: EntityId, amount: u32 },
    Heal { entity_id: EntityId, amount: u32 },
    /// `origin_id` is set when the reset carries a bridge-issued token
    Reset { origin_id: Option<String> },
    /// Outbound only, originates from a client
    GunControl { entity_id: EntityId, enabled: bool },
}

impl Command {
    /// Short name used for logging and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Damage { .. } => "damage",
            Command::Heal { .. } => "heal",
            Command::Reset { .. } => "reset",
            Command::GunControl { .. } => "gun_control",
        }
    }
}

/// Reasons a topic cannot be turned into a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Topic shape is not one the bridge handles
    UnrecognizedTopic(String),
    /// Topic shape is known but the entity id is not an integer
    MalformedTopic(String),
}

impl RouteError {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteError::UnrecognizedTopic(_) => "unrecognized_topic",
            RouteError::MalformedTopic(_) => "malformed_topic",
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::UnrecognizedTopic(topic) => write!(f, "Unrecognized topic: {}", topic),
            RouteError::MalformedTopic(topic) => write!(f, "Malformed topic: {}", topic),
        }
    }
}

impl std::error::Error for RouteError {}

/// Parse a broker topic and payload into a command
pub fn parse(topic: &str, payload: &[u8]) -> Result<Command, RouteError> {
    let segments: Vec<&str> = topic.split('/').collect();

    match segments.as_slice() {
        [COMMAND_ROOT, verb @ ("damage" | "heal"), id] => {
            let entity_id = id
                .parse::<EntityId>()
                .map_err(|_| RouteError::MalformedTopic(topic.to_string()))?;
            let amount = parse_amount(payload, verb);

            Ok(if *verb == "damage" {
                Command::Damage { entity_id, amount }
            } else {
                Command::Heal { entity_id, amount }
            })
        }
        [COMMAND_ROOT, "reset"] => Ok(Command::Reset {
            origin_id: parse_origin_id(payload),
        }),
        _ => Err(RouteError::UnrecognizedTopic(topic.to_string())),
    }
}

/// Read `{"<field>": n}` from a payload, falling back to the default amount
fn parse_amount(payload: &[u8], field: &str) -> u32 {
    parse_object(payload)
        .and_then(|obj| obj.get(field).and_then(Value::as_u64))
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(DEFAULT_AMOUNT)
}

fn parse_origin_id(payload: &[u8]) -> Option<String> {
    parse_object(payload)?
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Decode a payload as a JSON object; anything else yields `None`
fn parse_object(payload: &[u8]) -> Option<serde_json::Map<String, Value>> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice(payload) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Topic for a gun control publish
pub fn gun_control_topic(entity_id: EntityId) -> String {
    format!("control/gun/{}", entity_id)
}
