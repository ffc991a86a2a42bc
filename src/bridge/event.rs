//! Client-facing message types
//!
//! Everything on the WebSocket side is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::command::{Command, EntityId};

/// Event broadcast to every connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    Damage { player_id: EntityId, damage: u32 },
    Heal { player_id: EntityId, heal: u32 },
    Reset,
    GunControl { player_id: EntityId, enabled: bool },
}

impl BroadcastEvent {
    /// Value of the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastEvent::Damage { .. } => "damage",
            BroadcastEvent::Heal { .. } => "heal",
            BroadcastEvent::Reset => "reset",
            BroadcastEvent::GunControl { .. } => "gun_control",
        }
    }

    /// JSON text frame for this event
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&Command> for BroadcastEvent {
    fn from(command: &Command) -> Self {
        match *command {
            Command::Damage { entity_id, amount } => BroadcastEvent::Damage {
                player_id: entity_id,
                damage: amount,
            },
            Command::Heal { entity_id, amount } => BroadcastEvent::Heal {
                player_id: entity_id,
                heal: amount,
            },
            Command::Reset { .. } => BroadcastEvent::Reset,
            Command::GunControl { entity_id, enabled } => BroadcastEvent::GunControl {
                player_id: entity_id,
                enabled,
            },
        }
    }
}

/// Control action sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    GunControl { player_id: EntityId, enabled: bool },
}

impl ClientMessage {
    /// Parse a text frame. Unknown types and malformed JSON yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
