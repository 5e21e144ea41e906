use serde::{Deserialize, Serialize};

/// The roles that are replayed to the model. Display-only roles never make it
/// into a [`super::message::Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Parse a role as it appears on the wire, rejecting anything the model
    /// should not see.
    pub fn from_wire(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}
