use serde::{Deserialize, Serialize};

/// Connection-scoped player identifier. One WebSocket connection is one player.
pub type PlayerId = String;

/// Longest accepted display name, in characters.
pub const MAX_USERNAME_LEN: usize = 20;

/// A player seated in a BugSus room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub alive: bool,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            alive: true,
        }
    }
}

/// Hidden role a player holds for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Engineer,
    Intern,
}

/// Side that won a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Engineers,
    Intern,
}

/// Trim and validate a requested display name.
///
/// Returns `None` for empty names, names longer than [`MAX_USERNAME_LEN`]
/// characters, or names containing control characters.
pub fn normalize_username(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty()
        || name.chars().count() > MAX_USERNAME_LEN
        || name.chars().any(char::is_control)
    {
        return None;
    }
    Some(name.to_string())
}
