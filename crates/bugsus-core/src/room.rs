use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::player::{Player, PlayerId, Team};
use crate::rng::RandomSource;

/// Room code symbols: upper-case alphanumerics without `I`, `O`, `0` and `1`.
pub const ROOM_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 6;

/// Wire spelling of an abstaining ejection vote.
pub const SKIP_VOTE: &str = "SKIP";

/// Draw a room code. Uniqueness against live rooms is the registry's job.
pub fn generate_room_code(rng: &mut dyn RandomSource) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.pick_index(ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Check that `code` could have come from [`generate_room_code`].
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

/// Normalize user-typed codes before lookup.
pub fn normalize_room_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Rules and pacing for a room. Every room copies the server's template.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub min_players: usize,
    pub max_players: usize,
    pub final_round: u8,
    pub categories: Vec<String>,
    pub default_category: String,
    pub category_vote_duration: Duration,
    pub ejection_vote_duration: Duration,
    pub role_reveal_duration: Duration,
    pub work_period_duration: Duration,
    pub result_display_duration: Duration,
    pub summary_display_duration: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: 4,
            max_players: 4,
            final_round: 3,
            categories: ["FRONTEND", "BACKEND", "OOPS", "DSA"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_category: "FRONTEND".to_string(),
            category_vote_duration: Duration::from_secs(20),
            ejection_vote_duration: Duration::from_secs(30),
            role_reveal_duration: Duration::from_millis(4500),
            work_period_duration: Duration::from_secs(60),
            result_display_duration: Duration::from_millis(3000),
            summary_display_duration: Duration::from_millis(8000),
        }
    }
}

/// Stage of the fixed game flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    CategoryVote,
    RoleReveal,
    Game,
    Meeting,
    Summary,
    Final,
}

impl Phase {
    /// Edges of the phase graph.
    ///
    /// The forward path is lobby → category_vote → role_reveal → game →
    /// meeting → {summary → category_vote | final}. A host restart may
    /// re-enter category_vote from anywhere. A departure that decides the
    /// game may jump to final from any in-round phase, and a room left with
    /// no living players falls back to lobby.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (_, CategoryVote)
                | (CategoryVote, RoleReveal)
                | (RoleReveal, Game)
                | (Game, Meeting)
                | (Meeting, Summary)
                | (CategoryVote | RoleReveal | Game | Meeting | Summary, Final)
                | (CategoryVote | RoleReveal | Game | Meeting | Summary | Final, Lobby)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::CategoryVote => "category_vote",
            Phase::RoleReveal => "role_reveal",
            Phase::Game => "game",
            Phase::Meeting => "meeting",
            Phase::Summary => "summary",
            Phase::Final => "final",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ballot in an ejection meeting: a living player, or an abstention.
///
/// On the wire this is the target's id, or the literal `"SKIP"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EjectionChoice {
    Player(PlayerId),
    Skip,
}

impl EjectionChoice {
    pub fn as_str(&self) -> &str {
        match self {
            EjectionChoice::Player(id) => id,
            EjectionChoice::Skip => SKIP_VOTE,
        }
    }
}

impl From<&str> for EjectionChoice {
    fn from(raw: &str) -> Self {
        if raw == SKIP_VOTE {
            EjectionChoice::Skip
        } else {
            EjectionChoice::Player(raw.to_string())
        }
    }
}

impl Serialize for EjectionChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EjectionChoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChoiceVisitor;

        impl Visitor<'_> for ChoiceVisitor {
            type Value = EjectionChoice;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a player id or \"SKIP\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v.is_empty() {
                    return Err(E::invalid_value(de::Unexpected::Str(v), &self));
                }
                Ok(EjectionChoice::from(v))
            }
        }

        deserializer.deserialize_str(ChoiceVisitor)
    }
}

/// One game session: the aggregate every state-machine operation mutates.
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    /// Join order; the first player is the original host.
    pub players: Vec<Player>,
    pub host_id: PlayerId,
    pub phase: Phase,
    pub round: u8,
    /// Selected task category, empty until the first vote finalizes.
    pub category: String,
    pub intern_id: Option<PlayerId>,
    pub category_votes: HashMap<PlayerId, String>,
    pub ejection_votes: HashMap<PlayerId, EjectionChoice>,
    pub tasks_completed: HashMap<PlayerId, u32>,
    pub winner: Option<Team>,
    /// Display name of whoever called the current meeting.
    pub meeting_caller: Option<String>,
    pub config: RoomConfig,
}

impl Room {
    pub fn new(room_id: String, host: Player, config: RoomConfig) -> Self {
        Self {
            room_id,
            host_id: host.id.clone(),
            players: vec![host],
            phase: Phase::Lobby,
            round: 1,
            category: String::new(),
            intern_id: None,
            category_votes: HashMap::new(),
            ejection_votes: HashMap::new(),
            tasks_completed: HashMap::new(),
            winner: None,
            meeting_caller: None,
            config,
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.player(id).is_some()
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.host_id == id
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.config.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn username_of(&self, id: &str) -> Option<&str> {
        self.player(id).map(|p| p.username.as_str())
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.alive)
    }

    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.alive_players().map(|p| p.id.clone()).collect()
    }

    pub fn alive_count(&self) -> usize {
        self.alive_players().count()
    }

    /// Seat a player. Re-adding an id already present is a no-op and
    /// returns `false`.
    pub fn add_player(&mut self, player: Player) -> bool {
        if self.contains(&player.id) {
            return false;
        }
        self.players.push(player);
        true
    }

    /// Unseat a player, dropping their ballots, ballots cast against them
    /// and their task count. Host passes to the next player in join order.
    pub fn remove_player(&mut self, id: &str) -> Option<Player> {
        let idx = self.players.iter().position(|p| p.id == id)?;
        let removed = self.players.remove(idx);

        self.category_votes.remove(id);
        self.ejection_votes.remove(id);
        self.ejection_votes
            .retain(|_, choice| !matches!(choice, EjectionChoice::Player(target) if target == id));
        self.tasks_completed.remove(id);

        if self.host_id == id
            && let Some(next) = self.players.first()
        {
            self.host_id = next.id.clone();
        }
        Some(removed)
    }

    /// Move along the phase graph. Off-graph moves are refused and logged.
    pub(crate) fn enter(&mut self, next: Phase) -> bool {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(
                room = %self.room_id,
                from = %self.phase,
                to = %next,
                "Refused phase transition"
            );
            return false;
        }
        self.phase = next;
        true
    }
}
