//! Tagged-union wire messages.
//!
//! Every frame is a JSON object whose `type` field names the message kind;
//! the remaining fields are the payload in camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::player::{Player, PlayerId, Role, Team};
use crate::room::EjectionChoice;

/// Client -> Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoom {
        username: String,
    },
    JoinRoom {
        room_id: String,
        username: String,
    },
    StartGame {
        room_id: String,
    },
    CategoryVote {
        room_id: String,
        category: String,
    },
    StartMeeting {
        room_id: String,
    },
    CastVote {
        room_id: String,
        target_id: EjectionChoice,
    },
    TaskProgress {
        room_id: String,
        count: u32,
    },
    NextRound {
        room_id: String,
    },
}

impl ClientMessage {
    /// Room the client believes it is acting on. Absent for `create_room`.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ClientMessage::CreateRoom { .. } => None,
            ClientMessage::JoinRoom { room_id, .. }
            | ClientMessage::StartGame { room_id }
            | ClientMessage::CategoryVote { room_id, .. }
            | ClientMessage::StartMeeting { room_id }
            | ClientMessage::CastVote { room_id, .. }
            | ClientMessage::TaskProgress { room_id, .. }
            | ClientMessage::NextRound { room_id } => Some(room_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom { .. } => "create_room",
            ClientMessage::JoinRoom { .. } => "join_room",
            ClientMessage::StartGame { .. } => "start_game",
            ClientMessage::CategoryVote { .. } => "category_vote",
            ClientMessage::StartMeeting { .. } => "start_meeting",
            ClientMessage::CastVote { .. } => "cast_vote",
            ClientMessage::TaskProgress { .. } => "task_progress",
            ClientMessage::NextRound { .. } => "next_round",
        }
    }
}

/// Server -> Client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomCreated {
        room_id: String,
        players: Vec<Player>,
    },
    RoomJoined {
        room_id: String,
        players: Vec<Player>,
    },
    PlayerListUpdate {
        room_id: String,
        players: Vec<Player>,
    },
    RoomError {
        message: String,
    },
    GameStarted {
        players: Vec<Player>,
        round: u8,
    },
    CategoryVoteUpdate {
        /// category -> count
        votes: BTreeMap<String, u32>,
        total_players: usize,
    },
    CategorySelected {
        category: String,
        votes: BTreeMap<String, u32>,
    },
    /// Sent privately: each player only learns their own role.
    RoleAssigned {
        role: Role,
        round: u8,
    },
    MeetingStarted {
        players: Vec<Player>,
        triggered_by: String,
    },
    EjectionVoteUpdate {
        /// target id -> count, skips excluded
        votes: BTreeMap<PlayerId, u32>,
        total_voters: usize,
    },
    VoteResult {
        ejected_id: Option<PlayerId>,
        ejected_username: Option<String>,
        ejected_was_intern: bool,
        intern_username: String,
        alive_players: Vec<Player>,
    },
    TaskProgressUpdate {
        player_id: PlayerId,
        username: String,
        count: u32,
    },
    GameOver {
        winner: Team,
        intern_username: String,
        reason: String,
    },
    NextRoundStarted {
        round: u8,
        players: Vec<Player>,
    },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::RoomCreated { .. } => "room_created",
            ServerMessage::RoomJoined { .. } => "room_joined",
            ServerMessage::PlayerListUpdate { .. } => "player_list_update",
            ServerMessage::RoomError { .. } => "room_error",
            ServerMessage::GameStarted { .. } => "game_started",
            ServerMessage::CategoryVoteUpdate { .. } => "category_vote_update",
            ServerMessage::CategorySelected { .. } => "category_selected",
            ServerMessage::RoleAssigned { .. } => "role_assigned",
            ServerMessage::MeetingStarted { .. } => "meeting_started",
            ServerMessage::EjectionVoteUpdate { .. } => "ejection_vote_update",
            ServerMessage::VoteResult { .. } => "vote_result",
            ServerMessage::TaskProgressUpdate { .. } => "task_progress_update",
            ServerMessage::GameOver { .. } => "game_over",
            ServerMessage::NextRoundStarted { .. } => "next_round_started",
        }
    }

    pub fn room_error(message: impl Into<String>) -> Self {
        ServerMessage::RoomError {
            message: message.into(),
        }
    }
}
