use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};

use bugsus_core::net::messages::ServerMessage;
use bugsus_core::player::{Player, PlayerId};
use bugsus_core::rng::{RandomSource, StdRandom};
use bugsus_core::room::{Phase, Room, RoomConfig, generate_room_code};

use crate::timeouts::TimeoutCoordinator;

/// Per-player sender for outbound messages. Bounded so a slow client
/// cannot grow server memory; broadcasts to a full queue are skipped.
pub type PlayerSender = mpsc::Sender<ServerMessage>;

pub type SharedRegistry = Arc<RwLock<RoomRegistry>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room \"{0}\" does not exist.")]
    NotFound(String),
    #[error("Invalid room code")]
    InvalidCode,
    #[error("Room is full")]
    Full,
    #[error("Game already in progress")]
    GameInProgress,
    #[error("Invalid username")]
    InvalidUsername,
}

/// What became of a room after a player left it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removed {
    RoomDeleted { room_id: String },
    Updated { room_id: String },
}

struct RoomEntry {
    room: Room,
    connections: HashMap<PlayerId, PlayerSender>,
}

/// All live rooms, their connections and their deadlines.
pub struct RoomRegistry {
    rooms: HashMap<String, RoomEntry>,
    player_rooms: HashMap<PlayerId, String>,
    pub timers: TimeoutCoordinator,
    rng: Box<dyn RandomSource>,
    room_config: RoomConfig,
}

impl RoomRegistry {
    pub fn new(room_config: RoomConfig) -> Self {
        Self::with_rng(room_config, Box::new(StdRandom::from_os_rng()))
    }

    pub fn with_rng(room_config: RoomConfig, rng: Box<dyn RandomSource>) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            timers: TimeoutCoordinator::new(),
            rng,
            room_config,
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Open a room with `host` as its only player.
    pub fn create_room(&mut self, host: Player, sender: PlayerSender) -> &Room {
        let code = self.generate_unique_room_code();
        let host_id = host.id.clone();
        let room = Room::new(code.clone(), host, self.room_config.clone());
        let mut connections = HashMap::new();
        connections.insert(host_id.clone(), sender);
        self.player_rooms.insert(host_id.clone(), code.clone());

        tracing::info!(room = %code, player_id = %host_id, "Room created");
        let entry = self
            .rooms
            .entry(code)
            .or_insert(RoomEntry { room, connections });
        &entry.room
    }

    /// Seat a player in an existing lobby. Joining a room the player is
    /// already in succeeds without changing it.
    pub fn join_room(
        &mut self,
        room_id: &str,
        player: Player,
        sender: PlayerSender,
    ) -> Result<&Room, RoomError> {
        let entry = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;

        if !entry.room.contains(&player.id) {
            if entry.room.phase != Phase::Lobby {
                return Err(RoomError::GameInProgress);
            }
            if entry.room.is_full() {
                return Err(RoomError::Full);
            }
        }

        let player_id = player.id.clone();
        if entry.room.add_player(player) {
            tracing::info!(room = room_id, player_id = %player_id, "Player joined");
        }
        entry.connections.insert(player_id.clone(), sender);
        self.player_rooms.insert(player_id, room_id.to_string());
        Ok(&entry.room)
    }

    pub fn get_room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id).map(|e| &e.room)
    }

    pub fn get_room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id).map(|e| &mut e.room)
    }

    pub fn room_of_player(&self, player_id: &str) -> Option<&str> {
        self.player_rooms.get(player_id).map(String::as_str)
    }

    pub fn get_room_by_player(&self, player_id: &str) -> Option<&Room> {
        self.room_of_player(player_id)
            .and_then(|code| self.get_room(code))
    }

    /// Run a session operation that needs the room and the random source.
    pub fn with_session<T>(
        &mut self,
        room_id: &str,
        f: impl FnOnce(&mut Room, &mut dyn RandomSource) -> T,
    ) -> Option<T> {
        let entry = self.rooms.get_mut(room_id)?;
        Some(f(&mut entry.room, self.rng.as_mut()))
    }

    /// Unseat a player from whichever room holds them. An emptied room is
    /// deleted along with its timers.
    pub fn remove_player(&mut self, player_id: &str) -> Option<Removed> {
        let code = self.room_of_player(player_id)?.to_string();
        self.leave_room(&code, player_id)
    }

    /// Unseat a player from one specific room, e.g. when they switch to
    /// another room.
    pub fn leave_room(&mut self, room_id: &str, player_id: &str) -> Option<Removed> {
        if self.room_of_player(player_id) == Some(room_id) {
            self.player_rooms.remove(player_id);
        }
        let code = room_id.to_string();
        let entry = self.rooms.get_mut(&code)?;
        entry.room.remove_player(player_id)?;
        entry.connections.remove(player_id);

        if entry.room.is_empty() {
            self.rooms.remove(&code);
            let cancelled = self.timers.cancel_room(&code);
            tracing::info!(room = %code, cancelled_timers = cancelled, "Room destroyed");
            return Some(Removed::RoomDeleted { room_id: code });
        }
        tracing::info!(
            room = %code,
            player_id,
            remaining = entry.room.players.len(),
            "Player left room"
        );
        Some(Removed::Updated { room_id: code })
    }

    /// Queue a message for one player. Dropped if their queue is full.
    pub fn send_to(&self, room_id: &str, player_id: &str, msg: ServerMessage) {
        let Some(sender) = self
            .rooms
            .get(room_id)
            .and_then(|e| e.connections.get(player_id))
        else {
            return;
        };
        if let Err(e) = sender.try_send(msg) {
            tracing::debug!(
                player_id, room = room_id, error = %e,
                "Skipping message to slow client"
            );
        }
    }

    /// Queue a message for everyone in the room.
    pub fn broadcast(&self, room_id: &str, msg: &ServerMessage) {
        self.broadcast_filtered(room_id, msg, |_| true);
    }

    /// Queue a message for everyone in the room except one player.
    pub fn broadcast_except(&self, room_id: &str, exclude: &str, msg: &ServerMessage) {
        self.broadcast_filtered(room_id, msg, |id| id != exclude);
    }

    fn broadcast_filtered(
        &self,
        room_id: &str,
        msg: &ServerMessage,
        include: impl Fn(&str) -> bool,
    ) {
        let Some(entry) = self.rooms.get(room_id) else {
            return;
        };
        for (pid, sender) in &entry.connections {
            if include(pid.as_str())
                && let Err(e) = sender.try_send(msg.clone())
            {
                tracing::debug!(
                    player_id = %pid, room = room_id, error = %e, kind = msg.kind(),
                    "Skipping broadcast to slow client"
                );
            }
        }
    }

    /// Broadcast the current player list to everyone in the room.
    pub fn broadcast_player_list(&self, room_id: &str) {
        if let Some(room) = self.get_room(room_id) {
            let msg = ServerMessage::PlayerListUpdate {
                room_id: room.room_id.clone(),
                players: room.players.clone(),
            };
            self.broadcast(room_id, &msg);
        }
    }

    /// (active rooms, seated players)
    pub fn stats(&self) -> (usize, usize) {
        (self.rooms.len(), self.player_rooms.len())
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    fn generate_unique_room_code(&mut self) -> String {
        loop {
            let code = generate_room_code(self.rng.as_mut());
            if !self.rooms.contains_key(&code) {
                return code;
            }
            tracing::debug!(code = %code, "Room code collision, regenerating");
        }
    }
}
