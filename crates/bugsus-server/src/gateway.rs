//! Event gateway.
//!
//! Translates client messages into session operations on the registry and
//! fans the results out to the room. Every handler runs under the registry
//! write lock, so votes, deadlines and disconnects of a room never
//! interleave.

use std::sync::Arc;

use futures::future::BoxFuture;

use bugsus_core::net::messages::{ClientMessage, ServerMessage};
use bugsus_core::player::{Player, normalize_username};
use bugsus_core::room::{EjectionChoice, Phase, is_valid_room_code, normalize_room_code};
use bugsus_core::session::{MeetingCaller, RoundAdvance, SessionError, Victory};

use crate::registry::{PlayerSender, Removed, RoomError, RoomRegistry, SharedRegistry};
use crate::timeouts::PhaseTag;

/// A pending deadline and what happens when it passes.
#[derive(Debug, Clone)]
enum Deadline {
    CategoryVote,
    RoleReveal,
    WorkPeriod,
    Ejection,
    RoundSummary,
    GameOver(ServerMessage),
}

impl Deadline {
    fn tag(&self) -> PhaseTag {
        match self {
            Deadline::CategoryVote => PhaseTag::CategoryVote,
            Deadline::RoleReveal => PhaseTag::RoleReveal,
            Deadline::WorkPeriod => PhaseTag::WorkPeriod,
            Deadline::Ejection => PhaseTag::Ejection,
            Deadline::RoundSummary => PhaseTag::RoundSummary,
            Deadline::GameOver(_) => PhaseTag::GameOver,
        }
    }
}

/// Handle one decoded message from `player_id`.
pub async fn handle_client_message(
    shared: &SharedRegistry,
    player_id: &str,
    sender: &PlayerSender,
    msg: ClientMessage,
) {
    let mut reg = shared.write().await;
    dispatch(&mut reg, shared, player_id, sender, msg);
}

/// Handle a closed connection.
pub async fn handle_disconnect(shared: &SharedRegistry, player_id: &str) {
    let mut reg = shared.write().await;
    if let Some(code) = reg.room_of_player(player_id).map(str::to_string) {
        depart(&mut reg, shared, &code, player_id);
    }
}

fn dispatch(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    player_id: &str,
    sender: &PlayerSender,
    msg: ClientMessage,
) {
    let kind = msg.kind();
    match msg {
        ClientMessage::CreateRoom { username } => {
            create_room(reg, shared, player_id, sender, &username);
        },
        ClientMessage::JoinRoom { room_id, username } => {
            join_room(reg, shared, player_id, sender, &room_id, &username);
        },
        other => {
            let Some(code) = acting_room(reg, player_id, &other) else {
                return;
            };
            let result = match other {
                ClientMessage::StartGame { .. } => start_game(reg, shared, &code, player_id),
                ClientMessage::CategoryVote { category, .. } => {
                    category_vote(reg, shared, &code, player_id, &category)
                },
                ClientMessage::StartMeeting { .. } => {
                    open_meeting(reg, shared, &code, MeetingCaller::Player(player_id.to_string()))
                },
                ClientMessage::CastVote { target_id, .. } => {
                    cast_vote(reg, shared, &code, player_id, target_id)
                },
                ClientMessage::TaskProgress { count, .. } => {
                    task_progress(reg, &code, player_id, count)
                },
                ClientMessage::NextRound { .. } => next_round(reg, shared, &code, player_id),
                ClientMessage::CreateRoom { .. } | ClientMessage::JoinRoom { .. } => Ok(()),
            };
            if let Err(e) = result {
                reject(reg, &code, player_id, kind, &e);
            }
        },
    }
}

/// Room a room-scoped message applies to: the sender's current room, as
/// long as the message names that room.
fn acting_room(reg: &RoomRegistry, player_id: &str, msg: &ClientMessage) -> Option<String> {
    let Some(code) = reg.room_of_player(player_id) else {
        tracing::debug!(player_id, kind = msg.kind(), "Dropped message from player outside any room");
        return None;
    };
    if let Some(claimed) = msg.room_id()
        && normalize_room_code(claimed) != code
    {
        tracing::debug!(
            player_id,
            room = code,
            claimed,
            kind = msg.kind(),
            "Dropped message addressed to another room"
        );
        return None;
    }
    Some(code.to_string())
}

fn reply(sender: &PlayerSender, msg: ServerMessage) {
    if let Err(e) = sender.try_send(msg) {
        tracing::debug!(error = %e, "Skipping reply to slow client");
    }
}

fn reject(reg: &RoomRegistry, code: &str, player_id: &str, kind: &str, err: &SessionError) {
    if err.is_surfaced() {
        reg.send_to(code, player_id, ServerMessage::room_error(err.to_string()));
    } else {
        tracing::debug!(room = code, player_id, kind, error = %err, "Dropped action");
    }
}

fn create_room(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    player_id: &str,
    sender: &PlayerSender,
    username: &str,
) {
    let Some(username) = normalize_username(username) else {
        reply(sender, ServerMessage::room_error(RoomError::InvalidUsername.to_string()));
        return;
    };
    if let Some(code) = reg.room_of_player(player_id).map(str::to_string) {
        depart(reg, shared, &code, player_id);
    }

    let room = reg.create_room(Player::new(player_id, username), sender.clone());
    reply(
        sender,
        ServerMessage::RoomCreated {
            room_id: room.room_id.clone(),
            players: room.players.clone(),
        },
    );
}

fn join_room(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    player_id: &str,
    sender: &PlayerSender,
    room_id: &str,
    username: &str,
) {
    let Some(username) = normalize_username(username) else {
        reply(sender, ServerMessage::room_error(RoomError::InvalidUsername.to_string()));
        return;
    };
    let code = normalize_room_code(room_id);
    if !is_valid_room_code(&code) {
        reply(sender, ServerMessage::room_error(RoomError::InvalidCode.to_string()));
        return;
    }

    let previous = reg
        .room_of_player(player_id)
        .filter(|current| *current != code)
        .map(str::to_string);

    let (room_id, players) =
        match reg.join_room(&code, Player::new(player_id, username), sender.clone()) {
            Ok(room) => (room.room_id.clone(), room.players.clone()),
            Err(e) => {
                tracing::debug!(room = %code, player_id, error = %e, "Join rejected");
                reply(sender, ServerMessage::room_error(e.to_string()));
                return;
            },
        };

    if let Some(previous) = previous {
        depart(reg, shared, &previous, player_id);
    }

    reply(
        sender,
        ServerMessage::RoomJoined {
            room_id: room_id.clone(),
            players: players.clone(),
        },
    );
    reg.broadcast_except(
        &code,
        player_id,
        &ServerMessage::PlayerListUpdate { room_id, players },
    );
}

fn start_game(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    code: &str,
    player_id: &str,
) -> Result<(), SessionError> {
    let room = reg.get_room_mut(code).ok_or(SessionError::UnknownPlayer)?;
    room.start_game(player_id)?;
    let msg = ServerMessage::GameStarted {
        players: room.players.clone(),
        round: room.round,
    };

    let cancelled = reg.timers.cancel_room(code);
    tracing::info!(room = code, player_id, cancelled_timers = cancelled, "Game started");
    reg.broadcast(code, &msg);
    arm(reg, shared, code, Deadline::CategoryVote);
    Ok(())
}

fn category_vote(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    code: &str,
    player_id: &str,
    category: &str,
) -> Result<(), SessionError> {
    let room = reg.get_room_mut(code).ok_or(SessionError::UnknownPlayer)?;
    let progress = room.submit_category_vote(player_id, category)?;

    reg.broadcast(
        code,
        &ServerMessage::CategoryVoteUpdate {
            votes: progress.tally,
            total_players: progress.eligible,
        },
    );
    if progress.all_voted {
        finalize_category(reg, shared, code);
    }
    Ok(())
}

/// Close the category vote, whether everyone voted or time ran out.
fn finalize_category(reg: &mut RoomRegistry, shared: &SharedRegistry, code: &str) {
    reg.timers.cancel(code, PhaseTag::CategoryVote);
    let selection = match reg.with_session(code, |room, rng| room.finalize_category_vote(rng)) {
        Some(Ok(selection)) => selection,
        Some(Err(e)) => {
            tracing::debug!(room = code, error = %e, "Category vote not finalized");
            return;
        },
        None => return,
    };

    reg.broadcast(
        code,
        &ServerMessage::CategorySelected {
            category: selection.category,
            votes: selection.tally,
        },
    );
    let roles = reg
        .get_room(code)
        .map(|room| room.role_assignments())
        .unwrap_or_default();
    for (pid, role) in roles {
        reg.send_to(
            code,
            &pid,
            ServerMessage::RoleAssigned {
                role,
                round: selection.round,
            },
        );
    }
    arm(reg, shared, code, Deadline::RoleReveal);
}

fn begin_play(reg: &mut RoomRegistry, shared: &SharedRegistry, code: &str) {
    let Some(room) = reg.get_room_mut(code) else {
        return;
    };
    match room.begin_play() {
        Ok(()) => {
            tracing::debug!(room = code, round = room.round, "Work period started");
            arm(reg, shared, code, Deadline::WorkPeriod);
        },
        Err(e) => tracing::debug!(room = code, error = %e, "Reveal already over"),
    }
}

fn open_meeting(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    code: &str,
    caller: MeetingCaller,
) -> Result<(), SessionError> {
    let room = reg.get_room_mut(code).ok_or(SessionError::UnknownPlayer)?;
    let triggered_by = room.trigger_meeting(caller)?;
    let msg = ServerMessage::MeetingStarted {
        players: room.players.clone(),
        triggered_by,
    };

    reg.timers.cancel(code, PhaseTag::WorkPeriod);
    tracing::info!(room = code, "Meeting started");
    reg.broadcast(code, &msg);
    arm(reg, shared, code, Deadline::Ejection);
    Ok(())
}

fn cast_vote(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    code: &str,
    player_id: &str,
    choice: EjectionChoice,
) -> Result<(), SessionError> {
    let room = reg.get_room_mut(code).ok_or(SessionError::UnknownPlayer)?;
    let progress = room.submit_ejection_vote(player_id, choice)?;

    reg.broadcast(
        code,
        &ServerMessage::EjectionVoteUpdate {
            votes: progress.tally,
            total_voters: progress.eligible,
        },
    );
    if progress.all_voted {
        finalize_meeting(reg, shared, code);
    }
    Ok(())
}

/// Close the meeting, whether everyone voted or time ran out.
fn finalize_meeting(reg: &mut RoomRegistry, shared: &SharedRegistry, code: &str) {
    reg.timers.cancel(code, PhaseTag::Ejection);
    let outcome = match reg.with_session(code, |room, rng| room.finalize_ejection_vote(rng)) {
        Some(Ok(outcome)) => outcome,
        Some(Err(e)) => {
            tracing::debug!(room = code, error = %e, "Meeting not finalized");
            return;
        },
        None => return,
    };
    let Some(room) = reg.get_room(code) else {
        return;
    };

    let intern_username = room.intern_username();
    let msg = ServerMessage::VoteResult {
        ejected_id: outcome.ejected.as_ref().map(|p| p.id.clone()),
        ejected_username: outcome.ejected.as_ref().map(|p| p.username.clone()),
        ejected_was_intern: outcome.ejected_was_intern,
        intern_username: intern_username.clone(),
        alive_players: room.alive_players().cloned().collect(),
    };
    reg.broadcast(code, &msg);

    let next = match outcome.victory {
        Some(victory) => Deadline::GameOver(game_over(victory, intern_username)),
        None => Deadline::RoundSummary,
    };
    arm(reg, shared, code, next);
}

fn game_over(victory: Victory, intern_username: String) -> ServerMessage {
    ServerMessage::GameOver {
        winner: victory.team,
        intern_username,
        reason: victory.reason.message().to_string(),
    }
}

fn task_progress(
    reg: &mut RoomRegistry,
    code: &str,
    player_id: &str,
    count: u32,
) -> Result<(), SessionError> {
    let room = reg.get_room_mut(code).ok_or(SessionError::UnknownPlayer)?;
    room.record_task_progress(player_id, count)?;
    let username = room.username_of(player_id).unwrap_or_default().to_string();

    reg.broadcast(
        code,
        &ServerMessage::TaskProgressUpdate {
            player_id: player_id.to_string(),
            username,
            count,
        },
    );
    Ok(())
}

fn next_round(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    code: &str,
    player_id: &str,
) -> Result<(), SessionError> {
    let room = reg.get_room_mut(code).ok_or(SessionError::UnknownPlayer)?;
    let advance = room.request_next_round(player_id)?;
    reg.timers.cancel(code, PhaseTag::RoundSummary);
    leave_summary(reg, shared, code, advance);
    Ok(())
}

fn leave_summary(
    reg: &mut RoomRegistry,
    shared: &SharedRegistry,
    code: &str,
    advance: RoundAdvance,
) {
    match advance {
        RoundAdvance::Started(round) => announce_next_round(reg, shared, code, round),
        RoundAdvance::Over(victory) => {
            let intern_username = reg
                .get_room(code)
                .map(|room| room.intern_username())
                .unwrap_or_default();
            reg.timers.cancel_room(code);
            tracing::info!(room = code, winner = ?victory.team, "Game decided during summary");
            reg.broadcast(code, &game_over(victory, intern_username));
        },
    }
}

fn announce_next_round(reg: &mut RoomRegistry, shared: &SharedRegistry, code: &str, round: u8) {
    let Some(room) = reg.get_room(code) else {
        return;
    };
    let msg = ServerMessage::NextRoundStarted {
        round,
        players: room.players.clone(),
    };
    tracing::info!(room = code, round, "Next round started");
    reg.broadcast(code, &msg);
    arm(reg, shared, code, Deadline::CategoryVote);
}

/// Unseat a player, tell the room, then settle anything the departure
/// decided: a room with no survivors, a forfeited game, or a vote that is
/// now complete.
fn depart(reg: &mut RoomRegistry, shared: &SharedRegistry, code: &str, player_id: &str) {
    // Read before unseating so a departing intern is still named.
    let intern_username = reg
        .get_room(code)
        .map(|room| room.intern_username())
        .unwrap_or_default();
    let Some(Removed::Updated { .. }) = reg.leave_room(code, player_id) else {
        return;
    };
    if reg
        .get_room_mut(code)
        .is_some_and(|room| room.abandon_if_no_survivors())
    {
        reg.timers.cancel_room(code);
        reg.broadcast_player_list(code);
        return;
    }
    reg.broadcast_player_list(code);

    let Some(room) = reg.get_room_mut(code) else {
        return;
    };
    if let Some(victory) = room.forfeit_on_departure() {
        reg.timers.cancel_room(code);
        tracing::info!(room = code, winner = ?victory.team, "Game forfeited by departure");
        reg.broadcast(code, &game_over(victory, intern_username));
        return;
    }

    let phase = room.phase;
    let vote_complete = match phase {
        Phase::CategoryVote => room.category_progress().all_voted,
        Phase::Meeting => room.ejection_progress().all_voted,
        _ => false,
    };
    match phase {
        Phase::CategoryVote if vote_complete => finalize_category(reg, shared, code),
        Phase::Meeting if vote_complete => finalize_meeting(reg, shared, code),
        _ => {},
    }
}

/// Arm the room's timer for `deadline`, using the room's configured pacing.
fn arm(reg: &mut RoomRegistry, shared: &SharedRegistry, code: &str, deadline: Deadline) {
    let Some(room) = reg.get_room(code) else {
        return;
    };
    let pacing = &room.config;
    let after = match &deadline {
        Deadline::CategoryVote => pacing.category_vote_duration,
        Deadline::RoleReveal => pacing.role_reveal_duration,
        Deadline::WorkPeriod => pacing.work_period_duration,
        Deadline::Ejection => pacing.ejection_vote_duration,
        Deadline::RoundSummary => pacing.summary_display_duration,
        Deadline::GameOver(_) => pacing.result_display_duration,
    };

    let tag = deadline.tag();
    let shared = Arc::clone(shared);
    let room_id = code.to_string();
    reg.timers.schedule(code, tag, after, move |generation| {
        fire(shared, room_id, deadline, generation)
    });
}

fn fire(
    shared: SharedRegistry,
    code: String,
    deadline: Deadline,
    generation: u64,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let mut reg = shared.write().await;
        let tag = deadline.tag();
        if !reg.timers.claim(&code, tag, generation) {
            tracing::debug!(room = %code, ?tag, "Stale deadline ignored");
            return;
        }
        tracing::debug!(room = %code, ?tag, "Deadline reached");
        on_deadline(&mut reg, &shared, &code, deadline);
    })
}

fn on_deadline(reg: &mut RoomRegistry, shared: &SharedRegistry, code: &str, deadline: Deadline) {
    match deadline {
        Deadline::CategoryVote => finalize_category(reg, shared, code),
        Deadline::RoleReveal => begin_play(reg, shared, code),
        Deadline::WorkPeriod => {
            if let Err(e) = open_meeting(reg, shared, code, MeetingCaller::Timer) {
                tracing::debug!(room = code, error = %e, "Work period ended outside play");
            }
        },
        Deadline::Ejection => finalize_meeting(reg, shared, code),
        Deadline::RoundSummary => {
            let advanced = reg.get_room_mut(code).map(|room| room.advance_round());
            match advanced {
                Some(Ok(advance)) => leave_summary(reg, shared, code, advance),
                Some(Err(e)) => {
                    tracing::debug!(room = code, error = %e, "Summary deadline ignored");
                },
                None => {},
            }
        },
        Deadline::GameOver(msg) => {
            tracing::info!(room = code, "Game over");
            reg.broadcast(code, &msg);
        },
    }
}
