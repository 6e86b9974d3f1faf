#[allow(dead_code)]
mod common;

use std::time::Duration;

use bugsus_core::net::messages::{ClientMessage, ServerMessage};
use bugsus_core::player::{Role, Team};
use bugsus_core::room::EjectionChoice;
use bugsus_server::config::{GameConfig, ServerConfig};
use common::{TestServer, WsStream, ws_full_room, ws_read_until, ws_send_client_msg};

/// Short reveal and display delays so a whole game fits in a test. Votes
/// close early because every living player votes.
fn quick_config() -> ServerConfig {
    ServerConfig {
        game: GameConfig {
            role_reveal_ms: 100,
            result_display_ms: 100,
            summary_display_ms: 100,
            ..GameConfig::default()
        },
        ..ServerConfig::default()
    }
}

async fn start_game(code: &str, streams: &mut [WsStream]) {
    ws_send_client_msg(
        &mut streams[0],
        &ClientMessage::StartGame {
            room_id: code.to_string(),
        },
    )
    .await;
    for stream in streams.iter_mut() {
        match ws_read_until(stream, "game_started").await {
            ServerMessage::GameStarted { players, round } => {
                assert_eq!(players.len(), 4);
                assert_eq!(round, 1);
            },
            other => panic!("Expected GameStarted, got: {other:?}"),
        }
    }
}

/// Living players all vote `category`. Returns the index of this round's
/// intern, learned from the private role messages.
async fn play_category_vote(
    code: &str,
    streams: &mut [WsStream],
    alive: &[usize],
    category: &str,
) -> usize {
    for &i in alive {
        ws_send_client_msg(
            &mut streams[i],
            &ClientMessage::CategoryVote {
                room_id: code.to_string(),
                category: category.to_string(),
            },
        )
        .await;
    }

    let mut interns = Vec::new();
    for (i, stream) in streams.iter_mut().enumerate() {
        match ws_read_until(stream, "category_selected").await {
            ServerMessage::CategorySelected { category: chosen, votes } => {
                assert_eq!(chosen, category);
                assert_eq!(votes.get(category).copied(), Some(alive.len() as u32));
            },
            other => panic!("Expected CategorySelected, got: {other:?}"),
        }
        match ws_read_until(stream, "role_assigned").await {
            ServerMessage::RoleAssigned { role, .. } => {
                if role == Role::Intern {
                    interns.push(i);
                }
            },
            other => panic!("Expected RoleAssigned, got: {other:?}"),
        }
    }
    assert_eq!(interns.len(), 1, "exactly one intern per round");
    assert!(alive.contains(&interns[0]), "intern is drawn among the living");
    interns[0]
}

/// Wait out the reveal, then have `caller` open a meeting.
async fn call_meeting(code: &str, streams: &mut [WsStream], caller: usize) {
    tokio::time::sleep(Duration::from_millis(300)).await;
    ws_send_client_msg(
        &mut streams[caller],
        &ClientMessage::StartMeeting {
            room_id: code.to_string(),
        },
    )
    .await;
    let expected = format!("Player{}", caller + 1);
    for stream in streams.iter_mut() {
        match ws_read_until(stream, "meeting_started").await {
            ServerMessage::MeetingStarted { triggered_by, .. } => assert_eq!(triggered_by, expected),
            other => panic!("Expected MeetingStarted, got: {other:?}"),
        }
    }
}

async fn cast(code: &str, stream: &mut WsStream, target: EjectionChoice) {
    ws_send_client_msg(
        stream,
        &ClientMessage::CastVote {
            room_id: code.to_string(),
            target_id: target,
        },
    )
    .await;
}

fn player_id(msg: &ServerMessage, username: &str) -> String {
    match msg {
        ServerMessage::GameStarted { players, .. } | ServerMessage::MeetingStarted { players, .. } => {
            players
                .iter()
                .find(|p| p.username == username)
                .map(|p| p.id.clone())
                .unwrap()
        },
        other => panic!("No roster in {other:?}"),
    }
}

/// Everyone's server-side id, in stream order.
async fn roster_ids(code: &str, streams: &mut [WsStream]) -> Vec<String> {
    ws_send_client_msg(
        &mut streams[0],
        &ClientMessage::StartGame {
            room_id: code.to_string(),
        },
    )
    .await;
    let mut ids = Vec::new();
    let mut first = None;
    for stream in streams.iter_mut() {
        let msg = ws_read_until(stream, "game_started").await;
        if first.is_none() {
            first = Some(msg);
        }
    }
    let first = first.unwrap();
    for i in 0..streams.len() {
        ids.push(player_id(&first, &format!("Player{}", i + 1)));
    }
    ids
}

#[tokio::test]
async fn ejecting_the_intern_wins_for_engineers() {
    let server = TestServer::from_config(quick_config()).await;
    let (code, mut streams) = ws_full_room(&server, 4).await;
    let ids = roster_ids(&code, &mut streams).await;
    let alive: Vec<usize> = (0..4).collect();

    let intern = play_category_vote(&code, &mut streams, &alive, "DSA").await;
    call_meeting(&code, &mut streams, 0).await;

    for &i in &alive {
        let target = if i == intern {
            EjectionChoice::Skip
        } else {
            EjectionChoice::Player(ids[intern].clone())
        };
        cast(&code, &mut streams[i], target).await;
    }

    let intern_name = format!("Player{}", intern + 1);
    for stream in &mut streams {
        match ws_read_until(stream, "vote_result").await {
            ServerMessage::VoteResult {
                ejected_id,
                ejected_username,
                ejected_was_intern,
                intern_username,
                alive_players,
            } => {
                assert_eq!(ejected_id.as_deref(), Some(ids[intern].as_str()));
                assert_eq!(ejected_username.as_deref(), Some(intern_name.as_str()));
                assert!(ejected_was_intern);
                assert_eq!(intern_username, intern_name);
                assert_eq!(alive_players.len(), 3);
            },
            other => panic!("Expected VoteResult, got: {other:?}"),
        }
        match ws_read_until(stream, "game_over").await {
            ServerMessage::GameOver {
                winner,
                intern_username,
                reason,
            } => {
                assert_eq!(winner, Team::Engineers);
                assert_eq!(intern_username, intern_name);
                assert_eq!(reason, "The intern was ejected");
            },
            other => panic!("Expected GameOver, got: {other:?}"),
        }
    }
}

#[tokio::test]
async fn intern_surviving_every_round_wins() {
    let server = TestServer::from_config(quick_config()).await;
    let (code, mut streams) = ws_full_room(&server, 4).await;
    start_game(&code, &mut streams).await;
    let alive: Vec<usize> = (0..4).collect();

    for round in 1..=3u8 {
        play_category_vote(&code, &mut streams, &alive, "BACKEND").await;
        call_meeting(&code, &mut streams, 1).await;
        for &i in &alive {
            cast(&code, &mut streams[i], EjectionChoice::Skip).await;
        }
        for stream in &mut streams {
            match ws_read_until(stream, "vote_result").await {
                ServerMessage::VoteResult { ejected_id, .. } => assert!(ejected_id.is_none()),
                other => panic!("Expected VoteResult, got: {other:?}"),
            }
        }

        if round < 3 {
            // The summary timer opens the next round.
            for stream in &mut streams {
                match ws_read_until(stream, "next_round_started").await {
                    ServerMessage::NextRoundStarted { round: next, .. } => {
                        assert_eq!(next, round + 1);
                    },
                    other => panic!("Expected NextRoundStarted, got: {other:?}"),
                }
            }
        }
    }

    for stream in &mut streams {
        match ws_read_until(stream, "game_over").await {
            ServerMessage::GameOver { winner, reason, .. } => {
                assert_eq!(winner, Team::Intern);
                assert_eq!(reason, "The intern survived every round");
            },
            other => panic!("Expected GameOver, got: {other:?}"),
        }
    }
}

#[tokio::test]
async fn engineers_outnumbered_after_two_wrong_ejections() {
    let server = TestServer::from_config(quick_config()).await;
    let (code, mut streams) = ws_full_room(&server, 4).await;
    let ids = roster_ids(&code, &mut streams).await;
    let mut alive: Vec<usize> = (0..4).collect();

    for round in 1..=2u8 {
        let intern = play_category_vote(&code, &mut streams, &alive, "OOPS").await;
        call_meeting(&code, &mut streams, alive[0]).await;

        // Everyone piles onto the first living engineer.
        let Some(&victim) = alive.iter().find(|&&i| i != intern) else {
            panic!("no engineer left");
        };
        for &i in &alive {
            cast(&code, &mut streams[i], EjectionChoice::Player(ids[victim].clone())).await;
        }
        for stream in &mut streams {
            match ws_read_until(stream, "vote_result").await {
                ServerMessage::VoteResult {
                    ejected_id,
                    ejected_was_intern,
                    ..
                } => {
                    assert_eq!(ejected_id.as_deref(), Some(ids[victim].as_str()));
                    assert!(!ejected_was_intern);
                },
                other => panic!("Expected VoteResult, got: {other:?}"),
            }
        }
        alive.retain(|&i| i != victim);

        if round == 1 {
            for stream in &mut streams {
                ws_read_until(stream, "next_round_started").await;
            }
        }
    }

    for stream in &mut streams {
        match ws_read_until(stream, "game_over").await {
            ServerMessage::GameOver { winner, reason, .. } => {
                assert_eq!(winner, Team::Intern);
                assert_eq!(reason, "The engineers were outnumbered");
            },
            other => panic!("Expected GameOver, got: {other:?}"),
        }
    }
}

#[tokio::test]
async fn host_can_skip_the_summary() {
    let config = ServerConfig {
        game: GameConfig {
            role_reveal_ms: 100,
            summary_display_ms: 60_000,
            ..GameConfig::default()
        },
        ..ServerConfig::default()
    };
    let server = TestServer::from_config(config).await;
    let (code, mut streams) = ws_full_room(&server, 4).await;
    start_game(&code, &mut streams).await;
    let alive: Vec<usize> = (0..4).collect();

    play_category_vote(&code, &mut streams, &alive, "FRONTEND").await;
    call_meeting(&code, &mut streams, 2).await;
    for &i in &alive {
        cast(&code, &mut streams[i], EjectionChoice::Skip).await;
    }
    for stream in &mut streams {
        ws_read_until(stream, "vote_result").await;
    }

    ws_send_client_msg(
        &mut streams[0],
        &ClientMessage::NextRound {
            room_id: code.clone(),
        },
    )
    .await;
    for stream in &mut streams {
        match ws_read_until(stream, "next_round_started").await {
            ServerMessage::NextRoundStarted { round, players } => {
                assert_eq!(round, 2);
                assert_eq!(players.len(), 4);
            },
            other => panic!("Expected NextRoundStarted, got: {other:?}"),
        }
    }
}
