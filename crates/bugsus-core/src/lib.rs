pub mod net;
pub mod player;
pub mod rng;
pub mod room;
pub mod session;
pub mod tally;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::collections::VecDeque;

    use crate::player::{Player, PlayerId};
    use crate::rng::RandomSource;
    use crate::room::{Room, RoomConfig};

    /// Random source that replays a fixed script of indices.
    ///
    /// Each pick pops the next entry modulo `len`; an exhausted script
    /// keeps answering `0`.
    #[derive(Debug, Default)]
    pub struct ScriptedRandom {
        picks: VecDeque<usize>,
        pub calls: usize,
    }

    impl ScriptedRandom {
        pub fn new(picks: impl IntoIterator<Item = usize>) -> Self {
            Self {
                picks: picks.into_iter().collect(),
                calls: 0,
            }
        }
    }

    impl RandomSource for ScriptedRandom {
        fn pick_index(&mut self, len: usize) -> usize {
            self.calls += 1;
            self.picks.pop_front().unwrap_or(0) % len
        }
    }

    /// Id of the `n`th test player (1-based).
    pub fn pid(n: usize) -> PlayerId {
        format!("p{n}")
    }

    /// Create `n` test players with ids `p1..=pn`.
    pub fn make_players(n: usize) -> Vec<Player> {
        (1..=n)
            .map(|i| Player::new(pid(i), format!("Player{i}")))
            .collect()
    }

    /// A lobby with `n` players; `p1` is host.
    pub fn lobby_room(n: usize) -> Room {
        let mut room = Room::new(
            "TESTAB".into(),
            Player::new(pid(1), "Player1"),
            RoomConfig::default(),
        );
        for p in make_players(n).into_iter().skip(1) {
            room.add_player(p);
        }
        room
    }

    /// A four-player room that has started, voted `category` unanimously,
    /// and drawn the intern at index `intern_idx` among living players.
    pub fn revealed_room(category: &str, intern_idx: usize) -> Room {
        let mut room = lobby_room(4);
        room.start_game(&pid(1)).expect("host can start");
        for i in 1..=4 {
            room.submit_category_vote(&pid(i), category)
                .expect("vote accepted");
        }
        let mut rng = ScriptedRandom::new([intern_idx]);
        room.finalize_category_vote(&mut rng)
            .expect("category vote finalizes");
        room
    }

    /// Like [`revealed_room`] but already in the meeting phase.
    pub fn meeting_room(intern_idx: usize) -> Room {
        let mut room = revealed_room("DSA", intern_idx);
        room.begin_play().expect("reveal ends");
        room.trigger_meeting(crate::session::MeetingCaller::Player(pid(1)))
            .expect("meeting starts");
        room
    }
}
