//! Game session state machine.
//!
//! Every mutation of a [`Room`] after the lobby goes through the methods in
//! this module. Each method checks phase, membership and authority first
//! and leaves the room untouched when a check fails, so a stale or
//! duplicated client message can never corrupt state.

use crate::player::{Player, PlayerId, Role, Team};
use crate::rng::RandomSource;
use crate::room::{EjectionChoice, Phase, Room};
use crate::tally::{self, Tally};

/// Display name used when the work-period clock calls the meeting.
pub const TIMER_CALLER: &str = "TIMER";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("action not allowed during {0}")]
    InvalidPhase(Phase),
    #[error("only the host can do that")]
    NotHost,
    #[error("Need at least {min} players to start (have {have})")]
    NotEnoughPlayers { min: usize, have: usize },
    #[error("player is not in this room")]
    UnknownPlayer,
    #[error("eliminated players cannot act")]
    PlayerEliminated,
    #[error("vote target is not a living player")]
    InvalidTarget,
    #[error("unknown category {0:?}")]
    InvalidCategory(String),
    #[error("no living players")]
    NoLivingPlayers,
}

impl SessionError {
    /// Whether the acting client should hear about this failure.
    ///
    /// Phase and authority races settle once the client sees the next
    /// broadcast, so only an unmet player count is reported.
    pub fn is_surfaced(&self) -> bool {
        matches!(self, SessionError::NotEnoughPlayers { .. })
    }
}

/// Live state of a vote after a ballot lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteProgress<C: Ord> {
    pub tally: Tally<C>,
    /// Number of players whose ballot is awaited.
    pub eligible: usize,
    pub all_voted: bool,
}

/// Result of closing the category vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySelection {
    pub category: String,
    pub tally: Tally<String>,
    pub intern_id: PlayerId,
    pub round: u8,
}

/// Who opened an ejection meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingCaller {
    Player(PlayerId),
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinReason {
    InternEjected,
    EngineersOutnumbered,
    RoundsExhausted,
    InternDisconnected,
}

impl WinReason {
    pub fn message(self) -> &'static str {
        match self {
            WinReason::InternEjected => "The intern was ejected",
            WinReason::EngineersOutnumbered => "The engineers were outnumbered",
            WinReason::RoundsExhausted => "The intern survived every round",
            WinReason::InternDisconnected => "The intern disconnected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Victory {
    pub team: Team,
    pub reason: WinReason,
}

/// What leaving the round summary led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundAdvance {
    /// The next round's category vote is open.
    Started(u8),
    /// The roster changed during the summary and the game is decided; the
    /// room is `final`.
    Over(Victory),
}

/// Result of closing an ejection meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EjectionOutcome {
    pub ejected: Option<Player>,
    pub ejected_was_intern: bool,
    pub tally: Tally<PlayerId>,
    /// Set when the ejection ended the game; the room is then `final`.
    pub victory: Option<Victory>,
}

impl Room {
    fn expect_phase(&self, phase: Phase) -> Result<(), SessionError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(SessionError::InvalidPhase(self.phase))
        }
    }

    fn living_member(&self, id: &str) -> Result<&Player, SessionError> {
        let player = self.player(id).ok_or(SessionError::UnknownPlayer)?;
        if !player.alive {
            return Err(SessionError::PlayerEliminated);
        }
        Ok(player)
    }

    /// Host starts (or force-restarts) the game.
    ///
    /// Resets the round, every ballot map and task counter, revives all
    /// players and clears the intern, then opens the category vote.
    pub fn start_game(&mut self, requester: &str) -> Result<(), SessionError> {
        if !self.contains(requester) {
            return Err(SessionError::UnknownPlayer);
        }
        if !self.is_host(requester) {
            return Err(SessionError::NotHost);
        }
        if self.players.len() < self.config.min_players {
            return Err(SessionError::NotEnoughPlayers {
                min: self.config.min_players,
                have: self.players.len(),
            });
        }

        self.reset_session();
        self.enter(Phase::CategoryVote);
        Ok(())
    }

    fn reset_session(&mut self) {
        self.round = 1;
        self.category.clear();
        self.intern_id = None;
        self.category_votes.clear();
        self.ejection_votes.clear();
        self.tasks_completed.clear();
        self.winner = None;
        self.meeting_caller = None;
        for p in &mut self.players {
            p.alive = true;
        }
    }

    fn settle(&mut self, victory: Victory) {
        self.winner = Some(victory.team);
        self.ejection_votes.clear();
        self.meeting_caller = None;
        self.enter(Phase::Final);
    }

    /// Record (or replace) a player's category ballot.
    pub fn submit_category_vote(
        &mut self,
        voter: &str,
        category: &str,
    ) -> Result<VoteProgress<String>, SessionError> {
        self.expect_phase(Phase::CategoryVote)?;
        self.living_member(voter)?;
        if !self.config.categories.iter().any(|c| c == category) {
            return Err(SessionError::InvalidCategory(category.to_string()));
        }
        self.category_votes
            .insert(voter.to_string(), category.to_string());
        Ok(self.category_progress())
    }

    pub fn category_progress(&self) -> VoteProgress<String> {
        let eligible = self.alive_ids();
        VoteProgress {
            tally: tally::tally(&self.category_votes, &[]),
            eligible: eligible.len(),
            all_voted: tally::all_voted(&self.category_votes, &eligible),
        }
    }

    /// Close the category vote: pick the category, draw roles and move to
    /// `role_reveal`.
    ///
    /// With no ballots the configured default category is used. Fails with
    /// `InvalidPhase` once the vote has already been closed, so a second
    /// call cannot redraw the intern.
    pub fn finalize_category_vote(
        &mut self,
        rng: &mut dyn RandomSource,
    ) -> Result<CategorySelection, SessionError> {
        self.expect_phase(Phase::CategoryVote)?;
        if self.alive_count() == 0 {
            return Err(SessionError::NoLivingPlayers);
        }

        let counts = tally::tally(&self.category_votes, &[]);
        let category = tally::pick_winner(&counts, rng)
            .unwrap_or_else(|| self.config.default_category.clone());
        let intern_id = self.assign_roles(rng)?;

        self.category = category.clone();
        self.enter(Phase::RoleReveal);

        tracing::info!(
            room = %self.room_id,
            round = self.round,
            category = %category,
            "Category selected"
        );
        Ok(CategorySelection {
            category,
            tally: counts,
            intern_id,
            round: self.round,
        })
    }

    /// Draw this round's intern uniformly among living players.
    ///
    /// Runs as part of [`Room::finalize_category_vote`]; calling it on its
    /// own redraws the role.
    pub fn assign_roles(&mut self, rng: &mut dyn RandomSource) -> Result<PlayerId, SessionError> {
        let alive = self.alive_ids();
        if alive.is_empty() {
            return Err(SessionError::NoLivingPlayers);
        }
        let intern = alive[rng.pick_index(alive.len())].clone();
        self.intern_id = Some(intern.clone());
        Ok(intern)
    }

    /// Role a player holds this round, once roles are drawn.
    pub fn role_of(&self, id: &str) -> Option<Role> {
        let intern = self.intern_id.as_deref()?;
        self.player(id)?;
        Some(if intern == id {
            Role::Intern
        } else {
            Role::Engineer
        })
    }

    /// One private role per seated player.
    pub fn role_assignments(&self) -> Vec<(PlayerId, Role)> {
        self.players
            .iter()
            .filter_map(|p| self.role_of(&p.id).map(|role| (p.id.clone(), role)))
            .collect()
    }

    /// End the reveal and start the work period.
    pub fn begin_play(&mut self) -> Result<(), SessionError> {
        self.expect_phase(Phase::RoleReveal)?;
        self.enter(Phase::Game);
        Ok(())
    }

    /// Open an ejection meeting. Returns the caller's display name.
    pub fn trigger_meeting(&mut self, caller: MeetingCaller) -> Result<String, SessionError> {
        self.expect_phase(Phase::Game)?;
        let name = match &caller {
            MeetingCaller::Player(id) => self.living_member(id)?.username.clone(),
            MeetingCaller::Timer => TIMER_CALLER.to_string(),
        };

        self.ejection_votes.clear();
        self.meeting_caller = Some(name.clone());
        self.enter(Phase::Meeting);
        Ok(name)
    }

    /// Record (or replace) a player's ejection ballot.
    pub fn submit_ejection_vote(
        &mut self,
        voter: &str,
        choice: EjectionChoice,
    ) -> Result<VoteProgress<PlayerId>, SessionError> {
        self.expect_phase(Phase::Meeting)?;
        self.living_member(voter)?;
        if let EjectionChoice::Player(target) = &choice
            && !self.player(target).is_some_and(|p| p.alive)
        {
            return Err(SessionError::InvalidTarget);
        }
        self.ejection_votes.insert(voter.to_string(), choice);
        Ok(self.ejection_progress())
    }

    /// Ejection tally by target id. Skips are not counted.
    pub fn ejection_progress(&self) -> VoteProgress<PlayerId> {
        let eligible = self.alive_ids();
        let counts = tally::tally(&self.ejection_votes, &[EjectionChoice::Skip])
            .into_iter()
            .filter_map(|(choice, n)| match choice {
                EjectionChoice::Player(id) => Some((id, n)),
                EjectionChoice::Skip => None,
            })
            .collect();
        VoteProgress {
            tally: counts,
            eligible: eligible.len(),
            all_voted: tally::all_voted(&self.ejection_votes, &eligible),
        }
    }

    /// Close the meeting: eject the plurality target, if any, and decide
    /// whether the game is over.
    ///
    /// Ends in `final` with `winner` set, or in `summary` awaiting the next
    /// round.
    pub fn finalize_ejection_vote(
        &mut self,
        rng: &mut dyn RandomSource,
    ) -> Result<EjectionOutcome, SessionError> {
        self.expect_phase(Phase::Meeting)?;

        let counts = self.ejection_progress().tally;
        let target = tally::pick_winner(&counts, rng);
        let ejected = target.and_then(|id| {
            let player = self.player_mut(&id)?;
            player.alive = false;
            Some(player.clone())
        });
        let ejected_was_intern = ejected
            .as_ref()
            .is_some_and(|p| self.intern_id.as_deref() == Some(p.id.as_str()));

        self.ejection_votes.clear();
        self.meeting_caller = None;

        let victory = self.evaluate_victory();
        match victory {
            Some(v) => self.settle(v),
            None => {
                self.enter(Phase::Summary);
            },
        }

        tracing::info!(
            room = %self.room_id,
            round = self.round,
            ejected = ejected.as_ref().map(|p| p.username.as_str()).unwrap_or("no one"),
            game_over = victory.is_some(),
            "Ejection resolved"
        );
        Ok(EjectionOutcome {
            ejected,
            ejected_was_intern,
            tally: counts,
            victory,
        })
    }

    /// Win decided by who is still alive, ignoring the round counter.
    pub fn roster_victory(&self) -> Option<Victory> {
        let intern_id = self.intern_id.as_deref()?;
        let Some(intern) = self.player(intern_id) else {
            return Some(Victory {
                team: Team::Engineers,
                reason: WinReason::InternDisconnected,
            });
        };
        if !intern.alive {
            return Some(Victory {
                team: Team::Engineers,
                reason: WinReason::InternEjected,
            });
        }
        self.outnumbered()
    }

    /// Intern win once at most one engineer could be left standing.
    fn outnumbered(&self) -> Option<Victory> {
        self.intern_id.as_ref()?;
        let alive_engineers = self.alive_count().saturating_sub(1);
        (alive_engineers <= 1).then_some(Victory {
            team: Team::Intern,
            reason: WinReason::EngineersOutnumbered,
        })
    }

    /// Win check run after a meeting resolves: the roster rule, then the
    /// intern surviving the final round.
    pub fn evaluate_victory(&self) -> Option<Victory> {
        self.roster_victory().or_else(|| {
            (self.intern_id.is_some() && self.round >= self.config.final_round).then_some(
                Victory {
                    team: Team::Intern,
                    reason: WinReason::RoundsExhausted,
                },
            )
        })
    }

    pub fn check_win_condition(&self) -> Option<Team> {
        self.evaluate_victory().map(|v| v.team)
    }

    /// Leave `summary`: open the next round's category vote, or end the game
    /// if the roster changed during the summary and decides it.
    pub fn advance_round(&mut self) -> Result<RoundAdvance, SessionError> {
        self.expect_phase(Phase::Summary)?;
        if let Some(victory) = self.evaluate_victory() {
            self.settle(victory);
            return Ok(RoundAdvance::Over(victory));
        }
        self.round = self.round.saturating_add(1);
        self.category_votes.clear();
        self.ejection_votes.clear();
        self.enter(Phase::CategoryVote);
        Ok(RoundAdvance::Started(self.round))
    }

    /// Host skips the rest of the round summary.
    pub fn request_next_round(&mut self, requester: &str) -> Result<RoundAdvance, SessionError> {
        if !self.contains(requester) {
            return Err(SessionError::UnknownPlayer);
        }
        if !self.is_host(requester) {
            return Err(SessionError::NotHost);
        }
        self.advance_round()
    }

    /// Store a player's self-reported completed-task count.
    pub fn record_task_progress(&mut self, player: &str, count: u32) -> Result<(), SessionError> {
        self.expect_phase(Phase::Game)?;
        if !self.contains(player) {
            return Err(SessionError::UnknownPlayer);
        }
        self.tasks_completed.insert(player.to_string(), count);
        Ok(())
    }

    /// Re-check the roster after someone left a started game.
    ///
    /// During a category vote the previous round's intern is about to be
    /// redrawn, so only the head count matters there. A decided game moves
    /// the room to `final`.
    pub fn forfeit_on_departure(&mut self) -> Option<Victory> {
        let victory = match self.phase {
            Phase::RoleReveal | Phase::Game | Phase::Meeting | Phase::Summary => {
                self.roster_victory()?
            },
            Phase::CategoryVote => self.outnumbered()?,
            Phase::Lobby | Phase::Final => return None,
        };
        self.settle(victory);
        Some(victory)
    }

    /// Send a started room back to the lobby once nobody in it is alive,
    /// e.g. every survivor left and only ejected players remain. Returns
    /// whether the room was reset.
    pub fn abandon_if_no_survivors(&mut self) -> bool {
        if self.phase == Phase::Lobby || self.players.is_empty() || self.alive_count() > 0 {
            return false;
        }
        let from = self.phase;
        self.reset_session();
        self.enter(Phase::Lobby);
        tracing::info!(room = %self.room_id, from = %from, "No survivors left, back to lobby");
        true
    }

    /// Display name of this round's intern, empty before roles are drawn or
    /// once the intern has left.
    pub fn intern_username(&self) -> String {
        self.intern_id
            .as_deref()
            .and_then(|id| self.username_of(id))
            .unwrap_or_default()
            .to_string()
    }
}
