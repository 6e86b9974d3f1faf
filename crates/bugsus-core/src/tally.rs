//! Ballot counting shared by the category vote and the ejection vote.

use std::collections::{BTreeMap, HashMap};

use crate::player::PlayerId;
use crate::rng::RandomSource;

/// Count per choice. Ordered so tie-breaks and wire output are stable.
pub type Tally<C> = BTreeMap<C, u32>;

/// Count one ballot per voter, leaving out any choice listed in `exclude`.
pub fn tally<C: Ord + Clone>(votes: &HashMap<PlayerId, C>, exclude: &[C]) -> Tally<C> {
    let mut counts = Tally::new();
    for choice in votes.values() {
        if exclude.contains(choice) {
            continue;
        }
        *counts.entry(choice.clone()).or_insert(0) += 1;
    }
    counts
}

/// Pick the choice with the most votes.
///
/// A tie between top choices is broken uniformly at random. An empty tally
/// has no winner.
pub fn pick_winner<C: Ord + Clone>(counts: &Tally<C>, rng: &mut dyn RandomSource) -> Option<C> {
    let max = counts.values().copied().max().filter(|&m| m > 0)?;
    let mut leaders: Vec<&C> = counts
        .iter()
        .filter(|&(_, &n)| n == max)
        .map(|(choice, _)| choice)
        .collect();
    let idx = if leaders.len() == 1 {
        0
    } else {
        rng.pick_index(leaders.len())
    };
    Some(leaders.swap_remove(idx).clone())
}

/// Whether every eligible voter has a ballot in `votes`. Vacuously true
/// when nobody is eligible; rooms without living players are reset before
/// a vote could close on that.
pub fn all_voted<C>(votes: &HashMap<PlayerId, C>, eligible: &[PlayerId]) -> bool {
    eligible.iter().all(|id| votes.contains_key(id))
}
