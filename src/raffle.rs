use std::collections::BTreeSet;

use rand::seq::IteratorRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::config::KeywordMatch;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Collecting {
        keyword: String,
    },
}

/// Current raffle phase plus the users who have entered.
/// `entrants` is always empty while `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RaffleState {
    pub phase: Phase,
    pub entrants: BTreeSet<String>,
}

impl RaffleState {
    pub fn keyword(&self) -> Option<&str> {
        match &self.phase {
            Phase::Collecting { keyword } => Some(keyword.as_str()),
            Phase::Idle => None,
        }
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.phase, Phase::Collecting { .. })
    }
}

/// Result of an owner toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaffleOutcome {
    /// Requester is not the channel owner
    Ignored,
    Started { keyword: String },
    /// Tried to start without a keyword; still idle
    MissingKeyword,
    Winner(String),
    NoEntrants,
}

impl RaffleOutcome {
    /// Text to announce in chat, if this outcome has one.
    pub fn announcement(&self) -> Option<String> {
        match self {
            RaffleOutcome::Winner(user) => Some(format!("{} is the winner!", user)),
            RaffleOutcome::NoEntrants => Some("The raffle ended with no entrants.".to_string()),
            RaffleOutcome::Ignored
            | RaffleOutcome::Started { .. }
            | RaffleOutcome::MissingKeyword => None,
        }
    }
}

pub struct RaffleMachine {
    state: RaffleState,
    matching: KeywordMatch,
}

impl RaffleMachine {
    pub fn new(matching: KeywordMatch) -> Self {
        Self {
            state: RaffleState::default(),
            matching,
        }
    }

    pub fn state(&self) -> &RaffleState {
        &self.state
    }

    /// Owner toggle: start collecting with `args[0]` as keyword, or conclude
    /// the running raffle.
    pub fn start_or_stop(&mut self, requester_is_owner: bool, args: &[String]) -> RaffleOutcome {
        self.start_or_stop_with(requester_is_owner, args, &mut rand::rng())
    }

    pub fn start_or_stop_with<R: Rng + ?Sized>(
        &mut self,
        requester_is_owner: bool,
        args: &[String],
        rng: &mut R,
    ) -> RaffleOutcome {
        if !requester_is_owner {
            return RaffleOutcome::Ignored;
        }

        if self.state.is_collecting() {
            return self.conclude_with(rng);
        }

        match args.first() {
            Some(keyword) => {
                self.state.entrants.clear();
                self.state.phase = Phase::Collecting {
                    keyword: keyword.clone(),
                };
                RaffleOutcome::Started {
                    keyword: keyword.clone(),
                }
            }
            None => RaffleOutcome::MissingKeyword,
        }
    }

    /// Pick a uniformly random winner and reset to `Idle`.
    fn conclude_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> RaffleOutcome {
        let entrants = std::mem::take(&mut self.state.entrants);
        self.state.phase = Phase::Idle;

        info!("Raffle has ended with {} entrant(s)", entrants.len());
        match entrants.into_iter().choose(rng) {
            Some(winner) => {
                info!("Winner: {}", winner);
                RaffleOutcome::Winner(winner)
            }
            None => RaffleOutcome::NoEntrants,
        }
    }

    /// Record `speaker` as an entrant if `text` is the active keyword.
    /// Returns true only when the speaker was newly added.
    pub fn on_chat_line(&mut self, speaker: &str, text: &str) -> bool {
        let Some(keyword) = self.state.keyword() else {
            return false;
        };

        if !self.matching.matches(keyword, text) {
            return false;
        }

        if self.state.entrants.insert(speaker.to_string()) {
            info!("{} - has been added to entry list", speaker);
            true
        } else {
            debug!("{} already entered", speaker);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn collecting(keyword: &str) -> RaffleMachine {
        let mut raffle = RaffleMachine::new(KeywordMatch::default());
        raffle.start_or_stop(true, &args(&[keyword]));
        raffle
    }

    #[test]
    fn test_non_owner_cannot_start() {
        let mut raffle = RaffleMachine::new(KeywordMatch::default());
        let outcome = raffle.start_or_stop(false, &args(&["giveaway"]));
        assert_eq!(outcome, RaffleOutcome::Ignored);
        assert_eq!(raffle.state(), &RaffleState::default());
    }

    #[test]
    fn test_non_owner_cannot_stop() {
        let mut raffle = collecting("giveaway");
        raffle.on_chat_line("alice", "giveaway");
        let before = raffle.state().clone();

        assert_eq!(raffle.start_or_stop(false, &[]), RaffleOutcome::Ignored);
        assert_eq!(raffle.state(), &before);
    }

    #[test]
    fn test_start_with_keyword() {
        let mut raffle = RaffleMachine::new(KeywordMatch::default());
        let outcome = raffle.start_or_stop(true, &args(&["giveaway", "ignored"]));
        assert_eq!(
            outcome,
            RaffleOutcome::Started {
                keyword: "giveaway".to_string()
            }
        );
        assert!(raffle.state().is_collecting());
        assert_eq!(raffle.state().keyword(), Some("giveaway"));
        assert!(raffle.state().entrants.is_empty());
        assert_eq!(outcome.announcement(), None);
    }

    #[test]
    fn test_start_without_keyword_stays_idle() {
        let mut raffle = RaffleMachine::new(KeywordMatch::default());
        let outcome = raffle.start_or_stop(true, &[]);
        assert_eq!(outcome, RaffleOutcome::MissingKeyword);
        assert_eq!(raffle.state().phase, Phase::Idle);
        assert_eq!(raffle.state().keyword(), None);
    }

    #[test]
    fn test_keyword_entry_is_idempotent() {
        let mut raffle = collecting("giveaway");
        assert!(raffle.on_chat_line("alice", "giveaway"));
        assert!(!raffle.on_chat_line("alice", "giveaway"));
        assert!(!raffle.on_chat_line("alice", "giveaway"));
        assert_eq!(raffle.state().entrants.len(), 1);
        assert!(raffle.state().entrants.contains("alice"));
    }

    #[test]
    fn test_only_exact_keyword_enters() {
        let mut raffle = collecting("giveaway");
        assert!(!raffle.on_chat_line("bob", "giveaway!"));
        assert!(!raffle.on_chat_line("bob", "the giveaway"));
        assert!(!raffle.on_chat_line("bob", "Giveaway"));
        assert!(raffle.state().entrants.is_empty());
    }

    #[test]
    fn test_relaxed_keyword_policy() {
        let mut raffle = RaffleMachine::new(KeywordMatch {
            trim: true,
            case_insensitive: true,
        });
        raffle.start_or_stop(true, &args(&["giveaway"]));
        assert!(raffle.on_chat_line("bob", " GIVEAWAY "));
    }

    #[test]
    fn test_chat_while_idle_is_ignored() {
        let mut raffle = RaffleMachine::new(KeywordMatch::default());
        assert!(!raffle.on_chat_line("alice", ""));
        assert!(!raffle.on_chat_line("alice", "giveaway"));
        assert_eq!(raffle.state(), &RaffleState::default());
    }

    #[test]
    fn test_stop_picks_winner_and_resets() {
        let mut raffle = collecting("giveaway");
        raffle.on_chat_line("alice", "giveaway");
        raffle.on_chat_line("bob", "giveaway");
        raffle.on_chat_line("carol", "giveaway");

        let mut rng = StdRng::seed_from_u64(7);
        let outcome = raffle.start_or_stop_with(true, &[], &mut rng);
        match &outcome {
            RaffleOutcome::Winner(user) => {
                assert!(["alice", "bob", "carol"].contains(&user.as_str()))
            }
            other => panic!("expected a winner, got {:?}", other),
        }
        assert_eq!(raffle.state(), &RaffleState::default());
    }

    #[test]
    fn test_stop_with_no_entrants() {
        let mut raffle = collecting("giveaway");
        let outcome = raffle.start_or_stop(true, &args(&["another"]));
        assert_eq!(outcome, RaffleOutcome::NoEntrants);
        assert_eq!(
            outcome.announcement().as_deref(),
            Some("The raffle ended with no entrants.")
        );
        assert_eq!(raffle.state(), &RaffleState::default());
    }

    #[test]
    fn test_every_entrant_can_win() {
        let mut seen = BTreeSet::new();
        for seed in 0..64 {
            let mut raffle = collecting("go");
            for user in ["alice", "bob", "carol"] {
                raffle.on_chat_line(user, "go");
            }
            let mut rng = StdRng::seed_from_u64(seed);
            if let RaffleOutcome::Winner(user) = raffle.start_or_stop_with(true, &[], &mut rng) {
                seen.insert(user);
            }
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_giveaway_scenario() {
        let mut raffle = RaffleMachine::new(KeywordMatch::default());
        raffle.start_or_stop(true, &args(&["giveaway"]));
        assert_eq!(raffle.state().keyword(), Some("giveaway"));

        raffle.on_chat_line("alice", "giveaway");
        raffle.on_chat_line("alice", "giveaway");
        assert_eq!(
            raffle.state().entrants,
            BTreeSet::from(["alice".to_string()])
        );

        let outcome = raffle.start_or_stop(true, &[]);
        assert_eq!(outcome, RaffleOutcome::Winner("alice".to_string()));
        assert_eq!(
            outcome.announcement().as_deref(),
            Some("alice is the winner!")
        );
        assert_eq!(raffle.state().phase, Phase::Idle);
        assert!(raffle.state().entrants.is_empty());
    }
}
