//! Ranked-choice vote tally for meal-plan events.
//!
//! Scoring is Borda: with N options, a rank-k vote earns N - k + 1 points
//! and an option a ballot leaves unranked earns nothing. Abstaining ballots
//! count toward turnout but award no points.
//!
//! Ties on points go to the option with more first-choice votes, then to
//! the lexicographically smaller option id.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use pantry_db::models::MealPlanOptionVote;

use crate::error::{PlanError, PlanResult};

/// What one voter submitted for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallotChoice {
    /// Option ids, most preferred first. Position `i` is rank `i + 1`.
    Ranked(Vec<String>),
    Abstain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter_id: String,
    pub choice: BallotChoice,
}

impl Ballot {
    pub fn ranked(voter_id: impl Into<String>, options: &[&str]) -> Self {
        Self {
            voter_id: voter_id.into(),
            choice: BallotChoice::Ranked(options.iter().map(|o| (*o).to_owned()).collect()),
        }
    }

    pub fn abstain(voter_id: impl Into<String>) -> Self {
        Self {
            voter_id: voter_id.into(),
            choice: BallotChoice::Abstain,
        }
    }

    pub fn is_abstain(&self) -> bool {
        matches!(self.choice, BallotChoice::Abstain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptionScore {
    pub points: u64,
    pub first_choices: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub winner: String,
    /// True when another option had the same number of points as the winner.
    pub tiebroken: bool,
    /// Every option of the event, keyed by option id.
    pub scores: BTreeMap<String, OptionScore>,
}

/// Check a ballot against the options of its event.
///
/// A ranked ballot must name at least one option, every option at most
/// once, and only options of this event. Together these make the ranks
/// exactly `1..=k`.
pub fn validate_ballot(option_ids: &[String], ballot: &Ballot) -> PlanResult<()> {
    let invalid = |reason: String| PlanError::InvalidBallot {
        voter_id: ballot.voter_id.clone(),
        reason,
    };

    let BallotChoice::Ranked(ranking) = &ballot.choice else {
        return Ok(());
    };
    if ranking.is_empty() {
        return Err(invalid("a ranked ballot must rank at least one option".into()));
    }

    let known: HashSet<&str> = option_ids.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    for option_id in ranking {
        if !known.contains(option_id.as_str()) {
            return Err(invalid(format!("option {option_id} does not belong to this event")));
        }
        if !seen.insert(option_id.as_str()) {
            return Err(invalid(format!("option {option_id} is ranked more than once")));
        }
    }
    Ok(())
}

/// Tally `ballots` over `option_ids` for `event_id`.
pub fn tally(event_id: &str, option_ids: &[String], ballots: &[Ballot]) -> PlanResult<Tally> {
    if ballots.is_empty() {
        return Err(PlanError::NoVotes {
            event_id: event_id.to_owned(),
        });
    }
    if ballots.iter().all(Ballot::is_abstain) {
        return Err(PlanError::AllAbstained {
            event_id: event_id.to_owned(),
        });
    }

    let mut scores: BTreeMap<String, OptionScore> = option_ids
        .iter()
        .map(|id| (id.clone(), OptionScore::default()))
        .collect();
    if scores.is_empty() {
        return Err(PlanError::Validation(format!(
            "event {event_id} has no options to choose from"
        )));
    }
    let option_count = scores.len() as u64;

    for ballot in ballots {
        let BallotChoice::Ranked(ranking) = &ballot.choice else {
            continue;
        };
        for (position, option_id) in ranking.iter().enumerate() {
            let rank = position as u64 + 1;
            let Some(score) = scores.get_mut(option_id) else {
                tracing::warn!(
                    event_id,
                    voter_id = %ballot.voter_id,
                    option_id = %option_id,
                    "ballot ranks an option outside the event, ignoring"
                );
                continue;
            };
            score.points += (option_count + 1).saturating_sub(rank);
            if rank == 1 {
                score.first_choices += 1;
            }
        }
    }

    // BTreeMap iteration is ascending by id, so Reverse(id) prefers the
    // smaller id among otherwise equal options.
    let (winner, best) = scores
        .iter()
        .max_by_key(|(id, s)| (s.points, s.first_choices, Reverse(id.as_str())))
        .map(|(id, s)| (id.clone(), *s))
        .ok_or_else(|| PlanError::Validation(format!("event {event_id} has no options")))?;

    let tiebroken = scores
        .iter()
        .any(|(id, s)| *id != winner && s.points == best.points);

    Ok(Tally {
        winner,
        tiebroken,
        scores,
    })
}

/// Group stored vote rows into one ballot per voter, ordered by voter id.
///
/// A voter with no ranked rows is treated as abstaining.
pub fn ballots_from_votes(votes: &[MealPlanOptionVote]) -> Vec<Ballot> {
    let mut by_voter: BTreeMap<&str, Vec<(i32, &str)>> = BTreeMap::new();
    for vote in votes {
        let entry = by_voter.entry(vote.voter_id.as_str()).or_default();
        if let (false, Some(rank)) = (vote.abstain, vote.rank) {
            entry.push((rank, vote.option_id.as_str()));
        }
    }

    by_voter
        .into_iter()
        .map(|(voter_id, mut ranked)| {
            if ranked.is_empty() {
                return Ballot::abstain(voter_id);
            }
            ranked.sort();
            Ballot {
                voter_id: voter_id.to_owned(),
                choice: BallotChoice::Ranked(
                    ranked.into_iter().map(|(_, id)| id.to_owned()).collect(),
                ),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn borda_points_reward_higher_ranks() {
        let opts = options(&["a", "b", "c"]);
        let ballots = vec![
            Ballot::ranked("u1", &["a", "b", "c"]),
            Ballot::ranked("u2", &["b", "a", "c"]),
            Ballot::ranked("u3", &["a", "c", "b"]),
        ];
        let result = tally("e", &opts, &ballots).unwrap();

        assert_eq!(result.winner, "a");
        assert!(!result.tiebroken);
        assert_eq!(result.scores["a"], OptionScore { points: 8, first_choices: 2 });
        assert_eq!(result.scores["b"], OptionScore { points: 6, first_choices: 1 });
        assert_eq!(result.scores["c"], OptionScore { points: 4, first_choices: 0 });
    }

    #[test]
    fn equal_points_and_first_choices_go_to_smaller_id() {
        let opts = options(&["opt-b", "opt-a"]);
        let ballots = vec![
            Ballot::ranked("u1", &["opt-b", "opt-a"]),
            Ballot::ranked("u2", &["opt-a", "opt-b"]),
        ];
        let result = tally("e", &opts, &ballots).unwrap();
        assert_eq!(result.winner, "opt-a");
        assert!(result.tiebroken);
    }

    #[test]
    fn more_first_choices_win_a_points_tie() {
        let opts = options(&["a", "b", "c"]);
        let ballots = vec![
            Ballot::ranked("u1", &["b", "a", "c"]),
            Ballot::ranked("u2", &["b", "c", "a"]),
            Ballot::ranked("u3", &["a", "c", "b"]),
            Ballot::ranked("u4", &["c", "a", "b"]),
        ];
        // a: 2 + 1 + 3 + 2 = 8, first 1
        // b: 3 + 3 + 1 + 1 = 8, first 2
        // c: 1 + 2 + 2 + 3 = 8, first 1
        let result = tally("e", &opts, &ballots).unwrap();
        assert_eq!(result.scores["a"].points, 8);
        assert_eq!(result.scores["b"].points, 8);
        assert_eq!(result.scores["c"].points, 8);
        assert_eq!(result.winner, "b");
        assert!(result.tiebroken);
    }

    #[test]
    fn unranked_options_score_zero() {
        let opts = options(&["a", "b", "c"]);
        let ballots = vec![Ballot::ranked("u1", &["b"])];
        let result = tally("e", &opts, &ballots).unwrap();
        assert_eq!(result.winner, "b");
        assert_eq!(result.scores["b"].points, 3);
        assert_eq!(result.scores["a"], OptionScore::default());
        assert_eq!(result.scores["c"], OptionScore::default());
    }

    #[test]
    fn abstentions_award_nothing() {
        let opts = options(&["a", "b"]);
        let ballots = vec![Ballot::abstain("u1"), Ballot::ranked("u2", &["b", "a"])];
        let result = tally("e", &opts, &ballots).unwrap();
        assert_eq!(result.winner, "b");
        assert_eq!(result.scores["b"].points, 2);
        assert_eq!(result.scores["a"].points, 1);
    }

    #[test]
    fn no_ballots_fails() {
        let err = tally("e1", &options(&["a"]), &[]).unwrap_err();
        assert!(matches!(err, PlanError::NoVotes { event_id } if event_id == "e1"));
    }

    #[test]
    fn only_abstentions_fails() {
        let ballots = vec![Ballot::abstain("u1"), Ballot::abstain("u2")];
        let err = tally("e1", &options(&["a"]), &ballots).unwrap_err();
        assert!(matches!(err, PlanError::AllAbstained { .. }));
    }

    #[test]
    fn validate_rejects_duplicates_and_foreign_options() {
        let opts = options(&["a", "b"]);
        assert!(validate_ballot(&opts, &Ballot::ranked("u", &["a", "b"])).is_ok());
        assert!(validate_ballot(&opts, &Ballot::abstain("u")).is_ok());

        let err = validate_ballot(&opts, &Ballot::ranked("u", &["a", "a"])).unwrap_err();
        assert!(matches!(err, PlanError::InvalidBallot { reason, .. } if reason.contains("more than once")));

        let err = validate_ballot(&opts, &Ballot::ranked("u", &["z"])).unwrap_err();
        assert!(matches!(err, PlanError::InvalidBallot { reason, .. } if reason.contains("does not belong")));

        let err = validate_ballot(&opts, &Ballot::ranked("u", &[])).unwrap_err();
        assert!(matches!(err, PlanError::InvalidBallot { .. }));
    }

    #[test]
    fn stored_votes_group_into_ballots() {
        let row = |voter: &str, option: &str, rank: Option<i32>, abstain: bool| MealPlanOptionVote {
            id: format!("{voter}-{option}"),
            event_id: "e".into(),
            option_id: option.into(),
            voter_id: voter.into(),
            rank,
            abstain,
            created_at: chrono::Utc::now(),
        };
        let votes = vec![
            row("bob", "a", Some(2), false),
            row("bob", "b", Some(1), false),
            row("alice", "a", None, true),
            row("alice", "b", None, true),
        ];

        let ballots = ballots_from_votes(&votes);
        assert_eq!(ballots, vec![Ballot::abstain("alice"), Ballot::ranked("bob", &["b", "a"])]);
    }
}
