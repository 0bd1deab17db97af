//! Single-elimination brackets.
//!
//! The shape of a bracket is derived from the number of participants alone:
//! with `n >= 2` players there are `ceil(log2 n)` rounds and round `r` has
//! `2^(rounds - r - 1)` matches. Only matches which have been touched (seeded
//! or played) are stored; every other slot is an empty pending match.

use std::fmt;

use chrono::NaiveDateTime;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};

use crate::{schema::bracket_matches, sql_text::text_enum};

pub mod manage;

text_enum! {
    pub enum MatchStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Clone, Debug, PartialEq)]
#[diesel(table_name = bracket_matches)]
#[diesel(check_for_backend(Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct Match {
    pub tournament_id: String,
    pub id: String,
    pub round: i64,
    pub position: i64,
    pub player1_id: Option<String>,
    pub player1_name: Option<String>,
    pub player2_id: Option<String>,
    pub player2_name: Option<String>,
    pub winner_id: Option<String>,
    pub score: Option<String>,
    pub status: MatchStatus,
    pub scheduled_time: Option<NaiveDateTime>,
}

pub fn match_id(round: usize, position: usize) -> String {
    format!("round_{round}_match_{position}")
}

impl Match {
    pub fn empty(tournament_id: &str, round: usize, position: usize) -> Match {
        Match {
            tournament_id: tournament_id.to_string(),
            id: match_id(round, position),
            round: round as i64,
            position: position as i64,
            player1_id: None,
            player1_name: None,
            player2_id: None,
            player2_name: None,
            winner_id: None,
            score: None,
            status: MatchStatus::Pending,
            scheduled_time: None,
        }
    }

    pub fn players(&self) -> impl Iterator<Item = (&str, &str)> {
        [
            (self.player1_id.as_deref(), self.player1_name.as_deref()),
            (self.player2_id.as_deref(), self.player2_name.as_deref()),
        ]
        .into_iter()
        .filter_map(|(id, name)| Some((id?, name.unwrap_or(""))))
    }

    pub fn has_both_players(&self) -> bool {
        self.player1_id.is_some() && self.player2_id.is_some()
    }

    pub fn winner_name(&self) -> Option<&str> {
        let winner = self.winner_id.as_deref()?;
        self.players()
            .find(|(id, _)| *id == winner)
            .map(|(_, name)| name)
    }

    fn is_untouched(&self) -> bool {
        self.player1_id.is_none()
            && self.player2_id.is_none()
            && self.winner_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub index: usize,
    pub name: String,
    pub matches: Vec<Match>,
}

/// Number of rounds needed for `participants` players.
pub fn round_count(participants: usize) -> usize {
    if participants < 2 {
        0
    } else {
        ((participants - 1).ilog2() + 1) as usize
    }
}

pub fn round_name(round: usize, total: usize) -> String {
    match total.checked_sub(round + 1) {
        Some(0) => "Final".to_string(),
        Some(1) => "Semi-Final".to_string(),
        Some(2) => "Quarter-Final".to_string(),
        _ => format!("Round {}", round + 1),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BracketError {
    NoSuchMatch(String),
    /// The match does not have two players yet.
    NotReady,
    AlreadyCompleted,
    /// The chosen winner is not playing in the match.
    NotAPlayer,
    AlreadySeeded,
    TooManyPlayers { capacity: usize },
}

impl fmt::Display for BracketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketError::NoSuchMatch(id) => write!(f, "there is no match `{id}`"),
            BracketError::NotReady => {
                write!(f, "both players must be known before recording a result")
            }
            BracketError::AlreadyCompleted => {
                write!(f, "a result has already been recorded for this match")
            }
            BracketError::NotAPlayer => {
                write!(f, "the winner must be one of the match's players")
            }
            BracketError::AlreadySeeded => {
                write!(f, "the first round has already been drawn")
            }
            BracketError::TooManyPlayers { capacity } => {
                write!(f, "the bracket only has room for {capacity} players")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bracket {
    pub rounds: Vec<Round>,
}

impl Bracket {
    /// Lays out the bracket for `participants` players. Slots are taken from
    /// `overrides` when a match with the same id exists there.
    pub fn generate(
        tournament_id: &str,
        participants: usize,
        overrides: &[Match],
    ) -> Bracket {
        let total = round_count(participants);

        let rounds = (0..total)
            .map(|r| {
                let matches = (0..1usize << (total - r - 1))
                    .map(|p| {
                        let id = match_id(r, p);
                        overrides
                            .iter()
                            .find(|m| m.id == id)
                            .cloned()
                            .unwrap_or_else(|| Match::empty(tournament_id, r, p))
                    })
                    .collect();

                Round {
                    index: r,
                    name: round_name(r, total),
                    matches,
                }
            })
            .collect();

        Bracket { rounds }
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.rounds.iter().flat_map(|round| round.matches.iter())
    }

    pub fn find(&self, id: &str) -> Option<&Match> {
        self.matches().find(|m| m.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Match> {
        self.rounds
            .iter_mut()
            .flat_map(|round| round.matches.iter_mut())
            .find(|m| m.id == id)
    }

    /// The winner of the final, once it has been played.
    pub fn champion(&self) -> Option<(&str, &str)> {
        let last = self.rounds.last()?.matches.first()?;
        let winner = last.winner_id.as_deref()?;
        Some((winner, last.winner_name().unwrap_or("")))
    }

    /// Draws the first round. Players fill the first slot of every match in
    /// the order given, then the second slots, so that byes are spread
    /// across the bracket. A player without an opponent advances straight
    /// away.
    pub fn seed_first_round(
        &mut self,
        players: &[(String, String)],
    ) -> Result<(), BracketError> {
        let first = match self.rounds.first() {
            Some(first) => first,
            None => return Err(BracketError::TooManyPlayers { capacity: 0 }),
        };
        if !self.matches().all(Match::is_untouched) {
            return Err(BracketError::AlreadySeeded);
        }

        let width = first.matches.len();
        if players.len() > width * 2 {
            return Err(BracketError::TooManyPlayers {
                capacity: width * 2,
            });
        }

        for (i, (id, name)) in players.iter().enumerate() {
            let m = &mut self.rounds[0].matches[i % width];
            if i < width {
                m.player1_id = Some(id.clone());
                m.player1_name = Some(name.clone());
            } else {
                m.player2_id = Some(id.clone());
                m.player2_name = Some(name.clone());
            }
        }

        let byes: Vec<(usize, String, String)> = self.rounds[0]
            .matches
            .iter()
            .filter(|m| m.player2_id.is_none())
            .filter_map(|m| {
                Some((
                    m.position as usize,
                    m.player1_id.clone()?,
                    m.player1_name.clone().unwrap_or_default(),
                ))
            })
            .collect();

        for (position, id, name) in byes {
            let m = &mut self.rounds[0].matches[position];
            m.winner_id = Some(id.clone());
            m.score = Some("bye".to_string());
            m.status = MatchStatus::Completed;
            self.advance(0, position, id, name);
        }

        Ok(())
    }

    /// Records the winner of a match and moves them into their slot in the
    /// next round (position `p` feeds position `p / 2`, as the first player
    /// when `p` is even).
    pub fn record_result(
        &mut self,
        match_id: &str,
        winner_id: &str,
        score: Option<String>,
    ) -> Result<(), BracketError> {
        let m = self
            .find_mut(match_id)
            .ok_or_else(|| BracketError::NoSuchMatch(match_id.to_string()))?;

        if m.status == MatchStatus::Completed {
            return Err(BracketError::AlreadyCompleted);
        }
        if !m.has_both_players() {
            return Err(BracketError::NotReady);
        }
        let winner_name = m
            .players()
            .find(|(id, _)| *id == winner_id)
            .map(|(_, name)| name.to_string())
            .ok_or(BracketError::NotAPlayer)?;

        m.winner_id = Some(winner_id.to_string());
        m.score = score.filter(|s| !s.trim().is_empty());
        m.status = MatchStatus::Completed;

        let (round, position) = (m.round as usize, m.position as usize);
        self.advance(round, position, winner_id.to_string(), winner_name);
        Ok(())
    }

    fn advance(&mut self, round: usize, position: usize, id: String, name: String) {
        let Some(next) = self.rounds.get_mut(round + 1) else {
            return;
        };
        let slot = &mut next.matches[position / 2];
        if position % 2 == 0 {
            slot.player1_id = Some(id);
            slot.player1_name = Some(name);
        } else {
            slot.player2_id = Some(id);
            slot.player2_name = Some(name);
        }
    }

    /// Writes every match which differs from an empty slot.
    pub fn save(
        &self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<()> {
        for m in self.matches().filter(|m| !m.is_untouched()) {
            diesel::insert_into(bracket_matches::table)
                .values(m)
                .on_conflict((bracket_matches::tournament_id, bracket_matches::id))
                .do_update()
                .set(m)
                .execute(&mut *conn)?;
        }
        Ok(())
    }
}

/// Loads the stored matches of a tournament.
pub fn load_matches(
    tournament_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<Match>> {
    bracket_matches::table
        .filter(bracket_matches::tournament_id.eq(tournament_id))
        .order_by((bracket_matches::round, bracket_matches::position))
        .select(Match::as_select())
        .load(conn)
}

/// Number of players the bracket was drawn for, if it has been drawn.
pub fn seeded_players(matches: &[Match]) -> Option<usize> {
    let n: usize = matches
        .iter()
        .filter(|m| m.round == 0)
        .map(|m| m.players().count())
        .sum();
    (n > 0).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(n: usize) -> Vec<(String, String)> {
        (0..n)
            .map(|i| (format!("p{i}"), format!("Player {i}")))
            .collect()
    }

    #[test]
    fn shape_follows_participant_count() {
        for n in 2..=70usize {
            let bracket = Bracket::generate("t", n, &[]);
            let rounds = (n as f64).log2().ceil() as usize;
            assert_eq!(bracket.rounds.len(), rounds, "n = {n}");
            for (r, round) in bracket.rounds.iter().enumerate() {
                assert_eq!(round.matches.len(), 1 << (rounds - r - 1));
            }
            let last = bracket.rounds.last().unwrap();
            assert_eq!(last.matches.len(), 1);
            assert_eq!(last.name, "Final");
        }
    }

    #[test]
    fn fewer_than_two_players_have_no_rounds() {
        assert!(Bracket::generate("t", 0, &[]).rounds.is_empty());
        assert!(Bracket::generate("t", 1, &[]).rounds.is_empty());
    }

    #[test]
    fn rounds_are_named_from_the_end() {
        let names: Vec<String> = (0..5).map(|r| round_name(r, 5)).collect();
        assert_eq!(
            names,
            ["Round 1", "Round 2", "Quarter-Final", "Semi-Final", "Final"]
        );
        assert_eq!(round_name(0, 1), "Final");
    }

    #[test]
    fn overrides_replace_matching_slots() {
        let mut played = Match::empty("t", 0, 1);
        played.player1_id = Some("a".to_string());
        played.player2_id = Some("b".to_string());
        played.winner_id = Some("b".to_string());
        played.status = MatchStatus::Completed;

        let bracket = Bracket::generate("t", 4, &[played.clone()]);
        assert_eq!(bracket.find("round_0_match_1"), Some(&played));
        assert_eq!(
            bracket.find("round_0_match_0"),
            Some(&Match::empty("t", 0, 0))
        );
    }

    #[test]
    fn byes_advance_when_seeding() {
        let mut bracket = Bracket::generate("t", 5, &[]);
        bracket.seed_first_round(&players(5)).unwrap();

        let first = &bracket.rounds[0].matches;
        assert_eq!(first[0].player1_id.as_deref(), Some("p0"));
        assert_eq!(first[0].player2_id.as_deref(), Some("p4"));
        assert_eq!(first[1].status, MatchStatus::Completed);
        assert_eq!(first[1].winner_id.as_deref(), Some("p1"));

        let second = &bracket.rounds[1].matches;
        assert_eq!(second[0].player1_id, None);
        assert_eq!(second[0].player2_id.as_deref(), Some("p1"));
        assert_eq!(second[1].player1_id.as_deref(), Some("p2"));
        assert_eq!(second[1].player2_id.as_deref(), Some("p3"));

        assert_eq!(
            bracket.seed_first_round(&players(5)),
            Err(BracketError::AlreadySeeded)
        );
    }

    #[test]
    fn winners_are_propagated_to_the_final() {
        let mut bracket = Bracket::generate("t", 4, &[]);
        bracket.seed_first_round(&players(4)).unwrap();

        // p0 v p2 and p1 v p3
        bracket.record_result("round_0_match_0", "p2", Some("3-1".into())).unwrap();
        bracket.record_result("round_0_match_1", "p1", None).unwrap();

        let last = &bracket.rounds[1].matches[0];
        assert_eq!(last.player1_id.as_deref(), Some("p2"));
        assert_eq!(last.player2_id.as_deref(), Some("p1"));

        bracket.record_result("round_1_match_0", "p1", None).unwrap();
        assert_eq!(bracket.champion(), Some(("p1", "Player 1")));
    }

    #[test]
    fn results_are_checked() {
        let mut bracket = Bracket::generate("t", 4, &[]);
        assert_eq!(
            bracket.record_result("round_0_match_0", "p0", None),
            Err(BracketError::NotReady)
        );

        bracket.seed_first_round(&players(4)).unwrap();
        assert_eq!(
            bracket.record_result("round_0_match_0", "p1", None),
            Err(BracketError::NotAPlayer)
        );
        assert_eq!(
            bracket.record_result("round_9_match_0", "p0", None),
            Err(BracketError::NoSuchMatch("round_9_match_0".to_string()))
        );

        bracket.record_result("round_0_match_0", "p0", None).unwrap();
        assert_eq!(
            bracket.record_result("round_0_match_0", "p2", None),
            Err(BracketError::AlreadyCompleted)
        );
    }

    #[test]
    fn seeding_is_bounded() {
        let mut bracket = Bracket::generate("t", 4, &[]);
        assert_eq!(
            bracket.seed_first_round(&players(5)),
            Err(BracketError::TooManyPlayers { capacity: 4 })
        );
    }
}
