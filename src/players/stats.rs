use axum::{
    extract::{Form, Path},
    response::Redirect,
};
use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::User,
    registrations::Registration,
    schema::{player_achievements, player_stats},
    sql_text::text_enum,
    state::Conn,
    template::Page,
    tournaments::Tournament,
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    validation::Problems,
    widgets::alert::ErrorList,
};

/// A player's result in one tournament.
#[derive(Queryable, Selectable, Clone, Debug, PartialEq)]
#[diesel(table_name = player_stats)]
#[diesel(check_for_backend(Sqlite))]
pub struct PlayerStat {
    pub id: String,
    pub player_id: String,
    pub tournament_id: String,
    pub tournament_name: String,
    pub sport_type: String,
    pub matches_played: i64,
    pub matches_won: i64,
    pub matches_lost: i64,
    pub hours_played: f64,
    pub performance_rating: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

text_enum! {
    pub enum AchievementKind {
        TournamentWinner => "tournament_winner",
        TournamentRunnerUp => "tournament_runner_up",
        FairPlay => "fair_play",
        Milestone => "milestone",
    }
}

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = player_achievements)]
#[diesel(check_for_backend(Sqlite))]
pub struct Achievement {
    pub id: String,
    pub player_id: String,
    pub kind: AchievementKind,
    pub title: String,
    pub description: String,
    pub tournament_id: Option<String>,
    pub tournament_name: Option<String>,
    pub earned_at: NaiveDateTime,
    pub badge_color: String,
}

impl Achievement {
    /// CSS colour for the badge.
    pub fn css_colour(&self) -> &'static str {
        match self.badge_color.as_str() {
            "gold" => "#d4a017",
            "silver" => "#8a9597",
            "purple" => "#6f42c1",
            "blue" => "#0d6efd",
            "green" => "#198754",
            _ => "#6c757d",
        }
    }

    pub fn of_player(
        player_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Vec<Achievement>> {
        player_achievements::table
            .filter(player_achievements::player_id.eq(player_id))
            .order_by(player_achievements::earned_at.desc())
            .select(Achievement::as_select())
            .load(conn)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAchievement {
    pub kind: AchievementKind,
    pub title: &'static str,
    pub description: String,
    /// Milestones are not tied to a tournament.
    pub tournament: bool,
    pub badge_color: &'static str,
}

/// The achievements a newly recorded result earns. `total_tournaments`
/// counts the player's registrations which were not rejected.
pub fn achievements_for(
    stat: &PlayerStat,
    position: Option<i64>,
    total_tournaments: i64,
) -> Vec<NewAchievement> {
    let mut earned = Vec::new();

    match position {
        Some(1) => earned.push(NewAchievement {
            kind: AchievementKind::TournamentWinner,
            title: "Tournament Champion",
            description: format!("Won {}", stat.tournament_name),
            tournament: true,
            badge_color: "gold",
        }),
        Some(2) => earned.push(NewAchievement {
            kind: AchievementKind::TournamentRunnerUp,
            title: "Tournament Runner-up",
            description: format!("Finished 2nd in {}", stat.tournament_name),
            tournament: true,
            badge_color: "silver",
        }),
        _ => (),
    }

    if stat.matches_played >= 3 && stat.matches_won == stat.matches_played {
        earned.push(NewAchievement {
            kind: AchievementKind::FairPlay,
            title: "Perfect Record",
            description: format!(
                "Won all {} matches in {}",
                stat.matches_played, stat.tournament_name
            ),
            tournament: true,
            badge_color: "purple",
        });
    }

    if total_tournaments == 1 {
        earned.push(NewAchievement {
            kind: AchievementKind::Milestone,
            title: "First Steps",
            description: "Completed your first tournament".to_string(),
            tournament: false,
            badge_color: "blue",
        });
    }
    if total_tournaments == 10 {
        earned.push(NewAchievement {
            kind: AchievementKind::Milestone,
            title: "Tournament Veteran",
            description: "Participated in 10 tournaments".to_string(),
            tournament: false,
            badge_color: "green",
        });
    }

    earned
}

/// `(1000 + 50t + 25w + 5m) × (1 + w/2m)`, rounded to one decimal place and
/// capped at 5000. Nobody who has not played has a rating.
pub fn overall_rating(tournaments: i64, wins: i64, matches: i64) -> f64 {
    if tournaments == 0 {
        return 0.0;
    }
    let base = 1000.0
        + 50.0 * tournaments as f64
        + 25.0 * wins as f64
        + 5.0 * matches as f64;
    let win_rate = if matches > 0 {
        wins as f64 / matches as f64
    } else {
        0.0
    };
    let rating = base * (1.0 + 0.5 * win_rate);
    ((rating * 10.0).round() / 10.0).min(5000.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub tournaments: i64,
    pub matches: i64,
    pub wins: i64,
    pub hours: f64,
    pub rating: f64,
    /// Percentage of matches won.
    pub win_rate: f64,
}

impl Summary {
    fn from_stats<'a>(
        tournaments: i64,
        stats: impl IntoIterator<Item = &'a PlayerStat>,
    ) -> Summary {
        let (mut matches, mut wins, mut hours) = (0, 0, 0.0);
        for stat in stats {
            matches += stat.matches_played;
            wins += stat.matches_won;
            hours += stat.hours_played;
        }
        Summary {
            tournaments,
            matches,
            wins,
            hours,
            rating: overall_rating(tournaments, wins, matches),
            win_rate: if matches > 0 {
                wins as f64 / matches as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

pub fn stats_of_player(
    player_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<PlayerStat>> {
    player_stats::table
        .filter(player_stats::player_id.eq(player_id))
        .order_by(player_stats::created_at.desc())
        .select(PlayerStat::as_select())
        .load(conn)
}

/// Totals across every tournament the player has entered.
pub fn summary(
    player_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Summary> {
    let tournaments = Registration::count_active_for_player(player_id, &mut *conn)?;
    let stats = stats_of_player(player_id, conn)?;
    Ok(Summary::from_stats(tournaments, &stats))
}

/// Totals for one sport. Only tournaments with a recorded result count.
pub fn sport_summary(stats: &[PlayerStat], sport: &str) -> Summary {
    let of_sport: Vec<&PlayerStat> =
        stats.iter().filter(|s| s.sport_type == sport).collect();
    Summary::from_stats(of_sport.len() as i64, of_sport)
}

/// What an organizer enters for one player.
#[derive(Debug, Clone)]
pub struct ResultEntry {
    pub matches_played: i64,
    pub matches_won: i64,
    pub hours_played: f64,
    pub position: Option<i64>,
    pub performance_rating: f64,
}

/// Stores a result and awards whatever achievements it earns.
#[tracing::instrument(skip(tournament, entry, conn))]
pub fn add_result(
    player_id: &str,
    tournament: &Tournament,
    entry: &ResultEntry,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<(PlayerStat, Vec<NewAchievement>)> {
    let now = Utc::now().naive_utc();
    let stat = PlayerStat {
        id: format!("stat_{}", Uuid::now_v7()),
        player_id: player_id.to_string(),
        tournament_id: tournament.id.clone(),
        tournament_name: tournament.name.clone(),
        sport_type: tournament.sport_type.clone(),
        matches_played: entry.matches_played,
        matches_won: entry.matches_won,
        matches_lost: entry.matches_played - entry.matches_won,
        hours_played: entry.hours_played,
        performance_rating: entry.performance_rating,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(player_stats::table)
        .values((
            player_stats::id.eq(&stat.id),
            player_stats::player_id.eq(&stat.player_id),
            player_stats::tournament_id.eq(&stat.tournament_id),
            player_stats::tournament_name.eq(&stat.tournament_name),
            player_stats::sport_type.eq(&stat.sport_type),
            player_stats::matches_played.eq(stat.matches_played),
            player_stats::matches_won.eq(stat.matches_won),
            player_stats::matches_lost.eq(stat.matches_lost),
            player_stats::hours_played.eq(stat.hours_played),
            player_stats::performance_rating.eq(stat.performance_rating),
            player_stats::created_at.eq(stat.created_at),
            player_stats::updated_at.eq(stat.updated_at),
        ))
        .execute(&mut *conn)?;

    let total_tournaments = Registration::count_active_for_player(player_id, &mut *conn)?;
    let held: Vec<String> = player_achievements::table
        .filter(player_achievements::player_id.eq(player_id))
        .filter(player_achievements::kind.eq(AchievementKind::Milestone))
        .select(player_achievements::title)
        .load(&mut *conn)?;

    let earned: Vec<NewAchievement> =
        achievements_for(&stat, entry.position, total_tournaments)
            .into_iter()
            .filter(|a| a.tournament || !held.iter().any(|title| title == a.title))
            .collect();

    for achievement in &earned {
        let (tournament_id, tournament_name) = if achievement.tournament {
            (Some(stat.tournament_id.clone()), Some(stat.tournament_name.clone()))
        } else {
            (None, None)
        };
        diesel::insert_into(player_achievements::table)
            .values((
                player_achievements::id.eq(format!("achievement_{}", Uuid::now_v7())),
                player_achievements::player_id.eq(player_id),
                player_achievements::kind.eq(achievement.kind),
                player_achievements::title.eq(achievement.title),
                player_achievements::description.eq(&achievement.description),
                player_achievements::tournament_id.eq(tournament_id),
                player_achievements::tournament_name.eq(tournament_name),
                player_achievements::earned_at.eq(now),
                player_achievements::badge_color.eq(achievement.badge_color),
            ))
            .execute(&mut *conn)?;
    }

    tracing::info!(
        "recorded result for {player_id} in {} ({} achievements)",
        tournament.id,
        earned.len()
    );
    Ok((stat, earned))
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ResultForm {
    pub player_id: String,
    pub matches_played: String,
    pub matches_won: String,
    #[serde(default)]
    pub hours_played: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub performance_rating: String,
}

impl ResultForm {
    pub fn validate(&self) -> Result<ResultEntry, Vec<String>> {
        let mut problems = Problems::new();

        let played = self.matches_played.trim().parse::<i64>().ok().filter(|n| *n >= 0);
        problems.check(played.is_some(), "Matches played must be a whole number.");
        let won = self.matches_won.trim().parse::<i64>().ok().filter(|n| *n >= 0);
        problems.check(won.is_some(), "Matches won must be a whole number.");
        if let (Some(played), Some(won)) = (played, won) {
            problems.check(won <= played, "A player cannot win more matches than they played.");
        }

        let hours = match self.hours_played.trim() {
            "" => Some(0.0),
            h => h.parse::<f64>().ok().filter(|h| h.is_finite() && *h >= 0.0),
        };
        problems.check(hours.is_some(), "Hours played cannot be negative.");

        let position = match self.position.trim() {
            "" => Some(None),
            p => p.parse::<i64>().ok().filter(|p| *p >= 1).map(Some),
        };
        problems.check(position.is_some(), "Position must be 1 or more.");

        let rating = match self.performance_rating.trim() {
            "" => Some(0.0),
            r => r.parse::<f64>().ok().filter(|r| (0.0..=5.0).contains(r)),
        };
        problems.check(rating.is_some(), "Performance rating must be between 0 and 5.");

        problems.finish()?;

        match (played, won, hours, position, rating) {
            (Some(matches_played), Some(matches_won), Some(hours_played), Some(position), Some(performance_rating)) => {
                Ok(ResultEntry {
                    matches_played,
                    matches_won,
                    hours_played,
                    position,
                    performance_rating,
                })
            }
            _ => Err(Vec::new()),
        }
    }
}

fn results_body(
    tournament: &Tournament,
    players: &[Registration],
    recorded: &[PlayerStat],
    errors: &[String],
) -> impl Renderable {
    let action = format!("/tournament/{}/results", tournament.id);
    let back = format!("/tournament/{}", tournament.id);
    let name = tournament.name.clone();
    let waiting: Vec<Registration> = players
        .iter()
        .filter(|r| !recorded.iter().any(|s| s.player_id == r.player_id))
        .cloned()
        .collect();
    let recorded: Vec<(String, PlayerStat)> = recorded
        .iter()
        .map(|s| {
            let who = players
                .iter()
                .find(|r| r.player_id == s.player_id)
                .map(|r| r.player_name.clone())
                .unwrap_or_else(|| s.player_id.clone());
            (who, s.clone())
        })
        .collect();
    let errors = errors.to_vec();

    maud! {
        div class="d-flex justify-content-between align-items-center mb-3" {
            h1 class="h3 mb-0" { "Results · " (name) }
            a href=(back) class="btn btn-outline-secondary" { "Back to tournament" }
        }
        @if !errors.is_empty() {
            ErrorList errors=(&errors);
        }
        @if !recorded.is_empty() {
            h2 class="h5" { "Recorded" }
            table class="table table-sm" {
                thead {
                    tr {
                        th { "Player" } th { "Played" } th { "Won" } th { "Lost" }
                        th { "Hours" } th { "Rating" }
                    }
                }
                tbody {
                    @for (who, s) in &recorded {
                        tr {
                            td { (who) }
                            td { (s.matches_played) }
                            td { (s.matches_won) }
                            td { (s.matches_lost) }
                            td { (s.hours_played) }
                            td { (s.performance_rating) }
                        }
                    }
                }
            }
        }
        h2 class="h5 mt-4" { "Record a result" }
        @if waiting.is_empty() {
            p class="text-muted" { "Every registered player has a result." }
        } @else {
            form method="post" action=(action) class="row g-2" style="max-width: 60rem" {
                div class="col-md-4" {
                    label for="player_id" class="form-label" { "Player" }
                    select id="player_id" name="player_id" class="form-select" required {
                        @for r in &waiting {
                            option value=(r.player_id) { (r.player_name) }
                        }
                    }
                }
                div class="col-md-2" {
                    label for="matches_played" class="form-label" { "Played" }
                    input type="number" min="0" id="matches_played" name="matches_played" class="form-control" required;
                }
                div class="col-md-2" {
                    label for="matches_won" class="form-label" { "Won" }
                    input type="number" min="0" id="matches_won" name="matches_won" class="form-control" required;
                }
                div class="col-md-2" {
                    label for="hours_played" class="form-label" { "Hours" }
                    input type="number" min="0" step="any" id="hours_played" name="hours_played" class="form-control";
                }
                div class="col-md-1" {
                    label for="position" class="form-label" { "Place" }
                    input type="number" min="1" id="position" name="position" class="form-control";
                }
                div class="col-md-1" {
                    label for="performance_rating" class="form-label" { "Rating" }
                    input type="number" min="0" max="5" step="0.1" id="performance_rating"
                        name="performance_rating" class="form-control";
                }
                div class="col-12" {
                    button type="submit" class="btn btn-primary" { "Save result" }
                }
            }
        }
    }
}

fn tournament_stats(
    tournament_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<PlayerStat>> {
    player_stats::table
        .filter(player_stats::tournament_id.eq(tournament_id))
        .order_by(player_stats::created_at)
        .select(PlayerStat::as_select())
        .load(conn)
}

pub async fn record_results_page(
    Path(tournament_id): Path<String>,
    user: User<false>,
    mut conn: Conn<false>,
) -> StandardResponse {
    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    tournament.check_user_is_organizer(&user)?;

    let players = Registration::active_for_tournament(&tournament.id, &mut *conn)?;
    let recorded = tournament_stats(&tournament.id, &mut *conn)?;

    success(
        Page::new()
            .title(format!("Results · {}", tournament.name))
            .body(results_body(&tournament, &players, &recorded, &[]))
            .user(user)
            .render(),
    )
}

#[tracing::instrument(skip(user, conn, form))]
pub async fn do_record_result(
    Path(tournament_id): Path<String>,
    user: User<true>,
    mut conn: Conn<true>,
    Form(form): Form<ResultForm>,
) -> StandardResponse {
    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    tournament.check_user_is_organizer(&user)?;

    let players = Registration::active_for_tournament(&tournament.id, &mut *conn)?;
    let recorded = tournament_stats(&tournament.id, &mut *conn)?;

    let entry = form.validate().and_then(|entry| {
        let registered = players.iter().any(|r| r.player_id == form.player_id);
        if !registered {
            Err(vec!["That player is not registered for this tournament.".to_string()])
        } else if recorded.iter().any(|s| s.player_id == form.player_id) {
            Err(vec!["A result has already been recorded for that player.".to_string()])
        } else {
            Ok(entry)
        }
    });

    let entry = match entry {
        Ok(entry) => entry,
        Err(errors) => {
            return bad_request(
                Page::new()
                    .title("Results")
                    .body(results_body(&tournament, &players, &recorded, &errors))
                    .user(user)
                    .render(),
            );
        }
    };

    add_result(&form.player_id, &tournament, &entry, &mut *conn)?;

    see_other_ok(Redirect::to(&format!("/tournament/{}/results", tournament.id)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn stat(sport: &str, played: i64, won: i64) -> PlayerStat {
        let now = Utc::now().naive_utc();
        PlayerStat {
            id: "stat".to_string(),
            player_id: "ram".to_string(),
            tournament_id: "t".to_string(),
            tournament_name: "Pokhara Open".to_string(),
            sport_type: sport.to_string(),
            matches_played: played,
            matches_won: won,
            matches_lost: played - won,
            hours_played: 2.5,
            performance_rating: 4.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rating_formula() {
        assert_eq!(overall_rating(0, 5, 5), 0.0);
        assert_eq!(overall_rating(1, 0, 0), 1050.0);
        // (1000 + 150 + 200 + 60) × (1 + 0.5 × 8/12)
        assert_eq!(overall_rating(3, 8, 12), 1880.0);
        assert_eq!(overall_rating(50, 200, 200), 5000.0);
    }

    #[test]
    fn summaries_add_up_results() {
        let stats = [stat("Futsal", 4, 3), stat("Cricket", 5, 1), stat("Futsal", 2, 0)];
        let s = Summary::from_stats(3, &stats);
        assert_eq!((s.matches, s.wins), (11, 4));
        assert_eq!(s.hours, 7.5);
        assert!((s.win_rate - 36.36).abs() < 0.01);

        let futsal = sport_summary(&stats, "Futsal");
        assert_eq!((futsal.tournaments, futsal.matches, futsal.wins), (2, 6, 3));
        assert_eq!(futsal.rating, overall_rating(2, 3, 6));
        assert_eq!(sport_summary(&stats, "Golf"), Summary::default());
    }

    #[test]
    fn champions_with_perfect_records() {
        let earned = achievements_for(&stat("Futsal", 4, 4), Some(1), 1);
        let titles: Vec<&str> = earned.iter().map(|a| a.title).collect();
        assert_eq!(titles, ["Tournament Champion", "Perfect Record", "First Steps"]);
        assert_eq!(earned[0].badge_color, "gold");
        assert_eq!(earned[0].description, "Won Pokhara Open");
    }

    #[test]
    fn perfect_record_needs_three_matches() {
        assert!(achievements_for(&stat("Futsal", 2, 2), None, 4).is_empty());
        let earned = achievements_for(&stat("Futsal", 3, 3), Some(2), 10);
        let titles: Vec<&str> = earned.iter().map(|a| a.title).collect();
        assert_eq!(
            titles,
            ["Tournament Runner-up", "Perfect Record", "Tournament Veteran"]
        );
    }

    #[test]
    fn result_forms_are_checked() {
        let form = ResultForm {
            player_id: "ram".to_string(),
            matches_played: "3".to_string(),
            matches_won: "4".to_string(),
            position: "0".to_string(),
            ..Default::default()
        };
        assert_eq!(form.validate().unwrap_err().len(), 2);

        let form = ResultForm {
            matches_won: "2".to_string(),
            position: String::new(),
            ..form
        };
        let entry = form.validate().unwrap();
        assert_eq!(entry.position, None);
        assert_eq!(entry.hours_played, 0.0);
    }
}
