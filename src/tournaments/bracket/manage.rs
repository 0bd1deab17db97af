use axum::{
    extract::{Form, Path},
    response::Redirect,
};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    auth::User,
    registrations::Registration,
    state::Conn,
    template::Page,
    tournaments::{
        Tournament,
        bracket::{Bracket, BracketError, Match, MatchStatus, load_matches, seeded_players},
    },
    util_resp::{StandardResponse, bad_request, err_not_found, see_other_ok, success},
    widgets::alert::ErrorAlert,
};

struct MatchCard<'r> {
    tournament_id: &'r str,
    m: &'r Match,
    editable: bool,
}

impl<'r> Renderable for MatchCard<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let m = self.m;
        let winner = m.winner_id.as_deref();
        let slots = [
            (m.player1_id.as_deref(), m.player1_name.as_deref()),
            (m.player2_id.as_deref(), m.player2_name.as_deref()),
        ];
        let action = format!(
            "/tournament/{}/bracket/matches/{}",
            self.tournament_id, m.id
        );
        let show_form =
            self.editable && m.has_both_players() && m.status != MatchStatus::Completed;

        maud! {
            div class=(if m.status == MatchStatus::Completed {
                "card mb-3 border-success"
            } else {
                "card mb-3"
            }) {
                ul class="list-group list-group-flush" {
                    @for (id, name) in slots {
                        @if let Some(id) = id {
                            li class=(if winner == Some(id) {
                                "list-group-item fw-bold text-success"
                            } else {
                                "list-group-item"
                            }) {
                                (name.unwrap_or(id))
                            }
                        } @else {
                            li class="list-group-item text-muted fst-italic" { "TBD" }
                        }
                    }
                }
                @if let Some(score) = &m.score {
                    div class="card-footer small text-muted" { (score) }
                }
                @if show_form {
                    form method="post" action=(&action) class="card-body p-2" {
                        select name="winner_id" class="form-select form-select-sm mb-2" required {
                            option value="" { "Winner…" }
                            @for (id, name) in m.players() {
                                option value=(id) { (name) }
                            }
                        }
                        input type="text" name="score" class="form-control form-control-sm mb-2"
                            placeholder="Score (optional)";
                        button type="submit" class="btn btn-sm btn-primary w-100" { "Record result" }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

struct BracketView<'r> {
    tournament_id: &'r str,
    bracket: &'r Bracket,
    editable: bool,
}

impl<'r> Renderable for BracketView<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="d-flex gap-3 overflow-auto pb-3" {
                @for round in &self.bracket.rounds {
                    div class="d-flex flex-column justify-content-around" style="min-width: 14rem" {
                        h2 class="h6 text-center text-uppercase text-muted" { (round.name) }
                        @for m in &round.matches {
                            MatchCard tournament_id=(self.tournament_id) m=(m) editable=(self.editable);
                        }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

pub async fn view_bracket_page(
    Path(tournament_id): Path<String>,
    user: Option<User<false>>,
    mut conn: Conn<false>,
) -> StandardResponse {
    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    tournament.check_user_can_view(user.as_ref())?;

    let matches = load_matches(&tournament.id, &mut *conn)?;
    let drawn = seeded_players(&matches);
    let participants =
        drawn.unwrap_or(tournament.current_participants.max(0) as usize);
    let bracket = Bracket::generate(&tournament.id, participants, &matches);

    let editable = user
        .as_ref()
        .is_some_and(|user| tournament.check_user_is_organizer(user).is_ok());
    let champion = bracket
        .champion()
        .map(|(_, name)| name.to_string());
    let seed_action = format!("/tournament/{}/bracket/seed", tournament.id);
    let back = format!("/tournament/{}", tournament.id);
    let can_draw = editable && drawn.is_none() && participants >= 2;

    success(
        Page::new()
            .title(format!("Bracket · {}", tournament.name))
            .user_opt(user)
            .body(maud! {
                div class="d-flex justify-content-between align-items-center mb-3" {
                    div {
                        h1 class="h3 mb-0" { (tournament.name) }
                        p class="text-muted mb-0" {
                            (tournament.tournament_type.label()) " · "
                            (tournament.current_participants) " participants"
                        }
                    }
                    a href=(back) class="btn btn-outline-secondary" { "Back to tournament" }
                }
                @if let Some(champion) = &champion {
                    div class="alert alert-warning" { "🏆 Champion: " strong { (champion) } }
                }
                @if bracket.rounds.is_empty() {
                    p class="text-muted" {
                        "The bracket will be available once at least two players have registered."
                    }
                } @else {
                    @if drawn.is_none() {
                        p class="text-muted" { "The first round has not been drawn yet." }
                    }
                    @if can_draw {
                        form method="post" action=(seed_action) class="mb-3" {
                            button type="submit" class="btn btn-primary" { "Draw first round" }
                        }
                    }
                    BracketView tournament_id=(&tournament.id) bracket=(&bracket) editable=(editable);
                }
            })
            .render(),
    )
}

/// Draws the first round from the registrations which have not been
/// rejected, in the order they were made.
#[tracing::instrument(skip(user, conn))]
pub async fn do_seed_bracket(
    Path(tournament_id): Path<String>,
    user: User<true>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    tournament.check_user_is_organizer(&user)?;

    let players: Vec<(String, String)> =
        Registration::active_for_tournament(&tournament.id, &mut *conn)?
            .into_iter()
            .map(|r| (r.player_id, r.player_name))
            .collect();

    if players.len() < 2 {
        return bad_request(
            maud! {
                ErrorAlert msg="At least two players are needed to draw a bracket.";
            }
            .render(),
        );
    }

    let matches = load_matches(&tournament.id, &mut *conn)?;
    if !matches.is_empty() {
        return bad_request(
            maud! { ErrorAlert msg=(BracketError::AlreadySeeded.to_string()); }.render(),
        );
    }

    let mut bracket = Bracket::generate(&tournament.id, players.len(), &matches);
    if let Err(e) = bracket.seed_first_round(&players) {
        return bad_request(maud! { ErrorAlert msg=(e.to_string()); }.render());
    }
    bracket.save(&mut *conn)?;

    tracing::info!("drew bracket for {} with {} players", tournament.id, players.len());
    see_other_ok(Redirect::to(&format!("/tournament/{}/bracket", tournament.id)))
}

#[derive(Deserialize, Debug)]
pub struct ResultForm {
    winner_id: String,
    #[serde(default)]
    score: String,
}

#[tracing::instrument(skip_all)]
pub async fn do_record_match(
    Path((tournament_id, match_id)): Path<(String, String)>,
    user: User<true>,
    mut conn: Conn<true>,
    Form(form): Form<ResultForm>,
) -> StandardResponse {
    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    tournament.check_user_is_organizer(&user)?;

    let matches = load_matches(&tournament.id, &mut *conn)?;
    let Some(participants) = seeded_players(&matches) else {
        return bad_request(
            maud! {
                ErrorAlert msg="The first round has not been drawn yet.";
            }
            .render(),
        );
    };

    let mut bracket = Bracket::generate(&tournament.id, participants, &matches);
    match bracket.record_result(&match_id, &form.winner_id, Some(form.score)) {
        Ok(()) => (),
        Err(BracketError::NoSuchMatch(_)) => return err_not_found(),
        Err(e) => {
            return bad_request(maud! { ErrorAlert msg=(e.to_string()); }.render());
        }
    }
    bracket.save(&mut *conn)?;

    see_other_ok(Redirect::to(&format!("/tournament/{}/bracket", tournament.id)))
}
