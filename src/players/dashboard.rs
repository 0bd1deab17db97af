use hypertext::prelude::*;
use itertools::Itertools;

use crate::{
    auth::User,
    notifications::{inbox, view::NotificationCard},
    permission::{Role, require_role},
    players::{
        profile::Profile,
        stats::{Achievement, Summary, sport_summary, stats_of_player, summary},
    },
    registrations::Registration,
    state::Conn,
    template::Page,
    util_resp::{StandardResponse, success},
    widgets::actions::Actions,
};

struct SummaryCards<'r> {
    summary: &'r Summary,
}

impl<'r> Renderable for SummaryCards<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let s = self.summary;
        let cards = [
            ("Tournaments", s.tournaments.to_string()),
            ("Matches", s.matches.to_string()),
            ("Wins", s.wins.to_string()),
            ("Win rate", format!("{:.1}%", s.win_rate)),
            ("Hours played", format!("{:.1}", s.hours)),
            ("Rating", format!("{:.1}", s.rating)),
        ];
        maud! {
            div class="row row-cols-2 row-cols-md-6 g-2 mb-4" {
                @for (label, value) in &cards {
                    div class="col" {
                        div class="card text-center h-100" {
                            div class="card-body p-2" {
                                div class="fs-4 fw-bold" { (value) }
                                div class="small text-muted" { (label) }
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

pub async fn player_dashboard(
    user: User<false>,
    mut conn: Conn<false>,
) -> StandardResponse {
    require_role(&user, &[Role::Player])?;

    let registrations = Registration::of_player(&user.id, &mut *conn)?;
    let overall = summary(&user.id, &mut *conn)?;
    let stats = stats_of_player(&user.id, &mut *conn)?;
    let by_sport: Vec<(String, Summary)> = stats
        .iter()
        .map(|s| s.sport_type.clone())
        .unique()
        .sorted()
        .map(|sport| {
            let summary = sport_summary(&stats, &sport);
            (sport, summary)
        })
        .collect();
    let achievements = Achievement::of_player(&user.id, &mut *conn)?;
    let recent: Vec<_> = inbox(&user, &mut *conn)?.into_iter().take(5).collect();
    let profile = Profile::fetch_or_default(&user.id, &mut *conn)?;
    let name = user.full_name.clone();

    success(
        Page::new()
            .title("Dashboard")
            .user(user)
            .body(maud! {
                div class="d-flex justify-content-between align-items-center mb-3" {
                    div {
                        h1 class="mb-0" { "Namaste, " (name) }
                        @if !profile.location.is_empty() {
                            p class="text-muted mb-0" { (profile.location) }
                        }
                    }
                    Actions options=(&[
                        ("/facilities", "Find tournaments"),
                        ("/profile", "Edit profile"),
                    ]);
                }
                SummaryCards summary=(&overall);

                div class="row g-4" {
                    div class="col-lg-8" {
                        h2 class="h4" { "My registrations" }
                        @if registrations.is_empty() {
                            p class="text-muted" { "You have not registered for any tournaments yet." }
                        } @else {
                            table class="table align-middle" {
                                thead {
                                    tr {
                                        th scope="col" { "Tournament" }
                                        th scope="col" { "Starts" }
                                        th scope="col" { "Status" }
                                        th scope="col" { "Payment" }
                                    }
                                }
                                tbody {
                                    @for (r, t) in &registrations {
                                        tr {
                                            td {
                                                a href=(format!("/tournament/{}", t.id)) { (t.name) }
                                                div class="small text-muted" { (t.sport_type) " · " (t.district) }
                                            }
                                            td { (t.start_date.format("%Y-%m-%d").to_string()) }
                                            td {
                                                span class=(format!("badge text-bg-{}", r.status.colour())) {
                                                    (r.status.label())
                                                }
                                            }
                                            td {
                                                (r.payment_status.label())
                                                @if let Some(txn) = &r.transaction_id {
                                                    " · "
                                                    a href=(format!("/payment/{txn}/receipt")) { "Receipt" }
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }

                        @if !by_sport.is_empty() {
                            h2 class="h4 mt-4" { "By sport" }
                            table class="table table-sm" {
                                thead {
                                    tr {
                                        th { "Sport" } th { "Tournaments" } th { "Matches" }
                                        th { "Wins" } th { "Hours" } th { "Rating" }
                                    }
                                }
                                tbody {
                                    @for (sport, s) in &by_sport {
                                        tr {
                                            td { (sport) }
                                            td { (s.tournaments) }
                                            td { (s.matches) }
                                            td { (s.wins) }
                                            td { (format!("{:.1}", s.hours)) }
                                            td { (format!("{:.1}", s.rating)) }
                                        }
                                    }
                                }
                            }
                        }
                    }
                    div class="col-lg-4" {
                        h2 class="h4" { "Achievements" }
                        @if achievements.is_empty() {
                            p class="text-muted" { "Play in a tournament to earn your first badge." }
                        }
                        @for a in &achievements {
                            div class="d-flex align-items-start gap-2 mb-2" {
                                span class="badge rounded-pill"
                                    style=(format!("background-color: {}", a.css_colour())) {
                                    "★"
                                }
                                div {
                                    div class="fw-semibold" { (a.title) }
                                    div class="small text-muted" { (a.description) }
                                }
                            }
                        }
                        h2 class="h4 mt-4" { "Notifications" }
                        @for item in &recent {
                            NotificationCard item=(item) actions=(false);
                        }
                        a href="/notifications" class="small" { "All notifications" }
                    }
                }
            })
            .render(),
    )
}
