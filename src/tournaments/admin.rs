//! Review of submitted tournaments by administrators.

use std::collections::HashMap;

use axum::{
    extract::{Form, Path, Query},
    response::Redirect,
};
use diesel::{
    connection::LoadConnection, dsl::count_star, prelude::*, sqlite::Sqlite,
};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    auth::User,
    msg::Outbox,
    notifications::{
        Audience, NewNotification, NotificationKind, TargetRole, add_notification,
    },
    permission::{Role, require_role},
    schema::{
        bracket_matches, payments, player_achievements, player_stats, registrations,
        tournaments,
    },
    state::Conn,
    template::Page,
    tournaments::{Tournament, TournamentStatus, fees::format_npr_f64},
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    widgets::alert::ErrorAlert,
};

#[derive(Deserialize, Debug, Default)]
pub struct AdminQuery {
    status: Option<TournamentStatus>,
}

/// Approve/reject buttons for a tournament which is awaiting review.
pub struct ReviewForms<'r> {
    pub tournament: &'r Tournament,
}

impl<'r> Renderable for ReviewForms<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let t = self.tournament;
        let approve = format!("/admin/tournaments/{}/approve", t.id);
        let reject = format!("/admin/tournaments/{}/reject", t.id);
        maud! {
            div class="d-flex flex-wrap gap-2 align-items-start" {
                form method="post" action=(approve) {
                    input type="hidden" name="version" value=(t.version);
                    button type="submit" class="btn btn-sm btn-success" { "Approve" }
                }
                form method="post" action=(reject) class="d-flex gap-2" {
                    input type="hidden" name="version" value=(t.version);
                    input type="text" name="reason" class="form-control form-control-sm"
                        placeholder="Reason for rejection" required;
                    button type="submit" class="btn btn-sm btn-outline-danger" { "Reject" }
                }
            }
        }
        .render_to(buffer)
    }
}

struct DeleteForm<'r> {
    tournament: &'r Tournament,
}

impl<'r> Renderable for DeleteForm<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let action = format!("/admin/tournaments/{}/delete", self.tournament.id);
        maud! {
            form method="post" action=(action) {
                button type="submit" class="btn btn-sm btn-danger" { "Delete" }
            }
        }
        .render_to(buffer)
    }
}

fn status_counts(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<HashMap<TournamentStatus, i64>> {
    let rows: Vec<(TournamentStatus, i64)> = tournaments::table
        .group_by(tournaments::status)
        .select((tournaments::status, count_star()))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

pub async fn admin_dashboard(
    user: User<false>,
    mut conn: Conn<false>,
    Query(query): Query<AdminQuery>,
) -> StandardResponse {
    require_role(&user, &[Role::Admin])?;

    let counts = status_counts(&mut *conn)?;
    let total: i64 = counts.values().sum();

    let mut list = tournaments::table
        .select(Tournament::as_select())
        .order_by(tournaments::created_at.desc())
        .into_boxed();
    if let Some(status) = query.status {
        list = list.filter(tournaments::status.eq(status));
    }
    let list = list.load::<Tournament>(&mut *conn)?;
    let selected = query.status;

    success(
        Page::new()
            .title("Administration")
            .user(user)
            .body(maud! {
                h1 { "Tournament review" }
                div class="row row-cols-2 row-cols-md-4 g-3 mb-4" {
                    div class="col" {
                        div class="card text-center" {
                            div class="card-body" {
                                div class="fs-3 fw-bold" { (total) }
                                a href="/admin" class="stretched-link text-muted" { "All tournaments" }
                            }
                        }
                    }
                    @for status in TournamentStatus::ALL {
                        @let n = counts.get(status).copied().unwrap_or(0);
                        div class="col" {
                            div class=(format!("card text-center border-{}", status.colour())) {
                                div class="card-body" {
                                    div class="fs-3 fw-bold" { (n) }
                                    a href=(format!("/admin?status={status}"))
                                        class="stretched-link text-muted" {
                                        (status.label())
                                    }
                                }
                            }
                        }
                    }
                }
                h2 class="h4" {
                    @if let Some(status) = selected {
                        (status.label())
                    } @else {
                        "All tournaments"
                    }
                }
                @if list.is_empty() {
                    p class="text-muted" { "Nothing to show." }
                } @else {
                    table class="table align-middle" {
                        thead {
                            tr {
                                th scope="col" { "Tournament" }
                                th scope="col" { "Organizer" }
                                th scope="col" { "Dates" }
                                th scope="col" { "Entry fee" }
                                th scope="col" { "Status" }
                                th scope="col" { "Actions" }
                            }
                        }
                        tbody {
                            @for t in &list {
                                tr {
                                    td {
                                        a href=(format!("/tournament/{}", t.id)) { (t.name) }
                                        div class="small text-muted" {
                                            (t.sport_type) " · " (t.district) ", " (t.province)
                                        }
                                    }
                                    td { (t.organizer_name) }
                                    td {
                                        (t.start_date.format("%Y-%m-%d").to_string())
                                        " – "
                                        (t.end_date.format("%Y-%m-%d").to_string())
                                    }
                                    td { (format_npr_f64(t.entry_fee)) }
                                    td {
                                        span class=(format!("badge text-bg-{}", t.status.colour())) {
                                            (t.status.label())
                                        }
                                        @if let Some(notes) = &t.admin_notes {
                                            div class="small text-muted" { (notes) }
                                        }
                                    }
                                    td {
                                        div class="d-flex flex-column gap-2" {
                                            @if t.status == TournamentStatus::PendingApproval {
                                                ReviewForms tournament=(t);
                                            }
                                            DeleteForm tournament=(t);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

#[derive(Deserialize, Debug)]
pub struct VersionForm {
    version: i64,
}

fn not_pending(tournament: &Tournament) -> StandardResponse {
    bad_request(
        maud! {
            ErrorAlert msg=(format!(
                "Only tournaments awaiting approval can be reviewed (this one is {}).",
                tournament.status.label().to_lowercase()
            ));
        }
        .render(),
    )
}

/// The organizer hears that their tournament is live, and players hear that
/// there is a new tournament to sign up for.
pub fn approval_notifications(tournament: &Tournament) -> [NewNotification; 2] {
    [
        NewNotification::new(
            NotificationKind::TournamentApproved,
            Audience::User(tournament.organizer_id.clone()),
            "Tournament Approved!",
            format!(
                "Your tournament \"{}\" has been approved and is now visible to players.",
                tournament.name
            ),
        )
        .about(&tournament.id, &tournament.name),
        NewNotification::new(
            NotificationKind::NewTournamentAvailable,
            Audience::Role(TargetRole::Player),
            "New Tournament Available!",
            format!(
                "{} ({}) is now open for registration in {}, {}.",
                tournament.name,
                tournament.sport_type,
                tournament.district,
                tournament.province
            ),
        )
        .about(&tournament.id, &tournament.name),
    ]
}

#[tracing::instrument(skip(user, conn, outbox, form))]
pub async fn do_approve(
    Path(tournament_id): Path<String>,
    user: User<true>,
    mut conn: Conn<true>,
    outbox: Outbox,
    Form(form): Form<VersionForm>,
) -> StandardResponse {
    require_role(&user, &[Role::Admin])?;

    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    if tournament.status != TournamentStatus::PendingApproval {
        return not_pending(&tournament);
    }

    tournament.set_status(
        TournamentStatus::Approved,
        None,
        form.version,
        &mut *conn,
    )?;
    tracing::info!("tournament {} approved by {}", tournament.id, user.id);

    for notification in approval_notifications(&tournament) {
        add_notification(notification, &mut *conn, &outbox)?;
    }

    see_other_ok(Redirect::to("/admin?status=pending_approval"))
}

#[derive(Deserialize, Debug)]
pub struct RejectForm {
    #[serde(default)]
    reason: String,
    version: i64,
}

#[tracing::instrument(skip(user, conn, outbox, form))]
pub async fn do_reject(
    Path(tournament_id): Path<String>,
    user: User<true>,
    mut conn: Conn<true>,
    outbox: Outbox,
    Form(form): Form<RejectForm>,
) -> StandardResponse {
    require_role(&user, &[Role::Admin])?;

    let reason = form.reason.trim();
    if reason.is_empty() {
        return bad_request(
            maud! {
                ErrorAlert msg="Please give a reason for rejecting this tournament.";
            }
            .render(),
        );
    }

    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    if tournament.status != TournamentStatus::PendingApproval {
        return not_pending(&tournament);
    }

    tournament.set_status(
        TournamentStatus::Rejected,
        Some(reason),
        form.version,
        &mut *conn,
    )?;
    tracing::info!("tournament {} rejected by {}", tournament.id, user.id);

    add_notification(
        NewNotification::new(
            NotificationKind::TournamentRejected,
            Audience::User(tournament.organizer_id.clone()),
            "Tournament Rejected",
            format!(
                "Your tournament \"{}\" was not approved. Reason: {reason}",
                tournament.name
            ),
        )
        .about(&tournament.id, &tournament.name),
        &mut *conn,
        &outbox,
    )?;

    see_other_ok(Redirect::to("/admin?status=pending_approval"))
}

/// Removes a tournament along with everything recorded against it.
#[tracing::instrument(skip(user, conn, outbox))]
pub async fn do_delete(
    Path(tournament_id): Path<String>,
    user: User<true>,
    mut conn: Conn<true>,
    outbox: Outbox,
) -> StandardResponse {
    require_role(&user, &[Role::Admin])?;

    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;

    let n_registrations = diesel::delete(
        registrations::table.filter(registrations::tournament_id.eq(&tournament.id)),
    )
    .execute(&mut *conn)?;
    diesel::delete(payments::table.filter(payments::tournament_id.eq(&tournament.id)))
        .execute(&mut *conn)?;
    diesel::delete(
        bracket_matches::table.filter(bracket_matches::tournament_id.eq(&tournament.id)),
    )
    .execute(&mut *conn)?;
    diesel::delete(
        player_stats::table.filter(player_stats::tournament_id.eq(&tournament.id)),
    )
    .execute(&mut *conn)?;
    diesel::delete(
        player_achievements::table
            .filter(player_achievements::tournament_id.eq(&tournament.id)),
    )
    .execute(&mut *conn)?;
    diesel::delete(tournaments::table.filter(tournaments::id.eq(&tournament.id)))
        .execute(&mut *conn)?;

    tracing::info!(
        "tournament {} deleted by {} ({n_registrations} registrations removed)",
        tournament.id,
        user.id
    );

    add_notification(
        NewNotification::new(
            NotificationKind::TournamentDeleted,
            Audience::User(tournament.organizer_id.clone()),
            "Tournament Deleted",
            format!(
                "Your tournament \"{}\" has been deleted by an administrator.",
                tournament.name
            ),
        ),
        &mut *conn,
        &outbox,
    )?;

    see_other_ok(Redirect::to("/admin"))
}

#[cfg(test)]
mod tests {
    use super::approval_notifications;
    use crate::{
        notifications::{Audience, NotificationKind, TargetRole},
        tournaments::test_support::tournament,
    };

    #[test]
    fn approval_tells_organizer_and_players() {
        let t = tournament();
        let [organizer, players] = approval_notifications(&t);

        assert_eq!(organizer.kind, NotificationKind::TournamentApproved);
        assert!(matches!(&organizer.audience, Audience::User(id) if id == "org"));

        assert_eq!(players.kind, NotificationKind::NewTournamentAvailable);
        assert!(matches!(players.audience, Audience::Role(TargetRole::Player)));
        assert_eq!(players.title, "New Tournament Available!");
    }
}
