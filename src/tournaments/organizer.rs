//! The organizer's view of their tournaments and who has signed up.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use diesel::prelude::*;
use hypertext::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    auth::User,
    config::Settings,
    permission::{Role, require_role},
    registrations::{Registration, RegistrationStatus},
    schema::tournaments,
    state::Conn,
    template::Page,
    tournaments::{
        Tournament,
        fees::{FeeBreakdown, format_npr},
    },
    util_resp::{FailureResponse, StandardResponse, success},
};

#[derive(Deserialize, Debug, Default, Clone)]
pub struct RegistrationFilter {
    #[serde(default)]
    tournament: String,
    #[serde(default)]
    status: String,
}

impl RegistrationFilter {
    fn status(&self) -> Option<RegistrationStatus> {
        self.status.parse().ok()
    }

    fn keep(&self, registration: &Registration) -> bool {
        (self.tournament.is_empty() || registration.tournament_id == self.tournament)
            && self.status().is_none_or(|s| registration.status == s)
    }

    fn query_string(&self) -> String {
        serde_urlencoded::to_string([
            ("tournament", self.tournament.as_str()),
            ("status", self.status.as_str()),
        ])
        .unwrap_or_default()
    }
}

fn own_tournaments<const TX: bool>(
    user: &User<TX>,
    conn: &mut Conn<TX>,
) -> QueryResult<Vec<Tournament>> {
    tournaments::table
        .filter(tournaments::organizer_id.eq(&user.id))
        .order_by(tournaments::start_date.desc())
        .select(Tournament::as_select())
        .load(&mut **conn)
}

fn filtered_registrations<const TX: bool>(
    user: &User<TX>,
    filter: &RegistrationFilter,
    conn: &mut Conn<TX>,
) -> QueryResult<Vec<(Registration, Tournament)>> {
    Ok(Registration::of_organizer(&user.id, &mut **conn)?
        .into_iter()
        .filter(|(registration, _)| filter.keep(registration))
        .collect())
}

struct StatusButtons<'r> {
    registration: &'r Registration,
}

impl<'r> Renderable for StatusButtons<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let r = self.registration;
        let action = format!("/registrations/{}/status", r.id);
        let options: Vec<(RegistrationStatus, &'static str, &'static str)> = [
            (RegistrationStatus::Confirmed, "Confirm", "btn-outline-success"),
            (RegistrationStatus::Rejected, "Reject", "btn-outline-danger"),
            (RegistrationStatus::Registered, "Reset", "btn-outline-secondary"),
        ]
        .into_iter()
        .filter(|(status, _, _)| *status != r.status)
        .collect();

        maud! {
            div class="d-flex gap-1" {
                @for (status, label, class) in &options {
                    form method="post" action=(&action) {
                        input type="hidden" name="status" value=(status.as_str());
                        input type="hidden" name="version" value=(r.version);
                        button type="submit" class=(format!("btn btn-sm {class}")) { (label) }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

pub async fn organizer_dashboard(
    user: User<false>,
    mut conn: Conn<false>,
    State(settings): State<Arc<Settings>>,
    Query(filter): Query<RegistrationFilter>,
) -> StandardResponse {
    require_role(&user, &[Role::Organizer, Role::Admin])?;

    let own = own_tournaments(&user, &mut conn)?;
    let registrations = filtered_registrations(&user, &filter, &mut conn)?;

    let fees: Vec<(Tournament, FeeBreakdown)> = own
        .iter()
        .map(|t| {
            let fees = FeeBreakdown::with_settings(
                t.entry_fee,
                t.current_participants,
                t.premium_listing,
                &settings.fees,
            );
            (t.clone(), fees)
        })
        .collect();
    let export = format!(
        "/organizer-dashboard/registrations.csv?{}",
        filter.query_string()
    );
    let selected_status = filter.status();

    success(
        Page::new()
            .title("Organizer dashboard")
            .user(user)
            .body(maud! {
                div class="d-flex justify-content-between align-items-center mb-3" {
                    h1 class="mb-0" { "Your tournaments" }
                    a href="/create-tournament" class="btn btn-primary" { "Create tournament" }
                }
                @if fees.is_empty() {
                    p class="text-muted" { "You have not created any tournaments yet." }
                } @else {
                    table class="table align-middle" {
                        thead {
                            tr {
                                th scope="col" { "Tournament" }
                                th scope="col" { "Status" }
                                th scope="col" { "Players" }
                                th scope="col" { "Revenue" }
                                th scope="col" { "Platform fees" }
                                th scope="col" { "Your earnings" }
                            }
                        }
                        tbody {
                            @for (t, fee) in &fees {
                                tr {
                                    td {
                                        a href=(format!("/tournament/{}", t.id)) { (t.name) }
                                        div class="small text-muted" {
                                            (t.start_date.format("%Y-%m-%d").to_string())
                                        }
                                    }
                                    td {
                                        span class=(format!("badge text-bg-{}", t.status.colour())) {
                                            (t.status.label())
                                        }
                                    }
                                    td { (t.current_participants) " / " (t.max_participants) }
                                    td { (format_npr(fee.total_revenue)) }
                                    td {
                                        (format_npr(fee.total_fees))
                                        div class="small text-muted" {
                                            "Commission " (format_npr(fee.commission))
                                            @if t.premium_listing {
                                                ", premium " (format_npr(fee.premium_fee))
                                            }
                                        }
                                    }
                                    td class="fw-bold" { (format_npr(fee.organizer_earnings)) }
                                }
                            }
                        }
                    }
                }

                h2 class="h4 mt-4" { "Registrations" }
                form method="get" action="/organizer-dashboard" class="row g-2 mb-3" {
                    div class="col-md-5" {
                        select name="tournament" class="form-select" {
                            option value="" { "All tournaments" }
                            @for (t, _) in &fees {
                                option value=(t.id) selected[filter.tournament == t.id] { (t.name) }
                            }
                        }
                    }
                    div class="col-md-4" {
                        select name="status" class="form-select" {
                            option value="" { "Any status" }
                            @for status in RegistrationStatus::ALL {
                                option value=(status.as_str())
                                    selected[selected_status == Some(*status)] {
                                    (status.label())
                                }
                            }
                        }
                    }
                    div class="col-md-3 d-flex gap-2" {
                        button type="submit" class="btn btn-outline-primary" { "Filter" }
                        a href=(&export) class="btn btn-outline-secondary" { "Export CSV" }
                    }
                }
                @if registrations.is_empty() {
                    p class="text-muted" { "No registrations match." }
                } @else {
                    table class="table table-sm align-middle" {
                        thead {
                            tr {
                                th scope="col" { "Player" }
                                th scope="col" { "Tournament" }
                                th scope="col" { "Contact" }
                                th scope="col" { "Level" }
                                th scope="col" { "Payment" }
                                th scope="col" { "Status" }
                                th scope="col" {}
                            }
                        }
                        tbody {
                            @for (r, t) in &registrations {
                                tr {
                                    td {
                                        (r.player_name)
                                        @if let Some(team) = &r.team_name {
                                            div class="small text-muted" { (team) }
                                        }
                                    }
                                    td { (t.name) }
                                    td {
                                        (r.email) br; (r.phone)
                                    }
                                    td { (r.experience_level.label()) }
                                    td { (r.payment_status.as_str()) }
                                    td {
                                        span class=(format!("badge text-bg-{}", r.status.colour())) {
                                            (r.status.label())
                                        }
                                    }
                                    td { StatusButtons registration=(r); }
                                }
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

#[derive(Serialize)]
struct CsvRow<'r> {
    tournament: &'r str,
    player_name: &'r str,
    email: &'r str,
    phone: &'r str,
    age: i64,
    experience_level: &'r str,
    team_name: &'r str,
    emergency_contact: &'r str,
    medical_conditions: &'r str,
    status: &'r str,
    payment_status: &'r str,
    transaction_id: &'r str,
    registered_at: String,
}

pub fn registrations_csv(
    rows: &[(Registration, Tournament)],
) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for (r, t) in rows {
        writer.serialize(CsvRow {
            tournament: &t.name,
            player_name: &r.player_name,
            email: &r.email,
            phone: &r.phone,
            age: r.age,
            experience_level: r.experience_level.as_str(),
            team_name: r.team_name.as_deref().unwrap_or(""),
            emergency_contact: &r.emergency_contact,
            medical_conditions: r.medical_conditions.as_deref().unwrap_or(""),
            status: r.status.as_str(),
            payment_status: r.payment_status.as_str(),
            transaction_id: r.transaction_id.as_deref().unwrap_or(""),
            registered_at: r.registered_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

pub async fn export_registrations_csv(
    user: User<false>,
    mut conn: Conn<false>,
    Query(filter): Query<RegistrationFilter>,
) -> Result<impl IntoResponse, FailureResponse> {
    require_role(&user, &[Role::Organizer, Role::Admin])?;

    let rows = filtered_registrations(&user, &filter, &mut conn)?;
    let body = registrations_csv(&rows).map_err(|e| {
        tracing::error!("failed to write registrations csv: {e}");
        FailureResponse::ServerError(())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"registrations.csv\"",
            ),
        ],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::{RegistrationFilter, registrations_csv};
    use crate::{
        registrations::{RegistrationStatus, test_support::registration},
        tournaments::test_support::tournament,
    };

    #[test]
    fn csv_has_a_header_and_a_row_per_registration() {
        let t = tournament();
        let mut r = registration(&t);
        r.team_name = Some("Thamel, United".to_string());

        let csv = String::from_utf8(registrations_csv(&[(r, t)]).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("tournament,player_name,email"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("Kathmandu Futsal Cup,Ram Thapa,"));
        assert!(row.contains("\"Thamel, United\""));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn filters_by_tournament_and_status() {
        let t = tournament();
        let r = registration(&t);

        assert!(RegistrationFilter::default().keep(&r));

        let by_status = RegistrationFilter {
            status: RegistrationStatus::Confirmed.to_string(),
            ..Default::default()
        };
        assert!(!by_status.keep(&r));

        let by_tournament = RegistrationFilter {
            tournament: "another".to_string(),
            ..Default::default()
        };
        assert!(!by_tournament.keep(&r));
    }
}
