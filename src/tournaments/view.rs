use axum::extract::Path;
use diesel::{connection::LoadConnection, sqlite::Sqlite};
use hypertext::prelude::*;

use crate::{
    auth::User,
    permission::Role,
    registrations::{Registration, RegistrationBlocked, check_can_register},
    state::Conn,
    template::Page,
    tournaments::{
        Availability, Tournament, TournamentStatus, admin::ReviewForms,
        fees::format_npr_f64, today,
    },
    util_resp::{StandardResponse, success},
    widgets::non_public::NonPublic,
};

/// Link to the venue on OpenStreetMap.
pub fn osm_link(lat: f64, lng: f64) -> String {
    format!("https://www.openstreetmap.org/?mlat={lat}&mlon={lng}#map=15/{lat}/{lng}")
}

/// What the viewer can do about registering.
enum RegisterAction {
    Anonymous,
    Register,
    Registered(Registration),
    Blocked(RegistrationBlocked),
    NotAPlayer,
}

struct Details<'r> {
    tournament: &'r Tournament,
}

impl<'r> Renderable for Details<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let t = self.tournament;
        let fee = if t.entry_fee > 0.0 {
            format_npr_f64(t.entry_fee)
        } else {
            "Free".to_string()
        };
        let images = t.image_urls().unwrap_or_default();
        let map = t.latitude.zip(t.longitude).map(|(lat, lng)| osm_link(lat, lng));

        maud! {
            p class="lead" { (t.description) }
            @if !images.is_empty() {
                div class="d-flex gap-2 overflow-auto mb-3" {
                    @for src in &images {
                        img src=(src) alt=(t.name) class="rounded" style="height: 10rem";
                    }
                }
            }
            div class="row g-3 mb-4" {
                div class="col-md-6" {
                    div class="card h-100" {
                        div class="card-body" {
                            h2 class="h5" { "When and where" }
                            dl class="row mb-0" {
                                dt class="col-sm-5" { "Dates" }
                                dd class="col-sm-7" {
                                    (t.start_date.format("%Y-%m-%d").to_string()) " – "
                                    (t.end_date.format("%Y-%m-%d").to_string())
                                }
                                dt class="col-sm-5" { "Register by" }
                                dd class="col-sm-7" {
                                    (t.registration_deadline.format("%Y-%m-%d").to_string())
                                }
                                dt class="col-sm-5" { "Venue" }
                                dd class="col-sm-7" {
                                    (t.venue_name) br; (t.venue_address) br;
                                    (t.district) ", " (t.province)
                                    @if let Some(map) = &map {
                                        br;
                                        a href=(map) target="_blank" rel="noopener" { "View on map" }
                                    }
                                }
                            }
                        }
                    }
                }
                div class="col-md-6" {
                    div class="card h-100" {
                        div class="card-body" {
                            h2 class="h5" { "Format" }
                            dl class="row mb-0" {
                                dt class="col-sm-5" { "Sport" }
                                dd class="col-sm-7" { (t.sport_type) }
                                dt class="col-sm-5" { "Format" }
                                dd class="col-sm-7" { (t.tournament_type.label()) }
                                dt class="col-sm-5" { "Players" }
                                dd class="col-sm-7" {
                                    (t.current_participants) " / " (t.max_participants)
                                }
                                dt class="col-sm-5" { "Entry fee" }
                                dd class="col-sm-7" { (fee) }
                                dt class="col-sm-5" { "Prize pool" }
                                dd class="col-sm-7" { (format_npr_f64(t.prize_pool)) }
                            }
                        }
                    }
                }
            }
            h2 class="h5" { "Rules" }
            p style="white-space: pre-line" { (t.rules) }
            h2 class="h5" { "Requirements" }
            p style="white-space: pre-line" { (t.requirements) }
            h2 class="h5" { "Contact" }
            p {
                (t.organizer_name) br;
                a href=(format!("tel:{}", t.contact_phone)) { (t.contact_phone) } br;
                a href=(format!("mailto:{}", t.contact_email)) { (t.contact_email) }
            }
        }
        .render_to(buffer)
    }
}

fn register_action<const TX: bool>(
    tournament: &Tournament,
    user: Option<&User<TX>>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<RegisterAction, diesel::result::Error> {
    let Some(user) = user else {
        return Ok(RegisterAction::Anonymous);
    };
    if user.role != Role::Player {
        return Ok(RegisterAction::NotAPlayer);
    }
    if let Some(registration) = Registration::find(&tournament.id, &user.id, &mut *conn)? {
        return Ok(RegisterAction::Registered(registration));
    }
    Ok(match check_can_register(tournament, &user.id, today(), &mut *conn)? {
        Ok(()) => RegisterAction::Register,
        Err(blocked) => RegisterAction::Blocked(blocked),
    })
}

pub async fn view_tournament_page(
    Path(tournament_id): Path<String>,
    user: Option<User<false>>,
    mut conn: Conn<false>,
) -> StandardResponse {
    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    tournament.check_user_can_view(user.as_ref())?;

    let action = register_action(&tournament, user.as_ref(), &mut *conn)?;
    let is_manager = user
        .as_ref()
        .is_some_and(|user| tournament.check_user_is_organizer(user).is_ok());
    let is_admin = user.as_ref().is_some_and(|user| user.is_admin());
    let availability = tournament.availability(today());

    let register = format!("/tournament/{}/register", tournament.id);
    let login = format!("/login?next=/tournament/{}", tournament.id);
    let bracket = format!("/tournament/{}/bracket", tournament.id);
    let results = format!("/tournament/{}/results", tournament.id);
    let is_public = tournament.status.is_public();
    let reason = match tournament.status {
        TournamentStatus::PendingApproval => {
            "This tournament is waiting for an administrator to approve it."
        }
        TournamentStatus::Rejected => "This tournament was not approved.",
        _ => "Only the organizer and administrators can see this tournament.",
    };

    success(
        Page::new()
            .title(tournament.name.clone())
            .user_opt(user)
            .body(maud! {
                div class="d-flex flex-wrap justify-content-between align-items-start mb-3" {
                    div {
                        h1 class="mb-1" { (tournament.name) }
                        span class=(format!("badge text-bg-{}", availability.colour())) {
                            (availability.label())
                        }
                        @if tournament.premium_listing {
                            " " span class="badge text-bg-warning" { "Featured" }
                        }
                    }
                    div class="d-flex gap-2" {
                        @match &action {
                            RegisterAction::Anonymous => {
                                @if availability == Availability::Open {
                                    a href=(&login) class="btn btn-primary" { "Log in to register" }
                                }
                            }
                            RegisterAction::Register => {
                                a href=(&register) class="btn btn-primary" { "Register" }
                            }
                            RegisterAction::Registered(registration) => {
                                span class=(format!("btn btn-outline-{} disabled", registration.status.colour())) {
                                    "You are " (registration.status.label().to_lowercase())
                                }
                            }
                            RegisterAction::Blocked(blocked) => {
                                span class="text-muted align-self-center" { (blocked.message()) }
                            }
                            RegisterAction::NotAPlayer => {}
                        }
                        @if is_public {
                            a href=(&bracket) class="btn btn-outline-secondary" { "Bracket" }
                        }
                        @if is_manager && is_public {
                            a href=(&results) class="btn btn-outline-secondary" { "Record results" }
                        }
                    }
                }
                @if is_public {
                    Details tournament=(&tournament);
                } @else {
                    NonPublic title="Not public" reason=(reason) child=(Details { tournament: &tournament });
                    @if let Some(notes) = &tournament.admin_notes {
                        div class="alert alert-warning" { "Administrator notes: " (notes) }
                    }
                    @if is_admin && tournament.status == TournamentStatus::PendingApproval {
                        ReviewForms tournament=(&tournament);
                    }
                }
            })
            .render(),
    )
}

#[cfg(test)]
mod tests {
    use super::osm_link;

    #[test]
    fn map_links_point_at_the_venue() {
        assert_eq!(
            osm_link(27.6947, 85.3145),
            "https://www.openstreetmap.org/?mlat=27.6947&mlon=85.3145#map=15/27.6947/85.3145"
        );
    }
}
