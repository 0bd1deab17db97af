use std::sync::Arc;

use axum::{
    extract::{Form, Path, State},
    response::Redirect,
};
use hypertext::prelude::*;

use crate::{
    auth::User,
    config::Settings,
    msg::Outbox,
    notifications::{Audience, NewNotification, NotificationKind, add_notification},
    payments::{Payment, gateway::checkout},
    permission::{Role, require_role},
    registrations::{
        ExperienceLevel, Registration, RegistrationForm, Settlement,
        check_can_register,
    },
    state::Conn,
    template::Page,
    tournaments::{Tournament, fees::format_npr_f64, today},
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    widgets::alert::{ErrorAlert, ErrorList},
};

struct TournamentSummary<'r> {
    tournament: &'r Tournament,
}

impl<'r> Renderable for TournamentSummary<'r> {
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
        maud! {
            div class="card mb-4" {
                div class="card-body" {
                    h2 class="h5 card-title" { (t.name) }
                    p class="card-text text-muted mb-2" {
                        (t.sport_type) " · " (t.venue_name) ", " (t.district)
                    }
                    ul class="list-inline mb-0" {
                        li class="list-inline-item" {
                            "Starts " (t.start_date.format("%Y-%m-%d").to_string())
                        }
                        li class="list-inline-item" {
                            "Register by " (t.registration_deadline.format("%Y-%m-%d").to_string())
                        }
                        li class="list-inline-item" {
                            (t.current_participants) "/" (t.max_participants) " registered"
                        }
                        li class="list-inline-item fw-bold" { "Entry fee: " (fee) }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

fn registration_form(
    tournament: &Tournament,
    form: &RegistrationForm,
    errors: &[String],
) -> impl Renderable + use<> {
    let action = format!("/tournament/{}/register", tournament.id);
    let submit = if tournament.entry_fee > 0.0 {
        format!("Pay {} with eSewa", format_npr_f64(tournament.entry_fee))
    } else {
        "Register".to_string()
    };
    let form = form.clone();
    let errors = errors.to_vec();

    maud! {
        @if !errors.is_empty() {
            ErrorList errors=(&errors);
        }
        form method="post" action=(action) style="max-width: 40rem" {
            div class="row" {
                div class="col-md-6 mb-3" {
                    label for="player_name" class="form-label" { "Full name" }
                    input type="text" class="form-control" id="player_name" name="player_name"
                        value=(form.player_name) required;
                }
                div class="col-md-6 mb-3" {
                    label for="email" class="form-label" { "Email" }
                    input type="email" class="form-control" id="email" name="email"
                        value=(form.email) required;
                }
            }
            div class="row" {
                div class="col-md-6 mb-3" {
                    label for="phone" class="form-label" { "Phone" }
                    input type="tel" class="form-control" id="phone" name="phone"
                        value=(form.phone) required;
                }
                div class="col-md-3 mb-3" {
                    label for="age" class="form-label" { "Age" }
                    input type="number" min="13" max="100" class="form-control" id="age" name="age"
                        value=(form.age) required;
                }
                div class="col-md-3 mb-3" {
                    label for="experience_level" class="form-label" { "Experience" }
                    select class="form-select" id="experience_level" name="experience_level" required {
                        option value="" { "Choose…" }
                        @for level in ExperienceLevel::ALL {
                            option value=(level.as_str())
                                selected[form.experience_level == level.as_str()] {
                                (level.label())
                            }
                        }
                    }
                }
            }
            div class="mb-3" {
                label for="team_name" class="form-label" { "Team name (optional)" }
                input type="text" class="form-control" id="team_name" name="team_name"
                    value=(form.team_name);
            }
            div class="mb-3" {
                label for="emergency_contact" class="form-label" { "Emergency contact number" }
                input type="tel" class="form-control" id="emergency_contact" name="emergency_contact"
                    value=(form.emergency_contact) required;
            }
            div class="mb-3" {
                label for="medical_conditions" class="form-label" {
                    "Medical conditions (optional)"
                }
                textarea class="form-control" id="medical_conditions" name="medical_conditions" rows="2" {
                    (form.medical_conditions)
                }
            }
            div class="form-check mb-3" {
                input class="form-check-input" type="checkbox" id="terms_accepted" name="terms_accepted"
                    checked[form.terms_accepted.is_some()];
                label class="form-check-label" for="terms_accepted" {
                    "I accept the tournament rules and the terms and conditions."
                }
            }
            button type="submit" class="btn btn-primary" { (submit) }
        }
    }
}

fn registration_body(
    tournament: &Tournament,
    blocked: Option<&'static str>,
    form: &RegistrationForm,
    errors: &[String],
) -> impl Renderable + use<> {
    let tournament = tournament.clone();
    let form = registration_form(&tournament, form, errors);
    let back = format!("/tournament/{}", tournament.id);

    maud! {
        h1 { "Register for tournament" }
        TournamentSummary tournament=(&tournament);
        @if let Some(blocked) = blocked {
            ErrorAlert msg=(blocked);
            a href=(back) class="btn btn-outline-secondary" { "Back to tournament" }
        } @else {
            (form)
        }
    }
}

fn prefilled<const TX: bool>(user: &User<TX>) -> RegistrationForm {
    RegistrationForm {
        player_name: user.full_name.clone(),
        email: user.email.clone(),
        phone: user.phone.clone().unwrap_or_default(),
        ..Default::default()
    }
}

pub async fn registration_page(
    Path(tournament_id): Path<String>,
    user: User<false>,
    mut conn: Conn<false>,
) -> StandardResponse {
    require_role(&user, &[Role::Player])?;

    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    tournament.check_user_can_view(Some(&user))?;

    let blocked = check_can_register(&tournament, &user.id, today(), &mut *conn)?
        .err()
        .map(|blocked| blocked.message());
    let form = prefilled(&user);

    success(
        Page::new()
            .title(format!("Register · {}", tournament.name))
            .body(registration_body(&tournament, blocked, &form, &[]))
            .user(user)
            .render(),
    )
}

#[tracing::instrument(skip(user, conn, settings, outbox, form))]
pub async fn do_register_for_tournament(
    Path(tournament_id): Path<String>,
    user: User<true>,
    mut conn: Conn<true>,
    State(settings): State<Arc<Settings>>,
    outbox: Outbox,
    Form(form): Form<RegistrationForm>,
) -> StandardResponse {
    require_role(&user, &[Role::Player])?;

    let tournament = Tournament::fetch(&tournament_id, &mut *conn)?;
    tournament.check_user_can_view(Some(&user))?;

    if let Err(blocked) =
        check_can_register(&tournament, &user.id, today(), &mut *conn)?
    {
        tracing::debug!("registration refused: {blocked:?}");
        return bad_request(
            Page::new()
                .title("Register")
                .body(registration_body(
                    &tournament,
                    Some(blocked.message()),
                    &form,
                    &[],
                ))
                .user(user)
                .render(),
        );
    }

    let details = match form.validate() {
        Ok(details) => details,
        Err(errors) => {
            return bad_request(
                Page::new()
                    .title("Register")
                    .body(registration_body(&tournament, None, &form, &errors))
                    .user(user)
                    .render(),
            );
        }
    };

    if tournament.entry_fee <= 0.0 {
        Registration::create(
            &tournament,
            &user.id,
            &details,
            Settlement::Free,
            &mut *conn,
        )?;

        add_notification(
            NewNotification::new(
                NotificationKind::RegistrationSuccess,
                Audience::User(user.id.clone()),
                "Registration Successful!",
                format!(
                    "Your registration for \"{}\" has been completed successfully.",
                    tournament.name
                ),
            )
            .about(&tournament.id, &tournament.name),
            &mut *conn,
            &outbox,
        )?;

        return see_other_ok(Redirect::to("/player-dashboard"));
    }

    let payment = Payment::start(&tournament, &user.id, &details, &mut *conn)?;
    checkout(&payment, &tournament, user, &settings.payment)
}
