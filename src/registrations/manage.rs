use axum::{
    extract::{Form, Path},
    response::Redirect,
};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    auth::User,
    msg::Outbox,
    notifications::{Audience, NewNotification, NotificationKind, add_notification},
    permission::{Role, require_role},
    registrations::{Registration, RegistrationStatus},
    state::Conn,
    tournaments::Tournament,
    util_resp::{StandardResponse, bad_request, see_other_ok},
    widgets::alert::ErrorAlert,
};

#[derive(Deserialize, Debug)]
pub struct StatusForm {
    status: RegistrationStatus,
    version: i64,
}

fn status_notification(
    registration: &Registration,
    tournament: &Tournament,
) -> NewNotification {
    let audience = Audience::User(registration.player_id.clone());
    let notification = match registration.status {
        RegistrationStatus::Confirmed => NewNotification::new(
            NotificationKind::RegistrationConfirmed,
            audience,
            "Registration Confirmed",
            format!(
                "Your registration for \"{}\" has been confirmed by the organizer.",
                tournament.name
            ),
        ),
        RegistrationStatus::Rejected => NewNotification::new(
            NotificationKind::RegistrationRejected,
            audience,
            "Registration Rejected",
            format!(
                "Your registration for \"{}\" has been rejected by the organizer.",
                tournament.name
            ),
        ),
        RegistrationStatus::Registered => NewNotification::new(
            NotificationKind::RegistrationSuccess,
            audience,
            "Registration Restored",
            format!(
                "Your registration for \"{}\" is active again and awaiting confirmation.",
                tournament.name
            ),
        ),
    };
    notification.about(&tournament.id, &tournament.name)
}

/// Lets a tournament's organizer confirm or reject a registration.
#[tracing::instrument(skip(user, conn, outbox))]
pub async fn do_set_status(
    Path(registration_id): Path<String>,
    user: User<true>,
    mut conn: Conn<true>,
    outbox: Outbox,
    Form(form): Form<StatusForm>,
) -> StandardResponse {
    require_role(&user, &[Role::Organizer, Role::Admin])?;

    let mut registration = Registration::fetch(&registration_id, &mut *conn)?;
    let tournament = Tournament::fetch(&registration.tournament_id, &mut *conn)?;
    tournament.check_user_is_organizer(&user)?;

    if registration.status == form.status {
        return bad_request(
            maud! {
                ErrorAlert msg=(format!(
                    "This registration is already {}.",
                    form.status.label().to_lowercase()
                ));
            }
            .render(),
        );
    }

    registration.set_status(form.status, form.version, &mut *conn)?;
    tracing::info!(
        "registration {} moved from {} to {}",
        registration.id,
        registration.status,
        form.status
    );
    registration.status = form.status;

    add_notification(
        status_notification(&registration, &tournament),
        &mut *conn,
        &outbox,
    )?;

    see_other_ok(Redirect::to("/organizer-dashboard"))
}

#[cfg(test)]
mod tests {
    use super::status_notification;
    use crate::{
        notifications::NotificationKind,
        registrations::{RegistrationStatus, test_support::registration},
        tournaments::test_support::tournament,
    };

    #[test]
    fn players_are_told_about_each_decision() {
        let t = tournament();
        let mut registration = registration(&t);

        registration.status = RegistrationStatus::Confirmed;
        let n = status_notification(&registration, &t);
        assert_eq!(n.kind, NotificationKind::RegistrationConfirmed);
        assert!(n.message.contains("Kathmandu Futsal Cup"));

        registration.status = RegistrationStatus::Rejected;
        let n = status_notification(&registration, &t);
        assert_eq!(n.kind, NotificationKind::RegistrationRejected);
        assert_eq!(n.tournament, Some((t.id.clone(), t.name.clone())));
    }
}
