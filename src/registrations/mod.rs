//! Players' registrations for tournaments.
//!
//! There is one row per (tournament, player). Players find their own
//! registrations through `player_id`, organizers through the tournament.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    schema::{registrations, tournaments},
    sql_text::text_enum,
    tournaments::{Tournament, TournamentStatus, release_place, take_place},
    util_resp::FailureResponse,
    validation::{Problems, has_min_chars, is_valid_email, is_valid_phone},
    widgets::alert::ErrorAlert,
};

pub mod manage;
pub mod register;

text_enum! {
    pub enum RegistrationStatus {
        Registered => "registered",
        Confirmed => "confirmed",
        Rejected => "rejected",
    }
}

impl RegistrationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "Registered",
            RegistrationStatus::Confirmed => "Confirmed",
            RegistrationStatus::Rejected => "Rejected",
        }
    }

    pub fn colour(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "primary",
            RegistrationStatus::Confirmed => "success",
            RegistrationStatus::Rejected => "danger",
        }
    }
}

text_enum! {
    pub enum ExperienceLevel {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
        Professional => "professional",
    }
}

impl ExperienceLevel {
    pub fn label(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "Beginner",
            ExperienceLevel::Intermediate => "Intermediate",
            ExperienceLevel::Advanced => "Advanced",
            ExperienceLevel::Professional => "Professional",
        }
    }
}

text_enum! {
    pub enum PaymentStatus {
        NotRequired => "not_required",
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
}

impl PaymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::NotRequired => "Free entry",
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Paid",
            PaymentStatus::Failed => "Failed",
        }
    }
}

#[derive(Queryable, Selectable, Clone, Debug, Serialize)]
#[diesel(table_name = registrations)]
#[diesel(check_for_backend(Sqlite))]
pub struct Registration {
    pub id: String,
    pub tournament_id: String,
    pub player_id: String,
    pub player_name: String,
    pub email: String,
    pub phone: String,
    pub age: i64,
    pub experience_level: ExperienceLevel,
    pub team_name: Option<String>,
    pub emergency_contact: String,
    pub medical_conditions: Option<String>,
    pub status: RegistrationStatus,
    pub entry_fee_paid: bool,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub version: i64,
    pub registered_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The registration form as submitted. Everything is a string so that a
/// badly filled form can be shown again with all its problems.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RegistrationForm {
    pub player_name: String,
    pub email: String,
    pub phone: String,
    pub age: String,
    pub experience_level: String,
    #[serde(default)]
    pub team_name: String,
    pub emergency_contact: String,
    #[serde(default)]
    pub medical_conditions: String,
    pub terms_accepted: Option<String>,
}

/// A validated registration form. This is also what is kept with a pending
/// payment, so that the registration can be written once the payment clears.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegistrationDetails {
    pub player_name: String,
    pub email: String,
    pub phone: String,
    pub age: i64,
    pub experience_level: ExperienceLevel,
    pub team_name: Option<String>,
    pub emergency_contact: String,
    pub medical_conditions: Option<String>,
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<RegistrationDetails, Vec<String>> {
        let mut problems = Problems::new();

        problems.check(
            has_min_chars(&self.player_name, 2),
            "Name must be at least 2 characters.",
        );
        problems.check(
            is_valid_email(&self.email).is_ok(),
            "Please enter a valid email address.",
        );
        problems.check(
            is_valid_phone(&self.phone).is_ok(),
            "Phone number must contain at least 10 digits.",
        );

        let age = self.age.trim().parse::<i64>().ok();
        problems.check(
            age.is_some_and(|age| (13..=100).contains(&age)),
            "Age must be between 13 and 100.",
        );

        let experience_level = self.experience_level.parse::<ExperienceLevel>().ok();
        problems.check(
            experience_level.is_some(),
            "Please select your experience level.",
        );
        problems.check(
            is_valid_phone(&self.emergency_contact).is_ok(),
            "Emergency contact must contain at least 10 digits.",
        );
        problems.check(
            self.terms_accepted.is_some(),
            "You must accept the terms and conditions.",
        );

        problems.finish()?;

        match (age, experience_level) {
            (Some(age), Some(experience_level)) => Ok(RegistrationDetails {
                player_name: self.player_name.trim().to_string(),
                email: self.email.trim().to_string(),
                phone: self.phone.trim().to_string(),
                age,
                experience_level,
                team_name: non_blank(&self.team_name),
                emergency_contact: self.emergency_contact.trim().to_string(),
                medical_conditions: non_blank(&self.medical_conditions),
            }),
            _ => Err(Vec::new()),
        }
    }
}

/// Why a player cannot register for a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationBlocked {
    NotApproved,
    DeadlinePassed,
    Full,
    AlreadyRegistered,
}

impl RegistrationBlocked {
    pub fn message(&self) -> &'static str {
        match self {
            RegistrationBlocked::NotApproved => {
                "This tournament is not open for registration."
            }
            RegistrationBlocked::DeadlinePassed => {
                "The registration deadline has passed."
            }
            RegistrationBlocked::Full => "This tournament is full.",
            RegistrationBlocked::AlreadyRegistered => {
                "You are already registered for this tournament."
            }
        }
    }
}

/// Checks the rules which hold regardless of what was entered in the form.
pub fn check_can_register(
    tournament: &Tournament,
    player_id: &str,
    today: NaiveDate,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Result<(), RegistrationBlocked>> {
    if tournament.status != TournamentStatus::Approved {
        return Ok(Err(RegistrationBlocked::NotApproved));
    }
    if !tournament.registration_open(today) {
        return Ok(Err(RegistrationBlocked::DeadlinePassed));
    }
    if tournament.is_full() {
        return Ok(Err(RegistrationBlocked::Full));
    }
    if Registration::find(&tournament.id, player_id, conn)?.is_some() {
        return Ok(Err(RegistrationBlocked::AlreadyRegistered));
    }
    Ok(Ok(()))
}

/// How the entry fee was settled.
#[derive(Debug, Clone)]
pub enum Settlement {
    Free,
    Paid { transaction_id: String },
}

impl Registration {
    pub fn fetch(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Registration, diesel::result::Error> {
        registrations::table
            .filter(registrations::id.eq(id))
            .select(Registration::as_select())
            .first(conn)
    }

    pub fn find(
        tournament_id: &str,
        player_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Option<Registration>> {
        registrations::table
            .filter(registrations::tournament_id.eq(tournament_id))
            .filter(registrations::player_id.eq(player_id))
            .select(Registration::as_select())
            .first(conn)
            .optional()
    }

    /// A player's registrations, with the tournament each is for, most
    /// recent first.
    pub fn of_player(
        player_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Vec<(Registration, Tournament)>> {
        registrations::table
            .inner_join(tournaments::table)
            .filter(registrations::player_id.eq(player_id))
            .order_by(registrations::registered_at.desc())
            .select((Registration::as_select(), Tournament::as_select()))
            .load(conn)
    }

    /// Registrations for every tournament run by the organizer.
    pub fn of_organizer(
        organizer_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Vec<(Registration, Tournament)>> {
        registrations::table
            .inner_join(tournaments::table)
            .filter(tournaments::organizer_id.eq(organizer_id))
            .order_by((tournaments::start_date, registrations::registered_at))
            .select((Registration::as_select(), Tournament::as_select()))
            .load(conn)
    }

    /// Registrations which have not been rejected, in the order they were
    /// made.
    pub fn active_for_tournament(
        tournament_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Vec<Registration>> {
        registrations::table
            .filter(registrations::tournament_id.eq(tournament_id))
            .filter(registrations::status.ne(RegistrationStatus::Rejected))
            .order_by((registrations::registered_at, registrations::id))
            .select(Registration::as_select())
            .load(conn)
    }

    /// Number of tournaments the player has taken part in (registrations
    /// which were not rejected).
    pub fn count_active_for_player(
        player_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<i64> {
        registrations::table
            .filter(registrations::player_id.eq(player_id))
            .filter(registrations::status.ne(RegistrationStatus::Rejected))
            .count()
            .get_result(conn)
    }

    /// Writes a registration and takes up a place in the tournament. Nothing
    /// is written if the tournament filled up in the meantime.
    #[tracing::instrument(skip(conn, details))]
    pub fn create(
        tournament: &Tournament,
        player_id: &str,
        details: &RegistrationDetails,
        settlement: Settlement,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Registration, FailureResponse> {
        if !take_place(&tournament.id, &mut *conn)? {
            return Err(FailureResponse::Conflict(
                maud! {
                    ErrorAlert msg=(RegistrationBlocked::Full.message());
                }
                .render(),
            ));
        }

        let (entry_fee_paid, payment_status, transaction_id) = match settlement {
            Settlement::Free => (false, PaymentStatus::NotRequired, None),
            Settlement::Paid { transaction_id } => {
                (true, PaymentStatus::Completed, Some(transaction_id))
            }
        };

        let now = Utc::now().naive_utc();
        let registration = Registration {
            id: format!("reg_{}", Uuid::now_v7()),
            tournament_id: tournament.id.clone(),
            player_id: player_id.to_string(),
            player_name: details.player_name.clone(),
            email: details.email.clone(),
            phone: details.phone.clone(),
            age: details.age,
            experience_level: details.experience_level,
            team_name: details.team_name.clone(),
            emergency_contact: details.emergency_contact.clone(),
            medical_conditions: details.medical_conditions.clone(),
            status: RegistrationStatus::Registered,
            entry_fee_paid,
            payment_status,
            transaction_id,
            version: 0,
            registered_at: now,
            updated_at: now,
        };

        diesel::insert_into(registrations::table)
            .values((
                registrations::id.eq(&registration.id),
                registrations::tournament_id.eq(&registration.tournament_id),
                registrations::player_id.eq(&registration.player_id),
                registrations::player_name.eq(&registration.player_name),
                registrations::email.eq(&registration.email),
                registrations::phone.eq(&registration.phone),
                registrations::age.eq(registration.age),
                registrations::experience_level.eq(registration.experience_level),
                registrations::team_name.eq(&registration.team_name),
                registrations::emergency_contact.eq(&registration.emergency_contact),
                registrations::medical_conditions.eq(&registration.medical_conditions),
                registrations::status.eq(registration.status),
                registrations::entry_fee_paid.eq(registration.entry_fee_paid),
                registrations::payment_status.eq(registration.payment_status),
                registrations::transaction_id.eq(&registration.transaction_id),
                registrations::version.eq(registration.version),
                registrations::registered_at.eq(registration.registered_at),
                registrations::updated_at.eq(registration.updated_at),
            ))
            .execute(&mut *conn)?;

        tracing::info!(
            "player {player_id} registered for {} as {}",
            tournament.id,
            registration.id
        );
        Ok(registration)
    }

    /// Changes the registration's status, provided nobody has modified it
    /// since `expected_version` was read. Keeps the tournament's participant
    /// counter equal to the number of registrations which are not rejected.
    pub fn set_status(
        &self,
        status: RegistrationStatus,
        expected_version: i64,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<(), FailureResponse> {
        let n = diesel::update(
            registrations::table
                .filter(registrations::id.eq(&self.id))
                .filter(registrations::version.eq(expected_version)),
        )
        .set((
            registrations::status.eq(status),
            registrations::version.eq(registrations::version + 1),
            registrations::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)?;

        if n == 0 {
            return Err(crate::tournaments::stale_version());
        }

        let was_rejected = self.status == RegistrationStatus::Rejected;
        let is_rejected = status == RegistrationStatus::Rejected;

        if is_rejected && !was_rejected {
            release_place(&self.tournament_id, &mut *conn)?;
        } else if was_rejected && !is_rejected && !take_place(&self.tournament_id, &mut *conn)? {
            return Err(FailureResponse::Conflict(
                maud! {
                    ErrorAlert msg="The tournament is full, so this registration cannot be restored.";
                }
                .render(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use super::*;

    pub fn registration(tournament: &Tournament) -> Registration {
        let now = Utc::now().naive_utc();
        Registration {
            id: "reg_test".to_string(),
            tournament_id: tournament.id.clone(),
            player_id: "ram".to_string(),
            player_name: "Ram Thapa".to_string(),
            email: "ram@example.com".to_string(),
            phone: "9841234567".to_string(),
            age: 21,
            experience_level: ExperienceLevel::Intermediate,
            team_name: None,
            emergency_contact: "9801234567".to_string(),
            medical_conditions: None,
            status: RegistrationStatus::Registered,
            entry_fee_paid: false,
            payment_status: PaymentStatus::NotRequired,
            transaction_id: None,
            version: 0,
            registered_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> RegistrationForm {
        RegistrationForm {
            player_name: "Ram Thapa".to_string(),
            email: "ram@example.com".to_string(),
            phone: "9841234567".to_string(),
            age: "21".to_string(),
            experience_level: "intermediate".to_string(),
            team_name: "  ".to_string(),
            emergency_contact: "9801234567".to_string(),
            medical_conditions: String::new(),
            terms_accepted: Some("on".to_string()),
        }
    }

    #[test]
    fn valid_forms_are_normalised() {
        let details = form().validate().unwrap();
        assert_eq!(details.age, 21);
        assert_eq!(details.experience_level, ExperienceLevel::Intermediate);
        assert_eq!(details.team_name, None);
        assert_eq!(details.medical_conditions, None);
    }

    #[test]
    fn age_must_be_in_range() {
        for age in ["12", "101", "twenty", ""] {
            let mut f = form();
            f.age = age.to_string();
            assert_eq!(
                f.validate(),
                Err(vec!["Age must be between 13 and 100.".to_string()]),
                "age = {age}"
            );
        }
    }

    #[test]
    fn every_problem_is_reported() {
        let f = RegistrationForm::default();
        let errors = f.validate().unwrap_err();
        assert_eq!(errors.len(), 7);
    }
}
