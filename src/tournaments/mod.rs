use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;

use crate::{
    auth::User,
    permission::Role,
    schema::tournaments,
    sql_text::text_enum,
    util_resp::FailureResponse,
    widgets::alert::ErrorAlert,
};

pub mod admin;
pub mod bracket;
pub mod catalog;
pub mod create;
pub mod discover;
pub mod fees;
pub mod organizer;
pub mod view;

text_enum! {
    pub enum TournamentType {
        SingleElimination => "single_elimination",
        DoubleElimination => "double_elimination",
        RoundRobin => "round_robin",
        Swiss => "swiss",
        League => "league",
    }
}

impl TournamentType {
    pub fn label(&self) -> &'static str {
        match self {
            TournamentType::SingleElimination => "Single Elimination",
            TournamentType::DoubleElimination => "Double Elimination",
            TournamentType::RoundRobin => "Round Robin",
            TournamentType::Swiss => "Swiss System",
            TournamentType::League => "League",
        }
    }
}

text_enum! {
    pub enum TournamentStatus {
        Draft => "draft",
        PendingApproval => "pending_approval",
        Approved => "approved",
        Rejected => "rejected",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl TournamentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TournamentStatus::Draft => "Draft",
            TournamentStatus::PendingApproval => "Pending approval",
            TournamentStatus::Approved => "Approved",
            TournamentStatus::Rejected => "Rejected",
            TournamentStatus::Active => "Active",
            TournamentStatus::Completed => "Completed",
            TournamentStatus::Cancelled => "Cancelled",
        }
    }

    pub fn colour(&self) -> &'static str {
        match self {
            TournamentStatus::Draft | TournamentStatus::Cancelled => "secondary",
            TournamentStatus::PendingApproval => "warning",
            TournamentStatus::Approved | TournamentStatus::Active => "success",
            TournamentStatus::Rejected => "danger",
            TournamentStatus::Completed => "dark",
        }
    }

    /// Whether tournaments in this state can be seen by everybody.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            TournamentStatus::Approved
                | TournamentStatus::Active
                | TournamentStatus::Completed
        )
    }
}

/// The current date in Nepal (UTC+05:45), which is what registration
/// deadlines refer to.
pub fn today() -> NaiveDate {
    (Utc::now() + TimeDelta::minutes(345)).date_naive()
}

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = tournaments)]
#[diesel(check_for_backend(Sqlite))]
pub struct Tournament {
    pub id: String,
    pub name: String,
    pub description: String,
    pub sport_type: String,
    pub tournament_type: TournamentType,
    pub organizer_id: String,
    pub organizer_name: String,
    pub venue_name: String,
    pub venue_address: String,
    pub province: String,
    pub district: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub contact_phone: String,
    pub contact_email: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub registration_deadline: NaiveDate,
    pub max_participants: i64,
    pub current_participants: i64,
    pub entry_fee: f64,
    pub prize_pool: f64,
    pub rules: String,
    pub requirements: String,
    pub status: TournamentStatus,
    pub admin_notes: Option<String>,
    pub premium_listing: bool,
    pub image_urls: String,
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Whether a player could sign up right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Open,
    Closed,
    Full,
}

impl Availability {
    pub fn label(&self) -> &'static str {
        match self {
            Availability::Open => "Registration Open",
            Availability::Closed => "Registration Closed",
            Availability::Full => "Full",
        }
    }

    pub fn colour(&self) -> &'static str {
        match self {
            Availability::Open => "success",
            Availability::Closed => "secondary",
            Availability::Full => "danger",
        }
    }
}

/// Where a tournament is in its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Upcoming,
    InProgress,
    Finished,
}

impl Tournament {
    pub fn fetch(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Tournament, diesel::result::Error> {
        tournaments::table
            .filter(tournaments::id.eq(id))
            .select(Tournament::as_select())
            .first(conn)
    }

    pub fn is_full(&self) -> bool {
        self.current_participants >= self.max_participants
    }

    /// Registration closes at the start of the deadline day.
    pub fn registration_open(&self, today: NaiveDate) -> bool {
        self.registration_deadline > today
    }

    pub fn availability(&self, today: NaiveDate) -> Availability {
        if !self.registration_open(today) {
            Availability::Closed
        } else if self.is_full() {
            Availability::Full
        } else {
            Availability::Open
        }
    }

    pub fn phase(&self, today: NaiveDate) -> Phase {
        if today < self.start_date {
            Phase::Upcoming
        } else if today <= self.end_date {
            Phase::InProgress
        } else {
            Phase::Finished
        }
    }

    pub fn image_urls(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.image_urls)
    }

    pub fn is_organized_by<const TX: bool>(&self, user: &User<TX>) -> bool {
        self.organizer_id == user.id
    }

    /// Organizers may manage their own tournaments; administrators may manage
    /// any tournament.
    pub fn check_user_is_organizer<const TX: bool>(
        &self,
        user: &User<TX>,
    ) -> Result<(), FailureResponse> {
        if self.is_organized_by(user) || user.role == Role::Admin {
            Ok(())
        } else {
            tracing::trace!(
                "user {} is not the organizer of {}",
                user.id,
                self.id
            );
            Err(FailureResponse::Unauthorized(()))
        }
    }

    pub fn user_can_view<const TX: bool>(&self, user: Option<&User<TX>>) -> bool {
        self.status.is_public()
            || user.is_some_and(|user| {
                self.is_organized_by(user) || user.role == Role::Admin
            })
    }

    /// Tournaments which are not public are reported as missing to anybody
    /// who cannot see them.
    pub fn check_user_can_view<const TX: bool>(
        &self,
        user: Option<&User<TX>>,
    ) -> Result<(), FailureResponse> {
        if self.user_can_view(user) {
            Ok(())
        } else {
            Err(FailureResponse::NotFound(()))
        }
    }

    /// Moves the tournament to `status`, provided nobody has modified it
    /// since `expected_version` was read.
    pub fn set_status(
        &self,
        status: TournamentStatus,
        admin_notes: Option<&str>,
        expected_version: i64,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<(), FailureResponse> {
        let n = diesel::update(
            tournaments::table
                .filter(tournaments::id.eq(&self.id))
                .filter(tournaments::version.eq(expected_version)),
        )
        .set((
            tournaments::status.eq(status),
            tournaments::admin_notes.eq(admin_notes.or(self.admin_notes.as_deref())),
            tournaments::version.eq(tournaments::version + 1),
            tournaments::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

        if n == 0 {
            tracing::debug!(
                "version mismatch updating {} (expected {expected_version}, have {})",
                self.id,
                self.version
            );
            return Err(stale_version());
        }
        Ok(())
    }
}

pub(crate) fn stale_version() -> FailureResponse {
    FailureResponse::Conflict(
        maud! {
            ErrorAlert msg="Somebody else changed this in the meantime. Please reload the page and try again.";
        }
        .render(),
    )
}

/// Takes up one place. Returns `false` (and changes nothing) if the
/// tournament is already full.
pub fn take_place(
    tournament_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<bool> {
    let n = diesel::update(
        tournaments::table
            .filter(tournaments::id.eq(tournament_id))
            .filter(tournaments::current_participants.lt(tournaments::max_participants)),
    )
    .set((
        tournaments::current_participants.eq(tournaments::current_participants + 1),
        tournaments::version.eq(tournaments::version + 1),
    ))
    .execute(conn)?;
    Ok(n == 1)
}

pub fn release_place(
    tournament_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<()> {
    diesel::update(
        tournaments::table
            .filter(tournaments::id.eq(tournament_id))
            .filter(tournaments::current_participants.gt(0)),
    )
    .set((
        tournaments::current_participants.eq(tournaments::current_participants - 1),
        tournaments::version.eq(tournaments::version + 1),
    ))
    .execute(conn)?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Availability, Phase, test_support::tournament};

    #[test]
    fn registration_closes_on_deadline_day() {
        let t = tournament();
        let before = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        assert_eq!(t.availability(before), Availability::Open);
        assert_eq!(t.availability(t.registration_deadline), Availability::Closed);
    }

    #[test]
    fn full_tournaments_are_reported() {
        let mut t = tournament();
        t.current_participants = t.max_participants;
        let before = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert_eq!(t.availability(before), Availability::Full);
    }

    #[test]
    fn phases_follow_the_schedule() {
        let t = tournament();
        assert_eq!(t.phase(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()), Phase::Upcoming);
        assert_eq!(t.phase(NaiveDate::from_ymd_opt(2026, 3, 12).unwrap()), Phase::InProgress);
        assert_eq!(t.phase(NaiveDate::from_ymd_opt(2026, 3, 13).unwrap()), Phase::Finished);
    }
}
