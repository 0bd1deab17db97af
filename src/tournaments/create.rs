use axum::{
    extract::Form,
    response::Redirect,
};
use chrono::{NaiveDate, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::{
    auth::User,
    msg::Outbox,
    notifications::{
        Audience, NewNotification, NotificationKind, TargetRole, add_notification,
    },
    permission::{Role, require_role},
    schema::tournaments,
    state::Conn,
    template::Page,
    tournaments::{
        Tournament, TournamentStatus, TournamentType,
        catalog::{NEPAL_PROVINCES, SPORTS_TYPES, is_valid_location, is_valid_sport},
    },
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    validation::{Problems, has_min_chars, is_valid_email, is_valid_phone},
    widgets::alert::ErrorList,
};

/// The tournament form as submitted.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct TournamentForm {
    pub name: String,
    pub description: String,
    pub sport_type: String,
    pub tournament_type: String,
    pub start_date: String,
    pub end_date: String,
    pub registration_deadline: String,
    pub max_participants: String,
    pub entry_fee: String,
    pub prize_pool: String,
    pub venue_name: String,
    pub venue_address: String,
    pub province: String,
    pub district: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
    pub rules: String,
    pub requirements: String,
    pub contact_phone: String,
    pub contact_email: String,
    /// One URL per line.
    #[serde(default)]
    pub image_urls: String,
    pub premium_listing: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TournamentDetails {
    pub name: String,
    pub description: String,
    pub sport_type: String,
    pub tournament_type: TournamentType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub registration_deadline: NaiveDate,
    pub max_participants: i64,
    pub entry_fee: f64,
    pub prize_pool: f64,
    pub venue_name: String,
    pub venue_address: String,
    pub province: String,
    pub district: String,
    pub location: Option<(f64, f64)>,
    pub rules: String,
    pub requirements: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub image_urls: Vec<String>,
    pub premium_listing: bool,
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_amount(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return Some(0.0);
    }
    s.parse::<f64>().ok().filter(|x| x.is_finite())
}

fn parse_location(lat: &str, lng: &str) -> Result<Option<(f64, f64)>, ()> {
    match (lat.trim(), lng.trim()) {
        ("", "") => Ok(None),
        (lat, lng) => {
            let lat = lat.parse::<f64>().map_err(|_| ())?;
            let lng = lng.parse::<f64>().map_err(|_| ())?;
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) {
                Ok(Some((lat, lng)))
            } else {
                Err(())
            }
        }
    }
}

impl TournamentForm {
    pub fn validate(&self) -> Result<TournamentDetails, Vec<String>> {
        let mut problems = Problems::new();

        problems.check(
            has_min_chars(&self.name, 3),
            "Tournament name must be at least 3 characters.",
        );
        problems.check(
            has_min_chars(&self.description, 10),
            "Description must be at least 10 characters.",
        );
        problems.check(is_valid_sport(self.sport_type.trim()), "Please select a sport.");

        let tournament_type = self.tournament_type.parse::<TournamentType>().ok();
        problems.check(
            tournament_type.is_some(),
            "Please select a tournament format.",
        );

        let start_date = parse_date(&self.start_date);
        let end_date = parse_date(&self.end_date);
        let deadline = parse_date(&self.registration_deadline);
        problems.check(start_date.is_some(), "Start date is required.");
        problems.check(end_date.is_some(), "End date is required.");
        problems.check(deadline.is_some(), "Registration deadline is required.");
        if let (Some(start), Some(end)) = (start_date, end_date) {
            problems.check(start <= end, "The end date cannot be before the start date.");
        }
        if let (Some(deadline), Some(start)) = (deadline, start_date) {
            problems.check(
                deadline <= start,
                "Registration must close on or before the start date.",
            );
        }

        let max_participants = self.max_participants.trim().parse::<i64>().ok();
        problems.check(
            max_participants.is_some_and(|n| (2..=1000).contains(&n)),
            "Between 2 and 1000 participants are allowed.",
        );

        let entry_fee = parse_amount(&self.entry_fee).filter(|x| *x >= 0.0);
        problems.check(entry_fee.is_some(), "Entry fee cannot be negative.");
        let prize_pool = parse_amount(&self.prize_pool).filter(|x| *x >= 0.0);
        problems.check(prize_pool.is_some(), "Prize pool cannot be negative.");

        problems.check(has_min_chars(&self.venue_name, 1), "Venue name is required.");
        problems.check(
            has_min_chars(&self.venue_address, 5),
            "Venue address must be at least 5 characters.",
        );
        problems.check(
            is_valid_location(self.province.trim(), self.district.trim()),
            "Please select a province and one of its districts.",
        );

        let location = parse_location(&self.latitude, &self.longitude);
        problems.check(
            location.is_ok(),
            "Map coordinates must be a valid latitude and longitude.",
        );

        problems.check(
            has_min_chars(&self.rules, 20),
            "Rules must be at least 20 characters.",
        );
        problems.check(
            has_min_chars(&self.requirements, 10),
            "Requirements must be at least 10 characters.",
        );
        problems.check(
            is_valid_phone(&self.contact_phone).is_ok(),
            "Phone number must be at least 10 digits.",
        );
        problems.check(
            is_valid_email(&self.contact_email).is_ok(),
            "Please enter a valid email address.",
        );

        let mut image_urls = Vec::new();
        for line in self.image_urls.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match Url::parse(line) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    image_urls.push(url.to_string())
                }
                _ => problems.push(format!("`{line}` is not a valid image URL.")),
            }
        }

        problems.finish()?;

        match (
            tournament_type,
            start_date,
            end_date,
            deadline,
            max_participants,
            entry_fee,
            prize_pool,
            location,
        ) {
            (
                Some(tournament_type),
                Some(start_date),
                Some(end_date),
                Some(registration_deadline),
                Some(max_participants),
                Some(entry_fee),
                Some(prize_pool),
                Ok(location),
            ) => Ok(TournamentDetails {
                name: self.name.trim().to_string(),
                description: self.description.trim().to_string(),
                sport_type: self.sport_type.trim().to_string(),
                tournament_type,
                start_date,
                end_date,
                registration_deadline,
                max_participants,
                entry_fee,
                prize_pool,
                venue_name: self.venue_name.trim().to_string(),
                venue_address: self.venue_address.trim().to_string(),
                province: self.province.trim().to_string(),
                district: self.district.trim().to_string(),
                location,
                rules: self.rules.trim().to_string(),
                requirements: self.requirements.trim().to_string(),
                contact_phone: self.contact_phone.trim().to_string(),
                contact_email: self.contact_email.trim().to_string(),
                image_urls,
                premium_listing: self.premium_listing.is_some(),
            }),
            _ => Err(Vec::new()),
        }
    }
}

/// Stores a new tournament, awaiting approval by an administrator.
#[tracing::instrument(skip(details, organizer, conn))]
pub fn insert_tournament<const TX: bool>(
    details: TournamentDetails,
    organizer: &User<TX>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Tournament> {
    let now = Utc::now().naive_utc();
    let image_urls = serde_json::to_string(&details.image_urls)
        .map_err(|e| diesel::result::Error::SerializationError(Box::new(e)))?;
    let id = format!("tournament_{}", Uuid::now_v7());

    diesel::insert_into(tournaments::table)
        .values((
            tournaments::id.eq(&id),
            tournaments::name.eq(&details.name),
            tournaments::description.eq(&details.description),
            tournaments::sport_type.eq(&details.sport_type),
            tournaments::tournament_type.eq(details.tournament_type),
            tournaments::organizer_id.eq(&organizer.id),
            tournaments::organizer_name.eq(&organizer.full_name),
            tournaments::venue_name.eq(&details.venue_name),
            tournaments::venue_address.eq(&details.venue_address),
            tournaments::province.eq(&details.province),
            tournaments::district.eq(&details.district),
            tournaments::latitude.eq(details.location.map(|(lat, _)| lat)),
            tournaments::longitude.eq(details.location.map(|(_, lng)| lng)),
            tournaments::contact_phone.eq(&details.contact_phone),
            tournaments::contact_email.eq(&details.contact_email),
            tournaments::start_date.eq(details.start_date),
            tournaments::end_date.eq(details.end_date),
            tournaments::registration_deadline.eq(details.registration_deadline),
            tournaments::max_participants.eq(details.max_participants),
            tournaments::current_participants.eq(0),
            tournaments::entry_fee.eq(details.entry_fee),
            tournaments::prize_pool.eq(details.prize_pool),
            tournaments::rules.eq(&details.rules),
            tournaments::requirements.eq(&details.requirements),
            tournaments::status.eq(TournamentStatus::PendingApproval),
            tournaments::premium_listing.eq(details.premium_listing),
            tournaments::image_urls.eq(&image_urls),
            tournaments::version.eq(0),
            tournaments::created_at.eq(now),
            tournaments::updated_at.eq(now),
        ))
        .execute(&mut *conn)?;

    tracing::info!("tournament {id} submitted by {}", organizer.id);
    Tournament::fetch(&id, conn)
}

fn tournament_form(form: &TournamentForm, errors: &[String]) -> impl Renderable {
    let form = form.clone();
    let errors = errors.to_vec();

    maud! {
        h1 { "Create a tournament" }
        p class="text-muted" {
            "New tournaments are reviewed by an administrator before they are listed."
        }
        @if !errors.is_empty() {
            ErrorList errors=(&errors);
        }
        form method="post" action="/create-tournament" class="mt-3" {
            h2 class="h5 mt-4" { "Basic information" }
            div class="mb-3" {
                label for="name" class="form-label" { "Tournament name" }
                input type="text" class="form-control" id="name" name="name"
                    minlength="3" value=(form.name) required;
            }
            div class="mb-3" {
                label for="description" class="form-label" { "Description" }
                textarea class="form-control" id="description" name="description" rows="3" required {
                    (form.description)
                }
            }
            div class="row" {
                div class="col-md-6 mb-3" {
                    label for="sport_type" class="form-label" { "Sport" }
                    select class="form-select" id="sport_type" name="sport_type" required {
                        option value="" { "Select a sport" }
                        @for sport in SPORTS_TYPES {
                            option value=(sport) selected[form.sport_type == *sport] { (sport) }
                        }
                    }
                }
                div class="col-md-6 mb-3" {
                    label for="tournament_type" class="form-label" { "Format" }
                    select class="form-select" id="tournament_type" name="tournament_type" required {
                        @for t in TournamentType::ALL {
                            option value=(t.as_str()) selected[form.tournament_type == t.as_str()] {
                                (t.label())
                            }
                        }
                    }
                }
            }

            h2 class="h5 mt-4" { "Schedule and capacity" }
            div class="row" {
                div class="col-md-4 mb-3" {
                    label for="start_date" class="form-label" { "Start date" }
                    input type="date" class="form-control" id="start_date" name="start_date"
                        value=(form.start_date) required;
                }
                div class="col-md-4 mb-3" {
                    label for="end_date" class="form-label" { "End date" }
                    input type="date" class="form-control" id="end_date" name="end_date"
                        value=(form.end_date) required;
                }
                div class="col-md-4 mb-3" {
                    label for="registration_deadline" class="form-label" { "Registration deadline" }
                    input type="date" class="form-control" id="registration_deadline"
                        name="registration_deadline" value=(form.registration_deadline) required;
                }
            }
            div class="row" {
                div class="col-md-4 mb-3" {
                    label for="max_participants" class="form-label" { "Maximum participants" }
                    input type="number" min="2" max="1000" class="form-control" id="max_participants"
                        name="max_participants" value=(form.max_participants) required;
                }
                div class="col-md-4 mb-3" {
                    label for="entry_fee" class="form-label" { "Entry fee (NPR)" }
                    input type="number" min="0" step="any" class="form-control" id="entry_fee"
                        name="entry_fee" value=(form.entry_fee);
                }
                div class="col-md-4 mb-3" {
                    label for="prize_pool" class="form-label" { "Prize pool (NPR)" }
                    input type="number" min="0" step="any" class="form-control" id="prize_pool"
                        name="prize_pool" value=(form.prize_pool);
                }
            }

            h2 class="h5 mt-4" { "Venue" }
            div class="row" {
                div class="col-md-6 mb-3" {
                    label for="venue_name" class="form-label" { "Venue name" }
                    input type="text" class="form-control" id="venue_name" name="venue_name"
                        value=(form.venue_name) required;
                }
                div class="col-md-6 mb-3" {
                    label for="venue_address" class="form-label" { "Address" }
                    input type="text" class="form-control" id="venue_address" name="venue_address"
                        value=(form.venue_address) required;
                }
            }
            div class="row" {
                div class="col-md-6 mb-3" {
                    label for="province" class="form-label" { "Province" }
                    select class="form-select" id="province" name="province" required {
                        option value="" { "Select a province" }
                        @for province in NEPAL_PROVINCES {
                            option value=(province.name) selected[form.province == province.name] {
                                (province.name)
                            }
                        }
                    }
                }
                div class="col-md-6 mb-3" {
                    label for="district" class="form-label" { "District" }
                    select class="form-select" id="district" name="district" required {
                        option value="" { "Select a district" }
                        @for province in NEPAL_PROVINCES {
                            optgroup label=(province.name) {
                                @for district in province.districts {
                                    option value=(district) selected[form.district == *district] {
                                        (district)
                                    }
                                }
                            }
                        }
                    }
                }
            }
            div class="row" {
                div class="col-md-6 mb-3" {
                    label for="latitude" class="form-label" { "Latitude (optional)" }
                    input type="text" class="form-control" id="latitude" name="latitude"
                        placeholder="27.7172" value=(form.latitude);
                }
                div class="col-md-6 mb-3" {
                    label for="longitude" class="form-label" { "Longitude (optional)" }
                    input type="text" class="form-control" id="longitude" name="longitude"
                        placeholder="85.3240" value=(form.longitude);
                }
            }

            h2 class="h5 mt-4" { "Rules and contact" }
            div class="mb-3" {
                label for="rules" class="form-label" { "Rules" }
                textarea class="form-control" id="rules" name="rules" rows="4" required {
                    (form.rules)
                }
            }
            div class="mb-3" {
                label for="requirements" class="form-label" { "Requirements" }
                textarea class="form-control" id="requirements" name="requirements" rows="2" required {
                    (form.requirements)
                }
            }
            div class="row" {
                div class="col-md-6 mb-3" {
                    label for="contact_phone" class="form-label" { "Contact phone" }
                    input type="tel" class="form-control" id="contact_phone" name="contact_phone"
                        value=(form.contact_phone) required;
                }
                div class="col-md-6 mb-3" {
                    label for="contact_email" class="form-label" { "Contact email" }
                    input type="email" class="form-control" id="contact_email" name="contact_email"
                        value=(form.contact_email) required;
                }
            }
            div class="mb-3" {
                label for="image_urls" class="form-label" { "Image URLs (one per line, optional)" }
                textarea class="form-control" id="image_urls" name="image_urls" rows="2" {
                    (form.image_urls)
                }
            }
            div class="form-check mb-4" {
                input class="form-check-input" type="checkbox" id="premium_listing"
                    name="premium_listing" checked[form.premium_listing.is_some()];
                label class="form-check-label" for="premium_listing" {
                    "Premium listing (featured on the home page)"
                }
            }
            button type="submit" class="btn btn-primary" { "Submit for approval" }
        }
    }
}

pub async fn create_tournament_page(user: User<false>) -> StandardResponse {
    require_role(&user, &[Role::Organizer, Role::Admin])?;

    success(
        Page::new()
            .title("Create tournament")
            .user(user)
            .body(tournament_form(&TournamentForm::default(), &[]))
            .render(),
    )
}

#[tracing::instrument(skip(user, conn, outbox, form))]
pub async fn do_create_tournament(
    user: User<true>,
    mut conn: Conn<true>,
    outbox: Outbox,
    Form(form): Form<TournamentForm>,
) -> StandardResponse {
    require_role(&user, &[Role::Organizer, Role::Admin])?;

    let details = match form.validate() {
        Ok(details) => details,
        Err(errors) => {
            return bad_request(
                Page::new()
                    .title("Create tournament")
                    .body(tournament_form(&form, &errors))
                    .user(user)
                    .render(),
            );
        }
    };

    let tournament = insert_tournament(details, &user, &mut *conn)?;

    add_notification(
        NewNotification::new(
            NotificationKind::TournamentSubmitted,
            Audience::Role(TargetRole::Admin),
            "New Tournament Submitted",
            format!(
                "{} has been submitted for approval by {}",
                tournament.name, tournament.organizer_name
            ),
        )
        .about(&tournament.id, &tournament.name),
        &mut *conn,
        &outbox,
    )?;

    see_other_ok(Redirect::to("/organizer-dashboard"))
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;

    use super::TournamentForm;
    use crate::tournaments::TournamentType;

    pub fn form() -> TournamentForm {
        TournamentForm {
            name: "Pokhara Open Badminton".to_string(),
            description: "A two day open badminton tournament.".to_string(),
            sport_type: "Badminton".to_string(),
            tournament_type: "single_elimination".to_string(),
            start_date: "2030-05-10".to_string(),
            end_date: "2030-05-11".to_string(),
            registration_deadline: "2030-05-01".to_string(),
            max_participants: "32".to_string(),
            entry_fee: "500".to_string(),
            prize_pool: "25000".to_string(),
            venue_name: "Pokhara Covered Hall".to_string(),
            venue_address: "Lakeside, Pokhara".to_string(),
            province: "Gandaki Province".to_string(),
            district: "Kaski".to_string(),
            latitude: "28.2096".to_string(),
            longitude: "83.9856".to_string(),
            rules: "BWF rules, best of three games to 21.".to_string(),
            requirements: "Bring your own racket.".to_string(),
            contact_phone: "9856012345".to_string(),
            contact_email: "hall@example.com".to_string(),
            image_urls: String::new(),
            premium_listing: None,
        }
    }

    #[test]
    fn complete_forms_are_accepted() {
        let details = form().validate().unwrap();
        assert_eq!(details.tournament_type, TournamentType::SingleElimination);
        assert_eq!(details.start_date, NaiveDate::from_ymd_opt(2030, 5, 10).unwrap());
        assert_eq!(details.max_participants, 32);
        assert_eq!(details.location, Some((28.2096, 83.9856)));
        assert!(!details.premium_listing);
    }

    #[test]
    fn dates_must_be_in_order() {
        let mut f = form();
        f.registration_deadline = "2030-05-20".to_string();
        f.end_date = "2030-05-09".to_string();
        let errors = f.validate().unwrap_err();
        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn district_must_belong_to_province() {
        let mut f = form();
        f.district = "Kathmandu".to_string();
        assert_eq!(
            f.validate().unwrap_err(),
            vec!["Please select a province and one of its districts.".to_string()]
        );
    }

    #[test]
    fn participant_limits() {
        for (n, ok) in [("1", false), ("2", true), ("1000", true), ("1001", false), ("x", false)] {
            let mut f = form();
            f.max_participants = n.to_string();
            assert_eq!(f.validate().is_ok(), ok, "max_participants = {n}");
        }
    }

    #[test]
    fn coordinates_are_optional_but_checked() {
        let mut f = form();
        f.latitude = String::new();
        f.longitude = String::new();
        assert_eq!(f.validate().unwrap().location, None);

        f.latitude = "95".to_string();
        f.longitude = "85".to_string();
        assert!(f.validate().is_err());
    }

    #[test]
    fn blank_forms_report_every_problem() {
        let errors = TournamentForm::default().validate().unwrap_err();
        assert!(errors.len() >= 15, "{errors:?}");
    }
}
