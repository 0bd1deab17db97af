use axum::response::Redirect;
use axum_extra::extract::Form;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    auth::User,
    permission::{Role, require_role},
    registrations::ExperienceLevel,
    schema::player_profiles,
    state::Conn,
    template::Page,
    tournaments::catalog::{SPORTS_TYPES, is_valid_sport},
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    validation::Problems,
    widgets::alert::ErrorList,
};

#[derive(Queryable, Selectable, Insertable, AsChangeset, Clone, Debug, PartialEq)]
#[diesel(table_name = player_profiles)]
#[diesel(primary_key(user_id))]
#[diesel(check_for_backend(Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct Profile {
    pub user_id: String,
    pub bio: String,
    /// JSON array of sport names.
    pub favorite_sports: String,
    pub skill_level: ExperienceLevel,
    pub location: String,
    pub date_of_birth: Option<NaiveDate>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub preferred_position: Option<String>,
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub twitter: Option<String>,
    pub show_stats: bool,
    pub show_achievements: bool,
    pub show_contact: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Profile {
    /// What a player who has never saved their profile starts with.
    pub fn new_for(user_id: &str, now: NaiveDateTime) -> Profile {
        Profile {
            user_id: user_id.to_string(),
            bio: String::new(),
            favorite_sports: "[]".to_string(),
            skill_level: ExperienceLevel::Beginner,
            location: String::new(),
            date_of_birth: None,
            height: None,
            weight: None,
            preferred_position: None,
            facebook: None,
            instagram: None,
            twitter: None,
            show_stats: true,
            show_achievements: true,
            show_contact: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn favorite_sports(&self) -> Vec<String> {
        serde_json::from_str(&self.favorite_sports).unwrap_or_default()
    }

    pub fn fetch(
        user_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Option<Profile>> {
        player_profiles::table
            .filter(player_profiles::user_id.eq(user_id))
            .select(Profile::as_select())
            .first(conn)
            .optional()
    }

    pub fn fetch_or_default(
        user_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Profile> {
        Ok(Profile::fetch(user_id, conn)?
            .unwrap_or_else(|| Profile::new_for(user_id, Utc::now().naive_utc())))
    }
}

/// Changes to a profile. `None` leaves the stored value alone; for the
/// optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub favorite_sports: Option<Vec<String>>,
    pub skill_level: Option<ExperienceLevel>,
    pub location: Option<String>,
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub height: Option<Option<f64>>,
    pub weight: Option<Option<f64>>,
    pub preferred_position: Option<Option<String>>,
    pub facebook: Option<Option<String>>,
    pub instagram: Option<Option<String>>,
    pub twitter: Option<Option<String>>,
    pub privacy: Option<(bool, bool, bool)>,
}

impl ProfileUpdate {
    pub fn apply(self, mut profile: Profile, now: NaiveDateTime) -> Profile {
        fn set<T>(field: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *field = value;
            }
        }

        set(&mut profile.bio, self.bio);
        if let Some(sports) = self.favorite_sports {
            profile.favorite_sports =
                serde_json::to_string(&sports).unwrap_or_else(|_| "[]".to_string());
        }
        set(&mut profile.skill_level, self.skill_level);
        set(&mut profile.location, self.location);
        set(&mut profile.date_of_birth, self.date_of_birth);
        set(&mut profile.height, self.height);
        set(&mut profile.weight, self.weight);
        set(&mut profile.preferred_position, self.preferred_position);
        set(&mut profile.facebook, self.facebook);
        set(&mut profile.instagram, self.instagram);
        set(&mut profile.twitter, self.twitter);
        if let Some((stats, achievements, contact)) = self.privacy {
            profile.show_stats = stats;
            profile.show_achievements = achievements;
            profile.show_contact = contact;
        }
        profile.updated_at = now;
        profile
    }
}

/// Writes the update on top of whatever is stored, creating the profile if
/// the player has none yet.
#[tracing::instrument(skip(update, conn))]
pub fn upsert_profile(
    user_id: &str,
    update: ProfileUpdate,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Profile> {
    let now = Utc::now().naive_utc();
    let existing = Profile::fetch(user_id, &mut *conn)?;
    let is_new = existing.is_none();
    let profile = update.apply(
        existing.unwrap_or_else(|| Profile::new_for(user_id, now)),
        now,
    );

    if is_new {
        diesel::insert_into(player_profiles::table)
            .values(&profile)
            .execute(&mut *conn)?;
    } else {
        diesel::update(player_profiles::table.find(user_id))
            .set(&profile)
            .execute(&mut *conn)?;
    }
    Ok(profile)
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProfileForm {
    bio: Option<String>,
    #[serde(default)]
    favorite_sports: Vec<String>,
    skill_level: Option<String>,
    location: Option<String>,
    date_of_birth: Option<String>,
    height: Option<String>,
    weight: Option<String>,
    preferred_position: Option<String>,
    facebook: Option<String>,
    instagram: Option<String>,
    twitter: Option<String>,
    show_stats: Option<String>,
    show_achievements: Option<String>,
    show_contact: Option<String>,
}

fn optional_text(s: Option<&String>) -> Option<Option<String>> {
    s.map(|s| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    })
}

impl ProfileForm {
    pub fn validate(&self) -> Result<ProfileUpdate, Vec<String>> {
        let mut problems = Problems::new();

        let skill_level = match self.skill_level.as_deref() {
            None => None,
            Some(level) => {
                let level = level.parse::<ExperienceLevel>().ok();
                problems.check(level.is_some(), "Please choose a skill level.");
                level
            }
        };

        for sport in &self.favorite_sports {
            problems.check(is_valid_sport(sport), format!("`{sport}` is not a sport we list."));
        }

        let date_of_birth = match self.date_of_birth.as_deref().map(str::trim) {
            None => None,
            Some("") => Some(None),
            Some(d) => {
                let d = NaiveDate::parse_from_str(d, "%Y-%m-%d").ok();
                problems.check(d.is_some(), "Date of birth must be a date.");
                Some(d)
            }
        };

        let mut measurement = |value: &Option<String>, msg: &str| match value.as_deref().map(str::trim) {
            None => None,
            Some("") => Some(None),
            Some(v) => {
                let v = v.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0);
                problems.check(v.is_some(), msg);
                Some(v)
            }
        };
        let height = measurement(&self.height, "Height must be a positive number of centimetres.");
        let weight = measurement(&self.weight, "Weight must be a positive number of kilograms.");

        problems.finish()?;

        Ok(ProfileUpdate {
            bio: self.bio.as_ref().map(|s| s.trim().to_string()),
            favorite_sports: Some(self.favorite_sports.clone()),
            skill_level,
            location: self.location.as_ref().map(|s| s.trim().to_string()),
            date_of_birth,
            height,
            weight,
            preferred_position: optional_text(self.preferred_position.as_ref()),
            facebook: optional_text(self.facebook.as_ref()),
            instagram: optional_text(self.instagram.as_ref()),
            twitter: optional_text(self.twitter.as_ref()),
            privacy: Some((
                self.show_stats.is_some(),
                self.show_achievements.is_some(),
                self.show_contact.is_some(),
            )),
        })
    }
}

fn profile_form(profile: &Profile, errors: &[String]) -> impl Renderable {
    let p = profile.clone();
    let sports = p.favorite_sports();
    let dob = p
        .date_of_birth
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let height = p.height.map(|h| h.to_string()).unwrap_or_default();
    let weight = p.weight.map(|w| w.to_string()).unwrap_or_default();
    let errors = errors.to_vec();

    maud! {
        h1 { "Your profile" }
        @if !errors.is_empty() {
            ErrorList errors=(&errors);
        }
        form method="post" action="/profile" style="max-width: 48rem" {
            div class="mb-3" {
                label for="bio" class="form-label" { "About you" }
                textarea class="form-control" id="bio" name="bio" rows="3" { (p.bio) }
            }
            div class="row" {
                div class="col-md-6 mb-3" {
                    label for="skill_level" class="form-label" { "Skill level" }
                    select class="form-select" id="skill_level" name="skill_level" {
                        @for level in ExperienceLevel::ALL {
                            option value=(level.as_str()) selected[p.skill_level == *level] {
                                (level.label())
                            }
                        }
                    }
                }
                div class="col-md-6 mb-3" {
                    label for="location" class="form-label" { "Location" }
                    input type="text" class="form-control" id="location" name="location" value=(p.location);
                }
            }
            div class="mb-3" {
                label for="favorite_sports" class="form-label" { "Favourite sports" }
                select class="form-select" id="favorite_sports" name="favorite_sports" multiple size="6" {
                    @for sport in SPORTS_TYPES {
                        option value=(sport) selected[sports.iter().any(|s| s.as_str() == *sport)] { (sport) }
                    }
                }
            }
            div class="row" {
                div class="col-md-4 mb-3" {
                    label for="date_of_birth" class="form-label" { "Date of birth" }
                    input type="date" class="form-control" id="date_of_birth" name="date_of_birth" value=(dob);
                }
                div class="col-md-4 mb-3" {
                    label for="height" class="form-label" { "Height (cm)" }
                    input type="number" step="any" class="form-control" id="height" name="height" value=(height);
                }
                div class="col-md-4 mb-3" {
                    label for="weight" class="form-label" { "Weight (kg)" }
                    input type="number" step="any" class="form-control" id="weight" name="weight" value=(weight);
                }
            }
            div class="mb-3" {
                label for="preferred_position" class="form-label" { "Preferred position" }
                input type="text" class="form-control" id="preferred_position" name="preferred_position"
                    value=(p.preferred_position.clone().unwrap_or_default());
            }
            div class="row" {
                div class="col-md-4 mb-3" {
                    label for="facebook" class="form-label" { "Facebook" }
                    input type="url" class="form-control" id="facebook" name="facebook"
                        value=(p.facebook.clone().unwrap_or_default());
                }
                div class="col-md-4 mb-3" {
                    label for="instagram" class="form-label" { "Instagram" }
                    input type="url" class="form-control" id="instagram" name="instagram"
                        value=(p.instagram.clone().unwrap_or_default());
                }
                div class="col-md-4 mb-3" {
                    label for="twitter" class="form-label" { "Twitter" }
                    input type="url" class="form-control" id="twitter" name="twitter"
                        value=(p.twitter.clone().unwrap_or_default());
                }
            }
            h2 class="h6" { "Privacy" }
            div class="form-check" {
                input class="form-check-input" type="checkbox" id="show_stats" name="show_stats" checked[p.show_stats];
                label class="form-check-label" for="show_stats" { "Show my statistics" }
            }
            div class="form-check" {
                input class="form-check-input" type="checkbox" id="show_achievements" name="show_achievements"
                    checked[p.show_achievements];
                label class="form-check-label" for="show_achievements" { "Show my achievements" }
            }
            div class="form-check mb-3" {
                input class="form-check-input" type="checkbox" id="show_contact" name="show_contact"
                    checked[p.show_contact];
                label class="form-check-label" for="show_contact" { "Show my contact details" }
            }
            button type="submit" class="btn btn-primary" { "Save profile" }
        }
    }
}

pub async fn profile_page(user: User<false>, mut conn: Conn<false>) -> StandardResponse {
    require_role(&user, &[Role::Player])?;
    let profile = Profile::fetch_or_default(&user.id, &mut *conn)?;

    success(
        Page::new()
            .title("Profile")
            .body(profile_form(&profile, &[]))
            .user(user)
            .render(),
    )
}

#[tracing::instrument(skip(user, conn, form))]
pub async fn do_update_profile(
    user: User<true>,
    mut conn: Conn<true>,
    Form(form): Form<ProfileForm>,
) -> StandardResponse {
    require_role(&user, &[Role::Player])?;

    let update = match form.validate() {
        Ok(update) => update,
        Err(errors) => {
            let profile = Profile::fetch_or_default(&user.id, &mut *conn)?;
            return bad_request(
                Page::new()
                    .title("Profile")
                    .body(profile_form(&profile, &errors))
                    .user(user)
                    .render(),
            );
        }
    };

    upsert_profile(&user.id, update, &mut *conn)?;
    see_other_ok(Redirect::to("/player-dashboard"))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn new_profiles_share_stats_but_not_contact_details() {
        let p = Profile::new_for("ram", Utc::now().naive_utc());
        assert!(p.show_stats && p.show_achievements);
        assert!(!p.show_contact);
        assert_eq!(p.skill_level, ExperienceLevel::Beginner);
        assert!(p.favorite_sports().is_empty());
    }

    #[test]
    fn omitted_fields_keep_their_values() {
        let now = Utc::now().naive_utc();
        let mut existing = Profile::new_for("ram", now);
        existing.bio = "Futsal every Saturday".to_string();
        existing.height = Some(172.0);
        existing.facebook = Some("https://facebook.com/ram".to_string());

        let updated = ProfileUpdate {
            location: Some("Lalitpur".to_string()),
            facebook: Some(None),
            ..Default::default()
        }
        .apply(existing, now);

        assert_eq!(updated.bio, "Futsal every Saturday");
        assert_eq!(updated.height, Some(172.0));
        assert_eq!(updated.location, "Lalitpur");
        assert_eq!(updated.facebook, None);
        assert!(updated.show_stats);
    }

    #[test]
    fn forms_become_updates() {
        let form = ProfileForm {
            bio: Some(" Keeper ".to_string()),
            favorite_sports: vec!["Futsal".to_string(), "Cricket".to_string()],
            skill_level: Some("advanced".to_string()),
            height: Some(String::new()),
            show_stats: Some("on".to_string()),
            ..Default::default()
        };
        let update = form.validate().unwrap();
        assert_eq!(update.bio.as_deref(), Some("Keeper"));
        assert_eq!(update.skill_level, Some(ExperienceLevel::Advanced));
        assert_eq!(update.height, Some(None));
        assert_eq!(update.weight, None);
        assert_eq!(update.privacy, Some((true, false, false)));

        let bad = ProfileForm {
            favorite_sports: vec!["Quidditch".to_string()],
            weight: Some("-3".to_string()),
            ..Default::default()
        };
        assert_eq!(bad.validate().unwrap_err().len(), 2);
    }
}
