use argon2::Argon2;
use argon2::PasswordHasher;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use axum::{extract::Form, response::Redirect};
use axum_extra::extract::PrivateCookieJar;
use chrono::Utc;
use diesel::{connection::LoadConnection, insert_into, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{User, set_login_cookie},
    permission::Role,
    schema::users,
    state::Conn,
    template::Page,
    util_resp::{FailureResponse, StandardResponse, see_other_ok, success},
    validation::{Problems, is_valid_email, is_valid_phone},
    widgets::alert::ErrorList,
};

fn register_form(errors: &[String]) -> impl Renderable {
    maud! {
        h1 {"Register"}
        @if !errors.is_empty() {
            ErrorList errors=(errors);
        }
        form method="post" class="mt-4" style="max-width: 32rem" {
            div class="mb-3" {
                label for="full_name" class="form-label" { "Full name" }
                input type="text" class="form-control" id="full_name" name="full_name" minlength="2" required;
            }
            div class="mb-3" {
                label for="email" class="form-label" { "Email" }
                input type="email" class="form-control" id="email" name="email" required;
            }
            div class="mb-3" {
                label for="phone" class="form-label" { "Phone (optional)" }
                input type="tel" class="form-control" id="phone" name="phone";
            }
            div class="mb-3" {
                label for="role" class="form-label" { "I am a" }
                select class="form-select" id="role" name="role" {
                    @for role in Role::SELF_SERVICE {
                        option value=(role.as_str()) { (role.label()) }
                    }
                }
            }
            div class="mb-3" {
                label for="password" class="form-label" { "Password" }
                input type="password" class="form-control" id="password" name="password" minlength="6" required;
            }
            div class="mb-3" {
                label for="password2" class="form-label" { "Confirm Password" }
                input type="password" class="form-control" id="password2" name="password2" minlength="6" required;
            }
            button type="submit" class="btn btn-primary" { "Register" }
        }
    }
}

pub async fn register_page(user: Option<User<false>>) -> StandardResponse {
    if let Some(user) = user {
        return see_other_ok(Redirect::to(user.role.home()));
    }

    success(
        Page::<_, String, false>::new()
            .title("Register")
            .body(register_form(&[]))
            .render(),
    )
}

#[derive(Deserialize, Debug)]
pub struct RegisterForm {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub role: String,
    pub password: String,
    pub password2: String,
}

impl RegisterForm {
    /// Checks the form, returning the role the new account should have.
    pub fn validate(&self) -> Result<Role, Vec<String>> {
        let mut problems = Problems::new();

        problems.check(
            User::<false>::validate_full_name(&self.full_name),
            "Full name must be at least 2 characters.",
        );
        problems.check(
            is_valid_email(&self.email).is_ok(),
            "Please enter a valid email address.",
        );
        if !self.phone.trim().is_empty() {
            problems.check(
                is_valid_phone(&self.phone).is_ok(),
                "Phone number must contain at least 10 digits.",
            );
        }
        problems.check(
            User::<false>::validate_password(&self.password),
            "Password must be at least 6 characters.",
        );
        problems.check(
            self.password == self.password2,
            "Passwords do not match.",
        );

        let role = match self.role.parse::<Role>() {
            Ok(role) if Role::SELF_SERVICE.contains(&role) => Some(role),
            _ => {
                problems.push("Please choose to register as a player or an organizer.");
                None
            }
        };

        problems.finish()?;
        role.ok_or_else(Vec::new)
    }
}

/// Creates an account, hashing the password with argon2. Returns the id of
/// the new user.
pub fn create_user(
    email: &str,
    full_name: &str,
    phone: Option<&str>,
    role: Role,
    password: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<String, FailureResponse> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!("failed to hash password: {e}");
            FailureResponse::ServerError(())
        })?
        .to_string();

    let id = Uuid::now_v7().to_string();
    insert_into(users::table)
        .values((
            users::id.eq(&id),
            users::email.eq(email.trim().to_lowercase()),
            users::full_name.eq(full_name.trim()),
            users::role.eq(role),
            users::phone.eq(phone.map(str::trim)),
            users::password_hash.eq(password_hash),
            users::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)?;

    tracing::info!("created {role} account {id}");
    Ok(id)
}

#[tracing::instrument(skip_all)]
pub async fn do_register(
    user: Option<User<true>>,
    mut conn: Conn<true>,
    jar: PrivateCookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<(PrivateCookieJar, Redirect), FailureResponse> {
    if let Some(user) = user {
        return Ok((jar, Redirect::to(user.role.home())));
    }

    let try_again = |errors: &[String]| {
        FailureResponse::BadRequest(
            Page::<_, String, true>::new()
                .title("Register")
                .body(register_form(errors))
                .render(),
        )
    };

    let role = form.validate().map_err(|errors| try_again(&errors))?;

    let taken = users::table
        .filter(users::email.eq(form.email.trim().to_lowercase()))
        .select(users::id)
        .first::<String>(&mut *conn)
        .optional()?
        .is_some();
    if taken {
        return Err(try_again(&["That email is already taken.".to_string()]));
    }

    let phone = Some(form.phone.as_str()).filter(|p| !p.trim().is_empty());
    let id = create_user(
        &form.email,
        &form.full_name,
        phone,
        role,
        &form.password,
        &mut *conn,
    )?;

    Ok((set_login_cookie(id, jar), Redirect::to(role.home())))
}
