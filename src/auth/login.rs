use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Form, Query},
    response::Redirect,
};
use axum_extra::extract::PrivateCookieJar;
use diesel::prelude::*;
use hypertext::prelude::*;
use serde::Deserialize;
use url::Url;

use crate::{
    auth::{User, remove_login_cookie, set_login_cookie},
    schema::users,
    state::Conn,
    template::Page,
    util_resp::{FailureResponse, StandardResponse, see_other_ok, success},
    widgets::alert::ErrorAlert,
};

#[derive(Deserialize, Default)]
pub struct NextQuery {
    next: Option<String>,
}

/// Only allows redirects back into this site.
fn safe_next(next: Option<&str>) -> String {
    let base = match Url::parse("http://localhost/") {
        Ok(base) => base,
        Err(_) => return "/".to_string(),
    };

    match next.and_then(|next| base.join(next).ok()) {
        Some(url) if url.origin() == base.origin() => match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        },
        _ => "/".to_string(),
    }
}

fn login_form(next: Option<&str>, error: Option<&str>) -> impl Renderable {
    let action = match next {
        Some(next) => format!(
            "/login?next={}",
            url::form_urlencoded::byte_serialize(next.as_bytes())
                .collect::<String>()
        ),
        None => "/login".to_string(),
    };

    maud! {
        h1 { "Log in" }
        @if let Some(error) = error {
            ErrorAlert msg=(error);
        }
        form method="post" action=(action) class="mt-4" style="max-width: 28rem" {
            div class="mb-3" {
                label for="email" class="form-label" { "Email address" }
                input type="email" class="form-control" id="email" name="email" placeholder="Enter email" required;
            }
            div class="mb-3" {
                label for="password" class="form-label" { "Password" }
                input type="password" class="form-control" id="password" name="password" placeholder="Password" required;
            }
            button type="submit" class="btn btn-primary" { "Log in" }
            p class="mt-3" {
                "No account yet? "
                a href="/register" { "Register" }
            }
        }
    }
}

pub async fn login_page(
    user: Option<User<false>>,
    Query(query): Query<NextQuery>,
) -> StandardResponse {
    if user.is_some() {
        return see_other_ok(Redirect::to(&safe_next(query.next.as_deref())));
    }

    success(
        Page::<_, String, false>::new()
            .title("Log in")
            .body(login_form(query.next.as_deref(), None))
            .render(),
    )
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[tracing::instrument(skip_all)]
pub async fn do_login(
    Query(query): Query<NextQuery>,
    mut conn: Conn<true>,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(PrivateCookieJar, Redirect), FailureResponse> {
    let email = form.email.trim().to_lowercase();

    let user = users::table
        .filter(users::email.eq(&email))
        .first::<User<true>>(&mut *conn)
        .optional()?;

    let try_again = |msg: &str| {
        FailureResponse::BadRequest(
            Page::<_, String, true>::new()
                .title("Log in")
                .body(login_form(query.next.as_deref(), Some(msg)))
                .render(),
        )
    };

    let user = match user {
        Some(user) => user,
        None => {
            tracing::debug!("login attempt for unknown email");
            return Err(try_again("Incorrect email or password."));
        }
    };

    let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|e| {
        tracing::error!("stored password hash for {} is invalid: {e}", user.id);
        FailureResponse::ServerError(())
    })?;

    if Argon2::default()
        .verify_password(form.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        // todo: rate limit failed attempts per email
        return Err(try_again("Incorrect email or password."));
    }

    tracing::info!("user {} logged in", user.id);

    let redirect_to = match query.next.as_deref() {
        Some(next) => safe_next(Some(next)),
        None => user.role.home().to_string(),
    };

    Ok((set_login_cookie(user.id, jar), Redirect::to(&redirect_to)))
}

pub async fn do_logout(jar: PrivateCookieJar) -> (PrivateCookieJar, Redirect) {
    (remove_login_cookie(jar), Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::safe_next;

    #[test]
    fn relative_paths_are_kept() {
        assert_eq!(safe_next(Some("/profile")), "/profile");
        assert_eq!(
            safe_next(Some("/tournament/abc/register?x=1")),
            "/tournament/abc/register?x=1"
        );
    }

    #[test]
    fn other_sites_are_refused() {
        assert_eq!(safe_next(Some("https://evil.example/steal")), "/");
        assert_eq!(safe_next(Some("//evil.example/steal")), "/");
        assert_eq!(safe_next(None), "/");
    }
}
