use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::Cookie;
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use chrono::{Days, NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    permission::Role,
    schema::users,
    state::{DbPool, ThreadSafeConn},
};

pub mod login;
pub mod register;

pub const LOGIN_COOKIE: &str = "khel_session";

#[derive(Debug, Queryable, Serialize, Deserialize, Clone)]
pub struct User<const TX: bool> {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

impl<const TX: bool> User<TX> {
    pub fn validate_full_name(full_name: &str) -> bool {
        full_name.trim().chars().count() >= 2
    }

    pub fn validate_password(password: &str) -> bool {
        password.len() >= 6
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn fetch(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> QueryResult<Option<User<TX>>> {
        users::table
            .filter(users::id.eq(id))
            .first::<User<TX>>(&mut *conn)
            .optional()
    }
}

#[derive(Debug)]
pub enum AuthError {
    CookieMissingOrMalformed,
    NoDatabase,
    /// The user is not logged in; `next` is where they were trying to go.
    LoginRequired { next: String },
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::CookieMissingOrMalformed => {
                (StatusCode::UNAUTHORIZED, "Cookie missing or malformed")
                    .into_response()
            }
            AuthError::NoDatabase => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
                    .into_response()
            }
            AuthError::LoginRequired { next } => {
                let next: String =
                    url::form_urlencoded::byte_serialize(next.as_bytes())
                        .collect();
                Redirect::to(&format!("/login?next={next}")).into_response()
            }
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct LoginSession {
    id: String,
    expiry: NaiveDateTime,
}

#[async_trait]
impl<const TX: bool, S> FromRequestParts<S> for User<TX>
where
    S: Send + Sync,
    DbPool: FromRef<S>,
    Key: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let login_required = || AuthError::LoginRequired { next: next.clone() };

        let jar: PrivateCookieJar<Key> =
            PrivateCookieJar::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::CookieMissingOrMalformed)?;

        let login_cookie = match jar.get(LOGIN_COOKIE) {
            Some(cookie) => cookie,
            None => return Err(login_required()),
        };

        let login: LoginSession =
            match serde_json::from_str::<LoginSession>(login_cookie.value()) {
                Ok(t) if Utc::now().naive_utc() < t.expiry => t,
                _ => return Err(login_required()),
            };

        let conn_wrapper =
            ThreadSafeConn::<TX>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::NoDatabase)?;

        let mut conn = conn_wrapper
            .inner
            .try_lock()
            .map_err(|_| AuthError::NoDatabase)?;

        let user = User::<TX>::fetch(&login.id, &mut *conn)
            .map_err(|_| AuthError::NoDatabase)?;

        match user {
            Some(user) => Ok(user),
            None => Err(login_required()),
        }
    }
}

pub fn set_login_cookie(id: String, jar: PrivateCookieJar) -> PrivateCookieJar {
    let expiry = Utc::now()
        .naive_utc()
        .checked_add_days(Days::new(7))
        .unwrap_or(NaiveDateTime::MAX);

    let session =
        serde_json::to_string(&LoginSession { id, expiry }).unwrap_or_default();

    let mut cookie = Cookie::new(LOGIN_COOKIE, session);
    cookie.set_path("/");
    cookie.set_http_only(true);
    jar.add(cookie)
}

pub fn remove_login_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(LOGIN_COOKIE).path("/"))
}
