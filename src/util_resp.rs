use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use hypertext::Rendered;

pub fn see_other_ok(r: Redirect) -> StandardResponse {
    Ok(SuccessResponse::SeeOther(Box::new(r)))
}

pub fn err_not_found() -> StandardResponse {
    Err(FailureResponse::NotFound(()))
}

pub fn bad_request(html: Rendered<String>) -> StandardResponse {
    Err(FailureResponse::BadRequest(html))
}

pub fn conflict(html: Rendered<String>) -> StandardResponse {
    Err(FailureResponse::Conflict(html))
}

pub fn success(html: Rendered<String>) -> StandardResponse {
    Ok(SuccessResponse::Success(html))
}

pub fn unauthorized() -> StandardResponse {
    Err(FailureResponse::Unauthorized(()))
}

pub type StandardResponse = Result<SuccessResponse, FailureResponse>;

pub enum SuccessResponse {
    Success(Rendered<String>),
    SeeOther(Box<Redirect>),
}

impl IntoResponse for SuccessResponse {
    fn into_response(self) -> Response {
        match self {
            SuccessResponse::Success(html) => {
                Html(html.into_inner()).into_response()
            }
            SuccessResponse::SeeOther(redirect) => redirect.into_response(),
        }
    }
}

#[derive(Debug)]
pub enum FailureResponse {
    BadRequest(Rendered<String>),
    NotFound(()),
    Unauthorized(()),
    Conflict(Rendered<String>),
    ServerError(()),
}

impl IntoResponse for FailureResponse {
    fn into_response(self) -> Response {
        match self {
            FailureResponse::BadRequest(html) => {
                (StatusCode::BAD_REQUEST, Html(html.into_inner()))
                    .into_response()
            }
            FailureResponse::NotFound(()) => {
                (StatusCode::NOT_FOUND, "Not found").into_response()
            }
            FailureResponse::Unauthorized(()) => {
                (StatusCode::FORBIDDEN, "Forbidden").into_response()
            }
            FailureResponse::Conflict(html) => {
                (StatusCode::CONFLICT, Html(html.into_inner())).into_response()
            }
            FailureResponse::ServerError(()) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    .into_response()
            }
        }
    }
}

impl From<diesel::result::Error> for FailureResponse {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => FailureResponse::NotFound(()),
            e => {
                tracing::error!("database error: {e}");
                FailureResponse::ServerError(())
            }
        }
    }
}

impl From<serde_json::Error> for FailureResponse {
    fn from(e: serde_json::Error) -> Self {
        tracing::error!("failed to (de)serialize stored json: {e}");
        FailureResponse::ServerError(())
    }
}
