use rocket::{http::Status, response::status::Custom, serde::json::Json, Catcher, Request, Route};

use crate::error::ErrorCode;
use crate::model::api::response::ErrorBody;

mod admin;
mod public;
mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(public::routes());
    routes.extend(voter::routes());
    routes
}

/// Render framework-level failures (bad bodies, failed guards, unknown
/// routes) in the same envelope as our own errors.
pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        not_found,
        unprocessable,
        internal_error
    ]
}

fn caught(code: ErrorCode, message: String) -> Custom<Json<ErrorBody>> {
    Custom(code.kind().status(), Json(ErrorBody::new(code, message)))
}

#[catch(400)]
fn bad_request(req: &Request) -> Custom<Json<ErrorBody>> {
    caught(
        ErrorCode::ValidationError,
        format!("Malformed request to {}", req.uri()),
    )
}

#[catch(401)]
fn unauthorized() -> Custom<Json<ErrorBody>> {
    caught(
        ErrorCode::Unauthorized,
        "Missing, invalid or insufficient identity token".to_string(),
    )
}

#[catch(404)]
fn not_found(req: &Request) -> Custom<Json<ErrorBody>> {
    caught(
        ErrorCode::NotFound,
        format!("No such endpoint: {} {}", req.method(), req.uri()),
    )
}

/// Bodies that parse as JSON but don't fit the expected shape.
#[catch(422)]
fn unprocessable(status: Status, _req: &Request) -> Custom<Json<ErrorBody>> {
    caught(
        ErrorCode::ValidationError,
        format!("Request body could not be understood ({})", status.code),
    )
}

#[catch(500)]
fn internal_error() -> Custom<Json<ErrorBody>> {
    caught(ErrorCode::InternalError, "Internal server error".to_string())
}
