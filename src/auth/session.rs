use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::database::get_membership;
use crate::error::AppError;
use crate::models::SchoolMembership;

pub const USER_ID_COOKIE: &str = "user_id";
pub const USERNAME_COOKIE: &str = "username";

/// The authenticated caller, read from the private session cookie.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionUser {
    type Error = AppError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("session_user_guard");
        let _guard = auth_span.enter();

        let cookies = request.cookies();

        let user_id = cookies
            .get_private(USER_ID_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|id| !id.trim().is_empty());

        match user_id {
            Some(id) => {
                let username = cookies
                    .get_private(USERNAME_COOKIE)
                    .map(|c| c.value().to_string())
                    .unwrap_or_else(|| id.clone());

                tracing::debug!(user_id = %id, "User authenticated via session cookie");
                Outcome::Success(SessionUser { id, username })
            }
            None => {
                let error = AppError::Authentication("Missing session cookie".to_string());
                error.log_and_record("Session user guard");
                Outcome::Error((Status::Unauthorized, error))
            }
        }
    }
}

/// Resolves the caller's membership in `school_id`, refusing non-members.
pub async fn require_member(
    pool: &SqlitePool,
    user: &SessionUser,
    school_id: &str,
) -> Result<SchoolMembership, AppError> {
    match get_membership(pool, &user.id, school_id).await? {
        Some(membership) => Ok(membership),
        None => {
            tracing::warn!(user_id = %user.id, school_id = %school_id, "Non-member access attempt");
            Err(AppError::Authorization(
                "You are not a member of this school".to_string(),
            ))
        }
    }
}

fn error_body(status: Status, message: &str) -> Custom<Json<Value>> {
    Custom(status, Json(json!({ "error": message })))
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(Status::BadRequest, "Bad request")
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    tracing::warn!("Unauthorized access attempt");
    error_body(Status::Unauthorized, "Authentication required")
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(
        Status::Forbidden,
        "You don't have permission to perform this action",
    )
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(Status::NotFound, "Resource not found")
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(Status::UnprocessableEntity, "Malformed request body")
}

#[catch(500)]
pub fn internal_error_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(Status::InternalServerError, "Internal server error")
}
