use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{ExchangeRequest, RequestStatus, SkillRef, UserRef};
use crate::state::AppState;
use crate::validation::validate_request_message;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/accepted-users", get(accepted_users))
        .route("/:id", put(update_request_status))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateRequest {
    to: Uuid,
    skill: Uuid,
    #[validate(custom(function = "validate_request_message"))]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: String,
}

/// Exchange request with both parties and the skill summary populated.
#[derive(Debug, Serialize)]
struct RequestView {
    id: Uuid,
    from: UserRef,
    to: UserRef,
    skill: SkillRef,
    message: Option<String>,
    status: RequestStatus,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    message: Option<String>,
    status: RequestStatus,
    created_at: Option<DateTime<Utc>>,
    from_id: Uuid,
    from_name: String,
    from_email: String,
    to_id: Uuid,
    to_name: String,
    to_email: String,
    skill_id: Uuid,
    skill_title: String,
    skill_description: String,
}

impl From<RequestRow> for RequestView {
    fn from(row: RequestRow) -> Self {
        Self {
            id: row.id,
            from: UserRef {
                id: row.from_id,
                name: row.from_name,
                email: row.from_email,
            },
            to: UserRef {
                id: row.to_id,
                name: row.to_name,
                email: row.to_email,
            },
            skill: SkillRef {
                id: row.skill_id,
                title: row.skill_title,
                description: row.skill_description,
            },
            message: row.message,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestsResponse {
    sent: Vec<RequestView>,
    received: Vec<RequestView>,
}

const REQUEST_SELECT: &str = r#"
    SELECT r.id, r.message, r.status, r.created_at,
           fu.id AS from_id, fu.name AS from_name, fu.email AS from_email,
           tu.id AS to_id, tu.name AS to_name, tu.email AS to_email,
           s.id AS skill_id, s.title AS skill_title, s.description AS skill_description
    FROM exchange_requests r
    JOIN users fu ON fu.id = r.from_id
    JOIN users tu ON tu.id = r.to_id
    JOIN skills s ON s.id = r.skill_id
"#;

/// Get the user's requests, sent and received, newest first.
async fn list_requests(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<RequestsResponse>, ApiError> {
    let sent_sql = format!("{REQUEST_SELECT} WHERE r.from_id = $1 ORDER BY r.created_at DESC");
    let sent = sqlx::query_as::<_, RequestRow>(&sent_sql)
        .bind(user.id)
        .fetch_all(&state.db)
        .await?;

    let received_sql = format!("{REQUEST_SELECT} WHERE r.to_id = $1 ORDER BY r.created_at DESC");
    let received = sqlx::query_as::<_, RequestRow>(&received_sql)
        .bind(user.id)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(RequestsResponse {
        sent: sent.into_iter().map(RequestView::from).collect(),
        received: received.into_iter().map(RequestView::from).collect(),
    }))
}

/// Send an exchange request for a skill. A request for the same
/// (from, to, skill) tuple is rejected regardless of its current status.
async fn create_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateRequest>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let target_exists =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = $1")
            .bind(req.to)
            .fetch_one(&state.db)
            .await?
            > 0;
    if !target_exists {
        return Err(ApiError::NotFound("User"));
    }

    let skill_exists =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM skills WHERE id = $1")
            .bind(req.skill)
            .fetch_one(&state.db)
            .await?
            > 0;
    if !skill_exists {
        return Err(ApiError::NotFound("Skill"));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM exchange_requests WHERE from_id = $1 AND to_id = $2 AND skill_id = $3",
    )
    .bind(user.id)
    .bind(req.to)
    .bind(req.skill)
    .fetch_one(&state.db)
    .await?;

    if existing > 0 {
        return Err(ApiError::Conflict("Request already sent"));
    }

    // The unique constraint backstops the check above under concurrent sends.
    let request_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO exchange_requests (from_id, to_id, skill_id, message)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user.id)
    .bind(req.to)
    .bind(req.skill)
    .bind(req.message.as_deref().map(str::trim))
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.constraint() == Some("exchange_requests_tuple_key") {
                return ApiError::Conflict("Request already sent");
            }
        }
        ApiError::Database(e)
    })?;

    let view = populated_request(&state, request_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Accept or reject a pending request. Only the target may resolve it, and
/// resolved requests stay resolved.
async fn update_request_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(request_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<RequestView>, ApiError> {
    let request =
        sqlx::query_as::<_, ExchangeRequest>("SELECT * FROM exchange_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(ApiError::NotFound("Request"))?;

    if request.to_id != user.id {
        return Err(ApiError::NotAuthorized);
    }

    let status = req
        .status
        .parse::<RequestStatus>()
        .ok()
        .filter(|s| matches!(s, RequestStatus::Accepted | RequestStatus::Rejected))
        .ok_or_else(|| ApiError::Validation("Invalid status".to_string()))?;

    if request.status != RequestStatus::Pending {
        return Err(ApiError::Conflict("Request already resolved"));
    }

    sqlx::query("UPDATE exchange_requests SET status = $2 WHERE id = $1")
        .bind(request_id)
        .bind(status)
        .execute(&state.db)
        .await?;

    Ok(Json(populated_request(&state, request_id).await?))
}

/// Identities of counterparts across this user's accepted requests.
async fn accepted_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let users = sqlx::query_as::<_, UserRef>(
        r#"
        SELECT u.id, u.name, u.email
        FROM exchange_requests r
        JOIN users u ON u.id = CASE WHEN r.from_id = $1 THEN r.to_id ELSE r.from_id END
        WHERE (r.from_id = $1 OR r.to_id = $1) AND r.status = 'accepted'
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(serde_json::json!({ "requests": users })))
}

async fn populated_request(state: &AppState, request_id: Uuid) -> Result<RequestView, ApiError> {
    let sql = format!("{REQUEST_SELECT} WHERE r.id = $1");
    let row = sqlx::query_as::<_, RequestRow>(&sql)
        .bind(request_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Request"))?;

    Ok(row.into())
}
