use axum::{
    extract::{Path, Query, State},
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
use crate::models::{Skill, SkillCategory, SkillLevel, UserRef};
use crate::state::AppState;
use crate::validation::{validate_skill_description, validate_skill_title};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_skills).post(create_skill))
        .route("/my-skills", get(my_skills))
        .route("/:id", put(update_skill).delete(delete_skill))
}

#[derive(Debug, Deserialize)]
struct ListSkillsParams {
    search: Option<String>,
    category: Option<String>,
    level: Option<String>,
    sort: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct CreateSkillRequest {
    #[validate(custom(function = "validate_skill_title"))]
    title: String,
    #[validate(custom(function = "validate_skill_description"))]
    description: String,
    category: String,
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateSkillRequest {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    level: Option<String>,
}

/// Skill with its owner populated via an explicit join.
#[derive(Debug, Serialize)]
struct SkillView {
    id: Uuid,
    title: String,
    description: String,
    category: SkillCategory,
    level: SkillLevel,
    rating: Option<f64>,
    is_active: bool,
    created_at: Option<DateTime<Utc>>,
    user: UserRef,
}

#[derive(Debug, FromRow)]
struct SkillRow {
    id: Uuid,
    title: String,
    description: String,
    category: SkillCategory,
    level: SkillLevel,
    rating: Option<f64>,
    is_active: bool,
    created_at: Option<DateTime<Utc>>,
    owner_id: Uuid,
    owner_name: String,
    owner_email: String,
}

impl From<SkillRow> for SkillView {
    fn from(row: SkillRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            level: row.level,
            rating: row.rating,
            is_active: row.is_active,
            created_at: row.created_at,
            user: UserRef {
                id: row.owner_id,
                name: row.owner_name,
                email: row.owner_email,
            },
        }
    }
}

const SKILL_SELECT: &str = r#"
    SELECT s.id, s.title, s.description, s.category, s.level, s.rating,
           s.is_active, s.created_at,
           u.id AS owner_id, u.name AS owner_name, u.email AS owner_email
    FROM skills s
    JOIN users u ON u.id = s.user_id
"#;

fn parse_category(value: &str) -> Result<SkillCategory, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid category '{value}'")))
}

fn parse_level(value: &str) -> Result<SkillLevel, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid level '{value}'")))
}

/// Browse the catalog: active skills only, optional search/category/level
/// filters and sort order. Public, no auth required.
async fn list_skills(
    State(state): State<AppState>,
    Query(params): Query<ListSkillsParams>,
) -> Result<Json<Vec<SkillView>>, ApiError> {
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));
    let category = params
        .category
        .as_deref()
        .map(parse_category)
        .transpose()?;
    let level = params.level.as_deref().map(parse_level).transpose()?;

    let order_by = match params.sort.as_deref() {
        Some("alphabetical") => "s.title ASC",
        Some("rating") => "s.rating DESC NULLS LAST, s.created_at DESC",
        _ => "s.created_at DESC",
    };

    let sql = format!(
        r#"{SKILL_SELECT}
        WHERE s.is_active = TRUE
          AND ($1::text IS NULL OR s.title ILIKE $1 OR s.description ILIKE $1)
          AND ($2::skill_category IS NULL OR s.category = $2)
          AND ($3::skill_level IS NULL OR s.level = $3)
        ORDER BY {order_by}
        "#
    );

    let rows = sqlx::query_as::<_, SkillRow>(&sql)
        .bind(search)
        .bind(category)
        .bind(level)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(rows.into_iter().map(SkillView::from).collect()))
}

/// Get the authenticated user's own skills, active or not, newest first.
async fn my_skills(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Skill>>, ApiError> {
    let skills = sqlx::query_as::<_, Skill>(
        "SELECT * FROM skills WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(skills))
}

async fn create_skill(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateSkillRequest>,
) -> Result<(StatusCode, Json<SkillView>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let category = parse_category(&req.category)?;
    let level = req
        .level
        .as_deref()
        .map(parse_level)
        .transpose()?
        .unwrap_or_default();

    let skill = sqlx::query_as::<_, Skill>(
        r#"
        INSERT INTO skills (title, description, category, level, user_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(req.title.trim())
    .bind(req.description.trim())
    .bind(category)
    .bind(level)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    let view = populated_skill(&state, skill.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Partial update; absent fields keep their previous values. Owner only.
async fn update_skill(
    State(state): State<AppState>,
    user: AuthUser,
    Path(skill_id): Path<Uuid>,
    Json(req): Json<UpdateSkillRequest>,
) -> Result<Json<SkillView>, ApiError> {
    if let Some(title) = &req.title {
        validate_skill_title(title).map_err(|_| {
            ApiError::Validation("Title must be at least 2 characters".to_string())
        })?;
    }
    if let Some(description) = &req.description {
        validate_skill_description(description).map_err(|_| {
            ApiError::Validation("Description must be at least 10 characters".to_string())
        })?;
    }
    let category = req.category.as_deref().map(parse_category).transpose()?;
    let level = req.level.as_deref().map(parse_level).transpose()?;

    let skill = sqlx::query_as::<_, Skill>("SELECT * FROM skills WHERE id = $1")
        .bind(skill_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Skill"))?;

    if skill.user_id != user.id {
        return Err(ApiError::NotAuthorized);
    }

    sqlx::query(
        r#"
        UPDATE skills
        SET title = COALESCE($2, title),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            level = COALESCE($5, level)
        WHERE id = $1
        "#,
    )
    .bind(skill_id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.description.as_deref().map(str::trim))
    .bind(category)
    .bind(level)
    .execute(&state.db)
    .await?;

    Ok(Json(populated_skill(&state, skill_id).await?))
}

/// Hard-delete a skill. Owner only.
async fn delete_skill(
    State(state): State<AppState>,
    user: AuthUser,
    Path(skill_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let skill = sqlx::query_as::<_, Skill>("SELECT * FROM skills WHERE id = $1")
        .bind(skill_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Skill"))?;

    if skill.user_id != user.id {
        return Err(ApiError::NotAuthorized);
    }

    sqlx::query("DELETE FROM skills WHERE id = $1")
        .bind(skill_id)
        .execute(&state.db)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Skill deleted" })))
}

async fn populated_skill(state: &AppState, skill_id: Uuid) -> Result<SkillView, ApiError> {
    let sql = format!("{SKILL_SELECT} WHERE s.id = $1");
    let row = sqlx::query_as::<_, SkillRow>(&sql)
        .bind(skill_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Skill"))?;

    Ok(row.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    async fn seed_user(pool: &PgPool, name: &str, email: &str) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, 'x') RETURNING id",
        )
        .bind(name)
        .bind(email)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    fn actor(id: Uuid) -> AuthUser {
        AuthUser {
            id,
            name: "test".to_string(),
        }
    }

    #[sqlx::test]
    async fn created_skill_round_trips_through_my_skills(pool: PgPool) {
        let state = AppState::new(pool.clone());
        let alice = seed_user(&pool, "Alice", "alice@example.com").await;

        let (code, Json(view)) = create_skill(
            State(state.clone()),
            actor(alice),
            Json(CreateSkillRequest {
                title: "Figma prototyping".to_string(),
                description: "Wireframes to clickable prototypes".to_string(),
                category: "UI/UX Design".to_string(),
                level: Some("Advanced".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(view.user.id, alice);

        let Json(skills) = my_skills(State(state), actor(alice)).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].title, "Figma prototyping");
        assert_eq!(skills[0].description, "Wireframes to clickable prototypes");
        assert_eq!(skills[0].category, SkillCategory::UiUxDesign);
        assert_eq!(skills[0].level, SkillLevel::Advanced);
        assert!(skills[0].is_active);
    }

    #[sqlx::test]
    async fn only_the_owner_updates_or_deletes(pool: PgPool) {
        let state = AppState::new(pool.clone());
        let alice = seed_user(&pool, "Alice", "alice@example.com").await;
        let bob = seed_user(&pool, "Bob", "bob@example.com").await;

        let (_, Json(view)) = create_skill(
            State(state.clone()),
            actor(alice),
            Json(CreateSkillRequest {
                title: "Rust mentoring".to_string(),
                description: "Systems programming from the ground up".to_string(),
                category: "Backend".to_string(),
                level: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(view.level, SkillLevel::Beginner);

        let err = update_skill(
            State(state.clone()),
            actor(bob),
            Path(view.id),
            Json(UpdateSkillRequest {
                title: Some("Hijacked".to_string()),
                description: None,
                category: None,
                level: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized));

        let err = delete_skill(State(state.clone()), actor(bob), Path(view.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized));

        // partial patch keeps absent fields
        let Json(updated) = update_skill(
            State(state),
            actor(alice),
            Path(view.id),
            Json(UpdateSkillRequest {
                title: Some("Rust and Tokio mentoring".to_string()),
                description: None,
                category: None,
                level: Some("Intermediate".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "Rust and Tokio mentoring");
        assert_eq!(updated.description, "Systems programming from the ground up");
        assert_eq!(updated.category, SkillCategory::Backend);
        assert_eq!(updated.level, SkillLevel::Intermediate);
    }
}
