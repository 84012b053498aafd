use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{Message, UserRef};
use crate::state::AppState;
use crate::validation::{normalize_email, validate_message_content};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/:user_id/messages", get(get_thread))
        .route("/send", post(send_message))
        .route("/inbox", get(inbox))
        .route("/sent", get(sent))
        .route("/received", get(received))
        .route("/search", get(search_messages))
        .route("/count", get(message_count))
        .route("/:message_id", delete(delete_message))
}

#[derive(Debug, Deserialize, Validate)]
struct SendMessageRequest {
    #[serde(alias = "receiverEmail")]
    receiver_email: String,
    #[validate(custom(function = "validate_message_content"))]
    content: String,
}

#[derive(Debug, Deserialize)]
struct PaginationParams {
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    #[serde(alias = "userId")]
    user_id: Option<Uuid>,
}

/// Message with both ends populated via an explicit join.
#[derive(Debug, Serialize)]
struct MessageView {
    id: Uuid,
    content: String,
    created_at: Option<DateTime<Utc>>,
    sender: UserRef,
    receiver: UserRef,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    content: String,
    created_at: Option<DateTime<Utc>>,
    sender_id: Uuid,
    sender_name: String,
    sender_email: String,
    receiver_id: Uuid,
    receiver_name: String,
    receiver_email: String,
}

impl From<MessageRow> for MessageView {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            created_at: row.created_at,
            sender: UserRef {
                id: row.sender_id,
                name: row.sender_name,
                email: row.sender_email,
            },
            receiver: UserRef {
                id: row.receiver_id,
                name: row.receiver_name,
                email: row.receiver_email,
            },
        }
    }
}

/// One entry per distinct counterpart, derived fresh from the message log.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationSummary {
    participant: UserRef,
    last_message: Message,
    message_count: i64,
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    counterpart_id: Uuid,
    counterpart_name: String,
    counterpart_email: String,
    message_id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    message_created_at: Option<DateTime<Utc>>,
    message_count: i64,
}

#[derive(Debug, Serialize)]
struct SendMessageResponse {
    success: bool,
    message: MessageView,
}

#[derive(Debug, Serialize, FromRow)]
struct MessageCounts {
    total: i64,
    sent: i64,
    received: i64,
}

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.content, m.created_at,
           su.id AS sender_id, su.name AS sender_name, su.email AS sender_email,
           ru.id AS receiver_id, ru.name AS receiver_name, ru.email AS receiver_email
    FROM messages m
    JOIN users su ON su.id = m.sender_id
    JOIN users ru ON ru.id = m.receiver_id
"#;

/// Compute the SQL window for 1-based page/limit parameters.
fn page_window(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(default_limit).clamp(1, 100);
    (limit, (page - 1) * limit)
}

/// Derive the conversation index: group the user's messages by counterpart,
/// keep the newest message and the count per group, order groups by that
/// newest message. Ties on timestamp break on message id, newest id first.
async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let rows = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT c.counterpart_id, u.name AS counterpart_name, u.email AS counterpart_email,
               c.message_id, c.sender_id, c.receiver_id, c.content,
               c.message_created_at, c.message_count
        FROM (
            SELECT DISTINCT ON (CASE WHEN m.sender_id = $1 THEN m.receiver_id ELSE m.sender_id END)
                CASE WHEN m.sender_id = $1 THEN m.receiver_id ELSE m.sender_id END AS counterpart_id,
                m.id AS message_id, m.sender_id, m.receiver_id, m.content,
                m.created_at AS message_created_at,
                COUNT(*) OVER (
                    PARTITION BY CASE WHEN m.sender_id = $1 THEN m.receiver_id ELSE m.sender_id END
                ) AS message_count
            FROM messages m
            WHERE m.sender_id = $1 OR m.receiver_id = $1
            ORDER BY CASE WHEN m.sender_id = $1 THEN m.receiver_id ELSE m.sender_id END,
                     m.created_at DESC, m.id DESC
        ) c
        JOIN users u ON u.id = c.counterpart_id
        ORDER BY c.message_created_at DESC, c.message_id DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    let conversations = rows
        .into_iter()
        .map(|row| ConversationSummary {
            participant: UserRef {
                id: row.counterpart_id,
                name: row.counterpart_name,
                email: row.counterpart_email,
            },
            last_message: Message {
                id: row.message_id,
                sender_id: row.sender_id,
                receiver_id: row.receiver_id,
                content: row.content,
                created_at: row.message_created_at,
            },
            message_count: row.message_count,
        })
        .collect();

    Ok(Json(conversations))
}

/// Page through one pairwise thread. Page 1 holds the newest messages; each
/// page is returned in chronological order.
async fn get_thread(
    State(state): State<AppState>,
    user: AuthUser,
    Path(other_user_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let (limit, offset) = page_window(params.page, params.limit, 50);

    let sql = format!(
        r#"{MESSAGE_SELECT}
        WHERE (m.sender_id = $1 AND m.receiver_id = $2)
           OR (m.sender_id = $2 AND m.receiver_id = $1)
        ORDER BY m.created_at DESC, m.id DESC
        LIMIT $3 OFFSET $4
        "#
    );

    let rows = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(user.id)
        .bind(other_user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;

    let mut messages: Vec<MessageView> = rows.into_iter().map(MessageView::from).collect();
    messages.reverse();

    Ok(Json(messages))
}

/// Send a message to a user addressed by email.
async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let email = normalize_email(&req.receiver_email);
    let receiver_id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Receiver"))?;

    if receiver_id == user.id {
        return Err(ApiError::Validation(
            "Cannot send message to yourself".to_string(),
        ));
    }

    let message_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO messages (sender_id, receiver_id, content)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(user.id)
    .bind(receiver_id)
    .bind(req.content.trim())
    .fetch_one(&state.db)
    .await?;

    let message = populated_message(&state, message_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message,
        }),
    ))
}

/// All of the user's messages, newest first, paginated.
async fn inbox(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    list_messages(
        &state,
        "m.sender_id = $1 OR m.receiver_id = $1",
        user.id,
        params,
    )
    .await
}

/// Messages the user sent, newest first, paginated.
async fn sent(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    list_messages(&state, "m.sender_id = $1", user.id, params).await
}

/// Messages the user received, newest first, paginated.
async fn received(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    list_messages(&state, "m.receiver_id = $1", user.id, params).await
}

async fn list_messages(
    state: &AppState,
    filter: &str,
    user_id: Uuid,
    params: PaginationParams,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let (limit, offset) = page_window(params.page, params.limit, 20);

    let sql = format!(
        "{MESSAGE_SELECT} WHERE {filter} ORDER BY m.created_at DESC, m.id DESC LIMIT $2 OFFSET $3"
    );

    let rows = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(rows.into_iter().map(MessageView::from).collect()))
}

/// Delete a message. Only the original sender may delete it; the conversation
/// index needs no touch-up since it is derived fresh on every read.
async fn delete_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
        .bind(message_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Message"))?;

    if message.sender_id != user.id {
        return Err(ApiError::NotAuthorized);
    }

    sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(message_id)
        .execute(&state.db)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Message deleted" })))
}

/// Case-insensitive substring search over the user's messages, optionally
/// narrowed to one thread. At most the 50 newest matches.
async fn search_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::Validation("Search query is required".to_string()))?;

    let sql = format!(
        r#"{MESSAGE_SELECT}
        WHERE m.content ILIKE $2
          AND (
            ($3::uuid IS NULL AND (m.sender_id = $1 OR m.receiver_id = $1))
            OR ((m.sender_id = $1 AND m.receiver_id = $3)
             OR (m.sender_id = $3 AND m.receiver_id = $1))
          )
        ORDER BY m.created_at DESC, m.id DESC
        LIMIT 50
        "#
    );

    let rows = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(user.id)
        .bind(format!("%{query}%"))
        .bind(params.user_id)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(rows.into_iter().map(MessageView::from).collect()))
}

/// Total/sent/received message counts for the user.
async fn message_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MessageCounts>, ApiError> {
    let counts = sqlx::query_as::<_, MessageCounts>(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE sender_id = $1) AS sent,
               COUNT(*) FILTER (WHERE receiver_id = $1) AS received
        FROM messages
        WHERE sender_id = $1 OR receiver_id = $1
        "#,
    )
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(counts))
}

async fn populated_message(state: &AppState, message_id: Uuid) -> Result<MessageView, ApiError> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = $1");
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(message_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Message"))?;

    Ok(row.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::PgPool;

    #[test]
    fn page_window_defaults_to_first_page() {
        assert_eq!(page_window(None, None, 50), (50, 0));
        assert_eq!(page_window(None, None, 20), (20, 0));
    }

    #[test]
    fn page_window_offsets_by_full_pages() {
        assert_eq!(page_window(Some(3), Some(10), 50), (10, 20));
        assert_eq!(page_window(Some(2), None, 50), (50, 50));
    }

    #[test]
    fn page_window_clamps_out_of_range_inputs() {
        assert_eq!(page_window(Some(0), Some(0), 50), (1, 0));
        assert_eq!(page_window(Some(-5), Some(1000), 50), (100, 0));
    }

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

    async fn seed_message(
        pool: &PgPool,
        sender: Uuid,
        receiver: Uuid,
        content: &str,
        at: DateTime<Utc>,
    ) -> Uuid {
        sqlx::query_scalar(
            r#"
            INSERT INTO messages (sender_id, receiver_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(sender)
        .bind(receiver)
        .bind(content)
        .bind(at)
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
    async fn conversations_collapse_to_one_summary_per_counterpart(pool: PgPool) {
        let state = AppState::new(pool.clone());
        let alice = seed_user(&pool, "Alice", "alice@example.com").await;
        let bob = seed_user(&pool, "Bob", "bob@example.com").await;
        let carol = seed_user(&pool, "Carol", "carol@example.com").await;

        let base = Utc::now();
        seed_message(&pool, alice, carol, "hi carol", base).await;
        seed_message(&pool, alice, bob, "one", base + Duration::seconds(1)).await;
        seed_message(&pool, alice, bob, "two", base + Duration::seconds(2)).await;
        seed_message(&pool, alice, bob, "three", base + Duration::seconds(3)).await;
        seed_message(&pool, bob, alice, "reply one", base + Duration::seconds(4)).await;
        seed_message(&pool, bob, alice, "reply two", base + Duration::seconds(5)).await;

        let Json(conversations) = list_conversations(State(state), actor(alice)).await.unwrap();

        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].participant.id, bob);
        assert_eq!(conversations[0].participant.name, "Bob");
        assert_eq!(conversations[0].message_count, 5);
        assert_eq!(conversations[0].last_message.content, "reply two");
        assert_eq!(conversations[1].participant.id, carol);
        assert_eq!(conversations[1].message_count, 1);
    }

    #[sqlx::test]
    async fn thread_pages_are_newest_first_but_chronological_inside(pool: PgPool) {
        let state = AppState::new(pool.clone());
        let alice = seed_user(&pool, "Alice", "alice@example.com").await;
        let bob = seed_user(&pool, "Bob", "bob@example.com").await;

        let base = Utc::now();
        for (i, content) in ["m1", "m2", "m3", "m4", "m5"].iter().enumerate() {
            seed_message(&pool, alice, bob, content, base + Duration::seconds(i as i64)).await;
        }

        let Json(page_one) = get_thread(
            State(state.clone()),
            actor(alice),
            Path(bob),
            Query(PaginationParams {
                page: Some(1),
                limit: Some(2),
            }),
        )
        .await
        .unwrap();
        let contents: Vec<&str> = page_one.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m4", "m5"]);

        let Json(page_two) = get_thread(
            State(state.clone()),
            actor(alice),
            Path(bob),
            Query(PaginationParams {
                page: Some(2),
                limit: Some(2),
            }),
        )
        .await
        .unwrap();
        let contents: Vec<&str> = page_two.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m2", "m3"]);

        let Json(page_three) = get_thread(
            State(state),
            actor(bob),
            Path(alice),
            Query(PaginationParams {
                page: Some(3),
                limit: Some(2),
            }),
        )
        .await
        .unwrap();
        assert_eq!(page_three.len(), 1);
        assert_eq!(page_three[0].content, "m1");
    }

    #[sqlx::test]
    async fn sending_to_yourself_is_rejected(pool: PgPool) {
        let state = AppState::new(pool.clone());
        let alice = seed_user(&pool, "Alice", "alice@example.com").await;

        let err = send_message(
            State(state),
            actor(alice),
            Json(SendMessageRequest {
                receiver_email: "alice@example.com".to_string(),
                content: "note to self".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[sqlx::test]
    async fn only_the_sender_deletes_a_message(pool: PgPool) {
        let state = AppState::new(pool.clone());
        let alice = seed_user(&pool, "Alice", "alice@example.com").await;
        let bob = seed_user(&pool, "Bob", "bob@example.com").await;
        let message_id = seed_message(&pool, alice, bob, "hello", Utc::now()).await;

        let err = delete_message(State(state.clone()), actor(bob), Path(message_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized));

        delete_message(State(state.clone()), actor(alice), Path(message_id))
            .await
            .unwrap();

        let err = delete_message(State(state), actor(alice), Path(message_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
