use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppResult, AppState, SqliteChat,
    chat::Purged,
    model::{Identity, Message, Notification, Role, UserId},
    store::SqliteStore,
};

use super::{Caller, ws};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register))
        .route("/{id}", delete(purge))
        .route("/me/unread", get(unread))
        .route("/me/unread/read", post(mark_all_read))
        .route("/me/unread/take", post(take_unread))
        .route("/me/notifications", get(notifications))
        .route("/me/ws", get(ws::notifications_ws))
}

#[derive(Deserialize)]
struct Register {
    username: String,
    #[serde(default)]
    role: Role,
}

#[debug_handler(state = AppState)]
async fn register(
    State(store): State<SqliteStore>,
    Json(Register { username, role }): Json<Register>,
) -> AppResult<(StatusCode, Json<Identity>)> {
    let identity = store.register_user(username.trim(), role).await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

#[debug_handler(state = AppState)]
async fn purge(
    State(chat): State<SqliteChat>,
    State(store): State<SqliteStore>,
    Caller(caller): Caller,
    Path(user): Path<UserId>,
) -> AppResult<Json<Purged>> {
    let purged = chat.purge_user(user, caller).await?;
    store.remove_user(user).await?;
    Ok(Json(purged))
}

#[debug_handler(state = AppState)]
async fn unread(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(chat.unread_for(caller).await?))
}

#[debug_handler(state = AppState)]
async fn mark_all_read(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
) -> AppResult<Json<Value>> {
    let marked = chat.mark_all_read(caller).await?;
    Ok(Json(json!({ "marked": marked })))
}

#[debug_handler(state = AppState)]
async fn take_unread(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(chat.take_unread(caller).await?))
}

#[debug_handler(state = AppState)]
async fn notifications(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(chat.notifications_for(caller).await?))
}
