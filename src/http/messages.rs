use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppResult, AppState, SqliteChat,
    model::{History, Message, MessageId},
};

use super::Caller;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(show).patch(edit).delete(remove))
        .route("/{id}/history", get(history))
        .route("/{id}/replies", get(replies))
        .route("/{id}/read", post(mark_read))
}

#[debug_handler(state = AppState)]
async fn show(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<MessageId>,
) -> AppResult<Json<Message>> {
    Ok(Json(chat.get_message(id, caller).await?))
}

#[derive(Deserialize)]
struct EditMessage {
    body: String,
}

#[debug_handler(state = AppState)]
async fn edit(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<MessageId>,
    Json(EditMessage { body }): Json<EditMessage>,
) -> AppResult<Json<Message>> {
    Ok(Json(chat.edit(id, caller, &body).await?))
}

#[debug_handler(state = AppState)]
async fn remove(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<MessageId>,
) -> AppResult<Json<Value>> {
    let removed = chat.delete(id, caller).await?;
    Ok(Json(json!({ "removed": removed })))
}

#[debug_handler(state = AppState)]
async fn history(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<MessageId>,
) -> AppResult<Json<History>> {
    chat.get_message(id, caller).await?;
    Ok(Json(chat.history_for(id).await?))
}

#[debug_handler(state = AppState)]
async fn replies(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<MessageId>,
) -> AppResult<Json<Vec<Message>>> {
    chat.get_message(id, caller).await?;
    Ok(Json(chat.replies_of(id).await?))
}

#[debug_handler(state = AppState)]
async fn mark_read(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<MessageId>,
) -> AppResult<Json<Value>> {
    let changed = chat.mark_read(id, caller).await?;
    Ok(Json(json!({ "changed": changed })))
}
