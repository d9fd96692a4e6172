use axum::{
    Json, Router,
    body::{Body, Bytes},
    debug_handler,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::{
    AppResult, AppState, SqliteChat,
    error::BoxError,
    model::{Conversation, ConversationId, Message, MessageId, MessageQuery, UserId},
};

use super::Caller;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(mine))
        .route("/{id}", get(show))
        .route("/{id}/participants", post(add_participant))
        .route("/{id}/participants/{user}", delete(remove_participant))
        .route("/{id}/messages", get(list).post(append))
}

#[derive(Deserialize)]
struct NewConversation {
    #[serde(default)]
    name: Option<String>,
    participants: Vec<UserId>,
}

#[debug_handler(state = AppState)]
async fn create(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Json(NewConversation { name, participants }): Json<NewConversation>,
) -> AppResult<(StatusCode, Json<Conversation>)> {
    let everyone = participants.into_iter().chain([caller]);
    let conversation = chat.create(everyone, name).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

#[debug_handler(state = AppState)]
async fn mine(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
) -> AppResult<Json<Vec<Conversation>>> {
    Ok(Json(chat.conversations_of(caller).await?))
}

#[debug_handler(state = AppState)]
async fn show(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<ConversationId>,
) -> AppResult<Json<Conversation>> {
    Ok(Json(chat.conversation(id, caller).await?))
}

#[derive(Deserialize)]
struct Participant {
    user: UserId,
}

#[debug_handler(state = AppState)]
async fn add_participant(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<ConversationId>,
    Json(Participant { user }): Json<Participant>,
) -> AppResult<Json<Conversation>> {
    Ok(Json(chat.add_participant(id, caller, user).await?))
}

#[debug_handler(state = AppState)]
async fn remove_participant(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path((id, user)): Path<(ConversationId, UserId)>,
) -> AppResult<Json<Conversation>> {
    Ok(Json(chat.remove_participant(id, caller, user).await?))
}

/// Streams the conversation as newline-delimited JSON, one message per line,
/// fetching pages only as the client reads.
#[debug_handler(state = AppState)]
async fn list(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<ConversationId>,
    Query(query): Query<MessageQuery>,
) -> AppResult<Response> {
    let messages = chat.list(id, caller, query).await?;

    let lines = messages.map(|message| -> Result<Bytes, BoxError> {
        let mut line = serde_json::to_vec(&message?)?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

#[derive(Deserialize)]
struct NewMessage {
    receiver: UserId,
    body: String,
    #[serde(default)]
    parent: Option<MessageId>,
}

#[debug_handler(state = AppState)]
async fn append(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    Path(id): Path<ConversationId>,
    Json(NewMessage {
        receiver,
        body,
        parent,
    }): Json<NewMessage>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = chat.append(id, caller, receiver, &body, parent).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
