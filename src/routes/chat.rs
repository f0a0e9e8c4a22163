use axum::body::Body;
use axum::extract::{Json, Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, warn};
use uuid::Uuid;

use super::{events::load_active_event, to_iso};
use crate::access;
use crate::auth::AuthenticatedUser;
use crate::corpus::{self, GroundingSource};
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, NewChatMessage};
use crate::prompts;
use crate::schema::chat_messages;
use crate::state::AppState;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

const MODEL_FAILURE_MESSAGE: &str = "Failed to generate a response from the AI model";

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize, Clone)]
pub struct ChatMessageResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub role: String,
    pub content: String,
    pub source_file_id: Option<Uuid>,
    pub source_document_name: Option<String>,
    pub created_at: String,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            user_id: message.user_id,
            event_id: message.event_id,
            role: message.role,
            content: message.content,
            source_file_id: message.source_file_id,
            source_document_name: message.source_document_name,
            created_at: to_iso(message.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<ChatMessageResponse>,
}

#[derive(Serialize)]
pub struct ChatTurnResponse {
    #[serde(rename = "userMessage")]
    pub user_message: Option<ChatMessageResponse>,
    #[serde(rename = "assistantMessage")]
    pub assistant_message: Option<ChatMessageResponse>,
    pub response: String,
}

/// Wire envelope for the streaming variant. Exactly three cases: the echoed
/// persisted user turn, a partial text fragment, and the final persisted
/// assistant turn. Encoded as newline-delimited JSON.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    UserMessage {
        message: ChatMessageResponse,
    },
    Chunk {
        text: String,
    },
    Done {
        message: Option<ChatMessageResponse>,
        response: String,
    },
}

pub async fn chat_history(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ChatHistoryResponse>> {
    let mut conn = state.db()?;
    access::require_member(&mut conn, user.user_id, event_id)?;
    load_active_event(&mut conn, event_id)?;

    let messages: Vec<ChatMessage> = chat_messages::table
        .filter(chat_messages::user_id.eq(user.user_id))
        .filter(chat_messages::event_id.eq(event_id))
        .order(chat_messages::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(ChatHistoryResponse {
        messages: messages.into_iter().map(ChatMessageResponse::from).collect(),
    }))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<ChatRequest>,
) -> AppResult<Json<ChatTurnResponse>> {
    let question = payload.message.trim().to_string();
    if question.is_empty() {
        return Err(AppError::bad_request("Message is required"));
    }

    {
        let mut conn = state.db()?;
        access::require_member(&mut conn, user.user_id, event_id)?;
        load_active_event(&mut conn, event_id)?;
    }

    let corpus = corpus::load_event_corpus(&state, event_id).await?;

    let user_message = persist_message(
        &state,
        user.user_id,
        event_id,
        ROLE_USER,
        &question,
        corpus.source.as_ref(),
    );

    // No readable context: answer with the fixed fallback and skip the model
    // call entirely.
    if !corpus.has_text() {
        let assistant_message = persist_message(
            &state,
            user.user_id,
            event_id,
            ROLE_ASSISTANT,
            prompts::NO_DOCUMENTS_FALLBACK,
            corpus.source.as_ref(),
        );
        return Ok(Json(ChatTurnResponse {
            user_message: user_message.map(ChatMessageResponse::from),
            assistant_message: assistant_message.map(ChatMessageResponse::from),
            response: prompts::NO_DOCUMENTS_FALLBACK.to_string(),
        }));
    }

    let prompt = prompts::chat_prompt(&corpus.context, &question);
    let answer = match state
        .model
        .generate(prompts::CHAT_SYSTEM_INSTRUCTION, &prompt)
        .await
    {
        Ok(answer) => answer,
        Err(err) => {
            // The user turn stays persisted without a matching reply; that
            // orphan is the visible failure state.
            error!(event_id = %event_id, error = %err, "chat model invocation failed");
            return Err(AppError::internal(MODEL_FAILURE_MESSAGE));
        }
    };

    let assistant_message = persist_message(
        &state,
        user.user_id,
        event_id,
        ROLE_ASSISTANT,
        &answer,
        corpus.source.as_ref(),
    );

    Ok(Json(ChatTurnResponse {
        user_message: user_message.map(ChatMessageResponse::from),
        assistant_message: assistant_message.map(ChatMessageResponse::from),
        response: answer,
    }))
}

pub async fn send_message_stream(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<ChatRequest>,
) -> AppResult<Response> {
    let question = payload.message.trim().to_string();
    if question.is_empty() {
        return Err(AppError::bad_request("Message is required"));
    }

    {
        let mut conn = state.db()?;
        access::require_member(&mut conn, user.user_id, event_id)?;
        load_active_event(&mut conn, event_id)?;
    }

    let corpus = corpus::load_event_corpus(&state, event_id).await?;

    let user_message = persist_message(
        &state,
        user.user_id,
        event_id,
        ROLE_USER,
        &question,
        corpus.source.as_ref(),
    );

    let (tx, rx) = mpsc::channel::<ChatStreamEvent>(16);

    if !corpus.has_text() {
        let state_for_task = state.clone();
        let user_id = user.user_id;
        let source = corpus.source;
        tokio::spawn(async move {
            if let Some(message) = user_message {
                let _ = tx
                    .send(ChatStreamEvent::UserMessage {
                        message: ChatMessageResponse::from(message),
                    })
                    .await;
            }
            let _ = tx
                .send(ChatStreamEvent::Chunk {
                    text: prompts::NO_DOCUMENTS_FALLBACK.to_string(),
                })
                .await;
            let assistant = persist_message(
                &state_for_task,
                user_id,
                event_id,
                ROLE_ASSISTANT,
                prompts::NO_DOCUMENTS_FALLBACK,
                source.as_ref(),
            );
            let _ = tx
                .send(ChatStreamEvent::Done {
                    message: assistant.map(ChatMessageResponse::from),
                    response: prompts::NO_DOCUMENTS_FALLBACK.to_string(),
                })
                .await;
        });

        return ndjson_response(rx);
    }

    let prompt = prompts::chat_prompt(&corpus.context, &question);
    // Open the model stream before committing to a 200 so a request-level
    // provider failure still surfaces as an error response.
    let mut model_stream = match state
        .model
        .generate_stream(prompts::CHAT_SYSTEM_INSTRUCTION, &prompt)
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            error!(event_id = %event_id, error = %err, "chat model stream failed to open");
            return Err(AppError::internal(MODEL_FAILURE_MESSAGE));
        }
    };

    let state_for_task = state.clone();
    let user_id = user.user_id;
    let source = corpus.source;
    tokio::spawn(async move {
        if let Some(message) = user_message {
            let _ = tx
                .send(ChatStreamEvent::UserMessage {
                    message: ChatMessageResponse::from(message),
                })
                .await;
        }

        let mut answer = String::new();
        while let Some(fragment) = model_stream.next().await {
            match fragment {
                Ok(text) => {
                    answer.push_str(&text);
                    // A closed receiver means the client went away; keep
                    // draining the provider stream, there is no cancellation
                    // path to it.
                    let _ = tx.send(ChatStreamEvent::Chunk { text }).await;
                }
                Err(err) => {
                    // No fabricated assistant turn: the stream ends without a
                    // final event and the partial text is discarded.
                    error!(event_id = %event_id, error = %err, "chat model stream failed");
                    return;
                }
            }
        }

        if answer.is_empty() {
            error!(event_id = %event_id, "chat model stream produced no text");
            return;
        }

        let assistant = persist_message(
            &state_for_task,
            user_id,
            event_id,
            ROLE_ASSISTANT,
            &answer,
            source.as_ref(),
        );
        let _ = tx
            .send(ChatStreamEvent::Done {
                message: assistant.map(ChatMessageResponse::from),
                response: answer,
            })
            .await;
    });

    ndjson_response(rx)
}

fn ndjson_response(rx: mpsc::Receiver<ChatStreamEvent>) -> AppResult<Response> {
    let body_stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .map(|event| encode_event(&event));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(body_stream))
        .map_err(|err| AppError::internal(format!("failed to build stream response: {err}")))
}

fn encode_event(event: &ChatStreamEvent) -> Result<bytes::Bytes, std::io::Error> {
    let mut encoded = serde_json::to_vec(event)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    encoded.push(b'\n');
    Ok(bytes::Bytes::from(encoded))
}

fn insert_chat_message(
    conn: &mut PgConnection,
    user_id: Uuid,
    event_id: Uuid,
    role: &str,
    content: &str,
    source: Option<&GroundingSource>,
) -> Result<ChatMessage, diesel::result::Error> {
    let new_message = NewChatMessage {
        id: Uuid::new_v4(),
        user_id,
        event_id,
        role: role.to_string(),
        content: content.to_string(),
        source_file_id: source.map(|s| s.file_id),
        source_document_name: source.map(|s| s.file_name.clone()),
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(chat_messages::table)
        .values(&new_message)
        .execute(conn)?;

    chat_messages::table.find(new_message.id).first(conn)
}

/// Message persistence is best-effort: a failed write is logged but never
/// costs the caller an answer that was already generated.
fn persist_message(
    state: &AppState,
    user_id: Uuid,
    event_id: Uuid,
    role: &str,
    content: &str,
    source: Option<&GroundingSource>,
) -> Option<ChatMessage> {
    let mut conn = match state.db() {
        Ok(conn) => conn,
        Err(err) => {
            warn!(event_id = %event_id, role = %role, error = ?err, "failed to persist chat message");
            return None;
        }
    };

    match insert_chat_message(&mut conn, user_id, event_id, role, content, source) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(event_id = %event_id, role = %role, error = %err, "failed to persist chat message");
            None
        }
    }
}
