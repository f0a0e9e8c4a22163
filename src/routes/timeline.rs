use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use super::events::{load_active_event, parse_event_date};
use super::to_iso;
use crate::access::{self, EventRole};
use crate::auth::AuthenticatedUser;
use crate::corpus;
use crate::error::{AppError, AppResult};
use crate::models::{EventTimeline, NewEventTimeline, NewTimelineEntry, TimelineEntry};
use crate::prompts;
use crate::schema::{event_files, event_timelines, timeline_entries};
use crate::state::AppState;

pub const ENTRY_TYPES: &[&str] = &["rehearsal", "soundcheck", "logistics", "show", "meeting"];

/// Structured schedule produced by schema-constrained generation. The JSON
/// stored in the cache is exactly this shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineDocument {
    pub data: Vec<TimelineCategory>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineCategory {
    pub category: String,
    pub items: Vec<TimelineItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineItem {
    pub date: String,
    pub label: String,
}

#[derive(Serialize)]
pub struct GenerateTimelineResponse {
    pub timelines: Vec<TimelineCategory>,
}

#[derive(Serialize)]
pub struct CachedTimelineResponse {
    pub event_id: Uuid,
    pub timeline: Value,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct TimelineEntryResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub time: String,
    pub description: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TimelineEntry> for TimelineEntryResponse {
    fn from(entry: TimelineEntry) -> Self {
        Self {
            id: entry.id,
            event_id: entry.event_id,
            time: to_iso(entry.time),
            description: entry.description,
            entry_type: entry.entry_type,
            location: entry.location,
            notes: entry.notes,
            created_by: entry.created_by,
            created_at: to_iso(entry.created_at),
            updated_at: to_iso(entry.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct TimelineEntriesResponse {
    pub timeline: Vec<TimelineEntryResponse>,
}

#[derive(Serialize)]
pub struct TimelineEntryDetailResponse {
    pub entry: TimelineEntryResponse,
}

#[derive(Deserialize)]
pub struct CreateTimelineEntryRequest {
    pub time: String,
    pub description: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub location: Option<String>,
    pub notes: Option<String>,
}

pub async fn list_entries(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<TimelineEntriesResponse>> {
    let mut conn = state.db()?;
    access::require_member(&mut conn, user.user_id, event_id)?;
    load_active_event(&mut conn, event_id)?;

    let entries: Vec<TimelineEntry> = timeline_entries::table
        .filter(timeline_entries::event_id.eq(event_id))
        .order(timeline_entries::time.asc())
        .load(&mut conn)?;

    Ok(Json(TimelineEntriesResponse {
        timeline: entries
            .into_iter()
            .map(TimelineEntryResponse::from)
            .collect(),
    }))
}

pub async fn create_entry(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTimelineEntryRequest>,
) -> AppResult<(StatusCode, Json<TimelineEntryDetailResponse>)> {
    let description = payload.description.trim();
    if description.is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }
    if !ENTRY_TYPES.contains(&payload.entry_type.as_str()) {
        return Err(AppError::bad_request(format!(
            "invalid entry type '{}'. Allowed types: {}",
            payload.entry_type,
            ENTRY_TYPES.join(", ")
        )));
    }
    let time = parse_event_date(&payload.time)?;

    let mut conn = state.db()?;
    access::require_at_least(&mut conn, user.user_id, event_id, EventRole::Manager)?;
    load_active_event(&mut conn, event_id)?;

    let new_entry = NewTimelineEntry {
        id: Uuid::new_v4(),
        event_id,
        time,
        description: description.to_string(),
        entry_type: payload.entry_type,
        location: payload
            .location
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        notes: payload
            .notes
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        created_by: Some(user.user_id),
    };
    diesel::insert_into(timeline_entries::table)
        .values(&new_entry)
        .execute(&mut conn)?;

    let entry: TimelineEntry = timeline_entries::table.find(new_entry.id).first(&mut conn)?;

    Ok((
        StatusCode::CREATED,
        Json(TimelineEntryDetailResponse {
            entry: TimelineEntryResponse::from(entry),
        }),
    ))
}

pub async fn generate_timeline(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<GenerateTimelineResponse>> {
    {
        let mut conn = state.db()?;
        access::require_member(&mut conn, user.user_id, event_id)?;
        load_active_event(&mut conn, event_id)?;
    }

    let corpus = corpus::load_event_corpus(&state, event_id).await?;
    if !corpus.has_documents() {
        return Err(AppError::not_found_with(
            "No documents found for this event to generate a timeline",
        ));
    }
    if !corpus.has_text() {
        return Err(AppError::internal(
            "Could not read content from any of the event files",
        ));
    }

    let raw = match state
        .model
        .generate_structured(
            prompts::TIMELINE_SYSTEM_INSTRUCTION,
            &corpus.context,
            prompts::timeline_response_schema(),
        )
        .await
    {
        Ok(raw) => raw,
        Err(err) => {
            error!(event_id = %event_id, error = %err, "timeline model invocation failed");
            return Err(
                AppError::internal("Failed to generate timeline from AI model")
                    .with_details(Value::String(err.to_string())),
            );
        }
    };

    // Malformed output is a hard error, never an empty timeline.
    let document: TimelineDocument = serde_json::from_str(&raw).map_err(|err| {
        error!(event_id = %event_id, error = %err, "timeline response was not valid JSON");
        AppError::internal("Failed to parse AI response")
    })?;

    let timeline_json = serde_json::to_value(&document)?;
    let now = Utc::now().naive_utc();

    {
        let mut conn = state.db()?;
        // Clear-then-insert, deliberately not a transaction: if the clear
        // fails nothing is inserted, and an insert failure after a clear
        // leaves no cache until the next successful generation.
        diesel::delete(
            event_timelines::table.filter(event_timelines::event_id.eq(event_id)),
        )
        .execute(&mut conn)?;

        let row = NewEventTimeline {
            id: Uuid::new_v4(),
            event_id,
            timeline_json,
            updated_at: now,
        };
        diesel::insert_into(event_timelines::table)
            .values(&row)
            .execute(&mut conn)?;
    }

    info!(
        event_id = %event_id,
        categories = document.data.len(),
        "timeline generated and cached"
    );

    Ok(Json(GenerateTimelineResponse {
        timelines: document.data,
    }))
}

pub async fn cached_timeline(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<CachedTimelineResponse>> {
    let mut conn = state.db()?;
    access::require_member(&mut conn, user.user_id, event_id)?;
    load_active_event(&mut conn, event_id)?;

    // A cache row for an event whose documents were all deleted is treated as
    // stale and reported as not found rather than served.
    let file_count: i64 = event_files::table
        .filter(event_files::event_id.eq(event_id))
        .count()
        .get_result(&mut conn)?;
    if file_count == 0 {
        return Err(AppError::not_found_with(
            "No documents found for this event to provide a cached timeline",
        ));
    }

    let cached: Option<EventTimeline> = event_timelines::table
        .filter(event_timelines::event_id.eq(event_id))
        .order(event_timelines::updated_at.desc())
        .first(&mut conn)
        .optional()?;

    let cached =
        cached.ok_or_else(|| AppError::not_found_with("No cached timeline found for this event"))?;

    Ok(Json(CachedTimelineResponse {
        event_id,
        timeline: cached.timeline_json,
        updated_at: to_iso(cached.updated_at),
    }))
}
