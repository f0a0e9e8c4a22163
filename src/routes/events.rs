use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::to_iso;
use crate::access::{self, EventRole};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Event, NewEvent, NewEventUser};
use crate::schema::{event_users, events};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct EventListQuery {
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct EventPayload {
    pub name: String,
    pub date: String,
    pub location: String,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub name: String,
    pub date: String,
    pub location: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(rename = "userRole")]
    pub user_role: String,
}

#[derive(Serialize)]
pub struct EventDetailResponse {
    pub event: EventResponse,
}

#[derive(Serialize)]
pub struct EventListResponse {
    pub events: Vec<EventResponse>,
}

pub(crate) fn to_event_response(event: Event, role: &str) -> EventResponse {
    EventResponse {
        id: event.id,
        name: event.name,
        date: to_iso(event.date),
        location: event.location,
        description: event.description,
        created_by: event.created_by,
        is_archived: event.is_archived,
        created_at: to_iso(event.created_at),
        updated_at: to_iso(event.updated_at),
        user_role: role.to_string(),
    }
}

/// Archived events are excluded from every access path; a missing or
/// archived event is always a 404, never a 403.
pub(crate) fn load_active_event(conn: &mut PgConnection, event_id: Uuid) -> AppResult<Event> {
    let event: Option<Event> = events::table
        .find(event_id)
        .filter(events::is_archived.eq(false))
        .first(conn)
        .optional()?;
    event.ok_or_else(|| AppError::not_found_with("Event not found"))
}

pub(crate) fn parse_event_date(raw: &str) -> AppResult<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.naive_utc());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Ok(parsed);
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
            return Ok(midnight);
        }
    }
    Err(AppError::bad_request(
        "date must be an RFC 3339 timestamp or a YYYY-MM-DD value",
    ))
}

fn validate_payload(payload: &EventPayload) -> AppResult<(String, NaiveDateTime, String)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let location = payload.location.trim();
    if location.is_empty() {
        return Err(AppError::bad_request("location must not be empty"));
    }
    let date = parse_event_date(&payload.date)?;
    Ok((name.to_string(), date, location.to_string()))
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<EventListResponse>> {
    let mut conn = state.db()?;

    let mut query = events::table
        .inner_join(event_users::table)
        .filter(event_users::user_id.eq(user.user_id))
        .filter(events::is_archived.eq(false))
        .select((events::all_columns, event_users::role))
        .into_boxed();

    if let Some(search) = params
        .search
        .as_ref()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
    {
        let pattern = format!("%{search}%");
        query = query.filter(
            events::name
                .ilike(pattern.clone())
                .or(events::description.ilike(pattern)),
        );
    }

    let rows: Vec<(Event, String)> = query.order(events::date.asc()).load(&mut conn)?;

    let events = rows
        .into_iter()
        .map(|(event, role)| to_event_response(event, &role))
        .collect();

    Ok(Json(EventListResponse { events }))
}

pub async fn create_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<EventPayload>,
) -> AppResult<(StatusCode, Json<EventDetailResponse>)> {
    let (name, date, location) = validate_payload(&payload)?;
    let description = payload
        .description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let mut conn = state.db()?;
    let event = conn.transaction::<Event, AppError, _>(|conn| {
        let new_event = NewEvent {
            id: Uuid::new_v4(),
            name,
            date,
            location,
            description,
            created_by: user.user_id,
        };
        diesel::insert_into(events::table)
            .values(&new_event)
            .execute(conn)?;

        let creator_role = NewEventUser {
            event_id: new_event.id,
            user_id: user.user_id,
            role: EventRole::Admin.as_str().to_string(),
            added_by: Some(user.user_id),
        };
        diesel::insert_into(event_users::table)
            .values(&creator_role)
            .execute(conn)?;

        let event: Event = events::table.find(new_event.id).first(conn)?;
        Ok(event)
    })?;

    info!(event_id = %event.id, created_by = %user.user_id, "event created");

    Ok((
        StatusCode::CREATED,
        Json(EventDetailResponse {
            event: to_event_response(event, EventRole::Admin.as_str()),
        }),
    ))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<EventDetailResponse>> {
    let mut conn = state.db()?;
    let role = access::require_member(&mut conn, user.user_id, event_id)?;
    let event = load_active_event(&mut conn, event_id)?;

    Ok(Json(EventDetailResponse {
        event: to_event_response(event, role.as_str()),
    }))
}

pub async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<EventPayload>,
) -> AppResult<Json<EventDetailResponse>> {
    let (name, date, location) = validate_payload(&payload)?;
    let description = payload
        .description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let mut conn = state.db()?;
    let role = access::require_at_least(&mut conn, user.user_id, event_id, EventRole::Manager)?;
    load_active_event(&mut conn, event_id)?;

    let now = Utc::now().naive_utc();
    diesel::update(events::table.find(event_id))
        .set((
            events::name.eq(&name),
            events::date.eq(date),
            events::location.eq(&location),
            events::description.eq(&description),
            events::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let event: Event = events::table.find(event_id).first(&mut conn)?;
    Ok(Json(EventDetailResponse {
        event: to_event_response(event, role.as_str()),
    }))
}

pub async fn archive_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    access::require_at_least(&mut conn, user.user_id, event_id, EventRole::Admin)?;
    load_active_event(&mut conn, event_id)?;

    let now = Utc::now().naive_utc();
    diesel::update(events::table.find(event_id))
        .set((events::is_archived.eq(true), events::updated_at.eq(now)))
        .execute(&mut conn)?;

    info!(event_id = %event_id, archived_by = %user.user_id, "event archived");

    Ok(Json(json!({ "success": true })))
}
