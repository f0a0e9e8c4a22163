use axum::{extract::State, Json};
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use super::to_iso;
use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::schema::{event_files, event_users, timeline_entries};
use crate::state::AppState;

#[derive(Serialize)]
pub struct DashboardStatsResponse {
    #[serde(rename = "totalFiles")]
    pub total_files: i64,
    #[serde(rename = "filesToday")]
    pub files_today: i64,
    #[serde(rename = "lastUpdate")]
    pub last_update: Option<String>,
    #[serde(rename = "showsToday")]
    pub shows_today: i64,
}

pub async fn stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DashboardStatsResponse>> {
    let mut conn = state.db()?;

    let event_ids: Vec<Uuid> = event_users::table
        .filter(event_users::user_id.eq(user.user_id))
        .select(event_users::event_id)
        .load(&mut conn)?;

    if event_ids.is_empty() {
        return Ok(Json(DashboardStatsResponse {
            total_files: 0,
            files_today: 0,
            last_update: None,
            shows_today: 0,
        }));
    }

    let today_start = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid");
    let today_end = today_start + Duration::days(1);

    let total_files: i64 = event_files::table
        .filter(event_files::event_id.eq_any(&event_ids))
        .count()
        .get_result(&mut conn)?;

    let files_today: i64 = event_files::table
        .filter(event_files::event_id.eq_any(&event_ids))
        .filter(event_files::uploaded_at.ge(today_start))
        .filter(event_files::uploaded_at.lt(today_end))
        .count()
        .get_result(&mut conn)?;

    let last_update: Option<NaiveDateTime> = event_files::table
        .filter(event_files::event_id.eq_any(&event_ids))
        .select(max(event_files::uploaded_at))
        .first(&mut conn)?;

    let shows_today: i64 = timeline_entries::table
        .filter(timeline_entries::event_id.eq_any(&event_ids))
        .filter(timeline_entries::entry_type.eq("show"))
        .filter(timeline_entries::time.ge(today_start))
        .filter(timeline_entries::time.lt(today_end))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(DashboardStatsResponse {
        total_files,
        files_today,
        last_update: last_update.map(to_iso),
        shows_today,
    }))
}
