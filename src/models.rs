use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = events)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub date: NaiveDateTime,
    pub location: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub is_archived: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub id: Uuid,
    pub name: String,
    pub date: NaiveDateTime,
    pub location: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = event_users)]
#[diesel(belongs_to(Event))]
#[diesel(belongs_to(User))]
#[diesel(primary_key(event_id, user_id))]
pub struct EventUser {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub added_by: Option<Uuid>,
    pub added_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = event_users)]
pub struct NewEventUser {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub added_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = categories)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = event_files)]
#[diesel(belongs_to(Event))]
pub struct EventFile {
    pub id: Uuid,
    pub event_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub category: String,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: NaiveDateTime,
    pub extracted_text: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = event_files)]
pub struct NewEventFile {
    pub id: Uuid,
    pub event_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub category: String,
    pub uploaded_by: Option<Uuid>,
    pub extracted_text: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = chat_messages)]
#[diesel(belongs_to(Event))]
#[diesel(belongs_to(User))]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub role: String,
    pub content: String,
    pub source_file_id: Option<Uuid>,
    pub source_document_name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_messages)]
pub struct NewChatMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub role: String,
    pub content: String,
    pub source_file_id: Option<Uuid>,
    pub source_document_name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = event_timelines)]
#[diesel(belongs_to(Event))]
pub struct EventTimeline {
    pub id: Uuid,
    pub event_id: Uuid,
    pub timeline_json: serde_json::Value,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = event_timelines)]
pub struct NewEventTimeline {
    pub id: Uuid,
    pub event_id: Uuid,
    pub timeline_json: serde_json::Value,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = timeline_entries)]
#[diesel(belongs_to(Event))]
pub struct TimelineEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub time: NaiveDateTime,
    pub description: String,
    pub entry_type: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = timeline_entries)]
pub struct NewTimelineEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub time: NaiveDateTime,
    pub description: String,
    pub entry_type: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}
