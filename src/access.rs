use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::schema::event_users;

/// Event-scoped role. Declaration order is the permission order:
/// ADMIN > MANAGER > STAFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventRole {
    Staff,
    Manager,
    Admin,
}

impl EventRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventRole::Admin => "ADMIN",
            EventRole::Manager => "MANAGER",
            EventRole::Staff => "STAFF",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ADMIN" => Some(EventRole::Admin),
            "MANAGER" => Some(EventRole::Manager),
            "STAFF" => Some(EventRole::Staff),
            _ => None,
        }
    }

    pub fn has_at_least(&self, threshold: EventRole) -> bool {
        *self >= threshold
    }
}

/// The single role on the (user, event) pair, or None when the user has no
/// assignment for this event.
pub fn resolve_role(
    conn: &mut PgConnection,
    user_id: Uuid,
    event_id: Uuid,
) -> AppResult<Option<EventRole>> {
    let role: Option<String> = event_users::table
        .filter(event_users::user_id.eq(user_id))
        .filter(event_users::event_id.eq(event_id))
        .select(event_users::role)
        .first(conn)
        .optional()?;

    match role {
        Some(value) => {
            let parsed = EventRole::parse(&value).ok_or_else(|| {
                AppError::internal(format!("unknown role '{value}' stored for event"))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Any role on the event is enough; no assignment is a 403, never a 404.
pub fn require_member(
    conn: &mut PgConnection,
    user_id: Uuid,
    event_id: Uuid,
) -> AppResult<EventRole> {
    resolve_role(conn, user_id, event_id)?.ok_or_else(AppError::access_denied)
}

pub fn require_at_least(
    conn: &mut PgConnection,
    user_id: Uuid,
    event_id: Uuid,
    threshold: EventRole,
) -> AppResult<EventRole> {
    let role = require_member(conn, user_id, event_id)?;
    if !role.has_at_least(threshold) {
        return Err(AppError::access_denied());
    }
    Ok(role)
}
