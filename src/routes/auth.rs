use axum::{extract::State, http::StatusCode, Json};
use diesel::{prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{NewUser, User},
    schema::{event_users, users::dsl},
    state::AppState,
};

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<EventRoleResponse>,
}

#[derive(Serialize)]
pub struct EventRoleResponse {
    pub event_id: Uuid,
    pub role: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::bad_request("email must be a valid address"));
    }
    if payload.password.is_empty() {
        return Err(AppError::bad_request("password must not be empty"));
    }

    let password_hash = password::hash_password(&payload.password)?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash,
        full_name: payload
            .full_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
    };

    let mut conn = state.db()?;
    match diesel::insert_into(crate::schema::users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request("email is already registered"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let user: User = dsl::users.find(new_user.id).first(&mut conn)?;
    let access_token = state.jwt.generate_token(user.id, &user.email)?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
            user: UserResponse {
                id: user.id,
                email: user.email,
                full_name: user.full_name,
                roles: Vec::new(),
            },
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    let mut conn = state.db()?;

    let email = payload.email.trim().to_lowercase();
    let user: User = match dsl::users.filter(dsl::email.eq(&email)).first(&mut conn) {
        Ok(user) => user,
        Err(diesel::result::Error::NotFound) => return Err(AppError::unauthorized()),
        Err(err) => return Err(AppError::from(err)),
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    let roles: Vec<(Uuid, String)> = event_users::table
        .filter(event_users::user_id.eq(user.id))
        .select((event_users::event_id, event_users::role))
        .load(&mut conn)?;

    let access_token = state.jwt.generate_token(user.id, &user.email)?;

    Ok(Json(SessionResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_minutes * 60,
        user: UserResponse {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            roles: roles
                .into_iter()
                .map(|(event_id, role)| EventRoleResponse { event_id, role })
                .collect(),
        },
    }))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}
