use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::Category;
use crate::schema::categories;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
}

pub async fn list_categories(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<CategoryResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Category> = categories::table.order(categories::name.asc()).load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|category| CategoryResponse {
                id: category.id,
                name: category.name,
            })
            .collect(),
    ))
}
