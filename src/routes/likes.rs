use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, Set};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{like, video};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct ToggleLikeResponse {
    pub liked: bool,
}

#[utoipa::path(
    post,
    path = "/videos/{id}/like",
    tag = "Engagement",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Like toggled", body = ToggleLikeResponse),
        (status = 404, description = "Video not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ToggleLikeResponse>, AppError> {
    video::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("Video not found".to_string()))?;

    let existing = like::Entity::find()
        .filter(like::Column::VideoId.eq(id))
        .filter(like::Column::UserId.eq(user.id))
        .one(&state.db)
        .await?;

    if let Some(existing) = existing {
        existing.delete(&state.db).await?;
        return Ok(Json(ToggleLikeResponse { liked: false }));
    }

    let like = like::ActiveModel {
        id: Set(Uuid::new_v4()),
        video_id: Set(id),
        user_id: Set(user.id),
        created_at: Set(chrono::Utc::now().naive_utc()),
    };
    like.insert(&state.db).await?;

    Ok(Json(ToggleLikeResponse { liked: true }))
}
