use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{comment, video};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::pagination::{PaginatedResponse, Pagination};
use crate::state::AppState;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct WriteCommentRequest {
    pub content: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CommentResponse {
    pub id: Uuid,
    pub video_id: Uuid,
    pub owner_id: Uuid,
    pub content: String,
    pub created_at: chrono::NaiveDateTime,
}

impl From<comment::Model> for CommentResponse {
    fn from(model: comment::Model) -> Self {
        Self {
            id: model.id,
            video_id: model.video_id,
            owner_id: model.owner_id,
            content: model.content,
            created_at: model.created_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/videos/{id}/comments",
    tag = "Engagement",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    request_body = WriteCommentRequest,
    responses(
        (status = 201, description = "Comment added successfully", body = CommentResponse),
        (status = 400, description = "Empty comment"),
        (status = 404, description = "Video not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn write_comment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WriteCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    if payload.content.trim().is_empty() {
        return Err(AppError::BadRequest("Comment can't be empty".to_string()));
    }

    video::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("Video not found".to_string()))?;

    let comment = comment::ActiveModel {
        id: Set(Uuid::new_v4()),
        video_id: Set(id),
        owner_id: Set(user.id),
        content: Set(payload.content),
        created_at: Set(chrono::Utc::now().naive_utc()),
    };

    let saved = comment.insert(&state.db).await?;

    Ok((StatusCode::CREATED, Json(CommentResponse::from(saved))))
}

#[utoipa::path(
    get,
    path = "/videos/{id}/comments",
    tag = "Engagement",
    params(
        ("id" = Uuid, Path, description = "Video ID"),
        Pagination
    ),
    responses(
        (status = 200, description = "Comments for the video, newest first", body = PaginatedResponse<CommentResponse>)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PaginatedResponse<CommentResponse>>, AppError> {
    let page = pagination.page();
    let limit = pagination.limit();

    let paginator = comment::Entity::find()
        .filter(comment::Column::VideoId.eq(id))
        .order_by_desc(comment::Column::CreatedAt)
        .paginate(&state.db, limit);

    let total_items = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;

    let data: Vec<CommentResponse> = items.into_iter().map(CommentResponse::from).collect();

    Ok(Json(PaginatedResponse::new(data, total_items, page, limit)))
}
