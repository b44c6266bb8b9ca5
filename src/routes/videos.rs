use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{comment, like, video};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::pagination::PaginatedResponse;
use crate::state::AppState;

/// Hard cap on the raw video payload, checked before any blob-store call.
pub const MAX_VIDEO_BYTES: usize = 100 * 1024 * 1024;

// Helper to get file extension
fn get_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("bin")
        .to_string()
}

/// Round the fractional duration ffprobe reports to whole seconds.
/// Anything that does not land on a positive integer is an extraction
/// failure, not a degraded success.
fn round_duration(seconds: f64) -> Option<i32> {
    let rounded = seconds.round();
    if rounded >= 1.0 && rounded <= i32::MAX as f64 {
        Some(rounded as i32)
    } else {
        None
    }
}

/// Watch time needed before a heartbeat counts as a view: 30 seconds,
/// or half the video for clips shorter than a minute.
fn view_threshold(duration: i32) -> f64 {
    f64::min(30.0, duration as f64 * 0.5)
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct VideoResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub mime_type: String,
    pub duration: i32,
    pub views: i64,
    pub is_published: bool,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<video::Model> for VideoResponse {
    // The raw blob URL stays server-side; playback goes through the
    // streaming proxy.
    fn from(model: video::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            title: model.title,
            description: model.description,
            thumbnail: model.thumbnail_url,
            mime_type: model.mime_type,
            duration: model.duration,
            views: model.views,
            is_published: model.is_published,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct VideoDetailResponse {
    #[serde(flatten)]
    pub video: VideoResponse,
    pub likes_count: u64,
    pub stream_url: String,
}

#[utoipa::path(
    post,
    path = "/videos",
    tag = "Videos",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Video uploaded successfully", body = VideoResponse),
        (status = 400, description = "Validation or upload failure"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<VideoResponse>), AppError> {
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut video_file: Option<(Vec<u8>, String, String)> = None;
    let mut thumbnail_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => {
                title = Some(field.text().await.map_err(|_| {
                    AppError::BadRequest("Invalid title field".to_string())
                })?);
            }
            "description" => {
                description = Some(field.text().await.map_err(|_| {
                    AppError::BadRequest("Invalid description field".to_string())
                })?);
            }
            "videoFile" => {
                let filename = field.file_name().unwrap_or("video.mp4").to_string();
                let content_type = field.content_type().unwrap_or("video/mp4").to_string();
                let data = field.bytes().await.map_err(|_| {
                    AppError::BadRequest("Failed to read video bytes".to_string())
                })?;
                video_file = Some((data.to_vec(), content_type, get_extension(&filename)));
            }
            "thumbnail" => {
                let data = field.bytes().await.map_err(|_| {
                    AppError::BadRequest("Failed to read thumbnail bytes".to_string())
                })?;
                thumbnail_bytes = Some(data.to_vec());
            }
            _ => {}
        }
    }

    // All validation happens before the first blob-store call
    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or(AppError::BadRequest("All fields are required".to_string()))?;
    let description = description
        .filter(|d| !d.trim().is_empty())
        .ok_or(AppError::BadRequest("All fields are required".to_string()))?;
    let (video_bytes, video_mime, video_ext) =
        video_file.ok_or(AppError::BadRequest("Video file is required".to_string()))?;
    let thumb_bytes =
        thumbnail_bytes.ok_or(AppError::BadRequest("Thumbnail file is required".to_string()))?;

    if video_bytes.len() > MAX_VIDEO_BYTES {
        println!(
            "Videos | POST /videos | user={} | res=400 | video too large ({} bytes)",
            user.username,
            video_bytes.len()
        );
        return Err(AppError::BadRequest(
            "Video too large. Max allowed size is 100MiB.".to_string(),
        ));
    }

    let thumb_format = image::guess_format(&thumb_bytes)
        .map_err(|_| AppError::BadRequest("Thumbnail is not a valid image".to_string()))?;
    let (thumb_mime, thumb_ext) = match thumb_format {
        image::ImageFormat::Png => ("image/png", "png"),
        image::ImageFormat::Jpeg => ("image/jpeg", "jpg"),
        image::ImageFormat::WebP => ("image/webp", "webp"),
        _ => {
            return Err(AppError::BadRequest(
                "Unsupported thumbnail format".to_string(),
            ))
        }
    };

    // Two independent blob uploads; the catalog record exists only after
    // both succeed. A blob stranded by a later failure is logged for
    // out-of-band reconciliation, never rolled back.
    let stored_video = state
        .blob_store
        .upload_video(video_bytes, &video_mime, &video_ext)
        .await?;

    let duration = match round_duration(stored_video.duration_seconds) {
        Some(d) => d,
        None => {
            eprintln!(
                "Upload | orphaned blob {} (unusable duration {})",
                stored_video.url, stored_video.duration_seconds
            );
            return Err(AppError::BadRequest(
                "Unable to extract video duration".to_string(),
            ));
        }
    };

    let thumbnail_url = match state
        .blob_store
        .upload_image(thumb_bytes, thumb_mime, thumb_ext)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            eprintln!(
                "Upload | orphaned blob {} (thumbnail upload failed)",
                stored_video.url
            );
            return Err(e);
        }
    };

    let now = chrono::Utc::now().naive_utc();
    let video = video::ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_id: Set(user.id),
        title: Set(title),
        description: Set(description),
        video_url: Set(stored_video.url.clone()),
        thumbnail_url: Set(thumbnail_url.clone()),
        mime_type: Set(video_mime),
        duration: Set(duration),
        views: Set(0),
        is_published: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let saved = match video.insert(&state.db).await {
        Ok(saved) => saved,
        Err(e) => {
            eprintln!(
                "Upload | orphaned blobs {} {} (record insert failed: {})",
                stored_video.url, thumbnail_url, e
            );
            return Err(AppError::DatabaseError(e));
        }
    };

    println!(
        "Videos | POST /videos | user={} | video={} | duration={}s | res=201",
        user.username, saved.id, saved.duration
    );
    Ok((StatusCode::CREATED, Json(VideoResponse::from(saved))))
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ListVideosQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Substring match against title and description.
    pub query: Option<String>,
}

#[utoipa::path(
    get,
    path = "/videos",
    tag = "Videos",
    params(ListVideosQuery),
    responses(
        (status = 200, description = "Published videos, newest first", body = PaginatedResponse<VideoResponse>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_videos(
    State(state): State<AppState>,
    Query(params): Query<ListVideosQuery>,
) -> Result<Json<PaginatedResponse<VideoResponse>>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);

    let mut condition = Condition::all().add(video::Column::IsPublished.eq(true));

    if let Some(query) = params.query.as_deref().filter(|q| !q.trim().is_empty()) {
        condition = condition.add(
            Condition::any()
                .add(video::Column::Title.contains(query))
                .add(video::Column::Description.contains(query)),
        );
    }

    let paginator = video::Entity::find()
        .filter(condition)
        .order_by_desc(video::Column::CreatedAt)
        .paginate(&state.db, limit);

    let total_items = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;

    let data: Vec<VideoResponse> = items.into_iter().map(VideoResponse::from).collect();

    Ok(Json(PaginatedResponse::new(data, total_items, page, limit)))
}

#[utoipa::path(
    get,
    path = "/videos/{id}",
    tag = "Videos",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video details", body = VideoDetailResponse),
        (status = 404, description = "Video not found or unpublished"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VideoDetailResponse>, AppError> {
    let video = video::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .filter(|v| v.is_published)
        .ok_or(AppError::NotFound("Video not found".to_string()))?;

    // A detail fetch counts as a view. This deliberately overlaps with the
    // watch-time gate; both paths increment.
    video::Entity::update_many()
        .col_expr(video::Column::Views, Expr::col(video::Column::Views).add(1))
        .filter(video::Column::Id.eq(id))
        .exec(&state.db)
        .await?;

    let likes_count = like::Entity::find()
        .filter(like::Column::VideoId.eq(id))
        .count(&state.db)
        .await?;

    let stream_url = format!("/videos/{}/stream", video.id);
    let mut response = VideoResponse::from(video);
    response.views += 1;

    Ok(Json(VideoDetailResponse {
        video: response,
        likes_count,
        stream_url,
    }))
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateVideoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/videos/{id}",
    tag = "Videos",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    request_body = UpdateVideoRequest,
    responses(
        (status = 200, description = "Video updated successfully", body = VideoResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Video not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVideoRequest>,
) -> Result<Json<VideoResponse>, AppError> {
    let video = video::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("Video not found".to_string()))?;

    if video.owner_id != user.id {
        return Err(AppError::Forbidden("Not allowed".to_string()));
    }

    let mut active = video.into_active_model();

    // Only title and description are editable; everything else on the
    // record is immutable after creation.
    if let Some(title) = payload.title.filter(|t| !t.trim().is_empty()) {
        active.title = Set(title);
    }
    if let Some(description) = payload.description.filter(|d| !d.trim().is_empty()) {
        active.description = Set(description);
    }
    active.updated_at = Set(chrono::Utc::now().naive_utc());

    let updated = active.update(&state.db).await?;

    Ok(Json(VideoResponse::from(updated)))
}

#[utoipa::path(
    delete,
    path = "/videos/{id}",
    tag = "Videos",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video deleted successfully"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Video not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let video = video::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("Video not found".to_string()))?;

    if video.owner_id != user.id {
        return Err(AppError::Forbidden("Not allowed".to_string()));
    }

    // Best-effort cascade: the video row goes first, then dependent
    // records, then blobs. Failures past the first delete leave
    // stragglers; they are logged, not rolled back.
    video::Entity::delete_by_id(id).exec(&state.db).await?;

    if let Err(e) = comment::Entity::delete_many()
        .filter(comment::Column::VideoId.eq(id))
        .exec(&state.db)
        .await
    {
        eprintln!("Videos | DELETE /videos/{} | comment cleanup failed: {}", id, e);
    }

    if let Err(e) = like::Entity::delete_many()
        .filter(like::Column::VideoId.eq(id))
        .exec(&state.db)
        .await
    {
        eprintln!("Videos | DELETE /videos/{} | like cleanup failed: {}", id, e);
    }

    if let Err(e) = state.blob_store.delete_by_url(&video.video_url).await {
        eprintln!("Videos | DELETE /videos/{} | video blob cleanup failed: {:?}", id, e);
    }
    if let Err(e) = state.blob_store.delete_by_url(&video.thumbnail_url).await {
        eprintln!("Videos | DELETE /videos/{} | thumbnail blob cleanup failed: {:?}", id, e);
    }

    println!("Videos | DELETE /videos/{} | user={} | res=200", id, user.username);
    Ok(Json(serde_json::json!({
        "message": "Video deleted successfully",
        "id": id
    })))
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct PublishStatusResponse {
    pub id: Uuid,
    pub is_published: bool,
}

#[utoipa::path(
    patch,
    path = "/videos/{id}/publish",
    tag = "Videos",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "New publish state", body = PublishStatusResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Video not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn toggle_publish(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublishStatusResponse>, AppError> {
    let video = video::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("Video not found".to_string()))?;

    if video.owner_id != user.id {
        return Err(AppError::Forbidden("Not allowed".to_string()));
    }

    let was_published = video.is_published;
    let mut active = video.into_active_model();
    active.is_published = Set(!was_published);
    active.updated_at = Set(chrono::Utc::now().naive_utc());

    let updated = active.update(&state.db).await?;

    println!(
        "Videos | PATCH /videos/{}/publish | user={} | published={}",
        id, user.username, updated.is_published
    );
    Ok(Json(PublishStatusResponse {
        id: updated.id,
        is_published: updated.is_published,
    }))
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WatchTimeRequest {
    /// Seconds of playback the client reports having watched.
    pub watched_duration: f64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct WatchTimeResponse {
    pub counted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/videos/{id}/watch-time",
    tag = "Videos",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    request_body = WatchTimeRequest,
    responses(
        (status = 200, description = "Heartbeat accepted; payload says whether a view was counted", body = WatchTimeResponse),
        (status = 404, description = "Video not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_watch_time(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WatchTimeRequest>,
) -> Result<Json<WatchTimeResponse>, AppError> {
    let video = video::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("Video not found".to_string()))?;

    let threshold = view_threshold(video.duration);

    if payload.watched_duration >= threshold {
        // One atomic increment per threshold-crossing heartbeat. Repeat
        // reports within a session are the client's to suppress.
        video::Entity::update_many()
            .col_expr(video::Column::Views, Expr::col(video::Column::Views).add(1))
            .filter(video::Column::Id.eq(id))
            .exec(&state.db)
            .await?;

        return Ok(Json(WatchTimeResponse {
            counted: true,
            views: Some(video.views + 1),
        }));
    }

    Ok(Json(WatchTimeResponse {
        counted: false,
        views: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3Config;
    use crate::services::s3::S3Service;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn test_state(db: sea_orm::DatabaseConnection) -> AppState {
        let blob_store = S3Service::new(&S3Config {
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
            region: "us-east-1".to_string(),
            bucket_name: "vsk-test".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
        });
        AppState {
            db,
            blob_store,
            http: reqwest::Client::new(),
        }
    }

    fn sample_video(duration: i32, views: i64, is_published: bool, owner: Uuid) -> video::Model {
        let now = chrono::Utc::now().naive_utc();
        video::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            title: "Sample".to_string(),
            description: "Sample description".to_string(),
            video_url: "http://localhost:9000/vsk-test/videos/v.mp4".to_string(),
            thumbnail_url: "http://localhost:9000/vsk-test/thumbnails/t.jpg".to_string(),
            mime_type: "video/mp4".to_string(),
            duration,
            views,
            is_published,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn threshold_is_half_duration_for_short_videos() {
        assert_eq!(view_threshold(40), 20.0);
        assert_eq!(view_threshold(10), 5.0);
    }

    #[test]
    fn threshold_caps_at_thirty_seconds() {
        assert_eq!(view_threshold(80), 30.0);
        assert_eq!(view_threshold(60), 30.0);
        assert_eq!(view_threshold(3600), 30.0);
    }

    #[test]
    fn duration_rounds_to_whole_seconds() {
        assert_eq!(round_duration(13.508), Some(14));
        assert_eq!(round_duration(40.2), Some(40));
        assert_eq!(round_duration(0.6), Some(1));
    }

    #[test]
    fn unusable_durations_are_rejected() {
        assert_eq!(round_duration(0.3), None);
        assert_eq!(round_duration(0.0), None);
        assert_eq!(round_duration(-5.0), None);
        assert_eq!(round_duration(f64::NAN), None);
    }

    #[test]
    fn extension_falls_back_to_bin() {
        assert_eq!(get_extension("clip.mp4"), "mp4");
        assert_eq!(get_extension("noext"), "bin");
    }

    #[tokio::test]
    async fn watch_time_below_threshold_does_not_count() {
        // duration 40 -> threshold 20; no exec result appended, so a
        // stray UPDATE would fail the call
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_video(40, 7, true, Uuid::new_v4())]])
            .into_connection();
        let state = test_state(db);

        let Json(response) = update_watch_time(
            State(state),
            Path(Uuid::new_v4()),
            Json(WatchTimeRequest {
                watched_duration: 19.0,
            }),
        )
        .await
        .unwrap();

        assert!(!response.counted);
        assert_eq!(response.views, None);
    }

    #[tokio::test]
    async fn watch_time_at_threshold_counts_once() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_video(40, 7, true, Uuid::new_v4())]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let state = test_state(db);

        let Json(response) = update_watch_time(
            State(state),
            Path(Uuid::new_v4()),
            Json(WatchTimeRequest {
                watched_duration: 20.0,
            }),
        )
        .await
        .unwrap();

        assert!(response.counted);
        assert_eq!(response.views, Some(8));
    }

    #[tokio::test]
    async fn watch_time_cap_applies_to_long_videos() {
        // duration 80 -> threshold 30, not 40
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_video(80, 0, true, Uuid::new_v4())]])
            .into_connection();
        let state = test_state(db);

        let Json(response) = update_watch_time(
            State(state),
            Path(Uuid::new_v4()),
            Json(WatchTimeRequest {
                watched_duration: 29.0,
            }),
        )
        .await
        .unwrap();

        assert!(!response.counted);
    }

    #[tokio::test]
    async fn watch_time_unknown_video_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<video::Model>::new()])
            .into_connection();
        let state = test_state(db);

        let result = update_watch_time(
            State(state),
            Path(Uuid::new_v4()),
            Json(WatchTimeRequest {
                watched_duration: 30.0,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn detail_fetch_hides_unpublished_videos() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_video(40, 0, false, Uuid::new_v4())]])
            .into_connection();
        let state = test_state(db);

        let result = get_video(State(state), Path(Uuid::new_v4())).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_rejects_non_owner() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_video(40, 0, true, Uuid::new_v4())]])
            .into_connection();
        let state = test_state(db);
        let stranger = AuthUser {
            id: Uuid::new_v4(),
            username: "stranger".to_string(),
        };

        let result = update_video(
            State(state),
            Extension(stranger),
            Path(Uuid::new_v4()),
            Json(UpdateVideoRequest {
                title: Some("hijacked".to_string()),
                description: None,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn toggle_publish_rejects_non_owner() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_video(40, 0, false, Uuid::new_v4())]])
            .into_connection();
        let state = test_state(db);
        let stranger = AuthUser {
            id: Uuid::new_v4(),
            username: "stranger".to_string(),
        };

        let result = toggle_publish(State(state), Extension(stranger), Path(Uuid::new_v4())).await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
