use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::entities::video;
use crate::error::AppError;
use crate::state::AppState;

/// The upstream 206 framing headers relayed to the client verbatim. The
/// proxy never recomputes byte offsets; the blob store's answer is the
/// answer.
fn mirrored_headers(upstream: &HeaderMap) -> Vec<(HeaderName, HeaderValue)> {
    [
        header::CONTENT_RANGE,
        header::ACCEPT_RANGES,
        header::CONTENT_LENGTH,
    ]
    .into_iter()
    .filter_map(|name| upstream.get(&name).cloned().map(|value| (name, value)))
    .collect()
}

#[utoipa::path(
    get,
    path = "/videos/{id}/stream",
    tag = "Videos",
    params(
        ("id" = Uuid, Path, description = "Video ID"),
        ("Range" = String, Header, description = "HTTP byte range, e.g. bytes=0-1023")
    ),
    responses(
        (status = 206, description = "Partial video content"),
        (status = 400, description = "Missing Range header"),
        (status = 404, description = "Video not found or unpublished"),
        (status = 416, description = "Requested range not satisfiable"),
        (status = 500, description = "Streaming failure")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn stream_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    // Range is mandatory; there is no full-file fallback
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::BadRequest("Requires Range header".to_string()))?
        .to_string();

    // Unpublished content is never streamable through this path,
    // owner included
    let video = video::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .filter(|v| v.is_published)
        .ok_or(AppError::NotFound(
            "Video does not exist or is private".to_string(),
        ))?;

    // Forward the client's range verbatim; the blob store does the
    // byte math
    let upstream = state
        .http
        .get(&video.video_url)
        .header(header::RANGE, range)
        .send()
        .await
        .map_err(|e| {
            eprintln!("Stream | GET /videos/{}/stream | upstream error: {}", id, e);
            AppError::InternalServerError("Error while streaming video".to_string())
        })?;

    if upstream.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        return Err(AppError::RangeNotSatisfiable(
            "Requested range not satisfiable".to_string(),
        ));
    }

    if !upstream.status().is_success() {
        eprintln!(
            "Stream | GET /videos/{}/stream | upstream status {}",
            id,
            upstream.status()
        );
        return Err(AppError::InternalServerError(
            "Error while streaming video".to_string(),
        ));
    }

    let mut builder = Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, video.mime_type.as_str());

    for (name, value) in mirrored_headers(upstream.headers()) {
        builder = builder.header(name, value);
    }

    // Relay bytes as they arrive; nothing is buffered. A mid-stream
    // upstream error closes the connection, since headers are already
    // out the door.
    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| AppError::InternalServerError(format!("Failed to build stream response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3Config;
    use crate::services::s3::S3Service;
    use sea_orm::{DatabaseBackend, MockDatabase};

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

    fn sample_video(is_published: bool) -> video::Model {
        let now = chrono::Utc::now().naive_utc();
        video::Model {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Sample".to_string(),
            description: "Sample description".to_string(),
            video_url: "http://localhost:9000/vsk-test/videos/v.mp4".to_string(),
            thumbnail_url: "http://localhost:9000/vsk-test/thumbnails/t.jpg".to_string(),
            mime_type: "video/mp4".to_string(),
            duration: 40,
            views: 0,
            is_published,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn mirrors_exactly_the_partial_content_framing_headers() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_RANGE, "bytes 0-1023/4096".parse().unwrap());
        upstream.insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());
        upstream.insert(header::CONTENT_LENGTH, "1024".parse().unwrap());
        upstream.insert(header::ETAG, "\"abc\"".parse().unwrap());
        upstream.insert(header::SERVER, "UpstreamBlobStore".parse().unwrap());

        let mirrored = mirrored_headers(&upstream);

        assert_eq!(mirrored.len(), 3);
        assert!(mirrored
            .iter()
            .any(|(n, v)| *n == header::CONTENT_RANGE && v == "bytes 0-1023/4096"));
        assert!(mirrored
            .iter()
            .any(|(n, v)| *n == header::ACCEPT_RANGES && v == "bytes"));
        assert!(mirrored
            .iter()
            .any(|(n, v)| *n == header::CONTENT_LENGTH && v == "1024"));
        assert!(!mirrored.iter().any(|(n, _)| *n == header::ETAG));
    }

    #[test]
    fn absent_upstream_headers_are_not_invented() {
        let mirrored = mirrored_headers(&HeaderMap::new());
        assert!(mirrored.is_empty());
    }

    #[tokio::test]
    async fn missing_range_header_is_rejected_before_any_lookup() {
        // No query results appended: a catalog read would error the call
        // with a different variant than BadRequest
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let state = test_state(db);

        let result = stream_video(State(state), Path(Uuid::new_v4()), HeaderMap::new()).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn unpublished_videos_are_never_streamed() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_video(false)]])
            .into_connection();
        let state = test_state(db);

        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, "bytes=0-1023".parse().unwrap());

        let result = stream_video(State(state), Path(Uuid::new_v4()), headers).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn unknown_videos_are_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<video::Model>::new()])
            .into_connection();
        let state = test_state(db);

        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, "bytes=0-1023".parse().unwrap());

        let result = stream_video(State(state), Path(Uuid::new_v4()), headers).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
