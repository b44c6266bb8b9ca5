mod comments;
mod home;
mod likes;
mod stream;
mod videos;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

// Define the OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // General endpoints
        home::root,
        // Video catalog and pipeline
        videos::upload_video,
        videos::list_videos,
        videos::get_video,
        videos::update_video,
        videos::delete_video,
        videos::toggle_publish,
        videos::update_watch_time,
        stream::stream_video,
        // Engagement
        comments::write_comment,
        comments::list_comments,
        likes::toggle_like,
    ),
    components(
        schemas(
            videos::VideoResponse,
            videos::VideoDetailResponse,
            videos::UpdateVideoRequest,
            videos::PublishStatusResponse,
            videos::WatchTimeRequest,
            videos::WatchTimeResponse,
            comments::WriteCommentRequest,
            comments::CommentResponse,
            likes::ToggleLikeResponse,
        )
    ),
    tags(
        (name = "General", description = "General API information"),
        (name = "Videos", description = "Video upload, catalog, publishing and streaming"),
        (name = "Engagement", description = "Comments and likes attached to videos")
    ),
    info(
        title = "VideoStreamKit API",
        version = "0.1.0",
        description = "A Rust/Axum video-sharing backend: multipart uploads into blob storage, a publish lifecycle, byte-range streaming and watch-time view accounting",
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

// Add security scheme for JWT Bearer tokens
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer
                )
            ),
        );
    }
}

pub fn create_routes(state: AppState) -> Router {
    // Swagger UI (stateless)
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    // Everything under /videos requires an authenticated caller
    let video_routes = Router::new()
        .route(
            "/videos",
            post(videos::upload_video).get(videos::list_videos),
        )
        .route(
            "/videos/{id}",
            get(videos::get_video)
                .patch(videos::update_video)
                .delete(videos::delete_video),
        )
        .route("/videos/{id}/publish", patch(videos::toggle_publish))
        .route("/videos/{id}/watch-time", post(videos::update_watch_time))
        .route("/videos/{id}/stream", get(stream::stream_video))
        .route(
            "/videos/{id}/comments",
            post(comments::write_comment).get(comments::list_comments),
        )
        .route("/videos/{id}/like", post(likes::toggle_like))
        // The upload route carries the whole video in one multipart body;
        // axum's 2 MiB default would reject it long before the size check
        .layer(DefaultBodyLimit::max(videos::MAX_VIDEO_BYTES + 8 * 1024 * 1024))
        .layer(middleware::from_fn(auth_middleware));

    let app_routes = Router::new()
        .route("/", get(home::root))
        .merge(video_routes)
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Merge Swagger UI (which has no state) with the rest
    Router::new()
        .merge(swagger_router)
        .merge(app_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3Config;
    use crate::services::s3::S3Service;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
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

    #[tokio::test]
    async fn video_routes_require_a_bearer_token() {
        let app = create_routes(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/videos")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_bearer_tokens_are_rejected() {
        let app = create_routes(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/videos")
                    .header("Authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn home_page_is_public() {
        let app = create_routes(test_state());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
