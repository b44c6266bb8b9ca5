use sea_orm::DatabaseConnection;

use crate::services::s3::S3Service;

/// Shared application state. The blob-store client and the upstream HTTP
/// client are constructed once at startup and cloned into handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub blob_store: S3Service,
    pub http: reqwest::Client,
}
