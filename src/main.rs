mod config;
mod entities;
mod error;
mod middleware;
mod pagination;
mod routes;
mod services;
mod state;
mod utils;

use migration::{Migrator, MigratorTrait};
use sea_orm::Database;

use config::get_config;
use routes::create_routes;
use services::s3::S3Service;
use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = get_config();

    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    // Blob-store credentials are read once and injected here; nothing
    // downstream touches provider configuration again.
    let blob_store = S3Service::new(&config.s3);
    if let Err(e) = blob_store.ensure_bucket_exists().await {
        eprintln!("Startup | bucket check failed: {:?}", e);
    }

    let state = AppState {
        db,
        blob_store,
        http: reqwest::Client::new(),
    };

    // build our application using the routes module
    let app = create_routes(state);

    // run our app with hyper, listening globally on port 3000
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    println!("Listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
