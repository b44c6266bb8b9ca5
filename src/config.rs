use std::env;
use std::sync::OnceLock;

/// Blob-store provider settings, carved out of [`Config`] so they can be
/// handed to `S3Service` at construction instead of read ambiently.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub bucket_name: String,
    /// Custom endpoint (MinIO etc.); AWS proper when unset.
    pub endpoint: Option<String>,
}

impl S3Config {
    /// Public base URL objects in the bucket are reachable under.
    pub fn public_base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket_name),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket_name, self.region),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub s3: S3Config,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let s3 = S3Config {
            access_key_id: env::var("AWS_ACCESS_KEY_ID").expect("AWS_ACCESS_KEY_ID must be set"),
            secret_access_key: env::var("AWS_SECRET_ACCESS_KEY")
                .expect("AWS_SECRET_ACCESS_KEY must be set"),
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket_name: env::var("S3_BUCKET_NAME").expect("S3_BUCKET_NAME must be set"),
            endpoint: env::var("S3_ENDPOINT").ok(),
        };

        Self {
            database_url,
            jwt_secret,
            s3,
        }
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}
