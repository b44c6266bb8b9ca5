use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use uuid::Uuid;

use crate::config::S3Config;
use crate::error::AppError;
use crate::utils::media_probe;

/// Blob store client. Credentials and endpoint are fixed at construction;
/// nothing here reads process-global state.
#[derive(Clone)]
pub struct S3Service {
    client: Client,
    pub bucket_name: String,
    public_base_url: String,
}

/// Result of a video blob upload: the durable URL plus the duration
/// ffprobe extracted from the binary.
#[derive(Debug, Clone)]
pub struct StoredVideo {
    pub url: String,
    pub duration_seconds: f64,
}

impl S3Service {
    pub fn new(config: &S3Config) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "manual_config",
        );

        let region = aws_sdk_s3::config::Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Self {
            client,
            bucket_name: config.bucket_name.clone(),
            public_base_url: config.public_base_url(),
        }
    }

    /// Upload a video binary. The buffer is probed for its duration before
    /// any bytes leave the process, so a clip ffprobe cannot read never
    /// reaches the bucket.
    pub async fn upload_video(
        &self,
        data: Vec<u8>,
        content_type: &str,
        ext: &str,
    ) -> Result<StoredVideo, AppError> {
        let duration_seconds = media_probe::probe_duration(&data).await?;

        let key = format!("videos/{}.{}", Uuid::new_v4(), ext);
        self.put_object(&key, data, content_type).await?;

        Ok(StoredVideo {
            url: self.object_url(&key),
            duration_seconds,
        })
    }

    /// Upload an image binary, returning its durable URL.
    pub async fn upload_image(
        &self,
        data: Vec<u8>,
        content_type: &str,
        ext: &str,
    ) -> Result<String, AppError> {
        let key = format!("thumbnails/{}.{}", Uuid::new_v4(), ext);
        self.put_object(&key, data, content_type).await?;
        Ok(self.object_url(&key))
    }

    pub async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .acl(aws_sdk_s3::types::ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| {
                eprintln!("S3 Upload Error: {:?}", e);
                AppError::InternalServerError(format!("Failed to upload file to S3: {}", e))
            })?;

        Ok(())
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                eprintln!("S3 Delete Error: {}", e);
                AppError::InternalServerError("Failed to delete file from S3".to_string())
            })?;

        Ok(())
    }

    /// Delete an object given the durable URL stored on a catalog record.
    pub async fn delete_by_url(&self, url: &str) -> Result<(), AppError> {
        let key = self
            .key_from_url(url)
            .ok_or_else(|| AppError::InternalServerError(format!("Unrecognized blob URL: {}", url)))?;
        self.delete_object(&key).await
    }

    /// Public URL for an object key.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Map a durable URL back to its object key. Handles both path-style
    /// (`endpoint/bucket/KEY`) and virtual-host style
    /// (`https://bucket.s3.region.amazonaws.com/KEY`) URLs.
    pub fn key_from_url(&self, url_str: &str) -> Option<String> {
        if let Some(idx) = url_str.find(&format!("/{}/", self.bucket_name)) {
            return Some(url_str[idx + self.bucket_name.len() + 2..].to_string());
        }
        let url = url::Url::parse(url_str).ok()?;
        let key = url.path().trim_start_matches('/');
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    pub async fn ensure_bucket_exists(&self) -> Result<(), AppError> {
        let resp = self.client.head_bucket().bucket(&self.bucket_name).send().await;

        match resp {
            Ok(_) => {
                // Bucket exists, ensure public policy
                self.set_public_policy().await?;
                Ok(())
            }
            Err(_) => {
                // Bucket doesn't exist or no access, try to create it
                println!("Bucket {} does not exist, attempting to create...", self.bucket_name);
                self.client
                    .create_bucket()
                    .bucket(&self.bucket_name)
                    .send()
                    .await
                    .map_err(|e| {
                        eprintln!("Failed to create bucket: {:?}", e);
                        AppError::InternalServerError(format!("Failed to create S3 bucket: {}", e))
                    })?;

                self.set_public_policy().await?;
                Ok(())
            }
        }
    }

    async fn set_public_policy(&self) -> Result<(), AppError> {
        let policy = format!(
            r#"{{
                "Version": "2012-10-17",
                "Statement": [
                    {{
                        "Sid": "PublicReadGetObject",
                        "Effect": "Allow",
                        "Principal": "*",
                        "Action": "s3:GetObject",
                        "Resource": "arn:aws:s3:::{}/*"
                    }}
                ]
            }}"#,
            self.bucket_name
        );

        self.client
            .put_bucket_policy()
            .bucket(&self.bucket_name)
            .policy(policy)
            .send()
            .await
            .map_err(|e| {
                eprintln!("Failed to set bucket policy: {:?}", e);
                AppError::InternalServerError(format!("Failed to set bucket policy: {}", e))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3Config;

    fn service(endpoint: Option<&str>) -> S3Service {
        S3Service::new(&S3Config {
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            region: "us-east-1".to_string(),
            bucket_name: "vsk-media".to_string(),
            endpoint: endpoint.map(str::to_string),
        })
    }

    #[test]
    fn object_url_uses_custom_endpoint_when_configured() {
        let s3 = service(Some("http://localhost:9000"));
        assert_eq!(
            s3.object_url("videos/abc.mp4"),
            "http://localhost:9000/vsk-media/videos/abc.mp4"
        );
    }

    #[test]
    fn object_url_defaults_to_virtual_host_style() {
        let s3 = service(None);
        assert_eq!(
            s3.object_url("videos/abc.mp4"),
            "https://vsk-media.s3.us-east-1.amazonaws.com/videos/abc.mp4"
        );
    }

    #[test]
    fn key_from_url_handles_path_style() {
        let s3 = service(Some("http://localhost:9000"));
        assert_eq!(
            s3.key_from_url("http://localhost:9000/vsk-media/videos/abc.mp4"),
            Some("videos/abc.mp4".to_string())
        );
    }

    #[test]
    fn key_from_url_handles_virtual_host_style() {
        let s3 = service(None);
        assert_eq!(
            s3.key_from_url("https://vsk-media.s3.us-east-1.amazonaws.com/thumbnails/t.png"),
            Some("thumbnails/t.png".to_string())
        );
    }

    #[test]
    fn key_from_url_rejects_garbage() {
        let s3 = service(None);
        assert_eq!(s3.key_from_url("not a url"), None);
    }
}
