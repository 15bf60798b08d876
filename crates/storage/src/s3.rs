//! S3-compatible backend: a folder is a key prefix and a file id is the object key.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, Client};
use bytes::Bytes;

use crate::{effective_content_type, safe_component, Storage, StorageError, StoredFile};

pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(bucket: String) -> Self {
        let region_provider = RegionProviderChain::default_provider().or_else(Region::new("us-east-1"));
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        let client = Client::new(&config);
        Self { client, bucket }
    }

    fn folder_prefix(folder_id: &str) -> String {
        let trimmed = folder_id.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        }
    }
}

fn backend_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

#[async_trait]
impl Storage for S3Storage {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn upload(
        &self,
        data: Bytes,
        filename: &str,
        content_type: Option<&str>,
        folder_id: &str,
    ) -> Result<String, StorageError> {
        let name = safe_component(filename)?;
        let key = format!("{}{}", Self::folder_prefix(folder_id), name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(effective_content_type(content_type, name))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(backend_error)?;

        Ok(key)
    }

    async fn list(&self, folder_id: &str) -> Result<Vec<StoredFile>, StorageError> {
        let prefix = Self::folder_prefix(folder_id);
        let mut files = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .delimiter("/");
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let response = request.send().await.map_err(backend_error)?;

            for obj in response.contents() {
                let Some(key) = obj.key() else { continue };
                // Skip the folder placeholder object
                if key == prefix {
                    continue;
                }
                let name = key.strip_prefix(&prefix).unwrap_or(key).to_string();
                files.push(StoredFile {
                    id: key.to_string(),
                    name,
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(files)
    }

    async fn health_check(&self) -> Result<u64, StorageError> {
        let start = std::time::Instant::now();
        // list_objects_v2 with max_keys=1 as a lightweight connectivity test
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(start.elapsed().as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_prefix() {
        assert_eq!(S3Storage::folder_prefix("references"), "references/");
        assert_eq!(S3Storage::folder_prefix("/references/"), "references/");
        assert_eq!(S3Storage::folder_prefix(""), "");
    }
}
