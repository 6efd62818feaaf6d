use super::object::{build_operator, HashSource, ObjectStore};
use crate::config::AwsSettings;
use crate::core::scanner::IgnoreRules;
use crate::error::{Result, SyncError};
use opendal::services::S3;
use tracing::{debug, warn};

const PROVIDER: &str = "S3";
const DEFAULT_ENDPOINT: &str = "https://s3.amazonaws.com";
const DEFAULT_REGION: &str = "us-east-1";

/// 未配置区域时自动探测桶所在区域
async fn resolve_region(settings: &AwsSettings, endpoint: &str) -> String {
    let region = settings.region.trim();
    if !region.is_empty() {
        return region.to_string();
    }

    match S3::detect_region(endpoint, settings.bucket.trim()).await {
        Some(region) => {
            debug!("探测到 S3 区域: {}", region);
            region
        }
        None => {
            warn!("无法探测 S3 区域，使用默认区域 {}", DEFAULT_REGION);
            DEFAULT_REGION.to_string()
        }
    }
}

pub async fn build(settings: &AwsSettings, vault_name: &str, ignore: IgnoreRules) -> Result<ObjectStore> {
    let bucket = settings.bucket.trim();
    let endpoint = settings
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let region = resolve_region(settings, endpoint.unwrap_or(DEFAULT_ENDPOINT)).await;
    let root = format!("/{}", vault_name);

    let mut builder = S3::default()
        .bucket(bucket)
        .region(&region)
        .access_key_id(settings.access_key.trim())
        .secret_access_key(settings.secret_key.trim())
        .root(&root);

    if let Some(ep) = endpoint {
        builder = builder.endpoint(ep);
    }

    let operator = build_operator(builder).map_err(|e| SyncError::configuration(PROVIDER, e.to_string()))?;

    let name = format!("s3://{}{}", bucket, root);

    Ok(ObjectStore::new(operator, name, PROVIDER, HashSource::ETag, ignore))
}
