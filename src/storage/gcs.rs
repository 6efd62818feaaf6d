use super::object::{build_operator, HashSource, ObjectStore};
use crate::config::GcpSettings;
use crate::core::scanner::IgnoreRules;
use crate::error::{Result, SyncError};
use base64::Engine;
use opendal::services::Gcs;
use serde::Serialize;

const PROVIDER: &str = "GCP";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Serialize)]
struct ServiceAccount<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    client_email: &'a str,
    private_key: String,
    token_uri: &'a str,
}

/// 由邮箱和私钥拼出 service account JSON，并做 base64 编码
fn encode_credential(client_email: &str, private_key: &str) -> Result<String> {
    let account = ServiceAccount {
        kind: "service_account",
        client_email: client_email.trim(),
        // 从配置里粘贴的私钥常带有转义的换行
        private_key: private_key.trim().replace("\\n", "\n"),
        token_uri: TOKEN_URI,
    };
    let json = serde_json::to_vec(&account)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

pub fn build(settings: &GcpSettings, vault_name: &str, ignore: IgnoreRules) -> Result<ObjectStore> {
    let bucket = settings.bucket.trim();
    let root = format!("/{}", vault_name);
    let credential = encode_credential(&settings.client_email, &settings.private_key)?;

    let mut builder = Gcs::default()
        .bucket(bucket)
        .credential(&credential)
        .root(&root);

    if let Some(ep) = settings
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        builder = builder.endpoint(ep);
    }

    let operator = build_operator(builder).map_err(|e| SyncError::configuration(PROVIDER, e.to_string()))?;
    let name = format!("gcs://{}{}", bucket, root);

    Ok(ObjectStore::new(operator, name, PROVIDER, HashSource::ContentMd5, ignore))
}
