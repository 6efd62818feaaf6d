use super::object::{build_operator, HashSource, ObjectStore};
use crate::config::AzureSettings;
use crate::core::scanner::IgnoreRules;
use crate::error::{Result, SyncError};
use opendal::services::Azblob;
use reqwest::StatusCode;
use tracing::{debug, info};

const PROVIDER: &str = "Azure";
const MIN_CONTAINER_LEN: usize = 3;
const MAX_CONTAINER_LEN: usize = 63;

/// 容器检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Exists,
    /// 新建的容器是空的，旧的同步缓存不再可信
    Created,
}

/// Azure 容器信息，用于按需创建容器
#[derive(Debug, Clone)]
pub struct AzureContainer {
    name: String,
    endpoint: String,
    sas_token: Option<String>,
    client: reqwest::Client,
}

impl AzureContainer {
    pub fn new(name: &str, endpoint: &str, sas_token: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            sas_token: sas_token
                .map(|t| t.trim().trim_start_matches('?').to_string())
                .filter(|t| !t.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 创建容器的请求地址（含 SAS）
    fn create_url(&self) -> Result<String> {
        let sas = self.sas_token.as_deref().ok_or_else(|| {
            SyncError::configuration(
                PROVIDER,
                format!(
                    "container '{}' does not exist and no sasToken is configured to create it",
                    self.name
                ),
            )
        })?;
        Ok(format!(
            "{}/{}?restype=container&{}",
            self.endpoint,
            urlencoding::encode(&self.name),
            sas
        ))
    }

    pub async fn create(&self) -> Result<ContainerStatus> {
        let url = self.create_url()?;
        debug!("创建 Azure 容器: {}", self.name);

        let response = self
            .client
            .put(&url)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| SyncError::connectivity(PROVIDER, e.to_string()))?;

        status_to_result(&self.name, response.status())
    }
}

fn status_to_result(container: &str, status: StatusCode) -> Result<ContainerStatus> {
    match status {
        StatusCode::CREATED => {
            info!("Azure 容器已创建: {}", container);
            Ok(ContainerStatus::Created)
        }
        StatusCode::CONFLICT => Ok(ContainerStatus::Exists),
        StatusCode::FORBIDDEN => Err(SyncError::authentication(
            PROVIDER,
            format!(
                "permission denied creating container '{}'; check that the SAS token allows container creation",
                container
            ),
        )),
        other => Err(SyncError::connectivity(
            PROVIDER,
            format!("unexpected status {} creating container '{}'", other, container),
        )),
    }
}

/// 容器名：小写字母、数字和单个 -，以字母或数字开头结尾，长度 3..=63
pub fn sanitize_container_name(name: &str) -> Result<String> {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            sanitized.push(c);
        } else if !sanitized.is_empty() && !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }

    sanitized.truncate(MAX_CONTAINER_LEN);
    let mut sanitized = sanitized.trim_end_matches('-').to_string();
    if sanitized.is_empty() {
        return Err(SyncError::configuration(
            PROVIDER,
            format!("'{}' cannot be turned into a valid container name", name),
        ));
    }
    while sanitized.len() < MIN_CONTAINER_LEN {
        sanitized.push('0');
    }
    Ok(sanitized)
}

pub fn build(settings: &AzureSettings, vault_name: &str, ignore: IgnoreRules) -> Result<ObjectStore> {
    let container = settings
        .container
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map_or_else(|| sanitize_container_name(vault_name), sanitize_container_name)?;

    let endpoint = settings
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", settings.account.trim()));

    let mut builder = Azblob::default()
        .container(&container)
        .account_name(settings.account.trim())
        .account_key(settings.access_key.trim())
        .endpoint(&endpoint);

    if let Some(sas) = settings.sas_token.as_deref().filter(|s| !s.trim().is_empty()) {
        builder = builder.sas_token(sas.trim().trim_start_matches('?'));
    }

    let operator = build_operator(builder).map_err(|e| SyncError::configuration(PROVIDER, e.to_string()))?;
    let name = format!("azblob://{}/{}", settings.account.trim(), container);

    Ok(
        ObjectStore::new(operator, name, PROVIDER, HashSource::ContentMd5, ignore).with_container(
            AzureContainer::new(&container, &endpoint, settings.sas_token.as_deref()),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_container_name() {
        assert_eq!(sanitize_container_name("My Vault_2024").unwrap(), "my-vault-2024");
        assert_eq!(sanitize_container_name("notes").unwrap(), "notes");
        assert_eq!(sanitize_container_name("Über.Notes").unwrap(), "ber-notes");
        assert_eq!(sanitize_container_name("My  Notes").unwrap(), "my-notes");
        assert_eq!(sanitize_container_name("--a--b--").unwrap(), "a-b");
        assert_eq!(sanitize_container_name("X").unwrap(), "x00");
    }

    #[test]
    fn test_sanitize_container_name_length_limits() {
        let long = format!("{}-{}", "a".repeat(62), "b".repeat(10));
        let name = sanitize_container_name(&long).unwrap();
        assert_eq!(name, "a".repeat(62));

        let name = sanitize_container_name(&"vault".repeat(20)).unwrap();
        assert_eq!(name.len(), 63);

        assert!(matches!(
            sanitize_container_name("__ ..."),
            Err(SyncError::Configuration { .. })
        ));
        assert!(matches!(
            sanitize_container_name("日记"),
            Err(SyncError::Configuration { .. })
        ));
    }

    #[test]
    fn test_create_url_requires_sas() {
        let container = AzureContainer::new("notes", "https://acct.blob.core.windows.net/", None);
        assert!(matches!(
            container.create_url(),
            Err(SyncError::Configuration { .. })
        ));

        let container = AzureContainer::new(
            "notes",
            "https://acct.blob.core.windows.net/",
            Some("?sv=2022&sig=abc"),
        );
        assert_eq!(
            container.create_url().unwrap(),
            "https://acct.blob.core.windows.net/notes?restype=container&sv=2022&sig=abc"
        );
    }

    #[test]
    fn test_create_status_mapping() {
        assert_eq!(
            status_to_result("c", StatusCode::CREATED).unwrap(),
            ContainerStatus::Created
        );
        assert_eq!(
            status_to_result("c", StatusCode::CONFLICT).unwrap(),
            ContainerStatus::Exists
        );
        assert!(matches!(
            status_to_result("c", StatusCode::FORBIDDEN),
            Err(SyncError::Authentication { .. })
        ));
        assert!(matches!(
            status_to_result("c", StatusCode::BAD_GATEWAY),
            Err(SyncError::Connectivity { .. })
        ));
    }
}
