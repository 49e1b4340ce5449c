use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ProviderSettings;
use crate::snapshot::{ConfigSnapshot, Message, ParamValue};

/// Why a single fetch did not produce a snapshot
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to reach provider: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode provider payload: {0}")]
    Decode(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of configuration snapshots
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Fetch the current configuration
    async fn fetch(&self) -> Result<ConfigSnapshot, FetchError>;

    /// Short description used in log lines
    fn name(&self) -> &str;
}

/// Payload shape shared by every provider
#[derive(Debug, Default, Deserialize)]
struct ProviderPayload {
    #[serde(default)]
    model: ModelPayload,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(rename = "_ldMeta", default)]
    meta: Option<MetaPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    parameters: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Deserialize)]
struct MetaPayload {
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl From<ProviderPayload> for ConfigSnapshot {
    fn from(payload: ProviderPayload) -> Self {
        let enabled = payload.meta.map_or(true, |meta| meta.enabled);
        ConfigSnapshot::new(payload.model.name)
            .with_parameters(payload.model.parameters)
            .with_messages(payload.messages)
            .with_enabled(enabled)
    }
}

/// Decode a JSON provider payload
pub fn decode_json(bytes: &[u8]) -> Result<ConfigSnapshot, FetchError> {
    serde_json::from_slice::<ProviderPayload>(bytes)
        .map(ConfigSnapshot::from)
        .map_err(|e| FetchError::Decode(e.to_string()))
}

/// Decode a YAML provider payload
pub fn decode_yaml(content: &str) -> Result<ConfigSnapshot, FetchError> {
    serde_yaml::from_str::<ProviderPayload>(content)
        .map(ConfigSnapshot::from)
        .map_err(|e| FetchError::Decode(e.to_string()))
}

/// Fetches snapshots from the remote configuration service
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    context_key: String,
}

impl HttpProvider {
    /// Create a client for the remote service. Fails when no API key is configured.
    pub fn new(
        base_url: &str,
        api_key: &str,
        config_key: &str,
        context_key: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("An API key is required for the http provider");
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let url = format!(
            "{}/api/v1/ai-configs/{}/evaluate",
            base_url.trim_end_matches('/'),
            config_key
        );

        Ok(Self {
            client,
            url,
            api_key: api_key.to_string(),
            context_key: context_key.to_string(),
        })
    }
}

#[async_trait]
impl ConfigProvider for HttpProvider {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<ConfigSnapshot, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("context", self.context_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        debug!("Received {} byte payload from provider", bytes.len());
        decode_json(&bytes)
    }

    fn name(&self) -> &str {
        &self.url
    }
}

/// Reads snapshots from a local file on every fetch
pub struct FileProvider {
    path: PathBuf,
    name: String,
}

impl FileProvider {
    /// Create a provider for the given file. The file must exist at startup.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("Provider file does not exist: {}", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            name: path.display().to_string(),
        })
    }

    fn is_json(&self) -> bool {
        self.path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
    }
}

#[async_trait]
impl ConfigProvider for FileProvider {
    async fn fetch(&self) -> Result<ConfigSnapshot, FetchError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FetchError::Io {
                path: self.path.clone(),
                source,
            })?;

        if self.is_json() {
            decode_json(content.as_bytes())
        } else {
            decode_yaml(&content)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build the provider selected in the configuration
pub fn build_provider(
    settings: &ProviderSettings,
    fetch_timeout: Duration,
) -> Result<Arc<dyn ConfigProvider>> {
    let provider: Arc<dyn ConfigProvider> = match settings {
        ProviderSettings::Http {
            base_url,
            api_key,
            config_key,
            context_key,
        } => Arc::new(HttpProvider::new(
            base_url,
            api_key,
            config_key,
            context_key,
            fetch_timeout,
        )?),
        ProviderSettings::File { path } => Arc::new(FileProvider::new(path)?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Role;
    use hyper::server::conn::Http;
    use hyper::service::service_fn;
    use hyper::{Body, Request, Response, StatusCode};
    use std::io::Write;
    use std::net::SocketAddr;
    use tempfile::NamedTempFile;
    use tokio::net::TcpListener;

    const PAYLOAD: &str = r#"{
        "model": { "name": "gpt-x", "parameters": { "temperature": 0.2, "maxTokens": 500 } },
        "messages": [ { "role": "system", "content": "You are helpful." } ],
        "_ldMeta": { "enabled": true }
    }"#;

    /// Serve a single connection that answers the evaluate endpoint
    async fn serve_provider(status: StatusCode, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let service = service_fn(move |req: Request<Body>| async move {
                    let authorized = req
                        .headers()
                        .get("authorization")
                        .map_or(false, |v| v == "sdk-test");
                    let routed = req.uri().path() == "/api/v1/ai-configs/chatbot/evaluate"
                        && req.uri().query() == Some("context=user-key");

                    let status = match (authorized, routed) {
                        (false, _) => StatusCode::UNAUTHORIZED,
                        (_, false) => StatusCode::NOT_FOUND,
                        _ => status,
                    };
                    Ok::<_, hyper::Error>(
                        Response::builder()
                            .status(status)
                            .body(Body::from(body))
                            .unwrap(),
                    )
                });
                let _ = Http::new().serve_connection(stream, service).await;
            }
        });

        addr
    }

    fn http_provider(addr: SocketAddr) -> HttpProvider {
        HttpProvider::new(
            &format!("http://{}/", addr),
            "sdk-test",
            "chatbot",
            "user-key",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_full_payload() {
        let snapshot = decode_json(PAYLOAD.as_bytes()).unwrap();

        assert_eq!(snapshot.model_name(), "gpt-x");
        assert_eq!(snapshot.temperature().unwrap(), 0.2);
        assert_eq!(snapshot.max_tokens().unwrap(), 500);
        assert_eq!(snapshot.messages().len(), 1);
        assert_eq!(snapshot.messages()[0].role, Role::System);
        assert!(snapshot.enabled());
    }

    #[test]
    fn test_decode_empty_payload() {
        let snapshot = decode_json(b"{}").unwrap();

        assert_eq!(snapshot.model_name(), "");
        assert!(snapshot.parameters().is_empty());
        assert!(snapshot.messages().is_empty());
        assert!(snapshot.enabled());
    }

    #[test]
    fn test_decode_disabled_payload() {
        let snapshot = decode_json(br#"{"_ldMeta": {"enabled": false}}"#).unwrap();
        assert!(!snapshot.enabled());
    }

    #[test]
    fn test_decode_invalid_payload() {
        let result = decode_json(b"not json");
        assert!(matches!(result, Err(FetchError::Decode(_))));

        let result = decode_json(br#"{"messages": [{"role": "robot", "content": "hi"}]}"#);
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_http_provider_requires_api_key() {
        let result = HttpProvider::new(
            "https://config.example.com",
            "  ",
            "chatbot",
            "user-key",
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_provider_fetch() {
        let addr = serve_provider(StatusCode::OK, PAYLOAD).await;
        let provider = http_provider(addr);

        let snapshot = provider.fetch().await.unwrap();
        assert_eq!(snapshot.model_name(), "gpt-x");
        assert_eq!(snapshot.max_tokens().unwrap(), 500);
    }

    #[tokio::test]
    async fn test_http_provider_error_status() {
        let addr = serve_provider(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let provider = http_provider(addr);

        match provider.fetch().await {
            Err(FetchError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_provider_unreachable() {
        // Bind then drop to get a port nothing listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let provider = http_provider(addr);

        let result = provider.fetch().await;
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn test_file_provider_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "model:").unwrap();
        writeln!(file, "  name: local-model").unwrap();
        writeln!(file, "  parameters:").unwrap();
        writeln!(file, "    temperature: 0.9").unwrap();
        writeln!(file, "messages:").unwrap();
        writeln!(file, "  - role: user").unwrap();
        writeln!(file, "    content: Hello").unwrap();

        let provider = FileProvider::new(file.path()).unwrap();
        let snapshot = provider.fetch().await.unwrap();

        assert_eq!(snapshot.model_name(), "local-model");
        assert_eq!(snapshot.temperature().unwrap(), 0.9);
        assert_eq!(snapshot.messages()[0].content, "Hello");
    }

    #[tokio::test]
    async fn test_file_provider_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{}", PAYLOAD).unwrap();

        let provider = FileProvider::new(file.path()).unwrap();
        let snapshot = provider.fetch().await.unwrap();

        assert_eq!(snapshot.model_name(), "gpt-x");
    }

    #[tokio::test]
    async fn test_file_provider_removed_after_start() {
        let file = NamedTempFile::new().unwrap();
        let provider = FileProvider::new(file.path()).unwrap();
        drop(file);

        let result = provider.fetch().await;
        assert!(matches!(result, Err(FetchError::Io { .. })));
    }

    #[test]
    fn test_build_provider_missing_file() {
        let settings = ProviderSettings::File {
            path: PathBuf::from("/nonexistent/ai-config.yaml"),
        };
        assert!(build_provider(&settings, Duration::from_secs(5)).is_err());
    }
}
