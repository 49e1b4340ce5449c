use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for the display service
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Seconds between provider fetches
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Seconds a single provider fetch may take
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: u64,
    /// Where snapshots come from
    pub provider: ProviderSettings,
}

/// Provider selection and its connection details
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderSettings {
    /// Remote configuration service
    Http {
        base_url: String,
        #[serde(default)]
        api_key: String,
        config_key: String,
        #[serde(default = "default_context_key")]
        context_key: String,
    },
    /// Local YAML or JSON file, re-read on every tick
    File { path: PathBuf },
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Default refresh interval in seconds
fn default_refresh_interval() -> u64 {
    5
}

/// Default fetch timeout in seconds
fn default_fetch_timeout() -> u64 {
    5
}

fn default_context_key() -> String {
    String::from("user-key")
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    /// Replace the HTTP provider's API key. Has no effect for other providers.
    pub fn override_api_key(&mut self, key: String) {
        if let ProviderSettings::Http { api_key, .. } = &mut self.provider {
            *api_key = key;
        }
    }

    /// Reject values the refresh task or provider cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval == 0 {
            bail!("refresh_interval must be greater than zero");
        }
        if self.fetch_timeout == 0 {
            bail!("fetch_timeout must be greater than zero");
        }
        if let ProviderSettings::Http {
            base_url,
            config_key,
            ..
        } = &self.provider
        {
            if base_url.trim().is_empty() {
                bail!("provider base_url must not be empty");
            }
            if config_key.trim().is_empty() {
                bail!("provider config_key must not be empty");
            }
        }
        Ok(())
    }
}

/// Load configuration from the specified path
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    info!("Loading configuration from {}", path.display());

    let mut file = File::open(path)
        .with_context(|| format!("Failed to open config file: {}", path.display()))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    debug!(
        "Loaded configuration: listen={}, refresh_interval={}s, fetch_timeout={}s",
        config.listen, config.refresh_interval, config.fetch_timeout
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_http_config_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "provider:").unwrap();
        writeln!(file, "  type: http").unwrap();
        writeln!(file, "  base_url: https://config.example.com").unwrap();
        writeln!(file, "  api_key: sdk-123").unwrap();
        writeln!(file, "  config_key: ai-config--chatbot").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.provider,
            ProviderSettings::Http {
                base_url: "https://config.example.com".to_string(),
                api_key: "sdk-123".to_string(),
                config_key: "ai-config--chatbot".to_string(),
                context_key: "user-key".to_string(),
            }
        );
    }

    #[test]
    fn test_load_file_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "listen: 127.0.0.1:9090").unwrap();
        writeln!(file, "refresh_interval: 2").unwrap();
        writeln!(file, "fetch_timeout: 1").unwrap();
        writeln!(file, "provider:").unwrap();
        writeln!(file, "  type: file").unwrap();
        writeln!(file, "  path: /tmp/ai-config.yaml").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listen.port(), 9090);
        assert_eq!(config.refresh_interval(), Duration::from_secs(2));
        assert_eq!(
            config.provider,
            ProviderSettings::File {
                path: PathBuf::from("/tmp/ai-config.yaml")
            }
        );
    }

    #[test]
    fn test_example_config_uses_placeholder_host() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.yml");

        let config = load_config(&path).unwrap();
        match config.provider {
            ProviderSettings::Http {
                base_url,
                config_key,
                ..
            } => {
                assert_eq!(base_url, "https://app.example.com");
                assert_eq!(config_key, "ai-config--ai-new-model-chatbot");
            }
            other => panic!("unexpected provider: {:?}", other),
        }
    }

    #[test]
    fn test_load_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml").unwrap();

        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "refresh_interval: 0").unwrap();
        writeln!(file, "provider:").unwrap();
        writeln!(file, "  type: file").unwrap();
        writeln!(file, "  path: config.yaml").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("refresh_interval"));
    }

    #[test]
    fn test_empty_config_key_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "provider:").unwrap();
        writeln!(file, "  type: http").unwrap();
        writeln!(file, "  base_url: https://config.example.com").unwrap();
        writeln!(file, "  config_key: \"\"").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("config_key"));
    }

    #[test]
    fn test_override_api_key() {
        let mut config = Config {
            listen: default_listen(),
            refresh_interval: 5,
            fetch_timeout: 5,
            provider: ProviderSettings::Http {
                base_url: "https://config.example.com".to_string(),
                api_key: String::new(),
                config_key: "chatbot".to_string(),
                context_key: default_context_key(),
            },
        };

        config.override_api_key("sdk-from-env".to_string());

        match config.provider {
            ProviderSettings::Http { api_key, .. } => assert_eq!(api_key, "sdk-from-env"),
            other => panic!("unexpected provider: {:?}", other),
        }
    }
}
