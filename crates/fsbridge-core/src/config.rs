//! Configuration loading and HTTP client construction

use crate::error::BridgeError;
use fsbridge_types::{DownloaderConfig, ProxyMode, ProxySettings};
use reqwest::{Client, NoProxy, Proxy};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Load settings from a JSON file, falling back to defaults when it doesn't exist
pub async fn load_config(path: &Path) -> Result<DownloaderConfig, BridgeError> {
    if !fs::try_exists(path).await? {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(DownloaderConfig::default());
    }

    let content = fs::read_to_string(path).await?;
    let config: DownloaderConfig = serde_json::from_str(&content)
        .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
    validate(&config)?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Save settings as pretty-printed JSON, creating parent directories
pub async fn save_config(path: &Path, config: &DownloaderConfig) -> Result<(), BridgeError> {
    validate(config)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| BridgeError::Serialization(e.to_string()))?;
    fs::write(path, content).await?;

    Ok(())
}

fn validate(config: &DownloaderConfig) -> Result<(), BridgeError> {
    if config.chunk_size == 0 {
        return Err(BridgeError::Config("chunk_size must be greater than zero".to_string()));
    }
    if config.event_capacity == 0 {
        return Err(BridgeError::Config("event_capacity must be greater than zero".to_string()));
    }
    if config.proxy.mode == ProxyMode::Manual
        && config.proxy.http_proxy.is_none()
        && config.proxy.https_proxy.is_none()
    {
        return Err(BridgeError::Config(
            "manual proxy mode needs http_proxy or https_proxy".to_string(),
        ));
    }
    Ok(())
}

/// Build the HTTP client shared by all download jobs
pub fn build_client(config: &DownloaderConfig) -> Result<Client, BridgeError> {
    let builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

    let builder = match config.proxy.mode {
        ProxyMode::System => builder,
        ProxyMode::None => builder.no_proxy(),
        ProxyMode::Manual => {
            let mut builder = builder;
            for proxy in manual_proxies(&config.proxy)? {
                builder = builder.proxy(proxy);
            }
            builder
        }
    };

    builder
        .build()
        .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {}", e)))
}

fn manual_proxies(settings: &ProxySettings) -> Result<Vec<Proxy>, BridgeError> {
    let mut proxies = Vec::new();

    if let Some(url) = &settings.http_proxy {
        proxies.push(configure_proxy(Proxy::http(url.as_str())?, settings));
    }
    if let Some(url) = &settings.https_proxy {
        proxies.push(configure_proxy(Proxy::https(url.as_str())?, settings));
    }

    Ok(proxies)
}

fn configure_proxy(proxy: Proxy, settings: &ProxySettings) -> Proxy {
    let proxy = match (&settings.username, &settings.password) {
        (Some(user), Some(pass)) => proxy.basic_auth(user, pass),
        _ => proxy,
    };
    proxy.no_proxy(settings.no_proxy.as_deref().and_then(NoProxy::from_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config, DownloaderConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = DownloaderConfig {
            chunk_size: 4096,
            fail_on_http_error: true,
            ..DownloaderConfig::default()
        };
        save_config(&path, &config).await.unwrap();

        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded.chunk_size, 4096);
        assert!(loaded.fail_on_http_error);
    }

    #[tokio::test]
    async fn test_rejects_zero_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{ "chunk_size": 0 }"#).await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[tokio::test]
    async fn test_malformed_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        assert!(matches!(load_config(&path).await, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_build_client_proxy_modes() {
        assert_ok!(build_client(&DownloaderConfig::default()));

        let mut config = DownloaderConfig::default();
        config.proxy.mode = ProxyMode::None;
        assert_ok!(build_client(&config));

        config.proxy.mode = ProxyMode::Manual;
        config.proxy.http_proxy = Some("http://127.0.0.1:3128".to_string());
        config.proxy.no_proxy = Some("localhost,127.0.0.1".to_string());
        assert_ok!(build_client(&config));
    }

    #[tokio::test]
    async fn test_save_rejects_manual_proxy_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DownloaderConfig::default();
        config.proxy.mode = ProxyMode::Manual;

        assert_err!(save_config(&dir.path().join("config.json"), &config).await);
    }
}
