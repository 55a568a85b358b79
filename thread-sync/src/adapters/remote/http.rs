use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ThreadDelta, ThreadPage, ThreadsApi};
use crate::config::ServerConfig;
use crate::types::error::SyncError;
use crate::types::{RemoteThread, RemoteThreadRef};
use crate::utils::APP_NAME;

#[derive(Deserialize)]
struct PageResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    threads: Vec<RemoteThread>,
    count: Option<usize>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct SyncResponse {
    #[serde(default)]
    success: bool,
    threads: Option<SyncThreads>,
    error: Option<String>,
}

#[derive(Deserialize, Default)]
struct SyncThreads {
    #[serde(default)]
    update: Vec<RemoteThread>,
    #[serde(default)]
    remove: Vec<RemoteThreadRef>,
}

/// REST client for `chat.getThreadsList` / `chat.syncThreadsList`
pub struct HttpThreadsApi {
    base_url: Url,
    user_id: String,
    auth_token: String,
    http_client: reqwest::Client,
}

impl HttpThreadsApi {
    pub fn new(config: &ServerConfig) -> Result<Self, SyncError> {
        let mut base = config.url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| SyncError::Config(format!("Invalid server url {}: {}", config.url, e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            base_url,
            user_id: config.user_id.clone(),
            auth_token: config.auth_token.clone(),
            http_client,
        })
    }

    pub fn page_url(&self, parent_id: &str, page_size: usize, offset: usize) -> Result<Url, SyncError> {
        let mut url = self.endpoint("api/v1/chat.getThreadsList")?;
        url.query_pairs_mut()
            .append_pair("rid", parent_id)
            .append_pair("count", &page_size.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }

    pub fn delta_url(&self, parent_id: &str, since: DateTime<Utc>) -> Result<Url, SyncError> {
        let mut url = self.endpoint("api/v1/chat.syncThreadsList")?;
        url.query_pairs_mut()
            .append_pair("rid", parent_id)
            .append_pair("updatedSince", &since.to_rfc3339_opts(SecondsFormat::Millis, true));
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn get_text(&self, url: Url) -> Result<String, SyncError> {
        debug!("GET {}", url);
        let resp = self
            .http_client
            .get(url)
            .header("X-User-Id", &self.user_id)
            .header("X-Auth-Token", &self.auth_token)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status.is_server_error() {
            return Err(SyncError::Transport(format!("Server returned {}", status)));
        }
        Ok(body)
    }
}

pub(crate) fn parse_page(body: &str) -> Result<ThreadPage, SyncError> {
    let resp: PageResponse = serde_json::from_str(body)?;
    if !resp.success {
        return Err(SyncError::Transport(
            resp.error.unwrap_or_else(|| "chat.getThreadsList failed".to_string()),
        ));
    }
    let count = resp.count.unwrap_or(resp.threads.len());
    Ok(ThreadPage {
        items: resp.threads,
        count,
    })
}

pub(crate) fn parse_delta(body: &str) -> Result<ThreadDelta, SyncError> {
    let resp: SyncResponse = serde_json::from_str(body)?;
    if !resp.success {
        return Err(SyncError::Transport(
            resp.error.unwrap_or_else(|| "chat.syncThreadsList failed".to_string()),
        ));
    }
    let threads = resp.threads.unwrap_or_default();
    Ok(ThreadDelta {
        updated: threads.update,
        removed: threads.remove,
    })
}

#[async_trait]
impl ThreadsApi for HttpThreadsApi {
    async fn fetch_page(
        &self,
        parent_id: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<ThreadPage, SyncError> {
        let body = self.get_text(self.page_url(parent_id, page_size, offset)?).await?;
        parse_page(&body)
    }

    async fn fetch_delta(
        &self,
        parent_id: &str,
        since: DateTime<Utc>,
    ) -> Result<ThreadDelta, SyncError> {
        let body = self.get_text(self.delta_url(parent_id, since)?).await?;
        parse_delta(&body)
    }
}
