//! HTTP clients for the chat backend and the launcher's agent catalog.

use crate::error::ConsoleError;
use anp_core::chat_contracts::{
    ActionReply, AddBookmarkReply, AddBookmarkRequest, AgentCatalog, BookmarksReply,
    DiscoverReply, DiscoverRequest, HistoryReply, RunningStatus, SendReply, SendRequest,
};
use anp_core::{AgentProfile, ApiReply, Bookmark, HistoryEntry};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

fn build_client(timeout: Duration) -> Result<Client, ConsoleError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn endpoint(base: &Url, path: &str) -> Result<Url, ConsoleError> {
    base.join(path).map_err(|err| ConsoleError::InvalidUrl {
        value: format!("{base}{path}"),
        message: err.to_string(),
    })
}

fn ensure_success<R: ApiReply>(path: &str, reply: R) -> Result<R, ConsoleError> {
    if reply.success() {
        return Ok(reply);
    }
    warn!(
        event = "chat_api_rejected",
        path,
        message = reply.message().unwrap_or("")
    );
    Err(ConsoleError::backend(reply.message()))
}

#[derive(Clone, Debug)]
pub struct ChatApi {
    client: Client,
    base: Url,
}

impl ChatApi {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ConsoleError> {
        Ok(Self {
            client: build_client(timeout)?,
            base,
        })
    }

    async fn request<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ConsoleError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(event = "chat_api_request", method = %method, url = %url);
        let mut builder = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(|err| {
            warn!(event = "chat_api_transport_error", method = %method, url = %url, error = %err);
            err
        })?;
        let response = response.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConsoleError> {
        self.request::<(), T>(Method::GET, endpoint(&self.base, path)?, None)
            .await
    }

    async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, ConsoleError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::POST, endpoint(&self.base, path)?, body)
            .await
    }

    async fn post_action(&self, path: &str) -> Result<ActionReply, ConsoleError> {
        let reply: ActionReply = self.post::<(), _>(path, None).await?;
        ensure_success(path, reply)
    }

    pub async fn server_status(&self) -> Result<bool, ConsoleError> {
        let status: RunningStatus = self.get("/api/server/status").await?;
        Ok(status.running)
    }

    pub async fn chat_status(&self) -> Result<bool, ConsoleError> {
        let status: RunningStatus = self.get("/api/chat/status").await?;
        Ok(status.running)
    }

    pub async fn start_server(&self) -> Result<ActionReply, ConsoleError> {
        self.post_action("/api/server/start").await
    }

    pub async fn stop_server(&self) -> Result<ActionReply, ConsoleError> {
        self.post_action("/api/server/stop").await
    }

    pub async fn start_chat(&self) -> Result<ActionReply, ConsoleError> {
        self.post_action("/api/chat/start").await
    }

    pub async fn stop_chat(&self) -> Result<ActionReply, ConsoleError> {
        self.post_action("/api/chat/stop").await
    }

    pub async fn send(&self, request: &SendRequest) -> Result<SendReply, ConsoleError> {
        let path = "/api/chat/send";
        let reply: SendReply = self.post(path, Some(request)).await?;
        ensure_success(path, reply)
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, ConsoleError> {
        let path = "/api/chat/history";
        let reply: HistoryReply = self.get(path).await?;
        Ok(ensure_success(path, reply)?.history)
    }

    pub async fn clear_history(&self) -> Result<ActionReply, ConsoleError> {
        self.post_action("/api/chat/clear-history").await
    }

    pub async fn bookmarks(&self, agent_url: Option<&str>) -> Result<Vec<Bookmark>, ConsoleError> {
        let path = "/api/bookmarks";
        let mut url = endpoint(&self.base, path)?;
        if let Some(agent_url) = agent_url.filter(|value| !value.trim().is_empty()) {
            url.query_pairs_mut().append_pair("url", agent_url.trim());
        }
        let reply: BookmarksReply = self.request::<(), _>(Method::GET, url, None).await?;
        Ok(ensure_success(path, reply)?.bookmarks)
    }

    pub async fn add_bookmark(&self, name: &str) -> Result<Option<Bookmark>, ConsoleError> {
        let path = "/api/bookmarks/add";
        let request = AddBookmarkRequest {
            name: name.to_string(),
        };
        let reply: AddBookmarkReply = self.post(path, Some(&request)).await?;
        Ok(ensure_success(path, reply)?.bookmark)
    }

    pub async fn delete_bookmark(&self, id: &str) -> Result<ActionReply, ConsoleError> {
        let mut url = endpoint(&self.base, "/api/bookmarks")?;
        url.path_segments_mut()
            .map_err(|_| ConsoleError::InvalidUrl {
                value: self.base.to_string(),
                message: "base url cannot carry a path".to_string(),
            })?
            .push(id);
        let reply: ActionReply = self.request::<(), _>(Method::DELETE, url, None).await?;
        ensure_success("/api/bookmarks/{id}", reply)
    }

    /// Returns the discovery summary text.
    pub async fn discover(&self, request: &DiscoverRequest) -> Result<String, ConsoleError> {
        let path = "/api/find/";
        let reply: DiscoverReply = self.post(path, Some(request)).await?;
        let reply = ensure_success(path, reply)?;
        Ok(reply
            .discovery
            .map(|discovery| discovery.summary)
            .unwrap_or_default())
    }
}

#[derive(Clone, Debug)]
pub struct LauncherApi {
    client: Client,
    base: Url,
}

impl LauncherApi {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ConsoleError> {
        Ok(Self {
            client: build_client(timeout)?,
            base,
        })
    }

    pub async fn agents(&self) -> Result<Vec<AgentProfile>, ConsoleError> {
        let url = endpoint(&self.base, "/api/agents")?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        let catalog: AgentCatalog = response.json().await?;
        Ok(catalog.agents)
    }
}
