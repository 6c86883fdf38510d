//! Collaborators the bridge talks to on the host side.
//!
//! Rendering, panels, the realtime transport and the network are owned by
//! the embedding application. Capabilities reach them only through these
//! traits, bundled in [`HostServices`].

use crate::blocks::BlockStore;
use crate::logging::{LogSink, NullSink};
use futures::FutureExt;
use futures::future::BoxFuture;
use plugbridge_types::RemoteMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::rc::Rc;
use std::time::Duration;

/// What a plugin asked to show in its editor panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelDescriptor {
    pub title: String,
    pub content: String,
}

/// Rendered block content and plugin panels.
pub trait ContentChannel {
    /// Delivers a message into a block's rendered content.
    fn post_to_block(&self, plugin_id: &str, block_id: &str, message: &JsonValue);
    /// Asks the host to call `render()` for a block again.
    fn request_render(&self, plugin_id: &str, block_id: &str);
    fn open_panel(&self, plugin_id: &str, panel: &PanelDescriptor);
    fn post_to_panel(&self, plugin_id: &str, message: &JsonValue);
}

/// Outbound side of the multiplayer transport.
pub trait RealtimeTransport {
    /// Identity of the local participant.
    fn client_id(&self) -> String;
    fn send(&self, message: RemoteMessage);
}

/// Body text on success, a human-readable reason on failure.
pub type FetchFuture = BoxFuture<'static, Result<String, String>>;

/// Network access for `api.fetch`. The returned future runs off the
/// sandbox, on the ambient tokio runtime.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> FetchFuture;
}

/// Drops everything; used when the host has no rendered content attached.
#[derive(Debug, Default)]
pub struct NoopContent;

impl ContentChannel for NoopContent {
    fn post_to_block(&self, _plugin_id: &str, _block_id: &str, _message: &JsonValue) {}
    fn request_render(&self, _plugin_id: &str, _block_id: &str) {}
    fn open_panel(&self, _plugin_id: &str, _panel: &PanelDescriptor) {}
    fn post_to_panel(&self, _plugin_id: &str, _message: &JsonValue) {}
}

/// Transport for single-user sessions: messages go nowhere.
#[derive(Debug)]
pub struct OfflineTransport {
    client_id: String,
}

impl OfflineTransport {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}

impl Default for OfflineTransport {
    fn default() -> Self {
        Self::new("local")
    }
}

impl RealtimeTransport for OfflineTransport {
    fn client_id(&self) -> String {
        self.client_id.clone()
    }

    fn send(&self, message: RemoteMessage) {
        tracing::debug!(
            plugin_id = %message.plugin_id,
            block_id = %message.block_id,
            "Offline transport dropped remote message"
        );
    }
}

/// HTTP GET over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
            let response = response.error_for_status().map_err(|e| e.to_string())?;
            response.text().await.map_err(|e| e.to_string())
        }
        .boxed()
    }
}

/// Host-side services shared by every plugin in a session.
#[derive(Clone)]
pub struct HostServices {
    pub blocks: BlockStore,
    pub content: Rc<dyn ContentChannel>,
    pub transport: Rc<dyn RealtimeTransport>,
    pub fetcher: Rc<dyn Fetcher>,
    pub log_sink: Rc<dyn LogSink>,
}

impl HostServices {
    pub fn new() -> Self {
        Self {
            blocks: BlockStore::new(),
            content: Rc::new(NoopContent),
            transport: Rc::new(OfflineTransport::default()),
            fetcher: Rc::new(ReqwestFetcher::new()),
            log_sink: Rc::new(NullSink),
        }
    }

    pub fn with_blocks(mut self, blocks: BlockStore) -> Self {
        self.blocks = blocks;
        self
    }

    pub fn with_content(mut self, content: Rc<dyn ContentChannel>) -> Self {
        self.content = content;
        self
    }

    pub fn with_transport(mut self, transport: Rc<dyn RealtimeTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Rc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_log_sink(mut self, log_sink: Rc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::new()
    }
}
