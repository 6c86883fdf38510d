//! Shared fixtures for host integration tests: recording collaborators and
//! a manager wired to an in-memory log sink.

#![allow(dead_code)]

use futures::FutureExt;
use plugbridge_host::*;
use plugbridge_types::{PluginBlock, PluginManifest, RemoteMessage};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    BlockMessage { block_id: String, message: JsonValue },
    RenderRequested { block_id: String },
    PanelOpened(PanelDescriptor),
    PanelMessage(JsonValue),
}

#[derive(Default)]
pub struct RecordingContent {
    pub events: RefCell<Vec<ContentEvent>>,
}

impl ContentChannel for RecordingContent {
    fn post_to_block(&self, _plugin_id: &str, block_id: &str, message: &JsonValue) {
        self.events.borrow_mut().push(ContentEvent::BlockMessage {
            block_id: block_id.to_string(),
            message: message.clone(),
        });
    }

    fn request_render(&self, _plugin_id: &str, block_id: &str) {
        self.events.borrow_mut().push(ContentEvent::RenderRequested {
            block_id: block_id.to_string(),
        });
    }

    fn open_panel(&self, _plugin_id: &str, panel: &PanelDescriptor) {
        self.events
            .borrow_mut()
            .push(ContentEvent::PanelOpened(panel.clone()));
    }

    fn post_to_panel(&self, _plugin_id: &str, message: &JsonValue) {
        self.events
            .borrow_mut()
            .push(ContentEvent::PanelMessage(message.clone()));
    }
}

pub struct RecordingTransport {
    pub client_id: String,
    pub sent: RefCell<Vec<RemoteMessage>>,
}

impl RecordingTransport {
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            sent: RefCell::new(Vec::new()),
        }
    }
}

impl RealtimeTransport for RecordingTransport {
    fn client_id(&self) -> String {
        self.client_id.clone()
    }

    fn send(&self, message: RemoteMessage) {
        self.sent.borrow_mut().push(message);
    }
}

/// Serves canned bodies and counts requests; unknown URLs fail.
#[derive(Default)]
pub struct StaticFetcher {
    pub bodies: HashMap<String, String>,
    pub requests: RefCell<Vec<String>>,
}

impl StaticFetcher {
    pub fn with(url: &str, body: &str) -> Self {
        let mut fetcher = Self::default();
        fetcher.bodies.insert(url.to_string(), body.to_string());
        fetcher
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        self.requests.borrow_mut().push(url.to_string());
        let result = self
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| format!("404 for {url}"));
        async move { result }.boxed()
    }
}

pub struct Harness {
    pub manager: PluginManager,
    pub sink: Rc<MemorySink>,
    pub content: Rc<RecordingContent>,
    pub transport: Rc<RecordingTransport>,
    pub fetcher: Rc<StaticFetcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(HostConfig::default(), StaticFetcher::default())
    }

    pub fn with_fetcher(fetcher: StaticFetcher) -> Self {
        Self::with_config(HostConfig::default(), fetcher)
    }

    pub fn with_config(config: HostConfig, fetcher: StaticFetcher) -> Self {
        let sink = Rc::new(MemorySink::new());
        let content = Rc::new(RecordingContent::default());
        let transport = Rc::new(RecordingTransport::new("client-local"));
        let fetcher = Rc::new(fetcher);
        let services = HostServices::new()
            .with_content(content.clone())
            .with_transport(transport.clone())
            .with_fetcher(fetcher.clone())
            .with_log_sink(sink.clone());
        Self {
            manager: PluginManager::with_config(services, config),
            sink,
            content,
            transport,
            fetcher,
        }
    }

    /// Installs a plugin with the given surface sources and one block `b1`.
    pub fn install(&mut self, editor: Option<&str>, player: Option<&str>) -> Rc<PluginContext> {
        self.install_manifest(manifest(editor, player))
    }

    pub fn install_manifest(&mut self, manifest: PluginManifest) -> Rc<PluginContext> {
        let block = PluginBlock::new("b1", manifest.id.clone());
        let context = self.manager.install(manifest).unwrap();
        self.manager.blocks().insert(block);
        context
    }

    pub fn count(&self, category: LogCategory) -> usize {
        self.sink.count(category)
    }

    pub fn messages(&self, category: LogCategory) -> Vec<String> {
        self.sink
            .records()
            .into_iter()
            .filter(|r| r.category == category)
            .map(|r| r.message)
            .collect()
    }

    pub fn plugin_lines(&self) -> Vec<String> {
        self.messages(LogCategory::Plugin)
    }
}

pub const PLUGIN_ID: &str = "acme.quiz";

pub fn manifest(editor: Option<&str>, player: Option<&str>) -> PluginManifest {
    let mut manifest = PluginManifest::new(PLUGIN_ID, "Quiz", "1.0.0");
    manifest.editor_source = editor.map(str::to_string);
    manifest.player_source = player.map(str::to_string);
    manifest
}
