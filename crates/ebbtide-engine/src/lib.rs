//! Torrent engine built around a background session worker.
//!
//! [`SessionEngine`] accepts commands over an async facade, forwards them to
//! a worker task that owns the session backend, and republishes session
//! events on the shared [`EventBus`]. When a resume store is attached the
//! worker persists fastresume payloads, metainfo, and magnet fallbacks as
//! the matching session events arrive.

#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

pub mod command;
pub mod types;

mod session;
mod worker;

use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use ebbtide_core::{AddTorrent, InfoHash, RemoveTorrent, TorrentEngine};
use ebbtide_events::EventBus;
use ebbtide_resume::ResumeStore;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

pub use command::{EngineCommand, PersistReport};
pub use types::{EncryptionPolicy, EngineRuntimeConfig, Toggle};

const COMMAND_BUFFER: usize = 128;

/// Handle to the torrent session.
///
/// Cheap to share behind an `Arc`; all session access is serialized through
/// the worker task, which outlives every command sent before the engine is
/// dropped.
pub struct SessionEngine {
    events: EventBus,
    commands: mpsc::Sender<EngineCommand>,
    resume_store: Option<ResumeStore>,
}

impl SessionEngine {
    /// Build an engine without resume persistence.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self::build(events, None)
    }

    /// Build an engine that maintains resume artifacts in `store`.
    #[must_use]
    pub fn with_resume_store(events: EventBus, store: ResumeStore) -> Self {
        Self::build(events, Some(store))
    }

    fn build(events: EventBus, store: Option<ResumeStore>) -> Self {
        if let Some(store) = &store
            && let Err(err) = store.ensure_initialized()
        {
            warn!(error = %err, "resume store initialization failed");
        }
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let _ = worker::spawn(
            events.clone(),
            receiver,
            session::create_session(),
            store.clone(),
        );
        Self {
            events,
            commands,
            resume_store: store,
        }
    }

    /// Bus this engine publishes lifecycle events on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Resume store backing this engine, when persistence is enabled.
    #[must_use]
    pub const fn resume_store(&self) -> Option<&ResumeStore> {
        self.resume_store.as_ref()
    }

    /// Apply a runtime profile to the session.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker has shut down.
    pub async fn apply_runtime_config(&self, config: EngineRuntimeConfig) -> Result<()> {
        self.send_command(EngineCommand::ApplyConfig(Box::new(config)))
            .await
    }

    /// Snapshot resume data for every active torrent, waiting up to `grace`
    /// for the session to deliver outstanding payloads.
    ///
    /// Without a resume store every active torrent lands in the missed list.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker shuts down before reporting.
    pub async fn persist_session(&self, grace: Duration) -> Result<PersistReport> {
        let (respond_to, report) = oneshot::channel();
        self.send_command(EngineCommand::PersistAll { grace, respond_to })
            .await?;
        report
            .await
            .context("engine worker dropped the persist report")
    }

    async fn send_command(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("engine worker is no longer running"))
    }
}

#[async_trait]
impl TorrentEngine for SessionEngine {
    async fn add_torrent(&self, request: AddTorrent) -> Result<()> {
        self.send_command(EngineCommand::Add(Box::new(request))).await
    }

    async fn remove_torrent(&self, info_hash: InfoHash, options: RemoveTorrent) -> Result<()> {
        self.send_command(EngineCommand::Remove { info_hash, options })
            .await
    }

    async fn recheck(&self, info_hash: InfoHash) -> Result<()> {
        self.send_command(EngineCommand::Recheck { info_hash }).await
    }

    async fn request_resume_data(&self, info_hash: InfoHash) -> Result<()> {
        self.send_command(EngineCommand::RequestResumeData { info_hash })
            .await
    }
}

#[cfg(test)]
mod tests {
    use ebbtide_core::{AddTorrentOptions, TorrentSource, TorrentState};
    use ebbtide_events::{Event, EventStream};
    use ebbtide_resume::ArtifactKind;
    use tempfile::TempDir;

    use super::*;

    fn sample_hash(tag: u8) -> InfoHash {
        InfoHash::parse(&format!("{:040x}", u128::from(tag))).unwrap()
    }

    fn magnet_request(info_hash: InfoHash) -> AddTorrent {
        AddTorrent {
            info_hash: Some(info_hash),
            source: TorrentSource::magnet(format!("magnet:?xt=urn:btih:{info_hash}&dn=sample")),
            options: AddTorrentOptions::default(),
            fastresume: None,
        }
    }

    async fn wait_for_event(
        stream: &mut EventStream,
        millis: u64,
        mut predicate: impl FnMut(&Event) -> bool,
    ) -> Option<Event> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(millis);
        loop {
            let remaining = deadline.duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match tokio::time::timeout(remaining, stream.next()).await {
                Ok(Some(envelope)) if predicate(&envelope.event) => return Some(envelope.event),
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => return None,
            }
        }
    }

    #[tokio::test]
    async fn magnet_lifecycle_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let engine = SessionEngine::with_resume_store(events, store.clone());
        assert!(engine.resume_store().is_some());

        let info_hash = sample_hash(1);
        engine.add_torrent(magnet_request(info_hash)).await.unwrap();

        let added = wait_for_event(&mut stream, 2_000, |event| {
            matches!(event, Event::TorrentAdded { .. })
        })
        .await;
        assert!(added.is_some());
        let fetching = wait_for_event(&mut stream, 2_000, |event| {
            matches!(
                event,
                Event::StateChanged {
                    state: TorrentState::FetchingMetadata,
                    ..
                }
            )
        })
        .await;
        assert!(fetching.is_some());

        let report = engine.persist_session(Duration::from_secs(2)).await.unwrap();
        assert_eq!(report.persisted, vec![info_hash]);
        assert!(report.is_complete());
        assert!(store.read(info_hash, ArtifactKind::FastResume).unwrap().is_some());
        assert!(store.read(info_hash, ArtifactKind::Magnet).unwrap().is_some());
    }

    #[tokio::test]
    async fn recheck_reports_checking_state() {
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let engine = SessionEngine::new(events);
        let info_hash = sample_hash(2);
        engine.add_torrent(magnet_request(info_hash)).await.unwrap();
        engine.recheck(info_hash).await.unwrap();

        let checking = wait_for_event(&mut stream, 2_000, |event| {
            matches!(
                event,
                Event::StateChanged {
                    state: TorrentState::Checking,
                    ..
                }
            )
        })
        .await;
        assert!(checking.is_some());
    }

    #[tokio::test]
    async fn persist_without_store_misses_everything() {
        let events = EventBus::new();
        let engine = SessionEngine::new(events);
        let info_hash = sample_hash(3);
        engine.add_torrent(magnet_request(info_hash)).await.unwrap();

        let report = engine
            .persist_session(Duration::from_millis(500))
            .await
            .unwrap();
        assert!(report.persisted.is_empty());
        assert_eq!(report.missed, vec![info_hash]);
    }
}
