//! Torrent lifecycle orchestration over the session engine.
//!
//! [`TorrentOrchestrator`] pairs the engine facade with a catalog of live
//! torrent statuses. The catalog is fed from the shared event bus;
//! operations validate against it before commands reach the engine, and
//! reattachment installs placeholder states through it so status consumers
//! see a torrent before the engine reports anything about it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::Utc;
use ebbtide_core::{
    AddTorrent, AddTorrentOptions, InfoHash, RemoveTorrent, TorrentEngine, TorrentProgress,
    TorrentRates, TorrentSource, TorrentState, TorrentStatus, parse_magnet,
};
use ebbtide_events::{Event, EventBus};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Coordinates torrent commands and status tracking for the application.
pub struct TorrentOrchestrator<E: TorrentEngine + 'static> {
    engine: Arc<E>,
    events: EventBus,
    catalog: Arc<TorrentCatalog>,
}

impl<E: TorrentEngine + 'static> TorrentOrchestrator<E> {
    /// Create an orchestrator over the given engine and event bus.
    #[must_use]
    pub fn new(engine: Arc<E>, events: EventBus) -> Self {
        Self {
            engine,
            events,
            catalog: Arc::new(TorrentCatalog::new()),
        }
    }

    /// Start the status refresh task: engine events flow from the bus into
    /// the catalog until the bus closes.
    pub fn spawn_event_loop(&self) -> JoinHandle<()> {
        let catalog = Arc::clone(&self.catalog);
        let mut stream = self.events.subscribe(None);
        tokio::spawn(async move {
            while let Some(envelope) = stream.next().await {
                catalog.observe(&envelope.event).await;
            }
        })
    }

    /// Admit a torrent by magnet URI.
    ///
    /// The URI is validated and parsed before anything reaches the engine,
    /// and a placeholder entry in the fetching-metadata state is installed
    /// so status consumers see the torrent immediately.
    ///
    /// # Errors
    ///
    /// Returns an error when the URI is not a valid magnet link, when the
    /// torrent is already active, or when the engine rejects the request.
    pub async fn add_magnet(&self, uri: &str) -> Result<InfoHash> {
        let magnet = parse_magnet(uri)?;
        let info_hash = magnet.info_hash;
        if self.catalog.get(info_hash).await.is_some() {
            bail!("torrent {info_hash} is already active");
        }
        self.catalog
            .install(
                info_hash,
                magnet.display_name,
                TorrentState::FetchingMetadata,
            )
            .await;
        let request = AddTorrent {
            info_hash: Some(info_hash),
            source: TorrentSource::magnet(magnet.uri),
            options: AddTorrentOptions::default(),
            fastresume: None,
        };
        if let Err(err) = self.engine.add_torrent(request).await {
            self.catalog.remove(info_hash).await;
            return Err(err);
        }
        info!(info_hash = %info_hash, "magnet admitted");
        Ok(info_hash)
    }

    /// Admit a torrent from raw metainfo bytes.
    ///
    /// The session derives the identifier from the payload, so no
    /// placeholder is installed; the admission event creates the entry.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine rejects the request.
    pub async fn add_metainfo(&self, bytes: Vec<u8>, name_hint: Option<String>) -> Result<()> {
        let request = AddTorrent {
            info_hash: None,
            source: TorrentSource::metainfo(bytes),
            options: AddTorrentOptions {
                name_hint,
                ..AddTorrentOptions::default()
            },
            fastresume: None,
        };
        self.engine.add_torrent(request).await
    }

    /// Reattach a torrent from stored metadata, optionally seeding a resume
    /// payload, and schedule the forced recheck.
    ///
    /// A placeholder entry in the checking state is installed before the
    /// engine sees the request. When the add is rejected the placeholder is
    /// rolled back; a recheck failure keeps the entry because the torrent
    /// is in the session by then.
    ///
    /// # Errors
    ///
    /// Returns an error when the torrent is already active or when the
    /// engine rejects the add or the recheck.
    pub async fn reattach(
        &self,
        info_hash: InfoHash,
        metadata: Vec<u8>,
        fastresume: Option<Vec<u8>>,
    ) -> Result<()> {
        if self.catalog.get(info_hash).await.is_some() {
            bail!("torrent {info_hash} is already active");
        }
        self.catalog
            .install(info_hash, None, TorrentState::Checking)
            .await;
        let request = AddTorrent {
            info_hash: Some(info_hash),
            source: TorrentSource::metainfo(metadata),
            options: AddTorrentOptions::default(),
            fastresume,
        };
        if let Err(err) = self.engine.add_torrent(request).await {
            self.catalog.remove(info_hash).await;
            return Err(err);
        }
        self.engine.recheck(info_hash).await
    }

    /// Remove a torrent; `with_data` also deletes downloaded payload files.
    ///
    /// The engine worker deletes resume artifacts as part of the removal,
    /// and the catalog entry goes when the removal event arrives.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine rejects the request.
    pub async fn remove(&self, info_hash: InfoHash, with_data: bool) -> Result<()> {
        self.engine
            .remove_torrent(
                info_hash,
                RemoveTorrent {
                    with_data,
                    keep_artifacts: false,
                },
            )
            .await
    }

    /// Abandon a magnet admission whose metadata never arrived.
    ///
    /// Only acts while the torrent is still waiting on metadata: the engine
    /// entry and catalog row are dropped, while resume artifacts stay on
    /// disk so a later run can retry the magnet. Returns whether anything
    /// was abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine rejects the removal.
    pub async fn abandon_pending(&self, info_hash: InfoHash) -> Result<bool> {
        let still_fetching = self
            .catalog
            .get(info_hash)
            .await
            .is_some_and(|status| status.state == TorrentState::FetchingMetadata);
        if !still_fetching {
            return Ok(false);
        }
        self.engine
            .remove_torrent(
                info_hash,
                RemoveTorrent {
                    with_data: false,
                    keep_artifacts: true,
                },
            )
            .await?;
        self.catalog.remove(info_hash).await;
        Ok(true)
    }

    /// Remove every completed torrent, keeping downloaded data on disk.
    ///
    /// Failures are logged per torrent and the sweep continues. Returns how
    /// many removals were issued.
    pub async fn clear_completed(&self) -> usize {
        let mut cleared = 0;
        for info_hash in self.catalog.completed().await {
            match self.remove(info_hash, false).await {
                Ok(()) => cleared += 1,
                Err(err) => {
                    warn!(info_hash = %info_hash, error = %err, "failed to clear completed torrent");
                }
            }
        }
        cleared
    }

    /// Snapshot of every tracked torrent, sorted by name then identifier.
    pub async fn list(&self) -> Vec<TorrentStatus> {
        self.catalog.list().await
    }

    /// Snapshot of one torrent, when tracked.
    pub async fn get(&self, info_hash: InfoHash) -> Option<TorrentStatus> {
        self.catalog.get(info_hash).await
    }
}

/// In-memory registry of live torrent statuses keyed by identifier.
struct TorrentCatalog {
    entries: RwLock<HashMap<InfoHash, TorrentStatus>>,
}

impl TorrentCatalog {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a placeholder entry ahead of the engine's own events.
    async fn install(&self, info_hash: InfoHash, name: Option<String>, state: TorrentState) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(info_hash)
            .or_insert_with(|| Self::blank_status(info_hash));
        entry.name = name;
        entry.state = state;
        entry.last_updated = Utc::now();
    }

    async fn observe(&self, event: &Event) {
        let mut entries = self.entries.write().await;
        Self::apply_event(&mut entries, event);
    }

    async fn remove(&self, info_hash: InfoHash) {
        let mut entries = self.entries.write().await;
        entries.remove(&info_hash);
    }

    async fn get(&self, info_hash: InfoHash) -> Option<TorrentStatus> {
        self.entries.read().await.get(&info_hash).cloned()
    }

    async fn list(&self) -> Vec<TorrentStatus> {
        let mut statuses: Vec<TorrentStatus> = {
            let entries = self.entries.read().await;
            entries.values().cloned().collect()
        };
        statuses.sort_by(Self::compare_status);
        statuses
    }

    async fn completed(&self) -> Vec<InfoHash> {
        let entries = self.entries.read().await;
        let mut hashes: Vec<InfoHash> = entries
            .values()
            .filter(|status| status.state == TorrentState::Completed)
            .map(|status| status.info_hash)
            .collect();
        hashes.sort_unstable();
        hashes
    }

    fn apply_event(entries: &mut HashMap<InfoHash, TorrentStatus>, event: &Event) {
        match event {
            Event::TorrentAdded { info_hash, name } => {
                Self::record_added(entries, *info_hash, name.clone());
            }
            Event::MetadataReceived { info_hash, name } => {
                Self::record_name(entries, *info_hash, name.clone());
            }
            Event::Progress {
                info_hash,
                bytes_downloaded,
                bytes_total,
                download_bps,
                upload_bps,
                peers,
            } => {
                Self::record_progress(
                    entries,
                    *info_hash,
                    *bytes_downloaded,
                    *bytes_total,
                    *download_bps,
                    *upload_bps,
                    *peers,
                );
            }
            Event::StateChanged { info_hash, state } => {
                Self::record_state(entries, *info_hash, state);
            }
            Event::Completed { info_hash } => {
                Self::record_completion(entries, *info_hash);
            }
            Event::TorrentRemoved { info_hash } => {
                entries.remove(info_hash);
            }
            Event::ResumePersisted { info_hash } => {
                Self::touch(entries, *info_hash);
            }
            Event::SettingsChanged { .. } | Event::HealthChanged { .. } => {}
        }
    }

    // Admission keeps whatever state a placeholder installed; the engine
    // announces its own transitions separately.
    fn record_added(
        entries: &mut HashMap<InfoHash, TorrentStatus>,
        info_hash: InfoHash,
        name: Option<String>,
    ) {
        let now = Utc::now();
        let entry = Self::ensure_entry(entries, info_hash);
        if name.is_some() {
            entry.name = name;
        }
        entry.added_at = now;
        entry.last_updated = now;
    }

    fn record_name(
        entries: &mut HashMap<InfoHash, TorrentStatus>,
        info_hash: InfoHash,
        name: Option<String>,
    ) {
        let entry = Self::ensure_entry(entries, info_hash);
        if name.is_some() {
            entry.name = name;
        }
        entry.last_updated = Utc::now();
    }

    fn record_progress(
        entries: &mut HashMap<InfoHash, TorrentStatus>,
        info_hash: InfoHash,
        bytes_downloaded: u64,
        bytes_total: u64,
        download_bps: u64,
        upload_bps: u64,
        peers: u32,
    ) {
        let entry = Self::ensure_entry(entries, info_hash);
        entry.progress.bytes_downloaded = bytes_downloaded;
        entry.progress.bytes_total = bytes_total;
        entry.rates.download_bps = download_bps;
        entry.rates.upload_bps = upload_bps;
        entry.peers = peers;
        entry.last_updated = Utc::now();
    }

    fn record_state(
        entries: &mut HashMap<InfoHash, TorrentStatus>,
        info_hash: InfoHash,
        state: &TorrentState,
    ) {
        let entry = Self::ensure_entry(entries, info_hash);
        entry.state = state.clone();
        entry.last_updated = Utc::now();
    }

    fn record_completion(entries: &mut HashMap<InfoHash, TorrentStatus>, info_hash: InfoHash) {
        let now = Utc::now();
        let entry = Self::ensure_entry(entries, info_hash);
        entry.state = TorrentState::Completed;
        entry.completed_at = Some(now);
        entry.last_updated = now;
    }

    fn touch(entries: &mut HashMap<InfoHash, TorrentStatus>, info_hash: InfoHash) {
        if let Some(entry) = entries.get_mut(&info_hash) {
            entry.last_updated = Utc::now();
        }
    }

    fn ensure_entry(
        entries: &mut HashMap<InfoHash, TorrentStatus>,
        info_hash: InfoHash,
    ) -> &mut TorrentStatus {
        entries
            .entry(info_hash)
            .or_insert_with(|| Self::blank_status(info_hash))
    }

    fn blank_status(info_hash: InfoHash) -> TorrentStatus {
        let now = Utc::now();
        TorrentStatus {
            info_hash,
            name: None,
            state: TorrentState::Queued,
            progress: TorrentProgress::default(),
            rates: TorrentRates::default(),
            peers: 0,
            download_dir: None,
            added_at: now,
            completed_at: None,
            last_updated: now,
        }
    }

    fn compare_status(a: &TorrentStatus, b: &TorrentStatus) -> Ordering {
        match (a.name.as_deref(), b.name.as_deref()) {
            (Some(a_name), Some(b_name)) => a_name
                .cmp(b_name)
                .then_with(|| a.info_hash.cmp(&b.info_hash)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.info_hash.cmp(&b.info_hash),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingEngine {
        added: RwLock<Vec<AddTorrent>>,
        removed: RwLock<Vec<(InfoHash, RemoveTorrent)>>,
        rechecked: RwLock<Vec<InfoHash>>,
        reject: Option<InfoHash>,
    }

    impl RecordingEngine {
        fn rejecting(info_hash: InfoHash) -> Self {
            Self {
                reject: Some(info_hash),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl TorrentEngine for RecordingEngine {
        async fn add_torrent(&self, request: AddTorrent) -> Result<()> {
            if self.reject.is_some() && self.reject == request.info_hash {
                bail!("session rejected the torrent");
            }
            self.added.write().await.push(request);
            Ok(())
        }

        async fn remove_torrent(&self, info_hash: InfoHash, options: RemoveTorrent) -> Result<()> {
            self.removed.write().await.push((info_hash, options));
            Ok(())
        }

        async fn recheck(&self, info_hash: InfoHash) -> Result<()> {
            self.rechecked.write().await.push(info_hash);
            Ok(())
        }

        async fn request_resume_data(&self, _info_hash: InfoHash) -> Result<()> {
            Ok(())
        }
    }

    fn sample_hash(tag: u8) -> InfoHash {
        InfoHash::parse(&format!("{:040x}", u128::from(tag))).unwrap()
    }

    fn harness(
        engine: RecordingEngine,
    ) -> (Arc<RecordingEngine>, TorrentOrchestrator<RecordingEngine>) {
        let engine = Arc::new(engine);
        let orchestrator = TorrentOrchestrator::new(Arc::clone(&engine), EventBus::new());
        (engine, orchestrator)
    }

    #[tokio::test]
    async fn add_magnet_validates_and_installs_a_placeholder() {
        let (engine, orchestrator) = harness(RecordingEngine::default());

        let rejected = orchestrator
            .add_magnet("https://example.com/file.torrent")
            .await;
        assert!(rejected.is_err());
        assert!(engine.added.read().await.is_empty());

        let expected = sample_hash(1);
        let uri = format!("magnet:?xt=urn:btih:{expected}&dn=Demo");
        let info_hash = orchestrator.add_magnet(&uri).await.unwrap();
        assert_eq!(info_hash, expected);

        let status = orchestrator.get(info_hash).await.unwrap();
        assert_eq!(status.state, TorrentState::FetchingMetadata);
        assert_eq!(status.name.as_deref(), Some("Demo"));

        let added = engine.added.read().await;
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].info_hash, Some(expected));
        assert!(matches!(added[0].source, TorrentSource::Magnet { .. }));
    }

    #[tokio::test]
    async fn duplicate_magnets_stop_before_the_engine() {
        let (engine, orchestrator) = harness(RecordingEngine::default());
        let uri = format!("magnet:?xt=urn:btih:{}", sample_hash(2));

        orchestrator.add_magnet(&uri).await.unwrap();
        let err = orchestrator.add_magnet(&uri).await.unwrap_err();
        assert!(err.to_string().contains("already active"));
        assert_eq!(engine.added.read().await.len(), 1);
    }

    #[tokio::test]
    async fn a_rejected_add_rolls_the_placeholder_back() {
        let info_hash = sample_hash(3);
        let (engine, orchestrator) = harness(RecordingEngine::rejecting(info_hash));

        let uri = format!("magnet:?xt=urn:btih:{info_hash}");
        assert!(orchestrator.add_magnet(&uri).await.is_err());
        assert!(orchestrator.get(info_hash).await.is_none());
        assert!(engine.added.read().await.is_empty());
    }

    #[tokio::test]
    async fn reattach_seeds_resume_payloads_and_rechecks() {
        let (engine, orchestrator) = harness(RecordingEngine::default());
        let info_hash = sample_hash(4);

        orchestrator
            .reattach(info_hash, vec![0; 200], Some(vec![1; 64]))
            .await
            .unwrap();

        let status = orchestrator.get(info_hash).await.unwrap();
        assert_eq!(status.state, TorrentState::Checking);

        let added = engine.added.read().await;
        assert_eq!(added[0].info_hash, Some(info_hash));
        assert!(added[0].fastresume.is_some());
        assert_eq!(*engine.rechecked.read().await, vec![info_hash]);
    }

    #[tokio::test]
    async fn metainfo_adds_are_forwarded_untouched() {
        let (engine, orchestrator) = harness(RecordingEngine::default());

        orchestrator
            .add_metainfo(vec![7; 300], Some("induced".into()))
            .await
            .unwrap();

        let added = engine.added.read().await;
        assert!(added[0].info_hash.is_none());
        assert!(
            matches!(&added[0].source, TorrentSource::Metainfo { bytes } if bytes.len() == 300)
        );
        assert_eq!(added[0].options.name_hint.as_deref(), Some("induced"));
    }

    #[tokio::test]
    async fn clear_completed_sweeps_only_finished_torrents() {
        let (engine, orchestrator) = harness(RecordingEngine::default());
        let done_a = sample_hash(5);
        let done_b = sample_hash(6);
        let active = sample_hash(7);

        for (info_hash, name) in [(done_a, "alpha"), (done_b, "beta"), (active, "gamma")] {
            orchestrator
                .catalog
                .observe(&Event::TorrentAdded {
                    info_hash,
                    name: Some(name.to_owned()),
                })
                .await;
        }
        orchestrator
            .catalog
            .observe(&Event::Completed { info_hash: done_a })
            .await;
        orchestrator
            .catalog
            .observe(&Event::Completed { info_hash: done_b })
            .await;
        orchestrator
            .catalog
            .observe(&Event::StateChanged {
                info_hash: active,
                state: TorrentState::Downloading,
            })
            .await;

        assert_eq!(orchestrator.clear_completed().await, 2);

        let removed = engine.removed.read().await;
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|(_, options)| !options.with_data));
        assert!(removed.iter().any(|(hash, _)| *hash == done_a));
        assert!(removed.iter().any(|(hash, _)| *hash == done_b));
    }

    #[tokio::test]
    async fn abandoning_drops_only_pending_metadata_fetches() {
        let (engine, orchestrator) = harness(RecordingEngine::default());
        let pending = sample_hash(14);
        let uri = format!("magnet:?xt=urn:btih:{pending}");
        orchestrator.add_magnet(&uri).await.unwrap();

        assert!(orchestrator.abandon_pending(pending).await.unwrap());
        assert!(orchestrator.get(pending).await.is_none());
        let removed = engine.removed.read().await;
        assert_eq!(removed.len(), 1);
        assert!(removed[0].1.keep_artifacts);
        assert!(!removed[0].1.with_data);
        drop(removed);

        // Nothing left to abandon on a second call.
        assert!(!orchestrator.abandon_pending(pending).await.unwrap());
    }

    #[tokio::test]
    async fn abandoning_spares_torrents_past_metadata() {
        let (engine, orchestrator) = harness(RecordingEngine::default());
        let info_hash = sample_hash(15);
        orchestrator
            .add_magnet(&format!("magnet:?xt=urn:btih:{info_hash}"))
            .await
            .unwrap();
        orchestrator
            .catalog
            .observe(&Event::StateChanged {
                info_hash,
                state: TorrentState::Downloading,
            })
            .await;

        assert!(!orchestrator.abandon_pending(info_hash).await.unwrap());
        assert!(orchestrator.get(info_hash).await.is_some());
        assert!(engine.removed.read().await.is_empty());
    }

    #[tokio::test]
    async fn event_loop_feeds_the_catalog() {
        let events = EventBus::new();
        let orchestrator =
            TorrentOrchestrator::new(Arc::new(RecordingEngine::default()), events.clone());
        let task = orchestrator.spawn_event_loop();

        let info_hash = sample_hash(8);
        let _ = events.publish(Event::TorrentAdded {
            info_hash,
            name: Some("streamed".to_owned()),
        });

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(status) = orchestrator.get(info_hash).await {
                assert_eq!(status.name.as_deref(), Some("streamed"));
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "event never reached the catalog"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();
    }

    #[tokio::test]
    async fn placeholders_survive_the_admission_event() {
        let catalog = TorrentCatalog::new();
        let info_hash = sample_hash(9);

        catalog
            .install(info_hash, None, TorrentState::Checking)
            .await;
        catalog
            .observe(&Event::TorrentAdded {
                info_hash,
                name: Some("verified".to_owned()),
            })
            .await;

        let status = catalog.get(info_hash).await.unwrap();
        assert_eq!(status.state, TorrentState::Checking);
        assert_eq!(status.name.as_deref(), Some("verified"));
    }

    #[tokio::test]
    async fn catalog_tracks_event_evolution() {
        let catalog = TorrentCatalog::new();
        let info_hash = sample_hash(10);
        let other = sample_hash(11);

        catalog
            .observe(&Event::TorrentAdded {
                info_hash,
                name: Some("zeta".to_owned()),
            })
            .await;
        catalog
            .observe(&Event::Progress {
                info_hash,
                bytes_downloaded: 512,
                bytes_total: 1_024,
                download_bps: 64,
                upload_bps: 8,
                peers: 3,
            })
            .await;
        catalog
            .observe(&Event::StateChanged {
                info_hash,
                state: TorrentState::Downloading,
            })
            .await;
        catalog.observe(&Event::Completed { info_hash }).await;
        catalog
            .observe(&Event::TorrentAdded {
                info_hash: other,
                name: Some("alpha".to_owned()),
            })
            .await;

        let statuses = catalog.list().await;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].info_hash, other, "sorted by name first");

        let status = catalog.get(info_hash).await.unwrap();
        assert_eq!(status.progress.bytes_total, 1_024);
        assert_eq!(status.rates.download_bps, 64);
        assert_eq!(status.peers, 3);
        assert_eq!(status.state, TorrentState::Completed);
        assert!(status.completed_at.is_some());

        catalog.observe(&Event::TorrentRemoved { info_hash }).await;
        assert!(catalog.get(info_hash).await.is_none());
    }

    #[tokio::test]
    async fn unnamed_statuses_sort_after_named_ones() {
        let catalog = TorrentCatalog::new();
        let named = sample_hash(12);
        let unnamed = sample_hash(13);

        catalog
            .observe(&Event::TorrentAdded {
                info_hash: unnamed,
                name: None,
            })
            .await;
        catalog
            .observe(&Event::TorrentAdded {
                info_hash: named,
                name: Some("omega".to_owned()),
            })
            .await;

        let statuses = catalog.list().await;
        assert_eq!(statuses[0].info_hash, named);
        assert_eq!(statuses[1].info_hash, unnamed);
    }
}
