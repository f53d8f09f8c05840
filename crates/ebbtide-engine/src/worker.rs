//! Background task that owns the session backend.
//!
//! The worker serializes all session access: commands arrive over an mpsc
//! channel, session events are polled on a fixed cadence, and resume
//! artifacts are written as the matching events surface. Store failures
//! degrade health instead of tearing the loop down.

#![allow(clippy::redundant_pub_crate)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use anyhow::Result;
use ebbtide_core::{
    AddTorrent, EngineEvent, InfoHash, RemoveTorrent, TorrentSource, TorrentState,
};
use ebbtide_events::{Event, EventBus};
use ebbtide_resume::{ArtifactKind, ResumeStore};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::{EngineCommand, PersistReport};
use crate::session::EngineSession;

const ALERT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const PROGRESS_COALESCE_INTERVAL: Duration = Duration::from_millis(100);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) fn spawn(
    events: EventBus,
    mut commands: mpsc::Receiver<EngineCommand>,
    session: Box<dyn EngineSession>,
    store: Option<ResumeStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut worker = Worker::new(events, session, store);
        let mut poll = tokio::time::interval(ALERT_POLL_INTERVAL);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if let Err(err) = worker.handle(command).await {
                                let detail = err.to_string();
                                worker.mark_degraded("session", Some(&detail));
                                warn!(error = %detail, "engine command handling failed");
                            }
                        }
                        None => break,
                    }
                }
                _ = poll.tick() => {
                    if let Err(err) = worker.flush_session_events().await {
                        let detail = err.to_string();
                        worker.mark_degraded("session", Some(&detail));
                        warn!(error = %detail, "session event polling failed");
                    }
                }
            }
        }
        if let Err(err) = worker.flush_session_events().await {
            warn!(error = %err, "session event polling failed during shutdown");
        }
    })
}

struct Worker {
    events: EventBus,
    session: Box<dyn EngineSession>,
    store: Option<ResumeStore>,
    metadata_saved: HashSet<InfoHash>,
    degraded: BTreeSet<String>,
    progress_emitted: HashMap<InfoHash, Instant>,
}

impl Worker {
    fn new(events: EventBus, session: Box<dyn EngineSession>, store: Option<ResumeStore>) -> Self {
        Self {
            events,
            session,
            store,
            metadata_saved: HashSet::new(),
            degraded: BTreeSet::new(),
            progress_emitted: HashMap::new(),
        }
    }

    async fn handle(&mut self, command: EngineCommand) -> Result<()> {
        match command {
            EngineCommand::Add(request) => self.handle_add(*request).await?,
            EngineCommand::Remove { info_hash, options } => {
                self.handle_remove(info_hash, options).await?;
            }
            EngineCommand::Recheck { info_hash } => {
                self.session.recheck(info_hash).await?;
                info!(info_hash = %info_hash, "torrent recheck requested");
            }
            EngineCommand::RequestResumeData { info_hash } => {
                self.session.request_resume_data(info_hash).await?;
                debug!(info_hash = %info_hash, "resume data requested");
            }
            EngineCommand::ApplyConfig(config) => {
                self.session.apply_config(&config).await?;
                info!(
                    download_root = %config.download_root.display(),
                    resume_dir = %config.resume_dir.display(),
                    encryption = config.encryption.as_u8(),
                    "engine runtime config applied"
                );
            }
            EngineCommand::PersistAll { grace, respond_to } => {
                self.handle_persist_all(grace, respond_to).await?;
            }
        }
        self.flush_session_events().await
    }

    async fn handle_add(&mut self, request: AddTorrent) -> Result<()> {
        let info_hash = match self.session.add_torrent(&request).await {
            Ok(info_hash) => info_hash,
            Err(err) => {
                // One rejected torrent must not poison the rest of the
                // session, report it against the torrent and move on.
                let detail = err.to_string();
                warn!(error = %detail, "session rejected torrent add");
                if let Some(info_hash) = request.info_hash {
                    let _ = self.events.publish(Event::StateChanged {
                        info_hash,
                        state: TorrentState::Failed { message: detail },
                    });
                }
                return Ok(());
            }
        };

        // Magnet links are recoverable from the first moment, even if the
        // process dies before metadata arrives.
        if let Some(store) = self.store.clone()
            && let TorrentSource::Magnet { uri } = &request.source
            && self.persist_artifact(&store, info_hash, ArtifactKind::Magnet, uri.as_bytes())
        {
            self.mark_recovered("resume_store");
        }

        if let Some(payload) = request.fastresume.as_deref() {
            let seeded = self.session.load_fastresume(info_hash, payload).await;
            if let Err(err) = seeded {
                warn!(info_hash = %info_hash, error = %err, "failed to seed resume payload");
            }
        }

        info!(info_hash = %info_hash, "torrent admitted to session");
        Ok(())
    }

    async fn handle_remove(&mut self, info_hash: InfoHash, options: RemoveTorrent) -> Result<()> {
        self.session.remove_torrent(info_hash, &options).await?;
        self.metadata_saved.remove(&info_hash);
        self.progress_emitted.remove(&info_hash);
        if let Some(store) = self.store.clone()
            && !options.keep_artifacts
        {
            match store.delete_all(info_hash) {
                Ok(removed) => {
                    if !removed.is_empty() {
                        debug!(
                            info_hash = %info_hash,
                            artifacts = removed.len(),
                            "resume artifacts deleted"
                        );
                    }
                    self.mark_recovered("resume_store");
                }
                Err(err) => {
                    let detail = err.to_string();
                    warn!(info_hash = %info_hash, error = %detail, "failed to delete resume artifacts");
                    self.mark_degraded("resume_store", Some(&detail));
                }
            }
        }
        info!(info_hash = %info_hash, with_data = options.with_data, "torrent removed from session");
        let _ = self.events.publish(Event::TorrentRemoved { info_hash });
        Ok(())
    }

    /// Snapshot resume data for every active torrent, draining session
    /// events until all answers arrive or the grace period lapses.
    async fn handle_persist_all(
        &mut self,
        grace: Duration,
        respond_to: oneshot::Sender<PersistReport>,
    ) -> Result<()> {
        let active = match self.session.active_torrents().await {
            Ok(active) => active,
            Err(err) => {
                let _ = respond_to.send(PersistReport::default());
                return Err(err);
            }
        };

        let mut pending: BTreeSet<InfoHash> = BTreeSet::new();
        let mut missed: Vec<InfoHash> = Vec::new();
        for info_hash in active {
            match self.session.request_resume_data(info_hash).await {
                Ok(()) => {
                    pending.insert(info_hash);
                }
                Err(err) => {
                    warn!(info_hash = %info_hash, error = %err, "resume data request failed");
                    missed.push(info_hash);
                }
            }
        }

        let mut persisted: Vec<InfoHash> = Vec::new();
        let deadline = Instant::now() + grace;
        while !pending.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            let batch = match self.session.poll_events().await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(error = %err, "session event polling failed during persist");
                    break;
                }
            };
            for event in batch {
                match event {
                    EngineEvent::ResumeData {
                        info_hash,
                        payload,
                        metadata,
                        magnet_uri,
                    } => {
                        let stored = self.persist_resume_artifacts(
                            info_hash,
                            &payload,
                            metadata.as_deref(),
                            magnet_uri.as_deref(),
                        );
                        if pending.remove(&info_hash) {
                            if stored {
                                persisted.push(info_hash);
                            } else {
                                missed.push(info_hash);
                            }
                        }
                    }
                    EngineEvent::ResumeDataFailed { info_hash, message } => {
                        warn!(info_hash = %info_hash, error = %message, "session could not produce resume data");
                        if pending.remove(&info_hash) {
                            missed.push(info_hash);
                        }
                    }
                    other => self.publish_engine_event(other),
                }
            }
        }

        missed.extend(pending);
        if missed.is_empty() {
            info!(persisted = persisted.len(), "session resume snapshot complete");
        } else {
            warn!(
                persisted = persisted.len(),
                missed = missed.len(),
                "session resume snapshot incomplete"
            );
        }
        let _ = respond_to.send(PersistReport { persisted, missed });
        Ok(())
    }

    async fn flush_session_events(&mut self) -> Result<()> {
        let batch = self.session.poll_events().await?;
        self.mark_recovered("session");
        for event in batch {
            self.publish_engine_event(event);
        }
        Ok(())
    }

    fn publish_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Added { info_hash, name } => {
                let _ = self.events.publish(Event::TorrentAdded { info_hash, name });
            }
            EngineEvent::MetadataReceived {
                info_hash,
                name,
                metadata,
            } => {
                if self.metadata_saved.insert(info_hash)
                    && let Some(store) = self.store.clone()
                    && self.persist_artifact(&store, info_hash, ArtifactKind::Metadata, &metadata)
                {
                    self.mark_recovered("resume_store");
                }
                let _ = self.events.publish(Event::MetadataReceived { info_hash, name });
            }
            EngineEvent::Progress {
                info_hash,
                progress,
                rates,
                peers,
            } => {
                if !self.should_emit_progress(info_hash) {
                    debug!(info_hash = %info_hash, "progress update coalesced");
                    return;
                }
                let _ = self.events.publish(Event::Progress {
                    info_hash,
                    bytes_downloaded: progress.bytes_downloaded,
                    bytes_total: progress.bytes_total,
                    download_bps: rates.download_bps,
                    upload_bps: rates.upload_bps,
                    peers,
                });
            }
            EngineEvent::StateChanged { info_hash, state } => {
                let _ = self.events.publish(Event::StateChanged { info_hash, state });
            }
            EngineEvent::Completed { info_hash } => {
                let _ = self.events.publish(Event::StateChanged {
                    info_hash,
                    state: TorrentState::Completed,
                });
                let _ = self.events.publish(Event::Completed { info_hash });
            }
            EngineEvent::ResumeData {
                info_hash,
                payload,
                metadata,
                magnet_uri,
            } => {
                self.persist_resume_artifacts(
                    info_hash,
                    &payload,
                    metadata.as_deref(),
                    magnet_uri.as_deref(),
                );
            }
            EngineEvent::ResumeDataFailed { info_hash, message } => {
                warn!(info_hash = %info_hash, error = %message, "session could not produce resume data");
            }
            EngineEvent::Error { info_hash, message } => {
                warn!(info_hash = %info_hash, error = %message, "session reported torrent error");
                let _ = self.events.publish(Event::StateChanged {
                    info_hash,
                    state: TorrentState::Failed { message },
                });
            }
        }
    }

    /// Write the artifact set for one resume payload. Returns whether the
    /// fastresume payload itself reached the store.
    fn persist_resume_artifacts(
        &mut self,
        info_hash: InfoHash,
        payload: &[u8],
        metadata: Option<&[u8]>,
        magnet_uri: Option<&str>,
    ) -> bool {
        let Some(store) = self.store.clone() else {
            return false;
        };
        let mut healthy = true;
        let resume_ok = self.persist_artifact(&store, info_hash, ArtifactKind::FastResume, payload);
        healthy &= resume_ok;
        if let Some(bytes) = metadata {
            if self.metadata_saved.insert(info_hash) {
                healthy &= self.persist_artifact(&store, info_hash, ArtifactKind::Metadata, bytes);
            }
        } else if let Some(uri) = magnet_uri {
            healthy &= self.persist_artifact(&store, info_hash, ArtifactKind::Magnet, uri.as_bytes());
        }
        if healthy {
            self.mark_recovered("resume_store");
        }
        if resume_ok {
            let _ = self.events.publish(Event::ResumePersisted { info_hash });
        }
        resume_ok
    }

    fn persist_artifact(
        &mut self,
        store: &ResumeStore,
        info_hash: InfoHash,
        kind: ArtifactKind,
        payload: &[u8],
    ) -> bool {
        if let Err(err) = store.write(info_hash, kind, payload) {
            let detail = err.to_string();
            warn!(
                info_hash = %info_hash,
                kind = kind.label(),
                error = %detail,
                "failed to write resume artifact"
            );
            self.mark_degraded("resume_store", Some(&detail));
            return false;
        }
        debug!(
            info_hash = %info_hash,
            kind = kind.label(),
            bytes = payload.len(),
            "resume artifact written"
        );
        true
    }

    fn should_emit_progress(&mut self, info_hash: InfoHash) -> bool {
        let now = Instant::now();
        let coalesced = self
            .progress_emitted
            .get(&info_hash)
            .is_some_and(|last| now.duration_since(*last) < PROGRESS_COALESCE_INTERVAL);
        if coalesced {
            return false;
        }
        self.progress_emitted.insert(info_hash, now);
        true
    }

    fn mark_degraded(&mut self, component: &str, detail: Option<&str>) {
        if self.degraded.insert(component.to_owned()) {
            warn!(
                component,
                detail = detail.unwrap_or("unavailable"),
                "engine component degraded"
            );
            let _ = self.events.publish(Event::HealthChanged {
                degraded: self.degraded.iter().cloned().collect(),
            });
        } else {
            debug!(
                component,
                detail = detail.unwrap_or("unavailable"),
                "engine component still degraded"
            );
        }
    }

    fn mark_recovered(&mut self, component: &str) {
        if self.degraded.remove(component) {
            info!(component, "engine component recovered");
            let _ = self.events.publish(Event::HealthChanged {
                degraded: self.degraded.iter().cloned().collect(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use async_trait::async_trait;
    use ebbtide_core::{AddTorrentOptions, TorrentProgress, TorrentRates};
    use ebbtide_events::EventStream;
    use tempfile::TempDir;

    use super::*;
    use crate::session::StubSession;
    use crate::types::EngineRuntimeConfig;

    fn sample_hash(tag: u8) -> InfoHash {
        InfoHash::parse(&format!("{:040x}", u128::from(tag))).unwrap()
    }

    fn magnet_request(info_hash: InfoHash) -> AddTorrent {
        AddTorrent {
            info_hash: Some(info_hash),
            source: TorrentSource::magnet(format!("magnet:?xt=urn:btih:{info_hash}")),
            options: AddTorrentOptions::default(),
            fastresume: None,
        }
    }

    async fn next_event(stream: &mut EventStream, millis: u64) -> Option<Event> {
        tokio::time::timeout(Duration::from_millis(millis), stream.next())
            .await
            .ok()
            .flatten()
            .map(|envelope| envelope.event)
    }

    #[tokio::test]
    async fn progress_updates_are_coalesced() {
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let mut worker = Worker::new(events, Box::new(StubSession::default()), None);
        let info_hash = sample_hash(1);
        for index in 0..4_u64 {
            worker.publish_engine_event(EngineEvent::Progress {
                info_hash,
                progress: TorrentProgress {
                    bytes_downloaded: index * 100,
                    bytes_total: 1_000,
                },
                rates: TorrentRates::default(),
                peers: 3,
            });
        }
        let mut seen = 0;
        while let Some(event) = next_event(&mut stream, 50).await {
            if matches!(event, Event::Progress { .. }) {
                seen += 1;
            }
        }
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn resume_data_writes_artifacts_and_announces() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let mut worker = Worker::new(events, Box::new(StubSession::default()), Some(store.clone()));
        let info_hash = sample_hash(2);
        worker.publish_engine_event(EngineEvent::ResumeData {
            info_hash,
            payload: vec![1; 64],
            metadata: Some(vec![2; 256]),
            magnet_uri: None,
        });
        assert_eq!(
            store.read(info_hash, ArtifactKind::FastResume).unwrap(),
            Some(vec![1; 64])
        );
        assert_eq!(
            store.read(info_hash, ArtifactKind::Metadata).unwrap(),
            Some(vec![2; 256])
        );
        assert_eq!(store.read(info_hash, ArtifactKind::Magnet).unwrap(), None);
        let event = next_event(&mut stream, 50).await.unwrap();
        assert!(matches!(event, Event::ResumePersisted { info_hash: hash } if hash == info_hash));
    }

    #[tokio::test]
    async fn metadata_is_saved_once() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let events = EventBus::new();
        let mut worker = Worker::new(events, Box::new(StubSession::default()), Some(store.clone()));
        let info_hash = sample_hash(3);
        let received = EngineEvent::MetadataReceived {
            info_hash,
            name: Some("sample".to_owned()),
            metadata: vec![5; 200],
        };
        worker.publish_engine_event(received.clone());
        let path = dir.path().join(format!("{info_hash}.torrent"));
        assert!(path.exists());

        std::fs::remove_file(&path).unwrap();
        worker.publish_engine_event(received);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn magnet_add_persists_fallback_immediately() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let events = EventBus::new();
        let mut worker = Worker::new(events, Box::new(StubSession::default()), Some(store.clone()));
        let info_hash = sample_hash(4);
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(info_hash))))
            .await
            .unwrap();
        let stored = store.read(info_hash, ArtifactKind::Magnet).unwrap().unwrap();
        assert!(String::from_utf8(stored).unwrap().starts_with("magnet:?xt=urn:btih:"));
    }

    #[tokio::test]
    async fn rejected_add_does_not_degrade_the_session() {
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let mut worker = Worker::new(events, Box::new(StubSession::default()), None);
        let info_hash = sample_hash(5);
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(info_hash))))
            .await
            .unwrap();
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(info_hash))))
            .await
            .unwrap();
        let mut saw_failed = false;
        while let Some(event) = next_event(&mut stream, 50).await {
            assert!(!matches!(event, Event::HealthChanged { .. }));
            if matches!(
                event,
                Event::StateChanged {
                    state: TorrentState::Failed { .. },
                    ..
                }
            ) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn persist_all_reports_unanswered_torrents() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let answered = sample_hash(6);
        let silent = sample_hash(7);
        let mut session = StubSession::default();
        session.withhold_resume_data_for(silent);
        let events = EventBus::new();
        let mut worker = Worker::new(events, Box::new(session), Some(store.clone()));
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(answered))))
            .await
            .unwrap();
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(silent))))
            .await
            .unwrap();

        let (tx, rx) = oneshot::channel();
        worker
            .handle(EngineCommand::PersistAll {
                grace: Duration::from_millis(300),
                respond_to: tx,
            })
            .await
            .unwrap();
        let report = rx.await.unwrap();
        assert_eq!(report.persisted, vec![answered]);
        assert_eq!(report.missed, vec![silent]);
        assert!(!report.is_complete());
        assert!(store.read(answered, ArtifactKind::FastResume).unwrap().is_some());
        assert!(store.read(silent, ArtifactKind::FastResume).unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_all_counts_rejected_resume_data_as_missed() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let info_hash = sample_hash(8);
        let mut session = StubSession::default();
        session.refuse_resume_data_for(info_hash);
        let events = EventBus::new();
        let mut worker = Worker::new(events, Box::new(session), Some(store));
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(info_hash))))
            .await
            .unwrap();

        let (tx, rx) = oneshot::channel();
        worker
            .handle(EngineCommand::PersistAll {
                grace: Duration::from_millis(300),
                respond_to: tx,
            })
            .await
            .unwrap();
        let report = rx.await.unwrap();
        assert!(report.persisted.is_empty());
        assert_eq!(report.missed, vec![info_hash]);
    }

    #[tokio::test]
    async fn persist_all_isolates_write_failures() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        store.ensure_initialized().unwrap();
        let blocked = sample_hash(9);
        let healthy = sample_hash(10);
        // A directory squatting on the fastresume path makes the rename fail
        // for this torrent only.
        std::fs::create_dir(dir.path().join(format!("{blocked}.fastresume"))).unwrap();

        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let mut worker = Worker::new(events, Box::new(StubSession::default()), Some(store.clone()));
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(blocked))))
            .await
            .unwrap();
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(healthy))))
            .await
            .unwrap();

        let (tx, rx) = oneshot::channel();
        worker
            .handle(EngineCommand::PersistAll {
                grace: Duration::from_millis(500),
                respond_to: tx,
            })
            .await
            .unwrap();
        let report = rx.await.unwrap();
        assert_eq!(report.persisted, vec![healthy]);
        assert_eq!(report.missed, vec![blocked]);
        assert!(store.read(healthy, ArtifactKind::FastResume).unwrap().is_some());

        let mut saw_degraded = false;
        while let Some(event) = next_event(&mut stream, 50).await {
            if let Event::HealthChanged { degraded } = event
                && degraded.contains(&"resume_store".to_owned())
            {
                saw_degraded = true;
            }
        }
        assert!(saw_degraded);
    }

    #[tokio::test]
    async fn remove_deletes_resume_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let mut worker = Worker::new(events, Box::new(StubSession::default()), Some(store.clone()));
        let info_hash = sample_hash(11);
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(info_hash))))
            .await
            .unwrap();
        store
            .write(info_hash, ArtifactKind::FastResume, &[9; 64])
            .unwrap();

        worker
            .handle(EngineCommand::Remove {
                info_hash,
                options: RemoveTorrent::default(),
            })
            .await
            .unwrap();
        assert_eq!(store.read(info_hash, ArtifactKind::FastResume).unwrap(), None);
        assert_eq!(store.read(info_hash, ArtifactKind::Magnet).unwrap(), None);

        let mut saw_removed = false;
        while let Some(event) = next_event(&mut stream, 50).await {
            if matches!(event, Event::TorrentRemoved { .. }) {
                saw_removed = true;
            }
        }
        assert!(saw_removed);
    }

    #[tokio::test]
    async fn abandoning_a_remove_keeps_resume_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let events = EventBus::new();
        let mut worker = Worker::new(events, Box::new(StubSession::default()), Some(store.clone()));
        let info_hash = sample_hash(12);
        worker
            .handle(EngineCommand::Add(Box::new(magnet_request(info_hash))))
            .await
            .unwrap();
        store
            .write(info_hash, ArtifactKind::FastResume, &[9; 64])
            .unwrap();

        worker
            .handle(EngineCommand::Remove {
                info_hash,
                options: RemoveTorrent {
                    with_data: false,
                    keep_artifacts: true,
                },
            })
            .await
            .unwrap();
        assert!(store.read(info_hash, ArtifactKind::FastResume).unwrap().is_some());
        assert!(store.read(info_hash, ArtifactKind::Magnet).unwrap().is_some());
    }

    struct ErrorSession;

    #[async_trait]
    impl EngineSession for ErrorSession {
        async fn add_torrent(&mut self, _request: &AddTorrent) -> Result<InfoHash> {
            Err(anyhow!("session offline"))
        }

        async fn remove_torrent(
            &mut self,
            _info_hash: InfoHash,
            _options: &RemoveTorrent,
        ) -> Result<()> {
            Err(anyhow!("session offline"))
        }

        async fn load_fastresume(&mut self, _info_hash: InfoHash, _payload: &[u8]) -> Result<()> {
            Err(anyhow!("session offline"))
        }

        async fn recheck(&mut self, _info_hash: InfoHash) -> Result<()> {
            Err(anyhow!("session offline"))
        }

        async fn request_resume_data(&mut self, _info_hash: InfoHash) -> Result<()> {
            Err(anyhow!("session offline"))
        }

        async fn active_torrents(&mut self) -> Result<Vec<InfoHash>> {
            Err(anyhow!("session offline"))
        }

        async fn poll_events(&mut self) -> Result<Vec<EngineEvent>> {
            Err(anyhow!("session offline"))
        }

        async fn apply_config(&mut self, _config: &EngineRuntimeConfig) -> Result<()> {
            Err(anyhow!("session offline"))
        }
    }

    #[tokio::test]
    async fn poll_failure_marks_session_degraded() {
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn(events, rx, Box::new(ErrorSession), None);

        let event = next_event(&mut stream, 1_000).await.unwrap();
        assert!(
            matches!(event, Event::HealthChanged { degraded } if degraded.contains(&"session".to_owned()))
        );

        drop(tx);
        handle.await.unwrap();
    }
}
