//! In-memory session backend.
//!
//! Stands in for a native BitTorrent session: it tracks torrents, answers
//! resume-data requests with synthetic payloads, and buffers events for the
//! worker to poll. No networking happens here.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use ebbtide_core::{
    AddTorrent, EngineEvent, InfoHash, RemoveTorrent, TorrentSource, TorrentState, magnet_for,
    parse_magnet,
};

use super::EngineSession;
use crate::types::EngineRuntimeConfig;

#[derive(Debug, Default)]
pub(crate) struct StubSession {
    torrents: HashMap<InfoHash, StubTorrent>,
    pending_events: Vec<EngineEvent>,
    download_root: Option<PathBuf>,
    refuse_resume_for: HashSet<InfoHash>,
    withhold_resume_for: HashSet<InfoHash>,
}

#[derive(Debug)]
struct StubTorrent {
    name: Option<String>,
    metadata: Option<Vec<u8>>,
    trackers: Vec<String>,
    magnet_uri: Option<String>,
    download_dir: Option<PathBuf>,
    state: TorrentState,
    resume_payload: Option<Vec<u8>>,
}

impl StubSession {
    fn torrent_mut(&mut self, info_hash: InfoHash) -> Result<&mut StubTorrent> {
        self.torrents
            .get_mut(&info_hash)
            .ok_or_else(|| anyhow!("unknown torrent {info_hash}"))
    }

    fn resolve_info_hash(request: &AddTorrent) -> Result<InfoHash> {
        if let Some(info_hash) = request.info_hash {
            return Ok(info_hash);
        }
        match &request.source {
            TorrentSource::Magnet { uri } => Ok(parse_magnet(uri)?.info_hash),
            TorrentSource::Metainfo { bytes } => derive_info_hash(bytes),
        }
    }
}

/// Session-assigned identifier for metainfo payloads added without one.
///
/// Five chained FNV-1a words rendered as forty hex characters; a native
/// backend would compute the real v1 digest instead.
fn derive_info_hash(bytes: &[u8]) -> Result<InfoHash> {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut digest = String::with_capacity(40);
    let mut state = OFFSET;
    let mut salt: u64 = 0;
    for _ in 0..5 {
        salt += 1;
        state = state.wrapping_add(salt);
        for byte in bytes {
            state ^= u64::from(*byte);
            state = state.wrapping_mul(PRIME);
        }
        let _ = write!(digest, "{:08x}", state & 0xffff_ffff);
    }
    InfoHash::parse(&digest).map_err(|err| anyhow!("derived digest rejected: {err}"))
}

#[async_trait]
impl EngineSession for StubSession {
    async fn add_torrent(&mut self, request: &AddTorrent) -> Result<InfoHash> {
        let info_hash = Self::resolve_info_hash(request)?;
        if self.torrents.contains_key(&info_hash) {
            return Err(anyhow!("torrent {info_hash} is already active"));
        }

        let download_dir = request
            .options
            .download_dir
            .clone()
            .or_else(|| self.download_root.clone());

        let torrent = match &request.source {
            TorrentSource::Metainfo { bytes } => {
                let name = request.options.name_hint.clone();
                self.pending_events.push(EngineEvent::Added {
                    info_hash,
                    name: name.clone(),
                });
                self.pending_events.push(EngineEvent::MetadataReceived {
                    info_hash,
                    name: name.clone(),
                    metadata: bytes.clone(),
                });
                StubTorrent {
                    name,
                    metadata: Some(bytes.clone()),
                    trackers: request.options.trackers.clone(),
                    magnet_uri: None,
                    download_dir,
                    state: TorrentState::Queued,
                    resume_payload: None,
                }
            }
            TorrentSource::Magnet { uri } => {
                let magnet = parse_magnet(uri).ok();
                let name = request
                    .options
                    .name_hint
                    .clone()
                    .or_else(|| magnet.as_ref().and_then(|info| info.display_name.clone()));
                let mut trackers = request.options.trackers.clone();
                if let Some(info) = &magnet {
                    trackers.extend(info.trackers.iter().cloned());
                }
                self.pending_events.push(EngineEvent::Added {
                    info_hash,
                    name: name.clone(),
                });
                self.pending_events.push(EngineEvent::StateChanged {
                    info_hash,
                    state: TorrentState::FetchingMetadata,
                });
                StubTorrent {
                    name,
                    metadata: None,
                    trackers,
                    magnet_uri: Some(uri.clone()),
                    download_dir,
                    state: TorrentState::FetchingMetadata,
                    resume_payload: None,
                }
            }
        };
        self.torrents.insert(info_hash, torrent);
        Ok(info_hash)
    }

    async fn remove_torrent(&mut self, info_hash: InfoHash, _options: &RemoveTorrent) -> Result<()> {
        if self.torrents.remove(&info_hash).is_none() {
            return Err(anyhow!("unknown torrent {info_hash}"));
        }
        self.pending_events.push(EngineEvent::StateChanged {
            info_hash,
            state: TorrentState::Stopped,
        });
        Ok(())
    }

    async fn load_fastresume(&mut self, info_hash: InfoHash, payload: &[u8]) -> Result<()> {
        let torrent = self.torrent_mut(info_hash)?;
        torrent.resume_payload = Some(payload.to_vec());
        Ok(())
    }

    async fn recheck(&mut self, info_hash: InfoHash) -> Result<()> {
        let torrent = self.torrent_mut(info_hash)?;
        torrent.state = TorrentState::Checking;
        self.pending_events.push(EngineEvent::StateChanged {
            info_hash,
            state: TorrentState::Checking,
        });
        Ok(())
    }

    async fn request_resume_data(&mut self, info_hash: InfoHash) -> Result<()> {
        if self.withhold_resume_for.contains(&info_hash) {
            // Request accepted, answer never arrives.
            self.torrent_mut(info_hash)?;
            return Ok(());
        }
        if self.refuse_resume_for.contains(&info_hash) {
            self.torrent_mut(info_hash)?;
            self.pending_events.push(EngineEvent::ResumeDataFailed {
                info_hash,
                message: "resume data rejected".to_owned(),
            });
            return Ok(());
        }
        let torrent = self.torrent_mut(info_hash)?;
        let payload = torrent.resume_payload.clone().unwrap_or_else(|| {
            serde_json::json!({
                "info_hash": info_hash,
                "name": torrent.name,
                "state": torrent.state.label(),
                "save_path": torrent.download_dir,
            })
            .to_string()
            .into_bytes()
        });
        let metadata = torrent.metadata.clone();
        let magnet_uri = if metadata.is_some() {
            None
        } else {
            Some(torrent.magnet_uri.clone().unwrap_or_else(|| {
                magnet_for(info_hash, torrent.name.as_deref(), &torrent.trackers)
            }))
        };
        self.pending_events.push(EngineEvent::ResumeData {
            info_hash,
            payload,
            metadata,
            magnet_uri,
        });
        Ok(())
    }

    async fn active_torrents(&mut self) -> Result<Vec<InfoHash>> {
        let mut hashes: Vec<InfoHash> = self.torrents.keys().copied().collect();
        hashes.sort_unstable();
        Ok(hashes)
    }

    async fn poll_events(&mut self) -> Result<Vec<EngineEvent>> {
        Ok(std::mem::take(&mut self.pending_events))
    }

    async fn apply_config(&mut self, config: &EngineRuntimeConfig) -> Result<()> {
        self.download_root = Some(config.download_root.clone());
        Ok(())
    }
}

#[cfg(test)]
impl StubSession {
    /// Make resume-data requests for this torrent answer with a failure.
    pub(crate) fn refuse_resume_data_for(&mut self, info_hash: InfoHash) {
        self.refuse_resume_for.insert(info_hash);
    }

    /// Make resume-data requests for this torrent never answer.
    pub(crate) fn withhold_resume_data_for(&mut self, info_hash: InfoHash) {
        self.withhold_resume_for.insert(info_hash);
    }
}
