//! In-memory player used by the host until a real media backend is attached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde_json::{Value, json};
use session_dispatch::{
    CommandError, Completion, ControllerInfo, MediaItem, PlayerAction, PlayerCommand,
    PlayerCommands, PlayerResource, PlayerSnapshot, Rating, RepeatMode, SessionRequest,
    SessionResult, SurfaceId,
};
use tracing::debug;

const SEEK_INCREMENT_MS: i64 = 10_000;
const PREPARE_DELAY: Duration = Duration::from_millis(20);
const LIBRARY_ROOT: &str = "root";

pub struct MemoryPlayer {
    playlist: Vec<MediaItem>,
    playlist_metadata: Value,
    index: usize,
    position_ms: i64,
    play_when_ready: bool,
    prepared: Arc<AtomicBool>,
    speed: f32,
    pitch: f32,
    repeat: RepeatMode,
    shuffle: bool,
    volume: f32,
    device_volume: u32,
    device_muted: bool,
    surface: Option<SurfaceId>,
    ratings: HashMap<String, Rating>,
    library: Vec<MediaItem>,
    subscriptions: HashSet<String>,
}

impl Default for MemoryPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlayer {
    pub fn new() -> Self {
        Self {
            playlist: Vec::new(),
            playlist_metadata: Value::Null,
            index: 0,
            position_ms: 0,
            play_when_ready: false,
            prepared: Arc::new(AtomicBool::new(false)),
            speed: 1.0,
            pitch: 1.0,
            repeat: RepeatMode::Off,
            shuffle: false,
            volume: 1.0,
            device_volume: 10,
            device_muted: false,
            surface: None,
            ratings: HashMap::new(),
            library: Vec::new(),
            subscriptions: HashSet::new(),
        }
    }

    /// Browsable items under the library root.
    pub fn with_library(mut self, items: Vec<MediaItem>) -> Self {
        self.library = items;
        self
    }

    fn available_commands() -> PlayerCommands {
        PlayerCommands::all().without(PlayerCommand::SetTrackSelectionParameters)
    }

    fn current(&self) -> Option<&MediaItem> {
        self.playlist.get(self.index)
    }

    fn jump_to(&mut self, index: usize, position_ms: i64) -> Result<(), CommandError> {
        if index >= self.playlist.len() {
            return Err(CommandError::Failed(format!(
                "item {index} out of range ({} items)",
                self.playlist.len()
            )));
        }
        self.index = index;
        self.position_ms = position_ms.max(0);
        Ok(())
    }

    fn step(&mut self, forward: bool) -> Result<(), CommandError> {
        let len = self.playlist.len();
        if len == 0 {
            return Err(CommandError::Failed("playlist is empty".into()));
        }
        let next = match (forward, self.repeat) {
            (_, RepeatMode::One) => self.index,
            (true, RepeatMode::All) => (self.index + 1) % len,
            (false, RepeatMode::All) => (self.index + len - 1) % len,
            (true, RepeatMode::Off) => (self.index + 1).min(len - 1),
            (false, RepeatMode::Off) => self.index.saturating_sub(1),
        };
        self.jump_to(next, 0)
    }

    fn apply_now(&mut self, action: &PlayerAction) -> Result<(), CommandError> {
        use PlayerAction::*;
        match action {
            Play => self.play_when_ready = true,
            Pause => self.play_when_ready = false,
            SetPlayWhenReady { play_when_ready } => self.play_when_ready = *play_when_ready,
            Prepare => self.prepared.store(true, Ordering::SeqCst),
            Stop => {
                self.play_when_ready = false;
                self.prepared.store(false, Ordering::SeqCst);
                self.position_ms = 0;
            }
            SeekToDefaultPosition => self.position_ms = 0,
            SeekTo { position_ms } => self.position_ms = (*position_ms).max(0),
            SeekToItem { index, position_ms } => {
                self.jump_to(*index, position_ms.unwrap_or(0))?
            }
            SeekBack => self.position_ms = (self.position_ms - SEEK_INCREMENT_MS).max(0),
            SeekForward => self.position_ms = self.position_ms.saturating_add(SEEK_INCREMENT_MS),
            SeekToPrevious => {
                if self.position_ms > SEEK_INCREMENT_MS / 2 {
                    self.position_ms = 0;
                } else {
                    self.step(false)?;
                }
            }
            SeekToPreviousItem => self.step(false)?,
            SeekToNext | SeekToNextItem => self.step(true)?,
            SetPlaybackSpeed { speed } => self.speed = *speed,
            SetPlaybackParameters { speed, pitch } => {
                self.speed = *speed;
                self.pitch = *pitch;
            }
            SetRepeatMode { mode } => self.repeat = *mode,
            SetShuffleMode { enabled } => self.shuffle = *enabled,
            SetMediaItem {
                item,
                reset_position,
            } => {
                self.playlist = vec![item.clone()];
                self.index = 0;
                if *reset_position {
                    self.position_ms = 0;
                }
            }
            SetMediaItems {
                items,
                start_index,
                start_position_ms,
            } => {
                self.playlist = items.clone();
                self.index = 0;
                self.position_ms = 0;
                if let Some(index) = start_index {
                    self.jump_to(*index, start_position_ms.unwrap_or(0))?;
                }
            }
            AddMediaItems { index, items } => {
                let at = index.unwrap_or(self.playlist.len()).min(self.playlist.len());
                if at <= self.index && !self.playlist.is_empty() {
                    self.index += items.len();
                }
                self.playlist.splice(at..at, items.iter().cloned());
            }
            RemoveMediaItems { from, to } => {
                let to = (*to).min(self.playlist.len());
                let from = (*from).min(to);
                self.playlist.drain(from..to);
                if self.index >= to {
                    self.index -= to - from;
                } else if self.index >= from {
                    self.index = from;
                    self.position_ms = 0;
                }
                self.index = self.index.min(self.playlist.len().saturating_sub(1));
            }
            MoveMediaItems { from, to, new_index } => {
                let to = (*to).min(self.playlist.len());
                let from = (*from).min(to);
                let moved: Vec<_> = self.playlist.drain(from..to).collect();
                let at = (*new_index).min(self.playlist.len());
                self.playlist.splice(at..at, moved);
            }
            ClearMediaItems => {
                self.playlist.clear();
                self.index = 0;
                self.position_ms = 0;
            }
            SetPlaylistMetadata { metadata } => self.playlist_metadata = metadata.clone(),
            SetVolume { volume } => self.volume = *volume,
            SetDeviceVolume { volume } => self.device_volume = *volume,
            IncreaseDeviceVolume => self.device_volume = self.device_volume.saturating_add(1),
            DecreaseDeviceVolume => self.device_volume = self.device_volume.saturating_sub(1),
            SetDeviceMuted { muted } => self.device_muted = *muted,
            SetVideoSurface { surface } => self.surface = *surface,
            SetTrackSelectionParameters { .. } => {
                return Err(CommandError::Unsupported(action.name().into()));
            }
        }
        Ok(())
    }

    fn find(&self, media_id: &str) -> Option<&MediaItem> {
        self.library
            .iter()
            .chain(self.playlist.iter())
            .find(|item| item.media_id == media_id)
    }

    fn matches(&self, query: &str) -> Vec<&MediaItem> {
        let needle = query.to_lowercase();
        self.library
            .iter()
            .filter(|item| {
                item.media_id.to_lowercase().contains(&needle)
                    || item.metadata.to_string().to_lowercase().contains(&needle)
            })
            .collect()
    }
}

fn page_of<'a>(items: &[&'a MediaItem], page: i32, page_size: i32) -> Vec<&'a MediaItem> {
    let size = page_size.max(1) as usize;
    items
        .iter()
        .skip(page.max(0) as usize * size)
        .take(size)
        .copied()
        .collect()
}

impl PlayerResource for MemoryPlayer {
    fn apply(&mut self, controller: &ControllerInfo, action: &PlayerAction) -> Completion {
        debug!(
            target = "session_host.player",
            controller = %controller.identity,
            action = action.name(),
            "applying"
        );
        if matches!(action, PlayerAction::Prepare) {
            let prepared = Arc::clone(&self.prepared);
            return Completion::Deferred(
                async move {
                    tokio::time::sleep(PREPARE_DELAY).await;
                    prepared.store(true, Ordering::SeqCst);
                    Ok(SessionResult::success())
                }
                .boxed(),
            );
        }
        self.apply_now(action)
            .map(|()| SessionResult::success())
            .into()
    }

    fn handle_session_request(
        &mut self,
        controller: &ControllerInfo,
        request: &SessionRequest,
    ) -> Completion {
        use SessionRequest::*;
        debug!(
            target = "session_host.player",
            controller = %controller.identity,
            request = request.name(),
            "session request"
        );
        let outcome = match request {
            Custom(command) if command.action == "echo" => {
                Ok(SessionResult::success_with(command.args.clone()))
            }
            Custom(command) => Err(CommandError::Unsupported(command.action.clone())),
            SetRating { media_id, rating } => {
                match media_id
                    .clone()
                    .or_else(|| self.current().map(|item| item.media_id.clone()))
                {
                    Some(id) => {
                        self.ratings.insert(id, *rating);
                        Ok(SessionResult::success())
                    }
                    None => Err(CommandError::Failed("nothing to rate".into())),
                }
            }
            GetLibraryRoot { .. } => Ok(SessionResult::success_with(json!({
                "media_id": LIBRARY_ROOT,
                "children": self.library.len(),
            }))),
            GetItem { media_id } => match self.find(media_id) {
                Some(item) => Ok(SessionResult::success_with(json!(item))),
                None => Err(CommandError::Failed(format!("unknown item {media_id}"))),
            },
            GetChildren {
                parent_id,
                page,
                page_size,
                ..
            } => {
                if parent_id != LIBRARY_ROOT {
                    Ok(SessionResult::success_with(json!([])))
                } else {
                    let all: Vec<_> = self.library.iter().collect();
                    Ok(SessionResult::success_with(json!(page_of(
                        &all, *page, *page_size
                    ))))
                }
            }
            Search { query, .. } => Ok(SessionResult::success_with(json!({
                "query": query,
                "count": self.matches(query).len(),
            }))),
            GetSearchResult {
                query,
                page,
                page_size,
                ..
            } => {
                let hits = self.matches(query);
                Ok(SessionResult::success_with(json!(page_of(
                    &hits, *page, *page_size
                ))))
            }
            Subscribe { parent_id, .. } => {
                self.subscriptions.insert(parent_id.clone());
                Ok(SessionResult::success())
            }
            Unsubscribe { parent_id } => {
                self.subscriptions.remove(parent_id);
                Ok(SessionResult::success())
            }
        };
        outcome.into()
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            available_commands: Self::available_commands(),
            state: json!({
                "playing": self.play_when_ready && self.prepared.load(Ordering::SeqCst),
                "play_when_ready": self.play_when_ready,
                "prepared": self.prepared.load(Ordering::SeqCst),
                "media_id": self.current().map(|item| item.media_id.clone()),
                "index": self.index,
                "items": self.playlist.len(),
                "position_ms": self.position_ms,
                "speed": self.speed,
                "pitch": self.pitch,
                "repeat": self.repeat,
                "shuffle": self.shuffle,
                "volume": self.volume,
                "device_volume": self.device_volume,
                "device_muted": self.device_muted,
                "surface": self.surface,
                "playlist_metadata": self.playlist_metadata,
                "rating": self.current().and_then(|item| self.ratings.get(&item.media_id)),
                "subscriptions": self.subscriptions.len(),
            }),
        }
    }
}
