//! Decoded inbound commands.
//!
//! Parameters arrive already decoded; this module only knows which capability
//! each command needs and which shapes are too garbled to act on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capability::{PlayerCommand, RequiredCapability, SessionCommandCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub media_id: String,
    #[serde(default)]
    pub metadata: Value,
}

impl MediaItem {
    pub fn new(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            metadata: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum Rating {
    Unrated,
    Heart { liked: bool },
    Thumb { up: bool },
    Stars { max: u8, value: f32 },
    Percentage { value: f32 },
}

impl Rating {
    pub fn is_valid(&self) -> bool {
        match *self {
            Rating::Unrated | Rating::Heart { .. } | Rating::Thumb { .. } => true,
            Rating::Stars { max, value } => {
                (3..=5).contains(&max) && value.is_finite() && (0.0..=max as f32).contains(&value)
            }
            Rating::Percentage { value } => value.is_finite() && (0.0..=100.0).contains(&value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCommand {
    pub action: String,
    #[serde(default)]
    pub args: Value,
}

impl CustomCommand {
    pub fn new(action: impl Into<String>, args: Value) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }
}

/// Opaque handle to a rendering target owned by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u64);

/// Operations applied to the player resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlayerAction {
    Play,
    Pause,
    SetPlayWhenReady { play_when_ready: bool },
    Prepare,
    Stop,
    SeekToDefaultPosition,
    SeekTo { position_ms: i64 },
    SeekToItem { index: usize, position_ms: Option<i64> },
    SeekBack,
    SeekForward,
    SeekToPrevious,
    SeekToPreviousItem,
    SeekToNext,
    SeekToNextItem,
    SetPlaybackSpeed { speed: f32 },
    SetPlaybackParameters { speed: f32, pitch: f32 },
    SetRepeatMode { mode: RepeatMode },
    SetShuffleMode { enabled: bool },
    SetMediaItem { item: MediaItem, reset_position: bool },
    SetMediaItems {
        items: Vec<MediaItem>,
        start_index: Option<usize>,
        start_position_ms: Option<i64>,
    },
    AddMediaItems { index: Option<usize>, items: Vec<MediaItem> },
    RemoveMediaItems { from: usize, to: usize },
    MoveMediaItems { from: usize, to: usize, new_index: usize },
    ClearMediaItems,
    SetPlaylistMetadata { metadata: Value },
    SetVolume { volume: f32 },
    SetDeviceVolume { volume: u32 },
    IncreaseDeviceVolume,
    DecreaseDeviceVolume,
    SetDeviceMuted { muted: bool },
    SetVideoSurface { surface: Option<SurfaceId> },
    SetTrackSelectionParameters { parameters: Value },
}

impl PlayerAction {
    pub fn required_command(&self) -> PlayerCommand {
        use PlayerAction::*;
        match self {
            Play | Pause | SetPlayWhenReady { .. } => PlayerCommand::PlayPause,
            Prepare => PlayerCommand::Prepare,
            Stop => PlayerCommand::Stop,
            SeekToDefaultPosition => PlayerCommand::SeekToDefaultPosition,
            SeekTo { .. } => PlayerCommand::SeekInCurrentItem,
            SeekToItem { .. } => PlayerCommand::SeekToItem,
            SeekBack => PlayerCommand::SeekBack,
            SeekForward => PlayerCommand::SeekForward,
            SeekToPrevious => PlayerCommand::SeekToPrevious,
            SeekToPreviousItem => PlayerCommand::SeekToPreviousItem,
            SeekToNext => PlayerCommand::SeekToNext,
            SeekToNextItem => PlayerCommand::SeekToNextItem,
            SetPlaybackSpeed { .. } | SetPlaybackParameters { .. } => {
                PlayerCommand::SetSpeedAndPitch
            }
            SetRepeatMode { .. } => PlayerCommand::SetRepeatMode,
            SetShuffleMode { .. } => PlayerCommand::SetShuffleMode,
            SetMediaItem { .. } => PlayerCommand::SetMediaItem,
            SetMediaItems { .. }
            | AddMediaItems { .. }
            | RemoveMediaItems { .. }
            | MoveMediaItems { .. }
            | ClearMediaItems => PlayerCommand::ChangeMediaItems,
            SetPlaylistMetadata { .. } => PlayerCommand::SetPlaylistMetadata,
            SetVolume { .. } => PlayerCommand::SetVolume,
            SetDeviceVolume { .. } => PlayerCommand::SetDeviceVolume,
            IncreaseDeviceVolume | DecreaseDeviceVolume | SetDeviceMuted { .. } => {
                PlayerCommand::AdjustDeviceVolume
            }
            SetVideoSurface { .. } => PlayerCommand::SetVideoSurface,
            SetTrackSelectionParameters { .. } => PlayerCommand::SetTrackSelectionParameters,
        }
    }

    pub fn name(&self) -> &'static str {
        use PlayerAction::*;
        match self {
            Play => "play",
            Pause => "pause",
            SetPlayWhenReady { .. } => "set_play_when_ready",
            Prepare => "prepare",
            Stop => "stop",
            SeekToDefaultPosition => "seek_to_default_position",
            SeekTo { .. } => "seek_to",
            SeekToItem { .. } => "seek_to_item",
            SeekBack => "seek_back",
            SeekForward => "seek_forward",
            SeekToPrevious => "seek_to_previous",
            SeekToPreviousItem => "seek_to_previous_item",
            SeekToNext => "seek_to_next",
            SeekToNextItem => "seek_to_next_item",
            SetPlaybackSpeed { .. } => "set_playback_speed",
            SetPlaybackParameters { .. } => "set_playback_parameters",
            SetRepeatMode { .. } => "set_repeat_mode",
            SetShuffleMode { .. } => "set_shuffle_mode",
            SetMediaItem { .. } => "set_media_item",
            SetMediaItems { .. } => "set_media_items",
            AddMediaItems { .. } => "add_media_items",
            RemoveMediaItems { .. } => "remove_media_items",
            MoveMediaItems { .. } => "move_media_items",
            ClearMediaItems => "clear_media_items",
            SetPlaylistMetadata { .. } => "set_playlist_metadata",
            SetVolume { .. } => "set_volume",
            SetDeviceVolume { .. } => "set_device_volume",
            IncreaseDeviceVolume => "increase_device_volume",
            DecreaseDeviceVolume => "decrease_device_volume",
            SetDeviceMuted { .. } => "set_device_muted",
            SetVideoSurface { .. } => "set_video_surface",
            SetTrackSelectionParameters { .. } => "set_track_selection_parameters",
        }
    }

    pub fn validate(&self) -> Result<(), MalformedCommand> {
        use PlayerAction::*;
        match self {
            SetPlaybackSpeed { speed } => positive_finite("speed", *speed),
            SetPlaybackParameters { speed, pitch } => {
                positive_finite("speed", *speed)?;
                positive_finite("pitch", *pitch)
            }
            SetVolume { volume } => {
                if volume.is_finite() && (0.0..=1.0).contains(volume) {
                    Ok(())
                } else {
                    Err(MalformedCommand::OutOfRange("volume"))
                }
            }
            SetMediaItem { item, .. } => check_items(std::slice::from_ref(item)),
            SetMediaItems { items, .. } | AddMediaItems { items, .. } => check_items(items),
            RemoveMediaItems { from, to } | MoveMediaItems { from, to, .. } => {
                if from <= to {
                    Ok(())
                } else {
                    Err(MalformedCommand::OutOfRange("range"))
                }
            }
            _ => Ok(()),
        }
    }
}

fn positive_finite(field: &'static str, value: f32) -> Result<(), MalformedCommand> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MalformedCommand::OutOfRange(field))
    }
}

fn check_items(items: &[MediaItem]) -> Result<(), MalformedCommand> {
    if items.iter().any(|item| item.media_id.is_empty()) {
        return Err(MalformedCommand::Empty("media_id"));
    }
    Ok(())
}

fn non_empty(field: &'static str, value: &str) -> Result<(), MalformedCommand> {
    if value.is_empty() {
        Err(MalformedCommand::Empty(field))
    } else {
        Ok(())
    }
}

fn check_page(page: i32, page_size: i32) -> Result<(), MalformedCommand> {
    if page < 0 {
        return Err(MalformedCommand::OutOfRange("page"));
    }
    if page_size < 1 {
        return Err(MalformedCommand::OutOfRange("page_size"));
    }
    Ok(())
}

/// Session-level requests: ratings, library browsing and custom commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SessionRequest {
    Custom(CustomCommand),
    SetRating {
        media_id: Option<String>,
        rating: Rating,
    },
    GetLibraryRoot {
        #[serde(default)]
        params: Value,
    },
    GetItem {
        media_id: String,
    },
    GetChildren {
        parent_id: String,
        page: i32,
        page_size: i32,
        #[serde(default)]
        params: Value,
    },
    Search {
        query: String,
        #[serde(default)]
        params: Value,
    },
    GetSearchResult {
        query: String,
        page: i32,
        page_size: i32,
        #[serde(default)]
        params: Value,
    },
    Subscribe {
        parent_id: String,
        #[serde(default)]
        params: Value,
    },
    Unsubscribe {
        parent_id: String,
    },
}

impl SessionRequest {
    pub fn required(&self) -> RequiredCapability<'_> {
        use SessionRequest::*;
        let code = match self {
            Custom(command) => return RequiredCapability::Custom(&command.action),
            SetRating { .. } => SessionCommandCode::SetRating,
            GetLibraryRoot { .. } => SessionCommandCode::LibraryGetRoot,
            GetItem { .. } => SessionCommandCode::LibraryGetItem,
            GetChildren { .. } => SessionCommandCode::LibraryGetChildren,
            Search { .. } => SessionCommandCode::LibrarySearch,
            GetSearchResult { .. } => SessionCommandCode::LibraryGetSearchResult,
            Subscribe { .. } => SessionCommandCode::LibrarySubscribe,
            Unsubscribe { .. } => SessionCommandCode::LibraryUnsubscribe,
        };
        RequiredCapability::Session(code)
    }

    pub fn name(&self) -> &str {
        match self {
            SessionRequest::Custom(command) => &command.action,
            SessionRequest::SetRating { .. } => "set_rating",
            SessionRequest::GetLibraryRoot { .. } => "get_library_root",
            SessionRequest::GetItem { .. } => "get_item",
            SessionRequest::GetChildren { .. } => "get_children",
            SessionRequest::Search { .. } => "search",
            SessionRequest::GetSearchResult { .. } => "get_search_result",
            SessionRequest::Subscribe { .. } => "subscribe",
            SessionRequest::Unsubscribe { .. } => "unsubscribe",
        }
    }

    pub fn validate(&self) -> Result<(), MalformedCommand> {
        use SessionRequest::*;
        match self {
            Custom(command) => non_empty("action", &command.action),
            SetRating { media_id, rating } => {
                if let Some(media_id) = media_id {
                    non_empty("media_id", media_id)?;
                }
                if rating.is_valid() {
                    Ok(())
                } else {
                    Err(MalformedCommand::OutOfRange("rating"))
                }
            }
            GetLibraryRoot { .. } => Ok(()),
            GetItem { media_id } => non_empty("media_id", media_id),
            GetChildren {
                parent_id,
                page,
                page_size,
                ..
            } => {
                non_empty("parent_id", parent_id)?;
                check_page(*page, *page_size)
            }
            Search { query, .. } => non_empty("query", query),
            GetSearchResult {
                query,
                page,
                page_size,
                ..
            } => {
                non_empty("query", query)?;
                check_page(*page, *page_size)
            }
            Subscribe { parent_id, .. } | Unsubscribe { parent_id } => {
                non_empty("parent_id", parent_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum Command {
    Player(PlayerAction),
    Session(SessionRequest),
}

impl Command {
    pub fn required(&self) -> RequiredCapability<'_> {
        match self {
            Command::Player(action) => RequiredCapability::Player(action.required_command()),
            Command::Session(request) => request.required(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Command::Player(action) => action.name(),
            Command::Session(request) => request.name(),
        }
    }

    pub fn validate(&self) -> Result<(), MalformedCommand> {
        match self {
            Command::Player(action) => action.validate(),
            Command::Session(request) => request.validate(),
        }
    }
}

impl From<PlayerAction> for Command {
    fn from(action: PlayerAction) -> Self {
        Command::Player(action)
    }
}

impl From<SessionRequest> for Command {
    fn from(request: SessionRequest) -> Self {
        Command::Session(request)
    }
}

/// A decoded call that is well-typed but carries values nothing can act on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedCommand {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} out of range")]
    OutOfRange(&'static str),
}
