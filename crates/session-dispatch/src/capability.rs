//! Capability sets granted to a controller.
//!
//! Two independent domains are tracked: a closed set of player command flags
//! stored as a bitmask, and an open set of session commands (coded commands
//! plus custom actions). A [`Capabilities`] value is immutable; owners swap
//! the whole value when authorization changes.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Player-level operations a controller may be allowed to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerCommand {
    PlayPause,
    Prepare,
    Stop,
    SeekToDefaultPosition,
    SeekInCurrentItem,
    SeekToPreviousItem,
    SeekToPrevious,
    SeekToNextItem,
    SeekToNext,
    SeekToItem,
    SeekBack,
    SeekForward,
    SetSpeedAndPitch,
    SetShuffleMode,
    SetRepeatMode,
    ChangeMediaItems,
    SetMediaItem,
    SetPlaylistMetadata,
    SetVolume,
    SetDeviceVolume,
    AdjustDeviceVolume,
    SetVideoSurface,
    SetTrackSelectionParameters,
}

impl PlayerCommand {
    pub const ALL: [PlayerCommand; 23] = [
        PlayerCommand::PlayPause,
        PlayerCommand::Prepare,
        PlayerCommand::Stop,
        PlayerCommand::SeekToDefaultPosition,
        PlayerCommand::SeekInCurrentItem,
        PlayerCommand::SeekToPreviousItem,
        PlayerCommand::SeekToPrevious,
        PlayerCommand::SeekToNextItem,
        PlayerCommand::SeekToNext,
        PlayerCommand::SeekToItem,
        PlayerCommand::SeekBack,
        PlayerCommand::SeekForward,
        PlayerCommand::SetSpeedAndPitch,
        PlayerCommand::SetShuffleMode,
        PlayerCommand::SetRepeatMode,
        PlayerCommand::ChangeMediaItems,
        PlayerCommand::SetMediaItem,
        PlayerCommand::SetPlaylistMetadata,
        PlayerCommand::SetVolume,
        PlayerCommand::SetDeviceVolume,
        PlayerCommand::AdjustDeviceVolume,
        PlayerCommand::SetVideoSurface,
        PlayerCommand::SetTrackSelectionParameters,
    ];

    fn bit(self) -> u64 {
        1u64 << (self as u32)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerCommand::PlayPause => "play_pause",
            PlayerCommand::Prepare => "prepare",
            PlayerCommand::Stop => "stop",
            PlayerCommand::SeekToDefaultPosition => "seek_to_default_position",
            PlayerCommand::SeekInCurrentItem => "seek_in_current_item",
            PlayerCommand::SeekToPreviousItem => "seek_to_previous_item",
            PlayerCommand::SeekToPrevious => "seek_to_previous",
            PlayerCommand::SeekToNextItem => "seek_to_next_item",
            PlayerCommand::SeekToNext => "seek_to_next",
            PlayerCommand::SeekToItem => "seek_to_item",
            PlayerCommand::SeekBack => "seek_back",
            PlayerCommand::SeekForward => "seek_forward",
            PlayerCommand::SetSpeedAndPitch => "set_speed_and_pitch",
            PlayerCommand::SetShuffleMode => "set_shuffle_mode",
            PlayerCommand::SetRepeatMode => "set_repeat_mode",
            PlayerCommand::ChangeMediaItems => "change_media_items",
            PlayerCommand::SetMediaItem => "set_media_item",
            PlayerCommand::SetPlaylistMetadata => "set_playlist_metadata",
            PlayerCommand::SetVolume => "set_volume",
            PlayerCommand::SetDeviceVolume => "set_device_volume",
            PlayerCommand::AdjustDeviceVolume => "adjust_device_volume",
            PlayerCommand::SetVideoSurface => "set_video_surface",
            PlayerCommand::SetTrackSelectionParameters => "set_track_selection_parameters",
        }
    }
}

impl fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitmask set of [`PlayerCommand`] flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<PlayerCommand>", into = "Vec<PlayerCommand>")]
pub struct PlayerCommands {
    bits: u64,
}

impl PlayerCommands {
    pub const EMPTY: PlayerCommands = PlayerCommands { bits: 0 };

    pub fn all() -> Self {
        PlayerCommand::ALL.iter().copied().collect()
    }

    pub fn contains(&self, command: PlayerCommand) -> bool {
        self.bits & command.bit() != 0
    }

    pub fn with(mut self, command: PlayerCommand) -> Self {
        self.bits |= command.bit();
        self
    }

    pub fn without(mut self, command: PlayerCommand) -> Self {
        self.bits &= !command.bit();
        self
    }

    pub fn intersection(&self, other: &PlayerCommands) -> PlayerCommands {
        PlayerCommands {
            bits: self.bits & other.bits,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = PlayerCommand> + '_ {
        PlayerCommand::ALL
            .iter()
            .copied()
            .filter(move |command| self.contains(*command))
    }
}

impl FromIterator<PlayerCommand> for PlayerCommands {
    fn from_iter<I: IntoIterator<Item = PlayerCommand>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PlayerCommands::EMPTY, |set, command| set.with(command))
    }
}

impl From<Vec<PlayerCommand>> for PlayerCommands {
    fn from(commands: Vec<PlayerCommand>) -> Self {
        commands.into_iter().collect()
    }
}

impl From<PlayerCommands> for Vec<PlayerCommand> {
    fn from(commands: PlayerCommands) -> Self {
        commands.iter().collect()
    }
}

impl fmt::Debug for PlayerCommands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Fixed session-level commands identified by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCommandCode {
    SetRating,
    LibraryGetRoot,
    LibraryGetItem,
    LibraryGetChildren,
    LibrarySearch,
    LibraryGetSearchResult,
    LibrarySubscribe,
    LibraryUnsubscribe,
}

impl SessionCommandCode {
    pub const ALL: [SessionCommandCode; 8] = [
        SessionCommandCode::SetRating,
        SessionCommandCode::LibraryGetRoot,
        SessionCommandCode::LibraryGetItem,
        SessionCommandCode::LibraryGetChildren,
        SessionCommandCode::LibrarySearch,
        SessionCommandCode::LibraryGetSearchResult,
        SessionCommandCode::LibrarySubscribe,
        SessionCommandCode::LibraryUnsubscribe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionCommandCode::SetRating => "set_rating",
            SessionCommandCode::LibraryGetRoot => "library_get_root",
            SessionCommandCode::LibraryGetItem => "library_get_item",
            SessionCommandCode::LibraryGetChildren => "library_get_children",
            SessionCommandCode::LibrarySearch => "library_search",
            SessionCommandCode::LibraryGetSearchResult => "library_get_search_result",
            SessionCommandCode::LibrarySubscribe => "library_subscribe",
            SessionCommandCode::LibraryUnsubscribe => "library_unsubscribe",
        }
    }

    pub fn is_library(&self) -> bool {
        !matches!(self, SessionCommandCode::SetRating)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionCommand {
    Coded { code: SessionCommandCode },
    Custom { action: String },
}

impl SessionCommand {
    pub fn custom(action: impl Into<String>) -> Self {
        SessionCommand::Custom {
            action: action.into(),
        }
    }
}

impl From<SessionCommandCode> for SessionCommand {
    fn from(code: SessionCommandCode) -> Self {
        SessionCommand::Coded { code }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCommands {
    commands: BTreeSet<SessionCommand>,
}

impl SessionCommands {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every coded command; custom actions still have to be granted by name.
    pub fn all_coded() -> Self {
        SessionCommandCode::ALL
            .iter()
            .copied()
            .map(SessionCommand::from)
            .collect()
    }

    pub fn with(mut self, command: impl Into<SessionCommand>) -> Self {
        self.commands.insert(command.into());
        self
    }

    pub fn with_custom(self, action: impl Into<String>) -> Self {
        self.with(SessionCommand::custom(action))
    }

    pub fn contains(&self, command: &SessionCommand) -> bool {
        self.commands.contains(command)
    }

    pub fn contains_code(&self, code: SessionCommandCode) -> bool {
        self.commands.contains(&SessionCommand::Coded { code })
    }

    pub fn contains_custom(&self, action: &str) -> bool {
        self.commands.iter().any(|command| {
            matches!(command, SessionCommand::Custom { action: granted } if granted == action)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionCommand> {
        self.commands.iter()
    }
}

impl FromIterator<SessionCommand> for SessionCommands {
    fn from_iter<I: IntoIterator<Item = SessionCommand>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

/// What a dispatched command needs to be allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredCapability<'a> {
    Player(PlayerCommand),
    Session(SessionCommandCode),
    Custom(&'a str),
}

impl fmt::Display for RequiredCapability<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredCapability::Player(command) => write!(f, "player:{command}"),
            RequiredCapability::Session(code) => write!(f, "session:{}", code.as_str()),
            RequiredCapability::Custom(action) => write!(f, "custom:{action}"),
        }
    }
}

/// The full grant held by one controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub session: SessionCommands,
    pub player: PlayerCommands,
}

impl Capabilities {
    pub fn new(session: SessionCommands, player: PlayerCommands) -> Self {
        Self { session, player }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn everything() -> Self {
        Self::new(SessionCommands::all_coded(), PlayerCommands::all())
    }

    pub fn is_available(&self, required: &RequiredCapability<'_>) -> bool {
        match required {
            RequiredCapability::Player(command) => self.player.contains(*command),
            RequiredCapability::Session(code) => self.session.contains_code(*code),
            RequiredCapability::Custom(action) => self.session.contains_custom(action),
        }
    }
}
