use std::{io, path::PathBuf};

use crate::{i18n::MessageKey, timer::TimerId};

/// Errors returned by timer commands.
///
/// None of these leave a timer half-mutated: every precondition is checked
/// before the first field is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("interval must be greater than zero")]
    InvalidInterval,
    #[error("max duration is shorter than a single interval")]
    InvalidMaxDuration,
    #[error("no timer with id {0}")]
    UnknownTimer(TimerId),
    #[error("timer {0} is already running")]
    AlreadyRunning(TimerId),
}

impl TimerError {
    /// The message a front end should show for this error.
    #[must_use]
    pub const fn message_key(&self) -> MessageKey {
        match self {
            Self::InvalidInterval => MessageKey::InvalidInterval,
            Self::InvalidMaxDuration => MessageKey::InvalidMaxDuration,
            Self::UnknownTimer(_) => MessageKey::UnknownTimer,
            Self::AlreadyRunning(_) => MessageKey::AlreadyRunning,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("couldn't access config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("couldn't parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't find a config directory for this platform")]
    NoConfigDir,
}

pub type Result<T, E = TimerError> = std::result::Result<T, E>;
