use std::{cell::RefCell, fs, io, path::PathBuf, rc::Rc};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::StorageError,
    i18n::Locale,
    orchestrator::ExecutionMode,
    timer::{self, Timer, TimerConfig, TimerId},
};

/// Records saved longer ago than this are thrown away on load.
#[must_use]
pub fn retention() -> TimeDelta {
    TimeDelta::days(30)
}

/// Settings of the stand-alone single timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleTimerSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub max_ms: u64,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "timer::always_true")]
    pub enable_warning_sound: bool,
    #[serde(default = "default_warning_cycles")]
    pub warning_cycles: u32,
}

const fn default_interval_ms() -> u64 {
    timer::DEFAULT_INTERVAL_MS
}

const fn default_volume() -> f32 {
    timer::DEFAULT_VOLUME
}

const fn default_warning_cycles() -> u32 {
    timer::DEFAULT_WARNING_CYCLES
}

impl Default for SingleTimerSettings {
    fn default() -> Self {
        Self {
            interval_ms: timer::DEFAULT_INTERVAL_MS,
            max_ms: 0,
            volume: timer::DEFAULT_VOLUME,
            enable_warning_sound: true,
            warning_cycles: timer::DEFAULT_WARNING_CYCLES,
        }
    }
}

impl From<&SingleTimerSettings> for TimerConfig {
    fn from(settings: &SingleTimerSettings) -> Self {
        Self {
            name: None,
            interval_ms: settings.interval_ms,
            max_ms: settings.max_ms,
            volume: settings.volume,
            warning_cycles: settings.warning_cycles,
            enable_warning_sound: settings.enable_warning_sound,
        }
    }
}

/// The durable part of the application state.
///
/// Scalars come first so the toml output keeps tables at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub repeat_sequence: bool,
    #[serde(default)]
    pub language: Locale,
    /// Id the next created timer gets. Older records without it fall back
    /// to one past the highest stored id.
    #[serde(default)]
    pub next_id: TimerId,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub single_timer: SingleTimerSettings,
    #[serde(default)]
    pub timers: Vec<Timer>,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::default(),
            repeat_sequence: false,
            language: Locale::default(),
            next_id: 1,
            saved_at: Utc::now(),
            single_timer: SingleTimerSettings::default(),
            timers: Vec::new(),
        }
    }
}

impl ConfigRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.saved_at) > retention()
    }

    /// # Errors
    /// If the record can't be represented as toml.
    pub fn to_toml(&self) -> Result<String, StorageError> {
        Ok(toml::to_string(self)?)
    }

    /// # Errors
    /// If `text` isn't a valid record.
    pub fn from_toml(text: &str) -> Result<Self, StorageError> {
        Ok(toml::from_str(text)?)
    }

    /// Parse a stored record, returning `None` for anything that should be
    /// treated as "nothing saved".
    fn restore(text: &str, now: DateTime<Utc>) -> Option<Self> {
        match Self::from_toml(text) {
            Ok(record) if record.is_expired(now) => {
                log::info!("discarding config saved at {}", record.saved_at);
                None
            }
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("discarding unreadable config: {e}");
                None
            }
        }
    }
}

/// Where configuration survives between runs.
pub trait Storage {
    /// # Errors
    /// When the record can't be written.
    fn save(&mut self, record: &ConfigRecord) -> Result<(), StorageError>;

    /// The saved record, if there is one that is readable and recent enough.
    /// Anything else is cleared.
    fn load(&mut self) -> Option<ConfigRecord>;

    /// # Errors
    /// When the stored record exists but can't be removed.
    fn clear(&mut self) -> Result<(), StorageError>;

    fn has_record(&self) -> bool;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn save(&mut self, record: &ConfigRecord) -> Result<(), StorageError> {
        (**self).save(record)
    }

    fn load(&mut self) -> Option<ConfigRecord> {
        (**self).load()
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        (**self).clear()
    }

    fn has_record(&self) -> bool {
        (**self).has_record()
    }
}

/// Toml file on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Storage at the platform config directory.
    ///
    /// # Errors
    /// If the platform has no config directory.
    pub fn at_default_path() -> Result<Self, StorageError> {
        Ok(Self::new(Self::config_path()?))
    }

    /// # Errors
    /// If the platform has no config directory.
    pub fn config_path() -> Result<PathBuf, StorageError> {
        let mut path = directories::ProjectDirs::from("", "", "interval_chime")
            .ok_or(StorageError::NoConfigDir)?
            .config_dir()
            .to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load_at(&mut self, now: DateTime<Utc>) -> Option<ConfigRecord> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("couldn't read {}: {e}", self.path.display());
                return None;
            }
        };
        let record = ConfigRecord::restore(&text, now);
        if record.is_none() {
            if let Err(e) = self.clear() {
                log::warn!("{e}");
            }
        }
        record
    }
}

impl Storage for FileStorage {
    fn save(&mut self, record: &ConfigRecord) -> Result<(), StorageError> {
        let text = record.to_toml()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        fs::write(&self.path, text).map_err(|e| self.io_error(e))
    }

    fn load(&mut self) -> Option<ConfigRecord> {
        self.load_at(Utc::now())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(self.io_error(e)),
            _ => Ok(()),
        }
    }

    fn has_record(&self) -> bool {
        self.path.exists()
    }
}

/// Keeps the serialized record in memory. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Rc<RefCell<Option<String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw stored text.
    #[must_use]
    pub fn contents(&self) -> Option<String> {
        self.slot.borrow().clone()
    }

    /// Overwrite the stored text, bypassing serialization.
    pub fn set_contents(&self, text: impl Into<String>) {
        *self.slot.borrow_mut() = Some(text.into());
    }
}

impl Storage for MemoryStorage {
    fn save(&mut self, record: &ConfigRecord) -> Result<(), StorageError> {
        let text = record.to_toml()?;
        *self.slot.borrow_mut() = Some(text);
        Ok(())
    }

    fn load(&mut self) -> Option<ConfigRecord> {
        let text = self.slot.borrow().clone()?;
        let record = ConfigRecord::restore(&text, Utc::now());
        if record.is_none() {
            *self.slot.borrow_mut() = None;
        }
        record
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        *self.slot.borrow_mut() = None;
        Ok(())
    }

    fn has_record(&self) -> bool {
        self.slot.borrow().is_some()
    }
}
