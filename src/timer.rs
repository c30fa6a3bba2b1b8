use std::{fmt, time::Duration, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TimerError},
    scheduler::TickToken,
};

pub type TimerId = u64;

pub const DEFAULT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_VOLUME: f32 = 0.4;
pub const DEFAULT_WARNING_CYCLES: u32 = 3;

#[inline]
#[must_use]
pub const fn always_true() -> bool {
    true
}

const fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

const fn default_volume() -> f32 {
    DEFAULT_VOLUME
}

const fn default_warning_cycles() -> u32 {
    DEFAULT_WARNING_CYCLES
}

/// The settings a timer is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerConfig {
    pub name: Option<String>,
    pub interval_ms: u64,
    /// 0 means the timer runs until stopped
    pub max_ms: u64,
    pub volume: f32,
    pub warning_cycles: u32,
    pub enable_warning_sound: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            name: None,
            interval_ms: DEFAULT_INTERVAL_MS,
            max_ms: 0,
            volume: DEFAULT_VOLUME,
            warning_cycles: DEFAULT_WARNING_CYCLES,
            enable_warning_sound: true,
        }
    }
}

impl TimerConfig {
    #[must_use]
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_ms(mut self, max_ms: u64) -> Self {
        self.max_ms = max_ms;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_warning(mut self, enabled: bool, cycles: u32) -> Self {
        self.enable_warning_sound = enabled;
        self.warning_cycles = cycles;
        self
    }

    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }
}

/// A single change to a timer's settings.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerEdit {
    Name(Option<String>),
    Interval(u64),
    MaxDuration(u64),
    Volume(f32),
    WarningCycles(u32),
    WarningSound(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Completed,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
        })
    }
}

/// One configured interval alarm.
///
/// Only the settings are serialized, everything the scheduler touches while
/// a run is in progress comes back as its default on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
    pub id: TimerId,
    pub name: Option<String>,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub max_ms: u64,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_warning_cycles")]
    pub warning_cycles: u32,
    #[serde(default = "always_true")]
    pub enable_warning_sound: bool,
    #[serde(skip)]
    pub running: bool,
    #[serde(skip)]
    pub completed: bool,
    #[serde(skip)]
    pub cycle_count: u64,
    #[serde(skip)]
    pub total_cycles: Option<u64>,
    #[serde(skip)]
    pub last_target: Option<Instant>,
    #[serde(skip)]
    pub(crate) pending: Option<TickToken>,
}

impl Timer {
    #[must_use]
    pub fn new(id: TimerId, config: TimerConfig) -> Self {
        let TimerConfig {
            name,
            interval_ms,
            max_ms,
            volume,
            warning_cycles,
            enable_warning_sound,
        } = config;
        Self {
            id,
            name,
            interval_ms,
            max_ms,
            volume,
            warning_cycles,
            enable_warning_sound,
            running: false,
            completed: false,
            cycle_count: 0,
            total_cycles: None,
            last_target: None,
            pending: None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Timer {}", self.id))
    }

    #[must_use]
    pub fn config(&self) -> TimerConfig {
        TimerConfig {
            name: self.name.clone(),
            interval_ms: self.interval_ms,
            max_ms: self.max_ms,
            volume: self.volume,
            warning_cycles: self.warning_cycles,
            enable_warning_sound: self.enable_warning_sound,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub const fn state(&self) -> TimerState {
        if self.running {
            TimerState::Running
        } else if self.completed {
            TimerState::Completed
        } else {
            TimerState::Idle
        }
    }

    /// Number of cycles a bounded run will take, `None` when unbounded.
    ///
    /// # Errors
    /// `InvalidInterval` for a zero interval, `InvalidMaxDuration` when the
    /// max duration doesn't fit a single interval.
    pub const fn planned_cycles(&self) -> Result<Option<u64>> {
        if self.interval_ms == 0 {
            return Err(TimerError::InvalidInterval);
        }
        if self.max_ms == 0 {
            return Ok(None);
        }
        match self.max_ms / self.interval_ms {
            0 => Err(TimerError::InvalidMaxDuration),
            cycles => Ok(Some(cycles)),
        }
    }

    /// Idle|Completed -> Running. Arming the first tick is left to the
    /// scheduler.
    pub(crate) fn start(&mut self, now: Instant) -> Result<()> {
        if self.running {
            return Err(TimerError::AlreadyRunning(self.id));
        }
        let total_cycles = self.planned_cycles()?;
        self.total_cycles = total_cycles;
        self.cycle_count = 0;
        self.last_target = Some(now);
        self.completed = false;
        self.running = true;
        Ok(())
    }

    /// Running -> Idle. Returns false if the timer wasn't running.
    pub(crate) fn stop(&mut self) -> bool {
        self.pending = None;
        std::mem::replace(&mut self.running, false)
    }

    pub(crate) fn complete(&mut self) {
        self.pending = None;
        self.running = false;
        self.completed = true;
    }

    /// Back to a never-started Idle, used when a sequence loops.
    pub(crate) fn reset(&mut self) {
        self.pending = None;
        self.running = false;
        self.completed = false;
        self.cycle_count = 0;
        self.last_target = None;
    }

    pub(crate) fn apply(&mut self, edit: TimerEdit) {
        match edit {
            TimerEdit::Name(name) => self.name = name,
            TimerEdit::Interval(ms) => self.interval_ms = ms,
            TimerEdit::MaxDuration(ms) => self.max_ms = ms,
            TimerEdit::Volume(volume) => self.volume = volume,
            TimerEdit::WarningCycles(cycles) => self.warning_cycles = cycles,
            TimerEdit::WarningSound(enabled) => self.enable_warning_sound = enabled,
        }
    }

    /// Reset the run fields after loading from disk.
    #[must_use]
    pub(crate) fn rehydrated(mut self) -> Self {
        self.reset();
        self.total_cycles = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(interval_ms: u64, max_ms: u64) -> Timer {
        Timer::new(1, TimerConfig::new(interval_ms).with_max_ms(max_ms))
    }

    #[test]
    fn start_computes_total_cycles() {
        let mut t = timer(1_000, 10_500);
        let now = Instant::now();
        t.start(now).unwrap();
        assert_eq!(t.total_cycles, Some(10));
        assert_eq!(t.cycle_count, 0);
        assert_eq!(t.last_target, Some(now));
        assert_eq!(t.state(), TimerState::Running);
    }

    #[test]
    fn unbounded_without_max() {
        let mut t = timer(1_000, 0);
        t.start(Instant::now()).unwrap();
        assert_eq!(t.total_cycles, None);
    }

    #[test]
    fn zero_interval_is_rejected_without_mutation() {
        let mut t = timer(0, 5_000);
        assert_eq!(t.start(Instant::now()), Err(TimerError::InvalidInterval));
        assert_eq!(t.state(), TimerState::Idle);
        assert_eq!(t.last_target, None);
    }

    #[test]
    fn short_max_is_rejected_without_mutation() {
        let mut t = timer(1_000, 999);
        t.completed = true;
        t.cycle_count = 4;
        assert_eq!(t.start(Instant::now()), Err(TimerError::InvalidMaxDuration));
        assert_eq!(t.state(), TimerState::Completed);
        assert_eq!(t.cycle_count, 4);
        assert!(!t.running);
    }

    #[test]
    fn restart_after_completion_resets_run() {
        let mut t = timer(1_000, 3_000);
        t.start(Instant::now()).unwrap();
        t.cycle_count = 3;
        t.complete();
        assert_eq!(t.state(), TimerState::Completed);
        t.start(Instant::now()).unwrap();
        assert_eq!(t.cycle_count, 0);
        assert!(!t.completed);
    }

    #[test]
    fn stop_keeps_counters() {
        let mut t = timer(1_000, 0);
        t.start(Instant::now()).unwrap();
        t.cycle_count = 2;
        assert!(t.stop());
        assert!(!t.stop());
        assert_eq!(t.cycle_count, 2);
        assert_eq!(t.state(), TimerState::Idle);
    }

    #[test]
    fn default_name_uses_id() {
        let t = Timer::new(7, TimerConfig::default());
        assert_eq!(t.display_name(), "Timer 7");
        let t = Timer::new(7, TimerConfig::default().with_name("plank"));
        assert_eq!(t.display_name(), "plank");
    }
}
