#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! Interval chimes: timers that play a cue every interval, optionally for a
//! bounded total time, run side by side or one after another.
//!
//! The engine is single threaded. An [`Orchestrator`] owns the timers and
//! their pending ticks; something has to call [`Orchestrator::fire_due`]
//! when [`Orchestrator::next_wakeup`] comes around, which is what
//! [`communication::run_event_loop`] does.

#[cfg(feature = "audio")]
pub mod audio;
pub mod clock;
pub mod communication;
pub mod config;
pub mod cue;
pub mod error;
pub mod i18n;
pub mod notifier;
pub mod orchestrator;
pub mod scheduler;
pub mod status;
#[doc(hidden)]
pub mod test_utils;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigRecord, FileStorage, MemoryStorage, SingleTimerSettings, Storage};
pub use cue::{select_cue, Cue, CuePlayer, SilentPlayer};
pub use error::{StorageError, TimerError};
pub use notifier::{Snapshot, Subscription};
pub use orchestrator::{ExecutionMode, Orchestrator};
pub use timer::{Timer, TimerConfig, TimerEdit, TimerId, TimerState};
