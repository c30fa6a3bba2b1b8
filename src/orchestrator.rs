//! Owns every timer and decides which of them run.
//!
//! All mutation happens through `&mut self`: commands from the front end and
//! ticks fired by [`Orchestrator::fire_due`] are serialized by whoever drives
//! the orchestrator, so no locking is involved. A tick always looks its
//! timer up by id, so a timer deleted between arming and firing is simply
//! skipped.

use std::{fmt, rc::Rc, str::FromStr, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    config::{ConfigRecord, SingleTimerSettings, Storage},
    cue::{select_cue, Cue, CuePlayer},
    error::{Result, TimerError},
    i18n::{Locale, Localizer},
    notifier::{Notifier, Snapshot, Subscription},
    scheduler::{Scheduler, Wakeup},
    status,
    timer::{Timer, TimerConfig, TimerEdit, TimerId},
};

/// How `start_all` and timer completion behave with several timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One timer at a time, lowest id first, handing over on completion.
    #[default]
    Sequence,
    /// Every timer runs its own loop.
    Simultaneous,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequence => "sequence",
            Self::Simultaneous => "simultaneous",
        })
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequence" | "seq" => Ok(Self::Sequence),
            "simultaneous" | "sim" | "parallel" => Ok(Self::Simultaneous),
            other => Err(format!("unknown execution mode `{other}`")),
        }
    }
}

/// What a fired tick did to its timer.
enum TickOutcome {
    Continued,
    Completed,
}

pub struct Orchestrator {
    timers: Vec<Timer>,
    next_id: TimerId,
    execution_mode: ExecutionMode,
    repeat_sequence: bool,
    language: Locale,
    single_timer: SingleTimerSettings,
    scheduler: Scheduler,
    clock: Box<dyn Clock>,
    player: Box<dyn CuePlayer>,
    storage: Box<dyn Storage>,
    notifier: Rc<Notifier>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("timers", &self.timers)
            .field("next_id", &self.next_id)
            .field("execution_mode", &self.execution_mode)
            .field("repeat_sequence", &self.repeat_sequence)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// An orchestrator with no timers.
    pub fn new(
        clock: impl Clock + 'static,
        player: impl CuePlayer + 'static,
        storage: impl Storage + 'static,
    ) -> Self {
        Self {
            timers: Vec::new(),
            next_id: 1,
            execution_mode: ExecutionMode::default(),
            repeat_sequence: false,
            language: Locale::default(),
            single_timer: SingleTimerSettings::default(),
            scheduler: Scheduler::new(),
            clock: Box::new(clock),
            player: Box::new(player),
            storage: Box::new(storage),
            notifier: Notifier::new(),
        }
    }

    /// Rebuild from whatever `storage` holds, or start empty.
    pub fn restore(
        clock: impl Clock + 'static,
        player: impl CuePlayer + 'static,
        storage: impl Storage + 'static,
    ) -> Self {
        Self::restore_in(clock, player, storage, Locale::default())
    }

    /// Like [`Self::restore`], speaking `language` unless a saved record
    /// says otherwise.
    pub fn restore_in(
        clock: impl Clock + 'static,
        player: impl CuePlayer + 'static,
        mut storage: impl Storage + 'static,
        language: Locale,
    ) -> Self {
        let record = storage.load();
        let mut orchestrator = Self::new(clock, player, storage);
        orchestrator.language = language;
        if let Some(record) = record {
            orchestrator.apply_record(record);
        }
        orchestrator
    }

    fn apply_record(&mut self, record: ConfigRecord) {
        self.timers = record.timers.into_iter().map(Timer::rehydrated).collect();
        let past_highest = self.timers.iter().map(|t| t.id).max().map_or(1, |id| id + 1);
        self.next_id = record.next_id.max(past_highest);
        self.execution_mode = record.execution_mode;
        self.repeat_sequence = record.repeat_sequence;
        self.language = record.language;
        self.single_timer = record.single_timer;
        log::info!("restored {} timers", self.timers.len());
    }

    /// The durable part of the current state.
    #[must_use]
    pub fn to_record(&self) -> ConfigRecord {
        ConfigRecord {
            execution_mode: self.execution_mode,
            repeat_sequence: self.repeat_sequence,
            language: self.language,
            next_id: self.next_id,
            saved_at: chrono::Utc::now(),
            single_timer: self.single_timer.clone(),
            timers: self.timers.clone(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            timers: self.timers.clone(),
            execution_mode: self.execution_mode,
            repeat_sequence: self.repeat_sequence,
            is_running: self.is_any_running(),
        }
    }

    pub fn subscribe(&self, callback: impl FnMut(&Snapshot) + 'static) -> Subscription {
        self.notifier.subscribe(callback)
    }

    /// Publish the new state and persist its settings.
    fn changed(&mut self) {
        self.notifier.publish(&self.snapshot());
        if let Err(e) = self.storage.save(&self.to_record()) {
            log::warn!("couldn't save config: {e}");
        }
    }

    #[must_use]
    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    #[must_use]
    pub fn timer(&self, id: TimerId) -> Option<&Timer> {
        self.timers.iter().find(|t| t.id == id)
    }

    fn position(&self, id: TimerId) -> Result<usize> {
        self.timers
            .iter()
            .position(|t| t.id == id)
            .ok_or(TimerError::UnknownTimer(id))
    }

    #[must_use]
    pub const fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    #[must_use]
    pub const fn repeat_sequence(&self) -> bool {
        self.repeat_sequence
    }

    #[must_use]
    pub const fn language(&self) -> Locale {
        self.language
    }

    #[must_use]
    pub const fn single_timer(&self) -> &SingleTimerSettings {
        &self.single_timer
    }

    #[must_use]
    pub fn is_any_running(&self) -> bool {
        self.timers.iter().any(|t| t.running)
    }

    pub fn create(&mut self, config: TimerConfig) -> TimerId {
        self.create_at(self.timers.len(), config)
    }

    /// Insert a new timer at `index` in display order, or at the end if
    /// `index` is past it. Sequencing still goes by id.
    pub fn create_at(&mut self, index: usize, config: TimerConfig) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let index = index.min(self.timers.len());
        self.timers.insert(index, Timer::new(id, config));
        log::debug!("created timer {id} at position {index}");
        self.changed();
        id
    }

    /// Apply `edits` to a timer. A running timer is stopped first and stays
    /// stopped. Returns false for an unknown id.
    pub fn update(&mut self, id: TimerId, edits: impl IntoIterator<Item = TimerEdit>) -> bool {
        let Ok(index) = self.position(id) else {
            return false;
        };
        let timer = &mut self.timers[index];
        if timer.stop() {
            log::info!("stopped timer {id} to apply changes");
        }
        for edit in edits {
            timer.apply(edit);
        }
        self.changed();
        true
    }

    /// Remove a timer, stopping it first. Returns false for an unknown id.
    pub fn delete(&mut self, id: TimerId) -> bool {
        let Ok(index) = self.position(id) else {
            return false;
        };
        let mut timer = self.timers.remove(index);
        if timer.stop() {
            log::info!("stopped timer {id} before removing it");
        }
        self.changed();
        true
    }

    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.execution_mode = mode;
        self.changed();
    }

    pub fn set_repeat_sequence(&mut self, repeat: bool) {
        self.repeat_sequence = repeat;
        self.changed();
    }

    pub fn set_language(&mut self, language: Locale) {
        self.language = language;
        self.changed();
    }

    pub fn set_single_timer(&mut self, settings: SingleTimerSettings) {
        self.single_timer = settings;
        self.changed();
    }

    /// Start according to the execution mode. Timers that refuse to start
    /// are returned with the reason; the rest keep going.
    pub fn start_all(&mut self) -> Vec<(TimerId, TimerError)> {
        let mut failures = Vec::new();
        match self.execution_mode {
            ExecutionMode::Simultaneous => {
                let ids: Vec<_> = self
                    .timers
                    .iter()
                    .filter(|t| !t.completed && !t.running)
                    .map(|t| t.id)
                    .collect();
                for id in ids {
                    if let Err(e) = self.start_timer(id) {
                        failures.push((id, e));
                    }
                }
            }
            ExecutionMode::Sequence => {
                if self.is_any_running() {
                    log::debug!("sequence already in progress");
                    return failures;
                }
                let first = self.timers.iter().filter(|t| !t.completed).map(|t| t.id).min();
                if let Some(id) = first {
                    if let Err(e) = self.start_timer(id) {
                        failures.push((id, e));
                    }
                }
            }
        }
        failures
    }

    /// Start one timer regardless of mode.
    ///
    /// # Errors
    /// `UnknownTimer`, `AlreadyRunning`, or the timer's own validation
    /// errors. The timer is untouched on error.
    pub fn start_timer(&mut self, id: TimerId) -> Result<()> {
        let index = self.position(id)?;
        let now = self.clock.now();
        let timer = &mut self.timers[index];
        timer.start(now)?;
        self.scheduler.arm(timer, now);
        log::info!(
            "started {} every {}ms ({})",
            timer.display_name(),
            timer.interval_ms,
            timer
                .total_cycles
                .map_or_else(|| "unbounded".to_string(), |n| format!("{n} cycles")),
        );
        self.changed();
        Ok(())
    }

    /// Stop a running timer. Returns false, without notifying anyone, if it
    /// doesn't exist or wasn't running.
    pub fn stop_timer(&mut self, id: TimerId) -> bool {
        let Some(timer) = self.timers.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        if !timer.stop() {
            return false;
        }
        log::info!("stopped {}", timer.display_name());
        self.changed();
        true
    }

    pub fn stop_all(&mut self) {
        let mut stopped = 0;
        for timer in &mut self.timers {
            if timer.stop() {
                stopped += 1;
            }
        }
        if stopped > 0 {
            log::info!("stopped {stopped} timers");
            self.changed();
        }
    }

    /// Cancel everything before the orchestrator goes away.
    pub fn shutdown(&mut self) {
        self.stop_all();
        self.scheduler.clear();
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// When the driver should next call [`Self::fire_due`].
    #[must_use]
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    /// Run every tick that is due. Returns how many ticks fired.
    pub fn fire_due(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        while let Some(wakeup) = self.scheduler.pop_due(now) {
            if self.on_wakeup(wakeup) {
                fired += 1;
            }
        }
        fired
    }

    fn on_wakeup(&mut self, wakeup: Wakeup) -> bool {
        let sequence = self.execution_mode == ExecutionMode::Sequence;
        let Some(timer) = self.timers.iter_mut().find(|t| t.id == wakeup.timer_id) else {
            log::trace!("dropping wake-up for removed timer {}", wakeup.timer_id);
            return false;
        };
        if !Scheduler::is_live(&wakeup, timer) {
            log::trace!("dropping stale wake-up for timer {}", timer.id);
            return false;
        }
        timer.pending = None;

        let cue = select_cue(timer);
        self.player.play(cue, timer.volume);
        timer.cycle_count += 1;
        // the intended target, not the time we actually got here
        timer.last_target = Some(wakeup.due);
        log::debug!(
            "timer {} cycle {}/{} ({cue})",
            timer.id,
            timer.cycle_count,
            timer
                .total_cycles
                .map_or_else(|| "-".to_string(), |n| n.to_string()),
        );

        let total_cycles = timer.total_cycles;
        let outcome = match total_cycles {
            Some(total) if timer.cycle_count >= total => {
                self.player.play(Cue::Final, timer.volume);
                timer.complete();
                log::info!("{} completed after {total} cycles", timer.display_name());
                TickOutcome::Completed
            }
            // in a sequence an unbounded timer chimes once and hands over
            None if sequence => {
                timer.complete();
                log::info!("{} completed its single cycle", timer.display_name());
                TickOutcome::Completed
            }
            _ => {
                let now = self.clock.now();
                self.scheduler.arm(timer, now);
                TickOutcome::Continued
            }
        };

        let id = wakeup.timer_id;
        self.changed();
        if matches!(outcome, TickOutcome::Completed) && sequence {
            self.advance_sequence(id);
        }
        true
    }

    /// Start the next timer of the sequence after `finished` completed.
    fn advance_sequence(&mut self, finished: TimerId) {
        let next = self
            .timers
            .iter()
            .filter(|t| !t.completed && t.id != finished)
            .map(|t| t.id)
            .min();
        match next {
            Some(id) => {
                log::info!("sequence moves on to timer {id}");
                if let Err(e) = self.start_timer(id) {
                    log::warn!("sequence stopped, timer {id} couldn't start: {e}");
                }
            }
            None if self.repeat_sequence => self.restart_sequence(),
            None => log::info!("sequence finished"),
        }
    }

    fn restart_sequence(&mut self) {
        log::info!("restarting sequence");
        for timer in &mut self.timers {
            timer.reset();
        }
        self.scheduler.clear();
        self.changed();
        if let Some(first) = self.timers.iter().map(|t| t.id).min() {
            if let Err(e) = self.start_timer(first) {
                log::warn!("sequence stopped, timer {first} couldn't start: {e}");
            }
        }
    }

    /// Play a cue outside of any timer, for trying out the volume.
    pub fn test_cue(&mut self, cue: Cue, volume: f32) {
        self.player.play(cue, volume);
    }

    /// Current status line of a timer in the configured language.
    #[must_use]
    pub fn status_line(&self, id: TimerId) -> Option<String> {
        self.status_line_with(id, &self.language)
    }

    #[must_use]
    pub fn status_line_with(&self, id: TimerId, localizer: &dyn Localizer) -> Option<String> {
        let now = self.clock.now();
        self.timer(id)
            .map(|timer| status::status_line(timer, now, localizer))
    }

    /// Forget the saved configuration. The in-memory state is kept.
    pub fn clear_saved(&mut self) {
        if let Err(e) = self.storage.clear() {
            log::warn!("couldn't clear saved config: {e}");
        }
    }
}
