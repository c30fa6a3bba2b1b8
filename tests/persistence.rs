use std::{cell::Cell, rc::Rc};

use chrono::{TimeDelta, Utc};
use interval_chime::{
    i18n::Locale, test_utils::RecordingPlayer, ConfigRecord, Cue, ExecutionMode, FileStorage,
    ManualClock, MemoryStorage, Orchestrator, SilentPlayer, SingleTimerSettings, Storage,
    StorageError, TimerConfig, TimerEdit,
};

fn restore(storage: &MemoryStorage) -> Orchestrator {
    Orchestrator::restore(ManualClock::new(), RecordingPlayer::new(), storage.clone())
}

#[test]
fn settings_survive_a_restart() {
    let storage = MemoryStorage::new();
    let clock = ManualClock::new();
    let mut o = Orchestrator::new(clock.clone(), RecordingPlayer::new(), storage.clone());
    let warmup = o.create(TimerConfig::new(2_000).with_max_ms(10_000).with_name("warm up"));
    let main = o.create(TimerConfig::new(30_000).with_volume(0.9).with_warning(false, 2));
    o.set_execution_mode(ExecutionMode::Simultaneous);
    o.set_repeat_sequence(true);
    o.set_language(Locale::Portuguese);
    o.set_single_timer(SingleTimerSettings {
        interval_ms: 15_000,
        ..SingleTimerSettings::default()
    });
    o.start_all();
    clock.advance_ms(4_000);
    o.fire_due();
    assert_eq!(o.timer(warmup).unwrap().cycle_count, 2);
    drop(o);

    let restored = restore(&storage);
    assert_eq!(restored.execution_mode(), ExecutionMode::Simultaneous);
    assert!(restored.repeat_sequence());
    assert_eq!(restored.language(), Locale::Portuguese);
    assert_eq!(restored.single_timer().interval_ms, 15_000);

    let ids: Vec<_> = restored.timers().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![warmup, main]);
    let first = restored.timer(warmup).unwrap();
    assert_eq!(first.display_name(), "warm up");
    assert_eq!(first.max_ms, 10_000);
    // run state always comes back idle
    assert!(!first.running);
    assert!(!first.completed);
    assert_eq!(first.cycle_count, 0);
    let second = restored.timer(main).unwrap();
    assert!((second.volume - 0.9).abs() < f32::EPSILON);
    assert!(!second.enable_warning_sound);
    assert!(!restored.is_any_running());
}

#[test]
fn deleted_ids_are_not_handed_out_again() {
    let storage = MemoryStorage::new();
    let mut o = restore(&storage);
    for _ in 0..4 {
        o.create(TimerConfig::default());
    }
    assert!(o.delete(2));
    assert!(o.delete(4));
    drop(o);

    let mut o = restore(&storage);
    assert_eq!(o.create(TimerConfig::default()), 5);
}

#[test]
fn deleting_the_newest_timer_before_a_restart() {
    let storage = MemoryStorage::new();
    let mut o = restore(&storage);
    let ids: Vec<_> = (0..3).map(|_| o.create(TimerConfig::default())).collect();
    assert!(o.delete(ids[2]));
    drop(o);

    let mut o = restore(&storage);
    let next = o.create(TimerConfig::default());
    assert_eq!(next, 4);
    assert!(!ids.contains(&next));
}

#[test]
fn records_without_a_next_id_fall_back_to_the_highest() {
    let storage = MemoryStorage::new();
    let text = format!(
        "saved_at = \"{}\"\n\n[[timers]]\nid = 7\n\n[[timers]]\nid = 3\n",
        Utc::now().to_rfc3339()
    );
    storage.set_contents(text);

    let mut o = restore(&storage);
    assert_eq!(o.create(TimerConfig::default()), 8);
}

/// Storage that can never write.
struct Unwritable;

impl Storage for Unwritable {
    fn save(&mut self, _record: &ConfigRecord) -> Result<(), StorageError> {
        Err(StorageError::NoConfigDir)
    }

    fn load(&mut self) -> Option<ConfigRecord> {
        None
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        Err(StorageError::NoConfigDir)
    }

    fn has_record(&self) -> bool {
        false
    }
}

#[test]
fn timers_keep_running_when_saving_fails() {
    let clock = ManualClock::new();
    let player = RecordingPlayer::new();
    let mut o = Orchestrator::restore(clock.clone(), player.clone(), Unwritable);
    let notified = Rc::new(Cell::new(0));
    let counter = Rc::clone(&notified);
    let _subscription = o.subscribe(move |_| counter.set(counter.get() + 1));

    let first = o.create(TimerConfig::new(1_000).with_max_ms(2_000));
    let second = o.create(TimerConfig::new(1_000).with_max_ms(1_000));
    assert_eq!(notified.get(), 2);
    assert!(o.start_all().is_empty());
    assert!(o.timer(first).unwrap().running);

    for _ in 0..3 {
        clock.advance_ms(1_000);
        assert_eq!(o.fire_due(), 1);
    }
    // the sequence handed over and finished anyway
    assert!(o.timer(first).unwrap().completed);
    assert!(o.timer(second).unwrap().completed);
    assert!(!o.is_any_running());
    assert_eq!(player.count(Cue::Final), 2);
    // create x2, start, three ticks and the handover start
    assert_eq!(notified.get(), 7);

    o.clear_saved();
    assert_eq!(o.timers().len(), 2);
}

#[test]
fn edits_are_saved() {
    let storage = MemoryStorage::new();
    let mut o = restore(&storage);
    let id = o.create(TimerConfig::default());
    assert!(o.update(id, [TimerEdit::Interval(45_000), TimerEdit::Name(Some("plank".into()))]));
    assert!(!o.update(99, [TimerEdit::Volume(1.0)]));
    drop(o);

    let o = restore(&storage);
    let timer = o.timer(id).unwrap();
    assert_eq!(timer.interval_ms, 45_000);
    assert_eq!(timer.display_name(), "plank");
}

#[test]
fn a_month_old_record_is_forgotten() {
    let storage = MemoryStorage::new();
    let mut old = ConfigRecord::new();
    old.execution_mode = ExecutionMode::Simultaneous;
    old.saved_at = Utc::now() - TimeDelta::days(31);
    storage.set_contents(old.to_toml().unwrap());

    let o = restore(&storage);
    assert_eq!(o.execution_mode(), ExecutionMode::Sequence);
    assert!(o.timers().is_empty());
    assert!(storage.contents().is_none());
}

#[test]
fn garbage_on_disk_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "timers = 12\n[[[").unwrap();

    let storage = FileStorage::new(path.clone());
    let mut o = Orchestrator::restore(ManualClock::new(), SilentPlayer, storage);
    assert!(o.timers().is_empty());
    assert!(!path.exists());

    o.create(TimerConfig::new(5_000));
    assert!(FileStorage::new(path).has_record());
}

#[test]
fn clear_saved_keeps_the_live_state() {
    let storage = MemoryStorage::new();
    let mut o = restore(&storage);
    o.create(TimerConfig::default());
    assert!(storage.has_record());
    o.clear_saved();
    assert!(!storage.has_record());
    assert_eq!(o.timers().len(), 1);
}
