use std::{
    collections::HashMap,
    error::Error,
    io::{self, BufRead},
    sync::mpsc::{self, Sender},
    thread,
};

use clap::{Parser, Subcommand};
use interval_chime::{
    communication::{self, parse_duration_ms, status_report},
    i18n::{Locale, Localizer},
    ConfigRecord, Cue, CuePlayer, ExecutionMode, FileStorage, MemoryStorage, Orchestrator,
    SilentPlayer, SingleTimerSettings, Storage, Subscription, SystemClock, TimerConfig, TimerEdit,
    TimerError, TimerId,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write a fresh config file
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// Add a timer
    Add {
        #[command(flatten)]
        timer: TimerArgs,
        /// Position in the list, defaults to the end
        #[clap(long)]
        at: Option<usize>,
    },
    /// Change a timer's settings
    Edit {
        id: TimerId,
        #[command(flatten)]
        timer: TimerArgs,
    },
    Remove {
        id: TimerId,
    },
    /// Show every timer
    List,
    /// Run timers one after another or all at once
    Mode {
        mode: ExecutionMode,
    },
    /// Loop the sequence once the last timer is done
    Repeat {
        #[clap(value_parser = on_off)]
        state: bool,
    },
    /// Start all timers and read commands from stdin until they are done
    Run {
        #[clap(long)]
        mute: bool,
    },
    /// Run the single timer, remembering any settings given here
    Single {
        #[command(flatten)]
        timer: TimerArgs,
        #[clap(long)]
        mute: bool,
    },
    /// Play a cue
    Test {
        #[clap(default_value = "normal")]
        cue: Cue,
        #[clap(long, short, default_value_t = 0.4)]
        volume: f32,
    },
    /// Forget the saved configuration
    Clear,
    Language {
        language: Locale,
    },
}

#[derive(clap::Args, Debug, Default)]
struct TimerArgs {
    #[clap(long, short)]
    name: Option<String>,
    /// e.g. 30s, 1m30s, 90
    #[clap(long, short, value_parser = parse_duration_ms)]
    interval: Option<u64>,
    /// Total run time, 0 to run until stopped
    #[clap(long, short, value_parser = parse_duration_ms)]
    max: Option<u64>,
    #[clap(long, short)]
    volume: Option<f32>,
    /// Start the warning cue when this many cycles are left
    #[clap(long, short)]
    warning_cycles: Option<u32>,
    #[clap(long)]
    no_warning: bool,
}

impl TimerArgs {
    fn config(&self) -> TimerConfig {
        let mut config = TimerConfig::default();
        config.name.clone_from(&self.name);
        self.edits().into_iter().for_each(|edit| match edit {
            TimerEdit::Interval(ms) => config.interval_ms = ms,
            TimerEdit::MaxDuration(ms) => config.max_ms = ms,
            TimerEdit::Volume(volume) => config.volume = volume,
            TimerEdit::WarningCycles(cycles) => config.warning_cycles = cycles,
            TimerEdit::WarningSound(enabled) => config.enable_warning_sound = enabled,
            TimerEdit::Name(_) => {}
        });
        config
    }

    fn edits(&self) -> Vec<TimerEdit> {
        let mut edits = Vec::new();
        if let Some(name) = &self.name {
            edits.push(TimerEdit::Name(Some(name.clone())));
        }
        if let Some(ms) = self.interval {
            edits.push(TimerEdit::Interval(ms));
        }
        if let Some(ms) = self.max {
            edits.push(TimerEdit::MaxDuration(ms));
        }
        if let Some(volume) = self.volume {
            edits.push(TimerEdit::Volume(volume));
        }
        if let Some(cycles) = self.warning_cycles {
            edits.push(TimerEdit::WarningCycles(cycles));
        }
        if self.no_warning {
            edits.push(TimerEdit::WarningSound(false));
        }
        edits
    }

    fn apply_to(&self, settings: &mut SingleTimerSettings) {
        if let Some(ms) = self.interval {
            settings.interval_ms = ms;
        }
        if let Some(ms) = self.max {
            settings.max_ms = ms;
        }
        if let Some(volume) = self.volume {
            settings.volume = volume;
        }
        if let Some(cycles) = self.warning_cycles {
            settings.warning_cycles = cycles;
        }
        if self.no_warning {
            settings.enable_warning_sound = false;
        }
    }
}

fn on_off(value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => Err(format!("expected on or off, got `{value}`")),
    }
}

fn player(mute: bool) -> Box<dyn CuePlayer> {
    if mute {
        return Box::new(SilentPlayer);
    }
    #[cfg(feature = "audio")]
    match interval_chime::audio::RodioPlayer::open() {
        Ok(player) => return Box::new(player),
        Err(e) => log::warn!("no audio output, cues will only be logged: {e}"),
    }
    Box::new(SilentPlayer)
}

/// Load the saved state, speaking the user's language if nothing is saved.
fn open(storage: FileStorage, player: impl CuePlayer + 'static) -> Orchestrator {
    let language = Locale::from_env().unwrap_or_default();
    Orchestrator::restore_in(SystemClock, player, storage, language)
}

fn explain(language: Locale, id: TimerId, e: TimerError) -> String {
    language.translate(e.message_key(), &[("id", id.to_string())])
}

/// Print a line whenever a timer moves on a cycle or finishes.
fn print_progress(orchestrator: &Orchestrator) -> Subscription {
    let mut seen: HashMap<TimerId, (u64, bool)> = HashMap::new();
    orchestrator.subscribe(move |snapshot| {
        for timer in &snapshot.timers {
            let state = (timer.cycle_count, timer.completed);
            if seen.insert(timer.id, state) == Some(state) {
                continue;
            }
            let name = timer.display_name();
            match (timer.completed, timer.total_cycles) {
                (true, _) => println!("{name}: done"),
                (false, _) if timer.cycle_count == 0 => {}
                (false, Some(total)) => println!("{name}: cycle {}/{total}", timer.cycle_count),
                (false, None) => println!("{name}: cycle {}", timer.cycle_count),
            }
        }
    })
}

// reads commands on a separate thread so the timers never wait on stdin
fn spawn_stdin_reader(sender: Sender<communication::Command>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<communication::Command>() {
                Ok(command) => {
                    let quit = matches!(command, communication::Command::Quit);
                    if sender.send(command).is_err() || quit {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
    });
}

fn drive(mut orchestrator: Orchestrator) {
    let _progress = print_progress(&orchestrator);
    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx);
    let exit =
        communication::run_event_loop(&mut orchestrator, &rx, true, |line| println!("{line}"));
    log::info!("event loop exited: {exit:?}");
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("interval_chime").expect("couldn't initialize logger");

    let args = Args::parse();
    let mut storage = FileStorage::at_default_path()?;
    match args.command.unwrap_or(Command::List) {
        Command::Init { force } => {
            if force || !storage.has_record() {
                let record = ConfigRecord {
                    language: Locale::from_env().unwrap_or_default(),
                    ..ConfigRecord::new()
                };
                storage.save(&record)?;
                println!("wrote {}", storage.path().display());
            } else {
                println!("{} already exists, use --force to overwrite", storage.path().display());
            }
        }
        Command::Add { timer, at } => {
            let mut orchestrator = open(storage, SilentPlayer);
            let config = timer.config();
            let id = match at {
                Some(index) => orchestrator.create_at(index, config),
                None => orchestrator.create(config),
            };
            println!("created timer {id}");
        }
        Command::Edit { id, timer } => {
            let mut orchestrator = open(storage, SilentPlayer);
            if !orchestrator.update(id, timer.edits()) {
                let language = orchestrator.language();
                return Err(explain(language, id, TimerError::UnknownTimer(id)).into());
            }
        }
        Command::Remove { id } => {
            let mut orchestrator = open(storage, SilentPlayer);
            if !orchestrator.delete(id) {
                let language = orchestrator.language();
                return Err(explain(language, id, TimerError::UnknownTimer(id)).into());
            }
        }
        Command::List => {
            let orchestrator = open(storage, SilentPlayer);
            println!("{}", status_report(&orchestrator));
        }
        Command::Mode { mode } => {
            open(storage, SilentPlayer).set_execution_mode(mode);
        }
        Command::Repeat { state } => {
            open(storage, SilentPlayer).set_repeat_sequence(state);
        }
        Command::Language { language } => {
            open(storage, SilentPlayer).set_language(language);
        }
        Command::Run { mute } => {
            let mut orchestrator = open(storage, player(mute));
            let language = orchestrator.language();
            for (id, e) in orchestrator.start_all() {
                eprintln!("{id}: {}", explain(language, id, e));
            }
            drive(orchestrator);
        }
        Command::Single { timer, mute } => {
            let mut saved = open(storage, SilentPlayer);
            let mut settings = saved.single_timer().clone();
            timer.apply_to(&mut settings);
            saved.set_single_timer(settings.clone());
            let language = saved.language();
            drop(saved);

            // the single timer never touches the saved timer list
            let mut orchestrator =
                Orchestrator::new(SystemClock, player(mute), MemoryStorage::new());
            orchestrator.set_execution_mode(ExecutionMode::Simultaneous);
            let id = orchestrator.create(TimerConfig::from(&settings));
            orchestrator
                .start_timer(id)
                .map_err(|e| explain(language, id, e))?;
            drive(orchestrator);
        }
        Command::Test { cue, volume } => {
            let mut player = player(false);
            player.play(cue, volume);
            // give the audio thread time to play the cue before exiting
            thread::sleep(std::time::Duration::from_millis(800));
        }
        Command::Clear => {
            storage.clear()?;
            println!("cleared {}", storage.path().display());
        }
    }
    Ok(())
}
