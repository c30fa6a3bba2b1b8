//! Commands sent to a running orchestrator and the loop that applies them.

use std::{
    str::FromStr,
    sync::mpsc::{Receiver, RecvTimeoutError},
    thread,
    time::Duration,
};

use crate::{
    cue::Cue,
    error::TimerError,
    i18n::Localizer,
    orchestrator::{ExecutionMode, Orchestrator},
    timer::{TimerConfig, TimerEdit, TimerId, DEFAULT_VOLUME},
};

/// How long the loop waits for a command when no tick is pending.
const IDLE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create(TimerConfig),
    Update(TimerId, Vec<TimerEdit>),
    Delete(TimerId),
    SetMode(ExecutionMode),
    SetRepeat(bool),
    StartAll,
    Start(TimerId),
    Stop(TimerId),
    StopAll,
    TestCue(Cue, f32),
    Status,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`{command}` needs {what}")]
    Missing {
        command: &'static str,
        what: &'static str,
    },
    #[error("invalid value `{value}`: {reason}")]
    Invalid { value: String, reason: String },
}

fn invalid(value: &str, reason: impl ToString) -> ParseCommandError {
    ParseCommandError::Invalid {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_id(value: &str) -> Result<TimerId, ParseCommandError> {
    value.parse().map_err(|e| invalid(value, e))
}

fn parse_on_off(value: &str) -> Result<bool, ParseCommandError> {
    match value {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => Err(invalid(value, "expected on or off")),
    }
}

/// Parse durations like `90` (seconds), `500ms`, `30s`, `5m`, `1h30m` or
/// `0.5m` into milliseconds.
///
/// # Errors
/// On an empty string, a unit other than ms/s/m/h, or a missing number.
pub fn parse_duration_ms(input: &str) -> Result<u64, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<f64>() {
        return to_ms(secs, 1000.0);
    }

    let mut total = 0.0;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("expected a number in `{input}`"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("bad number in `{input}`"))?;
        rest = &rest[number_len..];
        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "" => return Err(format!("missing unit in `{input}`")),
            unit => return Err(format!("unknown unit `{unit}`")),
        };
        total += value * scale;
        rest = &rest[unit_len..];
    }
    to_ms(total, 1.0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_ms(value: f64, scale: f64) -> Result<u64, String> {
    let ms = (value * scale).round();
    if ms.is_finite() && ms >= 0.0 {
        Ok(ms as u64)
    } else {
        Err(format!("duration out of range: {value}"))
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err(ParseCommandError::Empty);
        };
        let arg = words.next();
        match (command.to_ascii_lowercase().as_str(), arg) {
            ("start", None) => Ok(Self::StartAll),
            ("start", Some(id)) => Ok(Self::Start(parse_id(id)?)),
            ("stop", None) => Ok(Self::StopAll),
            ("stop", Some(id)) => Ok(Self::Stop(parse_id(id)?)),
            ("remove" | "delete", Some(id)) => Ok(Self::Delete(parse_id(id)?)),
            ("remove" | "delete", None) => Err(ParseCommandError::Missing {
                command: "remove",
                what: "a timer id",
            }),
            ("add", Some(interval)) => {
                let interval_ms = parse_duration_ms(interval).map_err(|e| invalid(interval, e))?;
                let mut config = TimerConfig::new(interval_ms);
                if let Some(max) = words.next() {
                    config.max_ms = parse_duration_ms(max).map_err(|e| invalid(max, e))?;
                }
                Ok(Self::Create(config))
            }
            ("add", None) => Err(ParseCommandError::Missing {
                command: "add",
                what: "an interval",
            }),
            ("volume", Some(id)) => {
                let volume = words.next().ok_or(ParseCommandError::Missing {
                    command: "volume",
                    what: "a timer id and a volume",
                })?;
                let volume = volume.parse::<f32>().map_err(|e| invalid(volume, e))?;
                Ok(Self::Update(parse_id(id)?, vec![TimerEdit::Volume(volume)]))
            }
            ("rename", Some(id)) => {
                let name: Vec<_> = words.collect();
                let name = (!name.is_empty()).then(|| name.join(" "));
                Ok(Self::Update(parse_id(id)?, vec![TimerEdit::Name(name)]))
            }
            ("mode", Some(mode)) => Ok(Self::SetMode(
                mode.parse::<ExecutionMode>().map_err(|e| invalid(mode, e))?,
            )),
            ("mode", None) => Err(ParseCommandError::Missing {
                command: "mode",
                what: "sequence or simultaneous",
            }),
            ("repeat", Some(value)) => Ok(Self::SetRepeat(parse_on_off(value)?)),
            ("repeat", None) => Err(ParseCommandError::Missing {
                command: "repeat",
                what: "on or off",
            }),
            ("test", cue) => {
                let cue = cue.map_or(Ok(Cue::Normal), str::parse).map_err(|e| invalid(line, e))?;
                let volume = match words.next() {
                    Some(v) => v.parse::<f32>().map_err(|e| invalid(v, e))?,
                    None => DEFAULT_VOLUME,
                };
                Ok(Self::TestCue(cue, volume))
            }
            ("status" | "list", _) => Ok(Self::Status),
            ("quit" | "exit" | "q", _) => Ok(Self::Quit),
            (other, _) => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

/// Apply one command, returning a line of feedback for the user if there is
/// something to say.
pub fn apply(orchestrator: &mut Orchestrator, command: Command) -> Option<String> {
    let language = orchestrator.language();
    let explain = |e: TimerError, id: TimerId| {
        language.translate(e.message_key(), &[("id", id.to_string())])
    };
    match command {
        Command::Create(config) => {
            let id = orchestrator.create(config);
            Some(format!("created timer {id}"))
        }
        Command::Update(id, edits) => (!orchestrator.update(id, edits))
            .then(|| explain(TimerError::UnknownTimer(id), id)),
        Command::Delete(id) => (!orchestrator.delete(id))
            .then(|| explain(TimerError::UnknownTimer(id), id)),
        Command::SetMode(mode) => {
            orchestrator.set_execution_mode(mode);
            None
        }
        Command::SetRepeat(repeat) => {
            orchestrator.set_repeat_sequence(repeat);
            None
        }
        Command::StartAll => {
            let failures: Vec<_> = orchestrator
                .start_all()
                .into_iter()
                .map(|(id, e)| format!("{id}: {}", explain(e, id)))
                .collect();
            (!failures.is_empty()).then(|| failures.join("\n"))
        }
        Command::Start(id) => orchestrator.start_timer(id).err().map(|e| explain(e, id)),
        Command::Stop(id) => {
            orchestrator.stop_timer(id);
            None
        }
        Command::StopAll => {
            orchestrator.stop_all();
            None
        }
        Command::TestCue(cue, volume) => {
            orchestrator.test_cue(cue, volume);
            None
        }
        Command::Status => Some(status_report(orchestrator)),
        Command::Quit => None,
    }
}

/// A line per timer with its status.
#[must_use]
pub fn status_report(orchestrator: &Orchestrator) -> String {
    let mut lines = vec![format!(
        "mode: {} | repeat: {}",
        orchestrator.execution_mode(),
        if orchestrator.repeat_sequence() { "on" } else { "off" }
    )];
    for timer in orchestrator.timers() {
        lines.push(format!(
            "[{}] {}: {}",
            timer.id,
            timer.display_name(),
            orchestrator.status_line(timer.id).unwrap_or_default()
        ));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Nothing is running anymore.
    Idle,
    Quit,
}

/// Drive `orchestrator` on the current thread until it goes idle (when
/// `exit_when_idle` is set) or a `Quit` arrives.
///
/// Between ticks the loop blocks on `commands`. If the sending side goes
/// away the loop keeps running the timers and just sleeps between ticks.
/// All pending ticks are cancelled before returning.
pub fn run_event_loop(
    orchestrator: &mut Orchestrator,
    commands: &Receiver<Command>,
    exit_when_idle: bool,
    mut reply: impl FnMut(&str),
) -> LoopExit {
    let mut connected = true;
    let exit = loop {
        orchestrator.fire_due();
        if (exit_when_idle || !connected) && !orchestrator.is_any_running() {
            break LoopExit::Idle;
        }
        let timeout = orchestrator
            .next_wakeup()
            .map_or(IDLE_POLL, |due| due.saturating_duration_since(orchestrator.now()));
        if !connected {
            thread::sleep(timeout);
            continue;
        }
        match commands.recv_timeout(timeout) {
            Ok(Command::Quit) => break LoopExit::Quit,
            Ok(command) => {
                log::debug!("applying {command:?}");
                if let Some(message) = apply(orchestrator, command) {
                    reply(&message);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("command channel closed");
                connected = false;
            }
        }
    };
    orchestrator.shutdown();
    exit
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::{clock::ManualClock, config::MemoryStorage, test_utils::RecordingPlayer};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(ManualClock::new(), RecordingPlayer::new(), MemoryStorage::new())
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration_ms("90"), Ok(90_000));
        assert_eq!(parse_duration_ms("500ms"), Ok(500));
        assert_eq!(parse_duration_ms("30s"), Ok(30_000));
        assert_eq!(parse_duration_ms("1h30m"), Ok(5_400_000));
        assert_eq!(parse_duration_ms("1m30s"), Ok(90_000));
        assert_eq!(parse_duration_ms("0.5m"), Ok(30_000));
        assert!(parse_duration_ms("").is_err());
        assert!(parse_duration_ms("5x").is_err());
        assert!(parse_duration_ms("m").is_err());
        assert!(parse_duration_ms("5m3").is_err());
    }

    #[test]
    fn parses_commands() {
        assert_eq!("start".parse(), Ok(Command::StartAll));
        assert_eq!("stop 3".parse(), Ok(Command::Stop(3)));
        assert_eq!("mode simultaneous".parse(), Ok(Command::SetMode(ExecutionMode::Simultaneous)));
        assert_eq!("repeat on".parse(), Ok(Command::SetRepeat(true)));
        assert_eq!("test warning 0.7".parse(), Ok(Command::TestCue(Cue::Warning, 0.7)));
        assert_eq!(
            "add 10s 1m".parse(),
            Ok(Command::Create(TimerConfig::new(10_000).with_max_ms(60_000)))
        );
        assert_eq!(
            "rename 2 tea time".parse(),
            Ok(Command::Update(2, vec![TimerEdit::Name(Some("tea time".to_string()))]))
        );
        assert_eq!("  ".parse::<Command>(), Err(ParseCommandError::Empty));
        assert!(matches!("dance".parse::<Command>(), Err(ParseCommandError::Unknown(_))));
        assert!(matches!("stop x".parse::<Command>(), Err(ParseCommandError::Invalid { .. })));
        assert!(matches!("mode".parse::<Command>(), Err(ParseCommandError::Missing { .. })));
    }

    #[test]
    fn apply_reports_errors() {
        let mut o = orchestrator();
        assert_eq!(apply(&mut o, Command::Start(9)).as_deref(), Some("There is no timer 9."));
        let id = o.create(TimerConfig::new(0));
        let reply = apply(&mut o, Command::StartAll).unwrap();
        assert!(reply.starts_with(&format!("{id}: ")), "{reply}");
    }

    #[test]
    fn loop_exits_when_idle() {
        let clock = ManualClock::new();
        let player = RecordingPlayer::new();
        let mut o = Orchestrator::new(clock, player.clone(), MemoryStorage::new());
        let (tx, rx) = mpsc::channel();
        drop(tx);
        // nothing running and nobody to send commands
        assert_eq!(run_event_loop(&mut o, &rx, false, |_| {}), LoopExit::Idle);
        assert!(player.cues().is_empty());
    }

    #[test]
    fn loop_applies_commands_until_quit() {
        let mut o = orchestrator();
        let (tx, rx) = mpsc::channel();
        tx.send(Command::Create(TimerConfig::new(60_000))).unwrap();
        tx.send(Command::StartAll).unwrap();
        tx.send(Command::Status).unwrap();
        tx.send(Command::Quit).unwrap();
        let mut replies = Vec::new();
        let exit = run_event_loop(&mut o, &rx, false, |line| replies.push(line.to_string()));
        assert_eq!(exit, LoopExit::Quit);
        assert_eq!(replies[0], "created timer 1");
        assert!(replies[1].contains("[1] Timer 1: Next in 01:00"), "{}", replies[1]);
        // shut down on the way out
        assert!(!o.is_any_running());
        assert!(o.next_wakeup().is_none());
    }
}
