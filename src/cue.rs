use std::{fmt, str::FromStr};

use crate::timer::Timer;

/// An audio signal requested from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    Normal,
    Warning,
    Final,
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Final => "final",
        })
    }
}

impl FromStr for Cue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "warning" | "warn" => Ok(Self::Warning),
            "final" => Ok(Self::Final),
            other => Err(format!("unknown cue `{other}`")),
        }
    }
}

/// Picks the cue for the tick that is about to fire.
///
/// Must be called before `cycle_count` is incremented. The final cue is
/// never returned here; the scheduler plays it on top of this one when the
/// run ends.
#[must_use]
pub fn select_cue(timer: &Timer) -> Cue {
    if !timer.enable_warning_sound {
        return Cue::Normal;
    }
    match timer.total_cycles {
        Some(total) => {
            let remaining_after_this = total.saturating_sub(1).saturating_sub(timer.cycle_count);
            if remaining_after_this < u64::from(timer.warning_cycles) {
                Cue::Warning
            } else {
                Cue::Normal
            }
        }
        // no known end, so every cycle might be the last one
        None => Cue::Warning,
    }
}

/// Whatever actually makes the sound. Fire and forget: failures stay inside
/// the implementation.
pub trait CuePlayer {
    fn play_normal(&mut self, volume: f32);
    fn play_warning(&mut self, volume: f32);
    fn play_final(&mut self, volume: f32);

    fn play(&mut self, cue: Cue, volume: f32) {
        match cue {
            Cue::Normal => self.play_normal(volume),
            Cue::Warning => self.play_warning(volume),
            Cue::Final => self.play_final(volume),
        }
    }
}

impl<P: CuePlayer + ?Sized> CuePlayer for Box<P> {
    fn play_normal(&mut self, volume: f32) {
        (**self).play_normal(volume);
    }

    fn play_warning(&mut self, volume: f32) {
        (**self).play_warning(volume);
    }

    fn play_final(&mut self, volume: f32) {
        (**self).play_final(volume);
    }
}

/// Logs cues instead of playing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayer;

impl CuePlayer for SilentPlayer {
    fn play_normal(&mut self, volume: f32) {
        log::info!("cue normal (volume {volume})");
    }

    fn play_warning(&mut self, volume: f32) {
        log::info!("cue warning (volume {volume})");
    }

    fn play_final(&mut self, volume: f32) {
        log::info!("cue final (volume {volume})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerConfig;

    fn bounded(total: u64, warning_cycles: u32, cycle_count: u64) -> Timer {
        let mut timer = Timer::new(1, TimerConfig::new(1_000).with_warning(true, warning_cycles));
        timer.total_cycles = Some(total);
        timer.cycle_count = cycle_count;
        timer
    }

    #[test]
    fn warning_starts_when_remaining_drops_below_threshold() {
        assert_eq!(select_cue(&bounded(10, 3, 6)), Cue::Normal);
        assert_eq!(select_cue(&bounded(10, 3, 7)), Cue::Warning);
        assert_eq!(select_cue(&bounded(10, 3, 9)), Cue::Warning);
        assert_eq!(select_cue(&bounded(10, 3, 0)), Cue::Normal);
    }

    #[test]
    fn zero_warning_cycles_never_warns() {
        for cycle in 0..5 {
            assert_eq!(select_cue(&bounded(5, 0, cycle)), Cue::Normal);
        }
    }

    #[test]
    fn disabled_warning_is_always_normal() {
        let mut timer = bounded(10, 3, 9);
        timer.enable_warning_sound = false;
        assert_eq!(select_cue(&timer), Cue::Normal);
        timer.total_cycles = None;
        assert_eq!(select_cue(&timer), Cue::Normal);
    }

    #[test]
    fn unbounded_always_warns() {
        let mut timer = bounded(10, 3, 0);
        timer.total_cycles = None;
        assert_eq!(select_cue(&timer), Cue::Warning);
        timer.cycle_count = 1_000;
        assert_eq!(select_cue(&timer), Cue::Warning);
    }

    #[test]
    fn parses_cue_names() {
        assert_eq!("Warning".parse::<Cue>(), Ok(Cue::Warning));
        assert_eq!("final".parse::<Cue>(), Ok(Cue::Final));
        assert!("loud".parse::<Cue>().is_err());
    }
}
