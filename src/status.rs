use std::time::{Duration, Instant};

use crate::{
    i18n::{Localizer, MessageKey},
    timer::Timer,
};

/// Countdown until the next tick. Zero when the timer isn't running.
#[must_use]
pub fn time_to_next(timer: &Timer, now: Instant) -> Duration {
    match timer.last_target {
        Some(target) if timer.running => (target + timer.interval()).saturating_duration_since(now),
        _ => Duration::ZERO,
    }
}

/// One-line description of a timer, e.g.
/// `Next in 00:07 | Interval: 10s | Remaining cycles: 2 ⚠`.
///
/// Only reads the timer, so it is safe to poll as often as a display needs.
#[must_use]
pub fn status_line(timer: &Timer, now: Instant, localizer: &dyn Localizer) -> String {
    if !timer.running {
        let key = if timer.completed {
            MessageKey::StatusCompleted
        } else {
            MessageKey::StatusStopped
        };
        return localizer.translate(key, &[]);
    }

    let secs = time_to_next(timer, now).as_millis().div_ceil(1000);
    let mut line = format!(
        "{} {:02}:{:02} | {}: {}s",
        localizer.translate(MessageKey::StatusNextIn, &[]),
        secs / 60,
        secs % 60,
        localizer.translate(MessageKey::StatusInterval, &[]),
        (timer.interval_ms + 500) / 1000,
    );
    if let Some(total) = timer.total_cycles {
        let remaining = total.saturating_sub(timer.cycle_count);
        line.push_str(&format!(
            " | {}: {remaining}",
            localizer.translate(MessageKey::StatusRemainingCycles, &[])
        ));
        if timer.enable_warning_sound && remaining <= u64::from(timer.warning_cycles) {
            line.push(' ');
            line.push_str(&localizer.translate(MessageKey::StatusAlert, &[]));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{i18n::Locale, timer::TimerConfig};

    #[test]
    fn stopped_and_completed() {
        let mut timer = Timer::new(1, TimerConfig::new(1_000));
        let now = Instant::now();
        assert_eq!(status_line(&timer, now, &Locale::English), "Stopped");
        timer.completed = true;
        assert_eq!(status_line(&timer, now, &Locale::Portuguese), "Concluído");
    }

    #[test]
    fn countdown_rounds_up() {
        let start = Instant::now();
        let mut timer = Timer::new(1, TimerConfig::new(90_000).with_max_ms(900_000));
        timer.start(start).unwrap();
        let now = start + Duration::from_millis(500);
        assert_eq!(time_to_next(&timer, now), Duration::from_millis(89_500));
        assert_eq!(
            status_line(&timer, now, &Locale::English),
            "Next in 01:30 | Interval: 90s | Remaining cycles: 10"
        );
    }

    #[test]
    fn alert_marker_near_the_end() {
        let start = Instant::now();
        let mut timer = Timer::new(1, TimerConfig::new(10_000).with_max_ms(50_000));
        timer.start(start).unwrap();
        timer.cycle_count = 2;
        let line = status_line(&timer, start, &Locale::English);
        assert!(line.ends_with("Remaining cycles: 3 ⚠"), "{line}");

        timer.enable_warning_sound = false;
        let line = status_line(&timer, start, &Locale::English);
        assert!(line.ends_with("Remaining cycles: 3"), "{line}");
    }

    #[test]
    fn overdue_shows_zero() {
        let start = Instant::now();
        let mut timer = Timer::new(1, TimerConfig::new(1_000));
        timer.start(start).unwrap();
        let line = status_line(&timer, start + Duration::from_secs(5), &Locale::Spanish);
        assert_eq!(line, "Próximo en 00:00 | Intervalo: 1s");
    }
}
