//! Display strings for status lines and errors.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    StatusStopped,
    StatusCompleted,
    StatusNextIn,
    StatusInterval,
    StatusRemainingCycles,
    StatusAlert,
    InvalidInterval,
    InvalidMaxDuration,
    UnknownTimer,
    AlreadyRunning,
}

/// Maps a message key to display text, filling `{name}` placeholders from
/// `args`. Unknown placeholders are left as they are.
pub trait Localizer {
    fn template(&self, key: MessageKey) -> &str;

    fn translate(&self, key: MessageKey, args: &[(&str, String)]) -> String {
        let mut text = self.template(key).to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "pt-BR")]
    Portuguese,
    #[serde(rename = "es")]
    Spanish,
}

impl Localizer for Locale {
    fn template(&self, key: MessageKey) -> &str {
        use MessageKey as K;
        match self {
            Self::English => match key {
                K::StatusStopped => "Stopped",
                K::StatusCompleted => "Completed",
                K::StatusNextIn => "Next in",
                K::StatusInterval => "Interval",
                K::StatusRemainingCycles => "Remaining cycles",
                K::StatusAlert => "⚠",
                K::InvalidInterval => "Please enter an interval greater than zero.",
                K::InvalidMaxDuration => "The max time must be at least one interval long.",
                K::UnknownTimer => "There is no timer {id}.",
                K::AlreadyRunning => "Timer {id} is already running.",
            },
            Self::Portuguese => match key {
                K::StatusStopped => "Parado",
                K::StatusCompleted => "Concluído",
                K::StatusNextIn => "Próximo em",
                K::StatusInterval => "Intervalo",
                K::StatusRemainingCycles => "Ciclos restantes",
                K::StatusAlert => "⚠",
                K::InvalidInterval => "Informe um intervalo maior que zero.",
                K::InvalidMaxDuration => "O tempo máximo deve ser de pelo menos um intervalo.",
                K::UnknownTimer => "Não existe o timer {id}.",
                K::AlreadyRunning => "O timer {id} já está em execução.",
            },
            Self::Spanish => match key {
                K::StatusStopped => "Detenido",
                K::StatusCompleted => "Completado",
                K::StatusNextIn => "Próximo en",
                K::StatusInterval => "Intervalo",
                K::StatusRemainingCycles => "Ciclos restantes",
                K::StatusAlert => "⚠",
                K::InvalidInterval => "Introduce un intervalo mayor que cero.",
                K::InvalidMaxDuration => "El tiempo máximo debe durar al menos un intervalo.",
                K::UnknownTimer => "No existe el temporizador {id}.",
                K::AlreadyRunning => "El temporizador {id} ya está en marcha.",
            },
        }
    }
}

impl Locale {
    /// The language named by `LC_ALL`, `LC_MESSAGES` or `LANG`, whichever is
    /// set first, if it is one we have text for.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .into_iter()
            .filter_map(lookup)
            .find(|value| !value.is_empty())
            .and_then(|value| value.parse().ok())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::English => "en",
            Self::Portuguese => "pt-BR",
            Self::Spanish => "es",
        })
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("pt") {
            Ok(Self::Portuguese)
        } else if lower.starts_with("es") {
            Ok(Self::Spanish)
        } else if lower.starts_with("en") {
            Ok(Self::English)
        } else {
            Err(format!("unsupported language `{s}`"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_placeholders() {
        let text = Locale::English.translate(MessageKey::UnknownTimer, &[("id", 7.to_string())]);
        assert_eq!(text, "There is no timer 7.");
    }

    #[test]
    fn parses_browser_style_tags() {
        assert_eq!("pt-BR".parse(), Ok(Locale::Portuguese));
        assert_eq!("es-MX".parse(), Ok(Locale::Spanish));
        assert_eq!("EN".parse(), Ok(Locale::English));
        assert!("de".parse::<Locale>().is_err());
    }

    fn env(vars: &[(&str, &str)]) -> Option<Locale> {
        Locale::from_vars(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        })
    }

    #[test]
    fn locale_from_environment() {
        assert_eq!(env(&[("LANG", "pt_BR.UTF-8")]), Some(Locale::Portuguese));
        assert_eq!(
            env(&[("LC_ALL", "es_ES.UTF-8"), ("LANG", "en_US.UTF-8")]),
            Some(Locale::Spanish)
        );
        // an empty LC_ALL doesn't hide LANG
        assert_eq!(env(&[("LC_ALL", ""), ("LANG", "es_AR")]), Some(Locale::Spanish));
        assert_eq!(env(&[("LANG", "C.UTF-8")]), None);
        assert_eq!(env(&[]), None);
    }
}
