use std::fmt;

use thiserror::Error;

use crate::state::ShortcutSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    PlayPause,
    Stop,
    SpeedUp,
    SpeedDown,
    OpenInput,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortcutError {
    #[error("shortcut is empty")]
    Empty,

    #[error("shortcut '{0}' has an empty segment")]
    EmptySegment(String),

    #[error("shortcut '{0}' repeats the modifier '{1}'")]
    DuplicateModifier(String, String),

    #[error("shortcut '{0}' has more than one key")]
    MultipleKeys(String),

    #[error("shortcut '{0}' has no key, only modifiers")]
    MissingKey(String),
}

/// A key combination such as `ctrl+shift+p`, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shortcut {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
    pub key: String,
}

pub fn parse_shortcut(input: &str) -> Result<Shortcut, ShortcutError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ShortcutError::Empty);
    }

    let mut shortcut = Shortcut {
        ctrl: false,
        shift: false,
        alt: false,
        meta: false,
        key: String::new(),
    };

    for segment in trimmed.split('+') {
        let part = segment.trim().to_lowercase();
        if part.is_empty() {
            return Err(ShortcutError::EmptySegment(trimmed.to_string()));
        }

        let flag = match part.as_str() {
            "ctrl" | "control" => &mut shortcut.ctrl,
            "shift" => &mut shortcut.shift,
            "alt" | "option" | "opt" => &mut shortcut.alt,
            "meta" | "cmd" | "command" | "super" | "win" => &mut shortcut.meta,
            _ => {
                if !shortcut.key.is_empty() {
                    return Err(ShortcutError::MultipleKeys(trimmed.to_string()));
                }
                shortcut.key = part.clone();
                continue;
            }
        };
        if *flag {
            return Err(ShortcutError::DuplicateModifier(trimmed.to_string(), part));
        }
        *flag = true;
    }

    if shortcut.key.is_empty() {
        return Err(ShortcutError::MissingKey(trimmed.to_string()));
    }
    Ok(shortcut)
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifiers = [
            (self.ctrl, "Ctrl"),
            (self.alt, "Alt"),
            (self.shift, "Shift"),
            (self.meta, "Meta"),
        ];
        for (_, label) in modifiers.iter().filter(|(on, _)| *on) {
            write!(f, "{}+", label)?;
        }

        let mut chars = self.key.chars();
        match chars.next() {
            Some(first) => write!(f, "{}{}", first.to_uppercase(), chars.as_str()),
            None => Ok(()),
        }
    }
}

/// Human-readable label for a configured shortcut string, e.g. `Ctrl+Shift+P`.
/// Unparseable input is shown as given.
pub fn shortcut_display_label(input: &str) -> String {
    match parse_shortcut(input) {
        Ok(shortcut) => shortcut.to_string(),
        Err(_) => input.to_string(),
    }
}

/// Configured shortcuts resolved to the actions they trigger.
#[derive(Debug, Clone, Default)]
pub struct HotkeyMap {
    bindings: Vec<(Shortcut, HotkeyAction)>,
}

impl HotkeyMap {
    pub fn from_settings(shortcuts: &ShortcutSettings) -> Self {
        let configured = [
            (&shortcuts.play_pause, HotkeyAction::PlayPause),
            (&shortcuts.stop, HotkeyAction::Stop),
            (&shortcuts.speed_up, HotkeyAction::SpeedUp),
            (&shortcuts.speed_down, HotkeyAction::SpeedDown),
            (&shortcuts.open_input, HotkeyAction::OpenInput),
        ];

        let mut bindings: Vec<(Shortcut, HotkeyAction)> = Vec::new();
        for (raw, action) in configured {
            match parse_shortcut(raw) {
                Ok(shortcut) => {
                    if let Some((_, existing)) = bindings.iter().find(|(s, _)| *s == shortcut) {
                        tracing::warn!(
                            "Shortcut {} for {:?} already bound to {:?}, skipping",
                            shortcut,
                            action,
                            existing
                        );
                        continue;
                    }
                    bindings.push((shortcut, action));
                }
                Err(e) => tracing::warn!("Ignoring shortcut for {:?}: {}", action, e),
            }
        }

        tracing::debug!("Registered {} shortcuts", bindings.len());
        Self { bindings }
    }

    pub fn lookup(&self, shortcut: &Shortcut) -> Option<HotkeyAction> {
        self.bindings
            .iter()
            .find(|(s, _)| s == shortcut)
            .map(|(_, action)| *action)
    }

    pub fn bindings(&self) -> &[(Shortcut, HotkeyAction)] {
        &self.bindings
    }
}
