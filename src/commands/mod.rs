pub mod settings;
pub mod tts;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::audio::PlaybackState;
use crate::hotkey::{parse_shortcut, HotkeyAction, HotkeyMap};
use crate::state::{AppState, AppStatus};
use crate::text::is_url;

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Say(String),
    PlayPause,
    Pause,
    Resume,
    Stop,
    Faster,
    Slower,
    Speed(f32),
    Export,
    Voices,
    Voice(String),
    Status,
    Get(String),
    Set(String, Value),
    OpenInput,
    Help,
    Quit,
}

impl From<HotkeyAction> for AppCommand {
    fn from(action: HotkeyAction) -> Self {
        match action {
            HotkeyAction::PlayPause => Self::PlayPause,
            HotkeyAction::Stop => Self::Stop,
            HotkeyAction::SpeedUp => Self::Faster,
            HotkeyAction::SpeedDown => Self::Slower,
            HotkeyAction::OpenInput => Self::OpenInput,
        }
    }
}

/// Parse one line of terminal input. Blank lines yield `None`.
///
/// Besides the command words, a configured shortcut string (`ctrl+shift+p`)
/// triggers its bound action and a bare URL is read aloud.
pub fn parse_command(line: &str, hotkeys: &HotkeyMap) -> Result<Option<AppCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match (word.to_lowercase().as_str(), rest) {
        ("say" | "read", "") => bail!("Usage: say <text or URL>"),
        ("say" | "read", text) => AppCommand::Say(text.to_string()),
        ("p" | "toggle", "") => AppCommand::PlayPause,
        ("pause", "") => AppCommand::Pause,
        ("resume" | "play", "") => AppCommand::Resume,
        ("stop", "") => AppCommand::Stop,
        ("faster" | "+", "") => AppCommand::Faster,
        ("slower" | "-", "") => AppCommand::Slower,
        ("speed", value) => match value.parse::<f32>() {
            Ok(speed) => AppCommand::Speed(speed),
            Err(_) => bail!("Usage: speed <0.5-2.0>"),
        },
        ("export" | "save", "") => AppCommand::Export,
        ("voices", "") => AppCommand::Voices,
        ("voice", "") => bail!("Usage: voice <name>"),
        ("voice", name) => AppCommand::Voice(name.to_string()),
        ("status", "") => AppCommand::Status,
        ("get", "") => bail!("Usage: get <key>"),
        ("get", key) => AppCommand::Get(key.to_string()),
        ("set", args) => {
            let Some((key, raw)) = args.split_once(char::is_whitespace) else {
                bail!("Usage: set <key> <value>");
            };
            // Unquoted values are taken as strings.
            let value = serde_json::from_str(raw.trim())
                .unwrap_or_else(|_| Value::String(raw.trim().to_string()));
            AppCommand::Set(key.to_string(), value)
        }
        ("open" | "input", "") => AppCommand::OpenInput,
        ("help" | "?", "") => AppCommand::Help,
        ("quit" | "exit" | "q", "") => AppCommand::Quit,
        _ => {
            if let Some(action) = parse_shortcut(line).ok().and_then(|s| hotkeys.lookup(&s)) {
                AppCommand::from(action)
            } else if is_url(line) {
                AppCommand::Say(line.to_string())
            } else {
                bail!("Unknown command: {} (type 'help')", line)
            }
        }
    };
    Ok(Some(command))
}

/// Run a command against the application state and describe the outcome.
///
/// `Quit` and `OpenInput` need the terminal and are handled by the caller.
pub async fn execute(state: &AppState, command: AppCommand, hotkeys: &HotkeyMap) -> Result<String> {
    let message = match command {
        AppCommand::Say(text) => {
            tts::speak_text(state, &text).await?;
            "Speaking".to_string()
        }
        AppCommand::PlayPause => format!("{:?}", tts::toggle_play_pause(state)?),
        AppCommand::Pause => {
            state.player.pause();
            if state.player.state() == PlaybackState::Paused {
                state.set_status(AppStatus::Paused);
            }
            format!("{:?}", state.player.state())
        }
        AppCommand::Resume => {
            if state.player.state() == PlaybackState::Paused {
                tts::toggle_play_pause(state)?;
            }
            format!("{:?}", state.player.state())
        }
        AppCommand::Stop => {
            tts::stop_speaking(state);
            "Stopped".to_string()
        }
        AppCommand::Faster => format!("Speed {}x", tts::speed_up(state)?),
        AppCommand::Slower => format!("Speed {}x", tts::speed_down(state)?),
        AppCommand::Speed(speed) => {
            tts::set_speed(state, speed)?;
            format!("Speed {}x", speed)
        }
        AppCommand::Export => format!("Saved {}", tts::export_last(state)?.display()),
        AppCommand::Voices => {
            let voices = tts::list_voices(state)?;
            if voices.is_empty() {
                format!("No voices installed in {}", state.voices_dir.display())
            } else {
                voices
                    .iter()
                    .map(|v| format!("{} ({} Hz)", v.name, v.sample_rate))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        AppCommand::Voice(name) => {
            tts::set_voice(state, &name)?;
            format!("Voice {}", name)
        }
        AppCommand::Status => serde_json::to_string_pretty(&tts::get_status(state))?,
        AppCommand::Get(key) => settings::get_setting(state, &key)?.to_string(),
        AppCommand::Set(key, value) => {
            settings::set_setting(state, &key, value)?;
            format!("Updated {}", key)
        }
        AppCommand::Help => help_text(hotkeys),
        AppCommand::OpenInput | AppCommand::Quit => bail!("Not available here"),
    };
    Ok(message)
}

pub fn help_text(hotkeys: &HotkeyMap) -> String {
    let mut help = String::from(
        "Commands:\n  \
         say <text|url>   read text or a web page aloud\n  \
         p                play/pause (replays the last text when stopped)\n  \
         pause | resume | stop\n  \
         faster | slower | speed <x>\n  \
         export           save the last audio as WAV\n  \
         voices | voice <name>\n  \
         status | get <key> | set <key> <value>\n  \
         open             enter text on the next line\n  \
         quit",
    );
    if !hotkeys.bindings().is_empty() {
        help.push_str("\nShortcuts:");
        for (shortcut, action) in hotkeys.bindings() {
            help.push_str(&format!("\n  {:<16} {:?}", shortcut.to_string(), action));
        }
    }
    help
}
