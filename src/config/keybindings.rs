//! Keybinding configuration for the TUI.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::Deserialize;

use crate::tui::app::ScreenKind;
use crate::tui::event::Action;

/// Configuration for all keybindings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeybindingConfig {
    pub quit: Vec<String>,
    pub force_quit: Vec<String>,
    pub back: Vec<String>,
    pub move_up: Vec<String>,
    pub move_down: Vec<String>,
    pub next_page: Vec<String>,
    pub prev_page: Vec<String>,
    pub top: Vec<String>,
    pub bottom: Vec<String>,
    pub confirm: Vec<String>,
    pub select_one: Vec<String>,
    pub select_all: Vec<String>,
    pub clear_selection: Vec<String>,
    pub read: Vec<String>,
    pub redownload_failed: Vec<String>,
    pub open_url: Vec<String>,
    pub open_folder: Vec<String>,
    pub remove: Vec<String>,
    pub history: Vec<String>,
    pub filter: Vec<String>,
    pub help: Vec<String>,
}

fn keys(bindings: &[&str]) -> Vec<String> {
    bindings.iter().map(|b| b.to_string()).collect()
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        Self {
            quit: keys(&["q"]),
            force_quit: keys(&["Ctrl+c", "Ctrl+d"]),
            back: keys(&["Esc"]),
            move_up: keys(&["k", "Up"]),
            move_down: keys(&["j", "Down"]),
            next_page: keys(&["l", "Right", "PageDown"]),
            prev_page: keys(&["h", "Left", "PageUp"]),
            top: keys(&["g", "Home"]),
            bottom: keys(&["G", "End"]),
            confirm: keys(&["Enter"]),
            select_one: keys(&["Space"]),
            select_all: keys(&["Tab", "Ctrl+a", "*"]),
            clear_selection: keys(&["Backspace"]),
            read: keys(&["r"]),
            redownload_failed: keys(&["r"]),
            open_url: keys(&["o"]),
            open_folder: keys(&["o"]),
            remove: keys(&["d"]),
            history: keys(&["H"]),
            filter: keys(&["/"]),
            help: keys(&["?"]),
        }
    }
}

impl KeybindingConfig {
    /// Get the action for a key event on the given screen.
    ///
    /// Some defaults share a key (`r` reads a chapter or redownloads failures, `o` opens
    /// a URL or the download folder); the screen decides which one applies.
    pub fn get_action(&self, key: &KeyEvent, screen: ScreenKind) -> Action {
        let summary = screen == ScreenKind::DownloadSummary;

        let mut table: Vec<(&[String], Action)> = vec![
            (self.force_quit.as_slice(), Action::ForceQuit),
            (self.quit.as_slice(), Action::Quit),
            (self.back.as_slice(), Action::Back),
        ];
        if summary {
            table.push((self.redownload_failed.as_slice(), Action::RedownloadFailed));
            table.push((self.open_folder.as_slice(), Action::OpenFolder));
        } else {
            table.push((self.read.as_slice(), Action::Read));
            table.push((self.open_url.as_slice(), Action::OpenUrl));
        }
        table.extend([
            (self.move_up.as_slice(), Action::MoveUp),
            (self.move_down.as_slice(), Action::MoveDown),
            (self.next_page.as_slice(), Action::NextPage),
            (self.prev_page.as_slice(), Action::PrevPage),
            (self.top.as_slice(), Action::Top),
            (self.bottom.as_slice(), Action::Bottom),
            (self.confirm.as_slice(), Action::Confirm),
            (self.select_one.as_slice(), Action::SelectOne),
            (self.select_all.as_slice(), Action::SelectAll),
            (self.clear_selection.as_slice(), Action::ClearSelection),
            (self.remove.as_slice(), Action::Remove),
            (self.history.as_slice(), Action::History),
            (self.filter.as_slice(), Action::Filter),
            (self.help.as_slice(), Action::Help),
        ]);

        table
            .into_iter()
            .find(|(bindings, _)| matches_key(key, bindings))
            .map(|(_, action)| action)
            .unwrap_or(Action::None)
    }

    /// Keys of `force_quit`, which also work while typing text.
    pub fn is_force_quit(&self, key: &KeyEvent) -> bool {
        matches_key(key, &self.force_quit)
    }
}

fn matches_key(key: &KeyEvent, bindings: &[String]) -> bool {
    bindings.iter().any(|binding| {
        parse_key_string(binding)
            .map(|parsed| parsed.matches(key))
            .unwrap_or(false)
    })
}

/// A parsed key binding with code and modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    /// Check if this binding matches a key event. Shift is ignored for characters so
    /// that "G" and "*" match however the terminal reports them.
    pub fn matches(&self, key: &KeyEvent) -> bool {
        self.code == key.code
            && (self.modifiers == key.modifiers
                || self.modifiers == (key.modifiers & !KeyModifiers::SHIFT))
    }
}

/// Parse a key string such as "j", "PageDown", "Ctrl+c" or "Shift+Tab".
pub fn parse_key_string(s: &str) -> Result<KeyBinding, String> {
    let s = s.trim();

    // "+" alone is a key, not a separator
    let (modifier_parts, key_part) = match s.rsplit_once('+') {
        Some((mods, key)) if !mods.is_empty() && !key.is_empty() => (Some(mods), key),
        _ => (None, s),
    };

    let mut modifiers = KeyModifiers::NONE;
    for part in modifier_parts.into_iter().flat_map(|m| m.split('+')) {
        match part.to_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            "alt" => modifiers |= KeyModifiers::ALT,
            _ => return Err(format!("Unknown modifier: {}", part)),
        }
    }

    let code = parse_key_code(key_part)?;
    Ok(KeyBinding { code, modifiers })
}

fn parse_key_code(s: &str) -> Result<KeyCode, String> {
    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(KeyCode::Char(c));
    }

    let lower = s.to_lowercase();
    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
        if (1..=12).contains(&n) {
            return Ok(KeyCode::F(n));
        }
    }

    match lower.as_str() {
        "enter" | "return" => Ok(KeyCode::Enter),
        "tab" => Ok(KeyCode::Tab),
        "backtab" => Ok(KeyCode::BackTab),
        "backspace" | "bs" => Ok(KeyCode::Backspace),
        "delete" | "del" => Ok(KeyCode::Delete),
        "home" => Ok(KeyCode::Home),
        "end" => Ok(KeyCode::End),
        "pageup" | "pgup" => Ok(KeyCode::PageUp),
        "pagedown" | "pgdn" => Ok(KeyCode::PageDown),
        "up" => Ok(KeyCode::Up),
        "down" => Ok(KeyCode::Down),
        "left" => Ok(KeyCode::Left),
        "right" => Ok(KeyCode::Right),
        "esc" | "escape" => Ok(KeyCode::Esc),
        "space" => Ok(KeyCode::Char(' ')),
        _ => Err(format!("Unknown key: {}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_parse_single_char() {
        let binding = parse_key_string("*").unwrap();
        assert_eq!(binding.code, KeyCode::Char('*'));
        assert_eq!(binding.modifiers, KeyModifiers::NONE);
    }

    #[test]
    fn test_parse_special_keys() {
        assert_eq!(parse_key_string("Space").unwrap().code, KeyCode::Char(' '));
        assert_eq!(parse_key_string("Backspace").unwrap().code, KeyCode::Backspace);
        assert_eq!(parse_key_string("F12").unwrap().code, KeyCode::F(12));
        assert!(parse_key_string("F13").is_err());
    }

    #[test]
    fn test_parse_modifiers() {
        let binding = parse_key_string("Ctrl+Shift+a").unwrap();
        assert_eq!(binding.code, KeyCode::Char('a'));
        assert_eq!(
            binding.modifiers,
            KeyModifiers::CONTROL | KeyModifiers::SHIFT
        );
        assert!(parse_key_string("Hyper+a").is_err());
    }

    #[test]
    fn test_parse_plus_key() {
        assert_eq!(parse_key_string("+").unwrap().code, KeyCode::Char('+'));
    }

    #[test]
    fn test_shifted_char_matches() {
        let binding = parse_key_string("G").unwrap();
        assert!(binding.matches(&key(KeyCode::Char('G'), KeyModifiers::SHIFT)));
        let binding = parse_key_string("Ctrl+c").unwrap();
        assert!(!binding.matches(&key(KeyCode::Char('c'), KeyModifiers::NONE)));
    }

    #[test]
    fn test_get_action_depends_on_screen() {
        let config = KeybindingConfig::default();
        let r = key(KeyCode::Char('r'), KeyModifiers::NONE);
        let o = key(KeyCode::Char('o'), KeyModifiers::NONE);

        assert_eq!(config.get_action(&r, ScreenKind::ChapterList), Action::Read);
        assert_eq!(
            config.get_action(&r, ScreenKind::DownloadSummary),
            Action::RedownloadFailed
        );
        assert_eq!(config.get_action(&o, ScreenKind::MangaList), Action::OpenUrl);
        assert_eq!(
            config.get_action(&o, ScreenKind::DownloadSummary),
            Action::OpenFolder
        );
    }

    #[test]
    fn test_get_action_defaults() {
        let config = KeybindingConfig::default();
        let screen = ScreenKind::ChapterList;

        let cases = [
            (key(KeyCode::Char('c'), KeyModifiers::CONTROL), Action::ForceQuit),
            (key(KeyCode::Char('q'), KeyModifiers::NONE), Action::Quit),
            (key(KeyCode::Esc, KeyModifiers::NONE), Action::Back),
            (key(KeyCode::Char(' '), KeyModifiers::NONE), Action::SelectOne),
            (key(KeyCode::Tab, KeyModifiers::NONE), Action::SelectAll),
            (key(KeyCode::Char('*'), KeyModifiers::SHIFT), Action::SelectAll),
            (key(KeyCode::Backspace, KeyModifiers::NONE), Action::ClearSelection),
            (key(KeyCode::Enter, KeyModifiers::NONE), Action::Confirm),
            (key(KeyCode::Char('H'), KeyModifiers::SHIFT), Action::History),
            (key(KeyCode::Char('/'), KeyModifiers::NONE), Action::Filter),
            (key(KeyCode::Char('?'), KeyModifiers::SHIFT), Action::Help),
            (key(KeyCode::Char('x'), KeyModifiers::NONE), Action::None),
        ];
        for (event, action) in cases {
            assert_eq!(config.get_action(&event, screen), action, "{:?}", event);
        }
    }
}
