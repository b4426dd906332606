//! Key definitions.
//!
//! Bindings are a small text table (`key action [count]`, `#` comments)
//! loaded a bounded number of lines at a time from idle work. The same action
//! vocabulary is accepted from the alternate command source.

use ahash::AHashMap;
use core_events::{KeySym, NamedKey};
use core_model::{ScrollCommand, ScrollDirection};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_KEYDEFS: &str = "\
# key      action         count
Up         cursor-up
Down       cursor-down
Left       cursor-left
Right      cursor-right
Home       line-start
End        line-end
PageUp     page-up
PageDown   page-down
k          scroll-up      1
j          scroll-down    1
h          scroll-left    4
l          scroll-right   4
/          find
n          sibling
r          resume
s          toggle-scrollbars
a          auto-hide
q          quit
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    LineStart,
    LineEnd,
    PageUp,
    PageDown,
    Scroll(ScrollCommand),
    /// `None` opens the find prompt; a pattern starts the search directly.
    Find(Option<String>),
    /// Replace every match of `pattern` in the document.
    Substitute {
        pattern: String,
        replacement: String,
    },
    /// One-based line number.
    Goto(usize),
    /// Open a sibling session on the same document that scrolls through it
    /// in the background.
    Sibling,
    /// Release a held background scroll.
    Resume,
    ToggleScrollbars,
    AutoHide,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyDefError {
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("bad count `{0}`")]
    BadCount(String),
    #[error("missing argument for `{0}`")]
    MissingArgument(&'static str),
    #[error("empty command")]
    Empty,
}

pub fn parse_key(token: &str) -> Option<KeySym> {
    let named = match token {
        "Up" => NamedKey::Up,
        "Down" => NamedKey::Down,
        "Left" => NamedKey::Left,
        "Right" => NamedKey::Right,
        "Home" => NamedKey::Home,
        "End" => NamedKey::End,
        "PageUp" => NamedKey::PageUp,
        "PageDown" => NamedKey::PageDown,
        "Enter" => NamedKey::Enter,
        "Esc" => NamedKey::Esc,
        "Tab" => NamedKey::Tab,
        "Backspace" => NamedKey::Backspace,
        "Insert" => NamedKey::Insert,
        "Delete" => NamedKey::Delete,
        _ => {
            if let Some(n) = token.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
                return Some(KeySym::Named(NamedKey::F(n)));
            }
            let mut chars = token.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) => Some(KeySym::Char(c)),
                _ => None,
            };
        }
    };
    Some(KeySym::Named(named))
}

fn count(arg: Option<&str>, default: usize) -> Result<usize, KeyDefError> {
    match arg {
        None => Ok(default),
        Some(a) => a
            .parse::<usize>()
            .map_err(|_| KeyDefError::BadCount(a.to_string())),
    }
}

/// Parse an action name with its optional argument.
pub fn parse_action(name: &str, arg: Option<&str>) -> Result<Action, KeyDefError> {
    let scroll = |direction| count(arg, 1).map(|n| Action::Scroll(ScrollCommand::new(direction, n)));
    match name {
        "cursor-up" => Ok(Action::CursorUp),
        "cursor-down" => Ok(Action::CursorDown),
        "cursor-left" => Ok(Action::CursorLeft),
        "cursor-right" => Ok(Action::CursorRight),
        "line-start" => Ok(Action::LineStart),
        "line-end" => Ok(Action::LineEnd),
        "page-up" => Ok(Action::PageUp),
        "page-down" => Ok(Action::PageDown),
        "scroll-up" => scroll(ScrollDirection::Up),
        "scroll-down" => scroll(ScrollDirection::Down),
        "scroll-left" => scroll(ScrollDirection::Left),
        "scroll-right" => scroll(ScrollDirection::Right),
        "find" => Ok(Action::Find(arg.map(str::to_string))),
        "substitute" => {
            let arg = arg.ok_or(KeyDefError::MissingArgument("substitute"))?;
            let (pattern, replacement) = arg
                .split_once('/')
                .ok_or(KeyDefError::MissingArgument("substitute"))?;
            Ok(Action::Substitute {
                pattern: pattern.to_string(),
                replacement: replacement.to_string(),
            })
        }
        "goto" => {
            let line = arg.ok_or(KeyDefError::MissingArgument("goto"))?;
            count(Some(line), 1).map(Action::Goto)
        }
        "sibling" => Ok(Action::Sibling),
        "resume" => Ok(Action::Resume),
        "toggle-scrollbars" => Ok(Action::ToggleScrollbars),
        "auto-hide" => Ok(Action::AutoHide),
        "quit" | "q" => Ok(Action::Quit),
        other => Err(KeyDefError::UnknownAction(other.to_string())),
    }
}

/// Parse one line from the command source. The rest of the line after the
/// action name is its argument, so find patterns may contain spaces.
pub fn parse_command(line: &str) -> Result<Action, KeyDefError> {
    let line = line.trim();
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((n, r)) => (n, Some(r.trim_start())),
        None => (line, None),
    };
    if name.is_empty() {
        return Err(KeyDefError::Empty);
    }
    parse_action(name, rest.filter(|r| !r.is_empty()))
}

fn parse_def(line: &str) -> Result<Option<(KeySym, Action)>, KeyDefError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let (Some(key), Some(action)) = (words.next(), words.next()) else {
        return Err(KeyDefError::Empty);
    };
    let sym = parse_key(key).ok_or_else(|| KeyDefError::UnknownKey(key.to_string()))?;
    Ok(Some((sym, parse_action(action, words.next())?)))
}

/// Incrementally loaded binding table.
#[derive(Debug)]
pub struct KeyDefs {
    source: Vec<String>,
    next: usize,
    map: AHashMap<KeySym, Action>,
}

impl KeyDefs {
    pub fn new(text: &str) -> Self {
        Self {
            source: text.lines().map(str::to_string).collect(),
            next: 0,
            map: AHashMap::new(),
        }
    }

    /// Parse up to `budget` source lines. Returns true when everything is
    /// loaded. Bad lines are logged and skipped.
    pub fn load(&mut self, budget: usize) -> bool {
        let end = self.next.saturating_add(budget.max(1)).min(self.source.len());
        for (i, line) in self.source[self.next..end].iter().enumerate() {
            match parse_def(line) {
                Ok(Some((key, action))) => {
                    self.map.insert(key, action);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "keys", line = self.next + i + 1, error = %e, "keydef_skipped");
                }
            }
        }
        self.next = end;
        let done = self.done();
        if done {
            debug!(target: "keys", bindings = self.bindings(), "keydefs_complete");
        }
        done
    }

    pub fn done(&self) -> bool {
        self.next >= self.source.len()
    }

    pub fn lookup(&self, key: KeySym) -> Option<&Action> {
        self.map.get(&key)
    }

    pub fn bindings(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_table_loads_in_slices() {
        let mut defs = KeyDefs::new(DEFAULT_KEYDEFS);
        assert!(!defs.load(5));
        assert_eq!(defs.lookup(KeySym::Named(NamedKey::Up)), Some(&Action::CursorUp));
        assert_eq!(defs.lookup(KeySym::Char('q')), None);
        while !defs.load(5) {}
        assert_eq!(defs.bindings(), 18);
        assert_eq!(
            defs.lookup(KeySym::Char('j')),
            Some(&Action::Scroll(ScrollCommand::new(ScrollDirection::Down, 1)))
        );
        assert_eq!(defs.lookup(KeySym::Char('q')), Some(&Action::Quit));
    }

    #[test]
    fn bad_lines_are_skipped() {
        let mut defs = KeyDefs::new("Up cursor-up\nZap nothing\nx teleport\nj scroll-down x\n");
        assert!(defs.load(64));
        assert_eq!(defs.bindings(), 1);
    }

    #[test]
    fn commands_keep_spaces_in_arguments() {
        assert_eq!(
            parse_command("find  line 42"),
            Ok(Action::Find(Some("line 42".into())))
        );
        assert_eq!(parse_command("goto 10"), Ok(Action::Goto(10)));
        assert_eq!(
            parse_command("scroll-up 3"),
            Ok(Action::Scroll(ScrollCommand::new(ScrollDirection::Up, 3)))
        );
        assert_eq!(parse_command("find"), Ok(Action::Find(None)));
        assert_eq!(
            parse_command("substitute fo+/bar"),
            Ok(Action::Substitute {
                pattern: "fo+".into(),
                replacement: "bar".into()
            })
        );
        assert_eq!(parse_command("   "), Err(KeyDefError::Empty));
        assert_eq!(
            parse_command("goto"),
            Err(KeyDefError::MissingArgument("goto"))
        );
        assert_eq!(
            parse_command("explode now"),
            Err(KeyDefError::UnknownAction("explode".into()))
        );
    }

    #[test]
    fn function_keys_and_single_chars() {
        assert_eq!(parse_key("F5"), Some(KeySym::Named(NamedKey::F(5))));
        assert_eq!(parse_key("/"), Some(KeySym::Char('/')));
        assert_eq!(parse_key("Foo"), None);
    }
}
