use core_events::{KeySym, ModMask, NamedKey};
use crossterm::event::{
    KeyCode as CKeyCode, KeyEvent as CKeyEvent, KeyEventKind as CKeyEventKind,
    KeyModifiers as CKeyModifiers, MouseButton as CMouseButton,
};

/// A terminal key event reduced to what the display core consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KeyParts {
    pub key: KeySym,
    pub state: ModMask,
    pub release: bool,
}

/// Returns `None` for keys the core has no symbol for (media keys, bare
/// modifiers).
pub(crate) fn map_key_event(event: &CKeyEvent) -> Option<KeyParts> {
    let key = map_key_sym(&event.code)?;
    Some(KeyParts {
        key,
        state: map_mod_mask(event.modifiers),
        release: matches!(event.kind, CKeyEventKind::Release),
    })
}

pub(crate) fn map_key_sym(code: &CKeyCode) -> Option<KeySym> {
    let sym = match code {
        CKeyCode::Char(c) => KeySym::Char(*c),
        CKeyCode::Enter => KeySym::Named(NamedKey::Enter),
        CKeyCode::Esc => KeySym::Named(NamedKey::Esc),
        CKeyCode::Backspace => KeySym::Named(NamedKey::Backspace),
        CKeyCode::Tab | CKeyCode::BackTab => KeySym::Named(NamedKey::Tab),
        CKeyCode::Up => KeySym::Named(NamedKey::Up),
        CKeyCode::Down => KeySym::Named(NamedKey::Down),
        CKeyCode::Left => KeySym::Named(NamedKey::Left),
        CKeyCode::Right => KeySym::Named(NamedKey::Right),
        CKeyCode::Home => KeySym::Named(NamedKey::Home),
        CKeyCode::End => KeySym::Named(NamedKey::End),
        CKeyCode::PageUp => KeySym::Named(NamedKey::PageUp),
        CKeyCode::PageDown => KeySym::Named(NamedKey::PageDown),
        CKeyCode::Insert => KeySym::Named(NamedKey::Insert),
        CKeyCode::Delete => KeySym::Named(NamedKey::Delete),
        CKeyCode::F(n) => KeySym::Named(NamedKey::F(*n)),
        CKeyCode::Null
        | CKeyCode::CapsLock
        | CKeyCode::ScrollLock
        | CKeyCode::NumLock
        | CKeyCode::PrintScreen
        | CKeyCode::Pause
        | CKeyCode::Menu
        | CKeyCode::KeypadBegin
        | CKeyCode::Media(_)
        | CKeyCode::Modifier(_) => return None,
    };
    Some(sym)
}

pub(crate) fn map_mod_mask(mods: CKeyModifiers) -> ModMask {
    let mut out = ModMask::empty();
    if mods.contains(CKeyModifiers::CONTROL) {
        out |= ModMask::CTRL;
    }
    if mods.contains(CKeyModifiers::ALT) {
        out |= ModMask::ALT;
    }
    if mods.contains(CKeyModifiers::SHIFT) {
        out |= ModMask::SHIFT;
    }
    if mods.contains(CKeyModifiers::SUPER) {
        out |= ModMask::SUPER;
    }
    out
}

pub(crate) fn map_button(button: CMouseButton) -> core_events::Button {
    match button {
        CMouseButton::Left => core_events::Button::Left,
        CMouseButton::Middle => core_events::Button::Middle,
        CMouseButton::Right => core_events::Button::Right,
    }
}
