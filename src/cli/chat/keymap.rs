use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Submit the current draft.
    Commit,
    /// Insert a literal newline into the draft.
    InsertNewline,
    Insert(char),
    Backspace,
    /// Leave the session (Ctrl+C / Ctrl+D).
    Interrupt,
    Ignore,
}

// Many terminals report Shift+Enter as a bare Enter, so Ctrl+J is a newline too.
pub fn interpret(key: &KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    match key.code {
        KeyCode::Enter if key.modifiers.is_empty() => KeyAction::Commit,
        KeyCode::Enter => KeyAction::InsertNewline,
        KeyCode::Char('c') | KeyCode::Char('d') if ctrl => KeyAction::Interrupt,
        KeyCode::Char('j') if ctrl => KeyAction::InsertNewline,
        KeyCode::Char(_) if ctrl || alt => KeyAction::Ignore,
        KeyCode::Char(c) => KeyAction::Insert(c),
        KeyCode::Backspace => KeyAction::Backspace,
        _ => KeyAction::Ignore,
    }
}
