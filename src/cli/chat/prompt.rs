use rustyline::{Config, Editor, Result};

pub const IDLE_PROMPT: &str = "> ";
pub const PENDING_PROMPT: &str = "Thinking... ";
pub const CONTINUATION_PROMPT: &str = "  ";

pub fn generate_prompt(pending: bool) -> &'static str {
    if pending {
        PENDING_PROMPT
    } else {
        IDLE_PROMPT
    }
}

/// Line editor for plain mode.
pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .build();
    Editor::with_config(config)
}
