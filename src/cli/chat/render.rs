use std::io::{self, Write};

use color_print::cformat;
use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::terminal::{self, Clear, ClearType};
use tracing::warn;

use super::controller::{ConversationObserver, Snapshot};
use super::conversation_state::{Role, Turn};
use super::prompt::{generate_prompt, CONTINUATION_PROMPT};

const PLACEHOLDER: &str = "Type your question...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Terminal in raw mode; the renderer owns the input line.
    Raw,
    /// Cooked terminal or pipe; a line editor owns the input line.
    Plain,
}

/// Prints the transcript to a terminal as it grows.
pub struct TerminalRenderer {
    output: Box<dyn Write>,
    mode: RenderMode,
    shown: usize,
    draft_rows: u16,
    was_pending: bool,
    width: Option<u16>,
}

impl TerminalRenderer {
    pub fn new(output: Box<dyn Write>, mode: RenderMode) -> Self {
        Self {
            output,
            mode,
            shown: 0,
            draft_rows: 0,
            was_pending: false,
            width: None,
        }
    }

    #[cfg(test)]
    fn with_width(mut self, width: u16) -> Self {
        self.width = Some(width);
        self
    }

    fn terminal_width(&self) -> Option<u16> {
        self.width
            .or_else(|| terminal::size().ok().map(|(columns, _)| columns))
    }

    fn newline(&self) -> &'static str {
        match self.mode {
            RenderMode::Raw => "\r\n",
            RenderMode::Plain => "\n",
        }
    }

    /// Erase the input area drawn by the last `draw_input`.
    fn clear_input(&mut self) -> io::Result<()> {
        if self.draft_rows > 1 {
            queue!(self.output, MoveUp(self.draft_rows - 1))?;
        }
        queue!(self.output, MoveToColumn(0), Clear(ClearType::FromCursorDown))?;
        self.draft_rows = 0;
        Ok(())
    }

    fn draw_turns(&mut self, transcript: &[Turn]) -> io::Result<()> {
        if self.mode == RenderMode::Raw {
            self.clear_input()?;
        }

        let nl = self.newline();
        if transcript.len() < self.shown {
            write!(self.output, "{}{}", cformat!("<dim>-- new conversation --</dim>"), nl)?;
            self.shown = 0;
        }

        for turn in &transcript[self.shown..] {
            // The line editor has already echoed the question.
            if self.mode == RenderMode::Plain && turn.role() == Role::User {
                continue;
            }
            write!(self.output, "{}{}", format_header(turn), nl)?;
            let body = format_body(turn);
            for line in body.split('\n') {
                write!(self.output, "{}{}", line, nl)?;
            }
            write!(self.output, "{}", nl)?;
        }
        self.shown = transcript.len();
        self.output.flush()
    }

    fn draw_input(&mut self, snapshot: &Snapshot<'_>) -> io::Result<()> {
        self.clear_input()?;

        let width = self.terminal_width();
        let mut rows = 0u16;
        for (i, line) in snapshot.draft.split('\n').enumerate() {
            let visible = if i == 0 {
                generate_prompt(snapshot.pending).chars().count() + line.chars().count()
            } else {
                CONTINUATION_PROMPT.chars().count() + line.chars().count()
            };
            rows = rows.saturating_add(wrapped_rows(visible, width));

            if i == 0 {
                let prompt = generate_prompt(snapshot.pending);
                write!(self.output, "{}", cformat!("<cyan>{}</cyan>", prompt))?;
                if snapshot.draft_is_empty() && !snapshot.pending {
                    write!(self.output, "{}", cformat!("<dim>{}</dim>", PLACEHOLDER))?;
                    queue!(self.output, MoveToColumn(prompt.chars().count() as u16))?;
                } else {
                    write!(self.output, "{}", line)?;
                }
            } else {
                write!(self.output, "\r\n{}{}", CONTINUATION_PROMPT, line)?;
            }
        }
        self.draft_rows = rows;
        self.output.flush()
    }

    fn draw_status(&mut self, snapshot: &Snapshot<'_>) -> io::Result<()> {
        if snapshot.pending && !self.was_pending {
            writeln!(self.output, "{}", cformat!("<dim>Thinking...</dim>"))?;
            self.output.flush()?;
        }
        Ok(())
    }
}

impl ConversationObserver for TerminalRenderer {
    fn on_change(&mut self, snapshot: &Snapshot<'_>) {
        let result = match self.mode {
            RenderMode::Raw => self.draw_input(snapshot),
            RenderMode::Plain => self.draw_status(snapshot),
        };
        if let Err(e) = result {
            warn!("Failed to render input line: {}", e);
        }
        self.was_pending = snapshot.pending;
    }

    fn on_transcript_grew(&mut self, transcript: &[Turn]) {
        if let Err(e) = self.draw_turns(transcript) {
            warn!("Failed to render transcript: {}", e);
        }
    }
}

/// Terminal rows taken by `columns` characters on a screen `width` wide.
fn wrapped_rows(columns: usize, width: Option<u16>) -> u16 {
    match width {
        Some(width) if width > 0 => {
            let rows = columns.max(1).div_ceil(usize::from(width));
            u16::try_from(rows).unwrap_or(u16::MAX)
        }
        _ => 1,
    }
}

fn format_header(turn: &Turn) -> String {
    let time = turn.at().format("%H:%M");
    match turn.role() {
        Role::User => cformat!("<green><bold>you</bold></green> <dim>{}</dim>", time),
        Role::Assistant => cformat!("<blue><bold>studybuddy</bold></blue> <dim>{}</dim>", time),
    }
}

fn format_body(turn: &Turn) -> String {
    let content = turn.content();
    if turn.role() == Role::Assistant && content.starts_with("Error: ") {
        cformat!("<red>{}</red>", content)
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::answer_client::MockAnswerService;
    use crate::cli::chat::controller::ConversationController;

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).to_string()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn controller_with(
        buffer: &SharedBuffer,
        mode: RenderMode,
        reply: Result<&'static str, &'static str>,
    ) -> ConversationController {
        let mut service = MockAnswerService::new();
        service.expect_ask().returning(move |_| {
            reply
                .map(str::to_string)
                .map_err(|e| crate::error::RequestFailure::Transport(e.to_string()))
        });
        let mut controller =
            ConversationController::new(Arc::new(service), Duration::from_secs(5));
        controller.subscribe(Box::new(TerminalRenderer::new(
            Box::new(buffer.clone()),
            mode,
        )));
        controller
    }

    #[tokio::test]
    async fn test_plain_mode_prints_answer_but_not_echoed_question() {
        let buffer = SharedBuffer::default();
        let mut controller = controller_with(&buffer, RenderMode::Plain, Ok("4"));

        controller.submit("What is 2+2?").await;

        let text = buffer.text();
        assert!(!text.contains("What is 2+2?"));
        assert!(!text.contains("you"));
        assert!(text.contains("studybuddy"));
        assert!(text.contains("Thinking..."));
        assert!(text.contains("\n4\n"));
        assert!(!text.contains('\r'));
    }

    #[tokio::test]
    async fn test_error_turn_is_rendered_with_description() {
        let buffer = SharedBuffer::default();
        let mut controller = controller_with(&buffer, RenderMode::Plain, Err("timeout"));

        controller.submit("ping").await;

        assert!(buffer.text().contains("Error: timeout"));
    }

    #[tokio::test]
    async fn test_raw_mode_uses_carriage_returns_and_redraws_draft() {
        let buffer = SharedBuffer::default();
        let mut controller = controller_with(&buffer, RenderMode::Raw, Ok("line a\nline b"));

        controller.insert('h');
        controller.insert('i');
        assert!(buffer.text().ends_with("hi"));

        controller.submit("hi").await;

        let text = buffer.text();
        assert!(text.contains("you"));
        assert!(text.contains("line a\r\nline b\r\n"));
        assert!(text.contains("> "));
    }

    #[test]
    fn test_wrapped_rows_counts_terminal_lines() {
        assert_eq!(wrapped_rows(0, Some(10)), 1);
        assert_eq!(wrapped_rows(10, Some(10)), 1);
        assert_eq!(wrapped_rows(11, Some(10)), 2);
        assert_eq!(wrapped_rows(27, Some(10)), 3);
        assert_eq!(wrapped_rows(500, None), 1);
    }

    #[test]
    fn test_raw_mode_clears_every_wrapped_row_of_long_draft() {
        let buffer = SharedBuffer::default();
        let service = MockAnswerService::new();
        let mut controller =
            ConversationController::new(Arc::new(service), Duration::from_secs(5));
        controller.subscribe(Box::new(
            TerminalRenderer::new(Box::new(buffer.clone()), RenderMode::Raw).with_width(10),
        ));

        // "> " plus 25 characters spans three rows of a 10-column terminal.
        for c in "abcdefghijklmnopqrstuvwxy".chars() {
            controller.insert(c);
        }
        buffer.0.borrow_mut().clear();
        controller.insert('z');

        assert!(buffer.text().starts_with("\x1b[2A"));
    }

    #[tokio::test]
    async fn test_reset_marks_new_conversation() {
        let buffer = SharedBuffer::default();
        let mut controller = controller_with(&buffer, RenderMode::Plain, Ok("4"));

        controller.submit("What is 2+2?").await;
        assert!(controller.reset());

        assert!(buffer.text().contains("-- new conversation --"));
    }
}
