use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::conversation_state::{ConversationState, Turn};
use super::keymap::KeyAction;
use crate::answer_client::AnswerService;
use crate::error::RequestFailure;

/// Read-only view handed to observers after each mutation.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub transcript: &'a [Turn],
    pub pending: bool,
    pub draft: &'a str,
}

impl Snapshot<'_> {
    pub fn draft_is_empty(&self) -> bool {
        self.draft.is_empty()
    }
}

pub trait ConversationObserver {
    /// Called after any change to the transcript, draft or pending flag.
    fn on_change(&mut self, snapshot: &Snapshot<'_>);

    /// Called when the transcript length changed, before `on_change`.
    fn on_transcript_grew(&mut self, _transcript: &[Turn]) {}
}

/// Result of trying to start a submission.
#[must_use]
pub enum Submit {
    Accepted(PendingRequest),
    /// The text was empty or whitespace only.
    Empty,
    /// Another request is still in flight.
    Busy,
}

/// What a full submission cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Answered,
    Failed(RequestFailure),
    Empty,
    Busy,
}

#[must_use]
pub enum KeyOutcome {
    Edited,
    Submitted(Submit),
    Interrupt,
    Ignored,
}

/// An accepted question that has not been sent yet.
///
/// Holds everything needed to reach the service, so the request can run
/// while the controller keeps handling input.
#[must_use]
pub struct PendingRequest {
    question: String,
    service: Arc<dyn AnswerService>,
    timeout: Duration,
}

impl PendingRequest {
    pub fn question(&self) -> &str {
        &self.question
    }

    pub async fn send(self) -> Settlement {
        let result =
            match tokio::time::timeout(self.timeout, self.service.ask(&self.question)).await {
                Ok(result) => result,
                Err(_) => Err(RequestFailure::Timeout(self.timeout)),
            };
        Settlement { result }
    }
}

/// The settled result of a `PendingRequest`, ready to be merged back.
#[derive(Debug)]
pub struct Settlement {
    result: Result<String, RequestFailure>,
}

// At most one request in flight. Every mutation notifies observers synchronously.
pub struct ConversationController {
    state: ConversationState,
    draft: String,
    pending: bool,
    service: Arc<dyn AnswerService>,
    timeout: Duration,
    observers: Vec<Box<dyn ConversationObserver>>,
}

impl ConversationController {
    pub fn new(service: Arc<dyn AnswerService>, timeout: Duration) -> Self {
        Self {
            state: ConversationState::new(),
            draft: String::new(),
            pending: false,
            service,
            timeout,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn ConversationObserver>) {
        self.observers.push(observer);
    }

    pub fn transcript(&self) -> &[Turn] {
        self.state.turns()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn insert(&mut self, c: char) {
        self.draft.push(c);
        self.notify(false);
    }

    pub fn backspace(&mut self) {
        if self.draft.pop().is_some() {
            self.notify(false);
        }
    }

    pub fn clear_draft(&mut self) {
        if !self.draft.is_empty() {
            self.draft.clear();
            self.notify(false);
        }
    }

    /// Validate `text` and, if accepted, append the user turn, clear the
    /// draft and mark the controller pending.
    pub fn begin_submit(&mut self, text: &str) -> Submit {
        if text.trim().is_empty() {
            debug!("Ignoring empty submission");
            return Submit::Empty;
        }
        if self.pending {
            debug!("Refusing submission while a request is in flight");
            return Submit::Busy;
        }

        info!("Submitting question ({} chars)", text.chars().count());
        self.state.add_user_message(text);
        self.draft.clear();
        self.pending = true;
        self.notify(true);

        Submit::Accepted(PendingRequest {
            question: text.to_string(),
            service: Arc::clone(&self.service),
            timeout: self.timeout,
        })
    }

    /// Submit whatever is currently in the draft.
    pub fn commit_draft(&mut self) -> Submit {
        let text = self.draft.clone();
        self.begin_submit(&text)
    }

    /// Merge a settled request into the transcript and leave the pending
    /// state.
    pub fn settle(&mut self, settlement: Settlement) -> SubmitOutcome {
        let outcome = match settlement.result {
            Ok(answer) => {
                debug!("Received answer ({} chars)", answer.chars().count());
                self.state.add_assistant_message(&answer);
                SubmitOutcome::Answered
            }
            Err(failure) => {
                warn!("Question failed: {}", failure);
                self.state.add_assistant_message(&failure.to_turn_content());
                SubmitOutcome::Failed(failure)
            }
        };
        self.pending = false;
        self.notify(true);
        outcome
    }

    /// Run a whole submission cycle for `text`.
    pub async fn submit(&mut self, text: &str) -> SubmitOutcome {
        match self.begin_submit(text) {
            Submit::Accepted(request) => {
                let settlement = request.send().await;
                self.settle(settlement)
            }
            Submit::Empty => SubmitOutcome::Empty,
            Submit::Busy => SubmitOutcome::Busy,
        }
    }

    /// Apply one interpreted key press to the draft.
    pub fn apply(&mut self, action: KeyAction) -> KeyOutcome {
        match action {
            KeyAction::Commit => KeyOutcome::Submitted(self.commit_draft()),
            KeyAction::InsertNewline => {
                self.insert('\n');
                KeyOutcome::Edited
            }
            KeyAction::Insert(c) => {
                self.insert(c);
                KeyOutcome::Edited
            }
            KeyAction::Backspace => {
                self.backspace();
                KeyOutcome::Edited
            }
            KeyAction::Interrupt => KeyOutcome::Interrupt,
            KeyAction::Ignore => KeyOutcome::Ignored,
        }
    }

    /// Start the session over with an empty transcript and draft.
    ///
    /// Refused while a request is in flight so its answer cannot land in the
    /// fresh transcript. Returns whether the reset happened.
    pub fn reset(&mut self) -> bool {
        if self.pending {
            return false;
        }
        let grew = !self.state.is_empty();
        self.state.clear();
        self.draft.clear();
        info!("Conversation reset");
        self.notify(grew);
        true
    }

    /// Re-send the current state to observers without changing it, e.g.
    /// after the terminal was resized.
    pub fn refresh(&mut self) {
        self.notify(false);
    }

    fn notify(&mut self, transcript_changed: bool) {
        let snapshot = Snapshot {
            transcript: self.state.turns(),
            pending: self.pending,
            draft: &self.draft,
        };
        for observer in &mut self.observers {
            if transcript_changed {
                observer.on_transcript_grew(snapshot.transcript);
            }
            observer.on_change(&snapshot);
        }
    }
}
