use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of the transcript. Fields are private so a turn cannot change
/// after it has been appended.
#[derive(Debug, Clone)]
pub struct Turn {
    role: Role,
    content: String,
    at: DateTime<Local>,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Local::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn at(&self) -> DateTime<Local> {
        self.at
    }
}

/// Append-only list of turns for the current session.
#[derive(Debug, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_message(&mut self, message: &str) {
        self.turns.push(Turn::new(Role::User, message));
    }

    pub fn add_assistant_message(&mut self, message: &str) {
        self.turns.push(Turn::new(Role::Assistant, message));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop every turn. Only a full session reset may call this.
    pub(super) fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_keep_insertion_order() {
        let mut state = ConversationState::new();
        state.add_user_message("first");
        state.add_assistant_message("second");
        state.add_user_message("third");

        let roles: Vec<Role> = state.turns().iter().map(Turn::role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(state.turns()[1].content(), "second");
        assert_eq!(state.turns().len(), 3);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
        assert_eq!(
            serde_json::from_str::<Role>(r#""assistant""#).unwrap(),
            Role::Assistant
        );
    }
}
