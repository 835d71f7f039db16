/// Local commands handled by the client instead of being sent as questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Quit,
}

impl Command {
    /// Recognise a command only when the whole trimmed input is one.
    /// Anything else, including other text starting with `/`, is a question.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "/help" => Some(Self::Help),
            "/clear" => Some(Self::Clear),
            "/quit" | "/exit" => Some(Self::Quit),
            _ => None,
        }
    }
}
