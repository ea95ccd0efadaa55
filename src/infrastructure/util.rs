use std::fmt::Debug;

use poise::CreateReply;

/// Creates a lazily initialized static regex variable with a constant regex expression.
#[macro_export]
macro_rules! lazy_regex {
    ($name:ident, $value:expr) => {
        static $name: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($value).expect("Regex contains body"));
    };
}

/// Trace-friendly view of a `CreateReply`; attachments are reduced to their file names.
pub struct DebuggableReply(CreateReply);

impl DebuggableReply {
    pub fn new(value: &CreateReply) -> Self {
        Self(value.clone())
    }
}

impl Debug for DebuggableReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attachments: Vec<&str> = self
            .0
            .attachments
            .iter()
            .map(|attachment| attachment.filename.as_str())
            .collect();
        f.debug_struct("CreateReply")
            .field("content", &self.0.content)
            .field("embeds", &self.0.embeds)
            .field("attachments", &attachments)
            .field("ephemeral", &self.0.ephemeral)
            .finish()
    }
}

/// Caps `text` at `max_chars` characters, ending it with an ellipsis when something was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
