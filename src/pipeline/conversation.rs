//! Append-only message history shared by the calls of one document unit.
//!
//! The correction passes only work because the model still "sees" the page
//! and its own first extraction when asked to fix addresses or dates. That
//! dependency is made explicit: every call receives the history so far and
//! the new turn, and the exchange is appended only once the call succeeded.
//! A conversation belongs to exactly one unit and is never shared.

use serde::Serialize;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    User,
    Assistant,
}

/// One piece of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Part {
    /// Plain text (prompt, JSON payload, reference dataset).
    Text(String),
    /// A document previously uploaded to the backend, by attachment id.
    Attachment(String),
}

/// A single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    /// A user turn made of the given parts.
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    /// An assistant turn holding the raw reply text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// All text parts joined by blank lines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Attachment(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Ids of the attachments referenced by this turn.
    pub fn attachments(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Attachment(id) => Some(id.as_str()),
            Part::Text(_) => None,
        })
    }
}

/// The history of one unit's pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed exchange: the user turn and the model's reply.
    pub fn record(&mut self, request: Turn, reply: &str) {
        self.turns.push(request);
        self.turns.push(Turn::assistant(reply));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_both_sides() {
        let mut c = Conversation::new();
        assert!(c.is_empty());
        c.record(Turn::user(vec![Part::Text("extract".into())]), "[]");
        assert_eq!(c.len(), 2);
        assert_eq!(c.turns()[0].role, Role::User);
        assert_eq!(c.turns()[1], Turn::assistant("[]"));
    }

    #[test]
    fn text_skips_attachments() {
        let t = Turn::user(vec![
            Part::Text("prompt".into()),
            Part::Attachment("att-1".into()),
            Part::Text("{\"kecamatan\": []}".into()),
        ]);
        assert_eq!(t.text(), "prompt\n\n{\"kecamatan\": []}");
        assert_eq!(t.attachments().collect::<Vec<_>>(), vec!["att-1"]);
    }
}
