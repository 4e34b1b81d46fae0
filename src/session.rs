// Gallery and chat transcript for the running session

use crate::models::{Artifact, ChatRole, ChatTurn};

/// What the UI renders: gallery artifacts newest-first, and the chat
/// transcript including the assistant reply still being streamed.
#[derive(Debug, Clone, Default)]
pub struct Session {
    gallery: Vec<Artifact>,
    turns: Vec<ChatTurn>,
    /// Assistant reply in progress; `None` when no chat job is active.
    pending: Option<String>,
    system_prompt: String,
}

impl Session {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Self::default()
        }
    }

    /// Replace the gallery with a freshly enumerated store listing.
    pub fn seed(&mut self, artifacts: Vec<Artifact>) {
        self.gallery = artifacts;
    }

    pub fn on_artifact_created(&mut self, artifact: Artifact) {
        self.gallery.insert(0, artifact);
    }

    /// Record a user message and return the history to send with it.
    ///
    /// The system turn is placed at index 0 the first time only; later calls
    /// reuse it.
    pub fn begin_chat(&mut self, text: impl Into<String>) -> Vec<ChatTurn> {
        if self.turns.is_empty() && !self.system_prompt.is_empty() {
            self.turns
                .push(ChatTurn::new(ChatRole::System, self.system_prompt.clone()));
        }
        self.turns.push(ChatTurn::new(ChatRole::User, text));
        self.pending = Some(String::new());
        self.turns.clone()
    }

    pub fn on_chat_delta(&mut self, text: &str) {
        if let Some(pending) = self.pending.as_mut() {
            pending.push_str(text);
        }
    }

    /// Freeze the reply. The final text replaces whatever deltas accumulated.
    pub fn on_chat_finalized(&mut self, text: impl Into<String>) {
        self.pending = None;
        self.turns.push(ChatTurn::new(ChatRole::Assistant, text));
    }

    /// Drop the placeholder; the user turn stays in history.
    pub fn on_chat_failed(&mut self) {
        self.pending = None;
    }

    pub fn gallery(&self) -> &[Artifact] {
        &self.gallery
    }

    #[cfg(test)]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Turns shown in the chat view: everything but the system turn, plus
    /// the pending reply.
    pub fn transcript(&self) -> Vec<ChatTurn> {
        let mut shown: Vec<ChatTurn> = self
            .turns
            .iter()
            .filter(|turn| turn.role != ChatRole::System)
            .cloned()
            .collect();
        if let Some(pending) = &self.pending {
            shown.push(ChatTurn::new(ChatRole::Assistant, pending.clone()));
        }
        shown
    }
}
