//! Conversation memory with a sliding window.
//!
//! System rounds are pinned. Everything else is evicted oldest first once the
//! window is full. A model round that requested tools leaves together with
//! the tool results answering it, so the history never starts with an
//! orphaned tool result.

use tracing::debug;

use crate::provider::types::{MessageRound, Role};

#[derive(Debug, Clone)]
pub struct Conversation {
    rounds: Vec<MessageRound>,
    window: usize,
}

impl Conversation {
    /// `window` is the maximum number of rounds kept, system rounds included.
    pub fn new(window: usize) -> Self {
        Self {
            rounds: Vec::new(),
            window: window.max(1),
        }
    }

    /// Start with an optional system preamble.
    pub fn with_system_prompt(window: usize, prompt: Option<&str>) -> Self {
        let mut conversation = Self::new(window);
        if let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) {
            conversation.push(MessageRound::system(prompt));
        }
        conversation
    }

    pub fn push(&mut self, round: MessageRound) {
        self.rounds.push(round);
        self.evict();
    }

    pub fn extend(&mut self, rounds: impl IntoIterator<Item = MessageRound>) {
        for round in rounds {
            self.push(round);
        }
    }

    /// Rounds in chronological order.
    pub fn rounds(&self) -> &[MessageRound] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Drop everything except the system preamble.
    pub fn clear(&mut self) {
        self.rounds.retain(|r| r.role() == Role::System);
    }

    fn evict(&mut self) {
        let mut evicted = 0usize;
        while self.rounds.len() > self.window {
            let Some(idx) = self.oldest_evictable() else {
                break;
            };
            let round = self.rounds.remove(idx);
            evicted += 1;
            if round.has_tool_calls() {
                while self.rounds.get(idx).is_some_and(|r| r.role() == Role::Tool) {
                    self.rounds.remove(idx);
                    evicted += 1;
                }
            }
            // An unanswered tool result at the head is meaningless to any backend.
            while let Some(idx) = self.oldest_evictable() {
                if self.rounds[idx].role() != Role::Tool {
                    break;
                }
                self.rounds.remove(idx);
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, kept = self.rounds.len(), "Trimmed conversation window");
        }
    }

    fn oldest_evictable(&self) -> Option<usize> {
        self.rounds.iter().position(|r| r.role() != Role::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::ToolCall;
    use serde_json::Map;

    fn call(id: &str) -> ToolCall {
        ToolCall::from_arguments("t", Some(id.into()), &Map::new()).unwrap()
    }

    fn texts(conversation: &Conversation) -> Vec<String> {
        conversation
            .rounds()
            .iter()
            .map(|r| format!("{}:{}", r.role(), r.content().unwrap_or("-")))
            .collect()
    }

    #[test]
    fn test_window_keeps_system_and_newest() {
        let mut conversation = Conversation::with_system_prompt(3, Some("be brief"));
        for i in 0..5 {
            conversation.push(MessageRound::user(format!("u{i}")));
        }
        assert_eq!(texts(&conversation), vec!["SYSTEM:be brief", "USER:u3", "USER:u4"]);
    }

    #[test]
    fn test_blank_system_prompt_is_ignored() {
        let conversation = Conversation::with_system_prompt(5, Some("  "));
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_tool_results_leave_with_their_request() {
        let mut conversation = Conversation::new(4);
        conversation.push(MessageRound::user("question"));
        conversation.push(MessageRound::model(None, vec![call("a"), call("b")]).unwrap());
        conversation.push(MessageRound::tool_result("t", Some("a".into()), "ra"));
        conversation.push(MessageRound::tool_result("t", Some("b".into()), "rb"));
        assert_eq!(conversation.len(), 4);

        conversation.push(MessageRound::model(Some("answer".into()), vec![]).unwrap());
        assert_eq!(
            texts(&conversation),
            vec!["MODEL:-", "TOOL:ra", "TOOL:rb", "MODEL:answer"]
        );

        conversation.push(MessageRound::user("next"));
        assert_eq!(texts(&conversation), vec!["MODEL:answer", "USER:next"]);
    }

    #[test]
    fn test_clear_keeps_system() {
        let mut conversation = Conversation::with_system_prompt(10, Some("sys"));
        conversation.push(MessageRound::user("hi"));
        conversation.clear();
        assert_eq!(texts(&conversation), vec!["SYSTEM:sys"]);
    }
}
