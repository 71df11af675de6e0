// Session history
// A bounded record of question/answer exchanges replayed in front of new questions


use itertools::Itertools;
use std::collections::VecDeque;
use tracing::debug;

/// One question and the answer given to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Ring buffer of the most recent turns; the oldest is dropped when full
#[derive(Debug, Clone)]
pub struct SessionHistory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl Default for SessionHistory {
    #[inline]
    fn default() -> Self {
        Self::with_capacity(20)
    }
}

impl SessionHistory {
    #[inline]
    pub fn with_capacity(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Prefix `question` with every stored turn as `Q:`/`A:` lines
    #[inline]
    pub fn compose_query(&self, question: &str) -> String {
        if self.turns.is_empty() {
            return question.to_string();
        }

        let transcript = self
            .turns
            .iter()
            .map(|turn| format!("Q: {}\nA: {}", turn.question, turn.answer))
            .join("\n");
        format!("{}\n{}", transcript, question)
    }

    #[inline]
    pub fn record(&mut self, question: &str, answer: &str) {
        if self.turns.len() == self.max_turns {
            self.turns.pop_front();
            debug!("History full, dropped oldest turn");
        }
        self.turns.push_back(Turn {
            question: question.to_string(),
            answer: answer.to_string(),
        });
    }

    #[inline]
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_turns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
