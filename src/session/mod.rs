//! Conversation history
//!
//! The engine is stateless across calls; the caller owns a
//! `SessionHistory` and passes it into each `ask`. A turn is only
//! recorded once its answer was produced, so failed queries never
//! pollute the context given to the narrator.

use crate::models::{ConversationTurn, QueryIntent};
use chrono::Utc;
use std::collections::VecDeque;
use uuid::Uuid;

const DEFAULT_MAX_TURNS: usize = 20;

/// How many recent turns are rendered into the narrator context.
const CONTEXT_TURNS: usize = 5;

#[derive(Debug, Clone)]
pub struct SessionHistory {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TURNS)
    }

    pub fn with_capacity(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.back()
    }

    /// Record a completed turn, trimming the oldest past capacity.
    pub fn record(
        &mut self,
        question: &str,
        intent: QueryIntent,
        result_summary: String,
        answer: &str,
    ) {
        self.turns.push_back(ConversationTurn {
            turn_id: Uuid::new_v4(),
            question: question.to_string(),
            intent,
            result_summary,
            answer: answer.to_string(),
            timestamp: Utc::now(),
        });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Render the recent turns for the narrator prompt.
    pub fn context_block(&self) -> String {
        let skip = self.turns.len().saturating_sub(CONTEXT_TURNS);
        self.turns
            .iter()
            .skip(skip)
            .map(|turn| format!("User: {}\nAssistant: {}", turn.question, turn.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
