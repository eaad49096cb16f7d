// Assistant orchestration: prompt assembly and per-team conversation memory.
//
// The model sees the target and the current build in chess notation and is asked to
// answer in prose with optional `<actions>` blocks, which `domain::ai_actions` parses.

use crate::domain::ai_actions::{ActionBounds, MAX_ACTIONS_PER_REPLY};
use crate::domain::block::BlockType;
use crate::domain::grid::Grid;
use crate::domain::notation::{cell_name, describe_grid};
use crate::domain::ports::{ChatRole, ChatTurn};
use std::collections::VecDeque;

/// Turns kept per team (user and assistant messages count separately).
pub const HISTORY_TURNS: usize = 12;
/// Longest request text forwarded to the model.
pub const MAX_REQUEST_CHARS: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: VecDeque<ChatTurn>,
}

impl ConversationHistory {
    pub fn push(&mut self, turn: ChatTurn) {
        while self.turns.len() >= HISTORY_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }
}

/// Trims the request and caps its length. `None` when nothing is left.
pub fn clean_request(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .take(MAX_REQUEST_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

pub fn system_prompt(bounds: ActionBounds) -> String {
    let vocabulary: Vec<&str> = BlockType::ALL.iter().map(|b| b.as_str()).collect();
    let last_cell = cell_name(bounds.size.saturating_sub(1), bounds.size.saturating_sub(1));
    format!(
        "You help a builder recreate a block structure on a {size}x{size} grid. \
Cells are named A1 to {last_cell}: the letter is the column, the number is the row. \
Each cell holds a stack of at most {max_height} blocks, listed bottom first.\n\
Block types: {vocab}. \"air\" is an invisible spacer; \"empty\" removes the top block.\n\
Answer briefly in plain language. To place blocks, append a JSON array inside \
<actions></actions> tags, for example:\n\
<actions>[{{\"row\": 0, \"col\": 0, \"block\": \"wall\"}}]</actions>\n\
row and col are zero-based numbers; an optional \"height\" sets the layer (0 is the ground). \
Send at most {max_actions} actions per reply.",
        size = bounds.size,
        max_height = bounds.max_height,
        vocab = vocabulary.join(", "),
        max_actions = MAX_ACTIONS_PER_REPLY,
    )
}

/// Builds the full message list for one completion request.
pub fn build_messages(
    target: Option<&Grid>,
    build: &Grid,
    history: &ConversationHistory,
    request: &str,
) -> Vec<ChatTurn> {
    let bounds = ActionBounds::from(build);
    let target_text = target
        .map(describe_grid)
        .unwrap_or_else(|| "(unknown)".to_string());

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatTurn::new(
        ChatRole::System,
        format!(
            "{}\n\nTarget structure:\n{}\n\nCurrent build:\n{}",
            system_prompt(bounds),
            target_text,
            describe_grid(build)
        ),
    ));
    messages.extend(history.turns().cloned());
    messages.push(ChatTurn::new(ChatRole::User, request));
    messages
}
