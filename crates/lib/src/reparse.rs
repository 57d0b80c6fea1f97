//! Offline re-parse of stored assistant replies for redisplay.
//!
//! Unlike the live [`splitter`](crate::splitter), this runs one regex search over the
//! whole stored text, so it is not affected by how the reply was chunked when it streamed.

use std::sync::OnceLock;

use regex::Regex;

use crate::display::ChatDisplay;
use crate::session::{Conversation, Role};
use crate::splitter::{strip_sentinels, THINKING_COMPLETE_LABEL};

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("think block regex"))
}

/// A stored reply split into its display parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReply {
    /// Thinking text with sentinels stripped; `None` when the reply has no think block.
    pub thinking: Option<String>,
    pub response: String,
}

/// Split a stored assistant message at its first `<think>...</think>` block.
///
/// The response is the stored text with every occurrence of that block's text removed.
pub fn split_stored(content: &str) -> StoredReply {
    match think_block().find(content) {
        Some(m) => {
            let block = m.as_str();
            StoredReply {
                thinking: Some(strip_sentinels(block)),
                response: content.replace(block, ""),
            }
        }
        None => StoredReply {
            thinking: None,
            response: content.to_string(),
        },
    }
}

/// Render a stored assistant message: collapsed thinking region (if any), then response.
pub fn render_stored_assistant<D: ChatDisplay>(content: &str, display: &mut D) {
    let reply = split_stored(content);
    if let Some(thinking) = &reply.thinking {
        display.show_collapsible(THINKING_COMPLETE_LABEL, thinking);
    }
    display.render_markdown(&reply.response);
}

/// Render every non-system message of `conversation` in order.
pub fn render_history<D: ChatDisplay>(conversation: &Conversation, display: &mut D) {
    for message in conversation.visible_messages() {
        display.begin_message(message.role);
        match message.role {
            Role::Assistant => render_stored_assistant(&message.content, display),
            _ => display.render_markdown(&message.content),
        }
    }
}
