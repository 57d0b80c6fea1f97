//! Chat turn: append the user message, stream the reply through the splitter, append the
//! assistant message. A turn that fails leaves no assistant message behind.

use crate::display::ChatDisplay;
use crate::llm::{ChatBackend, LlmError};
use crate::session::{Conversation, Role};
use crate::splitter::{process_response_phase, process_thinking_phase};

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("could not start model stream: {0}")]
    Start(#[source] LlmError),
    #[error("model stream failed: {0}")]
    Stream(#[source] LlmError),
}

/// Result of one successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Thinking text with sentinels stripped.
    pub thinking: String,
    pub response: String,
    /// False when the stream ended before `</think>` arrived.
    pub thinking_complete: bool,
}

/// Run one turn for `user_input` against `backend`, rendering into `display`.
pub fn run_turn<B, D>(
    conversation: &mut Conversation,
    backend: &B,
    display: &mut D,
    user_input: &str,
) -> Result<TurnOutcome, TurnError>
where
    B: ChatBackend + ?Sized,
    D: ChatDisplay,
{
    conversation.push_user(user_input);
    display.begin_message(Role::User);
    display.render_markdown(user_input);

    display.begin_message(Role::Assistant);
    log::info!(
        "turn: conversation {} ({} messages) using model {}",
        conversation.id(),
        conversation.len(),
        backend.model()
    );
    let mut stream = backend
        .stream_chat(conversation.messages())
        .map_err(TurnError::Start)?;

    let thinking = process_thinking_phase(&mut stream, display).map_err(TurnError::Stream)?;
    let response =
        process_response_phase(&mut stream, &thinking.carry, display).map_err(TurnError::Stream)?;

    let mut stored = thinking.raw.clone();
    stored.push_str(&response.content);
    conversation.push_assistant(stored);
    log::debug!(
        "turn: conversation {} now has {} messages",
        conversation.id(),
        conversation.len()
    );

    Ok(TurnOutcome {
        thinking: thinking.text(),
        response: response.content,
        thinking_complete: thinking.complete,
    })
}
